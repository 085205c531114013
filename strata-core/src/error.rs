//! Error types for pipeline execution.
//!
//! Every policy and transport resolves to `Result<Response, Error>`. The
//! taxonomy is deliberately small:
//!
//! - [`Error::Timeout`] — an internally derived phase timeout fired
//! - [`Error::Aborted`] — the caller cancelled the request; the caller's
//!   reason is carried verbatim and never rewrapped as a timeout
//! - [`Error::Transport`] — an opaque failure surfaced by the terminal
//!   transport
//!
//! All variants are cheaply cloneable so a single failure can be shared
//! with every caller joined on a deduplicated in-flight request.

use std::fmt;
use std::time::Duration;

use smol_str::SmolStr;
use thiserror::Error;

/// Which timeout phase fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// The total request lifecycle exceeded its budget.
    Total,
    /// The connection / time-to-first-byte bound fired before the total one.
    Request,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::Total => write!(f, "request"),
            TimeoutPhase::Request => write!(f, "connection/time-to-first-byte"),
        }
    }
}

/// Coarse classification of transport failures.
///
/// The retry policy's default predicate treats [`Connect`](Self::Connect)
/// and [`Io`](Self::Io) as network-level and therefore retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection establishment failed (DNS, TCP, TLS).
    Connect,
    /// The connection dropped or errored mid-exchange.
    Io,
    /// The peer answered but violated the protocol.
    Protocol,
    /// Anything else the transport wants to surface.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Connect => write!(f, "connect error"),
            TransportErrorKind::Io => write!(f, "io error"),
            TransportErrorKind::Protocol => write!(f, "protocol error"),
            TransportErrorKind::Other => write!(f, "transport error"),
        }
    }
}

/// An opaque failure produced by a terminal transport.
///
/// The pipeline core never inspects transport failures beyond their
/// [`kind`](Self::kind); the rendered message exists for logs and for the
/// caller. Keeping the payload flat (no boxed source) keeps the type
/// `Clone`, which dedupe relies on to hand one failure to many joiners.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: SmolStr,
}

impl TransportError {
    /// Creates a transport error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<SmolStr>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Connection-establishment failure.
    pub fn connect(message: impl Into<SmolStr>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Mid-exchange I/O failure.
    pub fn io(message: impl Into<SmolStr>) -> Self {
        Self::new(TransportErrorKind::Io, message)
    }

    /// Protocol violation reported by the peer.
    pub fn protocol(message: impl Into<SmolStr>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }

    /// Unclassified transport failure.
    pub fn other(message: impl Into<SmolStr>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Captures an arbitrary error value, rendering it to a message.
    pub fn from_error(kind: TransportErrorKind, error: impl fmt::Display) -> Self {
        Self::new(kind, error.to_string())
    }

    /// Returns the failure classification.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns the rendered message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this failure happened at the network level (connect or I/O).
    pub fn is_network(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Connect | TransportErrorKind::Io
        )
    }
}

/// Error returned by pipeline execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// An internally derived timeout fired.
    #[error("{phase} timed out after {timeout:?}")]
    Timeout {
        /// The phase whose budget was exceeded.
        phase: TimeoutPhase,
        /// The configured budget that fired.
        timeout: Duration,
    },

    /// The caller aborted the request.
    #[error("request aborted: {reason}")]
    Aborted {
        /// The caller-supplied abort reason, verbatim.
        reason: SmolStr,
    },

    /// The terminal transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Shorthand for a total-phase timeout.
    pub fn total_timeout(timeout: Duration) -> Self {
        Error::Timeout {
            phase: TimeoutPhase::Total,
            timeout,
        }
    }

    /// Shorthand for a request-phase (connection/TTFB) timeout.
    pub fn request_timeout(timeout: Duration) -> Self {
        Error::Timeout {
            phase: TimeoutPhase::Request,
            timeout,
        }
    }

    /// Whether this error is a caller abort.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }

    /// Whether this error is a network-level transport failure.
    ///
    /// Timeouts and aborts are not network failures; the retry policy
    /// must never resurrect an aborted request.
    pub fn is_network(&self) -> bool {
        match self {
            Error::Transport(inner) => inner.is_network(),
            _ => false,
        }
    }
}
