//! One-shot cancellation signals.
//!
//! [`AbortHandle`] / [`AbortSignal`] form a fire-once pair: the handle side
//! aborts (optionally with a reason), every signal clone observes it. The
//! signal is one-way and idempotent — once fired it stays fired, and later
//! aborts do not overwrite the recorded reason.
//!
//! Composition ("first abort wins" across several inputs) is done by the
//! consumer racing `cancelled()` futures in a `select!`; the futures own
//! their watch subscriptions, so dropping the race releases every listener.

use std::sync::Arc;
use std::sync::OnceLock;

use smol_str::SmolStr;
use tokio::sync::watch;

use crate::error::Error;

const DEFAULT_REASON: &str = "aborted";

/// Creates a connected abort handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    let reason = Arc::new(OnceLock::new());
    (
        AbortHandle {
            tx,
            reason: reason.clone(),
        },
        AbortSignal { rx, reason },
    )
}

/// The firing side of a cancellation pair.
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
    reason: Arc<OnceLock<SmolStr>>,
}

impl AbortHandle {
    /// Aborts with the default reason.
    pub fn abort(&self) {
        self.abort_with(DEFAULT_REASON);
    }

    /// Aborts with the given reason. The first recorded reason wins.
    pub fn abort_with(&self, reason: impl Into<SmolStr>) {
        let _ = self.reason.set(reason.into());
        let _ = self.tx.send(true);
    }

    /// Whether this handle has already fired.
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The observing side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
    reason: Arc<OnceLock<SmolStr>>,
}

impl AbortSignal {
    /// Whether the signal has fired.
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// The abort reason, or the default when the signal fired without one.
    ///
    /// Meaningless before the signal fires.
    pub fn reason(&self) -> SmolStr {
        self.reason
            .get()
            .cloned()
            .unwrap_or_else(|| SmolStr::new_static(DEFAULT_REASON))
    }

    /// Resolves when the signal fires.
    ///
    /// If every [`AbortHandle`] is dropped without firing, the future stays
    /// pending — an unfired signal never resolves as an abort.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// The [`Error::Aborted`] carrying this signal's reason verbatim.
    pub fn abort_error(&self) -> Error {
        Error::Aborted {
            reason: self.reason(),
        }
    }
}
