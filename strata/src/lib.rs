#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Exponential backoff with optional full jitter.
///
/// Used by [`RetryPolicy`] to space attempts; delays grow by a multiplier
/// from an initial value up to a cap.
pub mod backoff;

/// Response cache with HTTP-semantics-aware TTL computation.
///
/// The cache policy computes cacheability and TTL from `Cache-Control`
/// (`s-maxage` > `max-age` > configured default, capped by a ceiling),
/// stores entries in an injectable LRU-bounded storage, and revalidates
/// stale entries with conditional requests when a validator is stored.
pub mod cache;

/// Standalone `ETag`/`Last-Modified` revalidation policies.
///
/// Usable without the full cache engine: every request reaches the
/// transport, but unchanged resources come back as `304` and are served
/// from the stored payload.
pub mod conditional;

/// In-flight request deduplication.
///
/// Identical idempotent requests share one downstream execution; a settled
/// success stays joinable for a short window so rapid sequential calls
/// coalesce too.
pub mod dedupe;

/// Bounded retry around the downstream chain.
///
/// Retries network-level transport failures and configured status codes
/// with exponential backoff; caller aborts are never retried.
pub mod retry;

/// Phase-aware timeouts and cancellation composition.
///
/// Enforces `total` and `request` (connection/time-to-first-byte) budgets
/// by racing the downstream call, forwards the `body` budget as a hint,
/// and hands the transport a derived abort signal fired on any timeout or
/// caller abort.
pub mod timeout;

mod serde_util;

pub use backoff::ExponentialBackoff;
pub use cache::{
    CacheCallback, CacheConfig, CacheEntry, CachePolicy, CacheStatus, CacheStorage, LruStorage,
    X_CACHE,
};
pub use conditional::ConditionalPolicy;
pub use dedupe::{DedupeConfig, DedupePolicy};
pub use retry::{RetryConfig, RetryPolicy, RetryPredicate};
pub use timeout::{PhaseTimeouts, TimeoutPolicy};

pub use strata_core::{
    AbortHandle, AbortSignal, Error, KeyGenerator, Next, Pipeline, PipelineBuilder, Policy,
    PolicyResult, RequestContext, RequestKey, Response, TimeoutPhase, Transport, TransportError,
    TransportErrorKind, abort_pair, compose, default_key, default_key_generator, transport_fn,
};

/// The `strata` prelude.
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Pipeline, Policy, PolicyResult, RequestContext, Response, Transport, transport_fn,
    };
}
