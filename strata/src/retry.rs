//! Retry policy: bounded re-invocation of the downstream chain.
//!
//! On each attempt the downstream chain runs once. If the outcome matches
//! the retryable predicate and attempts remain, the policy sleeps for the
//! backoff delay and tries again; otherwise the outcome is returned as-is.
//! The backoff sleep races the request's abort signal, so a caller abort
//! during the sleep aborts the loop rather than merely skipping the wait.
//!
//! Retry is the only policy allowed to suppress a failure — and it never
//! suppresses a caller abort.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use strata_core::{Error, Next, Policy, PolicyResult, RequestContext, Response};

use crate::backoff::ExponentialBackoff;

/// Decides whether a settled attempt should be retried.
///
/// Exactly one of `response` / `error` is `Some`.
pub type RetryPredicate = Arc<dyn Fn(Option<&Response>, Option<&Error>) -> bool + Send + Sync>;

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempt bound, including the first call. Values below 1 are
    /// treated as 1.
    pub attempts: u32,
    /// Backoff strategy between attempts.
    pub backoff: ExponentialBackoff,
    /// Response status codes considered retryable in addition to
    /// network-level transport failures.
    pub status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: ExponentialBackoff::default(),
            status_codes: Vec::new(),
        }
    }
}

/// Policy retrying the downstream chain on retryable failures.
pub struct RetryPolicy {
    config: RetryConfig,
    predicate: RetryPredicate,
}

impl RetryPolicy {
    /// Creates a retry policy with the default predicate derived from the
    /// config: network-level transport failures plus the configured status
    /// codes. Caller aborts are never retryable.
    pub fn new(config: RetryConfig) -> Self {
        let statuses = config.status_codes.clone();
        let predicate: RetryPredicate = Arc::new(move |response, error| match (response, error) {
            (Some(response), _) => statuses.contains(&response.status().as_u16()),
            (_, Some(error)) => !error.is_aborted() && error.is_network(),
            _ => false,
        });
        Self { config, predicate }
    }

    /// Creates a retry policy with defaults.
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Replaces the retryable predicate.
    ///
    /// The predicate is consulted for responses and for errors; aborts are
    /// filtered out before it runs, so a custom predicate cannot
    /// accidentally resurrect a cancelled request.
    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.predicate = predicate;
        self
    }
}

#[async_trait]
impl Policy for RetryPolicy {
    async fn handle(&self, ctx: RequestContext, next: Next) -> PolicyResult {
        let attempts = self.config.attempts.max(1);
        let mut attempt = 0u32;
        loop {
            let result = next.clone().run(ctx.clone()).await;

            let retryable = match &result {
                Ok(response) => (self.predicate)(Some(response), None),
                Err(error) if error.is_aborted() => false,
                Err(error) => (self.predicate)(None, Some(error)),
            };

            if !retryable {
                return result;
            }
            if attempt + 1 >= attempts {
                warn!(attempts, "retry budget exhausted");
                return result;
            }

            let delay = self
                .config
                .backoff
                .delay(attempt, result.as_ref().ok(), result.as_ref().err());
            debug!(attempt, ?delay, "retrying downstream call");

            sleep_or_abort(&ctx, delay).await?;
            attempt += 1;
        }
    }
}

/// Sleeps for `delay`, unwinding immediately if the request aborts first.
async fn sleep_or_abort(ctx: &RequestContext, delay: Duration) -> Result<(), Error> {
    match ctx.signal() {
        Some(signal) => {
            tokio::select! {
                biased;
                _ = signal.cancelled() => Err(signal.abort_error()),
                _ = tokio::time::sleep(delay) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use http::StatusCode;
    use strata_core::{Pipeline, Response, TransportError, transport_fn};

    fn immediate_backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(1),
            multiplier: 1.0,
            jitter: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_network_failures_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let pipeline = Pipeline::builder(transport_fn(move |_ctx| {
            let calls = counter.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TransportError::connect("refused").into())
                } else {
                    Ok(Response::builder().build())
                }
            }
        }))
        .with(RetryPolicy::new(RetryConfig {
            attempts: 5,
            backoff: immediate_backoff(),
            status_codes: Vec::new(),
        }))
        .build();

        let response = pipeline
            .execute(RequestContext::get("https://example.com/"))
            .await
            .unwrap();
        assert!(response.ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_rethrow_last_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let pipeline = Pipeline::builder(transport_fn(move |_ctx| {
            let calls = counter.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Response, _>(TransportError::io("reset").into())
            }
        }))
        .with(RetryPolicy::new(RetryConfig {
            attempts: 3,
            backoff: immediate_backoff(),
            status_codes: Vec::new(),
        }))
        .build();

        let error = pipeline
            .execute(RequestContext::get("https://example.com/"))
            .await
            .unwrap_err();
        assert!(error.is_network());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_status_codes_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let pipeline = Pipeline::builder(transport_fn(move |_ctx| {
            let calls = counter.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(Response::builder()
                        .status(StatusCode::SERVICE_UNAVAILABLE)
                        .build())
                } else {
                    Ok(Response::builder().build())
                }
            }
        }))
        .with(RetryPolicy::new(RetryConfig {
            attempts: 2,
            backoff: immediate_backoff(),
            status_codes: vec![503],
        }))
        .build();

        let response = pipeline
            .execute(RequestContext::get("https://example.com/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_responses_pass_through_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let pipeline = Pipeline::builder(transport_fn(move |_ctx| {
            let calls = counter.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Response::builder().status(StatusCode::NOT_FOUND).build())
            }
        }))
        .with(RetryPolicy::with_defaults())
        .build();

        let response = pipeline
            .execute(RequestContext::get("https://example.com/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_during_backoff_sleep_stops_the_loop() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let (handle, signal) = strata_core::abort_pair();

        let pipeline = Pipeline::builder(transport_fn(move |_ctx| {
            let calls = counter.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Response, _>(TransportError::connect("refused").into())
            }
        }))
        .with(RetryPolicy::new(RetryConfig {
            attempts: 10,
            backoff: ExponentialBackoff {
                initial: Duration::from_secs(60),
                max: Duration::from_secs(60),
                multiplier: 1.0,
                jitter: false,
            },
            status_codes: Vec::new(),
        }))
        .build();

        let ctx = RequestContext::builder()
            .url("https://example.com/")
            .signal(signal)
            .build();

        let task = tokio::spawn(async move { pipeline.execute(ctx).await });
        // Let the first attempt fail and the backoff sleep begin.
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort_with("caller gave up");

        let error = task.await.unwrap().unwrap_err();
        assert_eq!(
            error,
            Error::Aborted {
                reason: "caller gave up".into()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
