//! Phase-aware timeout policy.
//!
//! Accepts either a single total budget or per-phase budgets
//! `{ total, request, body }`:
//!
//! - `total` bounds the whole downstream call
//! - `request` bounds connection/time-to-first-byte; its failure is
//!   distinguishable from `total` by [`TimeoutPhase`]
//! - `body` is never enforced with a signal (aborting a streaming body
//!   corrupts partial transfer state); it is forwarded as an out-of-band
//!   hint on the context for the transport to honor natively
//!
//! The policy races the downstream future against the armed timers and the
//! caller's abort signal in one `select!`. Whichever fires first determines
//! the reported cause: a caller abort propagates its reason verbatim and is
//! never rewrapped as a timeout. A derived signal is handed to the
//! transport and fired on any timeout or caller abort, so spawned transport
//! work unwinds too. Timers and signal subscriptions are futures owned by
//! the race, so every exit path — success, error, abort — releases them.
//!
//! With nothing configured and no caller signal present the policy is a
//! pure passthrough.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::debug;

use strata_core::{
    AbortSignal, Error, Next, Policy, PolicyResult, RequestContext, TimeoutPhase, abort_pair,
};

/// Per-phase timeout budgets.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PhaseTimeouts {
    /// Budget for the whole downstream call.
    #[serde(with = "humantime_serde")]
    pub total: Option<Duration>,
    /// Budget for connection/time-to-first-byte.
    #[serde(with = "humantime_serde")]
    pub request: Option<Duration>,
    /// Budget for body transfer, forwarded to the transport as a hint.
    #[serde(with = "humantime_serde")]
    pub body: Option<Duration>,
}

impl From<Duration> for PhaseTimeouts {
    fn from(total: Duration) -> Self {
        PhaseTimeouts {
            total: Some(total),
            ..Default::default()
        }
    }
}

/// Policy enforcing phase timeouts around the downstream chain.
///
/// Commonly placed innermost (directly around the transport) so each
/// retried attempt gets a fresh budget.
pub struct TimeoutPolicy {
    phases: PhaseTimeouts,
}

impl TimeoutPolicy {
    /// Creates a timeout policy from a total budget or phase budgets.
    pub fn new(config: impl Into<PhaseTimeouts>) -> Self {
        Self {
            phases: config.into(),
        }
    }

    /// Shorthand for a single total budget.
    pub fn total(budget: Duration) -> Self {
        Self::new(budget)
    }
}

#[async_trait]
impl Policy for TimeoutPolicy {
    async fn handle(&self, ctx: RequestContext, next: Next) -> PolicyResult {
        let mut ctx = ctx;
        if let Some(body) = self.phases.body {
            ctx = ctx.with_body_timeout(body);
        }

        let caller = ctx.signal().cloned();
        let total = self.phases.total;
        let request = self.phases.request;

        if total.is_none() && request.is_none() && caller.is_none() {
            return next.run(ctx).await;
        }

        // When timers are armed the transport gets a derived signal; it is
        // fired on any timeout and on caller abort, so transports that
        // spawned work observe the cancellation too.
        let derived = if total.is_some() || request.is_some() {
            let (handle, signal) = abort_pair();
            ctx = ctx.with_signal(signal);
            Some(handle)
        } else {
            None
        };

        let downstream = next.run(ctx);
        tokio::pin!(downstream);

        tokio::select! {
            biased;
            reason = wait_abort(caller.as_ref()) => {
                debug!(%reason, "caller aborted in-flight request");
                if let Some(handle) = &derived {
                    handle.abort_with(reason.clone());
                }
                Err(Error::Aborted { reason })
            }
            budget = armed(request) => {
                debug!(?budget, "connection phase timed out");
                if let Some(handle) = &derived {
                    handle.abort_with("request timeout");
                }
                Err(Error::Timeout { phase: TimeoutPhase::Request, timeout: budget })
            }
            budget = armed(total) => {
                debug!(?budget, "total budget exceeded");
                if let Some(handle) = &derived {
                    handle.abort_with("timeout");
                }
                Err(Error::Timeout { phase: TimeoutPhase::Total, timeout: budget })
            }
            result = &mut downstream => result,
        }
    }
}

/// Resolves with the caller's reason once the signal fires; pends forever
/// when there is no signal.
async fn wait_abort(signal: Option<&AbortSignal>) -> SmolStr {
    match signal {
        Some(signal) => {
            signal.cancelled().await;
            signal.reason()
        }
        None => std::future::pending().await,
    }
}

/// Sleeps out an armed budget and returns it; pends forever when unarmed.
async fn armed(budget: Option<Duration>) -> Duration {
    match budget {
        Some(budget) => {
            tokio::time::sleep(budget).await;
            budget
        }
        None => std::future::pending().await,
    }
}
