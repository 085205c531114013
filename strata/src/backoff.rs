//! Exponential backoff with optional full jitter.
//!
//! The delay for a zero-based `attempt` is
//! `min(max, initial * multiplier^attempt)`. With jitter enabled the
//! returned value is drawn uniformly from `[0, delay]` on every call (full
//! jitter); with jitter disabled the strategy is a pure, reproducible
//! function of the attempt number.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use strata_core::{Error, Response};

/// Backoff parameters. Pure configuration, no mutable state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExponentialBackoff {
    /// Delay before the first retry (e.g. "100ms").
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    /// Ceiling applied after exponential growth (e.g. "10s").
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    /// Multiplier applied per attempt. Delays grow as
    /// `initial, initial * multiplier, initial * multiplier^2, ...`.
    pub multiplier: f64,
    /// Draw the delay uniformly from `[0, computed]` (full jitter).
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Computes the delay before retrying the given zero-based `attempt`.
    ///
    /// The settled `result`/`error` of the failed attempt are accepted so
    /// derived strategies can vary delay by failure kind; this default
    /// strategy ignores them.
    pub fn delay(
        &self,
        attempt: u32,
        _result: Option<&Response>,
        _error: Option<&Error>,
    ) -> Duration {
        let capped = self.ceiling(attempt);
        if self.jitter {
            Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=capped.as_secs_f64()))
        } else {
            capped
        }
    }

    /// The delay without jitter applied; the upper bound of jittered draws.
    fn ceiling(&self, attempt: u32) -> Duration {
        let grown = self.initial.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(grown.min(self.max.as_secs_f64()))
    }
}
