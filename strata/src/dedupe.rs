//! In-flight request deduplication.
//!
//! Identical idempotent requests share one downstream execution: the first
//! caller registers a shared future under the request key before the call
//! settles, so everyone arriving while it is pending joins it. A settled
//! success stays joinable for a short window, coalescing rapid sequential
//! calls too, and is then dropped; a settled failure is dropped immediately
//! so the next caller retries instead of replaying the error.
//!
//! Mutating methods are excluded by default and must be opted in.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use http::Method;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use strata_core::{
    KeyGenerator, Next, Policy, PolicyResult, RequestContext, RequestKey, default_key_generator,
};

use crate::serde_util;

/// Dedupe policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DedupeConfig {
    /// How long a settled success remains joinable after completion.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Methods the policy coalesces.
    #[serde(with = "serde_util::methods")]
    pub methods: Vec<Method>,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
            methods: vec![Method::GET, Method::HEAD],
        }
    }
}

/// Shareable downstream execution. `PolicyResult` is `Clone`, so every
/// joiner receives the same response or the same error.
type SharedResult = Shared<BoxFuture<'static, PolicyResult>>;

struct Inflight {
    id: u64,
    future: SharedResult,
    settled_at: Arc<OnceLock<Instant>>,
}

impl Inflight {
    /// Pending entries are always joinable; settled ones only within the
    /// window.
    fn is_joinable(&self, window: Duration) -> bool {
        match self.settled_at.get() {
            None => true,
            Some(settled) => settled.elapsed() < window,
        }
    }
}

/// Policy coalescing identical in-flight requests onto one shared result.
pub struct DedupePolicy {
    config: DedupeConfig,
    key: KeyGenerator,
    inflight: Arc<DashMap<RequestKey, Inflight>>,
    next_id: AtomicU64,
}

impl DedupePolicy {
    /// Creates a dedupe policy.
    pub fn new(config: DedupeConfig) -> Self {
        Self {
            config,
            key: default_key_generator(),
            inflight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Replaces the key function.
    pub fn with_key(mut self, key: KeyGenerator) -> Self {
        self.key = key;
        self
    }

    /// Number of tracked in-flight (or window-retained) entries.
    pub fn pending(&self) -> usize {
        self.inflight.len()
    }

    /// Builds a new in-flight entry around the downstream execution. The
    /// execution stamps its settlement time when it completes and, on
    /// success, schedules its own removal once the join window closes; the
    /// removal is guarded on the entry id so a successor registered under
    /// the same key is never evicted.
    fn register(&self, key: RequestKey, ctx: RequestContext, next: Next) -> Inflight {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let settled_at = Arc::new(OnceLock::new());
        let marker = settled_at.clone();
        let inflight = self.inflight.clone();
        let window = self.config.window;
        let future: BoxFuture<'static, PolicyResult> = Box::pin(async move {
            let result = next.run(ctx).await;
            let _ = marker.set(Instant::now());
            if result.is_ok() {
                tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    inflight.remove_if(&key, |_, entry| entry.id == id);
                });
            }
            result
        });
        Inflight {
            id,
            future: future.shared(),
            settled_at,
        }
    }
}

impl Default for DedupePolicy {
    fn default() -> Self {
        Self::new(DedupeConfig::default())
    }
}

#[async_trait]
impl Policy for DedupePolicy {
    async fn handle(&self, ctx: RequestContext, next: Next) -> PolicyResult {
        if !self.config.methods.contains(ctx.method()) {
            return next.run(ctx).await;
        }

        let key = (self.key)(&ctx);

        let (future, id) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_joinable(self.config.window) {
                    let inflight = occupied.get();
                    debug!(%key, id = inflight.id, "joining in-flight request");
                    (inflight.future.clone(), inflight.id)
                } else {
                    // Window expired but the cleanup task has not run yet;
                    // replace the stale entry in place.
                    let inflight = self.register(key.clone(), ctx, next);
                    let handle = (inflight.future.clone(), inflight.id);
                    occupied.insert(inflight);
                    handle
                }
            }
            Entry::Vacant(vacant) => {
                let inflight = self.register(key.clone(), ctx, next);
                debug!(%key, id = inflight.id, "registered in-flight request");
                let handle = (inflight.future.clone(), inflight.id);
                vacant.insert(inflight);
                handle
            }
        };

        let result = future.await;

        // Failures are not retained: only the callers already joined share
        // the error. Guard on the id so a successor entry for the same key
        // is never removed by a stale failure.
        if result.is_err() {
            self.inflight.remove_if(&key, |_, entry| entry.id == id);
        }

        result
    }
}
