//! Response cache policy with HTTP-semantics-aware TTL and conditional
//! revalidation.
//!
//! Per key, an entry is in one of four states: absent, fresh, stale with a
//! validator, or stale without one. Fresh entries short-circuit the chain;
//! stale entries with an `ETag`/`Last-Modified` validator are revalidated
//! with a conditional request, translating a `304` into a synthesized
//! response from the stored payload with its expiry extended.
//!
//! Every outcome is tagged on the response via the reserved `x-cache`
//! header; `on_hit`/`on_miss`/`on_store` callbacks fire at the matching
//! transitions.

pub mod entry;
pub mod status;
pub mod storage;
pub mod ttl;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use strata_core::{
    KeyGenerator, Next, Policy, PolicyResult, RequestContext, RequestKey, Response,
    default_key_generator,
};

pub use entry::{CacheEntry, Validator};
pub use status::{CacheStatus, X_CACHE};
pub use storage::{CacheStorage, LruStorage};
pub use ttl::{CacheControl, TtlDecision, parse_cache_control, resolve_ttl};

/// Callback invoked at cache transitions with the affected key.
pub type CacheCallback = Arc<dyn Fn(&RequestKey) + Send + Sync>;

/// Cache policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when the response carries no freshness directive.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Option<Duration>,
    /// Ceiling applied to every computed TTL.
    #[serde(with = "humantime_serde")]
    pub max_ttl: Option<Duration>,
    /// Methods the cache applies to.
    #[serde(with = "crate::serde_util::methods")]
    pub methods: Vec<Method>,
    /// Response statuses eligible for storage.
    pub status_codes: Vec<u16>,
    /// Honor request-side `Cache-Control: no-cache|no-store` by bypassing
    /// the read path.
    pub respect_no_store: bool,
    /// Revalidate stale entries with `If-None-Match`/`If-Modified-Since`
    /// when a validator is stored.
    pub use_conditional_requests: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: None,
            max_ttl: None,
            methods: vec![Method::GET, Method::HEAD],
            status_codes: vec![200, 301],
            respect_no_store: true,
            use_conditional_requests: true,
        }
    }
}

impl CacheConfig {
    /// Config caching every eligible response for `ttl` unless headers say
    /// otherwise.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            default_ttl: Some(ttl),
            ..Default::default()
        }
    }
}

/// The cache policy. State lives in the injected [`CacheStorage`].
pub struct CachePolicy {
    config: CacheConfig,
    key: KeyGenerator,
    storage: Arc<dyn CacheStorage>,
    on_hit: Option<CacheCallback>,
    on_miss: Option<CacheCallback>,
    on_store: Option<CacheCallback>,
}

impl CachePolicy {
    /// Creates a cache policy with its own default [`LruStorage`].
    pub fn new(config: CacheConfig) -> Self {
        Self::with_storage(config, Arc::new(LruStorage::default()))
    }

    /// Creates a cache policy over an injected storage instance.
    pub fn with_storage(config: CacheConfig, storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            config,
            key: default_key_generator(),
            storage,
            on_hit: None,
            on_miss: None,
            on_store: None,
        }
    }

    /// Replaces the key function.
    pub fn with_key(mut self, key: KeyGenerator) -> Self {
        self.key = key;
        self
    }

    /// Registers a callback fired when a fresh entry is served.
    pub fn on_hit(mut self, callback: CacheCallback) -> Self {
        self.on_hit = Some(callback);
        self
    }

    /// Registers a callback fired when the transport is consulted.
    pub fn on_miss(mut self, callback: CacheCallback) -> Self {
        self.on_miss = Some(callback);
        self
    }

    /// Registers a callback fired when an entry is stored or its expiry
    /// extended.
    pub fn on_store(mut self, callback: CacheCallback) -> Self {
        self.on_store = Some(callback);
        self
    }

    /// The storage this policy reads and writes.
    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    fn fire(callback: &Option<CacheCallback>, key: &RequestKey) {
        if let Some(callback) = callback {
            callback(key);
        }
    }

    /// Decides whether a transport response is storable and under which tag.
    fn store_decision(&self, response: &Response) -> (CacheStatus, Option<CacheEntry>) {
        if !self
            .config
            .status_codes
            .contains(&response.status().as_u16())
        {
            return (CacheStatus::Miss, None);
        }
        let directives = parse_cache_control(response.headers());
        match resolve_ttl(&directives, self.config.default_ttl, self.config.max_ttl) {
            TtlDecision::NoStore => (CacheStatus::NoStore, None),
            TtlDecision::Zero => (CacheStatus::NoCache, None),
            TtlDecision::Unset => (CacheStatus::Miss, None),
            TtlDecision::Store(ttl) => (
                CacheStatus::Miss,
                Some(CacheEntry::from_response(response, Utc::now() + ttl)),
            ),
        }
    }

    /// Runs the transport path, stores per the decision, tags the outcome.
    async fn fetch_and_store(
        &self,
        key: &RequestKey,
        ctx: RequestContext,
        next: Next,
        tag_override: Option<CacheStatus>,
        allow_store: bool,
    ) -> PolicyResult {
        Self::fire(&self.on_miss, key);
        let mut response = next.run(ctx).await?;
        let (status, entry) = self.store_decision(&response);
        match entry {
            Some(entry) if allow_store => {
                debug!(%key, expires = %entry.expires(), "storing cache entry");
                self.storage.write(key.clone(), entry).await;
                Self::fire(&self.on_store, key);
            }
            _ => {
                if status == CacheStatus::NoStore {
                    self.storage.remove(key).await;
                }
            }
        }
        tag_override.unwrap_or(status).tag(&mut response);
        Ok(response)
    }

    /// Conditional revalidation of a stale entry.
    async fn revalidate(
        &self,
        key: &RequestKey,
        entry: CacheEntry,
        validator: Validator,
        ctx: RequestContext,
        next: Next,
    ) -> PolicyResult {
        let (name, value) = validator.request_header();
        debug!(%key, header = %name, "revalidating stale entry");
        let response = next.run(ctx.with_header(name, value)).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            let directives = parse_cache_control(response.headers());
            let refreshed =
                match resolve_ttl(&directives, self.config.default_ttl, self.config.max_ttl) {
                    TtlDecision::Store(ttl) => {
                        let extended = entry.with_expiry(Utc::now() + ttl);
                        self.storage.write(key.clone(), extended.clone()).await;
                        Self::fire(&self.on_store, key);
                        extended
                    }
                    TtlDecision::NoStore => {
                        self.storage.remove(key).await;
                        entry
                    }
                    // Nothing to extend by; serve the stored payload anyway.
                    TtlDecision::Zero | TtlDecision::Unset => entry,
                };
            let mut synthesized = refreshed.to_response();
            CacheStatus::Revalidated.tag(&mut synthesized);
            return Ok(synthesized);
        }

        // Origin sent a full response: it replaces the stored entry per the
        // normal store decision.
        let mut response = response;
        let (status, replacement) = self.store_decision(&response);
        match replacement {
            Some(replacement) => {
                self.storage.write(key.clone(), replacement).await;
                Self::fire(&self.on_store, key);
            }
            None => {
                if status == CacheStatus::NoStore {
                    self.storage.remove(key).await;
                }
            }
        }
        status.tag(&mut response);
        Ok(response)
    }
}

#[async_trait]
impl Policy for CachePolicy {
    async fn handle(&self, ctx: RequestContext, next: Next) -> PolicyResult {
        if !self.config.methods.contains(ctx.method()) {
            return next.run(ctx).await;
        }

        let key = (self.key)(&ctx);

        if self.config.respect_no_store {
            let request_directives = parse_cache_control(ctx.headers());
            if request_directives.no_cache || request_directives.no_store {
                debug!(%key, "request asked to bypass cache");
                // `no-cache` skips the read path but still refreshes the
                // entry; `no-store` stores nothing.
                return self
                    .fetch_and_store(
                        &key,
                        ctx,
                        next,
                        Some(CacheStatus::Bypass),
                        !request_directives.no_store,
                    )
                    .await;
            }
        }

        match self.storage.read(&key).await {
            Some(entry) if entry.is_fresh() => {
                debug!(%key, "serving fresh cache entry");
                Self::fire(&self.on_hit, &key);
                let mut synthesized = entry.to_response();
                CacheStatus::Hit.tag(&mut synthesized);
                Ok(synthesized)
            }
            Some(entry) => {
                let validator = self
                    .config
                    .use_conditional_requests
                    .then(|| entry.validator())
                    .flatten();
                match validator {
                    Some(validator) => self.revalidate(&key, entry, validator, ctx, next).await,
                    None => {
                        debug!(%key, "stale entry without validator, refetching");
                        self.fetch_and_store(&key, ctx, next, None, true).await
                    }
                }
            }
            None => {
                debug!(%key, "cache miss");
                self.fetch_and_store(&key, ctx, next, None, true).await
            }
        }
    }
}
