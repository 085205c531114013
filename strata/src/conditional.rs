//! Standalone conditional-revalidation policies.
//!
//! These work without the full cache engine: no freshness window, every
//! request goes to the transport, but a known validator is replayed as a
//! conditional header so an unchanged resource comes back as a `304` and is
//! served from the stored payload instead of re-transferring the body.
//!
//! `ETag` and `Last-Modified` are two instances of one algorithm
//! parameterized by [`Strategy`], so the pair cannot drift apart. The
//! combined policy keeps one map per strategy and prefers the `ETag` map
//! when both hold an entry for a key.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use http::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use tracing::debug;

use strata_core::{
    KeyGenerator, Next, Policy, PolicyResult, RequestContext, RequestKey, Response,
    default_key_generator,
};

use crate::cache::{CacheEntry, CacheStatus};

/// How long a recorded validator (and its payload snapshot) is kept.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// One validation strategy: which header pair it reads and replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `ETag` replayed as `If-None-Match`.
    ETag,
    /// `Last-Modified` replayed as `If-Modified-Since`.
    LastModified,
}

impl Strategy {
    /// The request header the stored token is replayed as.
    pub fn request_header(&self) -> HeaderName {
        match self {
            Strategy::ETag => IF_NONE_MATCH,
            Strategy::LastModified => IF_MODIFIED_SINCE,
        }
    }

    /// The response header the token is read from.
    pub fn response_header(&self) -> HeaderName {
        match self {
            Strategy::ETag => ETAG,
            Strategy::LastModified => LAST_MODIFIED,
        }
    }
}

/// A recorded validator token plus the payload it validates.
#[derive(Debug, Clone)]
struct ValidatorEntry {
    token: HeaderValue,
    snapshot: CacheEntry,
}

/// Per-strategy validator map.
#[derive(Debug)]
struct ValidatorStore {
    strategy: Strategy,
    entries: DashMap<RequestKey, ValidatorEntry>,
}

impl ValidatorStore {
    fn new(strategy: Strategy) -> Self {
        ValidatorStore {
            strategy,
            entries: DashMap::new(),
        }
    }

    /// Live entry for `key`, lazily dropping one past retention.
    fn live(&self, key: &RequestKey) -> Option<ValidatorEntry> {
        let entry = self.entries.get(key)?;
        if entry.snapshot.is_fresh() {
            return Some(entry.clone());
        }
        drop(entry);
        self.entries.remove(key);
        None
    }
}

/// Conditional-revalidation policy over one or both validator strategies.
pub struct ConditionalPolicy {
    stores: Vec<ValidatorStore>,
    methods: Vec<Method>,
    key: KeyGenerator,
    retention: Duration,
}

impl ConditionalPolicy {
    fn with_strategies(strategies: &[Strategy]) -> Self {
        ConditionalPolicy {
            stores: strategies.iter().copied().map(ValidatorStore::new).collect(),
            methods: vec![Method::GET, Method::HEAD],
            key: default_key_generator(),
            retention: DEFAULT_RETENTION,
        }
    }

    /// `ETag`-only policy.
    pub fn etag() -> Self {
        Self::with_strategies(&[Strategy::ETag])
    }

    /// `Last-Modified`-only policy.
    pub fn last_modified() -> Self {
        Self::with_strategies(&[Strategy::LastModified])
    }

    /// Combined policy; prefers `ETag` when both validators are known.
    pub fn new() -> Self {
        Self::with_strategies(&[Strategy::ETag, Strategy::LastModified])
    }

    /// Replaces the methods the policy applies to.
    pub fn with_methods(mut self, methods: Vec<Method>) -> Self {
        self.methods = methods;
        self
    }

    /// Replaces the key function.
    pub fn with_key(mut self, key: KeyGenerator) -> Self {
        self.key = key;
        self
    }

    /// Replaces the validator retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// First store (in preference order) holding a live entry for `key`.
    fn lookup(&self, key: &RequestKey) -> Option<(Strategy, ValidatorEntry)> {
        self.stores
            .iter()
            .find_map(|store| store.live(key).map(|entry| (store.strategy, entry)))
    }

    /// Records the response's validator, preferring the first strategy whose
    /// header is present. Earlier tokens for the key are dropped first so a
    /// resource that stops sending a validator is no longer revalidated.
    fn record(&self, key: &RequestKey, response: &Response) {
        for store in &self.stores {
            store.entries.remove(key);
        }
        if !response.ok() {
            return;
        }
        for store in &self.stores {
            if let Some(token) = response.headers().get(store.strategy.response_header()) {
                debug!(%key, strategy = ?store.strategy, "recorded validator");
                store.entries.insert(
                    key.clone(),
                    ValidatorEntry {
                        token: token.clone(),
                        snapshot: CacheEntry::from_response(response, Utc::now() + self.retention),
                    },
                );
                return;
            }
        }
    }
}

impl Default for ConditionalPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Policy for ConditionalPolicy {
    async fn handle(&self, ctx: RequestContext, next: Next) -> PolicyResult {
        if !self.methods.contains(ctx.method()) {
            return next.run(ctx).await;
        }

        let key = (self.key)(&ctx);

        match self.lookup(&key) {
            Some((strategy, entry)) => {
                debug!(%key, strategy = ?strategy, "sending conditional request");
                let conditional = ctx.with_header(strategy.request_header(), entry.token.clone());
                let response = next.run(conditional).await?;

                if response.status() == StatusCode::NOT_MODIFIED {
                    // Validated: keep the token, restart the retention clock.
                    let refreshed = ValidatorEntry {
                        token: entry.token,
                        snapshot: entry.snapshot.with_expiry(Utc::now() + self.retention),
                    };
                    let mut synthesized = refreshed.snapshot.to_response();
                    if let Some(store) = self.stores.iter().find(|s| s.strategy == strategy) {
                        store.entries.insert(key.clone(), refreshed);
                    }
                    CacheStatus::Revalidated.tag(&mut synthesized);
                    return Ok(synthesized);
                }

                let mut response = response;
                self.record(&key, &response);
                CacheStatus::Miss.tag(&mut response);
                Ok(response)
            }
            None => {
                let mut response = next.run(ctx).await?;
                self.record(&key, &response);
                CacheStatus::Miss.tag(&mut response);
                Ok(response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use http::header::CONTENT_TYPE;

    use crate::cache::X_CACHE;
    use strata_core::{Pipeline, transport_fn};

    const URL: &str = "https://example.com/feed";

    fn cache_tag(response: &Response) -> &str {
        response
            .headers()
            .get(X_CACHE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    fn pipeline(
        policy: ConditionalPolicy,
        respond: impl Fn(&RequestContext) -> Response + Send + Sync + 'static,
    ) -> Pipeline {
        Pipeline::builder(transport_fn(move |ctx: RequestContext| {
            let response = respond(&ctx);
            async move { Ok(response) }
        }))
        .with(policy)
        .build()
    }

    #[tokio::test]
    async fn etag_flow_revalidates_after_first_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport_calls = calls.clone();
        let pipeline = pipeline(ConditionalPolicy::etag(), move |ctx| {
            let attempt = transport_calls.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                assert!(ctx.headers().get(IF_NONE_MATCH).is_none());
                Response::builder()
                    .header(ETAG, HeaderValue::from_static("\"v1\""))
                    .body(Bytes::from_static(b"feed body"))
                    .build()
            } else {
                assert_eq!(ctx.headers().get(IF_NONE_MATCH).unwrap(), "\"v1\"");
                Response::builder().status(StatusCode::NOT_MODIFIED).build()
            }
        });

        let first = pipeline.execute(RequestContext::get(URL)).await.unwrap();
        assert_eq!(cache_tag(&first), "MISS");

        let second = pipeline.execute(RequestContext::get(URL)).await.unwrap();
        assert_eq!(cache_tag(&second), "REVALIDATED");
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.body(), &Bytes::from_static(b"feed body"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn last_modified_flow_uses_if_modified_since() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport_calls = calls.clone();
        let pipeline = pipeline(ConditionalPolicy::last_modified(), move |ctx| {
            if transport_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Response::builder()
                    .header(
                        LAST_MODIFIED,
                        HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
                    )
                    .body(Bytes::from_static(b"page"))
                    .build()
            } else {
                assert_eq!(
                    ctx.headers().get(IF_MODIFIED_SINCE).unwrap(),
                    "Wed, 21 Oct 2015 07:28:00 GMT"
                );
                Response::builder().status(StatusCode::NOT_MODIFIED).build()
            }
        });

        pipeline.execute(RequestContext::get(URL)).await.unwrap();
        let second = pipeline.execute(RequestContext::get(URL)).await.unwrap();
        assert_eq!(cache_tag(&second), "REVALIDATED");
        assert_eq!(second.body(), &Bytes::from_static(b"page"));
    }

    #[tokio::test]
    async fn combined_policy_prefers_etag_over_last_modified() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport_calls = calls.clone();
        let pipeline = pipeline(ConditionalPolicy::new(), move |ctx| {
            if transport_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Response::builder()
                    .header(ETAG, HeaderValue::from_static("\"v1\""))
                    .header(
                        LAST_MODIFIED,
                        HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
                    )
                    .build()
            } else {
                assert!(ctx.headers().get(IF_NONE_MATCH).is_some());
                assert!(ctx.headers().get(IF_MODIFIED_SINCE).is_none());
                Response::builder().status(StatusCode::NOT_MODIFIED).build()
            }
        });

        pipeline.execute(RequestContext::get(URL)).await.unwrap();
        let second = pipeline.execute(RequestContext::get(URL)).await.unwrap();
        assert_eq!(cache_tag(&second), "REVALIDATED");
    }

    #[tokio::test]
    async fn changed_resource_replaces_the_validator() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport_calls = calls.clone();
        let pipeline = pipeline(ConditionalPolicy::etag(), move |ctx| {
            match transport_calls.fetch_add(1, Ordering::SeqCst) {
                0 => Response::builder()
                    .header(ETAG, HeaderValue::from_static("\"v1\""))
                    .body(Bytes::from_static(b"one"))
                    .build(),
                1 => {
                    assert_eq!(ctx.headers().get(IF_NONE_MATCH).unwrap(), "\"v1\"");
                    Response::builder()
                        .header(ETAG, HeaderValue::from_static("\"v2\""))
                        .body(Bytes::from_static(b"two"))
                        .build()
                }
                _ => {
                    assert_eq!(ctx.headers().get(IF_NONE_MATCH).unwrap(), "\"v2\"");
                    Response::builder().status(StatusCode::NOT_MODIFIED).build()
                }
            }
        });

        pipeline.execute(RequestContext::get(URL)).await.unwrap();
        let full = pipeline.execute(RequestContext::get(URL)).await.unwrap();
        assert_eq!(cache_tag(&full), "MISS");
        assert_eq!(full.body(), &Bytes::from_static(b"two"));

        let revalidated = pipeline.execute(RequestContext::get(URL)).await.unwrap();
        assert_eq!(revalidated.body(), &Bytes::from_static(b"two"));
        assert_eq!(cache_tag(&revalidated), "REVALIDATED");
    }

    #[tokio::test]
    async fn expired_retention_drops_the_validator() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport_calls = calls.clone();
        let policy = ConditionalPolicy::etag().with_retention(Duration::ZERO);
        let pipeline = pipeline(policy, move |ctx| {
            transport_calls.fetch_add(1, Ordering::SeqCst);
            // Retention of zero means no request ever carries a validator.
            assert!(ctx.headers().get(IF_NONE_MATCH).is_none());
            Response::builder()
                .header(ETAG, HeaderValue::from_static("\"v1\""))
                .build()
        });

        pipeline.execute(RequestContext::get(URL)).await.unwrap();
        let second = pipeline.execute(RequestContext::get(URL)).await.unwrap();
        assert_eq!(cache_tag(&second), "MISS");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn synthesized_response_keeps_stored_headers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport_calls = calls.clone();
        let pipeline = pipeline(ConditionalPolicy::etag(), move |_| {
            if transport_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Response::builder()
                    .header(ETAG, HeaderValue::from_static("\"v1\""))
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(Bytes::from_static(b"{}"))
                    .build()
            } else {
                Response::builder().status(StatusCode::NOT_MODIFIED).build()
            }
        });

        pipeline.execute(RequestContext::get(URL)).await.unwrap();
        let revalidated = pipeline.execute(RequestContext::get(URL)).await.unwrap();
        assert_eq!(
            revalidated.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
