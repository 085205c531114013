//! Cache outcome tagging via the reserved `x-cache` header.

use http::{HeaderName, HeaderValue};

use strata_core::Response;

/// Reserved response header carrying the cache outcome.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Outcome of the cache (or conditional) policy for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served verbatim from a fresh stored entry; transport not called.
    Hit,
    /// No usable entry; the response came from the transport.
    Miss,
    /// A stale entry was revalidated with a 304 and served with its
    /// expiry extended.
    Revalidated,
    /// The response computed a TTL of zero and was not stored.
    NoCache,
    /// The response carried `no-store` and was not stored.
    NoStore,
    /// The request asked to bypass the cache read path.
    Bypass,
}

impl CacheStatus {
    /// The header value literal for this outcome.
    pub fn as_header_value(&self) -> HeaderValue {
        match self {
            CacheStatus::Hit => HeaderValue::from_static("HIT"),
            CacheStatus::Miss => HeaderValue::from_static("MISS"),
            CacheStatus::Revalidated => HeaderValue::from_static("REVALIDATED"),
            CacheStatus::NoCache => HeaderValue::from_static("NO-CACHE"),
            CacheStatus::NoStore => HeaderValue::from_static("NO-STORE"),
            CacheStatus::Bypass => HeaderValue::from_static("BYPASS"),
        }
    }

    /// Tags the response with this outcome, replacing any earlier tag.
    pub fn tag(&self, response: &mut Response) {
        response.headers_mut().insert(X_CACHE, self.as_header_value());
    }
}
