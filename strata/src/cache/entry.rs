//! Stored cache entries and their validators.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use strata_core::Response;

/// A cached response with an absolute expiry timestamp.
///
/// `expires` is always derived at store time (from `Cache-Control` or the
/// configured default TTL), never recomputed lazily. The entry holds a
/// value copy of the response, not a live handle to transport buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    body: Bytes,
    headers: HeaderMap,
    status: StatusCode,
    expires: DateTime<Utc>,
}

impl CacheEntry {
    /// Snapshots a response into an entry expiring at `expires`.
    pub fn from_response(response: &Response, expires: DateTime<Utc>) -> Self {
        CacheEntry {
            body: response.body().clone(),
            headers: response.headers().clone(),
            status: response.status(),
            expires,
        }
    }

    /// The stored payload.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The stored headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The stored status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The absolute expiry timestamp.
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// Whether the entry is still fresh.
    pub fn is_fresh(&self) -> bool {
        Utc::now() < self.expires
    }

    /// Returns a copy with the expiry extended to the given instant.
    ///
    /// Used on successful revalidation: payload and validator stay as
    /// stored, only the freshness window moves.
    pub fn with_expiry(&self, expires: DateTime<Utc>) -> Self {
        CacheEntry {
            expires,
            ..self.clone()
        }
    }

    /// The entry's validator, ETag preferred when both are present.
    pub fn validator(&self) -> Option<Validator> {
        if let Some(etag) = self.headers.get(ETAG) {
            return Some(Validator::ETag(etag.clone()));
        }
        self.headers
            .get(LAST_MODIFIED)
            .map(|value| Validator::LastModified(value.clone()))
    }

    /// Synthesizes a response from the stored entry.
    pub fn to_response(&self) -> Response {
        Response::builder()
            .status(self.status)
            .headers(self.headers.clone())
            .body(self.body.clone())
            .build()
    }
}

/// A conditional-request validator taken from a stored response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// `ETag` value, to be replayed as `If-None-Match`.
    ETag(HeaderValue),
    /// `Last-Modified` value, to be replayed as `If-Modified-Since`.
    LastModified(HeaderValue),
}

impl Validator {
    /// The conditional request header this validator is replayed as.
    pub fn request_header(&self) -> (HeaderName, HeaderValue) {
        match self {
            Validator::ETag(value) => (IF_NONE_MATCH, value.clone()),
            Validator::LastModified(value) => (IF_MODIFIED_SINCE, value.clone()),
        }
    }
}
