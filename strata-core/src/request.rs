//! Outbound request context.
//!
//! A [`RequestContext`] describes one outbound request as it flows through
//! the policy chain. Policies treat it as immutable: anything that needs a
//! different request (an added conditional header, a derived abort signal)
//! produces a new context via the `with_*` methods, so concurrent branches
//! joined by dedupe never observe partial mutation.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use smol_str::SmolStr;

use crate::signal::AbortSignal;

/// Per-request hints that ride alongside the request proper.
///
/// The body timeout is deliberately out-of-band: aborting a streaming body
/// via a signal would corrupt partial transfer state, so the transport is
/// expected to honor it natively.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Body-transfer budget forwarded to the transport.
    pub body_timeout: Option<Duration>,
}

/// One outbound request flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    url: SmolStr,
    headers: HeaderMap,
    body: Option<Bytes>,
    signal: Option<AbortSignal>,
    meta: RequestMeta,
}

impl RequestContext {
    /// Starts building a request context. Defaults to `GET` with no headers.
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Convenience constructor for a bare `GET` of the given URL.
    pub fn get(url: impl Into<SmolStr>) -> Self {
        Self::builder().url(url).build()
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The full request URL. Opaque to the pipeline core; transports parse it.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request headers. Lookups are case-insensitive.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The request body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The caller's cancellation signal, if any.
    pub fn signal(&self) -> Option<&AbortSignal> {
        self.signal.as_ref()
    }

    /// Out-of-band request hints.
    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    /// Returns a new context with the given header set (replacing any
    /// existing values for that name).
    pub fn with_header(&self, name: HeaderName, value: HeaderValue) -> Self {
        let mut next = self.clone();
        next.headers.insert(name, value);
        next
    }

    /// Returns a new context carrying the given cancellation signal.
    pub fn with_signal(&self, signal: AbortSignal) -> Self {
        let mut next = self.clone();
        next.signal = Some(signal);
        next
    }

    /// Returns a new context with the body-transfer budget hint attached.
    pub fn with_body_timeout(&self, timeout: Duration) -> Self {
        let mut next = self.clone();
        next.meta.body_timeout = Some(timeout);
        next
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    method: Option<Method>,
    url: SmolStr,
    headers: HeaderMap,
    body: Option<Bytes>,
    signal: Option<AbortSignal>,
    meta: RequestMeta,
}

impl RequestContextBuilder {
    /// Sets the request method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the full request URL.
    pub fn url(mut self, url: impl Into<SmolStr>) -> Self {
        self.url = url.into();
        self
    }

    /// Appends a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the whole header map.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attaches the caller's cancellation signal.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Sets the body-transfer budget hint.
    pub fn body_timeout(mut self, timeout: Duration) -> Self {
        self.meta.body_timeout = Some(timeout);
        self
    }

    /// Finalizes the context.
    pub fn build(self) -> RequestContext {
        RequestContext {
            method: self.method.unwrap_or(Method::GET),
            url: self.url,
            headers: self.headers,
            body: self.body,
            signal: self.signal,
            meta: self.meta,
        }
    }
}
