//! Response type returned by transports and synthesized by policies.
//!
//! Responses are value types: the body is [`Bytes`] (reference-counted, so
//! cloning a response for the cache or for dedupe joiners is cheap and never
//! aliases a transport's internal buffers).

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

/// An HTTP-shaped response flowing back out through the policy chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Starts building a response. Defaults to `200 OK` with an empty body.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::default()
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The canonical status text (e.g. `"Not Modified"`), when known.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the headers (used by policies to tag outcomes).
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decomposes the response.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}

/// Builder for [`Response`].
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseBuilder {
    /// Sets the status code.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
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

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Finalizes the response.
    pub fn build(self) -> Response {
        Response {
            status: self.status.unwrap_or(StatusCode::OK),
            headers: self.headers,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_tracks_status_class() {
        let ok = Response::builder().status(StatusCode::OK).build();
        assert!(ok.ok());
        assert_eq!(ok.status_text(), "OK");

        let not_found = Response::builder().status(StatusCode::NOT_FOUND).build();
        assert!(!not_found.ok());

        let not_modified = Response::builder().status(StatusCode::NOT_MODIFIED).build();
        assert!(!not_modified.ok());
        assert_eq!(not_modified.status_text(), "Not Modified");
    }
}
