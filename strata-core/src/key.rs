//! Request keys and key generators.
//!
//! Cache, dedupe, and conditional policies all address their state by a
//! [`RequestKey`]. The default generator concatenates method and full URL,
//! which coalesces exactly the requests that are semantically identical for
//! idempotent methods. Callers with richer identity requirements (e.g.
//! vary-by-header) plug in their own [`KeyGenerator`].

use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::request::RequestContext;

/// Key identifying a request for cache/dedupe/validator storage.
///
/// Cheap to clone and hash; short keys are stored inline via [`SmolStr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(SmolStr);

impl RequestKey {
    /// Creates a key from an arbitrary string.
    pub fn new(key: impl Into<SmolStr>) -> Self {
        RequestKey(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestKey {
    fn from(key: &str) -> Self {
        RequestKey::new(key)
    }
}

/// Pluggable key function, shared by the policies that keep per-key state.
pub type KeyGenerator = Arc<dyn Fn(&RequestContext) -> RequestKey + Send + Sync>;

/// Default key function: `METHOD url`.
pub fn default_key(ctx: &RequestContext) -> RequestKey {
    RequestKey::new(format!("{} {}", ctx.method(), ctx.url()))
}

/// Returns the default [`KeyGenerator`].
pub fn default_key_generator() -> KeyGenerator {
    Arc::new(default_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn default_key_includes_method_and_url() {
        let ctx = RequestContext::builder()
            .method(Method::GET)
            .url("https://api.example.com/users?page=2")
            .build();
        assert_eq!(
            default_key(&ctx).as_str(),
            "GET https://api.example.com/users?page=2"
        );
    }

    #[test]
    fn different_urls_produce_different_keys() {
        let a = RequestContext::builder()
            .url("https://example.com/a")
            .build();
        let b = RequestContext::builder()
            .url("https://example.com/b")
            .build();
        assert_ne!(default_key(&a), default_key(&b));
    }
}
