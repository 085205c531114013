//! `Cache-Control` parsing and TTL resolution.
//!
//! The header may arrive as one comma-joined value or as a repeated header
//! collapsed by the transport layer; both forms parse to the same directive
//! set. Unknown directives and malformed arguments are ignored.

use std::time::Duration;

use http::HeaderMap;
use http::header::CACHE_CONTROL;

/// Directives the cache engine acts on.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheControl {
    /// `max-age=N` in seconds.
    pub max_age: Option<u64>,
    /// `s-maxage=N` in seconds; takes precedence over `max-age`.
    pub s_maxage: Option<u64>,
    /// `no-store` directive present.
    pub no_store: bool,
    /// `no-cache` directive present.
    pub no_cache: bool,
}

/// Parses every `Cache-Control` header value in the map.
pub fn parse_cache_control(headers: &HeaderMap) -> CacheControl {
    let mut parsed = CacheControl::default();
    for value in headers.get_all(CACHE_CONTROL) {
        let Ok(text) = value.to_str() else { continue };
        for directive in text.split(',') {
            let directive = directive.trim();
            let (name, argument) = match directive.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
                None => (directive, None),
            };
            match name.to_ascii_lowercase().as_str() {
                "max-age" => parsed.max_age = argument.and_then(|a| a.parse().ok()),
                "s-maxage" => parsed.s_maxage = argument.and_then(|a| a.parse().ok()),
                "no-store" => parsed.no_store = true,
                "no-cache" => parsed.no_cache = true,
                _ => {}
            }
        }
    }
    parsed
}

/// Outcome of TTL resolution for a storable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlDecision {
    /// Store with this time-to-live.
    Store(Duration),
    /// A TTL of exactly zero: store nothing.
    Zero,
    /// `no-store` directive: never store.
    NoStore,
    /// No directive and no default: nothing to derive.
    Unset,
}

/// Resolves the storage TTL for a response.
///
/// Precedence: `s-maxage` > `max-age` > `default_ttl`, each capped by
/// `max_ttl`.
pub fn resolve_ttl(
    directives: &CacheControl,
    default_ttl: Option<Duration>,
    max_ttl: Option<Duration>,
) -> TtlDecision {
    if directives.no_store {
        return TtlDecision::NoStore;
    }

    let ttl = directives
        .s_maxage
        .or(directives.max_age)
        .map(Duration::from_secs)
        .or(default_ttl);

    match ttl {
        None => TtlDecision::Unset,
        Some(ttl) => {
            let capped = match max_ttl {
                Some(cap) => ttl.min(cap),
                None => ttl,
            };
            if capped.is_zero() {
                TtlDecision::Zero
            } else {
                TtlDecision::Store(capped)
            }
        }
    }
}
