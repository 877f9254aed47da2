//! Route table mapping request paths to caching strategies.
//!
//! Rules are evaluated in priority order and the first match wins. Paths are
//! normalized first, so query strings, fragments and the origin of absolute
//! URLs never influence the decision.

use super::CacheCategory;
use crate::config::NetworkConfig;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

/// How the network-interception layer serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Serve from cache, fall back to the network on a miss.
    CacheFirst,
    /// Try the network within `timeout`, fall back to cache.
    NetworkFirst { timeout: Duration },
    /// Serve from cache immediately and refresh in the background.
    StaleWhileRevalidate,
    /// Never touch the cache.
    NetworkOnly,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache_first",
            Strategy::NetworkFirst { .. } => "network_first",
            Strategy::StaleWhileRevalidate => "stale_while_revalidate",
            Strategy::NetworkOnly => "network_only",
        }
    }

    /// Network timeout, for network-first strategies only.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Strategy::NetworkFirst { timeout } => Some(*timeout),
            _ => None,
        }
    }

    /// Whether responses served with this strategy are written to a cache.
    pub fn uses_cache(&self) -> bool {
        !matches!(self, Strategy::NetworkOnly)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.timeout() {
            Some(timeout) => write!(f, "{} ({}ms)", self.as_str(), timeout.as_millis()),
            None => f.write_str(self.as_str()),
        }
    }
}

/// Request classes with their own network-first timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Api,
    Navigation,
    Asset,
}

impl RequestClass {
    pub fn timeout(&self) -> Duration {
        match self {
            RequestClass::Api => NetworkConfig::API_TIMEOUT,
            RequestClass::Navigation => NetworkConfig::NAVIGATION_TIMEOUT,
            RequestClass::Asset => NetworkConfig::ASSET_TIMEOUT,
        }
    }

    pub fn network_first(&self) -> Strategy {
        Strategy::NetworkFirst {
            timeout: self.timeout(),
        }
    }
}

/// Outcome of resolving a path against the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatch {
    /// Name of the rule that matched (`"navigation"` for the fallback).
    pub rule: &'static str,
    pub strategy: Strategy,
    pub category: CacheCategory,
}

/// Serializable view of one rule, for the service worker manifest.
#[derive(Debug, Clone, Serialize)]
pub struct RouteDescriptor {
    pub rule: &'static str,
    pub pattern: String,
    pub strategy: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub category: CacheCategory,
}

struct RouteRule {
    name: &'static str,
    pattern: Regex,
    strategy: Strategy,
    category: CacheCategory,
}

impl RouteRule {
    fn new(
        name: &'static str,
        pattern: &str,
        strategy: Strategy,
        category: CacheCategory,
    ) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("route pattern must compile"),
            strategy,
            category,
        }
    }

    fn as_match(&self) -> RouteMatch {
        RouteMatch {
            rule: self.name,
            strategy: self.strategy,
            category: self.category,
        }
    }
}

static ROUTE_RULES: LazyLock<Vec<RouteRule>> = LazyLock::new(|| {
    vec![
        RouteRule::new(
            "static",
            r"^/(?:icons/|_next/static/|favicon\.ico$|manifest\.json$)",
            Strategy::CacheFirst,
            CacheCategory::Static,
        ),
        RouteRule::new(
            "auth",
            r"^/api/auth(?:/|$)",
            Strategy::NetworkOnly,
            CacheCategory::Api,
        ),
        RouteRule::new(
            "offline-api",
            r"^/api/(?:dhikrs|quran/chapters|prayer-times)(?:/|$)",
            Strategy::StaleWhileRevalidate,
            CacheCategory::Api,
        ),
        RouteRule::new(
            "api",
            r"^/api(?:/|$)",
            RequestClass::Api.network_first(),
            CacheCategory::Api,
        ),
        RouteRule::new(
            "audio",
            r"(?i)\.(?:mp3|ogg|wav|m4a|aac|opus)$",
            Strategy::CacheFirst,
            CacheCategory::Audio,
        ),
        RouteRule::new(
            "images",
            r"(?i)\.(?:png|jpe?g|gif|webp|svg|avif|ico)$",
            Strategy::StaleWhileRevalidate,
            CacheCategory::Images,
        ),
        RouteRule::new(
            "assets",
            r"(?i)\.(?:js|css|woff2?|ttf|json)$",
            RequestClass::Asset.network_first(),
            CacheCategory::Runtime,
        ),
    ]
});

const NAVIGATION: RouteMatch = RouteMatch {
    rule: "navigation",
    strategy: Strategy::NetworkFirst {
        timeout: NetworkConfig::NAVIGATION_TIMEOUT,
    },
    category: CacheCategory::Runtime,
};

/// Strip origin, query string and fragment, leaving an absolute path.
pub fn normalize_path(raw: &str) -> String {
    let raw = raw.trim();

    if let Ok(url) = Url::parse(raw) {
        if url.has_host() {
            return url.path().to_string();
        }
    }

    let end = raw.find(|c| c == '?' || c == '#').unwrap_or(raw.len());
    let path = &raw[..end];
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Resolve a request path to the first matching rule.
pub fn resolve(path: &str) -> RouteMatch {
    let path = normalize_path(path);
    ROUTE_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(&path))
        .map(RouteRule::as_match)
        .unwrap_or(NAVIGATION)
}

/// Describe the route table in priority order, fallback last.
pub fn descriptors() -> Vec<RouteDescriptor> {
    ROUTE_RULES
        .iter()
        .map(|rule| RouteDescriptor {
            rule: rule.name,
            pattern: rule.pattern.as_str().to_string(),
            strategy: rule.strategy.as_str(),
            timeout_ms: rule.strategy.timeout().map(|t| t.as_millis() as u64),
            category: rule.category,
        })
        .chain(std::iter::once(RouteDescriptor {
            rule: NAVIGATION.rule,
            pattern: ".*".to_string(),
            strategy: NAVIGATION.strategy.as_str(),
            timeout_ms: NAVIGATION.strategy.timeout().map(|t| t.as_millis() as u64),
            category: NAVIGATION.category,
        }))
        .collect()
}
