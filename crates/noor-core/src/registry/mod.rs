//! Cache version registry.
//!
//! Single source of truth mapping abstract cache intent to concrete versioned
//! cache names and retention policies:
//! - [`CacheCategory`] is a closed set of logical caches
//! - [`CacheName`] is `{category}-{version}`; a new version orphans every old name
//! - [`Strategy`] is chosen per request path from a prioritized route table
//!
//! The registry is pure configuration. The network-interception layer performs
//! all fetch and cache I/O with the values it returns.

mod routes;
mod version;

pub use routes::{normalize_path, RequestClass, RouteDescriptor, RouteMatch, Strategy};
pub use version::BuildVersion;

use crate::error::NoorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

const DAY_SECS: u64 = 24 * 60 * 60;

/// Logical grouping of cached content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Static,
    Runtime,
    Api,
    Images,
    Audio,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 5] = [
        CacheCategory::Static,
        CacheCategory::Runtime,
        CacheCategory::Api,
        CacheCategory::Images,
        CacheCategory::Audio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Static => "static",
            CacheCategory::Runtime => "runtime",
            CacheCategory::Api => "api",
            CacheCategory::Images => "images",
            CacheCategory::Audio => "audio",
        }
    }

    /// Retention policy for this category.
    pub fn policy(&self) -> CachePolicy {
        let (expiration_secs, max_entries) = match self {
            CacheCategory::Static => (30 * DAY_SECS, 128),
            CacheCategory::Runtime => (DAY_SECS, 64),
            CacheCategory::Api => (DAY_SECS, 100),
            CacheCategory::Images => (30 * DAY_SECS, 60),
            CacheCategory::Audio => (7 * DAY_SECS, 20),
        };
        CachePolicy {
            expiration: Duration::from_secs(expiration_secs),
            max_entries: NonZeroU32::new(max_entries).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl FromStr for CacheCategory {
    type Err = NoorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == lower)
            .ok_or_else(|| NoorError::Validation {
                field: "category".to_string(),
                message: format!("unknown cache category '{}'", s),
            })
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expiration and size bound of one cache category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CachePolicy {
    /// How long a single entry stays fresh after insertion.
    #[serde(rename = "expiration_seconds", serialize_with = "serialize_secs")]
    pub expiration: Duration,
    /// Maximum entries held; insertion past it evicts the oldest first.
    pub max_entries: NonZeroU32,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Versioned cache name, `{category}-{version}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheName(String);

impl CacheName {
    fn new(category: CacheCategory, version: &BuildVersion) -> Self {
        Self(format!("{}-{}", category.as_str(), version.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Route resolution including the target cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub rule: &'static str,
    pub strategy: Strategy,
    pub category: CacheCategory,
    pub cache_name: CacheName,
}

/// One category's entry in the cache manifest.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryManifest {
    pub category: CacheCategory,
    pub cache_name: CacheName,
    #[serde(flatten)]
    pub policy: CachePolicy,
}

/// Everything the service worker needs to know about the current build's caches.
#[derive(Debug, Clone, Serialize)]
pub struct CacheManifest {
    pub version: BuildVersion,
    pub caches: Vec<CategoryManifest>,
    pub routes: Vec<RouteDescriptor>,
}

/// Maps cache categories and request paths to versioned cache names and policies.
#[derive(Debug, Clone)]
pub struct CacheRegistry {
    version: BuildVersion,
}

impl CacheRegistry {
    /// Create a registry for one build's version.
    pub fn new(version: BuildVersion) -> Self {
        Self { version }
    }

    pub fn current_version(&self) -> &BuildVersion {
        &self.version
    }

    pub fn cache_name_for(&self, category: CacheCategory) -> CacheName {
        CacheName::new(category, &self.version)
    }

    pub fn policy_for(&self, category: CacheCategory) -> CachePolicy {
        category.policy()
    }

    /// Caching strategy for a request path or absolute URL.
    pub fn strategy_for(&self, request_path: &str) -> Strategy {
        routes::resolve(request_path).strategy
    }

    /// Strategy, category and cache name for a request in one lookup.
    pub fn route_for(&self, request_path: &str) -> ResolvedRoute {
        let RouteMatch {
            rule,
            strategy,
            category,
        } = routes::resolve(request_path);
        ResolvedRoute {
            rule,
            strategy,
            category,
            cache_name: self.cache_name_for(category),
        }
    }

    /// Every cache name of the current version.
    pub fn cache_names(&self) -> Vec<CacheName> {
        CacheCategory::ALL
            .into_iter()
            .map(|category| self.cache_name_for(category))
            .collect()
    }

    /// Whether `name` is one of ours from a different version.
    ///
    /// Ours means a known category prefix followed by a stamped version token.
    /// Anything else (`images-cache`, `static-image-assets`) belongs to someone
    /// else and is never reported as an orphan.
    pub fn is_orphaned(&self, name: &str) -> bool {
        CacheCategory::ALL.into_iter().any(|category| {
            name.strip_prefix(category.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
                .is_some_and(|version| {
                    version != self.version.as_str() && BuildVersion::is_stamped(version)
                })
        })
    }

    /// Filter existing cache names down to the orphans.
    pub fn orphaned<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| self.is_orphaned(name))
            .map(str::to_string)
            .collect()
    }

    pub fn manifest(&self) -> CacheManifest {
        CacheManifest {
            version: self.version.clone(),
            caches: CacheCategory::ALL
                .into_iter()
                .map(|category| CategoryManifest {
                    category,
                    cache_name: self.cache_name_for(category),
                    policy: category.policy(),
                })
                .collect(),
            routes: routes::descriptors(),
        }
    }
}
