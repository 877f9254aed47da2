//! Build-scoped version token.

use crate::config::BuildConfig;
use crate::error::{NoorError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// `<build-id-prefix>-<YYYYMMDDHHMMSS>` as produced by [`BuildVersion::new`].
static STAMPED_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]{1,8}-[0-9]{14}$").expect("stamped token pattern must compile")
});

/// Opaque version token namespacing every cache of one build.
///
/// Built once per build or deploy as `<build-id-prefix>-<YYYYMMDDHHMMSS>` and
/// never regenerated at runtime. Hand it to the registry by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildVersion(String);

impl BuildVersion {
    /// Build a version from a raw build identifier and a build timestamp.
    ///
    /// The identifier is trimmed and cut to its first
    /// [`BuildConfig::BUILD_ID_PREFIX_LEN`] characters.
    pub fn new(build_id: &str, built_at: DateTime<Utc>) -> Result<Self> {
        let build_id = build_id.trim();
        if build_id.is_empty() {
            return Err(NoorError::InvalidVersion(
                "build identifier is empty".to_string(),
            ));
        }
        validate_token_chars(build_id)?;

        let prefix: String = build_id
            .chars()
            .take(BuildConfig::BUILD_ID_PREFIX_LEN)
            .collect();
        let stamp = built_at.format(BuildConfig::TIMESTAMP_FORMAT);

        Ok(Self(format!("{}-{}", prefix, stamp)))
    }

    /// Build a version from the `NOOR_BUILD_ID` environment variable, stamped now.
    ///
    /// Falls back to the development build id when the variable is unset.
    pub fn from_env() -> Result<Self> {
        let build_id = std::env::var(BuildConfig::BUILD_ID_ENV)
            .unwrap_or_else(|_| BuildConfig::DEV_BUILD_ID.to_string());
        Self::new(&build_id, Utc::now())
    }

    /// Accept an already-formed token, e.g. one emitted by an earlier pipeline step.
    pub fn parse(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(NoorError::InvalidVersion("token is empty".to_string()));
        }
        validate_token_chars(token)?;
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `token` has the shape of a token built by [`BuildVersion::new`].
    pub fn is_stamped(token: &str) -> bool {
        STAMPED_TOKEN.is_match(token)
    }
}

fn validate_token_chars(value: &str) -> Result<()> {
    match value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        Some(bad) => Err(NoorError::InvalidVersion(format!(
            "'{}' contains unsupported character '{}'",
            value, bad
        ))),
        None => Ok(()),
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BuildVersion {
    type Error = NoorError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<BuildVersion> for String {
    fn from(version: BuildVersion) -> Self {
        version.0
    }
}
