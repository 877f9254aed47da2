//! Service worker rendering.
//!
//! Build-time step that stamps a service worker template with the current
//! version token and cache manifest, then hashes the output so the deploy
//! pipeline can tell whether the worker actually changed.

use crate::config::ServiceWorkerConfig;
use crate::error::{NoorError, Result};
use crate::registry::CacheRegistry;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// A rendered service worker and its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedWorker {
    pub source: String,
    /// Leading hex characters of the SHA-256 of `source`.
    pub content_hash: String,
}

/// Substitute the version and manifest placeholders in `template`.
///
/// The version placeholder is required; the manifest placeholder is optional.
pub fn render_service_worker(template: &str, registry: &CacheRegistry) -> Result<RenderedWorker> {
    if !template.contains(ServiceWorkerConfig::VERSION_PLACEHOLDER) {
        return Err(NoorError::Config {
            message: format!(
                "service worker template has no {} placeholder",
                ServiceWorkerConfig::VERSION_PLACEHOLDER
            ),
        });
    }

    let mut source = template.replace(
        ServiceWorkerConfig::VERSION_PLACEHOLDER,
        registry.current_version().as_str(),
    );
    if source.contains(ServiceWorkerConfig::MANIFEST_PLACEHOLDER) {
        let manifest = serde_json::to_string(&registry.manifest())?;
        source = source.replace(ServiceWorkerConfig::MANIFEST_PLACEHOLDER, &manifest);
    }

    let content_hash = content_hash(&source);
    Ok(RenderedWorker {
        source,
        content_hash,
    })
}

/// Render `template_path` into `output_path`.
pub fn render_service_worker_file(
    template_path: &Path,
    output_path: &Path,
    registry: &CacheRegistry,
) -> Result<RenderedWorker> {
    let template = std::fs::read_to_string(template_path)
        .map_err(|e| NoorError::io_with_path(e, template_path))?;
    let rendered = render_service_worker(&template, registry)?;

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| NoorError::io_with_path(e, parent))?;
    }
    std::fs::write(output_path, &rendered.source)
        .map_err(|e| NoorError::io_with_path(e, output_path))?;

    info!(
        "Rendered service worker {} (version {}, hash {})",
        output_path.display(),
        registry.current_version(),
        rendered.content_hash
    );
    Ok(rendered)
}

fn content_hash(source: &str) -> String {
    let digest = hex::encode(Sha256::digest(source.as_bytes()));
    digest[..ServiceWorkerConfig::CONTENT_HASH_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BuildVersion;
    use tempfile::TempDir;

    const TEMPLATE: &str = r#"const VERSION = "__SW_VERSION__";
const MANIFEST = __CACHE_MANIFEST__;
self.addEventListener("activate", () => cleanupOutdatedCaches(VERSION));
"#;

    fn registry(version: &str) -> CacheRegistry {
        CacheRegistry::new(BuildVersion::parse(version).unwrap())
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let rendered = render_service_worker(TEMPLATE, &registry("v7")).unwrap();

        assert!(rendered.source.contains(r#"const VERSION = "v7";"#));
        assert!(!rendered.source.contains("__CACHE_MANIFEST__"));
        assert!(rendered.source.contains(r#""cache_name":"api-v7""#));
        assert_eq!(rendered.content_hash.len(), 16);
    }

    #[test]
    fn test_hash_tracks_version() {
        let a = render_service_worker(TEMPLATE, &registry("v1")).unwrap();
        let a_again = render_service_worker(TEMPLATE, &registry("v1")).unwrap();
        let b = render_service_worker(TEMPLATE, &registry("v2")).unwrap();

        assert_eq!(a, a_again);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_missing_version_placeholder_is_rejected() {
        let err = render_service_worker("self.skipWaiting();", &registry("v1")).unwrap_err();
        assert!(matches!(err, NoorError::Config { .. }));
    }

    #[test]
    fn test_render_file() {
        let temp = TempDir::new().unwrap();
        let template_path = temp.path().join("sw.template.js");
        let output_path = temp.path().join("public/sw.js");
        std::fs::write(&template_path, TEMPLATE).unwrap();

        let rendered =
            render_service_worker_file(&template_path, &output_path, &registry("v3")).unwrap();
        assert_eq!(std::fs::read_to_string(&output_path).unwrap(), rendered.source);

        let missing = render_service_worker_file(
            &temp.path().join("nope.js"),
            &output_path,
            &registry("v3"),
        );
        assert!(matches!(missing, Err(NoorError::Io { .. })));
    }
}
