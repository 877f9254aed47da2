//! Integration tests for cache naming and routing across builds.

use chrono::{TimeZone, Utc};
use noor_core::{
    render_service_worker, BuildVersion, CacheCategory, CacheRegistry, ResponseCache, SqliteCache,
    Strategy,
};

fn registry_at(build: &str, hour: u32) -> CacheRegistry {
    let built_at = Utc.with_ymd_and_hms(2026, 10, 16, hour, 0, 0).unwrap();
    CacheRegistry::new(BuildVersion::new(build, built_at).unwrap())
}

#[test]
fn test_same_build_yields_same_names() {
    let a = registry_at("9c1e2f7a3b", 8);
    let b = registry_at("9c1e2f7a3b", 8);

    assert_eq!(a.current_version(), b.current_version());
    assert_eq!(a.cache_names(), b.cache_names());
}

#[test]
fn test_redeploy_of_same_commit_still_changes_names() {
    let first = registry_at("9c1e2f7a3b", 8);
    let redeploy = registry_at("9c1e2f7a3b", 9);

    for category in CacheCategory::ALL {
        let old_name = first.cache_name_for(category);
        assert_ne!(old_name, redeploy.cache_name_for(category));
        assert!(redeploy.is_orphaned(old_name.as_str()));
    }
}

#[test]
fn test_first_matching_rule_wins_regardless_of_query() {
    let registry = registry_at("abc", 1);
    let cases = [
        ("/icons/apple-touch-icon.png", Strategy::CacheFirst),
        ("/icons/apple-touch-icon.png?v=3", Strategy::CacheFirst),
        ("/api/dhikrs?userId=u1", Strategy::StaleWhileRevalidate),
        ("/api/quran/chapters/2?lang=ar", Strategy::StaleWhileRevalidate),
        ("/api/auth/callback?code=x", Strategy::NetworkOnly),
        ("https://noor.app/api/prayer-times?method=4", Strategy::StaleWhileRevalidate),
    ];

    for (path, expected) in cases {
        assert_eq!(registry.strategy_for(path), expected, "{}", path);
    }
}

#[test]
fn test_deploy_flow_purges_previous_caches() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("responses.sqlite");

    let previous = ResponseCache::new(registry_at("aaaa", 1), SqliteCache::new(&db_path).unwrap());
    previous.store_response("/api/dhikrs", b"[]").unwrap();
    previous.store_response("/audio/001.mp3", b"id3").unwrap();

    let current = ResponseCache::new(registry_at("bbbb", 2), SqliteCache::new(&db_path).unwrap());
    assert!(current.lookup_request("/api/dhikrs").unwrap().is_none());
    assert_eq!(current.purge_orphaned_caches().unwrap(), 2);

    let worker = render_service_worker(
        "const CACHE_VERSION = '__SW_VERSION__';",
        current.registry(),
    )
    .unwrap();
    assert!(worker
        .source
        .contains(current.registry().current_version().as_str()));
}
