use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use webdelta_client::{BodyExtractor, JsonPointerExtractor, ReqwestFetcher};
use webdelta_core::models::{CacheEntry, CacheKey, CacheMap};
use webdelta_core::{Engine, EngineConfig, PollMode};
use webdelta_store::JsonFileStorage;

use crate::integration::common::{closed_port_url, fail_parse, spawn_site};

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_retry_backoff_unit(Duration::from_millis(10))
        .with_rate_limit_duration(Duration::from_millis(50))
}

fn fetcher() -> ReqwestFetcher {
    ReqwestFetcher::with_timeout(Duration::from_secs(5)).unwrap()
}

/// A cache file from an earlier run that already saw `/static`.
fn seed_cache_file(path: &std::path::Path, static_url: &str, changes_url: &str) {
    let mut entries = CacheMap::new();
    entries.insert(CacheKey::new(static_url, "body"), json!("static"));
    entries.insert(CacheKey::new(changes_url, "body"), json!(""));
    std::fs::write(
        path,
        serde_json::to_vec(&CacheEntry::from_map(&entries)).unwrap(),
    )
    .unwrap();
}

#[tokio::test]
async fn one_site() {
    let site = spawn_site().await;
    let engine = Engine::new(fetcher(), config());
    engine.register(site.url("/static"), Arc::new(BodyExtractor));

    let all = engine.get_all().await.unwrap().into_pairs();

    assert_eq!(all.len(), 1);
    assert_eq!(all[0].1, json!("static"));
}

#[tokio::test]
async fn urls_match_registered_sites() {
    let site = spawn_site().await;
    let sites = [site.url("/static"), site.url("/changes")];
    let engine = Engine::new(fetcher(), config());
    for url in &sites {
        engine.register(url.clone(), Arc::new(BodyExtractor));
    }

    for (url, _) in engine.get_all().await.unwrap().into_pairs() {
        assert!(sites.contains(&url));
    }
}

#[tokio::test]
async fn only_changes_are_reported() {
    let site = spawn_site().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("delta.json");
    seed_cache_file(&path, &site.url("/static"), &site.url("/changes"));

    let engine = Engine::with_storage(fetcher(), JsonFileStorage::new(&path), config());
    engine.load().await.unwrap();
    engine.register(site.url("/static"), Arc::new(BodyExtractor));
    engine.register(site.url("/changes"), Arc::new(BodyExtractor));

    let changes = engine.get_changes().await.unwrap().into_pairs();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, site.url("/changes"));
}

#[tokio::test]
async fn clear_restores_cold_start() {
    let site = spawn_site().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("delta.json");
    seed_cache_file(&path, &site.url("/static"), &site.url("/changes"));

    let engine = Engine::with_storage(fetcher(), JsonFileStorage::new(&path), config());
    engine.load().await.unwrap();
    engine.register(site.url("/static"), Arc::new(BodyExtractor));
    engine.register(site.url("/changes"), Arc::new(BodyExtractor));
    assert_eq!(engine.get_changes().await.unwrap().results.len(), 1);

    engine.clear().await.unwrap();
    engine.register(site.url("/static"), Arc::new(BodyExtractor));
    engine.register(site.url("/changes"), Arc::new(BodyExtractor));

    assert_eq!(engine.get_changes().await.unwrap().results.len(), 2);
}

#[tokio::test]
async fn new_and_all_agree_without_cache() {
    let site = spawn_site().await;
    let engine = Engine::new(fetcher(), config());
    engine.register(site.url("/static"), Arc::new(BodyExtractor));
    engine.register(site.url("/changes"), Arc::new(BodyExtractor));

    let new_results = engine.get_changes().await.unwrap();
    let all_results = engine.get_all().await.unwrap();

    assert_eq!(new_results.results.len(), all_results.results.len());
}

#[tokio::test]
async fn incomplete_response_is_retried() {
    let site = spawn_site().await;
    let engine = Engine::new(fetcher(), config());
    engine.register_fn(site.url("/fail"), "fail_parse", fail_parse);

    let all = engine.get_all().await.unwrap().into_pairs();

    assert_eq!(all[0].1, json!("fail"));
}

#[tokio::test]
async fn json_pointer_tracks_a_field() {
    let site = spawn_site().await;
    let engine = Engine::new(fetcher(), config());
    engine.register(
        site.url("/api/price"),
        Arc::new(JsonPointerExtractor::new("/data/price")),
    );

    let changes = engine.get_changes().await.unwrap().into_pairs();
    assert_eq!(changes, vec![(site.url("/api/price"), json!(10))]);
    assert!(engine.get_changes().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_site_is_isolated() {
    let site = spawn_site().await;
    let engine = Engine::new(fetcher(), config());
    engine.register(closed_port_url().await, Arc::new(BodyExtractor));
    engine.register(site.url("/static"), Arc::new(BodyExtractor));

    let report = engine.get_changes().await.unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.is_transport());
}

#[tokio::test]
async fn continuous_new_only_queues_changes() {
    let site = spawn_site().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("delta.json");
    seed_cache_file(&path, &site.url("/static"), &site.url("/changes"));

    let engine = Engine::with_storage(fetcher(), JsonFileStorage::new(&path), config());
    engine.load().await.unwrap();
    engine.register(site.url("/static"), Arc::new(BodyExtractor));
    engine.register(site.url("/changes"), Arc::new(BodyExtractor));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = engine.start(PollMode::ChangesOnly, tx).unwrap();

    let mut previous = None;
    for _ in 0..5 {
        let (url, value) = rx.recv().await.unwrap();
        assert_eq!(url, site.url("/changes"));
        assert_ne!(Some(&value), previous.as_ref());
        previous = Some(value);
    }

    engine.stop();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn continuous_all_includes_cached_values() {
    let site = spawn_site().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("delta.json");
    seed_cache_file(&path, &site.url("/static"), &site.url("/changes"));

    let engine = Engine::with_storage(fetcher(), JsonFileStorage::new(&path), config());
    engine.load().await.unwrap();
    engine.register(site.url("/static"), Arc::new(BodyExtractor));
    engine.register(site.url("/changes"), Arc::new(BodyExtractor));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = engine.start(PollMode::All, tx).unwrap();

    let mut values = Vec::new();
    for _ in 0..5 {
        values.push(rx.recv().await.unwrap().1);
    }

    handle.stop();
    handle.join().await.unwrap();

    assert!(values.contains(&json!("static")));
}
