use std::sync::Arc;

use serde_json::json;
use webdelta_core::testutil::{MockExtractor, MockFetcher};
use webdelta_core::traits::CacheStorage;
use webdelta_core::{Engine, EngineConfig};
use webdelta_store::JsonFileStorage;

use crate::integration::common::{cache_map, scratch_cache_file, write_cache_file};

const STATIC: &str = "http://localhost:5000/static";
const CHANGES: &str = "http://localhost:5000/changes";

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_retry_limit(1)
        .with_wait_between_retries(false)
}

fn fetcher() -> MockFetcher {
    MockFetcher::new("x")
        .route(STATIC, &["static"])
        .route(CHANGES, &["changes 1", "changes 2"])
}

fn register_both(engine: &Engine<MockFetcher, JsonFileStorage>) {
    engine.register(STATIC, Arc::new(MockExtractor::passthrough("fake_parse")));
    engine.register(CHANGES, Arc::new(MockExtractor::passthrough("fake_parse")));
}

#[tokio::test]
async fn previous_run_cache_limits_changes() {
    let (_dir, path) = scratch_cache_file();
    write_cache_file(
        &path,
        &cache_map(&[
            (STATIC, "fake_parse", json!("static")),
            (CHANGES, "fake_parse", json!("")),
        ]),
    );

    let engine = Engine::with_storage(fetcher(), JsonFileStorage::new(&path), config());
    engine.load().await.unwrap();
    register_both(&engine);

    let pairs = engine.get_changes().await.unwrap().into_pairs();
    assert_eq!(pairs, vec![(CHANGES.to_string(), json!("changes 1"))]);
}

#[tokio::test]
async fn cycle_results_survive_a_restart() {
    let (_dir, path) = scratch_cache_file();

    let first = Engine::with_storage(fetcher(), JsonFileStorage::new(&path), config());
    first.load().await.unwrap();
    register_both(&first);
    assert_eq!(first.get_changes().await.unwrap().results.len(), 2);

    // Same pages, fresh engine: everything is already known.
    let stable = MockFetcher::new("x")
        .route(STATIC, &["static"])
        .route(CHANGES, &["changes 1"]);
    let second = Engine::with_storage(stable, JsonFileStorage::new(&path), config());
    second.load().await.unwrap();
    register_both(&second);

    assert!(second.get_changes().await.unwrap().is_empty());
    assert_eq!(second.snapshot().len(), 2);
}

#[tokio::test]
async fn clear_deletes_the_cache_file() {
    let (_dir, path) = scratch_cache_file();
    let engine = Engine::with_storage(fetcher(), JsonFileStorage::new(&path), config());
    register_both(&engine);
    engine.get_changes().await.unwrap();
    assert!(path.exists());

    engine.clear().await.unwrap();

    assert!(!path.exists());
    assert!(JsonFileStorage::new(&path).load().await.unwrap().is_none());
}
