//! End-to-end tests for the full fetch, rebuild, and query pipeline.

use hostblock::{
    AbortToken, BlockedIndex, Decision, EngineConfig, FilterEngine, FilterSource, IndexBuilder,
    IndexReader, RebuildOutcome, RebuildReport,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn config_with_sources(data_dir: &Path, urls: &[String]) -> EngineConfig {
    let mut config = EngineConfig::new(data_dir);
    config.sources = urls
        .iter()
        .map(|url| FilterSource {
            url: url.clone(),
            enabled: true,
        })
        .collect();
    config
}

fn wait_for_generation(engine: &FilterEngine, at_least: u64) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.stats().index_generation < at_least && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(engine.stats().index_generation >= at_least, "timed out");
}

#[test]
fn test_full_pipeline_from_hosts_files() {
    let dir = tempfile::tempdir().unwrap();
    let list_a = dir.path().join("a.txt");
    let list_b = dir.path().join("b.txt");
    fs::write(
        &list_a,
        "# upstream list\n127.0.0.1 localhost\n0.0.0.0 ads.example.com\n*.tracker.net\n",
    )
    .unwrap();
    fs::write(&list_b, "ads.example.com\nmore-ads.example.org\n").unwrap();

    let config = config_with_sources(
        &dir.path().join("data"),
        &[file_url(&list_a), file_url(&list_b)],
    );
    let engine = FilterEngine::start(config).unwrap();
    wait_for_generation(&engine, 1);

    // exact, subdomain, wildcard-sourced, and unlisted lookups
    assert_eq!(engine.decide("ads.example.com"), Decision::Blocked);
    assert_eq!(engine.decide("deep.sub.ads.example.com"), Decision::Blocked);
    assert_eq!(engine.decide("tracker.net"), Decision::Blocked);
    assert_eq!(engine.decide("x.tracker.net"), Decision::Blocked);
    assert_eq!(engine.decide("localhost"), Decision::Allowed);
    assert_eq!(engine.decide("example.com"), Decision::Allowed);

    // ads.example.com appeared in both lists, indexed once
    assert_eq!(engine.stats().index_entries, 3);
    engine.stop();
}

#[test]
fn test_overrides_full_grammar() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("list.txt");
    fs::write(&list, "ads.example.com\ncdn.example.com\n").unwrap();

    let data_dir = dir.path().join("data");
    let config = config_with_sources(&data_dir, &[file_url(&list)]);
    let engine = FilterEngine::start(config).unwrap();
    wait_for_generation(&engine, 1);

    engine
        .set_overrides(&[
            hostblock::overrides::parse_line("!cdn.example.com").unwrap(),
            hostblock::overrides::parse_line("*.badstuff.example").unwrap(),
            hostblock::overrides::parse_line(">router.lan 192.168.1.1").unwrap(),
        ])
        .unwrap();

    assert_eq!(engine.decide("cdn.example.com"), Decision::Allowed);
    assert_eq!(engine.decide("ads.example.com"), Decision::Blocked);
    assert_eq!(engine.decide("a.badstuff.example"), Decision::Blocked);
    assert_eq!(
        engine.decide("router.lan"),
        Decision::MappedTo("192.168.1.1".parse().unwrap())
    );
    engine.stop();

    // overrides were persisted; a fresh engine restores them from disk
    let engine = FilterEngine::start(config_with_sources(&data_dir, &[file_url(&list)])).unwrap();
    assert_eq!(engine.decide("cdn.example.com"), Decision::Allowed);
    assert_eq!(
        engine.decide("router.lan"),
        Decision::MappedTo("192.168.1.1".parse().unwrap())
    );
    engine.stop();
}

#[test]
fn test_persist_and_reopen_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let index_path = dir.path().join("hosts.idx");

    let mut builder = IndexBuilder::new();
    for i in 0..1000 {
        builder.prepare_insert(&format!("host{}.example.com", i));
    }
    builder.final_prepare();
    for i in 0..1000 {
        assert!(builder.add(&format!("host{}.example.com", i)));
    }
    builder.persist(&index_path).unwrap();

    let reader = IndexReader::open(&index_path, false).unwrap();
    assert_eq!(reader.entry_count(), 1000);
    assert!(reader.contains("host42.example.com"));
    assert!(reader.contains("www.host999.example.com"));
    assert!(!reader.contains("host1000.example.com"));
}

#[test]
fn test_rebuild_counts_and_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::new(dir.path());
    let paths = config.paths();
    fs::write(&paths.canonical, "ads.com\ntracker.net\nads.com\n").unwrap();

    let index = BlockedIndex::empty(100, 100);
    let outcome =
        hostblock::rebuild::rebuild_index(&config, &paths, &index, &AbortToken::new()).unwrap();
    assert_eq!(
        outcome,
        RebuildOutcome::Completed(RebuildReport {
            processed: 3,
            unique_entries: 2
        })
    );
}

#[test]
fn test_decisions_stable_under_concurrent_reload() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("list.txt");
    fs::write(&list, "stable.example.com\n").unwrap();

    let config = config_with_sources(&dir.path().join("data"), &[file_url(&list)]);
    let engine = Arc::new(FilterEngine::start(config).unwrap());
    wait_for_generation(&engine, 1);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(std::thread::spawn(move || {
            for _ in 0..2000 {
                assert_eq!(engine.decide("stable.example.com"), Decision::Blocked);
            }
        }));
    }

    for _ in 0..5 {
        engine.trigger_reload_now();
        std::thread::sleep(Duration::from_millis(10));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.stop(),
        Err(_) => panic!("engine still shared"),
    }
}

#[test]
fn test_crash_marker_forces_rebuild_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("list.txt");
    fs::write(&list, "ads.example.com\n").unwrap();
    let data_dir = dir.path().join("data");
    let urls = vec![file_url(&list)];

    let engine = FilterEngine::start(config_with_sources(&data_dir, &urls)).unwrap();
    wait_for_generation(&engine, 1);
    engine.stop();

    // simulate a crash between list download and index rebuild
    let paths = EngineConfig::new(&data_dir).paths();
    fs::write(&paths.outdated_marker, b"x").unwrap();
    fs::write(
        &paths.canonical,
        format!(
            "{}\nfresh.example.com\n",
            fs::read_to_string(&paths.canonical)
                .unwrap()
                .lines()
                .next()
                .unwrap()
        ),
    )
    .unwrap();

    let engine = FilterEngine::start(config_with_sources(&data_dir, &urls)).unwrap();
    assert_eq!(engine.decide("fresh.example.com"), Decision::Blocked);
    assert_eq!(engine.decide("ads.example.com"), Decision::Allowed);
    assert!(!paths.outdated_marker.exists());
    engine.stop();
}

#[test]
fn test_yaml_config_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("list.txt");
    fs::write(&list, "ads.example.com\n").unwrap();

    let config_path = dir.path().join("hostblock.yaml");
    fs::write(
        &config_path,
        format!(
            "data_dir: {}\nreload_interval_days: 2\nsources:\n  - url: {}\n  - url: https://disabled.example/hosts\n    enabled: false\n",
            dir.path().join("data").display(),
            file_url(&list),
        ),
    )
    .unwrap();

    let config = EngineConfig::from_yaml_file(&config_path).unwrap();
    assert_eq!(config.reload_interval_days, 2);
    assert_eq!(config.enabled_urls().len(), 1);

    let engine = FilterEngine::start(config).unwrap();
    wait_for_generation(&engine, 1);
    assert_eq!(engine.decide("ads.example.com"), Decision::Blocked);
    engine.stop();
}
