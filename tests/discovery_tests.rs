mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use backend_scout::candidates::CandidateStore;
use backend_scout::storage::{
    KeyValueStore, MemoryStore, KEY_BACKEND_NAME, KEY_BACKEND_URL, KEY_CANDIDATES,
};
use backend_scout::{
    Address, BackendInfo, DiscoveryConfig, DiscoveryEngine, DiscoveryError, NextStep,
    ProbeLedger, ScanProgress,
};
use common::FakeProber;

fn engine_with(
    prober: Arc<FakeProber>,
    storage: Arc<dyn KeyValueStore>,
    config: DiscoveryConfig,
) -> Arc<DiscoveryEngine<FakeProber>> {
    let candidates = Arc::new(CandidateStore::open(storage.clone()));
    Arc::new(DiscoveryEngine::from_parts(
        config,
        prober,
        Arc::new(ProbeLedger::new()),
        candidates,
        storage,
    ))
}

fn engine_for(prober: Arc<FakeProber>) -> Arc<DiscoveryEngine<FakeProber>> {
    engine_with(prober, Arc::new(MemoryStore::new()), DiscoveryConfig::default())
}

fn addresses(list: &[&str]) -> Vec<Address> {
    list.iter().map(|s| Address::from_raw(*s)).collect()
}

#[tokio::test]
async fn quick_targets_collect_every_seed_once() {
    let storage = Arc::new(MemoryStore::new());
    storage.set(KEY_BACKEND_URL, "http://10.1.1.1:3000").unwrap();
    storage
        .set(
            KEY_CANDIDATES,
            r#"["http://10.1.1.1:3000", "10.1.1.2:4000", "exa mple", ""]"#,
        )
        .unwrap();
    let config = DiscoveryConfig::default().with_self_host("192.168.5.20");
    let engine = engine_with(Arc::new(FakeProber::new()), storage, config);

    assert_eq!(
        engine.quick_targets(),
        addresses(&[
            "http://192.168.5.20:3000",
            "http://localhost:3000",
            "http://127.0.0.1:3000",
            "http://10.1.1.1:3000",
            "http://10.1.1.2:4000",
        ])
    );
}

#[tokio::test]
async fn quick_discover_collapses_loopback_spellings() {
    let prober = FakeProber::new()
        .with_backend("http://localhost:3000", "Local", true)
        .with_backend("http://127.0.0.1:3000", "Local", true);
    let engine = engine_for(Arc::new(prober));

    let found = engine.quick_discover().await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].info.address.canonical_key().as_str(), "local:3000");
    assert!(!found[0].is_new);
    let candidates = engine.candidates().list();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].canonical_key().as_str(), "local:3000");
}

#[tokio::test(start_paused = true)]
async fn quick_discover_debounces_repeat_probes() {
    let prober = Arc::new(FakeProber::new().with_backend("http://localhost:3000", "Local", true));
    let engine = engine_for(prober.clone());

    engine.quick_discover().await;
    engine.quick_discover().await;
    assert_eq!(prober.call_count("http://localhost:3000"), 1);
    assert_eq!(prober.call_count("http://127.0.0.1:3000"), 1);

    tokio::time::advance(Duration::from_millis(2999)).await;
    engine.quick_discover().await;
    assert_eq!(prober.call_count("http://localhost:3000"), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    engine.quick_discover().await;
    assert_eq!(prober.call_count("http://localhost:3000"), 2);
    assert_eq!(engine.results().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_quick_discoveries_send_one_request() {
    let prober = Arc::new(
        FakeProber::new()
            .with_backend("http://localhost:3000", "Local", true)
            .with_delay(Duration::from_millis(500)),
    );
    let engine = engine_for(prober.clone());

    let (first, _) = tokio::join!(engine.quick_discover(), engine.quick_discover());

    assert_eq!(prober.call_count("http://localhost:3000"), 1);
    assert_eq!(prober.call_count("http://127.0.0.1:3000"), 1);
    assert_eq!(first.len(), 1);
}

#[tokio::test]
async fn malformed_prefixes_send_nothing() {
    let prober = Arc::new(FakeProber::new());
    let engine = engine_for(prober.clone());

    for bad in ["192.168", "192.168.1.", "192.168.1.1", "300.1.1", "abc", ""] {
        let err = engine.scan_subnet(bad).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPrefix(_)), "{bad:?}: {err}");
    }
    assert!(prober.calls().is_empty());
    assert!(!engine.progress().is_running());
}

#[tokio::test]
async fn scan_probes_every_host_once_and_reports() {
    let prober = Arc::new(
        FakeProber::new()
            .with_backend("http://192.168.1.7:3000", "Booth", true)
            .with_backend("http://192.168.1.200:3000", "Stage", false),
    );
    let engine = engine_for(prober.clone());

    let summary = engine.scan_subnet("192.168.1").await.unwrap();

    assert_eq!(summary.total, 255);
    assert_eq!(summary.completed, 255);
    let names: HashSet<_> = summary.found.iter().map(|b| b.display_name.as_str()).collect();
    assert_eq!(names, HashSet::from(["Booth", "Stage"]));
    assert!(summary
        .to_string()
        .starts_with("Found 2 backend(s) on 192.168.1.0/24: "));

    let calls = prober.calls();
    assert_eq!(calls.len(), 255);
    let unique: HashSet<String> = calls.iter().map(|a| a.to_string()).collect();
    assert_eq!(unique.len(), 255);
    for i in 1..=255 {
        assert!(
            unique.contains(&format!("http://192.168.1.{i}:3000")),
            "host .{i} not probed"
        );
    }

    let results = engine.results().await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|b| b.is_new));
    assert_eq!(engine.candidates().list().len(), 2);
    assert_eq!(engine.progress(), ScanProgress::idle());
}

#[tokio::test]
async fn empty_subnet_reports_none_found() {
    let engine = engine_for(Arc::new(FakeProber::new()));

    let summary = engine.scan_subnet("10.20.30").await.unwrap();

    assert!(summary.found.is_empty());
    assert_eq!(summary.completed, 255);
    assert_eq!(summary.to_string(), "No backends found on 10.20.30.0/24");
    assert!(engine.candidates().list().is_empty());
}

#[tokio::test]
async fn scan_ignores_quick_discovery_debounce() {
    let prober = Arc::new(FakeProber::new().with_backend("http://10.9.9.5:3000", "Known", true));
    let engine = engine_with(
        prober.clone(),
        Arc::new(MemoryStore::new()),
        DiscoveryConfig::default().with_self_host("10.9.9.5"),
    );

    engine.quick_discover().await;
    let summary = engine.scan_subnet("10.9.9").await.unwrap();

    assert_eq!(prober.call_count("http://10.9.9.5:3000"), 2);
    assert_eq!(summary.found.len(), 1);
    // Already listed by quick discovery, so the sweep does not badge it.
    let results = engine.results().await;
    assert_eq!(results.len(), 1);
    assert!(!results[0].is_new);
}

#[tokio::test(start_paused = true)]
async fn scan_progress_is_monotonic_and_resets() {
    let prober = FakeProber::new()
        .with_backend("http://10.0.0.42:3000", "Deck", true)
        .with_delay(Duration::from_millis(10));
    let engine = engine_for(Arc::new(prober));

    let mut rx = engine.subscribe_progress();
    let scan = tokio::spawn({
        let engine = engine.clone();
        async move { engine.scan_subnet("10.0.0").await }
    });

    let mut seen = Vec::new();
    while rx.changed().await.is_ok() {
        let p = *rx.borrow_and_update();
        if !p.is_running() {
            break;
        }
        assert_eq!(p.total, 255);
        seen.push(p.completed);
    }

    let summary = scan.await.unwrap().unwrap();
    assert_eq!(summary.completed, 255);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().all(|&c| c <= 255));
    assert!(!engine.progress().is_running());
}

#[tokio::test]
async fn manual_add_rejects_bad_input_without_probing() {
    let prober = Arc::new(FakeProber::new());
    let engine = engine_for(prober.clone());

    let err = engine.add_manual("   ").await.unwrap_err();

    assert!(matches!(err, DiscoveryError::InvalidAddress(_)));
    assert!(prober.calls().is_empty());
}

#[tokio::test]
async fn select_backend_stores_choice_and_clears_session() {
    let storage = Arc::new(MemoryStore::new());
    for key in ["token", "role", "username"] {
        storage.set(key, "stale").unwrap();
    }
    let engine = engine_with(
        Arc::new(FakeProber::new()),
        storage.clone(),
        DiscoveryConfig::default(),
    );

    let info = BackendInfo {
        address: Address::from_raw("http://10.0.0.3:3000"),
        display_name: "Fresh box".to_string(),
        initialized: false,
    };
    assert_eq!(engine.select_backend(&info).unwrap(), NextStep::Initialize);

    assert_eq!(
        storage.get(KEY_BACKEND_URL).unwrap().as_deref(),
        Some("http://10.0.0.3:3000")
    );
    assert_eq!(
        storage.get(KEY_BACKEND_NAME).unwrap().as_deref(),
        Some("Fresh box")
    );
    for key in ["token", "role", "username"] {
        assert_eq!(storage.get(key).unwrap(), None);
    }
    assert_eq!(engine.saved_backend(), Some(info.address.clone()));

    let ready = BackendInfo {
        initialized: true,
        ..info
    };
    assert_eq!(engine.select_backend(&ready).unwrap(), NextStep::Login);
}
