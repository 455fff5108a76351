use async_trait::async_trait;
use classifier_client::TopicClassifier;
use config_store::{analysis_key, ClassificationCache, ConfigStore, MemoryStore, Settings};
use feed_scanner::{
    CycleOutcome, CycleReport, FeedSnapshot, LivenessFlag, ScanContext, ScanLoop, ScoreSource,
    SnapshotDocument, SnapshotNode, VisibilityOutcome,
};
use feedguard_core::{ClassificationResult, ScanConfig, TopicRule};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Answers with canned scores keyed by post text and counts every call.
#[derive(Default)]
struct ScriptedClassifier {
    scores: HashMap<String, Value>,
    panic_on: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    fn with_scores(scores: &[(&str, Value)]) -> Self {
        Self {
            scores: scores
                .iter()
                .map(|(text, value)| (text.to_string(), value.clone()))
                .collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopicClassifier for ScriptedClassifier {
    async fn classify(&self, text: &str, _credential: &str, _rules: &[TopicRule]) -> ClassificationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on.as_deref() == Some(text) {
            panic!("classifier blew up on {:?}", text);
        }
        self.scores
            .get(text)
            .cloned()
            .and_then(ClassificationResult::from_value)
            .unwrap_or_default()
    }
}

fn post(id: &str, text: &str) -> SnapshotNode {
    SnapshotNode::new("div").attr("data-testid", "cellInnerDiv").child(
        SnapshotNode::new("article")
            .attr("data-testid", "tweet")
            .child(SnapshotNode::new("a").attr("href", format!("/someone/status/{}", id)))
            .child(
                SnapshotNode::new("div")
                    .attr("data-testid", "tweetText")
                    .text(text),
            ),
    )
}

fn page(hostname: &str, posts: Vec<SnapshotNode>) -> Arc<SnapshotDocument> {
    Arc::new(SnapshotDocument::from_snapshot(FeedSnapshot {
        hostname: hostname.to_string(),
        body: posts,
    }))
}

fn feed() -> Arc<SnapshotDocument> {
    page(
        "x.com",
        vec![
            post("1", "election night"),
            post("2", "policy debate recap"),
            post("3", "cat picture"),
            post("4", "everything is terrible"),
        ],
    )
}

fn classifier() -> ScriptedClassifier {
    ScriptedClassifier::with_scores(&[
        ("election night", json!({"politics": 0.95})),
        ("policy debate recap", json!({"politics": 0.5})),
        ("cat picture", json!({})),
        ("everything is terrible", json!({"negativity": 0.95, "politics": 0.1})),
    ])
}

fn rules() -> Vec<TopicRule> {
    vec![
        TopicRule::new("negativity", "overly negative sentiment", 0.9).unwrap(),
        TopicRule::new("politics", "political subjects", 0.8).unwrap(),
    ]
}

fn unthrottled() -> ScanConfig {
    ScanConfig {
        interval_ms: 0,
        reload_delay_ms: 10,
        ..Default::default()
    }
}

async fn configured_store(rules: &[TopicRule], credential: Option<&str>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let settings = Settings::new(store.clone());
    if !rules.is_empty() {
        settings.save_topic_rules(rules).await.unwrap();
    }
    if let Some(credential) = credential {
        settings.set_credential(credential).await.unwrap();
    }
    store
}

fn scan_loop(
    document: Arc<SnapshotDocument>,
    store: Arc<MemoryStore>,
    classifier: Arc<ScriptedClassifier>,
    config: ScanConfig,
) -> ScanLoop {
    ScanLoop::new(ScanContext::new(document, store, classifier, config))
}

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {:?}", other),
    }
}

#[tokio::test]
async fn test_hides_posts_exceeding_any_threshold() {
    let document = feed();
    let classifier = Arc::new(classifier());
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let scanner = scan_loop(document.clone(), store, classifier.clone(), unthrottled());

    let report = completed(scanner.run_cycle().await);

    assert_eq!(report.hidden_ids(), vec!["1", "4"]);
    assert_eq!(report.classified(), 4);
    assert_eq!(report.failed, 0);
    assert_eq!(classifier.calls(), 4);
    assert_eq!(document.hidden_nodes().len(), 2);

    let shown: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.visibility == VisibilityOutcome::Shown)
        .map(|o| o.post_id.as_str())
        .collect();
    assert_eq!(shown.len(), 2);
    assert!(shown.contains(&"2"));
    assert!(shown.contains(&"3"));
}

#[tokio::test]
async fn test_results_are_cached_for_the_next_cycle() {
    let document = feed();
    let classifier = Arc::new(classifier());
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let cache = ClassificationCache::new(store.clone());
    let scanner = scan_loop(document.clone(), store, classifier.clone(), unthrottled());

    completed(scanner.run_cycle().await);
    assert_eq!(cache.get("1").await, Some(json!({"politics": 0.95})));
    assert_eq!(cache.get("3").await, Some(json!({})));

    let second = completed(scanner.run_cycle().await);
    assert_eq!(classifier.calls(), 4);
    assert_eq!(second.cached(), 4);
    assert!(second.hidden_ids().is_empty());
    assert_eq!(
        second
            .outcomes
            .iter()
            .filter(|o| o.visibility == VisibilityOutcome::AlreadyHidden)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_cached_result_wins_over_classifier() {
    let document = feed();
    let classifier = Arc::new(classifier());
    let store = configured_store(&rules(), Some("gsk_test")).await;
    store
        .set_one(&analysis_key("2"), json!({"politics": 0.99}))
        .await
        .unwrap();
    let scanner = scan_loop(document, store, classifier.clone(), unthrottled());

    let report = completed(scanner.run_cycle().await);

    assert_eq!(classifier.calls(), 3);
    let second = report.outcomes.iter().find(|o| o.post_id == "2").unwrap();
    assert_eq!(second.source, ScoreSource::Cache);
    assert!(second.visibility.is_hidden());
}

#[tokio::test]
async fn test_malformed_cached_result_is_skipped() {
    let document = feed();
    let store = configured_store(&rules(), Some("gsk_test")).await;
    store
        .set_one(&analysis_key("1"), json!("not a score object"))
        .await
        .unwrap();
    let scanner = scan_loop(document, store, Arc::new(classifier()), unthrottled());

    let report = completed(scanner.run_cycle().await);
    let first = report.outcomes.iter().find(|o| o.post_id == "1").unwrap();
    assert!(matches!(first.visibility, VisibilityOutcome::Skipped(_)));
}

#[tokio::test]
async fn test_empty_rules_short_circuit() {
    let document = feed();
    let classifier = Arc::new(classifier());
    let store = configured_store(&[], Some("gsk_test")).await;
    let scanner = scan_loop(document.clone(), store, classifier.clone(), unthrottled());

    assert_eq!(scanner.run_cycle().await, CycleOutcome::NoRules);
    assert_eq!(classifier.calls(), 0);
    assert!(document.hidden_nodes().is_empty());
}

#[tokio::test]
async fn test_missing_credential_dispatches_nothing() {
    let document = feed();
    let classifier = Arc::new(classifier());
    let store = configured_store(&rules(), None).await;
    let scanner = scan_loop(document.clone(), store, classifier.clone(), unthrottled());

    assert_eq!(scanner.run_cycle().await, CycleOutcome::MissingCredential);
    assert_eq!(classifier.calls(), 0);
    assert!(document.hidden_nodes().is_empty());
}

#[tokio::test]
async fn test_rule_edits_apply_to_the_next_cycle() {
    let document = page("x.com", vec![post("1", "election night")]);
    let classifier = Arc::new(classifier());
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let scanner = scan_loop(document, store.clone(), classifier, unthrottled());

    completed(scanner.run_cycle().await);
    assert_eq!(scanner.rules_snapshot().len(), 2);

    Settings::new(store).remove_topic(0).await.unwrap();
    completed(scanner.run_cycle().await);
    assert_eq!(scanner.rules_snapshot()[0].name, "politics");
    assert_eq!(scanner.rules_snapshot().len(), 1);
}

#[tokio::test]
async fn test_failing_post_does_not_stop_siblings() {
    let document = feed();
    let classifier = Arc::new(ScriptedClassifier {
        panic_on: Some("cat picture".to_string()),
        ..classifier()
    });
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let scanner = scan_loop(document, store, classifier.clone(), unthrottled());

    let report = completed(scanner.run_cycle().await);

    assert_eq!(report.failed, 1);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.hidden_ids(), vec!["1", "4"]);
    assert_eq!(classifier.calls(), 4);
}

#[tokio::test]
async fn test_interval_guard_blocks_back_to_back_cycles() {
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let classifier = Arc::new(classifier());
    let scanner = scan_loop(feed(), store, classifier.clone(), ScanConfig::default());

    completed(scanner.run_cycle().await);
    assert_eq!(scanner.run_cycle().await, CycleOutcome::RateLimited);
    assert_eq!(classifier.calls(), 4);
}

#[tokio::test]
async fn test_interval_guard_ignores_cycles_that_did_not_dispatch() {
    let store = configured_store(&rules(), None).await;
    let scanner = scan_loop(feed(), store.clone(), Arc::new(classifier()), ScanConfig::default());

    assert_eq!(scanner.run_cycle().await, CycleOutcome::MissingCredential);
    Settings::new(store).set_credential("gsk_test").await.unwrap();
    completed(scanner.run_cycle().await);
}

#[tokio::test]
async fn test_scroll_is_throttled() {
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let classifier = Arc::new(classifier());
    let scanner = scan_loop(feed(), store, classifier.clone(), ScanConfig::default());

    assert!(matches!(
        scanner.on_scroll().await,
        Some(CycleOutcome::Completed(_))
    ));
    for _ in 0..5 {
        assert!(scanner.on_scroll().await.is_none());
    }
    assert_eq!(classifier.calls(), 4);
}

#[tokio::test]
async fn test_other_hosts_are_ignored() {
    let document = page("example.com", vec![post("1", "election night")]);
    let classifier = Arc::new(classifier());
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let scanner = scan_loop(document.clone(), store, classifier.clone(), unthrottled());

    assert!(!scanner.is_target_host());
    assert!(scanner.on_scroll().await.is_none());
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_twitter_host_is_targeted() {
    let document = page("twitter.com", vec![]);
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let scanner = scan_loop(document, store, Arc::new(classifier()), unthrottled());
    assert!(scanner.is_target_host());
}

#[tokio::test(start_paused = true)]
async fn test_invalidated_host_reloads_instead_of_scanning() {
    let document = feed();
    let classifier = Arc::new(classifier());
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let flag = LivenessFlag::new();
    flag.invalidate();
    let scanner = ScanLoop::new(
        ScanContext::new(document.clone(), store, classifier.clone(), unthrottled())
            .with_liveness(Arc::new(flag)),
    );

    assert!(!scanner.reload_pending());
    assert_eq!(scanner.run_cycle().await, CycleOutcome::HostInvalidated);
    assert_eq!(classifier.calls(), 0);
    assert_eq!(document.reload_count(), 0);
    assert!(scanner.reload_pending());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(document.reload_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_invalidated_cycles_reload_once() {
    let document = feed();
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let flag = LivenessFlag::new();
    flag.invalidate();
    let scanner = ScanLoop::new(
        ScanContext::new(document.clone(), store, Arc::new(classifier()), unthrottled())
            .with_liveness(Arc::new(flag)),
    );

    for _ in 0..5 {
        assert_eq!(scanner.run_cycle().await, CycleOutcome::HostInvalidated);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scanner.run_cycle().await, CycleOutcome::HostInvalidated);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(document.reload_count(), 1);
}

#[tokio::test]
async fn test_scroll_driver_starts_one_cycle_per_window() {
    let document = feed();
    let classifier = Arc::new(classifier());
    let store = configured_store(&rules(), Some("gsk_test")).await;
    let scanner = scan_loop(document.clone(), store, classifier.clone(), ScanConfig::default());

    let (events, receiver) = mpsc::channel(16);
    let driver = scanner.spawn_scroll_driver(receiver);
    for _ in 0..5 {
        events.send(()).await.unwrap();
    }
    drop(events);

    assert_eq!(driver.await.unwrap(), 1);
    assert_eq!(classifier.calls(), 4);
    assert_eq!(document.hidden_nodes().len(), 2);
}
