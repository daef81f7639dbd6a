use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stormline_core::classify::Classifier;
use stormline_core::pipeline::{CycleError, Orchestrator, PipelineOptions};
use stormline_core::scheduler::Scheduler;
use stormline_core::source::{SourceConnector, SourceError};
use stormline_core::store::Store;
use stormline_core::{Category, Label, RawPost};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn fallback_classifier() -> Classifier {
    Classifier::load(
        Path::new("/nonexistent/model.json"),
        Path::new("/nonexistent/vectorizer.json"),
    )
}

async fn memory_store() -> Store {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    let store = Store::new(pool);
    store.ensure_schema().await.expect("schema");
    store
}

fn usgs_post() -> RawPost {
    RawPost {
        external_id: "src_1".to_string(),
        title: "BREAKING: Official USGS confirms magnitude 6.5 earthquake".to_string(),
        body: String::new(),
        author: Some("u/quakebot".to_string()),
        created_at: Utc::now(),
        score: 120,
        comment_count: 3,
        media_url: None,
    }
}

fn options(channels: &[&str]) -> PipelineOptions {
    PipelineOptions {
        channels: channels.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    }
}

/// Serves a fixed batch per channel; unknown channels are unavailable.
struct StaticConnector {
    batches: HashMap<String, Vec<RawPost>>,
    calls: AtomicUsize,
}

impl StaticConnector {
    fn new(batches: HashMap<String, Vec<RawPost>>) -> Self {
        Self {
            batches,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceConnector for StaticConnector {
    async fn fetch(&self, channel: &str, _page_size: u32) -> Result<Vec<RawPost>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches
            .get(channel)
            .cloned()
            .ok_or_else(|| SourceError::ChannelUnavailable {
                channel: channel.to_string(),
                source: anyhow::anyhow!("connection refused"),
            })
    }
}

/// Parks inside `fetch` until released, so a cycle can be held in flight.
struct BlockingConnector {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SourceConnector for BlockingConnector {
    async fn fetch(&self, _channel: &str, _page_size: u32) -> Result<Vec<RawPost>, SourceError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn end_to_end_cycle_persists_verified_record() {
    let mut batches = HashMap::new();
    batches.insert("earthquakes".to_string(), vec![usgs_post()]);
    let connector = Arc::new(StaticConnector::new(batches));
    let orchestrator = Orchestrator::new(
        connector,
        fallback_classifier(),
        memory_store().await,
        options(&["earthquakes"]),
    );

    let outcome = orchestrator.trigger().await.expect("not busy");
    assert!(outcome.success);
    assert_eq!(outcome.processed, 1);
    assert!(outcome.error.is_none());

    let records = orchestrator
        .store()
        .query_by_label(Label::Verified, 0.5, None, 10)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.external_id, "src_1");
    assert!(record.clean_text.to_lowercase().starts_with("breaking"));
    assert!(record.clean_text.ends_with('.'));
    assert_eq!(record.category, Category::Earthquake);
    assert_eq!(record.label, Label::Verified);
    assert!(record.confidence >= 0.60);
    assert_eq!(record.score, 120);
}

#[tokio::test]
async fn duplicate_sightings_collapse_to_one_record() {
    // The same logical post shows up on two channels in one cycle.
    let mut batches = HashMap::new();
    batches.insert("news".to_string(), vec![usgs_post()]);
    batches.insert("earthquakes".to_string(), vec![usgs_post()]);
    let connector = Arc::new(StaticConnector::new(batches));
    let orchestrator = Orchestrator::new(
        connector,
        fallback_classifier(),
        memory_store().await,
        options(&["news", "earthquakes"]),
    );

    let outcome = orchestrator.trigger().await.expect("not busy");
    assert_eq!(outcome.processed, 1);

    let rows = orchestrator.store().query_all(None, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn failed_channel_is_skipped_not_fatal() {
    let mut batches = HashMap::new();
    batches.insert("earthquakes".to_string(), vec![usgs_post()]);
    let connector = Arc::new(StaticConnector::new(batches));
    let orchestrator = Orchestrator::new(
        connector,
        fallback_classifier(),
        memory_store().await,
        options(&["earthquakes", "unreachable"]),
    );

    let outcome = orchestrator.trigger().await.expect("not busy");
    assert!(outcome.success, "partial results still proceed");
    assert_eq!(outcome.processed, 1);
}

#[tokio::test]
async fn total_channel_failure_is_a_hard_failure() {
    let connector = Arc::new(StaticConnector::new(HashMap::new()));
    let orchestrator = Orchestrator::new(
        connector,
        fallback_classifier(),
        memory_store().await,
        options(&["down1", "down2"]),
    );

    let outcome = orchestrator.trigger().await.expect("not busy");
    assert!(!outcome.success);
    assert_eq!(outcome.processed, 0);
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn unusable_posts_are_filtered_before_classification() {
    let mut too_short = usgs_post();
    too_short.external_id = "src_short".to_string();
    too_short.title = "flood".to_string();

    let mut off_topic = usgs_post();
    off_topic.external_id = "src_off".to_string();
    off_topic.title = "Local bake sale turnout excellent this year".to_string();

    let mut batches = HashMap::new();
    batches.insert("news".to_string(), vec![too_short, off_topic]);
    let connector = Arc::new(StaticConnector::new(batches));
    let orchestrator = Orchestrator::new(
        connector,
        fallback_classifier(),
        memory_store().await,
        options(&["news"]),
    );

    let outcome = orchestrator.trigger().await.expect("not busy");
    // Nothing usable is a warning condition, not an error.
    assert!(outcome.success);
    assert_eq!(outcome.processed, 0);
    assert!(orchestrator.store().query_all(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_trigger_is_rejected_busy() {
    let connector = Arc::new(BlockingConnector {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let orchestrator = Arc::new(Orchestrator::new(
        connector.clone(),
        fallback_classifier(),
        memory_store().await,
        options(&["news"]),
    ));

    let running = orchestrator.clone();
    let handle = tokio::spawn(async move { running.trigger().await });

    // Wait until the first cycle is inside its fetch, then overlap.
    connector.entered.notified().await;
    match orchestrator.trigger().await {
        Err(CycleError::Busy) => {}
        other => panic!("expected busy rejection, got {other:?}"),
    }

    connector.release.notify_one();
    let outcome = handle.await.unwrap().expect("first cycle completes");
    assert!(outcome.success);

    // The gate is free again once the in-flight cycle finished.
    connector.release.notify_one();
    assert!(orchestrator.trigger().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn scheduler_stops_cleanly_on_cancellation() {
    let mut batches = HashMap::new();
    batches.insert("earthquakes".to_string(), vec![usgs_post()]);
    let connector = Arc::new(StaticConnector::new(batches));
    let orchestrator = Arc::new(Orchestrator::new(
        connector.clone(),
        fallback_classifier(),
        memory_store().await,
        options(&["earthquakes"]),
    ));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        Scheduler::new(orchestrator, Duration::from_secs(3600)).run(cancel.clone()),
    );

    // First tick fires immediately.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_first = connector.calls.load(Ordering::SeqCst);
    assert!(after_first >= 1, "first scheduled cycle should have run");

    // Two more periods elapse under paused time.
    tokio::time::sleep(Duration::from_secs(7200)).await;
    let after_ticks = connector.calls.load(Ordering::SeqCst);
    assert!(after_ticks > after_first);

    cancel.cancel();
    handle.await.unwrap();
    let at_cancel = connector.calls.load(Ordering::SeqCst);

    // Once cancelled, no new cycle ever starts.
    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(connector.calls.load(Ordering::SeqCst), at_cancel);
}
