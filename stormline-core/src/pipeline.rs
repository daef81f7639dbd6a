//! Pipeline orchestrator: one ingestion cycle, single-flight.
//!
//! Fetches every configured channel (bounded-parallel, per-channel failures
//! skipped), pre-filters on raw keywords, then normalizes, categorizes,
//! dedups, classifies and upserts the survivors. A cycle
//! already in flight rejects overlapping triggers with [`CycleError::Busy`];
//! overlap is disallowed, not deferred.

use crate::category::detect_category;
use crate::classify::Classifier;
use crate::dedup::dedup_by_external_id;
use crate::normalize::normalize;
use crate::source::{SourceConnector, SourceError};
use crate::store::Store;
use crate::{ClassifiedRecord, CycleOutcome, NormalizedPost, RawPost};
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Normalized text shorter than this is rejected before classification.
pub const MIN_CLEAN_TEXT_LEN: usize = 20;

/// Raw-text pre-filter universe: the category keywords broadened with
/// synonyms, applied before the more expensive normalize/classify stages.
const DISASTER_KEYWORDS: &[&str] = &[
    "earthquake",
    "tsunami",
    "flood",
    "wildfire",
    "hurricane",
    "tornado",
    "emergency",
    "evacuation",
    "disaster",
    "breaking",
    "storm",
    "cyclone",
    "landslide",
    "avalanche",
    "drought",
    "heatwave",
    "blizzard",
    "typhoon",
    "volcanic",
    "eruption",
    "mudslide",
    "sinkhole",
    "severe weather",
    "natural disaster",
    "climate emergency",
    "extreme weather",
];

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("ingestion cycle already in flight")]
    Busy,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Content channels polled each cycle.
    pub channels: Vec<String>,
    /// Posts requested per channel.
    pub page_size: u32,
    /// Channel fetches allowed in flight at once.
    pub fetch_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            page_size: 10,
            fetch_concurrency: 4,
        }
    }
}

pub struct Orchestrator {
    connector: Arc<dyn SourceConnector>,
    classifier: Classifier,
    store: Store,
    options: PipelineOptions,
    // One-slot execution token; overlapping cycles are rejected via try_lock.
    cycle_gate: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        classifier: Classifier,
        store: Store,
        options: PipelineOptions,
    ) -> Self {
        Self {
            connector,
            classifier,
            store,
            options,
            cycle_gate: Mutex::new(()),
        }
    }

    /// The classifier status surface (mode, model version).
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// The read/aggregate surface backing status and stats queries.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run one ingestion cycle now. Manual and scheduled triggers share this
    /// entry point; a trigger while a cycle is in flight returns
    /// [`CycleError::Busy`] instead of queueing a duplicate run.
    pub async fn trigger(&self) -> Result<CycleOutcome, CycleError> {
        let Ok(_slot) = self.cycle_gate.try_lock() else {
            return Err(CycleError::Busy);
        };
        Ok(self.run_cycle().await)
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let cycle_id = Uuid::new_v4();
        let started = std::time::Instant::now();
        info!(
            %cycle_id,
            channels = self.options.channels.len(),
            page_size = self.options.page_size,
            "pipeline.cycle.start"
        );

        let (raw_posts, failed_channels) = self.fetch_all(cycle_id).await;

        let channel_count = self.options.channels.len();
        if channel_count > 0 && failed_channels == channel_count {
            error!(%cycle_id, "pipeline.cycle.all_channels_failed");
            return CycleOutcome {
                cycle_id,
                success: false,
                processed: 0,
                error: Some("all source channels failed".to_string()),
            };
        }

        let fetched = raw_posts.len();
        let candidates: Vec<RawPost> = raw_posts
            .into_iter()
            .filter(mentions_disaster)
            .collect();
        debug!(
            %cycle_id,
            fetched,
            candidates = candidates.len(),
            "pipeline.prefilter"
        );

        let mut normalized: Vec<NormalizedPost> = Vec::with_capacity(candidates.len());
        for post in candidates {
            let clean_text = normalize(&post.title, &post.body);
            if clean_text.len() < MIN_CLEAN_TEXT_LEN {
                debug!(
                    %cycle_id,
                    external_id = %post.external_id,
                    len = clean_text.len(),
                    "pipeline.reject.too_short"
                );
                continue;
            }
            let category = detect_category(&clean_text);
            normalized.push(NormalizedPost {
                raw: post,
                clean_text,
                category,
            });
        }

        let unique = dedup_by_external_id(normalized);

        let mut processed = 0usize;
        let batch = unique.len();
        // FIXME: classify posts concurrently (normalize/classify are pure)
        // once cycles regularly carry more than a few pages of posts.
        for post in unique {
            let classification = self.classifier.classify(&post.clean_text);
            let record = ClassifiedRecord {
                external_id: post.raw.external_id,
                clean_text: post.clean_text,
                author: post.raw.author,
                created_at: post.raw.created_at,
                label: classification.label,
                confidence: classification.confidence,
                category: post.category,
                score: post.raw.score,
                comment_count: post.raw.comment_count,
                media_url: post.raw.media_url,
                model_version: self.classifier.model_version().to_string(),
                processed_at: Utc::now(),
                is_active: true,
            };

            // One bad record must not abort the batch.
            match self.store.upsert(&record).await {
                Ok(()) => processed += 1,
                Err(err) => warn!(
                    %cycle_id,
                    external_id = %record.external_id,
                    error = %err,
                    "pipeline.upsert.failed"
                ),
            }
        }

        if processed == 0 {
            warn!(%cycle_id, "pipeline.cycle.empty");
        }
        info!(
            %cycle_id,
            processed,
            batch,
            failed_channels,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline.cycle.done"
        );

        CycleOutcome {
            cycle_id,
            success: true,
            processed,
            error: None,
        }
    }

    /// Fetch every configured channel with bounded concurrency. Channels are
    /// independent and read-only, so failures skip, they never abort.
    async fn fetch_all(&self, cycle_id: Uuid) -> (Vec<RawPost>, usize) {
        let page_size = self.options.page_size;
        let connector = self.connector.clone();
        let results = futures::stream::iter(self.options.channels.clone().into_iter().map(
            |channel| {
                let connector = connector.clone();
                async move {
                    let batch = connector.fetch(&channel, page_size).await;
                    (channel, batch)
                }
            },
        ))
        .buffer_unordered(self.options.fetch_concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

        let mut posts = Vec::new();
        let mut failed = 0usize;
        for (channel, result) in results {
            match result {
                Ok(batch) => {
                    debug!(%cycle_id, channel = channel.as_str(), posts = batch.len(), "pipeline.fetch.ok");
                    posts.extend(batch);
                }
                Err(err @ SourceError::ChannelUnavailable { .. }) => {
                    failed += 1;
                    warn!(%cycle_id, channel = channel.as_str(), error = %err, "pipeline.fetch.skipped");
                }
            }
        }
        (posts, failed)
    }
}

fn mentions_disaster(post: &RawPost) -> bool {
    let haystack = format!("{} {}", post.title, post.body).to_lowercase();
    DISASTER_KEYWORDS.iter().any(|k| haystack.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn raw(title: &str, body: &str) -> RawPost {
        RawPost {
            external_id: "reddit_t1".to_string(),
            title: title.to_string(),
            body: body.to_string(),
            author: None,
            created_at: Utc::now(),
            score: 0,
            comment_count: 0,
            media_url: None,
        }
    }

    #[test]
    fn prefilter_matches_title_or_body() {
        assert!(mentions_disaster(&raw("Earthquake near the coast", "")));
        assert!(mentions_disaster(&raw(
            "Morning update",
            "evacuation orders expanded overnight"
        )));
        assert!(mentions_disaster(&raw("SEVERE WEATHER alert", "")));
        assert!(!mentions_disaster(&raw("Local bake sale", "pie recipes")));
    }
}
