//! Core ingestion pipeline: normalize, categorize, classify, dedup, persist.
//!
//! The orchestrator in [`pipeline`] drives one cycle across these stages; the
//! [`scheduler`] repeats it on a fixed period. Everything upstream of the
//! store is transient per cycle; [`ClassifiedRecord`] is the only durable
//! entity, keyed by its source-prefixed external identifier.

pub mod category;
pub mod classify;
pub mod dedup;
pub mod normalize;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unprocessed item fetched from a source channel. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    /// Globally unique across sources: prefixed by its source (`reddit_...`).
    pub external_id: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub score: i64,
    pub comment_count: i64,
    pub media_url: Option<String>,
}

/// A raw post plus its cleaned text and detected category. Never persisted
/// on its own.
#[derive(Debug, Clone)]
pub struct NormalizedPost {
    pub raw: RawPost,
    pub clean_text: String,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Verified,
    Rumor,
    Unknown,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Verified => "verified",
            Label::Rumor => "rumor",
            Label::Unknown => "unknown",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "verified" => Label::Verified,
            "rumor" => Label::Rumor,
            _ => Label::Unknown,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disaster category, detected from normalized text by keyword match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Earthquake,
    Flood,
    Fire,
    Storm,
    Weather,
    Volcanic,
    Landslide,
    Tsunami,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Earthquake => "earthquake",
            Category::Flood => "flood",
            Category::Fire => "fire",
            Category::Storm => "storm",
            Category::Weather => "weather",
            Category::Volcanic => "volcanic",
            Category::Landslide => "landslide",
            Category::Tsunami => "tsunami",
            Category::General => "general",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "earthquake" => Category::Earthquake,
            "flood" => Category::Flood,
            "fire" => Category::Fire,
            "storm" => Category::Storm,
            "weather" => Category::Weather,
            "volcanic" => Category::Volcanic,
            "landslide" => Category::Landslide,
            "tsunami" => Category::Tsunami,
            _ => Category::General,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification outcome for one normalized post.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: Label,
    pub confidence: f64,
}

impl ClassificationResult {
    /// The explicit failure-safe value: nothing could be decided.
    pub fn failure_safe() -> Self {
        Self {
            label: Label::Unknown,
            confidence: 0.5,
        }
    }
}

/// The durable row unit: identity, cleaned text, category and classification
/// outcome. At most one active record per external identifier.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedRecord {
    pub external_id: String,
    pub clean_text: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub label: Label,
    pub confidence: f64,
    pub category: Category,
    pub score: i64,
    pub comment_count: i64,
    pub media_url: Option<String>,
    pub model_version: String,
    pub processed_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Per-label aggregate over the trailing stats window.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LabelStats {
    pub count: i64,
    pub avg_confidence: f64,
    pub max_confidence: f64,
    pub min_confidence: f64,
}

/// Aggregate outcome of one ingestion cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub cycle_id: Uuid,
    pub success: bool,
    pub processed: usize,
    pub error: Option<String>,
}
