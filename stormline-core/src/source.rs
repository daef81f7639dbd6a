//! Source-connector boundary and the Reddit-backed implementation.
//!
//! The trait is the collaborator seam the orchestrator fetches through; the
//! Reddit connector converts listing children into domain [`RawPost`]s with
//! source-prefixed identifiers so cross-source collisions cannot occur.

use crate::RawPost;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stormline_social::reddit::types::PostData;
use stormline_social::RedditApi;
use thiserror::Error;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif"];

#[derive(Debug, Error)]
pub enum SourceError {
    /// The channel could not be fetched this cycle; the orchestrator logs
    /// and skips it, other channels still proceed.
    #[error("channel '{channel}' unavailable: {source}")]
    ChannelUnavailable {
        channel: String,
        #[source]
        source: anyhow::Error,
    },
}

/// One external content channel the pipeline can pull raw posts from.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn fetch(&self, channel: &str, page_size: u32) -> Result<Vec<RawPost>, SourceError>;
}

pub struct RedditConnector {
    api: RedditApi,
}

impl RedditConnector {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        Ok(Self {
            api: RedditApi::new(user_agent)?,
        })
    }

    /// Wrap an existing client (tests point it at a mock server).
    pub fn from_api(api: RedditApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SourceConnector for RedditConnector {
    async fn fetch(&self, channel: &str, page_size: u32) -> Result<Vec<RawPost>, SourceError> {
        let listing = self
            .api
            .hot_listing(channel, page_size)
            .await
            .map_err(|source| SourceError::ChannelUnavailable {
                channel: channel.to_string(),
                source,
            })?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|thing| raw_post_from_listing(thing.data))
            .collect())
    }
}

fn raw_post_from_listing(post: PostData) -> RawPost {
    let media_url = extract_media_url(&post);
    let created_at = DateTime::from_timestamp(post.created_utc as i64, 0).unwrap_or_else(Utc::now);

    RawPost {
        external_id: format!("reddit_{}", post.id),
        title: post.title,
        body: post.selftext,
        author: post.author.map(|name| format!("u/{name}")),
        created_at,
        score: post.score,
        comment_count: post.num_comments,
        media_url,
    }
}

/// Best image available on the post: preview source, then an http thumbnail,
/// then a direct image link.
fn extract_media_url(post: &PostData) -> Option<String> {
    if let Some(preview) = &post.preview {
        if let Some(image) = preview.images.first() {
            return Some(image.source.url.clone());
        }
    }

    if let Some(thumb) = &post.thumbnail {
        if thumb.starts_with("http") {
            return Some(thumb.clone());
        }
    }

    if let Some(url) = &post.url {
        let lower = url.to_lowercase();
        if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return Some(url.clone());
        }
    }

    None
}
