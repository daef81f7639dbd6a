//! Minimal wrapper around the public Reddit listing API with Stormline defaults.
//!
//! Handles the mandatory User-Agent, request parameter shaping and page-size
//! clamping before delegating to the shared HTTP client.
// FIXME: follow `after` tokens once a cycle needs more than one listing page
// per channel; today the bounded page the pipeline requests fits in one.
use crate::reddit::types::Listing;
use anyhow::Result;
use stormline_http::{HttpClient, RequestOpts};

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

#[derive(Clone)]
pub struct RedditApi {
    http: HttpClient,
    user_agent: String,
}

impl RedditApi {
    pub fn new(user_agent: impl Into<String>) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, user_agent)
    }

    /// Anchor the client elsewhere (tests point this at a mock server).
    pub fn with_base_url(base: &str, user_agent: impl Into<String>) -> Result<Self> {
        let http = HttpClient::new(base)?;
        Ok(Self {
            http,
            user_agent: user_agent.into(),
        })
    }

    /// Fetch one bounded page of hot posts from a subreddit.
    pub async fn hot_listing(&self, channel: &str, limit: u32) -> Result<Listing> {
        // Reddit rejects listing requests without an identifying User-Agent
        // and caps page sizes at 100.
        let limit = limit.clamp(1, 100);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_str(&self.user_agent)
                .map_err(|e| anyhow::anyhow!("invalid user agent: {e}"))?,
        );

        let listing: Listing = self
            .http
            .get_json(
                &format!("r/{channel}/hot.json"),
                RequestOpts {
                    headers: Some(headers),
                    query: Some(vec![
                        ("limit", limit.to_string().into()),
                        ("raw_json", "1".into()),
                    ]),
                    ..Default::default()
                },
            )
            .await?;

        tracing::debug!(
            channel,
            posts = listing.data.children.len(),
            "reddit.hot_listing"
        );
        Ok(listing)
    }
}
