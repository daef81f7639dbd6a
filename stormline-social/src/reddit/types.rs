use serde::{Deserialize, Serialize};

/// Top-level envelope returned by `r/<name>/hot.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<Thing>,
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing {
    pub data: PostData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostData {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,

    /// Seconds since the epoch; Reddit serialises this as a float.
    #[serde(default)]
    pub created_utc: f64,

    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,

    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub preview: Option<Preview>,

    #[serde(default)]
    pub stickied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Preview {
    #[serde(default)]
    pub images: Vec<PreviewImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewImage {
    pub source: PreviewSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSource {
    pub url: String,
}
