//! Wire-level clients for the social content channels Stormline harvests.

pub mod reddit;

pub use reddit::RedditApi;
