//! In-batch deduplication, one entry per external identifier.

use crate::NormalizedPost;
use std::collections::HashMap;

/// Collapse a batch to one entry per external id.
///
/// Within a batch the last sighting wins, but the entry keeps the position of
/// the first sighting so batch order stays stable. Cross-cycle collapsing is
/// the store's upsert, not this step.
pub fn dedup_by_external_id(posts: Vec<NormalizedPost>) -> Vec<NormalizedPost> {
    let mut slot_by_id: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<NormalizedPost> = Vec::with_capacity(posts.len());

    for post in posts {
        match slot_by_id.get(&post.raw.external_id) {
            Some(&slot) => unique[slot] = post,
            None => {
                slot_by_id.insert(post.raw.external_id.clone(), unique.len());
                unique.push(post);
            }
        }
    }

    unique
}
