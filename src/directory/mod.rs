// src/directory/mod.rs
// =============================================================================
// The upstream content directory boundary.
//
// Everything above this module depends only on the `Directory` trait; the
// concrete implementations in `api.rs` speak the directory's JSON API, one
// per credential mode. `resolve.rs` turns operator-supplied channel
// references into canonical channel ids through the same trait.
// =============================================================================

mod api;
mod resolve;

pub use api::{ApiKeyDirectory, TokenDirectory};
pub use resolve::{parse_channel_reference, resolve, ChannelQuery, ResolveError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// Upstream-imposed maximums per call
pub const MAX_PAGE_SIZE: u32 = 50;
pub const MAX_BATCH_SIZE: usize = 50;

/// Canonical, stable channel identifier issued by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the item collection backing a channel (its uploads list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionId(pub String);

/// One raw entry from a directory page, before it becomes an Item.
/// Descriptions are not guaranteed present here; see `item_details`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub item_id: String,
    pub title: String,
    pub thumbnail: String,
    pub channel_id: ChannelId,
    pub published_at: DateTime<Utc>,
}

/// One page of entries plus the cursor for the next page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPage {
    pub entries: Vec<RawEntry>,
    pub next_cursor: Option<String>,
}

/// Detail record from the batched description lookup. Carries the owning
/// channel id again so callers can re-verify ownership.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDetail {
    pub description: String,
    pub channel_id: ChannelId,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("channel not found")]
    NotFound,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("rate limited by the upstream directory")]
    RateLimited,
    #[error("upstream directory unavailable: {0}")]
    Unavailable(String),
}

// The polymorphic upstream interface. One implementation per credential
// mode; enumeration and resolution depend only on this.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Looks up a channel id by legacy username or custom name.
    async fn channel_by_username(&self, username: &str)
        -> Result<Option<ChannelId>, DirectoryError>;

    /// Full-text channel search fallback for handles and custom URLs.
    async fn search_channel(&self, query: &str) -> Result<Option<ChannelId>, DirectoryError>;

    /// Resolves the item collection backing a channel. Called once per run.
    async fn uploads_collection(&self, channel: &ChannelId)
        -> Result<CollectionId, DirectoryError>;

    /// Fetches one page of entries. `page_size` is clamped upstream to
    /// `MAX_PAGE_SIZE`.
    async fn list_items(
        &self,
        collection: &CollectionId,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ItemPage, DirectoryError>;

    /// Batched description lookup, at most `MAX_BATCH_SIZE` ids per call.
    async fn item_details(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, ItemDetail>, DirectoryError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // In-memory directory serving a flat entry list through numeric
    // cursors, mimicking the upstream's page-size cap.
    pub(crate) struct FakeDirectory {
        pub channel: ChannelId,
        pub collection: CollectionId,
        pub entries: Vec<RawEntry>,
        pub details: Mutex<HashMap<String, ItemDetail>>,
        pub usernames: HashMap<String, ChannelId>,
        pub searches: HashMap<String, ChannelId>,
        pub fail_details: bool,
        pub fail_paging_after: Option<usize>,
        pub list_calls: AtomicUsize,
        pub detail_calls: AtomicUsize,
    }

    impl FakeDirectory {
        pub fn new(channel: &str) -> Self {
            Self {
                channel: ChannelId(channel.to_string()),
                collection: CollectionId(format!("UU{}", channel.trim_start_matches("UC"))),
                entries: Vec::new(),
                details: Mutex::new(HashMap::new()),
                usernames: HashMap::new(),
                searches: HashMap::new(),
                fail_details: false,
                fail_paging_after: None,
                list_calls: AtomicUsize::new(0),
                detail_calls: AtomicUsize::new(0),
            }
        }

        // Adds an entry owned by `channel`, with a default description.
        pub fn with_entry(self, id: &str, channel: &str, published_at: &str) -> Self {
            self.with_described_entry(id, channel, published_at, &format!("description of {id}"))
        }

        pub fn with_described_entry(
            mut self,
            id: &str,
            channel: &str,
            published_at: &str,
            description: &str,
        ) -> Self {
            let channel_id = ChannelId(channel.to_string());
            self.entries.push(RawEntry {
                item_id: id.to_string(),
                title: format!("Item {id}"),
                thumbnail: format!("https://thumbs.example/{id}.jpg"),
                channel_id: channel_id.clone(),
                published_at: published_at.parse().expect("test timestamp"),
            });
            self.details.lock().unwrap().insert(
                id.to_string(),
                ItemDetail {
                    description: description.to_string(),
                    channel_id,
                },
            );
            self
        }

        pub fn with_detail_channel(self, id: &str, channel: &str) -> Self {
            let mut details = self.details.lock().unwrap();
            if let Some(detail) = details.get_mut(id) {
                detail.channel_id = ChannelId(channel.to_string());
            }
            drop(details);
            self
        }

        pub fn with_username(mut self, name: &str, channel: &str) -> Self {
            self.usernames
                .insert(name.to_string(), ChannelId(channel.to_string()));
            self
        }

        pub fn with_search_hit(mut self, query: &str, channel: &str) -> Self {
            self.searches
                .insert(query.to_string(), ChannelId(channel.to_string()));
            self
        }

        pub fn failing_details(mut self) -> Self {
            self.fail_details = true;
            self
        }
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn channel_by_username(
            &self,
            username: &str,
        ) -> Result<Option<ChannelId>, DirectoryError> {
            Ok(self.usernames.get(username).cloned())
        }

        async fn search_channel(&self, query: &str) -> Result<Option<ChannelId>, DirectoryError> {
            Ok(self.searches.get(query).cloned())
        }

        async fn uploads_collection(
            &self,
            channel: &ChannelId,
        ) -> Result<CollectionId, DirectoryError> {
            if *channel == self.channel {
                Ok(self.collection.clone())
            } else {
                Err(DirectoryError::NotFound)
            }
        }

        async fn list_items(
            &self,
            _collection: &CollectionId,
            cursor: Option<&str>,
            page_size: u32,
        ) -> Result<ItemPage, DirectoryError> {
            let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_paging_after {
                if call >= limit {
                    return Err(DirectoryError::Unavailable("paging failed".into()));
                }
            }

            let offset: usize = cursor.map(|c| c.parse().expect("test cursor")).unwrap_or(0);
            let take = (page_size.min(MAX_PAGE_SIZE) as usize).min(
                self.entries.len().saturating_sub(offset),
            );
            let entries = self.entries[offset..offset + take].to_vec();
            let end = offset + take;
            let next_cursor = (end < self.entries.len()).then(|| end.to_string());

            Ok(ItemPage {
                entries,
                next_cursor,
            })
        }

        async fn item_details(
            &self,
            ids: &[String],
        ) -> Result<HashMap<String, ItemDetail>, DirectoryError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_details {
                return Err(DirectoryError::Unavailable("details failed".into()));
            }
            assert!(ids.len() <= MAX_BATCH_SIZE, "batch size over upstream cap");

            let details = self.details.lock().unwrap();
            Ok(ids
                .iter()
                .filter_map(|id| details.get(id).map(|d| (id.clone(), d.clone())))
                .collect())
        }
    }
}
