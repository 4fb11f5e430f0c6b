// src/enumerate.rs
// =============================================================================
// Turns a channel id into a finite, ordered sequence of items.
//
// The enumerator pages the upstream directory, drops entries whose owning
// channel does not match the requested one, applies the optional date
// window, and stops at the configured item limit or at a hard ceiling on
// raw entries. Descriptions arrive in a second batched lookup, which
// re-verifies ownership a second time.
//
// Failure semantics: any upstream error aborts the run, but items collected
// so far travel inside the error so callers can surface partial results.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::directory::{
    ChannelId, Directory, DirectoryError, RawEntry, MAX_BATCH_SIZE, MAX_PAGE_SIZE,
};

/// Default item limit when the operator does not ask for more.
pub const DEFAULT_MAX_ITEMS: usize = 50;
/// What "all" means in practice: a bounded ceiling, not literal infinity.
pub const ALL_ITEMS_CEILING: usize = 10_000;
/// Hard cap on raw entries fetched per run, guarding against an upstream
/// that keeps handing out cursors.
pub const RAW_ENTRY_CEILING: usize = 20_000;

/// One published unit belonging to the channel. Never mutated after the
/// enumerator hands it onward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub url: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub channel_id: ChannelId,
}

impl Item {
    fn from_entry(entry: RawEntry) -> Self {
        let url = format!("https://www.youtube.com/watch?v={}", entry.item_id);
        Self {
            id: entry.item_id,
            title: entry.title,
            thumbnail: entry.thumbnail,
            url,
            description: String::new(),
            published_at: entry.published_at,
            channel_id: entry.channel_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnumerateOptions {
    /// Inclusive lower bound on publication timestamp
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on publication timestamp
    pub end_date: Option<DateTime<Utc>>,
    /// Item limit; `None` means `DEFAULT_MAX_ITEMS`
    pub max_items: Option<usize>,
}

impl EnumerateOptions {
    fn effective_max(&self) -> usize {
        self.max_items
            .unwrap_or(DEFAULT_MAX_ITEMS)
            .clamp(1, ALL_ITEMS_CEILING)
    }

    fn within_window(&self, published_at: DateTime<Utc>) -> bool {
        if let Some(start) = self.start_date {
            if published_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if published_at > end {
                return false;
            }
        }
        true
    }
}

/// Enumeration aborted mid-run. Items collected before the failure ride
/// along so the caller can report partial results explicitly.
#[derive(Debug, Error)]
#[error("enumeration aborted after {} item(s): {source}", partial.len())]
pub struct EnumerateFailure {
    pub partial: Vec<Item>,
    #[source]
    pub source: DirectoryError,
}

/// Enumerates the channel's items in publication order as returned by the
/// upstream, page by page.
pub async fn enumerate(
    directory: &dyn Directory,
    channel_id: &ChannelId,
    options: &EnumerateOptions,
    cancel: &CancellationToken,
) -> Result<Vec<Item>, EnumerateFailure> {
    // One collection lookup per run; the mapping is stable for the run's
    // lifetime.
    let collection = directory
        .uploads_collection(channel_id)
        .await
        .map_err(|source| EnumerateFailure {
            partial: Vec::new(),
            source,
        })?;

    let max_items = options.effective_max();
    let mut items: Vec<Item> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut raw_seen = 0usize;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let remaining = max_items - items.len();
        let page_size = (remaining.min(MAX_PAGE_SIZE as usize)) as u32;
        let page = match directory
            .list_items(&collection, cursor.as_deref(), page_size)
            .await
        {
            Ok(page) => page,
            Err(source) => {
                // Items gathered before the failure still get their
                // descriptions so the caller can report them.
                let partial = match attach_descriptions(directory, channel_id, items).await {
                    Ok(described) => described,
                    Err(nested) => nested.partial,
                };
                return Err(EnumerateFailure { partial, source });
            }
        };

        for entry in page.entries {
            raw_seen += 1;

            // Ownership-consistency invariant: the upstream occasionally
            // returns entries pointing at a different channel; drop them.
            if entry.channel_id != *channel_id {
                warn!(
                    item = %entry.item_id,
                    got = %entry.channel_id,
                    expected = %channel_id,
                    "dropping entry with mismatched channel id"
                );
                continue;
            }

            if !options.within_window(entry.published_at) {
                continue;
            }

            items.push(Item::from_entry(entry));
            if items.len() >= max_items {
                break;
            }
        }

        if items.len() >= max_items {
            break;
        }
        if raw_seen >= RAW_ENTRY_CEILING {
            warn!(raw_seen, "raw entry ceiling reached, stopping enumeration");
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    attach_descriptions(directory, channel_id, items).await
}

// Second pass: batched description lookup, re-verifying ownership. Items
// without a detail record keep an empty description rather than being lost.
async fn attach_descriptions(
    directory: &dyn Directory,
    channel_id: &ChannelId,
    items: Vec<Item>,
) -> Result<Vec<Item>, EnumerateFailure> {
    let mut described: Vec<Item> = Vec::with_capacity(items.len());
    let mut pending = items.into_iter().peekable();

    while pending.peek().is_some() {
        let chunk: Vec<Item> = pending.by_ref().take(MAX_BATCH_SIZE).collect();
        let ids: Vec<String> = chunk.iter().map(|item| item.id.clone()).collect();

        let details = match directory.item_details(&ids).await {
            Ok(details) => details,
            Err(source) => {
                return Err(EnumerateFailure {
                    partial: described,
                    source,
                })
            }
        };

        for mut item in chunk {
            match details.get(&item.id) {
                Some(detail) if detail.channel_id != *channel_id => {
                    warn!(
                        item = %item.id,
                        got = %detail.channel_id,
                        "dropping item whose detail record names another channel"
                    );
                }
                Some(detail) => {
                    item.description = detail.description.clone();
                    described.push(item);
                }
                None => {
                    debug!(item = %item.id, "no detail record; keeping empty description");
                    described.push(item);
                }
            }
        }
    }

    Ok(described)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::FakeDirectory;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    const CHANNEL: &str = "UCabcdefghijklmnopqrstuv";
    const OTHER: &str = "UCzzzzzzzzzzzzzzzzzzzzzz";

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    fn channel() -> ChannelId {
        ChannelId(CHANNEL.to_string())
    }

    #[tokio::test]
    async fn test_yields_items_in_page_order_with_descriptions() {
        let directory = FakeDirectory::new(CHANNEL)
            .with_entry("a", CHANNEL, "2024-01-03T00:00:00Z")
            .with_entry("b", CHANNEL, "2024-01-02T00:00:00Z")
            .with_entry("c", CHANNEL, "2024-01-01T00:00:00Z");

        let items = enumerate(&directory, &channel(), &EnumerateOptions::default(), &token())
            .await
            .unwrap();

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(items[0].description, "description of a");
        assert_eq!(items[0].url, "https://www.youtube.com/watch?v=a");
    }

    #[tokio::test]
    async fn test_drops_entries_owned_by_another_channel() {
        let directory = FakeDirectory::new(CHANNEL)
            .with_entry("mine", CHANNEL, "2024-01-02T00:00:00Z")
            .with_entry("foreign", OTHER, "2024-01-01T00:00:00Z");

        let items = enumerate(&directory, &channel(), &EnumerateOptions::default(), &token())
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert!(items.iter().all(|item| item.channel_id == channel()));
    }

    #[tokio::test]
    async fn test_detail_stage_reverifies_ownership() {
        let directory = FakeDirectory::new(CHANNEL)
            .with_entry("ok", CHANNEL, "2024-01-02T00:00:00Z")
            .with_entry("hijacked", CHANNEL, "2024-01-01T00:00:00Z")
            .with_detail_channel("hijacked", OTHER);

        let items = enumerate(&directory, &channel(), &EnumerateOptions::default(), &token())
            .await
            .unwrap();

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_date_window_bounds_are_inclusive() {
        let directory = FakeDirectory::new(CHANNEL)
            .with_entry("too-new", CHANNEL, "2024-02-01T00:00:01Z")
            .with_entry("on-end", CHANNEL, "2024-02-01T00:00:00Z")
            .with_entry("inside", CHANNEL, "2024-01-15T12:00:00Z")
            .with_entry("on-start", CHANNEL, "2024-01-01T00:00:00Z")
            .with_entry("too-old", CHANNEL, "2023-12-31T23:59:59Z");

        let options = EnumerateOptions {
            start_date: Some("2024-01-01T00:00:00Z".parse().unwrap()),
            end_date: Some("2024-02-01T00:00:00Z".parse().unwrap()),
            max_items: None,
        };
        let items = enumerate(&directory, &channel(), &options, &token())
            .await
            .unwrap();

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["on-end", "inside", "on-start"]);
    }

    #[tokio::test]
    async fn test_max_items_stops_paging_early() {
        let mut directory = FakeDirectory::new(CHANNEL);
        for i in 0..12 {
            directory = directory.with_entry(&format!("v{i}"), CHANNEL, "2024-01-01T00:00:00Z");
        }

        let options = EnumerateOptions {
            max_items: Some(5),
            ..Default::default()
        };
        let items = enumerate(&directory, &channel(), &options, &token())
            .await
            .unwrap();

        assert_eq!(items.len(), 5);
        // The first page already satisfied the limit; no further fetches
        assert_eq!(directory.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pages_until_cursor_runs_out() {
        let mut directory = FakeDirectory::new(CHANNEL);
        for i in 0..120 {
            directory = directory.with_entry(&format!("v{i:03}"), CHANNEL, "2024-01-01T00:00:00Z");
        }

        let options = EnumerateOptions {
            max_items: Some(ALL_ITEMS_CEILING),
            ..Default::default()
        };
        let items = enumerate(&directory, &channel(), &options, &token())
            .await
            .unwrap();

        assert_eq!(items.len(), 120);
        // 50 + 50 + 20, page size capped by the upstream maximum
        assert_eq!(directory.list_calls.load(Ordering::SeqCst), 3);
        // Descriptions fetched in batches of at most 50
        assert_eq!(directory.detail_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_detail_failure_surfaces_partial_results() {
        let directory = FakeDirectory::new(CHANNEL)
            .with_entry("a", CHANNEL, "2024-01-01T00:00:00Z")
            .failing_details();

        let failure = enumerate(&directory, &channel(), &EnumerateOptions::default(), &token())
            .await
            .unwrap_err();

        assert!(failure.partial.is_empty());
        assert!(matches!(failure.source, DirectoryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_paging_failure_keeps_items_already_collected() {
        let mut directory = FakeDirectory::new(CHANNEL);
        for i in 0..60 {
            directory = directory.with_entry(&format!("v{i:02}"), CHANNEL, "2024-01-01T00:00:00Z");
        }
        directory.fail_paging_after = Some(1);

        let options = EnumerateOptions {
            max_items: Some(ALL_ITEMS_CEILING),
            ..Default::default()
        };
        let failure = enumerate(&directory, &channel(), &options, &token())
            .await
            .unwrap_err();

        assert_eq!(failure.partial.len(), 50);
        assert_eq!(failure.partial[0].description, "description of v00");
        assert!(matches!(failure.source, DirectoryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_paging() {
        let directory = FakeDirectory::new(CHANNEL)
            .with_entry("a", CHANNEL, "2024-01-01T00:00:00Z");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let items = enumerate(&directory, &channel(), &EnumerateOptions::default(), &cancel)
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(directory.list_calls.load(Ordering::SeqCst), 0);
    }
}
