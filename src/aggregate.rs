// src/aggregate.rs
// =============================================================================
// Drives one full inspection run: enumerate items, extract and classify
// their links with bounded concurrency, and accumulate statistics and a
// sortable result set.
//
// Ordering: items are processed and appended in enumeration order; links
// within an item keep extraction order. Classification itself runs
// concurrently through ordered buffered streams, capped globally by a
// semaphore so neither the client nor the target hosts are overwhelmed.
// =============================================================================

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::checker::{LinkClassifier, LinkResult, LinkStatus};
use crate::directory::{ChannelId, Directory, DirectoryError};
use crate::enumerate::{enumerate, EnumerateOptions, Item};
use crate::extract::extract_urls;

// How many items may be mid-classification at once; link-level concurrency
// is governed by the run's semaphore.
const ITEM_PIPELINE_WIDTH: usize = 4;
const LINKS_IN_FLIGHT_PER_ITEM: usize = 8;

/// Default global cap on concurrent link checks.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// One item paired with its classified links, in extraction order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemResult {
    pub item: Item,
    pub links: Vec<LinkResult>,
}

impl ItemResult {
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn issue_count(&self) -> usize {
        self.links.iter().filter(|l| l.is_issue()).count()
    }

    pub fn unchecked_count(&self) -> usize {
        self.links
            .iter()
            .filter(|l| l.status == LinkStatus::Unchecked)
            .count()
    }
}

/// Run-scoped counters, shared by reference and bumped with atomic adds.
/// Counters only ever grow during a run.
#[derive(Debug, Default)]
pub struct RunStatistics {
    items: AtomicUsize,
    links: AtomicUsize,
    issues: AtomicUsize,
    unchecked: AtomicUsize,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    // Applied once per fully-classified item, so cancellation never leaves
    // a half-counted item behind.
    fn record_item(&self, result: &ItemResult) {
        self.items.fetch_add(1, Ordering::SeqCst);
        self.links.fetch_add(result.link_count(), Ordering::SeqCst);
        self.issues.fetch_add(result.issue_count(), Ordering::SeqCst);
        self.unchecked
            .fetch_add(result.unchecked_count(), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            item_count: self.items.load(Ordering::SeqCst),
            link_count: self.links.load(Ordering::SeqCst),
            issue_count: self.issues.load(Ordering::SeqCst),
            unchecked_count: self.unchecked.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time view of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub item_count: usize,
    pub link_count: usize,
    pub issue_count: usize,
    pub unchecked_count: usize,
}

/// Sort keys for the result view. All sort descending and hide items with a
/// zero count for the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    LinkCount,
    IssueCount,
    UncheckedCount,
}

impl SortKey {
    fn count(&self, result: &ItemResult) -> usize {
        match self {
            SortKey::LinkCount => result.link_count(),
            SortKey::IssueCount => result.issue_count(),
            SortKey::UncheckedCount => result.unchecked_count(),
        }
    }
}

/// Append-only result set in enumeration order, with a toggleable sort.
/// Sorting never mutates the canonical order; views are snapshot copies.
#[derive(Debug, Default)]
pub struct ResultSet {
    results: Vec<ItemResult>,
    active_sort: Option<SortKey>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, result: ItemResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Selects a sort key, or restores canonical order when the active key
    /// is selected again.
    pub fn toggle_sort(&mut self, key: SortKey) -> Option<SortKey> {
        self.active_sort = if self.active_sort == Some(key) {
            None
        } else {
            Some(key)
        };
        self.active_sort
    }

    /// The current view: canonical enumeration order, or a filtered copy
    /// sorted descending by the active key.
    pub fn view(&self) -> Vec<ItemResult> {
        match self.active_sort {
            None => self.results.clone(),
            Some(key) => {
                let mut view: Vec<ItemResult> = self
                    .results
                    .iter()
                    .filter(|r| key.count(r) > 0)
                    .cloned()
                    .collect();
                // Stable sort: ties keep enumeration order
                view.sort_by(|a, b| key.count(b).cmp(&key.count(a)));
                view
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Global cap on concurrent link checks
    pub concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Everything one run produces. `incomplete` carries the enumeration error
/// when the upstream failed mid-run; results then cover the partial set.
pub struct RunOutput {
    pub results: ResultSet,
    pub stats: StatsSnapshot,
    pub incomplete: Option<DirectoryError>,
}

/// Runs the whole pipeline for one channel.
pub async fn run(
    directory: &dyn Directory,
    classifier: &LinkClassifier,
    channel_id: &ChannelId,
    options: &EnumerateOptions,
    config: &RunConfig,
    cancel: &CancellationToken,
) -> RunOutput {
    let (items, incomplete) = match enumerate(directory, channel_id, options, cancel).await {
        Ok(items) => (items, None),
        Err(failure) => {
            info!(error = %failure.source, "enumeration incomplete, classifying partial set");
            (failure.partial, Some(failure.source))
        }
    };

    let total = items.len();
    let stats = RunStatistics::new();
    let mut results = ResultSet::new();
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));

    let mut pipeline = stream::iter(
        items
            .into_iter()
            .map(|item| process_item(classifier, item, Arc::clone(&semaphore), cancel)),
    )
    .buffered(ITEM_PIPELINE_WIDTH);

    let mut processed = 0usize;
    while let Some(item_result) = pipeline.next().await {
        // A cancelled run keeps only items that finished before the signal
        if cancel.is_cancelled() {
            break;
        }

        processed += 1;
        println!(
            "  [{processed}/{total}] {} — {} links, {} issues",
            item_result.item.title,
            item_result.link_count(),
            item_result.issue_count()
        );

        stats.record_item(&item_result);
        results.push(item_result);
    }

    RunOutput {
        results,
        stats: stats.snapshot(),
        incomplete,
    }
}

// Extracts and classifies one item's links. Link order in the result
// follows extraction order; classification runs concurrently underneath.
async fn process_item(
    classifier: &LinkClassifier,
    item: Item,
    semaphore: Arc<Semaphore>,
    cancel: &CancellationToken,
) -> ItemResult {
    let urls = extract_urls(&item.description);

    let links: Vec<LinkResult> = stream::iter(urls.into_iter().map(|url| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("probe semaphore closed");
            classifier.classify(&url, cancel).await
        }
    }))
    .buffered(LINKS_IN_FLIGHT_PER_ITEM)
    .collect()
    .await;

    ItemResult { item, links }
}
