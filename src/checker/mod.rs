// src/checker/mod.rs
// =============================================================================
// Link checking: domain policy, network probe, and the layered classifier.
//
// Submodules:
// - domains: trusted/storefront allowlists and the suspicion heuristic
// - probe: the retrying, backoff-governed network probe
// - classify: maps one URL to a LinkResult through the layered strategy
// =============================================================================

mod classify;
mod domains;
mod probe;

pub use classify::{LinkClassifier, LinkResult, LinkStatus};
pub use domains::DomainPolicy;
pub use probe::{FailureKind, Fetcher, FetchedPage, ProbeConfig, ReqwestFetcher};

#[cfg(test)]
pub(crate) use probe::testing;
