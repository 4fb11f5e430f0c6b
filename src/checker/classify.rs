// src/checker/classify.rs
// =============================================================================
// Classifies one candidate URL into a LinkResult.
//
// Decision order, first match wins:
// 1. Trusted-domain bypass: no network call, reported as `unchecked`
// 2. Storefront check: fetch the page and scan for "listing removed" markers
// 3. Generic existence probe with retry/backoff
//
// This boundary never raises; every terminal outcome is encoded in the
// returned status.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::domains::{host_of, DomainPolicy};
use super::probe::{self, Fetcher, ProbeConfig, ProbeDisposition};

/// Terminal category for one checked link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// The target answered with a non-error status
    Valid,
    /// The target is gone, erroring, or unreachable after retries
    Broken,
    /// Reachable, but the host trips the suspicion heuristic
    Suspicious,
    /// Deliberately not probed (trusted domain, or run cancelled)
    Unchecked,
}

/// Outcome of classifying one candidate link. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkResult {
    pub url: String,
    pub status: LinkStatus,
    pub status_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LinkResult {
    /// Broken and suspicious links both count toward the issue total.
    pub fn is_issue(&self) -> bool {
        matches!(self.status, LinkStatus::Broken | LinkStatus::Suspicious)
    }

    fn unchecked(url: &str, status_text: &str) -> Self {
        Self {
            url: url.to_string(),
            status: LinkStatus::Unchecked,
            status_text: status_text.to_string(),
            status_code: None,
            attempts: 0,
            error: None,
        }
    }
}

pub struct LinkClassifier {
    fetcher: Arc<dyn Fetcher>,
    policy: DomainPolicy,
    config: ProbeConfig,
}

impl LinkClassifier {
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: DomainPolicy, config: ProbeConfig) -> Self {
        Self {
            fetcher,
            policy,
            config,
        }
    }

    /// Classifies one URL. Never fails; network trouble becomes `broken`.
    pub async fn classify(&self, url: &str, cancel: &CancellationToken) -> LinkResult {
        let Some(host) = host_of(url) else {
            return LinkResult {
                url: url.to_string(),
                status: LinkStatus::Broken,
                status_text: "malformed URL".to_string(),
                status_code: None,
                attempts: 0,
                error: None,
            };
        };

        if self.policy.is_trusted(&host) {
            return LinkResult::unchecked(url, "skipped (trusted domain)");
        }

        if self.policy.is_storefront(&host) {
            return self.check_storefront(url, cancel).await;
        }

        self.check_generic(url, cancel).await
    }

    // Storefront pages answer 200 even for removed listings, so the body is
    // scanned for the configured unavailability markers.
    async fn check_storefront(&self, url: &str, cancel: &CancellationToken) -> LinkResult {
        let outcome = probe::retrieve(self.fetcher.as_ref(), url, &self.config, cancel).await;

        match outcome.disposition {
            ProbeDisposition::Success { status, body } => {
                let body = body.unwrap_or_default().to_lowercase();
                let removed = self
                    .policy
                    .unavailable_markers
                    .iter()
                    .any(|marker| body.contains(marker.as_str()));

                if removed {
                    LinkResult {
                        url: url.to_string(),
                        status: LinkStatus::Broken,
                        status_text: "item unavailable (listing removed)".to_string(),
                        status_code: Some(status),
                        attempts: outcome.attempts,
                        error: None,
                    }
                } else {
                    LinkResult {
                        url: url.to_string(),
                        status: LinkStatus::Valid,
                        status_text: "valid link".to_string(),
                        status_code: Some(status),
                        attempts: outcome.attempts,
                        error: None,
                    }
                }
            }
            ProbeDisposition::HttpError(code) => LinkResult {
                url: url.to_string(),
                status: LinkStatus::Broken,
                status_text: status_text_for(code),
                status_code: Some(code),
                attempts: outcome.attempts,
                error: None,
            },
            ProbeDisposition::Failed(failure) => LinkResult {
                url: url.to_string(),
                status: LinkStatus::Broken,
                status_text: failure.kind.to_string(),
                status_code: None,
                attempts: outcome.attempts,
                error: Some(failure.detail),
            },
            ProbeDisposition::Cancelled => LinkResult::unchecked(url, "check cancelled"),
        }
    }

    async fn check_generic(&self, url: &str, cancel: &CancellationToken) -> LinkResult {
        let outcome = probe::probe(self.fetcher.as_ref(), url, &self.config, cancel).await;

        match outcome.disposition {
            ProbeDisposition::Success { status, .. } => {
                if self.policy.is_suspicious(url) {
                    LinkResult {
                        url: url.to_string(),
                        status: LinkStatus::Suspicious,
                        status_text: "suspicious domain".to_string(),
                        status_code: Some(status),
                        attempts: outcome.attempts,
                        error: None,
                    }
                } else {
                    LinkResult {
                        url: url.to_string(),
                        status: LinkStatus::Valid,
                        status_text: "valid link".to_string(),
                        status_code: Some(status),
                        attempts: outcome.attempts,
                        error: None,
                    }
                }
            }
            ProbeDisposition::HttpError(code) => LinkResult {
                url: url.to_string(),
                status: LinkStatus::Broken,
                status_text: status_text_for(code),
                status_code: Some(code),
                attempts: outcome.attempts,
                error: None,
            },
            ProbeDisposition::Failed(failure) => LinkResult {
                url: url.to_string(),
                status: LinkStatus::Broken,
                status_text: failure.kind.to_string(),
                status_code: None,
                attempts: outcome.attempts,
                error: Some(failure.detail),
            },
            ProbeDisposition::Cancelled => LinkResult::unchecked(url, "check cancelled"),
        }
    }
}

// Human-readable text for an HTTP error status.
fn status_text_for(code: u16) -> String {
    match code {
        404 => "page not found".to_string(),
        403 => "access forbidden".to_string(),
        500..=599 => "server error".to_string(),
        _ => format!("HTTP error {code}"),
    }
}
