// src/checker/probe.rs
// =============================================================================
// The network probe behind the link classifier.
//
// Two probe modes share one retry/backoff policy:
// - existence: HEAD first, falling back to GET when the target rejects HEAD
// - retrieval: GET, keeping the body for the storefront availability scan
//
// Every failed attempt (transport failure or HTTP error status) is retried
// up to max_attempts, waiting 2^attempt backoff units between attempts. The
// final attempt's outcome is authoritative.
// =============================================================================

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// Per-attempt timeout and redirect ceiling for the real client
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 5;

// HEAD is optional for servers; these statuses mean "try again with GET"
const METHOD_NOT_ALLOWED: u16 = 405;
const NOT_IMPLEMENTED: u16 = 501;

/// How a single network attempt failed, before any HTTP status was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FailureKind {
    #[error("connection timed out")]
    Timeout,
    #[error("could not resolve host")]
    Dns,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("certificate error")]
    Certificate,
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("connection failed")]
    Connection,
}

/// A failed fetch attempt: the kind plus the underlying error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub detail: String,
}

/// A completed retrieval: final status after redirects, plus the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

// The network seam the prober works through. The real implementation wraps
// reqwest; tests script their own.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Existence-only request. Returns the final status code.
    async fn head(&self, url: &str) -> Result<u16, FetchFailure>;

    /// Full retrieval, body included.
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchFailure>;
}

/// Retry/backoff settings shared by every network path.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub max_attempts: u32,
    /// One backoff "time unit"; attempt n is followed by a 2^n-unit wait
    pub backoff_unit: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

/// Terminal outcome of a probe, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeDisposition {
    /// 2xx-3xx after following redirects. Body present in retrieval mode.
    Success { status: u16, body: Option<String> },
    /// The target answered, but with an error status.
    HttpError(u16),
    /// No usable response on the last attempt.
    Failed(FetchFailure),
    /// The run was cancelled before a terminal outcome.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub disposition: ProbeDisposition,
    pub attempts: u32,
}

/// Existence probe: is there anything alive at this URL?
pub async fn probe(
    fetcher: &dyn Fetcher,
    url: &str,
    config: &ProbeConfig,
    cancel: &CancellationToken,
) -> ProbeOutcome {
    probe_inner(fetcher, url, config, cancel, false).await
}

/// Retrieval probe: like `probe`, but keeps the page body on success.
pub async fn retrieve(
    fetcher: &dyn Fetcher,
    url: &str,
    config: &ProbeConfig,
    cancel: &CancellationToken,
) -> ProbeOutcome {
    probe_inner(fetcher, url, config, cancel, true).await
}

async fn probe_inner(
    fetcher: &dyn Fetcher,
    url: &str,
    config: &ProbeConfig,
    cancel: &CancellationToken,
    retrieval: bool,
) -> ProbeOutcome {
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            return ProbeOutcome {
                disposition: ProbeDisposition::Cancelled,
                attempts,
            };
        }

        attempts += 1;

        let disposition = if retrieval {
            match fetcher.get(url).await {
                Ok(page) if page.status < 400 => {
                    return ProbeOutcome {
                        disposition: ProbeDisposition::Success {
                            status: page.status,
                            body: Some(page.body),
                        },
                        attempts,
                    }
                }
                Ok(page) => ProbeDisposition::HttpError(page.status),
                Err(failure) => ProbeDisposition::Failed(failure),
            }
        } else {
            match head_then_get(fetcher, url).await {
                Ok(status) if status < 400 => {
                    return ProbeOutcome {
                        disposition: ProbeDisposition::Success { status, body: None },
                        attempts,
                    }
                }
                Ok(status) => ProbeDisposition::HttpError(status),
                Err(failure) => ProbeDisposition::Failed(failure),
            }
        };

        if attempts >= config.max_attempts {
            return ProbeOutcome {
                disposition,
                attempts,
            };
        }

        // Exponential backoff: 2^attempt units before the next try.
        // Cancellation abandons the wait instead of sleeping it out.
        let wait = config.backoff_unit * 2u32.pow(attempts);
        tokio::select! {
            _ = cancel.cancelled() => {
                return ProbeOutcome {
                    disposition: ProbeDisposition::Cancelled,
                    attempts,
                }
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

// One existence attempt: HEAD, then GET if the server rejects the method.
async fn head_then_get(fetcher: &dyn Fetcher, url: &str) -> Result<u16, FetchFailure> {
    match fetcher.head(url).await {
        Ok(status) if status == METHOD_NOT_ALLOWED || status == NOT_IMPLEMENTED => {
            fetcher.get(url).await.map(|page| page.status)
        }
        other => other,
    }
}

/// Production fetcher backed by a pooled reqwest client.
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn head(&self, url: &str) -> Result<u16, FetchFailure> {
        match self.client.head(url).send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) => Err(categorize_error(e)),
        }
    }

    async fn get(&self, url: &str) -> Result<FetchedPage, FetchFailure> {
        let response = self.client.get(url).send().await.map_err(categorize_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(FetchedPage { status, body })
    }
}

// Maps a reqwest error onto our failure kinds. reqwest does not expose the
// low-level cause directly, so connection errors are told apart by their text.
fn categorize_error(error: reqwest::Error) -> FetchFailure {
    let detail = error.to_string();
    let lowered = detail.to_ascii_lowercase();

    let kind = if error.is_timeout() {
        FailureKind::Timeout
    } else if error.is_redirect() {
        FailureKind::TooManyRedirects
    } else if lowered.contains("certificate") || lowered.contains("ssl") {
        FailureKind::Certificate
    } else if error.is_connect() {
        if lowered.contains("dns") || lowered.contains("resolve") {
            FailureKind::Dns
        } else if lowered.contains("refused") {
            FailureKind::ConnectionRefused
        } else {
            FailureKind::Connection
        }
    } else if lowered.contains("dns") || lowered.contains("resolve") {
        FailureKind::Dns
    } else {
        FailureKind::Connection
    };

    FetchFailure { kind, detail }
}
