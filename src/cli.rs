// src/cli.rs
// =============================================================================
// Command-line interface, built with clap's derive API.
//
// Two subcommands:
// - inspect: run the full channel audit
// - check: classify a single URL with the same classifier stack
// =============================================================================

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use crate::aggregate::{SortKey, DEFAULT_CONCURRENCY};
use crate::enumerate::ALL_ITEMS_CEILING;

#[derive(Parser, Debug)]
#[command(
    name = "link-inspector",
    version,
    about = "Audit the outbound links in a channel's video descriptions",
    long_about = "link-inspector enumerates a channel's videos through the upstream \
                  directory API, extracts the URLs in each description, and classifies \
                  every link as valid, broken, suspicious, or unchecked."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect every link in a channel's video descriptions
    ///
    /// Example: link-inspector inspect https://www.youtube.com/@somecreator --api-key KEY
    Inspect {
        /// Channel reference: channel URL, @handle, or raw channel id
        channel: String,

        /// Directory API key (sent as a query parameter)
        #[arg(long, conflicts_with = "token")]
        api_key: Option<String>,

        /// OAuth bearer token (sent as an Authorization header)
        #[arg(long)]
        token: Option<String>,

        /// Maximum number of items to inspect, or 'all'
        #[arg(long, default_value = "50", value_parser = parse_max_items)]
        max_items: usize,

        /// Only items published on or after this date (YYYY-MM-DD, inclusive)
        #[arg(long, value_parser = parse_date)]
        published_after: Option<NaiveDate>,

        /// Only items published on or before this date (YYYY-MM-DD, inclusive)
        #[arg(long, value_parser = parse_date)]
        published_before: Option<NaiveDate>,

        /// Sort the report by a count key (descending, zero-count items hidden)
        #[arg(long, value_enum)]
        sort: Option<SortArg>,

        /// Upper bound on concurrent link checks
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Extra trusted domain to skip (repeatable)
        #[arg(long = "skip-domain", value_name = "DOMAIN")]
        skip_domains: Vec<String>,

        /// Output results as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check a single URL with the same classifier
    ///
    /// Example: link-inspector check https://example.com/page
    Check {
        /// URL to classify
        url: String,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },
}

/// CLI spelling of the sort keys: by-link-count, by-issue-count, by-unchecked-count.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SortArg {
    ByLinkCount,
    ByIssueCount,
    ByUncheckedCount,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::ByLinkCount => SortKey::LinkCount,
            SortArg::ByIssueCount => SortKey::IssueCount,
            SortArg::ByUncheckedCount => SortKey::UncheckedCount,
        }
    }
}

fn parse_max_items(value: &str) -> Result<usize, String> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(ALL_ITEMS_CEILING);
    }
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("expected a number or 'all', got '{value}'")),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}
