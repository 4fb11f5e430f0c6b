// src/main.rs
// =============================================================================
// Entry point of the link-inspector CLI.
//
// 1. Parse arguments with clap
// 2. Dispatch to the inspect or check handler
// 3. Print results as a table or JSON
// 4. Exit with 0 (clean), 1 (issues found), or 2 (error / aborted run)
// =============================================================================

mod aggregate;
mod checker;
mod cli;
mod directory;
mod enumerate;
mod extract;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use aggregate::{run as run_inspection, ItemResult, RunConfig, RunOutput, SortKey, StatsSnapshot};
use checker::{DomainPolicy, LinkClassifier, LinkResult, LinkStatus, ProbeConfig, ReqwestFetcher};
use cli::{Cli, Commands};
use directory::{resolve, ApiKeyDirectory, Directory, TokenDirectory};
use enumerate::EnumerateOptions;

#[tokio::main]
async fn main() {
    // Diagnostics go to stderr through tracing; stdout stays clean for
    // the report itself.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            channel,
            api_key,
            token,
            max_items,
            published_after,
            published_before,
            sort,
            concurrency,
            skip_domains,
            json,
        } => {
            let directory = build_directory(api_key, token)?;
            let options = EnumerateOptions {
                start_date: published_after.map(day_start),
                end_date: published_before.map(day_end),
                max_items: Some(max_items),
            };
            let config = RunConfig { concurrency };
            handle_inspect(
                directory.as_ref(),
                &channel,
                options,
                config,
                sort.map(SortKey::from),
                skip_domains,
                json,
            )
            .await
        }
        Commands::Check { url, json } => handle_check(&url, json).await,
    }
}

fn build_directory(
    api_key: Option<String>,
    token: Option<String>,
) -> Result<Box<dyn Directory>> {
    match (api_key, token) {
        (Some(key), None) => Ok(Box::new(ApiKeyDirectory::new(key))),
        (None, Some(token)) => Ok(Box::new(TokenDirectory::new(token))),
        _ => bail!("provide either --api-key or --token for the directory API"),
    }
}

fn build_classifier(extra_skip_domains: Vec<String>) -> Result<LinkClassifier> {
    let mut policy = DomainPolicy::default();
    policy.trusted_domains.extend(extra_skip_domains);

    let fetcher = ReqwestFetcher::new()?;
    Ok(LinkClassifier::new(
        Arc::new(fetcher),
        policy,
        ProbeConfig::default(),
    ))
}

// Wires Ctrl-C to the run-scoped cancellation token.
fn spawn_cancel_watcher() -> CancellationToken {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping: abandoning in-flight checks...");
            watcher.cancel();
        }
    });
    cancel
}

async fn handle_inspect(
    directory: &dyn Directory,
    channel: &str,
    options: EnumerateOptions,
    config: RunConfig,
    sort: Option<SortKey>,
    skip_domains: Vec<String>,
    json: bool,
) -> Result<i32> {
    let classifier = build_classifier(skip_domains)?;
    let cancel = spawn_cancel_watcher();

    println!("🔍 Resolving channel: {channel}");
    let channel_id = resolve(directory, channel).await?;
    println!("📺 Channel id: {channel_id}");

    println!("📄 Enumerating items and checking links...\n");
    let RunOutput {
        mut results,
        stats,
        incomplete,
    } = run_inspection(directory, &classifier, &channel_id, &options, &config, &cancel).await;

    if let Some(key) = sort {
        results.toggle_sort(key);
    }
    let view = results.view();

    if json {
        let report = Report {
            items: &view,
            stats,
            incomplete: incomplete.as_ref().map(|e| e.to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&view, &stats);
    }

    if let Some(error) = incomplete {
        eprintln!(
            "⚠️  Enumeration incomplete: {error} — results cover {} item(s)",
            stats.item_count
        );
        return Ok(2);
    }

    Ok(if stats.issue_count > 0 { 1 } else { 0 })
}

async fn handle_check(url: &str, json: bool) -> Result<i32> {
    let classifier = build_classifier(Vec::new())?;
    let cancel = spawn_cancel_watcher();

    println!("🌐 Checking {url}...");
    let result = classifier.classify(url, &cancel).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "{} {} — {} ({} attempt(s))",
            status_icon(result.status),
            result.url,
            result.status_text,
            result.attempts
        );
    }

    Ok(if result.is_issue() { 1 } else { 0 })
}

#[derive(Serialize)]
struct Report<'a> {
    items: &'a [ItemResult],
    stats: StatsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    incomplete: Option<String>,
}

fn print_report(view: &[ItemResult], stats: &StatsSnapshot) {
    for result in view {
        println!(
            "\n▶ {} — {} links, {} issues",
            result.item.title,
            result.link_count(),
            result.issue_count()
        );

        if result.links.is_empty() {
            println!("   (no links in this description)");
            continue;
        }

        for link in &result.links {
            print_link(link);
        }
    }

    println!("\n📊 Summary:");
    println!("   🎬 Items: {}", stats.item_count);
    println!("   🔗 Links: {}", stats.link_count);
    println!("   ❗ Issues: {}", stats.issue_count);
    println!("   ⏭️  Unchecked: {}", stats.unchecked_count);
}

fn print_link(link: &LinkResult) {
    let url_display = truncate_display(&link.url, 70);

    println!(
        "   {} {:<70} {}",
        status_icon(link.status),
        url_display,
        link.status_text
    );
}

fn status_icon(status: LinkStatus) -> &'static str {
    match status {
        LinkStatus::Valid => "✅",
        LinkStatus::Broken => "❌",
        LinkStatus::Suspicious => "⚠️ ",
        LinkStatus::Unchecked => "⏭️ ",
    }
}

// Cuts long text for the table, backing up to a char boundary so multibyte
// URLs never split mid-character.
fn truncate_display(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut cut = limit - 3;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

fn day_start(date: NaiveDate) -> chrono::DateTime<chrono::Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("valid wall-clock time")
        .and_utc()
}

fn day_end(date: NaiveDate) -> chrono::DateTime<chrono::Utc> {
    date.and_hms_opt(23, 59, 59)
        .expect("valid wall-clock time")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bounds_are_inclusive_edges() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(day_start(date).to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(day_end(date).to_rfc3339(), "2024-03-01T23:59:59+00:00");
    }

    #[test]
    fn test_url_display_truncates_on_char_boundary() {
        let short = "https://example.com";
        assert_eq!(truncate_display(short, 70), short);

        let long = format!("https://example.com/{}", "x".repeat(80));
        let display = truncate_display(&long, 70);
        assert_eq!(display.len(), 70);
        assert!(display.ends_with("..."));

        // Multibyte path: the cut must land on a char boundary
        let accented = format!("https://{}", "é".repeat(40));
        let display = truncate_display(&accented, 70);
        assert!(display.ends_with("..."));
        assert!(display.len() <= 70);
    }

    #[test]
    fn test_build_directory_requires_exactly_one_credential() {
        assert!(build_directory(None, None).is_err());
        assert!(build_directory(Some("k".into()), None).is_ok());
        assert!(build_directory(None, Some("t".into())).is_ok());
    }
}
