// src/extract.rs
// =============================================================================
// This module pulls candidate URLs out of free-text item descriptions.
//
// Descriptions are plain text, so extraction is token based:
// - Split on whitespace
// - Keep tokens that start with http:// or https://
// - Strip trailing sentence punctuation that the author wrote after the URL
// - Drop exact repeats, keeping first-occurrence order
// =============================================================================

use std::collections::HashSet;

// Punctuation that belongs to the sentence, not the URL
const TRAILING_PUNCTUATION: [char; 6] = ['.', ',', ';', ':', '!', '?'];

// Extracts all HTTP/HTTPS URLs from a block of description text.
//
// Pure function: no network, no state. Empty input yields an empty vec.
//
// Example:
//   "Check https://example.com/a. and http://broken-demo/404!"
//   -> ["https://example.com/a", "http://broken-demo/404"]
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for token in text.split_whitespace() {
        if !is_http_url(token) {
            continue;
        }

        // Trailing '.' or '!' after a URL is almost always sentence structure
        let url = token.trim_end_matches(TRAILING_PUNCTUATION);
        if !is_http_url(url) {
            continue;
        }

        // Deduplicate within one description, preserving first occurrence
        if seen.insert(url.to_string()) {
            urls.push(url.to_string());
        }
    }

    urls
}

// A token counts as a URL only for the http/https schemes.
// Skips mailto:, tel:, ftp:, and bare domains without a scheme.
fn is_http_url(token: &str) -> bool {
    let rest = token
        .strip_prefix("https://")
        .or_else(|| token.strip_prefix("http://"));
    matches!(rest, Some(r) if !r.is_empty())
}
