// src/directory/resolve.rs
// =============================================================================
// Turns an operator-supplied channel reference into a canonical ChannelId.
//
// Accepted shapes:
//   https://www.youtube.com/channel/UC...   direct id
//   https://www.youtube.com/@handle         handle
//   https://www.youtube.com/c/Name          custom URL
//   https://www.youtube.com/user/Name       legacy username
//   @handle                                 bare handle
//   UC...                                   bare channel id
//   Name                                    bare custom name
//
// Non-direct shapes resolve through the directory: username lookup first,
// then channel search as a fallback.
// =============================================================================

use thiserror::Error;
use url::Url;

use super::{ChannelId, Directory, DirectoryError};

/// A parsed channel reference, before directory resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelQuery {
    /// Canonical id; no directory round-trip needed
    Id(String),
    /// `@handle` form
    Handle(String),
    /// Custom URL name (`/c/Name`)
    Custom(String),
    /// Legacy username (`/user/Name`)
    LegacyUser(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not a recognizable channel reference: {0}")]
    InvalidReference(String),
    #[error("no channel found for '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Resolves a reference to its canonical channel id. The reference itself is
/// not retained anywhere past this call.
pub async fn resolve(
    directory: &dyn Directory,
    reference: &str,
) -> Result<ChannelId, ResolveError> {
    let query = parse_channel_reference(reference)?;

    let name = match query {
        ChannelQuery::Id(id) => return Ok(ChannelId(id)),
        ChannelQuery::Handle(handle) => handle,
        ChannelQuery::Custom(name) | ChannelQuery::LegacyUser(name) => name,
    };

    if let Some(channel) = directory.channel_by_username(&name).await? {
        return Ok(channel);
    }

    // Handles and custom URLs usually miss the username index; fall back to
    // a channel search on the bare name.
    let search_term = name.trim_start_matches('@');
    if let Some(channel) = directory.search_channel(search_term).await? {
        return Ok(channel);
    }

    Err(ResolveError::NotFound(reference.to_string()))
}

/// Parses a reference string without touching the network.
pub fn parse_channel_reference(reference: &str) -> Result<ChannelQuery, ResolveError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ResolveError::InvalidReference(reference.to_string()));
    }

    if let Some(handle) = reference.strip_prefix('@') {
        if !handle.is_empty() && !handle.contains('/') {
            return Ok(ChannelQuery::Handle(format!("@{handle}")));
        }
    }

    if looks_like_channel_id(reference) {
        return Ok(ChannelQuery::Id(reference.to_string()));
    }

    if reference.contains('/') || reference.contains("youtube.com") {
        return parse_channel_url(reference);
    }

    // A bare word resolves like a custom URL name
    Ok(ChannelQuery::Custom(reference.to_string()))
}

fn parse_channel_url(reference: &str) -> Result<ChannelQuery, ResolveError> {
    let with_scheme = if reference.contains("://") {
        reference.to_string()
    } else {
        format!("https://{reference}")
    };

    let url = Url::parse(&with_scheme)
        .map_err(|_| ResolveError::InvalidReference(reference.to_string()))?;

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !(host == "youtube.com" || host.ends_with(".youtube.com")) {
        return Err(ResolveError::InvalidReference(reference.to_string()));
    }

    let mut segments = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()))
        .ok_or_else(|| ResolveError::InvalidReference(reference.to_string()))?;

    let query = match (segments.next(), segments.next()) {
        (Some("channel"), Some(id)) => ChannelQuery::Id(id.to_string()),
        (Some("c"), Some(name)) => ChannelQuery::Custom(name.to_string()),
        (Some("user"), Some(name)) => ChannelQuery::LegacyUser(name.to_string()),
        (Some(handle), _) if handle.starts_with('@') && handle.len() > 1 => {
            ChannelQuery::Handle(handle.to_string())
        }
        _ => return Err(ResolveError::InvalidReference(reference.to_string())),
    };

    Ok(query)
}

// Canonical ids are "UC" plus 22 URL-safe base64 characters.
fn looks_like_channel_id(reference: &str) -> bool {
    reference.len() == 24
        && reference.starts_with("UC")
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
