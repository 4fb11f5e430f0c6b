// src/directory/api.rs
// =============================================================================
// Concrete Directory implementations over the YouTube Data API v3.
//
// One client per credential mode:
// - ApiKeyDirectory appends the key as a query parameter
// - TokenDirectory sends an OAuth bearer header
//
// Both are the same generic client; only the Authorize step differs.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

use super::{
    ChannelId, CollectionId, Directory, DirectoryError, ItemDetail, ItemPage, RawEntry,
    MAX_BATCH_SIZE, MAX_PAGE_SIZE,
};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

// How a prepared request gets its credentials attached.
pub trait Authorize: Send + Sync {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder;
}

/// API-key mode: the key rides along as a query parameter.
pub struct KeyAuth {
    api_key: String,
}

impl Authorize for KeyAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.query(&[("key", self.api_key.as_str())])
    }
}

/// OAuth mode: a resolved bearer token in the Authorization header.
pub struct BearerAuth {
    token: String,
}

impl Authorize for BearerAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }
}

/// Generic directory client; the type parameter fixes the credential mode.
pub struct ApiClient<A> {
    client: Client,
    base_url: String,
    auth: A,
}

/// Directory client authenticating with an API key.
pub type ApiKeyDirectory = ApiClient<KeyAuth>;

/// Directory client authenticating with a resolved OAuth token.
pub type TokenDirectory = ApiClient<BearerAuth>;

impl ApiKeyDirectory {
    pub fn new(api_key: impl Into<String>) -> Self {
        ApiClient {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            auth: KeyAuth {
                api_key: api_key.into(),
            },
        }
    }
}

impl TokenDirectory {
    pub fn new(token: impl Into<String>) -> Self {
        ApiClient {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            auth: BearerAuth {
                token: token.into(),
            },
        }
    }
}

impl<A: Authorize> ApiClient<A> {
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request(&self, endpoint: &str, params: &[(&str, String)]) -> RequestBuilder {
        self.auth.apply(
            self.client
                .get(format!("{}/{}", self.base_url, endpoint))
                .query(params),
        )
    }
}

#[async_trait]
impl<A: Authorize> Directory for ApiClient<A> {
    async fn channel_by_username(
        &self,
        username: &str,
    ) -> Result<Option<ChannelId>, DirectoryError> {
        let response: ChannelListResponse = get_json(self.request(
            "channels",
            &[
                ("part", "id".to_string()),
                ("forUsername", username.to_string()),
            ],
        ))
        .await?;

        Ok(response.items.into_iter().next().map(|c| ChannelId(c.id)))
    }

    async fn search_channel(&self, query: &str) -> Result<Option<ChannelId>, DirectoryError> {
        let response: SearchListResponse = get_json(self.request(
            "search",
            &[
                ("part", "snippet".to_string()),
                ("type", "channel".to_string()),
                ("q", query.to_string()),
            ],
        ))
        .await?;

        Ok(response
            .items
            .into_iter()
            .find_map(|hit| hit.id.channel_id)
            .map(ChannelId))
    }

    async fn uploads_collection(
        &self,
        channel: &ChannelId,
    ) -> Result<CollectionId, DirectoryError> {
        let response: ChannelListResponse = get_json(self.request(
            "channels",
            &[
                ("part", "contentDetails".to_string()),
                ("id", channel.0.clone()),
            ],
        ))
        .await?;

        response
            .items
            .into_iter()
            .next()
            .and_then(|c| c.content_details)
            .map(|d| CollectionId(d.related_playlists.uploads))
            .ok_or(DirectoryError::NotFound)
    }

    async fn list_items(
        &self,
        collection: &CollectionId,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ItemPage, DirectoryError> {
        let mut params = vec![
            ("part", "snippet,contentDetails".to_string()),
            ("playlistId", collection.0.clone()),
            ("maxResults", page_size.min(MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("pageToken", cursor.to_string()));
        }

        let response: PlaylistItemsResponse = get_json(self.request("playlistItems", &params)).await?;

        let entries = response
            .items
            .into_iter()
            .filter_map(RawEntry::from_playlist_item)
            .collect();

        Ok(ItemPage {
            entries,
            next_cursor: response.next_page_token,
        })
    }

    async fn item_details(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, ItemDetail>, DirectoryError> {
        debug_assert!(ids.len() <= MAX_BATCH_SIZE);

        let response: VideoListResponse = get_json(self.request(
            "videos",
            &[("part", "snippet".to_string()), ("id", ids.join(","))],
        ))
        .await?;

        Ok(response
            .items
            .into_iter()
            .map(|video| {
                (
                    video.id,
                    ItemDetail {
                        description: video.snippet.description,
                        channel_id: ChannelId(video.snippet.channel_id),
                    },
                )
            })
            .collect())
    }
}

// Sends a prepared request and maps the response onto the directory error
// taxonomy.
async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, DirectoryError> {
    let response = request
        .send()
        .await
        .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

    match response.status() {
        status if status.is_success() => response
            .json()
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("malformed response: {e}"))),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let body = response.text().await.unwrap_or_default();
            Err(DirectoryError::Unauthorized(truncate(&body)))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(DirectoryError::RateLimited),
        StatusCode::NOT_FOUND => Err(DirectoryError::NotFound),
        status => Err(DirectoryError::Unavailable(format!("HTTP {status}"))),
    }
}

// Error bodies can be localized; the cut backs up to a char boundary so a
// multibyte character at the limit never panics the error path.
fn truncate(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.len() <= LIMIT {
        return body.to_string();
    }
    let mut cut = LIMIT;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}

impl RawEntry {
    // Entries can reference deleted or private videos with no usable id or
    // timestamp; those are skipped rather than surfaced as items.
    fn from_playlist_item(item: PlaylistItem) -> Option<Self> {
        let published_at = item
            .content_details
            .video_published_at
            .or(item.snippet.published_at)?;
        let channel_id = item
            .snippet
            .video_owner_channel_id
            .or(item.snippet.channel_id)?;

        Some(Self {
            item_id: item.content_details.video_id?,
            title: item.snippet.title,
            thumbnail: item
                .snippet
                .thumbnails
                .and_then(|t| t.default)
                .map(|t| t.url)
                .unwrap_or_default(),
            channel_id: ChannelId(channel_id),
            published_at,
        })
    }
}

// --- response models -------------------------------------------------------

#[derive(Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelResource>,
}

#[derive(Deserialize)]
struct ChannelResource {
    id: String,
    #[serde(rename = "contentDetails")]
    content_details: Option<ChannelContentDetails>,
}

#[derive(Deserialize)]
struct ChannelContentDetails {
    #[serde(rename = "relatedPlaylists")]
    related_playlists: RelatedPlaylists,
}

#[derive(Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: SearchHitId,
}

#[derive(Deserialize)]
struct SearchHitId {
    #[serde(rename = "channelId")]
    channel_id: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
    #[serde(rename = "contentDetails")]
    content_details: PlaylistContentDetails,
}

#[derive(Deserialize)]
struct PlaylistSnippet {
    title: String,
    #[serde(rename = "channelId")]
    channel_id: Option<String>,
    #[serde(rename = "videoOwnerChannelId")]
    video_owner_channel_id: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Deserialize)]
struct PlaylistContentDetails {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
    #[serde(rename = "videoPublishedAt")]
    video_published_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoResource>,
}

#[derive(Deserialize)]
struct VideoResource {
    id: String,
    snippet: VideoSnippet,
}

#[derive(Deserialize)]
struct VideoSnippet {
    #[serde(rename = "channelId")]
    channel_id: String,
    description: String,
}
