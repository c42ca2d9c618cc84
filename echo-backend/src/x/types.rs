//! Raw X API v2 payloads and the translation into `Mention`.
//!
//! Every field of a raw tweet is optional here: the API is loosely typed, and
//! one bad entry must not sink the whole batch.

use chrono::{DateTime, Utc};
use echo_types::Mention;
use serde::Deserialize;

/// `GET /2/tweets/search/recent` response
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub data: Option<Vec<serde_json::Value>>,
    pub meta: Option<SearchMeta>,
    pub errors: Option<Vec<ApiError>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchMeta {
    pub result_count: Option<i64>,
    pub next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawTweet {
    pub id: Option<String>,
    pub text: Option<String>,
    pub author_id: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn describe(errors: &[ApiError]) -> String {
        errors
            .iter()
            .map(|e| e.detail.as_deref().unwrap_or(&e.message).to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// `POST /2/tweets` response
#[derive(Debug, Deserialize)]
pub struct PostTweetResponse {
    pub data: Option<PostedTweet>,
    pub errors: Option<Vec<ApiError>>,
}

#[derive(Debug, Deserialize)]
pub struct PostedTweet {
    pub id: String,
}

/// Map one raw tweet to a `Mention`, or explain why it was rejected.
pub fn to_mention(raw: serde_json::Value) -> Result<Mention, String> {
    let tweet: RawTweet =
        serde_json::from_value(raw).map_err(|e| format!("unexpected shape: {}", e))?;

    let id = tweet
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| "missing id".to_string())?;
    let author_id = tweet
        .author_id
        .filter(|a| !a.is_empty())
        .ok_or_else(|| format!("tweet {} missing author_id", id))?;
    let created_at = tweet
        .created_at
        .ok_or_else(|| format!("tweet {} missing created_at", id))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| format!("tweet {} has bad created_at '{}': {}", id, created_at, e))?
        .with_timezone(&Utc);

    Ok(Mention {
        id,
        author_id,
        created_at,
        text: tweet.text.unwrap_or_default(),
    })
}

/// Translate a batch, dropping malformed entries with a warning.
pub fn translate_mentions(raw: Vec<serde_json::Value>) -> Vec<Mention> {
    raw.into_iter()
        .filter_map(|value| match to_mention(value) {
            Ok(mention) => Some(mention),
            Err(reason) => {
                log::warn!("X: Skipping malformed mention: {}", reason);
                None
            }
        })
        .collect()
}
