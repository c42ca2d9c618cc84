//! X (Twitter) API v2 client
//!
//! Implements both collaborator seams of the processor:
//! - `MentionSource`: recent-search for `@<target>`, newer than the watermark
//! - `ReplySink`: post a reply tweet
//!
//! Authenticates with OAuth 1.0a user context when configured, otherwise with
//! the bearer token.

mod oauth;
pub mod types;

pub use oauth::{generate_oauth_header, percent_encode, OAuth1Credentials};

use crate::config::{Config, XCredentials};
use crate::error::{ReplyError, SourceError};
use crate::ordering::IdOrdering;
use crate::source::{MentionSource, ReplySink};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use echo_types::Mention;
use std::time::Duration;
use types::{translate_mentions, ApiError, PostTweetResponse, SearchResponse};

/// Search page size (API maximum)
const PAGE_SIZE: &str = "100";

/// Pages a first-run fetch may follow. Fetches after a watermark follow every
/// page, bounded by the recent-search window.
const FIRST_RUN_MAX_PAGES: usize = 10;

const TWEET_FIELDS: &str = "author_id,created_at,conversation_id,in_reply_to_user_id";

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Rate limit information from X API response headers
#[derive(Debug, Clone, Default)]
struct RateLimitInfo {
    /// Remaining requests in current window
    remaining: Option<u32>,
    /// Unix timestamp when the rate limit resets
    reset_at: Option<u64>,
}

impl RateLimitInfo {
    fn from_response(response: &reqwest::Response) -> Self {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        };
        Self {
            remaining: header("x-rate-limit-remaining").map(|v: u64| v as u32),
            reset_at: header("x-rate-limit-reset"),
        }
    }

    fn seconds_until_reset(&self) -> Option<u64> {
        self.reset_at
            .map(|reset| reset.saturating_sub(Utc::now().timestamp().max(0) as u64))
    }
}

pub struct XClient {
    http: reqwest::Client,
    api_base: String,
    credentials: XCredentials,
    target_username: String,
    lookback: Duration,
    ordering: IdOrdering,
}

impl XClient {
    pub fn new(config: &Config) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            credentials: config.credentials.clone(),
            target_username: config.echo.target_username.clone(),
            lookback: config.echo.lookback,
            ordering: config.echo.id_ordering,
        })
    }

    /// Authorization header for a request. `query_params` are signed under OAuth 1.0a.
    fn auth_header(&self, method: &str, url: &str, query_params: Option<&[(&str, &str)]>) -> String {
        match (&self.credentials.oauth1, &self.credentials.bearer_token) {
            (Some(oauth1), _) => generate_oauth_header(method, url, oauth1, query_params),
            (None, Some(token)) => format!("Bearer {}", token),
            // Config validation guarantees one of the two
            (None, None) => String::new(),
        }
    }

    /// Look up the monitored account. Confirms credentials and that the account exists.
    pub async fn verify_target(&self) -> Result<String, String> {
        let url = format!(
            "{}/users/by/username/{}",
            self.api_base,
            percent_encode(&self.target_username)
        );
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header("GET", &url, None))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("API error ({}): {}", status, body));
        }

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| format!("Failed to parse response: {}", e))?;
        value["data"]["id"]
            .as_str()
            .map(|id| id.to_string())
            .ok_or_else(|| format!("Could not find user ID for username: {}", self.target_username))
    }

    /// Fetch one page of search results
    async fn search_page(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<SearchResponse, SourceError> {
        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let full_url = format!("{}?{}", url, query_string);

        let response = self
            .http
            .get(&full_url)
            .header("Authorization", self.auth_header("GET", url, Some(params)))
            .send()
            .await?;

        // Parse rate limit headers before consuming response body
        let rate_limit = RateLimitInfo::from_response(&response);
        let status = response.status();
        let body = response.text().await?;

        log::debug!("X search/recent response ({}): {}", status, body);

        if let Some(remaining) = rate_limit.remaining {
            if remaining <= 3 {
                log::warn!(
                    "X: Rate limit low ({} remaining), reset in {:?}s",
                    remaining,
                    rate_limit.seconds_until_reset()
                );
            }
        }

        if status.as_u16() == 429 {
            return Err(SourceError::RateLimited {
                reset_in_secs: rate_limit.seconds_until_reset(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let page: SearchResponse = serde_json::from_str(&body)?;
        if page.data.is_none() {
            if let Some(errors) = &page.errors {
                return Err(SourceError::Other(format!(
                    "X API errors: {}",
                    ApiError::describe(errors)
                )));
            }
        }
        Ok(page)
    }
}

#[async_trait]
impl MentionSource for XClient {
    async fn fetch(&self, after: Option<&str>) -> Result<Vec<Mention>, SourceError> {
        let url = format!("{}/tweets/search/recent", self.api_base);
        let query = format!("@{} -is:retweet", self.target_username);
        let lookback = chrono::Duration::from_std(self.lookback).unwrap_or(chrono::Duration::hours(1));
        let start_time = (Utc::now() - lookback).to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut raw = Vec::new();
        let mut next_token: Option<String> = None;

        let mut pages = 0;
        loop {
            let page = {
                let mut params: Vec<(&str, &str)> = vec![
                    ("query", query.as_str()),
                    ("tweet.fields", TWEET_FIELDS),
                    ("max_results", PAGE_SIZE),
                ];
                // since_id is exclusive; without a watermark fall back to the lookback window
                match after {
                    Some(id) => params.push(("since_id", id)),
                    None => params.push(("start_time", start_time.as_str())),
                }
                if let Some(token) = next_token.as_deref() {
                    params.push(("next_token", token));
                }
                self.search_page(&url, &params).await?
            };
            raw.extend(page.data.unwrap_or_default());
            pages += 1;

            next_token = page.meta.and_then(|m| m.next_token);
            if next_token.is_none() {
                break;
            }
            // Pages arrive newest first: stopping early would drop the oldest
            // mentions below the new watermark for good
            if after.is_none() && pages == FIRST_RUN_MAX_PAGES {
                return Err(SourceError::Truncated { pages });
            }
        }

        let mut mentions = translate_mentions(raw);
        // The API returns newest first
        self.ordering.sort(&mut mentions, |m| m.id.as_str());
        mentions.dedup_by(|a, b| a.id == b.id);

        if let Some(after) = after {
            // since_id is exclusive, but never trust it blindly
            mentions.retain(|m| self.ordering.compare(&m.id, after).is_gt());
        }

        Ok(mentions)
    }
}

#[async_trait]
impl ReplySink for XClient {
    async fn reply(&self, mention_id: &str, text: &str) -> Result<String, ReplyError> {
        let url = format!("{}/tweets", self.api_base);
        let body = serde_json::json!({
            "text": text,
            "reply": {
                "in_reply_to_tweet_id": mention_id
            }
        });

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header("POST", &url, None))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_body = response.text().await?;

        if !status.is_success() {
            return Err(ReplyError::Api {
                status: status.as_u16(),
                body: response_body,
            });
        }

        let data: PostTweetResponse = serde_json::from_str(&response_body)?;
        if let Some(errors) = data.errors {
            return Err(ReplyError::Rejected(ApiError::describe(&errors)));
        }

        data.data
            .map(|tweet| tweet.id)
            .ok_or_else(|| ReplyError::Rejected("No tweet data returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EchoConfig;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use serde_json::json;
    use std::collections::HashMap;

    fn client_for(base: &str, credentials: XCredentials) -> XClient {
        XClient {
            http: reqwest::Client::new(),
            api_base: base.to_string(),
            credentials,
            target_username: "gethen".to_string(),
            lookback: EchoConfig::new("gethen", "hi").lookback,
            ordering: IdOrdering::Lexicographic,
        }
    }

    fn bearer() -> XCredentials {
        XCredentials {
            bearer_token: Some("test-token".to_string()),
            oauth1: None,
        }
    }

    fn tweet(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "text": format!("@gethen mention {}", id),
            "author_id": "7",
            "created_at": "2024-05-13T10:00:00Z"
        })
    }

    /// Fake search endpoint: two pages, newest first, one malformed entry.
    async fn search(req: HttpRequest, query: web::Query<HashMap<String, String>>) -> HttpResponse {
        if req.headers().get("Authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-token") {
            return HttpResponse::Unauthorized().json(json!({"title": "Unauthorized"}));
        }
        if query.get("query").map(String::as_str) == Some("@burst -is:retweet") {
            return burst_page(&query);
        }
        if query.get("query").map(String::as_str) != Some("@gethen -is:retweet") {
            return HttpResponse::BadRequest().finish();
        }
        match query.get("since_id").map(String::as_str) {
            Some("200") => return HttpResponse::Ok().json(json!({"meta": {"result_count": 0}})),
            Some("429") => {
                return HttpResponse::TooManyRequests()
                    .insert_header(("x-rate-limit-remaining", "0"))
                    .finish()
            }
            _ => {}
        }
        match query.get("next_token").map(String::as_str) {
            None => HttpResponse::Ok().json(json!({
                "data": [tweet("105"), tweet("104"), {"id": "103", "text": "no author"}],
                "meta": {"result_count": 3, "next_token": "page2"}
            })),
            Some("page2") => HttpResponse::Ok().json(json!({
                "data": [tweet("102"), tweet("101")],
                "meta": {"result_count": 2}
            })),
            Some(_) => HttpResponse::BadRequest().finish(),
        }
    }

    /// Twelve pages of one mention each, newest first: page n holds ID 200 - n.
    fn burst_page(query: &HashMap<String, String>) -> HttpResponse {
        let page: usize = query
            .get("next_token")
            .and_then(|t| t.strip_prefix('p'))
            .and_then(|n| n.parse().ok())
            .unwrap_or(1);
        let mut body = json!({
            "data": [tweet(&(200 - page).to_string())],
            "meta": {"result_count": 1}
        });
        if page < 12 {
            body["meta"]["next_token"] = json!(format!("p{}", page + 1));
        }
        HttpResponse::Ok().json(body)
    }

    async fn post_tweet(body: web::Json<serde_json::Value>) -> HttpResponse {
        let reply_to = body["reply"]["in_reply_to_tweet_id"].as_str().unwrap_or_default();
        match reply_to {
            "403" => HttpResponse::Forbidden().json(json!({"detail": "You are not allowed to reply"})),
            "422" => HttpResponse::Ok().json(json!({"errors": [{"message": "Duplicate content"}]})),
            _ => HttpResponse::Created().json(json!({
                "data": {"id": format!("9{}", reply_to), "text": body["text"]}
            })),
        }
    }

    async fn user_by_username(path: web::Path<String>) -> HttpResponse {
        if path.as_str() == "gethen" {
            HttpResponse::Ok().json(json!({"data": {"id": "555", "username": "gethen"}}))
        } else {
            HttpResponse::Ok().json(json!({"errors": [{"message": "Not Found"}]}))
        }
    }

    /// Serve the fake API on an ephemeral port; returns its base URL.
    fn start_fake_api() -> String {
        let server = HttpServer::new(|| {
            App::new()
                .route("/2/tweets/search/recent", web::get().to(search))
                .route("/2/tweets", web::post().to(post_tweet))
                .route("/2/users/by/username/{name}", web::get().to(user_by_username))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind fake api");
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}/2", addr)
    }

    #[actix_web::test]
    async fn test_fetch_follows_pages_and_returns_oldest_first() {
        let client = client_for(&start_fake_api(), bearer());
        let mentions = client.fetch(None).await.unwrap();
        let ids: Vec<&str> = mentions.iter().map(|m| m.id.as_str()).collect();
        // Malformed "103" is dropped, the rest re-sorted oldest first
        assert_eq!(ids, vec!["101", "102", "104", "105"]);
    }

    #[actix_web::test]
    async fn test_fetch_after_watermark() {
        let client = client_for(&start_fake_api(), bearer());
        assert!(client.fetch(Some("200")).await.unwrap().is_empty());

        // A source that ignores since_id still cannot leak old mentions through
        let mentions = client.fetch(Some("102")).await.unwrap();
        let ids: Vec<&str> = mentions.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["104", "105"]);
    }

    #[actix_web::test]
    async fn test_fetch_after_watermark_follows_every_page() {
        let mut client = client_for(&start_fake_api(), bearer());
        client.target_username = "burst".to_string();

        let mentions = client.fetch(Some("100")).await.unwrap();
        let ids: Vec<&str> = mentions.iter().map(|m| m.id.as_str()).collect();
        let expected: Vec<String> = (188..=199).map(|id| id.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[actix_web::test]
    async fn test_first_run_beyond_page_cap_fails_instead_of_leaving_a_gap() {
        let mut client = client_for(&start_fake_api(), bearer());
        client.target_username = "burst".to_string();

        assert!(matches!(
            client.fetch(None).await,
            Err(SourceError::Truncated { pages: FIRST_RUN_MAX_PAGES })
        ));
    }

    #[actix_web::test]
    async fn test_fetch_errors() {
        let client = client_for(&start_fake_api(), bearer());
        assert!(matches!(
            client.fetch(Some("429")).await,
            Err(SourceError::RateLimited { .. })
        ));

        let unauthorized = client_for(
            &client.api_base,
            XCredentials {
                bearer_token: Some("wrong".to_string()),
                oauth1: None,
            },
        );
        assert!(matches!(
            unauthorized.fetch(None).await,
            Err(SourceError::Api { status: 401, .. })
        ));

        let unreachable = client_for("http://127.0.0.1:9/2", bearer());
        assert!(matches!(
            unreachable.fetch(None).await,
            Err(SourceError::Request(_))
        ));
    }

    #[actix_web::test]
    async fn test_reply() {
        let client = client_for(&start_fake_api(), bearer());
        assert_eq!(client.reply("101", "thanks!").await.unwrap(), "9101");
        assert!(matches!(
            client.reply("403", "thanks!").await,
            Err(ReplyError::Api { status: 403, .. })
        ));
        assert!(matches!(
            client.reply("422", "thanks!").await,
            Err(ReplyError::Rejected(_))
        ));
    }

    #[actix_web::test]
    async fn test_verify_target() {
        let base = start_fake_api();
        assert_eq!(client_for(&base, bearer()).verify_target().await.unwrap(), "555");

        let mut unknown = client_for(&base, bearer());
        unknown.target_username = "nobody".to_string();
        assert!(unknown.verify_target().await.is_err());
    }

    #[test]
    fn test_auth_header_prefers_oauth1() {
        let client = client_for(
            "http://localhost/2",
            XCredentials {
                bearer_token: Some("t".to_string()),
                oauth1: Some(OAuth1Credentials::new("ck".into(), "cs".into(), "at".into(), "ats".into())),
            },
        );
        assert!(client.auth_header("POST", "http://localhost/2/tweets", None).starts_with("OAuth "));
        assert_eq!(
            client_for("http://localhost/2", bearer()).auth_header("GET", "http://localhost/2", None),
            "Bearer test-token"
        );
    }
}
