//! Image search provider
//!
//! Resolves a query string to a candidate image URL through the Google
//! Custom Search JSON API. Requests are rate limited to one per second.

use crate::config::SearchCredentials;
use crate::error::{truncate_reason, AcquireError};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

/// Custom Search endpoint
pub const CUSTOM_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Number of candidates requested per query; the first one is used
const RESULTS_PER_QUERY: u32 = 3;

/// Maps a query to a downloadable URL
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for `query` with extra `context` words appended
    ///
    /// `Ok(None)` means the provider answered but found nothing.
    async fn search(&self, query: &str, context: &str) -> Result<Option<String>, AcquireError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
}

/// Google Custom Search client restricted to image results
pub struct ImageSearchClient {
    client: reqwest::Client,
    credentials: SearchCredentials,
    base_url: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl ImageSearchClient {
    pub fn new(
        credentials: SearchCredentials,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            credentials,
            base_url: CUSTOM_SEARCH_URL.to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(NonZeroU32::MIN)),
        })
    }

    /// Point the client at a different endpoint (used by tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Join query and context words the way the search expects them
pub fn full_query(query: &str, context: &str) -> String {
    format!("{} {}", query.trim(), context.trim()).trim().to_string()
}

#[async_trait]
impl SearchProvider for ImageSearchClient {
    async fn search(&self, query: &str, context: &str) -> Result<Option<String>, AcquireError> {
        self.rate_limiter.until_ready().await;

        let q = full_query(query, context);
        debug!(query = %q, "Querying image search");

        let num = RESULTS_PER_QUERY.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", self.credentials.api_key.as_str()),
                ("cx", self.credentials.engine_id.as_str()),
                ("q", q.as_str()),
                ("searchType", "image"),
                ("num", num.as_str()),
                ("imgSize", "large"),
                ("safe", "active"),
            ])
            .send()
            .await
            .map_err(|e| AcquireError::Transient(format!("search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(search_status_error(status, &body));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AcquireError::Transient(format!("invalid search response: {}", e)))?;

        let link = parsed.items.into_iter().map(|item| item.link).next();
        match &link {
            Some(url) => info!(query = %q, url = %url, "Image search hit"),
            None => info!(query = %q, "Image search returned no results"),
        }
        Ok(link)
    }
}

/// Map a failed search response to the error taxonomy
///
/// 429, and 403 mentioning a quota or rate limit, are quota exhaustion.
/// Other client errors (bad key, bad engine id) cannot succeed on retry.
fn search_status_error(status: StatusCode, body: &str) -> AcquireError {
    let lowered = body.to_ascii_lowercase();
    let mentions_quota = lowered.contains("quota")
        || lowered.contains("rate limit")
        || lowered.contains("ratelimit");

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            AcquireError::QuotaExceeded("search API rate limit (HTTP 429)".to_string())
        }
        StatusCode::FORBIDDEN if mentions_quota => {
            AcquireError::QuotaExceeded("search API daily quota exhausted (HTTP 403)".to_string())
        }
        s if s.is_server_error() => AcquireError::Transient(format!(
            "search API error (HTTP {})",
            s.as_u16()
        )),
        s => AcquireError::NotFound(format!(
            "search request rejected (HTTP {}): {}",
            s.as_u16(),
            truncate_reason(body.trim())
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_query_joins_context() {
        assert_eq!(
            full_query("Kerala Chenda instrument", "indian musical instrument traditional"),
            "Kerala Chenda instrument indian musical instrument traditional"
        );
        assert_eq!(full_query("Lakha Khan", ""), "Lakha Khan");
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            search_status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            AcquireError::QuotaExceeded(_)
        ));
        assert!(matches!(
            search_status_error(
                StatusCode::FORBIDDEN,
                r#"{"error":{"message":"Quota exceeded for quota metric 'Queries'"}}"#
            ),
            AcquireError::QuotaExceeded(_)
        ));
        assert!(matches!(
            search_status_error(StatusCode::FORBIDDEN, "API key not valid"),
            AcquireError::NotFound(_)
        ));
        assert!(matches!(
            search_status_error(StatusCode::BAD_GATEWAY, ""),
            AcquireError::Transient(_)
        ));
    }

    #[test]
    fn test_response_without_items_parses() {
        let parsed: SearchResponse =
            serde_json::from_str(r#"{"kind":"customsearch#search"}"#).unwrap();
        assert!(parsed.items.is_empty());
    }
}
