use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::FetchError;
use crate::ratelimit::RateLimiter;

const BASE_FILTER: &str = "game:paper -is:digital";

/// One page of raw search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub records: Vec<Value>,
    pub has_more: bool,
    pub total_cards: Option<u64>,
}

impl SearchPage {
    /// The "no more pages" answer.
    pub fn end() -> Self {
        SearchPage::default()
    }
}

/// Anything that can hand out pages of raw card records.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch page `page` (1-based) of `query`. No retries happen here.
    async fn fetch_page(&self, query: &str, page: u32) -> Result<SearchPage, FetchError>;
}

/// Paper-only, non-digital cards, optionally restricted to some sets.
pub fn build_query(set_codes: &[String]) -> String {
    if set_codes.is_empty() {
        return BASE_FILTER.to_string();
    }
    let sets = set_codes
        .iter()
        .map(|s| format!("set:{}", s.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("({}) {}", sets, BASE_FILTER)
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    total_cards: Option<u64>,
}

/// Turn an HTTP status and body into a page, an end-of-results marker or an error.
pub fn interpret_response(status: u16, body: &str) -> Result<SearchPage, FetchError> {
    if status == 404 {
        // Scryfall answers 404 both past the last page and for empty searches.
        return Ok(SearchPage::end());
    }
    if !(200..300).contains(&status) {
        return Err(FetchError::Status {
            status,
            body: body.chars().take(300).collect(),
        });
    }
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    let has_more = parsed.has_more && !parsed.data.is_empty();
    Ok(SearchPage {
        records: parsed.data,
        has_more,
        total_cards: parsed.total_cards,
    })
}

/// Scryfall `/cards/search` client.
pub struct ScryfallClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl ScryfallClient {
    pub fn new(settings: &Settings, limiter: Arc<RateLimiter>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(concat!("card_importer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ScryfallClient {
            http,
            base_url: settings.search_base_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }
}

#[async_trait]
impl PageSource for ScryfallClient {
    async fn fetch_page(&self, query: &str, page: u32) -> Result<SearchPage, FetchError> {
        self.limiter.acquire().await;

        let url = format!("{}/cards/search", self.base_url);
        let page_param = page.to_string();
        debug!("GET {} q={:?} page={}", url, query, page);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[
                ("q", query),
                ("page", page_param.as_str()),
                ("format", "json"),
                ("order", "name"),
            ])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        let result = interpret_response(status, &body)?;
        info!(
            "Page {}: {} records (has_more={})",
            page,
            result.records.len(),
            result.has_more
        );
        Ok(result)
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_without_sets() {
        assert_eq!(build_query(&[]), "game:paper -is:digital");
    }

    #[test]
    fn query_with_sets_is_anded() {
        let q = build_query(&["NEO".into(), "mid".into()]);
        assert_eq!(q, "(set:neo OR set:mid) game:paper -is:digital");
    }

    #[test]
    fn not_found_ends_pagination() {
        let page = interpret_response(404, r#"{"object":"error","code":"not_found"}"#).unwrap();
        assert!(page.records.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn fixture_page_parses() {
        let body = std::fs::read_to_string("tests/fixtures/search_page.json").unwrap();
        let page = interpret_response(200, &body).unwrap();
        assert_eq!(page.records.len(), 3);
        assert!(!page.has_more);
        assert_eq!(page.total_cards, Some(3));
    }

    #[test]
    fn has_more_flag_is_honored() {
        let page = interpret_response(200, r#"{"data":[{"id":"a"}],"has_more":true,"total_cards":900}"#)
            .unwrap();
        assert!(page.has_more);

        // An empty page never claims more.
        let page = interpret_response(200, r#"{"data":[],"has_more":true}"#).unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn server_error_is_transient() {
        let err = interpret_response(503, "overloaded").unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn garbage_body_is_malformed() {
        let err = interpret_response(200, "<html>").unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
        assert!(!err.is_transient());
    }
}
