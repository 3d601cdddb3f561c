//! HTTP fetching for chapter indexes and feeds

use crate::error::{ChapterError, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Browser user agents rotated across requests
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Overcast/3.0 (+http://overcast.fm/; iOS podcast app)",
];

/// Response of a GET request
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    /// Header names lowercased
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// GET with custom headers
///
/// Non-success statuses are returned as responses; only transport failures
/// are errors.
#[async_trait]
pub trait ChapterFetcher: Send + Sync {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<FetchResponse>;
}

/// reqwest-backed fetcher
#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(request_timeout_seconds: u64, connect_timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_seconds))
            .connect_timeout(Duration::from_secs(connect_timeout_seconds))
            .build()
            .map_err(|e| ChapterError::Fetch {
                url: String::new(),
                status: None,
                reason: format!("could not build HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ChapterFetcher for HttpDownloader {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<FetchResponse> {
        let transport = |e: reqwest::Error| ChapterError::Fetch {
            url: url.to_string(),
            status: None,
            reason: e.to_string(),
        };

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!("GET {}", url);
        let response = request.send().await.map_err(transport)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(transport)?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

/// Builds per-request headers, picking a random user agent each time
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    user_agents: Vec<String>,
}

impl RequestHeaders {
    pub fn new(user_agents: Vec<String>) -> Self {
        Self { user_agents }
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    pub fn build(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(agent) = self.user_agent() {
            headers.insert("User-Agent".to_string(), agent.to_string());
        }
        headers
    }
}

impl Default for RequestHeaders {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect())
    }
}

/// Scripted fetcher for tests; unknown URLs answer 404
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, FetchResponse>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchResponse {
                status: 200,
                headers: HashMap::from([(
                    "content-type".to_string(),
                    "application/json".to_string(),
                )]),
                body: body.to_string(),
            },
        );
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchResponse {
                status,
                ..Default::default()
            },
        );
        self
    }

    /// URLs requested so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }
}

#[async_trait]
impl ChapterFetcher for MockFetcher {
    async fn get(&self, url: &str, _headers: &HashMap<String, String>) -> Result<FetchResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        Ok(self.responses.get(url).cloned().unwrap_or(FetchResponse {
            status: 404,
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_records_calls() {
        let fetcher = MockFetcher::new().with_body("https://a.test/c.json", "{}");

        let hit = fetcher.get("https://a.test/c.json", &HashMap::new()).await.unwrap();
        let miss = fetcher.get("https://a.test/other.json", &HashMap::new()).await.unwrap();

        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, "{}");
        assert_eq!(miss.status, 404);
        assert_eq!(
            fetcher.calls(),
            vec!["https://a.test/c.json", "https://a.test/other.json"]
        );
    }

    #[test]
    fn test_success_range() {
        let mut response = FetchResponse {
            status: 204,
            ..Default::default()
        };
        assert!(response.is_success());
        response.status = 304;
        assert!(!response.is_success());
        response.status = 404;
        assert!(!response.is_success());
    }

    #[test]
    fn test_headers_use_configured_agents() {
        let headers = RequestHeaders::new(vec!["agent-a".to_string(), "agent-b".to_string()]);
        for _ in 0..20 {
            let built = headers.build();
            let agent = built.get("User-Agent").unwrap();
            assert!(agent == "agent-a" || agent == "agent-b");
        }
    }

    #[test]
    fn test_no_agents_means_no_header() {
        assert!(RequestHeaders::new(Vec::new()).build().is_empty());
    }

    #[test]
    fn test_default_agents() {
        let headers = RequestHeaders::default();
        assert!(DEFAULT_USER_AGENTS.contains(&headers.user_agent().unwrap()));
    }

    #[test]
    fn test_downloader_builds() {
        assert!(HttpDownloader::new(30, 10).is_ok());
    }
}
