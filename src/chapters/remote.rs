//! Remote JSON chapter indexes (`podcast:chapters`)

use super::{normalize_chapters, Chapter};
use crate::error::{ChapterError, Result};
use crate::http::ChapterFetcher;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ChapterIndex {
    chapters: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    #[serde(rename = "startTime")]
    start_time: StartTime,
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    img: Option<String>,
}

/// Publishers emit both `12` and `12.5`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StartTime {
    Seconds(u64),
    Fractional(f64),
}

impl StartTime {
    fn to_seconds(&self) -> Option<u32> {
        match *self {
            StartTime::Seconds(s) => u32::try_from(s).ok(),
            StartTime::Fractional(f) if f.is_finite() && f >= 0.0 && f < u32::MAX as f64 => {
                Some(f as u32)
            }
            StartTime::Fractional(_) => None,
        }
    }
}

/// Resolve a chapter index URL into chapters.
///
/// An existing file at `cache_path` is used in place of the network and is
/// never revalidated. Otherwise the index is fetched and, when a cache path
/// is given, the raw body is written there before parsing. Any failure is
/// logged and reported as `None`.
pub async fn fetch_remote_chapters(
    fetcher: &dyn ChapterFetcher,
    url: &str,
    headers: &HashMap<String, String>,
    cache_path: Option<&Path>,
) -> Option<Vec<Chapter>> {
    match load_remote_chapters(fetcher, url, headers, cache_path).await {
        Ok(chapters) if chapters.is_empty() => {
            debug!("Chapter index {} lists no chapters", url);
            None
        }
        Ok(chapters) => Some(chapters),
        Err(e) => {
            warn!("⚠️ {}", e);
            None
        }
    }
}

async fn load_remote_chapters(
    fetcher: &dyn ChapterFetcher,
    url: &str,
    headers: &HashMap<String, String>,
    cache_path: Option<&Path>,
) -> Result<Vec<Chapter>> {
    if let Some(path) = cache_path.filter(|p| p.exists()) {
        debug!("📁 Using cached chapter index {}", path.display());
        let body = tokio::fs::read_to_string(path).await?;
        return parse_chapter_index(url, &body);
    }

    let response = fetcher.get(url, headers).await?;
    if !response.is_success() {
        return Err(ChapterError::fetch_status(url, response.status));
    }

    if let Some(path) = cache_path {
        if let Err(e) = write_cache_file(path, &response.body).await {
            warn!("Failed to cache chapter index {}: {}", path.display(), e);
        } else {
            info!("💾 Cached chapter index {}", path.display());
        }
    }

    parse_chapter_index(url, &response.body)
}

async fn write_cache_file(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, body).await?;
    Ok(())
}

/// Parse the body of a chapter index. `url` is only used in errors.
pub fn parse_chapter_index(url: &str, body: &str) -> Result<Vec<Chapter>> {
    let index: ChapterIndex =
        serde_json::from_str(body).map_err(|e| ChapterError::parse(url, e))?;

    let chapters = index
        .chapters
        .into_iter()
        .map(|entry| {
            let start = entry.start_time.to_seconds().ok_or_else(|| {
                ChapterError::parse(url, format!("invalid startTime {:?}", entry.start_time))
            })?;
            Ok(Chapter::new(start, entry.title)
                .with_url(entry.url)
                .with_image_url(entry.img))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(normalize_chapters(chapters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockFetcher;
    use tempfile::TempDir;

    const INDEX_URL: &str = "https://cdn.test/ep1/chapters.json";
    const INDEX: &str = r#"{
        "version": "1.2.0",
        "chapters": [
            {"startTime": 0, "title": "Intro"},
            {"startTime": 95, "title": "Interview", "url": "https://guest.test", "img": "https://cdn.test/guest.jpg"},
            {"startTime": 1800.75, "title": "Outro", "toc": false}
        ]
    }"#;

    fn headers() -> HashMap<String, String> {
        HashMap::from([("User-Agent".to_string(), "test".to_string())])
    }

    #[tokio::test]
    async fn test_existing_cache_file_skips_network() {
        let temp_dir = TempDir::new().unwrap();
        let cache_path = temp_dir.path().join("ep1.json");
        std::fs::write(&cache_path, INDEX).unwrap();
        let fetcher = MockFetcher::new();

        let chapters = fetch_remote_chapters(&fetcher, INDEX_URL, &headers(), Some(&cache_path))
            .await
            .unwrap();

        assert_eq!(fetcher.call_count(), 0);
        assert_eq!(
            chapters,
            vec![
                Chapter::new(0, "Intro"),
                Chapter::new(95, "Interview")
                    .with_url(Some("https://guest.test".to_string()))
                    .with_image_url(Some("https://cdn.test/guest.jpg".to_string())),
                Chapter::new(1800, "Outro"),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_writes_cache_before_parsing() {
        let temp_dir = TempDir::new().unwrap();
        let cache_path = temp_dir.path().join("nested").join("ep1.json");
        let fetcher = MockFetcher::new().with_body(INDEX_URL, INDEX);

        let chapters = fetch_remote_chapters(&fetcher, INDEX_URL, &headers(), Some(&cache_path))
            .await
            .unwrap();

        assert_eq!(chapters.len(), 3);
        assert_eq!(fetcher.calls(), vec![INDEX_URL]);
        assert_eq!(std::fs::read_to_string(&cache_path).unwrap(), INDEX);

        // Second call is served from the file
        fetch_remote_chapters(&fetcher, INDEX_URL, &headers(), Some(&cache_path))
            .await
            .unwrap();
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_no_chapters() {
        let temp_dir = TempDir::new().unwrap();
        let cache_path = temp_dir.path().join("ep1.json");
        let fetcher = MockFetcher::new().with_status(INDEX_URL, 404);

        let result = fetch_remote_chapters(&fetcher, INDEX_URL, &headers(), Some(&cache_path)).await;

        assert!(result.is_none());
        assert!(!cache_path.exists());
    }

    #[tokio::test]
    async fn test_malformed_body_is_no_chapters() {
        let fetcher = MockFetcher::new()
            .with_body(INDEX_URL, r#"{"chapters": [{"startTime": "zero", "title": "Intro"}]}"#);

        assert!(fetch_remote_chapters(&fetcher, INDEX_URL, &headers(), None).await.is_none());
    }

    #[tokio::test]
    async fn test_without_cache_path_always_fetches() {
        let fetcher = MockFetcher::new().with_body(INDEX_URL, INDEX);

        fetch_remote_chapters(&fetcher, INDEX_URL, &headers(), None).await.unwrap();
        fetch_remote_chapters(&fetcher, INDEX_URL, &headers(), None).await.unwrap();

        assert_eq!(fetcher.call_count(), 2);
    }

    #[test]
    fn test_parse_rejects_missing_chapters_key() {
        assert!(matches!(
            parse_chapter_index(INDEX_URL, r#"{"version": "1.2.0"}"#),
            Err(ChapterError::Parse { .. })
        ));
        assert!(parse_chapter_index(INDEX_URL, "not json").is_err());
    }

    #[test]
    fn test_parse_rejects_entry_without_title() {
        assert!(parse_chapter_index(INDEX_URL, r#"{"chapters": [{"startTime": 5}]}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_negative_start() {
        assert!(parse_chapter_index(INDEX_URL, r#"{"chapters": [{"startTime": -3, "title": "x"}]}"#).is_err());
    }

    #[test]
    fn test_parse_empty_index() {
        assert!(parse_chapter_index(INDEX_URL, r#"{"chapters": []}"#).unwrap().is_empty());
    }
}
