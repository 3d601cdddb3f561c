//! Error types for chapter extraction
//!
//! Every variant is caught at the extractor boundary and downgraded to
//! "no chapters found" plus a log line; none of them abort a backfill run.

/// Result type for chapter extraction operations
pub type Result<T> = std::result::Result<T, ChapterError>;

#[derive(thiserror::Error, Debug)]
pub enum ChapterError {
    /// A timestamp string could not be converted to seconds
    #[error("Invalid timestamp '{0}'")]
    Format(String),

    /// A structured chapter source is malformed or incomplete
    #[error("Malformed chapter list: {0}")]
    Extraction(String),

    /// Non-success HTTP status or transport failure
    #[error("Failed to fetch {url}{}: {reason}", status_suffix(.status))]
    Fetch {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// Remote chapter index with an unexpected shape
    #[error("Failed to parse chapter index {url}: {reason}")]
    Parse { url: String, reason: String },

    /// Feed document that is not well-formed XML
    #[error("Invalid feed XML: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl ChapterError {
    pub fn fetch_status(url: &str, status: u16) -> Self {
        Self::Fetch {
            url: url.to_string(),
            status: Some(status),
            reason: "non-success status".to_string(),
        }
    }

    pub fn parse(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_mentions_status() {
        let err = ChapterError::fetch_status("https://example.test/ch.json", 404);
        let message = err.to_string();
        assert!(message.contains("HTTP 404"));
        assert!(message.contains("https://example.test/ch.json"));
    }

    #[test]
    fn test_transport_error_without_status() {
        let err = ChapterError::Fetch {
            url: "https://example.test".to_string(),
            status: None,
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch https://example.test: connection refused"
        );
    }
}
