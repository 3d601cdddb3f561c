//! Podcast Chapters
//!
//! Chapter extraction for a local podcast archive. Chapters come from
//! timestamps in episode descriptions, inline chapter lists in feed items
//! and remote JSON chapter indexes, and are backfilled into SQLite.

pub mod backfill;
pub mod chapters;
pub mod config;
pub mod datastore;
pub mod error;
pub mod feed;
pub mod http;
pub mod import;

// Re-export main types for easy access
pub use crate::backfill::{Backfill, PassSummary};
pub use crate::chapters::{Chapter, ChapterRecord, ChapterSource, RemoteChapterCache};
pub use crate::config::Config;
pub use crate::datastore::Datastore;
pub use crate::error::{ChapterError, Result};
pub use crate::feed::XmlElement;
pub use crate::http::{ChapterFetcher, HttpDownloader, RequestHeaders};
pub use crate::import::{import_feed, ImportSummary};
