//! Chapter extraction
//!
//! Locates chapters for a podcast episode from three sources: a remote
//! JSON chapter index referenced by the feed, an inline chapter list in
//! the feed entry, and timestamps written into the free-text description.

pub mod aggregator;
pub mod cache;
pub mod description;
pub mod inline;
pub mod remote;
pub mod timestamp;

// Re-export main types
pub use aggregator::{extract_chapters, ExtractOptions};
pub use cache::RemoteChapterCache;
pub use description::extract_description_chapters;
pub use inline::{extract_inline_chapters, extract_inline_chapters_from_file};
pub use remote::fetch_remote_chapters;
pub use timestamp::{format_timestamp, parse_timestamp};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A single content marker within an episode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    /// Offset from the start of the episode
    pub start_seconds: u32,
    /// Human-readable label
    pub title: String,
    /// Companion link found in the source
    pub url: Option<String>,
    /// Companion image, only provided by remote chapter indexes
    pub image_url: Option<String>,
}

impl Chapter {
    pub fn new(start_seconds: u32, title: impl Into<String>) -> Self {
        Self {
            start_seconds,
            title: title.into(),
            url: None,
            image_url: None,
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }
}

/// Provenance of a chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterSource {
    /// Timestamps found in the episode description text
    Description,
    /// Remote JSON index referenced by `podcast:chapters`
    Pci,
    /// Inline `psc:chapters` list
    Psc,
    // Reserved for generated chapters; nothing produces these yet.
    Gemini,
    Id3,
    OpenAi,
    Sonnet,
}

impl ChapterSource {
    /// Sources the extractors in this crate can produce
    pub const EXTRACTED: [ChapterSource; 3] = [Self::Description, Self::Pci, Self::Psc];

    /// Tag stored in the `source` column
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Pci => "pci",
            Self::Psc => "psc",
            Self::Gemini => "gemini",
            Self::Id3 => "id3",
            Self::OpenAi => "openai",
            Self::Sonnet => "sonnet",
        }
    }

    pub fn is_reserved(&self) -> bool {
        !Self::EXTRACTED.contains(self)
    }
}

impl fmt::Display for ChapterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.tag())
    }
}

impl FromStr for ChapterSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "description" => Ok(Self::Description),
            "pci" | "remote" => Ok(Self::Pci),
            "psc" | "inline" => Ok(Self::Psc),
            "gemini" => Ok(Self::Gemini),
            "id3" => Ok(Self::Id3),
            "openai" => Ok(Self::OpenAi),
            "sonnet" => Ok(Self::Sonnet),
            other => Err(format!("Unknown chapter source: {}", other)),
        }
    }
}

/// Persisted chapter row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterRecord {
    pub enclosure_url: String,
    pub guid: Option<String>,
    pub source: ChapterSource,
    pub start_seconds: u32,
    pub title: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

impl ChapterRecord {
    pub fn new(
        enclosure_url: &str,
        guid: Option<&str>,
        source: ChapterSource,
        chapter: Chapter,
    ) -> Self {
        Self {
            enclosure_url: enclosure_url.to_string(),
            guid: guid.map(str::to_string),
            source,
            start_seconds: chapter.start_seconds,
            title: chapter.title,
            url: chapter.url,
            image_url: chapter.image_url,
        }
    }

    /// Tag every chapter of one episode with its provenance
    pub fn for_episode(
        enclosure_url: &str,
        guid: Option<&str>,
        source: ChapterSource,
        chapters: Vec<Chapter>,
    ) -> Vec<Self> {
        chapters
            .into_iter()
            .map(|chapter| Self::new(enclosure_url, guid, source, chapter))
            .collect()
    }
}

/// Enforce the per-source chapter invariants: non-empty titles, no exact
/// `(start_seconds, title)` duplicates, non-decreasing start times.
pub(crate) fn normalize_chapters(chapters: Vec<Chapter>) -> Vec<Chapter> {
    let mut seen = HashSet::new();
    let mut normalized: Vec<Chapter> = chapters
        .into_iter()
        .filter(|c| !c.title.trim().is_empty())
        .filter(|c| seen.insert((c.start_seconds, c.title.clone())))
        .collect();

    // Stable, so already-ordered sources keep their natural order
    normalized.sort_by_key(|c| c.start_seconds);
    normalized
}
