//! SQLite storage for feeds, episodes and extracted chapters

use crate::chapters::{ChapterRecord, ChapterSource};
use crate::feed::FeedItem;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Episode with a description and no description chapters yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionCandidate {
    pub enclosure_url: String,
    pub guid: Option<String>,
    pub description: String,
}

/// Episode with a chapter index URL and no remote chapters yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCandidate {
    pub enclosure_url: String,
    pub guid: Option<String>,
    pub title: Option<String>,
    pub chapters_url: String,
}

/// Episode whose feed entry carries an inline chapter list not stored yet.
/// The feed title locates the archived feed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineCandidate {
    pub enclosure_url: String,
    pub guid: String,
    pub feed_title: String,
}

/// Chapter rows per source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCount {
    pub source: String,
    pub chapters: usize,
    pub episodes: usize,
}

pub struct Datastore {
    conn: Connection,
}

impl Datastore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
        ",
        )?;

        let db = Self { conn };
        db.init_schema()?;

        debug!("Opened datastore {}", db_path.display());
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                xml_url TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                last_updated TEXT
            );

            CREATE TABLE IF NOT EXISTS episodes (
                enclosure_url TEXT PRIMARY KEY,
                feed_xml_url TEXT NOT NULL,
                guid TEXT,
                title TEXT,
                description TEXT,
                chapters_url TEXT,
                inline_chapters_version TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_episodes_feed ON episodes(feed_xml_url);

            CREATE TABLE IF NOT EXISTS chapters (
                enclosure_url TEXT NOT NULL,
                guid TEXT,
                source TEXT NOT NULL,
                time INTEGER NOT NULL,
                content TEXT NOT NULL,
                url TEXT,
                image TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_chapters_episode_source
                ON chapters(enclosure_url, source);
        "#,
        )?;
        Ok(())
    }

    pub fn upsert_feed(&self, xml_url: &str, title: &str) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO feeds (xml_url, title, last_updated) VALUES (?1, ?2, ?3)
               ON CONFLICT(xml_url) DO UPDATE SET
                   title = excluded.title,
                   last_updated = excluded.last_updated"#,
            params![xml_url, title, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn upsert_episode(&self, feed_xml_url: &str, item: &FeedItem) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO episodes
                   (enclosure_url, feed_xml_url, guid, title, description, chapters_url, inline_chapters_version)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(enclosure_url) DO UPDATE SET
                   feed_xml_url = excluded.feed_xml_url,
                   guid = excluded.guid,
                   title = excluded.title,
                   description = excluded.description,
                   chapters_url = excluded.chapters_url,
                   inline_chapters_version = excluded.inline_chapters_version"#,
            params![
                item.enclosure_url,
                feed_xml_url,
                item.guid,
                item.title,
                item.description,
                item.chapters_url,
                item.inline_chapters_version,
            ],
        )?;
        Ok(())
    }

    /// Insert chapter rows in a single transaction
    pub fn insert_chapters(&mut self, records: &[ChapterRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"INSERT INTO chapters (enclosure_url, guid, source, time, content, url, image)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            )?;
            for record in records {
                stmt.execute(params![
                    record.enclosure_url,
                    record.guid,
                    record.source.tag(),
                    record.start_seconds,
                    record.title,
                    record.url,
                    record.image_url,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Inserted {} chapter rows", records.len());
        Ok(records.len())
    }

    pub fn description_candidates(&self) -> Result<Vec<DescriptionCandidate>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT e.enclosure_url, e.guid, e.description
               FROM episodes e
               WHERE e.description IS NOT NULL AND e.description != ''
                 AND NOT EXISTS (
                     SELECT 1 FROM chapters c
                     WHERE c.enclosure_url = e.enclosure_url AND c.source = ?1)
               ORDER BY e.rowid"#,
        )?;
        let candidates = stmt
            .query_map([ChapterSource::Description.tag()], |row| {
                Ok(DescriptionCandidate {
                    enclosure_url: row.get(0)?,
                    guid: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    pub fn remote_candidates(&self) -> Result<Vec<RemoteCandidate>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT e.enclosure_url, e.guid, e.title, e.chapters_url
               FROM episodes e
               WHERE e.chapters_url IS NOT NULL AND e.chapters_url != ''
                 AND NOT EXISTS (
                     SELECT 1 FROM chapters c
                     WHERE c.enclosure_url = e.enclosure_url AND c.source = ?1)
               ORDER BY e.rowid"#,
        )?;
        let candidates = stmt
            .query_map([ChapterSource::Pci.tag()], |row| {
                Ok(RemoteCandidate {
                    enclosure_url: row.get(0)?,
                    guid: row.get(1)?,
                    title: row.get(2)?,
                    chapters_url: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    pub fn inline_candidates(&self) -> Result<Vec<InlineCandidate>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT e.enclosure_url, e.guid, f.title
               FROM episodes e
               JOIN feeds f ON f.xml_url = e.feed_xml_url
               WHERE e.inline_chapters_version IS NOT NULL AND e.guid IS NOT NULL
                 AND NOT EXISTS (
                     SELECT 1 FROM chapters c
                     WHERE c.enclosure_url = e.enclosure_url AND c.source = ?1)
               ORDER BY e.rowid"#,
        )?;
        let candidates = stmt
            .query_map([ChapterSource::Psc.tag()], |row| {
                Ok(InlineCandidate {
                    enclosure_url: row.get(0)?,
                    guid: row.get(1)?,
                    feed_title: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    /// Sources that already have chapter rows for an episode
    pub fn sources_for_episode(&self, enclosure_url: &str) -> Result<BTreeSet<ChapterSource>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT source FROM chapters WHERE enclosure_url = ?1")?;
        let tags = stmt
            .query_map([enclosure_url], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags.iter().filter_map(|t| t.parse().ok()).collect())
    }

    pub fn chapters_for_episode(&self, enclosure_url: &str) -> Result<Vec<ChapterRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT enclosure_url, guid, source, time, content, url, image
               FROM chapters
               WHERE enclosure_url = ?1
               ORDER BY source, time, rowid"#,
        )?;
        let rows = stmt
            .query_map([enclosure_url], |row| {
                Ok((
                    row.get::<_, String>(2)?,
                    ChapterRecord {
                        enclosure_url: row.get(0)?,
                        guid: row.get(1)?,
                        source: ChapterSource::Description,
                        start_seconds: row.get(3)?,
                        title: row.get(4)?,
                        url: row.get(5)?,
                        image_url: row.get(6)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(tag, mut record)| {
                record.source = tag.parse().ok()?;
                Some(record)
            })
            .collect())
    }

    pub fn chapter_counts(&self) -> Result<Vec<SourceCount>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT source, COUNT(*), COUNT(DISTINCT enclosure_url)
               FROM chapters
               GROUP BY source
               ORDER BY source"#,
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok(SourceCount {
                    source: row.get(0)?,
                    chapters: row.get::<_, i64>(1)? as usize,
                    episodes: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    pub fn episode_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn feed_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM feeds", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::Chapter;
    use tempfile::TempDir;

    const FEED_URL: &str = "https://feeds.test/show.xml";

    fn setup_test_db() -> (Datastore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Datastore::open(&db_path).unwrap();
        (db, temp_dir)
    }

    fn item(enclosure: &str) -> FeedItem {
        FeedItem {
            enclosure_url: enclosure.to_string(),
            guid: Some(format!("guid-{}", enclosure)),
            title: Some("Episode".to_string()),
            description: None,
            chapters_url: None,
            inline_chapters_version: None,
        }
    }

    #[test]
    fn test_candidates_by_prerequisite() {
        let (db, _temp) = setup_test_db();
        db.upsert_feed(FEED_URL, "Show").unwrap();

        let mut with_description = item("a.mp3");
        with_description.description = Some("<p>0:00 Intro</p>".to_string());
        let mut with_index = item("b.mp3");
        with_index.chapters_url = Some("https://cdn.test/b.json".to_string());
        let mut with_inline = item("c.mp3");
        with_inline.inline_chapters_version = Some("1.2".to_string());
        let mut empty_description = item("d.mp3");
        empty_description.description = Some(String::new());

        for episode in [&with_description, &with_index, &with_inline, &empty_description] {
            db.upsert_episode(FEED_URL, episode).unwrap();
        }

        let description = db.description_candidates().unwrap();
        assert_eq!(description.len(), 1);
        assert_eq!(description[0].enclosure_url, "a.mp3");

        let remote = db.remote_candidates().unwrap();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].chapters_url, "https://cdn.test/b.json");

        let inline = db.inline_candidates().unwrap();
        assert_eq!(inline.len(), 1);
        assert_eq!(inline[0].guid, "guid-c.mp3");
        assert_eq!(inline[0].feed_title, "Show");
    }

    #[test]
    fn test_inserted_source_excludes_candidate() {
        let (mut db, _temp) = setup_test_db();
        db.upsert_feed(FEED_URL, "Show").unwrap();
        let mut episode = item("a.mp3");
        episode.description = Some("text".to_string());
        episode.chapters_url = Some("https://cdn.test/a.json".to_string());
        db.upsert_episode(FEED_URL, &episode).unwrap();

        let records = ChapterRecord::for_episode(
            "a.mp3",
            episode.guid.as_deref(),
            ChapterSource::Description,
            vec![Chapter::new(0, "Intro"), Chapter::new(60, "Main")],
        );
        assert_eq!(db.insert_chapters(&records).unwrap(), 2);

        assert!(db.description_candidates().unwrap().is_empty());
        // Other sources are tracked independently
        assert_eq!(db.remote_candidates().unwrap().len(), 1);
    }

    #[test]
    fn test_chapters_round_trip_with_source() {
        let (mut db, _temp) = setup_test_db();
        let chapter = Chapter::new(95, "Interview")
            .with_url(Some("https://guest.test".to_string()))
            .with_image_url(Some("https://cdn.test/g.jpg".to_string()));
        let records = ChapterRecord::for_episode("a.mp3", None, ChapterSource::Pci, vec![chapter]);
        db.insert_chapters(&records).unwrap();

        assert_eq!(db.chapters_for_episode("a.mp3").unwrap(), records);
        assert_eq!(
            db.sources_for_episode("a.mp3").unwrap(),
            BTreeSet::from([ChapterSource::Pci])
        );
        assert!(db.chapters_for_episode("other.mp3").unwrap().is_empty());
    }

    #[test]
    fn test_upsert_episode_updates_fields() {
        let (db, _temp) = setup_test_db();
        db.upsert_feed(FEED_URL, "Show").unwrap();
        db.upsert_feed(FEED_URL, "Show (renamed)").unwrap();

        let mut episode = item("a.mp3");
        db.upsert_episode(FEED_URL, &episode).unwrap();
        episode.description = Some("now with notes".to_string());
        db.upsert_episode(FEED_URL, &episode).unwrap();

        assert_eq!(db.episode_count().unwrap(), 1);
        assert_eq!(db.feed_count().unwrap(), 1);
        assert_eq!(db.description_candidates().unwrap().len(), 1);
    }

    #[test]
    fn test_chapter_counts() {
        let (mut db, _temp) = setup_test_db();
        let mut records =
            ChapterRecord::for_episode("a.mp3", None, ChapterSource::Psc, vec![Chapter::new(0, "A"), Chapter::new(5, "B")]);
        records.extend(ChapterRecord::for_episode(
            "b.mp3",
            None,
            ChapterSource::Psc,
            vec![Chapter::new(0, "A")],
        ));
        records.extend(ChapterRecord::for_episode(
            "b.mp3",
            None,
            ChapterSource::Description,
            vec![Chapter::new(0, "A")],
        ));
        db.insert_chapters(&records).unwrap();

        let counts = db.chapter_counts().unwrap();
        assert_eq!(
            counts,
            vec![
                SourceCount { source: "description".to_string(), chapters: 1, episodes: 1 },
                SourceCount { source: "psc".to_string(), chapters: 3, episodes: 2 },
            ]
        );
    }

    #[test]
    fn test_insert_nothing() {
        let (mut db, _temp) = setup_test_db();
        assert_eq!(db.insert_chapters(&[]).unwrap(), 0);
    }
}
