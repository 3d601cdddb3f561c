use podcast_chapters::config::ConfigBuilder;
use podcast_chapters::http::MockFetcher;
use podcast_chapters::{import_feed, Backfill, ChapterSource, Datastore};
use std::sync::Arc;
use tempfile::TempDir;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
     xmlns:podcast="https://podcastindex.org/namespace/1.0"
     xmlns:psc="http://podlove.org/simple-chapters">
  <channel>
    <title>Integration Show</title>
    <item>
      <title>Episode One</title>
      <guid>ep-1</guid>
      <enclosure url="https://cdn.test/ep1.mp3?source=rss" type="audio/mpeg"/>
      <podcast:chapters url="https://cdn.test/ep1.json" type="application/json+chapters"/>
      <description>&lt;p&gt;0:00 Welcome&lt;/p&gt;&lt;p&gt;12:30 Main topic&lt;/p&gt;</description>
      <psc:chapters version="1.2">
        <psc:chapter start="00:00:00.000" title="Intro"/>
        <psc:chapter start="00:12:30" title="Topic"/>
      </psc:chapters>
    </item>
    <item>
      <title>Episode Two</title>
      <guid>ep-2</guid>
      <enclosure url="https://cdn.test/ep2.mp3" type="audio/mpeg"/>
      <podcast:chapters url="https://cdn.test/ep2.json"/>
      <description>Recorded live. 1:00 is when it starts</description>
    </item>
  </channel>
</rss>"#;

const EP1_CHAPTERS: &str = r#"{
  "version": "1.2.0",
  "chapters": [
    {"startTime": 0, "title": "Cold open"},
    {"startTime": 95, "title": "Interview", "url": "https://guest.test"}
  ]
}"#;

#[tokio::test]
async fn test_import_then_backfill() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new()
        .with_db_path(temp_dir.path().join("podcasts.db"))
        .with_batch_size(2)
        .build();

    let feed_file = temp_dir.path().join("show.xml");
    std::fs::write(&feed_file, FEED).unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_body("https://cdn.test/ep1.json", EP1_CHAPTERS)
            .with_status("https://cdn.test/ep2.json", 404),
    );

    let mut db = Datastore::open(&config.storage.db_path).unwrap();
    let imported = import_feed(
        &mut db,
        fetcher.as_ref(),
        &config,
        &feed_file.to_string_lossy(),
        false,
    )
    .await
    .unwrap();

    assert_eq!(imported.episodes, 2);
    assert_eq!(imported.chapters.get(&ChapterSource::Description), Some(&2));
    assert_eq!(imported.chapters.get(&ChapterSource::Psc), Some(&2));
    assert_eq!(fetcher.call_count(), 0);

    let mut backfill = Backfill::new(db, fetcher.clone(), &config);
    let summaries = backfill.run(&ChapterSource::EXTRACTED).await.unwrap();

    let order: Vec<ChapterSource> = summaries.iter().map(|s| s.source).collect();
    assert_eq!(order, ChapterSource::EXTRACTED.to_vec());

    // Episode two has a single timestamp, which is not a chapter list
    assert_eq!(summaries[0].candidates, 1);
    assert_eq!(summaries[0].found, 0);

    assert_eq!(summaries[1].candidates, 2);
    assert_eq!(summaries[1].found, 1);
    assert_eq!(summaries[1].inserted, 2);

    assert_eq!(summaries[2].candidates, 0);
    assert_eq!(fetcher.call_count(), 2);

    // Only the failed remote index is retried
    let rerun = backfill.run(&[ChapterSource::Pci]).await.unwrap();
    assert_eq!(rerun.len(), 1);
    assert_eq!(rerun[0].candidates, 1);
    assert_eq!(rerun[0].inserted, 0);
    assert_eq!(fetcher.call_count(), 3);

    let db = backfill.into_datastore();
    let records = db.chapters_for_episode("https://cdn.test/ep1.mp3").unwrap();
    let sources: Vec<&str> = records.iter().map(|r| r.source.tag()).collect();
    assert_eq!(
        sources,
        vec!["description", "description", "pci", "pci", "psc", "psc"]
    );

    let interview = records.iter().find(|r| r.title == "Interview").unwrap();
    assert_eq!(interview.start_seconds, 95);
    assert_eq!(interview.url.as_deref(), Some("https://guest.test"));
    assert!(records.iter().all(|r| r.guid.as_deref() == Some("ep-1")));

    let main_topic = records.iter().find(|r| r.title == "Main topic").unwrap();
    assert_eq!(main_topic.start_seconds, 750);

    assert!(db.chapters_for_episode("https://cdn.test/ep2.mp3").unwrap().is_empty());
    assert_eq!(db.episode_count().unwrap(), 2);
    assert_eq!(db.feed_count().unwrap(), 1);
}

#[tokio::test]
async fn test_inline_backfill_reads_archived_feed() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new()
        .with_db_path(temp_dir.path().join("podcasts.db"))
        .build();

    let feed_file = temp_dir.path().join("show.xml");
    std::fs::write(&feed_file, FEED).unwrap();
    let fetcher = Arc::new(MockFetcher::new());

    let mut db = Datastore::open(&config.storage.db_path).unwrap();
    import_feed(&mut db, fetcher.as_ref(), &config, &feed_file.to_string_lossy(), false)
        .await
        .unwrap();

    // Drop the inline rows so the backfill has to recover them from the archive
    drop(db);
    let conn = rusqlite::Connection::open(&config.storage.db_path).unwrap();
    let deleted = conn
        .execute("DELETE FROM chapters WHERE source = 'psc'", [])
        .unwrap();
    assert_eq!(deleted, 2);
    drop(conn);

    let db = Datastore::open(&config.storage.db_path).unwrap();
    let mut backfill = Backfill::new(db, fetcher.clone(), &config);
    let summary = backfill.backfill_inline().unwrap();

    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.found, 1);
    assert_eq!(summary.inserted, 2);

    let records = backfill
        .datastore()
        .chapters_for_episode("https://cdn.test/ep1.mp3")
        .unwrap();
    let inline: Vec<(u32, &str)> = records
        .iter()
        .filter(|r| r.source == ChapterSource::Psc)
        .map(|r| (r.start_seconds, r.title.as_str()))
        .collect();
    assert_eq!(inline, vec![(0, "Intro"), (750, "Topic")]);
}
