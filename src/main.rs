use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use podcast_chapters::chapters::format_timestamp;
use podcast_chapters::{import_feed, Backfill, ChapterSource, Config, Datastore, HttpDownloader};

#[derive(Parser)]
#[command(name = "podcast-chapters")]
#[command(version, author = "TigreRoll")]
#[command(about = "Extract and backfill podcast episode chapters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Archive directory for feeds and chapter indexes
    #[arg(long, global = true)]
    archive: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract chapters for every stored episode that lacks them
    Backfill {
        /// Sources to run (description, pci, psc); all when omitted
        #[arg(long = "source", value_delimiter = ',')]
        sources: Vec<ChapterSource>,
    },
    /// Import a feed from a URL or file and extract its chapters
    Import {
        /// Feed URL or path to a feed file
        feed: String,
        /// Also fetch remote chapter indexes
        #[arg(long)]
        fetch_remote: bool,
    },
    /// Print the stored chapters of an episode
    Show {
        /// Enclosure URL of the episode
        enclosure_url: String,
    },
    /// Chapter counts per source
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    if let Some(archive) = cli.archive {
        config.storage.archive_dir = Some(archive);
    }

    // Initialize logging
    let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("podcast_chapters={},warn", level))),
        )
        .init();

    config.validate()?;
    debug!("{}", config.summary());

    let mut db = Datastore::open(&config.storage.db_path)?;

    match cli.command {
        Commands::Backfill { sources } => {
            let sources = if sources.is_empty() {
                ChapterSource::EXTRACTED.to_vec()
            } else {
                sources
            };
            if let Some(reserved) = sources.iter().find(|s| s.is_reserved()) {
                bail!("No extractor for source '{}'", reserved);
            }

            info!("🚀 Backfilling chapters into {}", config.storage.db_path.display());
            let fetcher = Arc::new(HttpDownloader::new(
                config.fetch.request_timeout_seconds,
                config.fetch.connect_timeout_seconds,
            )?);

            let start_time = std::time::Instant::now();
            let mut backfill = Backfill::new(db, fetcher, &config);
            let summaries = backfill.run(&sources).await?;

            info!("🎉 Backfill completed in {:.2}s", start_time.elapsed().as_secs_f64());
            for summary in summaries {
                println!("{}", summary);
            }
        }

        Commands::Import { feed, fetch_remote } => {
            let fetcher = HttpDownloader::new(
                config.fetch.request_timeout_seconds,
                config.fetch.connect_timeout_seconds,
            )?;
            let summary = import_feed(&mut db, &fetcher, &config, &feed, fetch_remote).await?;

            println!(
                "{}: {} episodes ({} skipped)",
                summary.feed_title, summary.episodes, summary.skipped
            );
            for (source, count) in &summary.chapters {
                println!("  {:<12} {:>6} chapters", source.tag(), count);
            }
        }

        Commands::Show { enclosure_url } => {
            let records = db.chapters_for_episode(&enclosure_url)?;
            if records.is_empty() {
                info!("📭 No chapters stored for {}", enclosure_url);
                return Ok(());
            }

            let mut current = None;
            for record in records {
                if current != Some(record.source) {
                    println!("[{}]", record.source);
                    current = Some(record.source);
                }
                match &record.url {
                    Some(url) => println!("  {} {} <{}>", format_timestamp(record.start_seconds), record.title, url),
                    None => println!("  {} {}", format_timestamp(record.start_seconds), record.title),
                }
            }
        }

        Commands::Stats => {
            println!("Feeds:    {}", db.feed_count()?);
            println!("Episodes: {}", db.episode_count()?);
            for count in db.chapter_counts()? {
                println!(
                    "  {:<12} {:>8} chapters {:>6} episodes",
                    count.source, count.chapters, count.episodes
                );
            }
        }
    }

    Ok(())
}
