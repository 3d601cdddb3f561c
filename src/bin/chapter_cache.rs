use anyhow::Result;
use clap::{Parser, Subcommand};
use podcast_chapters::{Config, RemoteChapterCache};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "chapter-cache")]
#[command(about = "Remote chapter index cache utility")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cache directory (default: `chapters` in the configured archive)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List cached chapter indexes
    List,
    /// Get cache statistics
    Stats,
    /// Remove the cached index for a chapter index URL, forcing a refetch
    Remove {
        /// Chapter index URL
        url: String,
    },
    /// Clear all cache entries
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();
    let cache_dir = match cli.cache_dir {
        Some(dir) => dir,
        None => Config::load(cli.config.as_deref())?.storage.chapters_dir(),
    };
    let cache = RemoteChapterCache::new(cache_dir);

    match cli.command {
        Commands::List => {
            let entries = cache.list().await?;

            if entries.is_empty() {
                info!("📭 No cached chapter indexes in {}", cache.dir().display());
                return Ok(());
            }

            info!("📚 Found {} cached chapter indexes:", entries.len());
            for entry in entries {
                let chapters = entry
                    .chapter_count
                    .map(|n| format!("{} chapters", n))
                    .unwrap_or_else(|| "❌ unreadable".to_string());
                let modified = entry
                    .modified
                    .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                info!("  {} - {}, {} bytes, {}", entry.file_name, chapters, entry.size_bytes, modified);
            }
        }

        Commands::Stats => {
            let stats = cache.stats().await?;
            info!("📊 Cache Statistics:");
            info!("  Total files: {}", stats.total_files);
            info!("  Valid files: {}", stats.valid_files);
            info!("  Unreadable files: {}", stats.unreadable_files);
            info!("  Total chapters: {}", stats.total_chapters);
            info!("  Total size: {} bytes", stats.total_bytes);
        }

        Commands::Remove { url } => {
            if cache.remove(&url).await? {
                info!("✅ Removed cached index for: {}", url);
            } else {
                warn!("⚠️ No cached index for: {}", url);
            }
        }

        Commands::Clear => {
            let count = cache.clear().await?;
            info!("🧹 Cleared {} cache files", count);
        }
    }

    Ok(())
}
