//! clipkeep - video downloader with a local catalog
//!
//! Hands a URL to yt-dlp, tries several format strategies until one works
//! and keeps every finished download in a SQLite catalog that can be
//! listed, played back and pruned.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipkeep::backend::{BackendActor, BackendCommand, BackendEvent};
use clipkeep::database::{database_url, CatalogEntry, CatalogStore};
use clipkeep::downloader::{DownloadPhase, StopOutcome};
use clipkeep::utils::format::{format_duration_ms, format_file_size};
use clipkeep::utils::{get_config_path, AppSettings, ClipkeepError, DownloadError};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "clipkeep", version, about = "Download videos and keep a local catalog")]
struct Args {
    /// Settings file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the download directory
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,

    /// Override the catalog database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a video and add it to the catalog
    Download { url: String },
    /// List catalog entries, newest first
    Gallery {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show when and from where each entry was downloaded
    History,
    /// Open an entry with the system player
    Play { id: i64 },
    /// Delete an entry and its file
    Delete { id: i64 },
    /// Number of catalog entries
    Count,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let settings = load_settings(&args)?;

    match args.command {
        Command::Download { url } => download(settings, url).await,
        Command::Gallery { json } => {
            let entries = open_catalog(&settings).await?.list_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_gallery(&entries);
            }
            Ok(())
        }
        Command::History => {
            let entries = open_catalog(&settings).await?.list_all().await?;
            for entry in entries.iter().rev() {
                println!(
                    "{}  [{}]  {}",
                    entry.downloaded_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.platform,
                    entry.url
                );
            }
            Ok(())
        }
        Command::Play { id } => {
            let catalog = open_catalog(&settings).await?;
            let entry = catalog
                .get(id)
                .await?
                .ok_or(ClipkeepError::EntryNotFound(id))?;
            if !entry.file_path.exists() {
                anyhow::bail!("File no longer exists: {}", entry.file_path.display());
            }
            println!("Playing: {}", entry.title);
            open::that(&entry.file_path)
                .with_context(|| format!("Failed to open {}", entry.file_path.display()))?;
            Ok(())
        }
        Command::Delete { id } => {
            let catalog = open_catalog(&settings).await?;
            let entry = catalog
                .get(id)
                .await?
                .ok_or(ClipkeepError::EntryNotFound(id))?;
            catalog.delete_with_file(&entry).await?;
            println!("Deleted: {}", entry.title);
            Ok(())
        }
        Command::Count => {
            println!("{}", open_catalog(&settings).await?.count().await?);
            Ok(())
        }
    }
}

/// Settings file first, then command-line overrides
fn load_settings(args: &Args) -> Result<AppSettings> {
    let path = args.config.clone().unwrap_or_else(get_config_path);
    let mut settings = AppSettings::load(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(dir) = &args.download_dir {
        settings.download_location = dir.clone();
    }
    if let Some(db) = &args.database {
        settings.database_path = db.clone();
    }
    Ok(settings)
}

async fn open_catalog(settings: &AppSettings) -> Result<CatalogStore> {
    if let Some(parent) = settings.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    CatalogStore::open(&database_url(&settings.database_path)).await
}

fn print_gallery(entries: &[CatalogEntry]) {
    if entries.is_empty() {
        println!("No videos downloaded yet");
        return;
    }
    for entry in entries {
        println!(
            "{:>4}  {:<9} {:>8} {:>10}  {}",
            entry.id.unwrap_or_default(),
            entry.platform,
            format_duration_ms(entry.duration_ms),
            format_file_size(entry.file_size),
            entry.title
        );
    }
}

async fn download(settings: AppSettings, url: String) -> Result<()> {
    if let Some(parent) = settings.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let actor = BackendActor::new(settings, cmd_rx, event_tx).await?;
    let actor_handle = tokio::spawn(actor.run());

    cmd_tx.send(BackendCommand::StartDownload { url }).await?;

    let mut last_status = String::new();
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cmd_tx.send(BackendCommand::StopDownload).await?;
            }
            event = event_rx.recv() => {
                let Some(event) = event else {
                    break Err(anyhow::anyhow!("Backend stopped unexpectedly"));
                };
                match event {
                    BackendEvent::Snapshot(snapshot) => {
                        if let Some(message) = &snapshot.url_error {
                            eprintln!("{}", message);
                        }
                        if snapshot.status_text != last_status {
                            if matches!(snapshot.phase, DownloadPhase::Downloading { .. }) {
                                println!("[{:>5.1}%] {}", snapshot.progress, snapshot.status_text);
                            } else {
                                println!("{}", snapshot.status_text);
                            }
                            last_status = snapshot.status_text;
                        }
                    }
                    BackendEvent::DownloadFinished(Ok(outcome)) => {
                        println!("Saved to: {}", outcome.entry.file_path.display());
                        println!("Format used: {} (attempt {})", outcome.format, outcome.attempts);
                        if outcome.catalog_id.is_none() {
                            eprintln!("Warning: the download could not be added to the catalog");
                        }
                        break Ok(());
                    }
                    BackendEvent::DownloadFinished(Err(DownloadError::Initialization(e))) => {
                        break Err(anyhow::anyhow!(
                            "Initialization failed: {}\nInstall yt-dlp (pip install yt-dlp) or set ytdlp_path",
                            e
                        ));
                    }
                    BackendEvent::DownloadFinished(Err(e)) => break Err(e.into()),
                    BackendEvent::DownloadIgnored { .. } => {
                        break Err(anyhow::anyhow!("Another download is already running"));
                    }
                    BackendEvent::StopResult(StopOutcome::NoActiveDownload) => {
                        break Err(DownloadError::Cancelled.into());
                    }
                    BackendEvent::Error(e) => eprintln!("Error: {}", e),
                    BackendEvent::StopResult(StopOutcome::Stopped)
                    | BackendEvent::CatalogChanged(_)
                    | BackendEvent::Deleted { .. } => {}
                }
            }
        }
    };

    let _ = cmd_tx.send(BackendCommand::Shutdown).await;
    let _ = actor_handle.await;
    result
}
