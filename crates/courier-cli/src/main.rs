//! Courier CLI: fetch one attachment from a CDN into local storage.
//!
//! CDN base URLs and directories come from the environment
//! (COURIER_CDN{0,2,3}_URL, COURIER_TEMP_DIR, COURIER_STORAGE_PATH).

use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use courier_cli::{init_tracing, PointerArgs};
use courier_core::models::{Attachment, AttachmentStream};
use courier_core::{BroadcastProgressSink, DownloadConfig, NoopProgressSink, ProgressSink};
use courier_db::{MemoryStore, WhitelistPolicy};
use courier_fetch::{CdnClients, SizeGuardedFetcher};
use courier_storage::{create_storage, TempFiles};
use courier_worker::AttachmentDownloads;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "courier", about = "Encrypted attachment downloader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, verify and decrypt one attachment
    Fetch(FetchArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// CDN number the blob is hosted on
    #[arg(long)]
    cdn: u32,
    /// CDN key of the blob
    #[arg(long, conflicts_with = "legacy_id")]
    key: Option<String>,
    /// Numeric server id of the blob on the legacy CDN
    #[arg(long)]
    legacy_id: Option<u64>,
    /// Base64 encryption key (32 bytes)
    #[arg(long)]
    encryption_key: String,
    /// Base64 SHA-256 digest of the ciphertext
    #[arg(long)]
    digest: String,
    /// Unpadded plaintext size in bytes
    #[arg(long)]
    size: u64,
    #[arg(long, default_value = "application/octet-stream")]
    content_type: String,
    /// Attachment id to store the result under
    #[arg(long, default_value = "cli-attachment")]
    id: String,
    /// Do not log download progress
    #[arg(long)]
    quiet: bool,
}

impl From<FetchArgs> for PointerArgs {
    fn from(args: FetchArgs) -> Self {
        PointerArgs {
            id: args.id,
            cdn_number: args.cdn,
            key: args.key,
            legacy_id: args.legacy_id,
            encryption_key: args.encryption_key,
            digest: args.digest,
            size: args.size,
            content_type: args.content_type,
        }
    }
}

#[derive(Serialize)]
struct FetchOutput {
    location: String,
    #[serde(flatten)]
    stream: AttachmentStream,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Progress sink that logs each tick, or drops them all when `quiet`.
fn progress_sink(quiet: bool) -> Arc<dyn ProgressSink> {
    if quiet {
        return Arc::new(NoopProgressSink);
    }

    let sink = BroadcastProgressSink::new(64);
    let mut progress = sink.subscribe();
    tokio::spawn(async move {
        loop {
            match progress.recv().await {
                Ok(event) => tracing::info!(
                    attachment.id = %event.attachment_id,
                    percent = format!("{:.1}", event.fraction * 100.0),
                    "Downloading"
                ),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
    Arc::new(sink)
}

async fn fetch(args: FetchArgs) -> anyhow::Result<()> {
    let config = DownloadConfig::from_env().context("Failed to load configuration")?;
    let quiet = args.quiet;
    let pointer = PointerArgs::from(args).to_pointer()?;

    let store = Arc::new(MemoryStore::new());
    store.insert_attachment(Attachment::Pointer(pointer.clone()))?;

    let cdn = CdnClients::from_config(&config)?;
    let temp = TempFiles::new(config.temp_dir.clone()).await?;
    let storage = create_storage(&config).await?;

    let downloads = AttachmentDownloads::new(
        store,
        Arc::new(SizeGuardedFetcher::new(cdn, temp)),
        storage.clone(),
        Arc::new(WhitelistPolicy),
        progress_sink(quiet),
    )?;

    let handle = downloads
        .enqueue_download(&pointer.id, None)?
        .context("Attachment was not submitted for download")?;
    let stream = handle
        .outcome()
        .await
        .context("Download was abandoned")?
        .context("Download failed")?;

    let location = storage.location(&stream.storage_key)?;
    print_json(&FetchOutput { location, stream })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch(args) => fetch(args).await?,
    }

    Ok(())
}
