//! schoology-sync: incremental mirror of a Schoology course.
//!
//! Reuses a browser session obtained elsewhere, discovers course albums and
//! feed posts, downloads new media, and hands new posts to external
//! summarize/translate/deliver commands. A JSON state document makes every
//! run pick up only what the previous runs have not finished.

#![warn(clippy::all)]

mod cli;
mod collab;
mod config;
mod download;
mod feed;
mod portal;
mod retry;
mod session;
mod shutdown;
mod state;
mod sync;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::Command;
use collab::{Deliverer, Summarizer, TextExtractor};
use config::{AlbumsConfig, EvictConfig, FeedConfig, PortalConfig, StateConfig};
use download::MediaDownloader;
use feed::FeedExtractor;
use portal::{PortalClient, SchoologyMarkup};
use session::SessionHandoff;
use state::{JsonStateStore, StateLock, StateStore, SyncState};
use sync::{AlbumAcquirer, AlbumOptions, DispatchOptions, Dispatcher, Notifier, SyncError};

/// Adopt the root id and the session for one pass.
///
/// The session file is re-read every pass so a refreshed login is picked up
/// in watch mode.
async fn connect(cfg: &PortalConfig, state: &mut SyncState) -> Result<PortalClient, SyncError> {
    let handoff = SessionHandoff::read(&cfg.session_file).await?;
    state.adopt_root_id(cfg.root_id.as_deref());
    state.adopt_root_id(handoff.root_id.as_deref());
    SyncError::check_root_id(&state.root_id)?;

    let http = session::adopt(&handoff.cookies, &cfg.base_url, cfg.timeout)?;
    if !http.has_cookies() {
        tracing::warn!(
            "No session cookie matches {}; requests will likely be rejected",
            http.base_url()
        );
    }
    tracing::info!(
        cookies = http.adopted(),
        root_id = %state.root_id,
        "Session adopted for {}",
        http.base_url()
    );
    Ok(PortalClient::new(http, cfg.retry))
}

/// Decide whether a failed pass ends the process.
fn pass_failed(err: SyncError, watching: bool) -> anyhow::Result<()> {
    if err.is_fatal() || !watching {
        return Err(err.into());
    }
    tracing::warn!("Pass failed, retrying next cycle: {}", err);
    Ok(())
}

async fn albums_pass(
    cfg: &AlbumsConfig,
    store: &JsonStateStore,
    shutdown: &CancellationToken,
) -> Result<(), SyncError> {
    let mut state = store.load().await?;
    let portal = connect(&cfg.portal, &mut state).await?;
    let downloader = MediaDownloader::new(portal.http().client().clone(), cfg.portal.retry);
    let acquirer = AlbumAcquirer::new(
        portal,
        Arc::new(SchoologyMarkup),
        Arc::new(SchoologyMarkup),
        downloader,
        AlbumOptions {
            media_root: cfg.media_root.clone(),
            touch: cfg.touch,
            max_pages: cfg.max_pages,
        },
    );

    let summary = acquirer.run(&mut state, store, shutdown).await?;
    store.save(&state).await?;

    tracing::info!("── Summary ──");
    tracing::info!(
        "  {} discovered, {} acquired, {} touched, {} already acquired",
        summary.discovered,
        summary.acquired,
        summary.touched,
        summary.skipped
    );
    tracing::info!(
        "  {} media downloaded, {} incomplete, {} empty, {} failed",
        summary.media_downloaded,
        summary.incomplete,
        summary.empty,
        summary.failed
    );
    if summary.interrupted {
        tracing::info!("  Interrupted; remaining albums are picked up next run");
    }
    Ok(())
}

async fn run_albums(cfg: AlbumsConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let lock = StateLock::acquire(&cfg.portal.state_path).await?;
    tracing::debug!("Holding {}", lock.path().display());
    let store = JsonStateStore::new(&cfg.portal.state_path);
    tracing::info!(
        touch = cfg.touch,
        "Acquiring albums into {}",
        cfg.media_root.display()
    );

    let interval = cfg.portal.watch_with_interval.map(Duration::from_secs);
    loop {
        if let Err(e) = albums_pass(&cfg, &store, &shutdown).await {
            pass_failed(e, interval.is_some())?;
        }
        if !shutdown::wait_for_next_cycle(interval, &shutdown).await {
            break;
        }
    }
    Ok(())
}

async fn feed_pass(
    cfg: &FeedConfig,
    notifier: &Notifier,
    text_extractor: &Arc<dyn TextExtractor>,
    store: &JsonStateStore,
    shutdown: &CancellationToken,
) -> Result<(), SyncError> {
    let mut state = store.load().await?;
    let portal = connect(&cfg.portal, &mut state).await?;
    let downloader = MediaDownloader::new(portal.http().client().clone(), cfg.portal.retry);
    let mut extractor = FeedExtractor::new(
        portal,
        Arc::new(SchoologyMarkup),
        downloader,
        cfg.attachments_dir.clone(),
    );
    if cfg.collaborators.extract_text_cmd.is_some() {
        extractor = extractor.with_text_extractor(text_extractor.clone());
    }
    let dispatcher = Dispatcher::new(
        notifier,
        store,
        DispatchOptions {
            persist: cfg.persist,
            dry_run: cfg.dry_run,
        },
        shutdown.clone(),
    );

    let summary = sync::sync_feed(&extractor, &dispatcher, &mut state).await?;
    if !cfg.dry_run {
        store.save(&state).await?;
    }

    tracing::info!("── Summary ──");
    if cfg.dry_run {
        tracing::info!(
            "  [DRY RUN] {} would be delivered, {} already dispatched",
            summary.pending,
            summary.skipped
        );
    } else {
        tracing::info!(
            "  {} delivered, {} already dispatched, {} failed",
            summary.delivered,
            summary.skipped,
            summary.failed
        );
    }
    if summary.unkeyed > 0 {
        tracing::warn!(
            "  {} posts had no key and will be delivered again next run",
            summary.unkeyed
        );
    }
    if summary.interrupted {
        tracing::info!("  Interrupted; remaining posts are picked up next run");
    }
    Ok(())
}

async fn run_feed(cfg: FeedConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let lock = StateLock::acquire(&cfg.portal.state_path).await?;
    tracing::debug!("Holding {}", lock.path().display());
    let store = JsonStateStore::new(&cfg.portal.state_path);

    let collaborators = Arc::new(cfg.collaborators.clone());
    let summarizer: Arc<dyn Summarizer> = collaborators.clone();
    let deliverer: Arc<dyn Deliverer> = collaborators.clone();
    let text_extractor: Arc<dyn TextExtractor> = collaborators;
    let notifier = Notifier::new(summarizer, deliverer, cfg.notify.clone());
    tracing::info!(
        dry_run = cfg.dry_run,
        languages = cfg.notify.translate_to.len(),
        "Dispatching feed updates as {}",
        notifier.settings().sender
    );

    let interval = cfg.portal.watch_with_interval.map(Duration::from_secs);
    loop {
        if let Err(e) = feed_pass(&cfg, &notifier, &text_extractor, &store, &shutdown).await {
            pass_failed(e, interval.is_some())?;
        }
        if !shutdown::wait_for_next_cycle(interval, &shutdown).await {
            break;
        }
    }
    Ok(())
}

async fn run_status(cfg: StateConfig) -> anyhow::Result<()> {
    if !cfg.state_path.exists() {
        println!("No state found at {}", cfg.state_path.display());
        println!("Run `albums` or `feed` first to create it.");
        return Ok(());
    }

    let state = JsonStateStore::new(&cfg.state_path).load().await?;
    let summary = state.summary();

    println!("State: {}", cfg.state_path.display());
    println!();
    if summary.root_id.is_empty() {
        println!("Course id:  (not yet recorded)");
    } else {
        println!("Course id:  {}", summary.root_id);
    }
    println!("Albums acquired:   {}", summary.acquired_collections);
    println!("Posts dispatched:  {}", summary.dispatched_records);
    if let Some(at) = summary
        .last_acquired_at
        .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0))
    {
        println!();
        println!("Last album acquired: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

async fn run_evict(cfg: EvictConfig) -> anyhow::Result<()> {
    let _lock = StateLock::acquire(cfg.state_path()).await?;
    let store = JsonStateStore::new(cfg.state_path());
    let mut state = store.load().await?;

    let mut removed = 0usize;
    for key in &cfg.collections {
        match state.evict_collection(key) {
            Some(record) => {
                println!("Evicted album {} ({})", key, record.title);
                removed += 1;
            }
            None => println!("Album {} was not recorded", key),
        }
    }
    for key in &cfg.records {
        match state.evict_record(key) {
            Some(_) => {
                println!("Evicted post {}", key);
                removed += 1;
            }
            None => println!("Post {} was not recorded", key),
        }
    }

    if removed > 0 {
        store
            .save(&state)
            .await
            .with_context(|| format!("Failed to save {}", cfg.state_path().display()))?;
    }
    println!("{} entries evicted", removed);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.command {
        Command::Status(args) => run_status(StateConfig::from_args(&args)).await,
        Command::Evict(args) => run_evict(EvictConfig::from_args(&args)?).await,
        Command::Albums(args) => {
            let cfg = AlbumsConfig::from_args(&args)?;
            tracing::debug!(?cfg, "Starting schoology-sync albums");
            let shutdown_token = shutdown::install_signal_handler()?;
            run_albums(cfg, shutdown_token).await
        }
        Command::Feed(args) => {
            let cfg = FeedConfig::from_args(&args)?;
            tracing::debug!(?cfg, "Starting schoology-sync feed");
            let shutdown_token = shutdown::install_signal_handler()?;
            run_feed(cfg, shutdown_token).await
        }
    }
}
