//! channel-fetch - CLI entry point.

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use channel_fetch::{
    cli::Args,
    config::{validate_channels, validate_config, Config},
    download::{enqueue_channel, Coordinator, CoordinatorSettings, HttpFetcher},
    error::{exit_codes, Error, ErrorKind, Result},
    media::{load_manifest, ChannelId, ItemMetadata, Manifest},
    output::{
        print_banner, print_channel_reports, print_cleanup_report, print_config_summary,
        print_error, print_info, print_run_report, print_success, print_tracker_stats,
        print_warning, ProgressMonitor,
    },
    tracker::TrackerManager,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One channel to fetch and the manifest items offered for it.
struct ChannelWork {
    channel: ChannelId,
    title: Option<String>,
    items: Vec<(u64, ItemMetadata)>,
}

/// How a successful invocation ended.
enum SessionEnd {
    Completed,
    Failures,
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(SessionEnd::Completed) => ExitCode::from(exit_codes::SUCCESS as u8),
        Ok(SessionEnd::Failures) => ExitCode::from(exit_codes::DOWNLOAD_ERROR as u8),
        Ok(SessionEnd::Interrupted) => ExitCode::from(exit_codes::ABORT as u8),
        Err(e) => {
            print_error(&format!("{}", e));
            match e {
                Error::Config(_)
                | Error::ConfigValidation { .. }
                | Error::MissingConfig(_)
                | Error::InvalidChannel { .. }
                | Error::TomlParse(_) => ExitCode::from(exit_codes::CONFIG_ERROR as u8),
                _ => ExitCode::from(exit_codes::UNEXPECTED_ERROR as u8),
            }
        }
    }
}

async fn run() -> Result<SessionEnd> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();

    print_banner();

    // Load configuration
    if !args.config.exists() {
        print_warning(&format!(
            "Configuration file not found: {}",
            args.config.display()
        ));
        print_info("Using default configuration with CLI arguments");
    }
    let mut config = Config::load_or_default(&args.config)?;
    args.merge_into_config(&mut config);

    let manager = Arc::new(TrackerManager::new(config.download_directory()));

    if args.stats {
        return show_stats(&manager).await;
    }
    if args.cleanup {
        return cleanup(&manager).await;
    }

    let manifest = match &args.manifest {
        Some(path) => load_manifest(path)?,
        None => Manifest::default(),
    };

    validate_config(&config, manifest.channels.len())?;
    let work = collect_channels(&config, &manifest)?;

    let settings = CoordinatorSettings::from(&config);
    let channels: Vec<(ChannelId, Option<String>)> = work
        .iter()
        .map(|w| (w.channel.clone(), w.title.clone()))
        .collect();
    print_config_summary(&channels, &settings, manager.base_dir());

    download_session(&args, &config, settings, manager, work).await
}

/// Channels from the config file followed by manifest-only channels, each
/// with the manifest's items for it.
fn collect_channels(config: &Config, manifest: &Manifest) -> Result<Vec<ChannelWork>> {
    let mut work: Vec<ChannelWork> = validate_channels(&config.channels.ids)?
        .into_iter()
        .map(|channel| ChannelWork {
            channel,
            title: None,
            items: Vec::new(),
        })
        .collect();

    let mut seen = HashSet::new();
    for entry in &manifest.channels {
        let Some(channel) = validate_channels([entry.id.as_str()])?.into_iter().next() else {
            continue;
        };
        // A channel listed twice in the manifest keeps its first entry
        if !seen.insert(channel.clone()) {
            continue;
        }

        let items = entry.ordered_items();
        match work.iter_mut().find(|w| w.channel == channel) {
            Some(existing) => {
                existing.title = entry.title.clone();
                existing.items = items;
            }
            None => work.push(ChannelWork {
                channel,
                title: entry.title.clone(),
                items,
            }),
        }
    }

    Ok(work)
}

async fn download_session(
    args: &Args,
    config: &Config,
    settings: CoordinatorSettings,
    manager: Arc<TrackerManager>,
    work: Vec<ChannelWork>,
) -> Result<SessionEnd> {
    let fetcher = Arc::new(HttpFetcher::new(CONNECT_TIMEOUT, args.show_progress())?);
    let coordinator = Arc::new(Coordinator::new(settings, manager.clone(), fetcher));
    coordinator.start().await;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let coordinator = coordinator.clone();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                print_warning("Interrupted, finishing in-flight downloads...");
                interrupted.store(true, Ordering::SeqCst);
                coordinator.stop().await;
            }
        });
    }

    let monitor = args
        .show_progress()
        .then(|| ProgressMonitor::spawn(coordinator.clone()));

    let limit = match config.download.max_files_per_run {
        0 => None,
        n => Some(n),
    };

    let mut reports = Vec::new();
    let mut producer_error = None;
    for ChannelWork { channel, items, .. } in work {
        match enqueue_channel(&coordinator, &manager, &channel, items, limit).await {
            Ok(report) => reports.push(report),
            Err(Error::Cancelled) | Err(Error::QueueClosed) => break,
            Err(e) if e.kind() == ErrorKind::Fatal => {
                tracing::error!(channel = %channel, error = %e, "Stopping run");
                coordinator.stop().await;
                producer_error = Some(e);
                break;
            }
            Err(e) => {
                print_error(&format!("Failed to queue channel {}: {}", channel, e));
            }
        }
    }

    let result = coordinator.finish().await;
    if let Some(monitor) = monitor {
        monitor.finish().await;
    }

    let flushed = manager.flush_all().await;
    for (channel, e) in &flushed.failed {
        print_warning(&format!("Failed to flush trackers for {}: {}", channel, e));
    }

    let report = result?;
    if let Some(e) = producer_error {
        return Err(e);
    }

    print_channel_reports(&reports);
    print_run_report(&report);

    if interrupted.load(Ordering::SeqCst) {
        print_warning("Run interrupted; remaining items will be picked up next time");
        return Ok(SessionEnd::Interrupted);
    }
    if report.has_failures() || !flushed.is_success() {
        return Ok(SessionEnd::Failures);
    }

    print_success("All channels up to date");
    Ok(SessionEnd::Completed)
}

/// Open every channel found on disk.
async fn open_known_channels(manager: &TrackerManager) -> Result<()> {
    for channel in manager.discover_channels().await? {
        manager.get_or_create(&channel).await?;
    }
    Ok(())
}

async fn show_stats(manager: &TrackerManager) -> Result<SessionEnd> {
    open_known_channels(manager).await?;
    print_tracker_stats(&manager.statistics().await);
    Ok(SessionEnd::Completed)
}

async fn cleanup(manager: &TrackerManager) -> Result<SessionEnd> {
    open_known_channels(manager).await?;
    let report = manager.reconcile_all().await;
    print_cleanup_report(&report);

    if report.is_success() {
        Ok(SessionEnd::Completed)
    } else {
        Ok(SessionEnd::Failures)
    }
}
