//! loginwatchd - daemon reporting new logins and users returning from idle.
//!
//! Polls the system login session table at a fixed interval and logs every
//! new login and every user whose terminal becomes active after a long idle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use loginwatchd::config::Config;
use loginwatchd::config::OutputFormat;
use loginwatchd::domain::PollReport;
use loginwatchd::monitor::SessionMonitor;
use loginwatchd::report::render_events;
use loginwatchd::sessions::SessionSource;
use loginwatchd::sessions::UtmpSource;
use tracing::debug;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Login session monitor.
///
/// Reports new logins and users returning from idle.
#[derive(Parser, Debug)]
#[command(name = "loginwatchd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print login and awoken events to stdout.
    #[arg(long)]
    print_events: bool,

    /// Print events as JSON lines (implies --print-events).
    #[arg(long)]
    json: bool,

    /// Idle seconds before a return to activity is reported.
    #[arg(long)]
    idle_threshold: Option<u64>,

    /// Seconds between polls.
    #[arg(long)]
    interval: Option<u64>,

    /// Run a fixed number of polls, print the least idle user each time, then exit.
    #[arg(long)]
    oneshot: bool,

    /// Number of polls in oneshot mode.
    #[arg(long, default_value = "2")]
    oneshot_count: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("loginwatchd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(threshold) = args.idle_threshold {
        config.idle_threshold_seconds = threshold;
    }
    if let Some(interval) = args.interval {
        config.poll_interval_seconds = interval;
    }
    if args.json {
        config.output = OutputFormat::Json;
    }
    config.validate()?;

    info!(
        "Configuration loaded (interval={}s, idle_threshold={}s)",
        config.poll_interval_seconds, config.idle_threshold_seconds
    );

    let source = UtmpSource::new(&config.device_dir).context("Failed to open session source")?;
    debug!("Resolving terminals under {}", source.device_dir().display());

    let monitor = Arc::new(SessionMonitor::new(source, config.idle_threshold_seconds));
    let print_events = args.print_events || args.json;

    if args.oneshot {
        return run_oneshot(&monitor, &config, args.oneshot_count, print_events).await;
    }

    run_daemon(&monitor, &config, print_events).await
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("loginwatchd={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

/// Run one poll off the async runtime; the table read blocks.
async fn poll_once<S>(monitor: &Arc<SessionMonitor<S>>) -> Result<PollReport>
where
    S: SessionSource + 'static,
{
    let monitor = Arc::clone(monitor);
    tokio::task::spawn_blocking(move || monitor.poll())
        .await
        .context("Poll task failed")?
}

/// Print a poll's events if requested.
fn print_report(report: &PollReport, format: OutputFormat, print_events: bool) -> Result<()> {
    if !print_events {
        return Ok(());
    }
    for line in render_events(report, format)? {
        println!("{line}");
    }
    Ok(())
}

/// Run in oneshot mode: poll a few times and exit.
async fn run_oneshot<S>(
    monitor: &Arc<SessionMonitor<S>>,
    config: &Config,
    count: usize,
    print_events: bool,
) -> Result<()>
where
    S: SessionSource + 'static,
{
    info!("Running in oneshot mode, {} polls", count);

    let mut timer = tokio::time::interval(Duration::from_secs(config.poll_interval_seconds));
    for n in 1..=count {
        timer.tick().await;
        let report = poll_once(monitor).await?;
        print_report(&report, config.output, print_events)?;

        match report.least_idle {
            Some(ref least) => println!(
                "[{}] | least_idle={} idle={}s",
                n, least.user, least.idle_seconds
            ),
            None => println!("[{n}] | no sessions"),
        }
    }

    info!(
        "Oneshot mode complete, tracking {} users",
        monitor.tracked_users()?
    );
    Ok(())
}

/// Run the polling loop until interrupted.
async fn run_daemon<S>(
    monitor: &Arc<SessionMonitor<S>>,
    config: &Config,
    print_events: bool,
) -> Result<()>
where
    S: SessionSource + 'static,
{
    let mut timer = tokio::time::interval(Duration::from_secs(config.poll_interval_seconds));
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Daemon started, polling {}", monitor.source().name());

    loop {
        tokio::select! {
            _ = timer.tick() => {
                match poll_once(monitor).await {
                    Ok(report) => {
                        if let Err(e) = print_report(&report, config.output, print_events) {
                            warn!("Failed to print events: {:#}", e);
                        }
                    }
                    // Retry on the next tick
                    Err(e) => warn!("Poll failed: {:#}", e),
                }
            }

            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutting down");
                break;
            }
        }
    }

    monitor.reset()
}
