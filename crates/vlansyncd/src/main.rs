//! vlansyncd - VLAN sub-interface reconciler daemon
//!
//! Entry point for the vlansyncd daemon.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vlansync_common::ProcessRunner;
use vlansyncd::config::DEFAULT_CONFIG_PATH;
use vlansyncd::{DesiredState, PassOutcome, Reconciler, VlansyncConfig};

/// Converge host VLAN sub-interfaces to a desired-state list
#[derive(Parser, Debug)]
#[command(name = "vlansyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Desired-state JSON file (overrides the config file)
    #[arg(short = 'd', long)]
    desired: Option<PathBuf>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Compute and log actions without applying them
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error); defaults to RUST_LOG, then info
    #[arg(short = 'l', long)]
    log_level: Option<String>,
}

/// Initializes tracing/logging subsystem
fn init_logging(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Cancels the returned token on Ctrl-C or SIGTERM
fn setup_signal_handlers() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received SIGINT");
        }
        token.cancel();
    });

    shutdown
}

/// Loads the desired list and runs one pass.
async fn run_pass(
    reconciler: &Reconciler<ProcessRunner>,
    desired_path: &Path,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    // A missing or invalid file skips the pass; it is never an empty list
    let desired = DesiredState::load(desired_path)
        .with_context(|| format!("Failed to load desired state from {}", desired_path.display()))?;

    match reconciler.reconcile(&desired, shutdown).await? {
        PassOutcome::Skipped => {}
        PassOutcome::Planned(plan) => {
            info!(actions = plan.action_count(), "Dry run complete");
        }
        PassOutcome::Completed(report) => {
            for failure in report.failures() {
                if let Some(e) = failure.error() {
                    warn!(
                        action = %failure.kind,
                        key = %failure.key,
                        retryable = e.is_retryable(),
                        "Will retry on next pass"
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = VlansyncConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(path) = args.desired {
        config.desired.path = path;
    }
    if args.dry_run {
        config.reconcile.dry_run = true;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        desired = %config.desired.path.display(),
        interval_secs = config.reconcile.interval_secs,
        families = ?config.reconcile.address_families,
        dry_run = config.reconcile.dry_run,
        "Configuration loaded"
    );

    let reconciler = Reconciler::from_config(ProcessRunner::new(), &config);
    let shutdown = setup_signal_handlers();

    if args.once {
        return match run_pass(&reconciler, &config.desired.path, &shutdown).await {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(e) => {
                error!("Pass failed: {:#}", e);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = run_pass(&reconciler, &config.desired.path, &shutdown).await {
            if shutdown.is_cancelled() {
                break;
            }
            warn!("Pass failed: {:#}", e);
        }
    }

    info!(passes = reconciler.pass_count(), "vlansyncd shutting down");
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    info!("--- Starting vlansyncd ---");

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("vlansyncd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
