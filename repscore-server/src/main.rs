//! repscore - profile reputation score service
//!
//! `serve` (the default) runs the HTTP API, the recompute worker and, unless
//! disabled, the maintenance jobs on a timer. `run-job` runs a single job
//! invocation for an external scheduler and exits.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use repscore_common::config::Config;
use repscore_common::db::init_database_pool;
use repscore_common::fetch::HttpProfileSource;
use repscore_common::jobs::StopReason;
use repscore_common::time::SystemClock;
use repscore_server::app::Services;
use repscore_server::build_router;

/// How often expired cache entries are swept
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "repscore")]
#[command(about = "Profile reputation score service")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "REPSCORE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Database file, overrides the config file
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Run one maintenance job invocation and exit
    RunJob {
        #[arg(value_enum)]
        job: Job,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Job {
    Refresh,
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before tracing so the configured level applies; problems are
    // reported once the subscriber is up.
    let loaded = Config::load(args.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting repscore v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config = loaded.context("Failed to load configuration")?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(database) = args.database {
        config.database.path = database;
    }
    info!("Database path: {}", config.database.path.display());

    let pool = init_database_pool(&config.database.path)
        .await
        .context("Failed to open database")?;
    info!("✓ Connected to database");

    let source = Arc::new(HttpProfileSource::new(&config.fetch).context("Failed to build fetch client")?);
    if config.fetch.bearer_token.is_none() {
        warn!("No fetch bearer token configured; upstream requests will be anonymous");
    }
    let services = Services::build(&config, pool, source, Arc::new(SystemClock));

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, services).await,
        Command::RunJob { job } => run_job(job, services).await,
    }
}

async fn serve(config: &Config, services: Services) -> Result<()> {
    let Services {
        state,
        cache,
        worker,
        requests,
        scheduler,
    } = services;
    let cancel = CancellationToken::new();

    let mut tasks = vec![tokio::spawn(worker.run(requests, cancel.clone()))];
    if config.jobs.enabled {
        tasks.push(tokio::spawn(scheduler.run(cancel.clone())));
    } else {
        info!("Maintenance jobs disabled, use `run-job` from an external scheduler");
    }

    let purge_cancel = cancel.clone();
    tasks.push(tokio::spawn(async move {
        let mut tick = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = purge_cancel.cancelled() => break,
                _ = tick.tick() => {
                    let purged = cache.purge_expired().await;
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired cache entries");
                    }
                }
            }
        }
    }));

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.listen))?;
    info!("repscore listening on http://{}", config.server.listen);
    info!("Health check: http://{}/health", config.server.listen);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Background task panicked");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn run_job(job: Job, services: Services) -> Result<()> {
    let Services {
        worker,
        mut requests,
        scheduler,
        ..
    } = services;

    let stop = match job {
        Job::Refresh => {
            // Scanning and the recomputations it schedules share one budget
            let budget = scheduler.budget();
            let report = scheduler.run_staleness_refresh_within(&budget).await?;
            info!(scheduled = report.scheduled, stop = ?report.stop, "Refresh run finished");

            let cancel = CancellationToken::new();
            let processed = worker.drain(&mut requests, &budget, &cancel).await;
            cancel.cancel();
            info!(processed, "Recomputations processed");
            report.stop
        }
        Job::Cleanup => {
            let report = scheduler.run_duplicate_cleanup().await?;
            info!(
                scanned = report.scanned,
                deleted = report.deleted,
                stop = ?report.stop,
                "Cleanup run finished"
            );
            report.stop
        }
    };

    if stop == StopReason::ResourceExhausted {
        bail!("{:?} job stopped: resource exhausted", job);
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
