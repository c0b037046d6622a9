//! Apex Sentinel
//!
//! Main entry point. The same binary runs in two modes:
//! - supervisor (default): pre-flight checks, owns the signal bus, keeps the
//!   worker pool alive until SIGINT/SIGTERM
//! - worker (APEX_WORKER_ID set): one (chain, role) cell, launched by the
//!   supervisor and bridged to the bus over stdin/stdout
//!
//! Created: 2026-10-19

use anyhow::{Context, Result};
use apex_sentinel::config::{load_config, WORKER_ID_ENV};
use apex_sentinel::supervisor::{ProcessLauncher, Supervisor};
use apex_sentinel::worker;
use clap::Parser;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

/// Apex Sentinel: multi-chain whale watcher
#[derive(Parser)]
#[command(name = "apex-sentinel")]
struct Args {
    /// Optional TOML file with tunables (timings, thresholds, bribe tiers)
    #[arg(short, long, env = "APEX_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let ordinal = std::env::var(WORKER_ID_ENV).ok();

    // Worker stdout carries the bus, so worker logs go to stderr
    init_logging(ordinal.is_some());

    let config = load_config(args.config.as_deref())?;

    match ordinal {
        Some(raw) => {
            let ordinal: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", WORKER_ID_ENV, raw))?;

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(worker::run(ordinal, config));
            if let Err(e) = &result {
                error!("Worker {} stopped: {:#}", ordinal, e);
            }
            result
        }
        None => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(supervise(config))
        }
    }
}

async fn supervise(config: apex_sentinel::BotConfig) -> Result<()> {
    info!("===========================================");
    info!("   Apex Sentinel");
    info!("===========================================");
    for chain in &config.chains {
        info!(
            "Chain {}: {} endpoints | stream: {} | {:?}",
            chain,
            chain.rpc_urls.len(),
            if chain.ws_url.is_some() { "yes" } else { "no" },
            chain.submission_mode
        );
    }

    let launcher = Arc::new(ProcessLauncher::current()?);
    let supervisor = match Supervisor::new(&config.beneficiary, config.tunables.supervisor.clone(), launcher) {
        Ok(s) => s,
        Err(e) => {
            error!("Pre-flight check failed: {}", e);
            return Err(e.into());
        }
    };

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    let shutdown = async move {
        if let Some(sig) = signals.next().await {
            info!("Received signal {}", sig);
        }
    };

    let stats = supervisor.stats();
    supervisor.run(shutdown).await;
    handle.close();
    info!("Supervisor stopped ({} worker restarts)", stats.total_restarts());
    Ok(())
}

fn init_logging(to_stderr: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = if to_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let builder = fmt().with_env_filter(filter).with_target(false).with_writer(writer);

    if std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}
