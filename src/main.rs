//! framechain host
//!
//! Loads the engine config, builds a chain (from a description file or the
//! built-in test chain), streams it and runs a poll loop until the last unit
//! has relayed the requested number of frames.

use anyhow::{bail, Context};
use clap::Parser;
use framechain::config::{EngineConfig, LoggingConfig};
use framechain::pipeline::units::{logger, FrameLogger};
use framechain::pipeline::{
    Chain, ChainDescription, Clock, PipelineEvent, SystemClock, Unit, UnitRegistry, UnitStatus,
};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::os::fd::{BorrowedFd, RawFd};
use std::path::PathBuf;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FRAMES: u64 = 300;

/// Stream a framechain pipeline headlessly.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine config file (defaults to $FRAMECHAIN_CONFIG or the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chain description (TOML or JSON) overriding the config's chain
    #[arg(long)]
    chain: Option<PathBuf>,

    /// Stop after the last unit relayed this many frames
    #[arg(long)]
    frames: Option<u64>,
}

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "framechain.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    guard
}

fn build_registry(config: &EngineConfig) -> UnitRegistry {
    let mut registry = UnitRegistry::with_builtin_units();
    let depth = config.dispatch.handoff_capacity;
    registry.register(logger::info().into(), move || {
        Unit::new(logger::info(), FrameLogger::with_queue_depth(depth))
    });
    registry
}

fn build_chain(config: &EngineConfig, args: &Args, registry: &UnitRegistry) -> anyhow::Result<Chain> {
    let mut chain = Chain::new();
    let description = args.chain.clone().or_else(|| config.chain.description.clone());
    match description {
        Some(path) => {
            let description = ChainDescription::load(&path)?;
            chain
                .load(&description, registry)
                .with_context(|| format!("Failed to build chain from {}", path.display()))?;
        }
        None => {
            tracing::info!("No chain description given, using the built-in test chain");
            for kind in ["input.test_pattern", "filter.passthrough"] {
                chain.add_unit(registry.create_unit(kind)?)?;
            }
        }
    }
    if chain.is_empty() {
        bail!("chain has no units");
    }
    Ok(chain)
}

/// How long to block in `poll` before the next timer unit is due.
fn poll_timeout(next_wake: Option<i64>, now: i64, max: Duration) -> PollTimeout {
    let max_ms = max.as_millis().min(u16::MAX as u128) as u16;
    let ms = match next_wake {
        Some(wake) => {
            let wait_us = (wake - now).max(0) as u64;
            (wait_us.div_ceil(1000)).min(max_ms as u64) as u16
        }
        None => max_ms,
    };
    PollTimeout::from(ms)
}

fn wait_ready(descriptors: &[RawFd], timeout: PollTimeout) -> anyhow::Result<Vec<RawFd>> {
    // SAFETY: descriptors come from streaming units owned by the chain, which
    // stay open for the duration of this call.
    let borrowed: Vec<BorrowedFd<'_>> = descriptors
        .iter()
        .map(|&fd| unsafe { BorrowedFd::borrow_raw(fd) })
        .collect();
    let mut fds: Vec<PollFd<'_>> = borrowed
        .iter()
        .map(|fd| PollFd::new(*fd, PollFlags::POLLIN))
        .collect();
    match poll(&mut fds, timeout) {
        Ok(_) => {}
        Err(nix::errno::Errno::EINTR) => return Ok(Vec::new()),
        Err(e) => return Err(e).context("poll failed"),
    }
    Ok(fds
        .iter()
        .zip(descriptors)
        .filter(|(fd, _)| fd.revents().is_some_and(|r| r.contains(PollFlags::POLLIN)))
        .map(|(_, &raw)| raw)
        .collect())
}

fn run(chain: &mut Chain, config: &EngineConfig, frames: u64) -> anyhow::Result<()> {
    let (_, events) = chain.subscribe(config.events.channel_capacity);
    chain
        .set_desired_status(UnitStatus::Streaming)
        .context("Chain failed to start streaming")?;

    let sink = chain.units().last().cloned().context("chain has no units")?;
    let clock = SystemClock;
    tracing::info!("Streaming {} units, waiting for {} frames", chain.len(), frames);

    while sink.frames_emitted() < frames {
        let sources = chain.poll_sources();
        if sources.is_empty() {
            bail!("no streaming unit has anything to wait on");
        }
        let fds: Vec<RawFd> = sources.descriptors.iter().map(|(_, fd)| *fd).collect();
        let timeout = poll_timeout(sources.next_wake, clock.now_micros(), config.dispatch.max_poll_interval());
        let ready = wait_ready(&fds, timeout)?;
        chain.dispatch(&ready, clock.now_micros());

        for event in events.try_iter() {
            if let PipelineEvent::UnitFaulted { unit, reason } = event {
                bail!("{} faulted: {}", unit, reason);
            }
        }
        if let Some(unit) = chain.faulty_unit() {
            bail!("{} fell below {:?}", unit, chain.desired_status());
        }
    }
    tracing::info!("Relayed {} frames", sink.frames_emitted());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = EngineConfig::load_or_default(args.config.as_deref())?;
    let _log_guard = init_logging(&config.logging);

    tracing::info!("Starting framechain");
    let registry = build_registry(&config);
    let mut chain = build_chain(&config, &args, &registry)?;

    if !config.chain.autostart {
        tracing::info!("Autostart disabled, chain built with {} units", chain.len());
        return Ok(());
    }

    let result = run(&mut chain, &config, args.frames.unwrap_or(DEFAULT_FRAMES));
    if let Err(e) = &result {
        tracing::error!("Tearing down chain: {:#}", e);
    }
    chain.shutdown_all();
    tracing::info!("Shutting down...");
    result
}
