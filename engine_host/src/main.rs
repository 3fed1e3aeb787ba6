//! Standalone host binary.
//!
//! Usage:
//!   cargo run -p engine_host -- [--config host.json] [--manifest res/level1.res]
//!                               [--frames 600] [--frame-hz 60] [--seed 7]
//!                               [--context-loss-frame 120]
//!
//! Creates resources from the manifest (or the built-in demo manifest), runs
//! a paced frame loop that drives the registry's garbage collector, and
//! prints a JSON report on exit.

use std::env;
use std::time::Duration;

use anyhow::Context;
use engine_host::config::HostConfig;
use engine_host::ResourceHost;
use tracing::{debug, info};

fn parse_args() -> anyhow::Result<HostConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => HostConfig::from_file(&args[i + 1])?,
        _ => HostConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--manifest" if i + 1 < args.len() => {
                cfg.manifest = Some(args[i + 1].clone());
                i += 2;
            }
            "--frames" if i + 1 < args.len() => {
                cfg.frames = args[i + 1].parse().unwrap_or(cfg.frames);
                i += 2;
            }
            "--frame-hz" if i + 1 < args.len() => {
                cfg.frame_hz = args[i + 1].parse().unwrap_or(60);
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                cfg.seed = args[i + 1].parse().unwrap_or(0);
                i += 2;
            }
            "--context-loss-frame" if i + 1 < args.len() => {
                cfg.context_loss_frame = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args().context("parse arguments")?;
    info!(
        frames = cfg.frames,
        frame_hz = cfg.frame_hz,
        manifest = cfg.manifest.as_deref().unwrap_or("<built-in>"),
        "Starting resource host"
    );

    let mut host = ResourceHost::new(cfg.clone()).context("create host")?;
    host.load_manifest()?;

    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(cfg.frame_hz.max(1)));
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    for _ in 0..cfg.frames {
        ticker.tick().await;
        let frame = host.step();
        if frame.gc_regime.is_some() || frame.event.is_some() {
            debug!(?frame, "frame");
        }
    }

    let report = host.report();
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize report")?
    );
    Ok(())
}
