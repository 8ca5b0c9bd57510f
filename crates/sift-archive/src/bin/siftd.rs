//! # siftd — selective stream archiver daemon
//!
//! Watches a substrate root for topic files matching the configured
//! rules, attaches a recorder per stream, and archives the packets that
//! survive the rule's policy pipeline into rolling, date-partitioned
//! log files.
//!
//! ## Usage
//!
//! ```bash
//! # Config from a JSON file
//! siftd --config /etc/sift/archiver.json
//!
//! # Config from the <topic>.cfg.a0 topic under the root
//! A0_TOPIC=archiver siftd --root /dev/shm/sift
//! ```
//!
//! Runs until SIGHUP, SIGINT, or SIGTERM, then drains every recorder and
//! closes all output files before exiting.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use sift_archive::config::{Config, Protocol};
use sift_archive::supervisor::Supervisor;

const DEFAULT_ROOT: &str = "/dev/shm/sift";

/// Selective stream archiver daemon.
#[derive(Parser, Debug)]
#[command(name = "siftd", about = "sift selective stream archiver")]
struct Cli {
    /// Path to a JSON config file. Without it, config is read from the
    /// `<topic>.cfg.a0` topic under the root.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instance topic; names the config and announce topics.
    #[arg(long, env = "A0_TOPIC", default_value = "sift")]
    topic: String,

    /// Substrate root directory.
    #[arg(long, env = "A0_ROOT", default_value = DEFAULT_ROOT)]
    root: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();

    let raw = match &cli.config {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?,
        None => read_cfg_topic(&cli.root, &cli.topic)?,
    };
    let config = Config::from_json_str(&raw, &cli.root).context("invalid configuration")?;

    tracing::info!(
        topic = %cli.topic,
        searchpath = %config.searchpath.display(),
        savepath = %config.savepath.display(),
        rules = config.rules.len(),
        "siftd starting"
    );

    let announce_path =
        sift_archive::config::topic_file(&cli.root, &format!("{}/announce", cli.topic));
    let supervisor = Supervisor::new(config, announce_path)?;

    wait_for_signal();

    tracing::info!("shutting down, draining recorders...");
    drop(supervisor);
    tracing::info!("siftd stopped");
    Ok(())
}

/// Reads the latest config document published on the cfg topic.
fn read_cfg_topic(root: &std::path::Path, topic: &str) -> anyhow::Result<String> {
    let path = root.join(Protocol::Cfg.template().replace("{topic}", topic));
    let packets = sift_bus::arena::read_all(&path)
        .with_context(|| format!("reading config topic {}", path.display()))?;
    let last = packets
        .last()
        .with_context(|| format!("config topic {} is empty", path.display()))?;
    Ok(String::from_utf8_lossy(last.payload()).into_owned())
}

/// Blocks until SIGHUP, SIGINT, or SIGTERM.
#[cfg(unix)]
fn wait_for_signal() {
    unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut mask);
        libc::sigaddset(&mut mask, libc::SIGHUP);
        libc::sigaddset(&mut mask, libc::SIGINT);
        libc::sigaddset(&mut mask, libc::SIGTERM);
        libc::sigprocmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut());
        let mut sig: libc::c_int = 0;
        libc::sigwait(&mask, &mut sig);
        tracing::info!(signal = sig, "signal received");
    }
}

#[cfg(not(unix))]
fn wait_for_signal() {
    // Fallback: park forever; the process is killed externally.
    loop {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
}
