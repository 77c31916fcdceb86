use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Parser;
use herald_core::{Dispatcher, DispatcherConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Demo driver for the herald dispatcher.
#[derive(Debug, Parser)]
#[command(name = "herald", version, about)]
struct Cli {
    /// Worker threads (overrides the config file).
    #[arg(short, long)]
    threads: Option<usize>,

    /// How many events of each kind to emit.
    #[arg(short, long, default_value_t = 10)]
    events: u64,

    /// JSON config file (`thread_count`, `thread_name_prefix`).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Give up waiting for delivery after this many seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // (A) config: file first, then CLI override
    let config = match &cli.config {
        Some(path) => DispatcherConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DispatcherConfig::default(),
    };
    let threads = cli.threads.unwrap_or(config.thread_count);
    let bus = Dispatcher::with_config(config);

    // (B) handlers: one overloaded name, one fan-out pair
    let ints = Arc::new(AtomicU64::new(0));
    let strings = Arc::new(AtomicU64::new(0));
    let fanout = Arc::new(AtomicU64::new(0));

    bus.add_handler("value", {
        let ints = Arc::clone(&ints);
        move |n: i64| {
            info!(n, "value(i64)");
            ints.fetch_add(1, Ordering::Relaxed);
        }
    });
    bus.add_handler("value", {
        let strings = Arc::clone(&strings);
        move |s: String| {
            info!(%s, "value(String)");
            strings.fetch_add(1, Ordering::Relaxed);
        }
    });
    for member in 0..2_u32 {
        let fanout = Arc::clone(&fanout);
        bus.add_handler("broadcast", move |seq: u64| {
            info!(member, seq, "broadcast");
            fanout.fetch_add(1, Ordering::Relaxed);
        });
    }

    if !bus.start(threads) {
        bail!("dispatcher did not start");
    }

    // (C) emit
    for i in 0..cli.events {
        bus.emit("value", (i as i64,));
        bus.emit("value", (format!("event-{i}"),));
        bus.emit("broadcast", (i,));
    }
    // nobody listens to this one
    let matched = bus.emit("value", (1.5_f64,));
    info!(matched, "emit with unregistered signature");

    // (D) wait for delivery by polling the counters
    let expected = cli.events * 4;
    let deadline = Instant::now() + Duration::from_secs(cli.timeout_secs);
    loop {
        let done = ints.load(Ordering::Relaxed)
            + strings.load(Ordering::Relaxed)
            + fanout.load(Ordering::Relaxed);
        if done >= expected {
            break;
        }
        if Instant::now() >= deadline {
            bail!("timed out: {done}/{expected} handlers ran");
        }
        sleep(Duration::from_millis(10));
    }

    // (E) stop and report
    bus.stop();
    println!("{}", serde_json::to_string_pretty(&bus.stats())?);
    Ok(())
}
