//! StorWatch — live storage-device inventory.
//!
//! Thin binary entry point. All logic lives in the `storwatch-core` crate.

mod report;

use clap::Parser;
use std::path::PathBuf;
use storwatch_core::WatchConfig;

#[derive(Parser, Debug)]
#[cfg_attr(not(windows), allow(dead_code))]
#[command(name = "storwatch", version, about = "Watch storage devices arrive and leave")]
struct Args {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Print the inventory and changes as JSON lines.
    #[arg(long)]
    json: bool,

    /// Print the current inventory and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable with --json.
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("StorWatch starting");

    let config = match &args.config {
        Some(path) => WatchConfig::load(path)?,
        None => WatchConfig::default(),
    };

    run(&args, config)
}

#[cfg(windows)]
fn run(args: &Args, config: WatchConfig) -> anyhow::Result<()> {
    use storwatch_core::StorageWatcher;

    let watcher = StorageWatcher::new(storwatch_core::platform::windows::backend(), config);
    watcher.reload_storages();
    for line in report::inventory_lines(&watcher.snapshot(), args.json)? {
        println!("{line}");
    }
    if args.once {
        return Ok(());
    }

    let (_id, changes) = watcher.subscribe_channel();
    let _threads = watcher.start()?;
    for change in changes {
        println!("{}", report::change_line(&change, args.json)?);
    }
    Ok(())
}

#[cfg(not(windows))]
fn run(_args: &Args, _config: WatchConfig) -> anyhow::Result<()> {
    anyhow::bail!("storwatch needs Windows: live device notifications are only available there")
}
