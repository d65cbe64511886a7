use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use stagepipe::app::{RunSummary, run_copy};
use stagepipe::cli::Cli;
use stagepipe::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG still wins over the -v / -q flags
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();
    log::info!("stagepipe {}", stagepipe::version_string());

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.scheduler.workers = workers;
    }
    if let Some(capacity) = cli.capacity {
        config.queue.capacity = capacity;
    }

    let summary = run_copy(&config, &cli.input, cli.output.as_deref(), cli.timeout)
        .with_context(|| format!("Failed to process '{}'", cli.input))?;

    if !cli.quiet {
        print_summary(&summary);
    }
    if !summary.drained {
        std::process::exit(1);
    }
    Ok(())
}

/// Load config from a custom path, or the default path with fallback to defaults.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => match Config::default_path() {
            Some(default_path) => Config::load_or_default(&default_path)?,
            None => Config::default(),
        },
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

fn print_summary(summary: &RunSummary) {
    if summary.drained {
        println!(
            "{} {} packets ({} bytes) in {:.1?}",
            "Done:".green(),
            summary.written.processed,
            summary.written.bytes,
            summary.elapsed
        );
    } else {
        println!(
            "{} pipeline stalled after {:.1?}",
            "Stalled:".yellow(),
            summary.elapsed
        );
        for (name, lifecycle) in &summary.stages {
            println!("  {}  {}", format!("{}:", name).dimmed(), lifecycle);
        }
    }
    println!(
        "  {}  read {} / written {}",
        "Packets:".dimmed(),
        summary.read.processed,
        summary.written.processed
    );
    println!(
        "  {}  {} steps ({} busy, {} idle), {} backoff sleeps, {} aborted",
        "Scheduler:".dimmed(),
        summary.stats.dispatched,
        summary.stats.busy,
        summary.stats.idle,
        summary.stats.backoff_sleeps,
        summary.stats.aborted
    );
}
