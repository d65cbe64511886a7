//! Command-line interface for stagepipe
//!
//! Provides argument parsing using clap derive macros.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Copy a media stream through a scheduled Source -> Sink pipeline
#[derive(Parser, Debug)]
#[command(
    name = "stagepipe",
    version,
    about = "Copy a media stream through a scheduled Source -> Sink pipeline"
)]
pub struct Cli {
    /// Input file path, or synthetic:N for an in-memory stream of N packets
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Output file (default: discard packets)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Worker threads (default: from config)
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Give up if the pipeline has not drained after this long. Examples: 500ms, 5s, 1m
    #[arg(long, short = 't', value_name = "DURATION", default_value = "5s", value_parser = parse_timeout)]
    pub timeout: Duration,

    /// Inter-stage queue capacity, 0 for unbounded (default: from config)
    #[arg(long, value_name = "N")]
    pub capacity: Option<usize>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose output (-v: info, -vv: debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Log filter for `env_logger` derived from `-q` / `-v`.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}

/// Parse a timeout string.
///
/// Supports any duration format accepted by `humantime`, and bare numbers
/// as seconds.
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}
