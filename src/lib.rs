//! stagepipe - Cooperative media pipeline stages on a fixed worker pool
//!
//! Stages are small state machines (source, transform, sink) connected by
//! inter-stage queues and stepped by a shared task scheduler.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod scheduler;

// Core traits (source → process → sink)
pub use media::{MediaInput, MediaLibrary, MediaOutput};
pub use pipeline::sink::PacketSink;
pub use pipeline::stage::Stage;
pub use pipeline::transform::Transform;

// Scheduling and wiring
pub use pipeline::orchestrator::{Pipeline, PipelineBuilder, StageId};
pub use scheduler::{Progress, SchedulerConfig, TaskScheduler};

// Error handling
pub use error::{Error, Result};
pub use pipeline::error::{ErrorReporter, StageError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.0.1+abc1234"` when git hash is available, `"0.0.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
