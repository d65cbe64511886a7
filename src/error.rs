//! Error types for stagepipe.

use crate::media::MediaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Scheduler errors
    #[error("Scheduler is already running with {workers} workers")]
    SchedulerRunning { workers: usize },

    #[error("Invalid worker count: {count}")]
    InvalidWorkerCount { count: usize },

    #[error("Failed to spawn worker {index}: {source}")]
    WorkerSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    // Pipeline wiring errors
    #[error("Pipeline has no stages")]
    EmptyPipeline,

    #[error("Unknown stage id {id}")]
    UnknownStage { id: usize },

    #[error("Stage '{stage}' cannot be linked to itself")]
    SelfLink { stage: String },

    #[error("Stage '{stage}' already has a downstream stage")]
    DuplicateDownstream { stage: String },

    #[error("Stage '{stage}' is terminal and cannot feed a downstream stage")]
    TerminalStageLink { stage: String },

    #[error("Stage '{stage}' has no inbound queue to link into")]
    NoInboundQueue { stage: String },

    #[error("Stage wiring contains a cycle through '{stage}'")]
    CyclicWiring { stage: String },

    #[error("Stage '{stage}' failed to initialize: {message}")]
    StageInit { stage: String, message: String },

    // Media library errors
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_file_not_found_display() {
        let error = Error::ConfigFileNotFound {
            path: "/path/to/config.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found at /path/to/config.toml"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = Error::ConfigInvalidValue {
            key: "scheduler.workers".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for scheduler.workers: must be positive"
        );
    }

    #[test]
    fn test_scheduler_running_display() {
        let error = Error::SchedulerRunning { workers: 4 };
        assert_eq!(
            error.to_string(),
            "Scheduler is already running with 4 workers"
        );
    }

    #[test]
    fn test_worker_spawn_keeps_source() {
        let error = Error::WorkerSpawn {
            index: 2,
            source: io::Error::other("no threads left"),
        };
        assert!(error.to_string().contains("worker 2"));
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_wiring_errors_display() {
        let error = Error::NoInboundQueue {
            stage: "demux".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Stage 'demux' has no inbound queue to link into"
        );

        let error = Error::CyclicWiring {
            stage: "relay".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Stage wiring contains a cycle through 'relay'"
        );
    }

    #[test]
    fn test_from_media_error() {
        let error: Error = MediaError::NotFound {
            source_name: "missing.mp4".to_string(),
        }
        .into();
        assert!(error.to_string().contains("missing.mp4"));
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
