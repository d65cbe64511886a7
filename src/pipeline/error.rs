//! Error types and reporting for pipeline stages.

use thiserror::Error;

/// Errors a stage step can return to the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Reported, then treated like an Idle step. The task stays scheduled.
    #[error("Recoverable error: {0}")]
    Recoverable(String),
    /// Reported, then the task is dropped. Other tasks keep running.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl StageError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Fatal(_))
    }
}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from the named task.
    fn report(&self, task: &str, error: &StageError);
}

/// Reporter that forwards to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, task: &str, error: &StageError) {
        match error {
            StageError::Recoverable(_) => log::warn!("[{}] {}", task, error),
            StageError::Fatal(_) => log::error!("[{}] {}", task, error),
        }
    }
}
