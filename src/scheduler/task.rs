//! Schedulable tasks.

use crate::pipeline::error::StageError;
use std::fmt;

/// Two-valued progress signal returned by every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Made forward progress; reschedule promptly.
    Busy,
    /// Nothing to do this cycle. Not an error.
    Idle,
}

impl Progress {
    pub fn is_busy(self) -> bool {
        self == Progress::Busy
    }
}

/// Identity of a submitted task, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Boxed step function.
pub type StepFn = Box<dyn FnMut() -> Result<Progress, StageError> + Send>;

/// A repeatable unit of work.
///
/// Not `Clone`: a task exists once, and whichever worker holds it is the
/// only one that can run it.
pub(crate) struct Task {
    id: TaskId,
    name: String,
    step: StepFn,
}

impl Task {
    pub(crate) fn new(id: TaskId, name: String, step: StepFn) -> Self {
        Self { id, name, step }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(&mut self) -> Result<Progress, StageError> {
        (self.step)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_runs_step_repeatedly() {
        let mut calls = 0;
        let mut task = Task::new(
            TaskId(1),
            "counter".to_string(),
            Box::new(move || {
                calls += 1;
                Ok(if calls < 3 {
                    Progress::Busy
                } else {
                    Progress::Idle
                })
            }),
        );

        assert_eq!(task.run(), Ok(Progress::Busy));
        assert_eq!(task.run(), Ok(Progress::Busy));
        assert_eq!(task.run(), Ok(Progress::Idle));
        assert_eq!(task.id(), TaskId(1));
        assert_eq!(task.name(), "counter");
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(42).to_string(), "task#42");
    }

    #[test]
    fn test_progress_is_busy() {
        assert!(Progress::Busy.is_busy());
        assert!(!Progress::Idle.is_busy());
    }
}
