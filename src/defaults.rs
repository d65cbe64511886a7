//! Default configuration constants for stagepipe.
//!
//! Shared by the serde config sections, the scheduler and the stages so the
//! values stay consistent.

/// Default number of scheduler worker threads.
pub const WORKER_COUNT: usize = 4;

/// Consecutive Idle reports a worker tolerates before it starts sleeping.
///
/// The worker sleeps once its counter exceeds this value, so with 3 the
/// fourth Idle in a row is the first one followed by a backoff sleep.
pub const IDLE_THRESHOLD: usize = 3;

/// Backoff sleep in milliseconds once a worker crosses the idle threshold.
pub const IDLE_BACKOFF_MS: u64 = 1;

/// How long a consuming stage waits on its inbound queue per step.
///
/// Must stay small: a step that waits longer monopolizes its worker.
pub const DEQUEUE_TIMEOUT_MS: u64 = 1;

/// Inter-stage queue capacity. 0 means unbounded.
pub const QUEUE_CAPACITY: usize = 0;

/// Packet size in bytes used by the file media backend.
pub const PACKET_SIZE: usize = 4096;

/// Poll interval used while waiting for a pipeline to drain.
pub const DRAIN_POLL_MS: u64 = 5;

/// Prefix selecting the in-memory media backend on the command line.
pub const SYNTHETIC_PREFIX: &str = "synthetic:";
