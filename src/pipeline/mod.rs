//! Cooperative pipeline stages.
//!
//! Stages are state machines stepped by the scheduler. Each consuming stage
//! owns its inbound [`InterStageQueue`]; producers append through
//! [`QueueWriter`] handles handed out when the [`Pipeline`] is built.

pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod sink;
pub mod source;
pub mod stage;
pub mod transform;
pub mod types;

pub use error::{ErrorReporter, LogReporter, StageError};
pub use orchestrator::{Pipeline, PipelineBuilder, StageId};
pub use queue::{Dequeued, EnqueueError, InterStageQueue, QueueWriter};
pub use sink::{Collected, CollectorSink, DiscardSink, PacketSink, SinkStage, WriterSink};
pub use source::{SourceStage, SourceState};
pub use stage::{Lifecycle, Stage, StageBase};
pub use transform::{Passthrough, Transform, TransformStage};
pub use types::{Buffer, StageMetrics};
