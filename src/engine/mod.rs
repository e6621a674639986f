//! Core offset engine
//!
//! Streams flow `PacketSource -> StreamPipeline -> Muxer -> ContainerWriter`,
//! with the [`Transcoder`] driving every pipeline of a job from one loop.

pub mod muxer;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod transcoder;

#[cfg(test)]
pub(crate) mod test_support;

pub use muxer::{MuxState, Muxer, OutputStreamSlot};
pub use pipeline::{PipelineOutcome, PipelineState, PipelineStatus, StreamPipeline};
pub use progress::{CancelOnFlag, ConsoleProgress, JobStatus, NoProgress, ProgressSink};
pub use report::{ProcessReport, SlotReport, StreamReport};
pub use scheduler::{OffsetScheduler, Span};
pub use transcoder::Transcoder;
