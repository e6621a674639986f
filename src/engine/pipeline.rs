//! Per-stream pipeline
//!
//! A pipeline pulls packets from one [`PacketSource`], places them on the
//! output timeline with an [`OffsetScheduler`] and, when the stream has an
//! encoding profile, runs them through a [`StreamTransform`].
//!
//! States move `Idle -> Active -> Draining -> Done`. Transform failures end
//! the pipeline immediately; read failures drain what is buffered first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::domain::{Packet, StreamDescriptor, StreamInfo, StreamKind, Timebase};
use crate::engine::scheduler::OffsetScheduler;
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::{PacketSource, StreamTransform};

/// Lifecycle of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Active,
    Draining,
    Done,
}

/// How a finished pipeline ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Source exhausted and everything flushed
    Completed,
    /// Source failed, buffered data was still emitted
    Truncated,
    /// Decode or encode failed
    Failed,
    /// Job stopped before this stream finished
    Interrupted,
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub status: PipelineStatus,
    pub packets: u64,
    pub dropped: u64,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

/// One selected stream on its way to the muxer
pub struct StreamPipeline {
    descriptor: StreamDescriptor,
    source: Option<Box<dyn PacketSource>>,
    transform: Option<Box<dyn StreamTransform>>,
    output: Option<StreamInfo>,
    scheduler: OffsetScheduler,
    origin_seconds: f64,
    state: PipelineState,
    pending: VecDeque<Packet>,
    started: bool,
    awaiting_keyframe: bool,
    packets: u64,
    dropped: u64,
    end_ts: Option<i64>,
    error: Option<ShiftXError>,
    truncated: bool,
}

impl StreamPipeline {
    /// Rewrap pipeline, payloads are copied untouched
    pub fn passthrough(descriptor: StreamDescriptor, source: Box<dyn PacketSource>) -> Self {
        let output = descriptor.stream_info().clone();
        Self::build(descriptor, Some(source), None, Some(output))
    }

    /// Transcode pipeline through `transform`
    pub fn transcode(
        descriptor: StreamDescriptor,
        source: Box<dyn PacketSource>,
        transform: Box<dyn StreamTransform>,
    ) -> Self {
        let output = transform.output_stream().clone();
        Self::build(descriptor, Some(source), Some(transform), Some(output))
    }

    /// Pipeline whose transform could not be opened
    pub fn failed(descriptor: StreamDescriptor, error: ShiftXError) -> Self {
        warn!("Stream {} will be skipped: {}", descriptor.label(), error);
        let mut pipeline = Self::build(descriptor, None, None, None);
        pipeline.error = Some(as_transform_error(error));
        pipeline.state = PipelineState::Done;
        pipeline
    }

    fn build(
        descriptor: StreamDescriptor,
        source: Option<Box<dyn PacketSource>>,
        transform: Option<Box<dyn StreamTransform>>,
        output: Option<StreamInfo>,
    ) -> Self {
        let scheduler = OffsetScheduler::new(
            descriptor.offset_seconds(),
            descriptor.stream_info().time_base,
        );
        Self {
            descriptor,
            source,
            transform,
            output,
            scheduler,
            origin_seconds: 0.0,
            state: PipelineState::Idle,
            pending: VecDeque::new(),
            started: false,
            awaiting_keyframe: false,
            packets: 0,
            dropped: 0,
            end_ts: None,
            error: None,
            truncated: false,
        }
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == PipelineState::Done && self.pending.is_empty()
    }

    /// Codec parameters of the packets this pipeline yields
    pub fn output_stream(&self) -> Option<&StreamInfo> {
        self.output.as_ref()
    }

    pub fn scheduler(&self) -> &OffsetScheduler {
        &self.scheduler
    }

    /// Start this stream's timeline at `seconds` instead of zero
    ///
    /// Used when several streams are played back to back in one slot.
    pub fn set_timeline_origin(&mut self, seconds: f64) -> ShiftXResult<()> {
        if self.state != PipelineState::Idle {
            return Err(ShiftXError::config(format!(
                "Cannot move the timeline of {} once started",
                self.descriptor.label()
            )));
        }
        self.origin_seconds = seconds;
        self.scheduler = OffsetScheduler::new(
            self.descriptor.offset_seconds(),
            self.descriptor.stream_info().time_base,
        )
        .with_origin(seconds);
        Ok(())
    }

    /// Next packet ready for muxing, `None` once the pipeline is done
    pub fn next_packet(&mut self) -> Option<Packet> {
        loop {
            if let Some(packet) = self.pending.pop_front() {
                self.record(&packet);
                return Some(packet);
            }

            match self.state {
                PipelineState::Idle => self.activate(),
                PipelineState::Active => self.pull(),
                PipelineState::Draining => self.drain(),
                PipelineState::Done => return None,
            }
        }
    }

    fn activate(&mut self) {
        debug!(
            "Starting {} (offset {} ticks from {} at {})",
            self.descriptor.label(),
            self.scheduler.offset_ticks(),
            self.scheduler.origin_ticks(),
            self.scheduler.time_base()
        );
        self.state = PipelineState::Active;

        if self.descriptor.offset_seconds() <= 0.0 {
            return;
        }
        let Some(transform) = self.transform.as_mut() else {
            return;
        };

        let scheduler = self.scheduler.rebased(transform.output_stream().time_base);
        let from = scheduler.origin_ticks();
        let until = from.saturating_add(scheduler.lead_in());
        match transform.fill(from, until) {
            Ok(packets) => {
                debug!(
                    "Padded {} with {} generated packets",
                    self.descriptor.label(),
                    packets.len()
                );
                self.pending.extend(packets);
            }
            Err(e) => self.fail(e),
        }
    }

    fn pull(&mut self) {
        let Some(source) = self.source.as_mut() else {
            self.state = PipelineState::Draining;
            return;
        };

        match source.read_next() {
            Ok(Some(packet)) => self.accept(packet),
            Ok(None) => {
                debug!("Source of {} exhausted", self.descriptor.label());
                self.state = PipelineState::Draining;
            }
            Err(e) => {
                warn!(
                    "Read error on {}, keeping {} packets: {}",
                    self.descriptor.label(),
                    self.packets,
                    e
                );
                self.error = Some(e);
                self.truncated = true;
                self.state = PipelineState::Draining;
            }
        }
    }

    fn accept(&mut self, packet: Packet) {
        if let Some(transform) = self.transform.as_mut() {
            match transform.transform(&packet, &self.scheduler) {
                Ok(packets) => self.pending.extend(packets),
                Err(e) => self.fail(e),
            }
            return;
        }

        if self.scheduler.schedule(packet.pts).is_none() {
            self.dropped += 1;
            if packet.kind == StreamKind::Video && !self.started {
                self.awaiting_keyframe = true;
            }
            return;
        }

        // A trimmed video stream must restart on a decodable packet
        if self.awaiting_keyframe {
            if !packet.keyframe {
                self.dropped += 1;
                return;
            }
            self.awaiting_keyframe = false;
        }

        self.started = true;
        self.pending
            .push_back(packet.shifted(self.scheduler.shift_ticks()));
    }

    fn drain(&mut self) {
        if let Some(transform) = self.transform.as_mut() {
            match transform.flush(&self.scheduler) {
                Ok(packets) => self.pending.extend(packets),
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }

        self.state = PipelineState::Done;
        self.source = None;
        info!(
            "Stream {} finished: {} packets, {} dropped",
            self.descriptor.label(),
            self.packets + self.pending.len() as u64,
            self.dropped
        );
    }

    fn fail(&mut self, error: ShiftXError) {
        warn!(
            "Transform error on {} after {} packets: {}",
            self.descriptor.label(),
            self.packets,
            error
        );
        self.error = Some(as_transform_error(error));
        self.pending.clear();
        self.state = PipelineState::Done;
        self.source = None;
        self.transform = None;
    }

    fn record(&mut self, packet: &Packet) {
        self.started = true;
        self.packets += 1;
        let end = packet.end();
        self.end_ts = Some(self.end_ts.map_or(end, |current| current.max(end)));
    }

    fn output_time_base(&self) -> Timebase {
        self.output
            .as_ref()
            .map(|s| s.time_base)
            .unwrap_or(self.descriptor.stream_info().time_base)
    }

    /// Seconds of output timeline produced so far, from this stream's origin
    pub fn written_seconds(&self) -> f64 {
        self.end_ts
            .map(|end| self.output_time_base().pts_to_seconds(end) - self.origin_seconds)
            .unwrap_or(0.0)
            .max(0.0)
    }

    /// Estimated length of this stream's output
    pub fn expected_seconds(&self) -> f64 {
        if self.error.is_some() && self.state == PipelineState::Done {
            return self.written_seconds();
        }
        self.descriptor
            .expected_duration()
            .unwrap_or_else(|| self.written_seconds())
    }

    /// Progress units done, the full estimate once finished
    pub fn processed_seconds(&self) -> f64 {
        if self.is_done() {
            self.expected_seconds()
        } else {
            self.written_seconds().min(self.expected_seconds())
        }
    }

    pub fn outcome(&self) -> PipelineOutcome {
        let status = match &self.error {
            Some(ShiftXError::TransformError { .. }) => PipelineStatus::Failed,
            _ if self.state != PipelineState::Done => PipelineStatus::Interrupted,
            _ if self.truncated => PipelineStatus::Truncated,
            _ => PipelineStatus::Completed,
        };
        PipelineOutcome {
            status,
            packets: self.packets,
            dropped: self.dropped,
            duration_seconds: self.written_seconds(),
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

fn as_transform_error(error: ShiftXError) -> ShiftXError {
    match error {
        e @ ShiftXError::TransformError { .. } => e,
        other => ShiftXError::transform(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;

    fn collect(pipeline: &mut StreamPipeline) -> Vec<Packet> {
        std::iter::from_fn(|| pipeline.next_packet()).collect()
    }

    #[test]
    fn test_state_transitions() {
        let descriptor = audio_descriptor(48000, 0.0);
        let source = MemorySource::audio_blocks(3, 1024, 48000);
        let mut pipeline = StreamPipeline::passthrough(descriptor, Box::new(source));

        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(pipeline.next_packet().is_some());
        assert_eq!(pipeline.state(), PipelineState::Active);
        assert_eq!(collect(&mut pipeline).len(), 2);
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert!(pipeline.next_packet().is_none());
        assert_eq!(pipeline.outcome().status, PipelineStatus::Completed);
    }

    #[test]
    fn test_passthrough_keeps_payload_and_shifts_timestamps() {
        let source = MemorySource::audio_blocks(4, 1024, 48000);
        let originals = source.packets();
        let mut pipeline = StreamPipeline::passthrough(audio_descriptor(48000, 1.0), Box::new(source));

        let packets = collect(&mut pipeline);
        assert_eq!(packets.len(), 4);
        for (out, original) in packets.iter().zip(originals.iter()) {
            assert_eq!(out.payload, original.payload);
            assert_eq!(out.pts, original.pts + 48000);
            assert_eq!(out.dts, original.dts + 48000);
        }
        assert!((pipeline.outcome().duration_seconds - (1.0 + 4096.0 / 48000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_negative_offset_drops_leading_packets() {
        let source = MemorySource::audio_blocks(10, 1000, 1000);
        let mut pipeline = StreamPipeline::passthrough(audio_descriptor(1000, -3.5), Box::new(source));

        let packets = collect(&mut pipeline);
        // Blocks starting at 4s..9s survive, shifted to 0.5s..5.5s
        assert_eq!(packets.len(), 6);
        assert_eq!(packets[0].pts, 500);
        assert_eq!(pipeline.outcome().dropped, 4);
    }

    #[test]
    fn test_offset_beyond_duration_yields_nothing() {
        let source = MemorySource::audio_blocks(5, 1000, 1000);
        let mut pipeline = StreamPipeline::passthrough(audio_descriptor(1000, -5.0), Box::new(source));

        assert!(collect(&mut pipeline).is_empty());
        let outcome = pipeline.outcome();
        assert_eq!(outcome.status, PipelineStatus::Completed);
        assert_eq!(outcome.packets, 0);
        assert_eq!(outcome.dropped, 5);
    }

    #[test]
    fn test_video_trim_waits_for_keyframe() {
        // GOP of 5 frames at 25 fps, keyframes at 0, 5, 10
        let source = MemorySource::video_frames(15, 5, 25);
        let mut pipeline = StreamPipeline::passthrough(video_descriptor(25, -0.12), Box::new(source));

        let packets = collect(&mut pipeline);
        assert!(packets[0].keyframe);
        // Frame 5 lands at 5 - 3 = 2
        assert_eq!(packets[0].pts, 2);
        assert_eq!(packets.len(), 10);
        assert_eq!(pipeline.outcome().dropped, 5);
    }

    #[test]
    fn test_transcode_fills_positive_offset() {
        let source = MemorySource::audio_blocks(2, 1000, 1000);
        let transform = CopyTransform::new(1000);
        let mut pipeline = StreamPipeline::transcode(
            audio_descriptor_with_profile(1000, 2.0),
            Box::new(source),
            Box::new(transform),
        );

        let packets = collect(&mut pipeline);
        // Two generated blocks then the two transformed ones
        assert_eq!(packets.len(), 4);
        assert_eq!(packets[0].pts, 0);
        assert_eq!(packets[1].pts, 1000);
        assert_eq!(packets[2].pts, 2000);
        assert_eq!(packets[3].pts, 3000);
        assert!((pipeline.outcome().duration_seconds - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_transform_error_ends_pipeline() {
        let source = MemorySource::audio_blocks(5, 1000, 1000);
        let transform = CopyTransform::new(1000).failing_after(2);
        let mut pipeline = StreamPipeline::transcode(
            audio_descriptor_with_profile(1000, 0.0),
            Box::new(source),
            Box::new(transform),
        );

        assert_eq!(collect(&mut pipeline).len(), 2);
        assert_eq!(pipeline.state(), PipelineState::Done);
        let outcome = pipeline.outcome();
        assert_eq!(outcome.status, PipelineStatus::Failed);
        assert_eq!(outcome.packets, 2);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_read_error_truncates() {
        let source = MemorySource::audio_blocks(5, 1000, 1000).failing_at(3);
        let mut pipeline = StreamPipeline::passthrough(audio_descriptor(1000, 0.0), Box::new(source));

        assert_eq!(collect(&mut pipeline).len(), 3);
        let outcome = pipeline.outcome();
        assert_eq!(outcome.status, PipelineStatus::Truncated);
        assert_eq!(outcome.packets, 3);
    }

    #[test]
    fn test_failed_pipeline_is_done() {
        let pipeline = StreamPipeline::failed(
            audio_descriptor_with_profile(1000, 0.0),
            ShiftXError::config("encoder missing"),
        );
        assert!(pipeline.is_done());
        assert!(pipeline.output_stream().is_none());
        let outcome = pipeline.outcome();
        assert_eq!(outcome.status, PipelineStatus::Failed);
        assert_eq!(outcome.packets, 0);
    }

    #[test]
    fn test_timeline_origin() {
        let source = MemorySource::audio_blocks(2, 1000, 1000);
        let mut pipeline = StreamPipeline::passthrough(audio_descriptor(1000, 0.5), Box::new(source));
        pipeline.set_timeline_origin(3.0).unwrap();

        let packets = collect(&mut pipeline);
        assert_eq!(packets[0].pts, 3500);
        assert!((pipeline.written_seconds() - 2.5).abs() < 1e-9);
        assert!(pipeline.set_timeline_origin(1.0).is_err());
    }
}
