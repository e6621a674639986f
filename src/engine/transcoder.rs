//! Job coordinator
//!
//! Owns every [`StreamPipeline`] of a job and the [`Muxer`], and drives them
//! from a single loop. Each output slot is polled in turn; within a slot the
//! pipelines run one after the other, each starting where the previous one
//! ended.

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::StreamDescriptor;
use crate::engine::muxer::{MuxState, Muxer};
use crate::engine::pipeline::{PipelineState, PipelineStatus, StreamPipeline};
use crate::engine::progress::{JobStatus, ProgressSink};
use crate::engine::report::{ProcessReport, SlotReport, StreamReport};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::{ContainerWriter, MediaBackend};

#[derive(Debug, Default)]
struct SlotRoute {
    pipelines: Vec<usize>,
    cursor: usize,
    mux_slot: Option<usize>,
}

/// Drives all pipelines of a job into one output container
pub struct Transcoder {
    muxer: Muxer,
    pipelines: Vec<StreamPipeline>,
    slot_of: Vec<usize>,
    routes: BTreeMap<usize, SlotRoute>,
}

impl Transcoder {
    pub fn new(writer: Box<dyn ContainerWriter>) -> Self {
        Self {
            muxer: Muxer::new(writer),
            pipelines: Vec::new(),
            slot_of: Vec::new(),
            routes: BTreeMap::new(),
        }
    }

    /// Open the descriptor's stream with `backend` and register its pipeline
    ///
    /// A transform that cannot be opened does not fail the job: the stream is
    /// registered as failed and skipped. Returns the output slot.
    pub fn add_stream(
        &mut self,
        descriptor: StreamDescriptor,
        backend: &dyn MediaBackend,
        slot: Option<usize>,
    ) -> ShiftXResult<usize> {
        let source = backend.open_source(&descriptor)?;
        let pipeline = match descriptor.profile().cloned() {
            None => StreamPipeline::passthrough(descriptor, source),
            Some(profile) => match backend.open_transform(&descriptor, &profile) {
                Ok(transform) => StreamPipeline::transcode(descriptor, source, transform),
                Err(e) => StreamPipeline::failed(descriptor, e),
            },
        };
        self.add_pipeline(pipeline, slot)
    }

    /// Register a prepared pipeline, `None` picks the next free slot
    pub fn add_pipeline(&mut self, pipeline: StreamPipeline, slot: Option<usize>) -> ShiftXResult<usize> {
        if self.muxer.state() != MuxState::Configuring {
            return Err(ShiftXError::config("streams must be added before processing"));
        }

        let slot = slot.unwrap_or_else(|| self.routes.keys().next_back().map_or(0, |last| last + 1));

        if let (Some(output), Some(route)) = (pipeline.output_stream(), self.routes.get(&slot)) {
            for &other in &route.pipelines {
                if let Some(existing) = self.pipelines[other].output_stream() {
                    if !existing.is_compatible_with(output) {
                        return Err(ShiftXError::IncompatibleSlot {
                            slot,
                            first: existing.describe(),
                            second: output.describe(),
                        });
                    }
                }
            }
        }

        debug!(
            "Registered {} on slot {}",
            pipeline.descriptor().label(),
            slot
        );
        let index = self.pipelines.len();
        self.pipelines.push(pipeline);
        self.slot_of.push(slot);
        self.routes.entry(slot).or_default().pipelines.push(index);
        Ok(slot)
    }

    pub fn pipelines(&self) -> &[StreamPipeline] {
        &self.pipelines
    }

    pub fn muxer(&self) -> &Muxer {
        &self.muxer
    }

    /// Run the job to completion or cancellation
    ///
    /// Per-stream failures are reported in the returned [`ProcessReport`];
    /// muxer failures abort the job, remove the partial output and are
    /// returned as errors.
    pub fn process(&mut self, progress: &mut dyn ProgressSink) -> ShiftXResult<ProcessReport> {
        let started_at = Utc::now();
        let clock = Instant::now();

        if self.pipelines.is_empty() {
            return Err(ShiftXError::config("no stream to process"));
        }
        if self.muxer.state() != MuxState::Configuring {
            return Err(ShiftXError::mux("job already processed"));
        }

        if let Err(e) = self.declare_slots() {
            self.muxer.abort();
            return Err(e);
        }
        if self.muxer.slots().is_empty() {
            warn!("No stream can be written, output not created");
            return Ok(self.report(started_at, clock, false, false));
        }

        if let Err(e) = self.muxer.begin_wrap() {
            self.muxer.abort();
            return Err(e);
        }

        let cancelled = match self.drive(progress) {
            Ok(cancelled) => cancelled,
            Err(e) => {
                error!("Aborting job: {}", e);
                self.muxer.abort();
                return Err(e);
            }
        };

        if let Err(e) = self.muxer.end_wrap() {
            error!("Failed to close output: {}", e);
            self.muxer.abort();
            return Err(e);
        }

        let total = self.total_seconds();
        progress.on_progress(self.processed_seconds().max(if cancelled { 0.0 } else { total }), total);

        let report = self.report(started_at, clock, true, cancelled);
        info!(
            "Job finished in {:.2}s, exit code {}",
            report.elapsed_seconds,
            report.exit_code()
        );
        Ok(report)
    }

    fn declare_slots(&mut self) -> ShiftXResult<()> {
        for (slot, route) in self.routes.iter_mut() {
            let stream = route
                .pipelines
                .iter()
                .find_map(|&index| self.pipelines[index].output_stream());
            match stream {
                Some(stream) => route.mux_slot = Some(self.muxer.add_slot(stream)?),
                None => warn!("Slot {} has no usable stream and is left out", slot),
            }
        }
        Ok(())
    }

    /// Round-robin over slots until every pipeline is done, `true` when cancelled
    fn drive(&mut self, progress: &mut dyn ProgressSink) -> ShiftXResult<bool> {
        loop {
            let mut active = false;

            for route in self.routes.values_mut() {
                let Some(mux_slot) = route.mux_slot else {
                    continue;
                };

                while let Some(&index) = route.pipelines.get(route.cursor) {
                    if !self.pipelines[index].is_done() {
                        break;
                    }
                    route.cursor += 1;
                }
                let Some(&index) = route.pipelines.get(route.cursor) else {
                    continue;
                };
                active = true;

                let pipeline = &mut self.pipelines[index];
                if pipeline.state() == PipelineState::Idle {
                    let origin = self
                        .muxer
                        .slot(mux_slot)
                        .map_or(0.0, |slot| slot.end_seconds());
                    pipeline.set_timeline_origin(origin)?;
                }

                match pipeline.next_packet() {
                    Some(packet) => self.muxer.write(mux_slot, &packet)?,
                    None => log_outcome(pipeline),
                }
            }

            if !active {
                return Ok(false);
            }

            if progress.on_progress(self.processed_seconds(), self.total_seconds()) == JobStatus::Cancel {
                warn!("Cancellation requested, closing output with the data written so far");
                return Ok(true);
            }
        }
    }

    fn processed_seconds(&self) -> f64 {
        self.pipelines.iter().map(StreamPipeline::processed_seconds).sum()
    }

    fn total_seconds(&self) -> f64 {
        self.pipelines.iter().map(StreamPipeline::expected_seconds).sum()
    }

    fn report(&self, started_at: chrono::DateTime<Utc>, clock: Instant, written: bool, cancelled: bool) -> ProcessReport {
        let streams = self
            .pipelines
            .iter()
            .zip(&self.slot_of)
            .map(|(pipeline, &slot)| {
                let descriptor = pipeline.descriptor();
                let outcome = pipeline.outcome();
                StreamReport {
                    label: descriptor.label(),
                    slot,
                    mode: if descriptor.is_passthrough() { "rewrap" } else { "transcode" }.to_string(),
                    profile: descriptor.profile().map(|p| p.name.clone()),
                    offset_seconds: descriptor.offset_seconds(),
                    status: outcome.status,
                    packets: outcome.packets,
                    dropped: outcome.dropped,
                    duration_seconds: outcome.duration_seconds,
                    error: outcome.error,
                }
            })
            .collect();

        let slots = self
            .routes
            .iter()
            .filter_map(|(&slot, route)| {
                let mux_slot = self.muxer.slot(route.mux_slot?)?;
                Some(SlotReport {
                    slot,
                    container_index: mux_slot.index,
                    stream: mux_slot.stream.describe(),
                    packets: mux_slot.packets,
                    bytes: mux_slot.bytes,
                    duration_seconds: mux_slot.end_seconds(),
                })
            })
            .collect();

        ProcessReport {
            output: None,
            started_at,
            elapsed_seconds: clock.elapsed().as_secs_f64(),
            written,
            cancelled,
            streams,
            slots,
        }
    }
}

fn log_outcome(pipeline: &StreamPipeline) {
    let outcome = pipeline.outcome();
    let label = pipeline.descriptor().label();
    match outcome.status {
        PipelineStatus::Completed => info!(
            "Stream {} completed: {} packets, {:.3}s",
            label, outcome.packets, outcome.duration_seconds
        ),
        _ => warn!(
            "Stream {} ended {:?} after {} packets: {}",
            label,
            outcome.status,
            outcome.packets,
            outcome.error.as_deref().unwrap_or("no error")
        ),
    }
}
