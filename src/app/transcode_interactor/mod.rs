// Transcode interactor - Validates a job, builds the pipelines and runs them into one output

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{MediaInfo, ProfileRegistry, StreamDescriptor, StreamRequest};
use crate::engine::{ProcessReport, ProgressSink, Transcoder};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::MediaBackend;
use crate::utils::path::{ensure_input, prepare_output, OverwritePolicy};


/// One output file fed by any number of input streams
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub streams: Vec<StreamRequest>,
    pub output: PathBuf,
    pub overwrite: OverwritePolicy,
}

impl TranscodeRequest {
    pub fn new(streams: Vec<StreamRequest>, output: impl Into<PathBuf>) -> Self {
        Self {
            streams,
            output: output.into(),
            overwrite: OverwritePolicy::Never,
        }
    }

    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Validated stream together with its requested slot
#[derive(Debug, Clone)]
pub struct PlannedStream {
    pub descriptor: StreamDescriptor,
    pub slot: Option<usize>,
}

/// Interactor for the transcode use case
pub struct TranscodeInteractor {
    backend: Arc<dyn MediaBackend>,
    profiles: Arc<ProfileRegistry>,
}

impl TranscodeInteractor {
    pub fn new(backend: Arc<dyn MediaBackend>, profiles: Arc<ProfileRegistry>) -> Self {
        Self { backend, profiles }
    }

    /// Validate every request against its probed source
    ///
    /// Nothing is written: setup errors surface before any output I/O.
    pub fn plan(&self, requests: &[StreamRequest]) -> ShiftXResult<Vec<PlannedStream>> {
        if requests.is_empty() {
            return Err(ShiftXError::config("no input stream given"));
        }

        let mut probed: HashMap<PathBuf, MediaInfo> = HashMap::new();
        let mut planned = Vec::with_capacity(requests.len());

        for request in requests {
            if !probed.contains_key(&request.path) {
                ensure_input(&request.path)?;
                let media = self.backend.probe(&request.path)?;
                debug!(
                    "Probed {}: {} ({} streams)",
                    request.path.display(),
                    media.format,
                    media.streams.len()
                );
                probed.insert(request.path.clone(), media);
            }
            let media = &probed[&request.path];

            let descriptor = StreamDescriptor::new(request, media, &self.profiles)?;
            planned.push(PlannedStream {
                descriptor,
                slot: request.slot,
            });
        }
        Ok(planned)
    }

    /// Run the whole job
    pub fn execute(
        &self,
        request: &TranscodeRequest,
        progress: &mut dyn ProgressSink,
    ) -> ShiftXResult<ProcessReport> {
        let planned = self.plan(&request.streams)?;

        let inputs: Vec<&Path> = request.streams.iter().map(|s| s.path.as_path()).collect();
        prepare_output(&request.output, &inputs, request.overwrite)?;

        info!(
            "Writing {} stream(s) into {}",
            planned.len(),
            request.output.display()
        );
        let writer = self.backend.create_writer(&request.output)?;
        let mut transcoder = Transcoder::new(writer);
        for stream in planned {
            let label = stream.descriptor.label();
            let slot = transcoder.add_stream(stream.descriptor, self.backend.as_ref(), stream.slot)?;
            debug!("{} -> slot {}", label, slot);
        }

        let mut report = transcoder.process(progress)?;
        report.output = Some(request.output.clone());
        Ok(report)
    }
}
