// Concat interactor - Plays the first stream of each input back to back in one output stream

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::app::transcode_interactor::{TranscodeInteractor, TranscodeRequest};
use crate::domain::StreamRequest;
use crate::engine::{ProcessReport, ProgressSink};
use crate::error::{ShiftXError, ShiftXResult};
use crate::utils::path::OverwritePolicy;

/// Files to join, in playback order
#[derive(Debug, Clone)]
pub struct ConcatRequest {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    /// Transcode every input to this profile, rewrap when `None`
    pub profile: Option<String>,
    pub overwrite: OverwritePolicy,
}

impl ConcatRequest {
    /// Every input becomes one segment of output slot 0
    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        self.inputs
            .iter()
            .map(|input| {
                let request = StreamRequest::new(input).with_slot(0);
                match &self.profile {
                    Some(profile) => request.with_profile(profile.as_str()),
                    None => request,
                }
            })
            .collect()
    }
}

/// Interactor for the concatenation use case
pub struct ConcatInteractor {
    transcode: Arc<TranscodeInteractor>,
}

impl ConcatInteractor {
    pub fn new(transcode: Arc<TranscodeInteractor>) -> Self {
        Self { transcode }
    }

    pub fn execute(
        &self,
        request: &ConcatRequest,
        progress: &mut dyn ProgressSink,
    ) -> ShiftXResult<ProcessReport> {
        if request.inputs.len() < 2 {
            return Err(ShiftXError::config("concatenation needs at least two inputs"));
        }
        info!(
            "Concatenating {} files into {}",
            request.inputs.len(),
            request.output.display()
        );

        let job = TranscodeRequest::new(request.stream_requests(), &request.output)
            .with_overwrite(request.overwrite);
        self.transcode.execute(&job, progress)
    }
}
