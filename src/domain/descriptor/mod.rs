// Stream descriptors - Validated selection of one input stream and its treatment

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::model::{MediaInfo, StreamInfo, StreamKind};
use crate::domain::profile::{Profile, ProfileRegistry};
use crate::error::{ShiftXError, ShiftXResult};


/// Unvalidated stream selection, as read from the command line or a job file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub path: PathBuf,
    #[serde(default)]
    pub stream_index: usize,
    /// Audio channel to extract as a mono stream
    #[serde(default)]
    pub channel: Option<usize>,
    /// Encoding profile name, `None` for passthrough
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub offset: f64,
    /// Explicit output slot, shared slots are concatenated
    #[serde(default)]
    pub slot: Option<usize>,
}

impl StreamRequest {
    /// First stream of `path`, passthrough, no offset
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stream_index: 0,
            channel: None,
            profile: None,
            offset: 0.0,
            slot: None,
        }
    }

    pub fn with_stream(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    pub fn with_channel(mut self, channel: usize) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        let profile = profile.into();
        self.profile = if profile.is_empty() { None } else { Some(profile) };
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }
}

/// Immutable, validated description of one selected input stream
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    source: PathBuf,
    stream: StreamInfo,
    channel: Option<usize>,
    profile: Option<Profile>,
    offset_seconds: f64,
}

impl StreamDescriptor {
    /// Validate a request against the probed source and the known profiles
    pub fn new(
        request: &StreamRequest,
        media: &MediaInfo,
        profiles: &ProfileRegistry,
    ) -> ShiftXResult<Self> {
        let label = request.path.display().to_string();

        if !request.offset.is_finite() {
            return Err(ShiftXError::config(format!(
                "Offset for {}#{} must be a finite number of seconds",
                label, request.stream_index
            )));
        }

        let stream = media
            .stream(request.stream_index)
            .ok_or_else(|| ShiftXError::InvalidStreamReference {
                path: label.clone(),
                index: request.stream_index,
                reason: format!("file has {} stream(s)", media.streams.len()),
            })?
            .clone();

        let profile = match request.profile.as_deref() {
            None | Some("") => None,
            Some(name) => {
                let profile = profiles.resolve(name)?.clone();
                if profile.kind != stream.kind() {
                    return Err(ShiftXError::ProfileMismatch {
                        profile: profile.name,
                        expected: profile.kind.to_string(),
                        actual: stream.kind().to_string(),
                        path: label,
                        index: request.stream_index,
                    });
                }
                Some(profile)
            }
        };

        if let Some(channel) = request.channel {
            let channels = stream.audio().map(|a| a.channels as usize).ok_or_else(|| {
                ShiftXError::InvalidStreamReference {
                    path: label.clone(),
                    index: request.stream_index,
                    reason: "channel selection requires an audio stream".to_string(),
                }
            })?;
            if channel >= channels {
                return Err(ShiftXError::InvalidStreamReference {
                    path: label,
                    index: request.stream_index,
                    reason: format!("channel {} out of range, stream has {}", channel, channels),
                });
            }
            if profile.is_none() {
                return Err(ShiftXError::config(format!(
                    "Extracting channel {} of {}#{} requires an encoding profile",
                    channel, label, request.stream_index
                )));
            }
        }

        Ok(Self {
            source: request.path.clone(),
            stream,
            channel: request.channel,
            profile,
            offset_seconds: request.offset,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn stream_index(&self) -> usize {
        self.stream.index
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream
    }

    pub fn kind(&self) -> StreamKind {
        self.stream.kind()
    }

    pub fn channel(&self) -> Option<usize> {
        self.channel
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Packets are copied, only timestamps change
    pub fn is_passthrough(&self) -> bool {
        self.profile.is_none()
    }

    pub fn offset_seconds(&self) -> f64 {
        self.offset_seconds
    }

    /// Expected output duration, `max(d + o, 0)`, when the source duration is known
    pub fn expected_duration(&self) -> Option<f64> {
        self.stream
            .duration
            .map(|d| (d + self.offset_seconds).max(0.0))
    }

    /// `path#index[.channel]` label used in logs and reports
    pub fn label(&self) -> String {
        match self.channel {
            Some(channel) => format!(
                "{}#{}.{}",
                self.source.display(),
                self.stream.index,
                channel
            ),
            None => format!("{}#{}", self.source.display(), self.stream.index),
        }
    }
}
