// Inspect interactor - Probes a media file and renders its streams

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::domain::{MediaInfo, StreamParams};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::MediaBackend;
use crate::utils::path::ensure_input;
use crate::utils::time::format_duration;

/// Output format of an inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectFormat {
    Text,
    Json,
}

/// Interactor for media file inspection use case
pub struct InspectInteractor {
    backend: Arc<dyn MediaBackend>,
}

impl InspectInteractor {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    /// Probe `path`
    pub fn inspect(&self, path: &Path) -> ShiftXResult<MediaInfo> {
        info!("Inspecting {}", path.display());
        ensure_input(path)?;
        self.backend.probe(path)
    }

    /// Probe `path` and render the result
    pub fn execute(&self, path: &Path, format: InspectFormat) -> ShiftXResult<String> {
        let media = self.inspect(path)?;
        match format {
            InspectFormat::Json => serde_json::to_string_pretty(&media)
                .map_err(|e| ShiftXError::config(format!("JSON serialization failed: {}", e))),
            InspectFormat::Text => Ok(format_as_text(&media)),
        }
    }
}

/// Human readable listing, one line per stream
pub fn format_as_text(media: &MediaInfo) -> String {
    let mut output = String::new();
    let (video, audio, data) = media.stream_counts();

    let _ = writeln!(output, "File: {}", media.path.display());
    let _ = writeln!(output, "Format: {}", media.format);
    let _ = writeln!(
        output,
        "Duration: {}",
        media
            .duration
            .map(format_duration)
            .unwrap_or_else(|| "unknown".to_string())
    );
    let _ = writeln!(
        output,
        "Streams: {} ({} video, {} audio, {} data)",
        media.streams.len(),
        video,
        audio,
        data
    );

    for stream in &media.streams {
        let kind = match &stream.params {
            StreamParams::Video(_) => "video",
            StreamParams::Audio(_) => "audio",
            StreamParams::Data => "data",
        };
        let _ = write!(
            output,
            "  #{} {}: {}, time base {}",
            stream.index,
            kind,
            stream.describe(),
            stream.time_base
        );
        if let Some(duration) = stream.duration {
            let _ = write!(output, ", {}", format_duration(duration));
        }
        if let Some(bit_rate) = stream.bit_rate {
            let _ = write!(output, ", {} kb/s", bit_rate / 1000);
        }
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::WavBackend;
    use crate::domain::{AudioParams, StreamInfo, Timebase};

    #[test]
    fn test_format_as_text() {
        let stream = StreamInfo::new(
            0,
            "pcm_s16le",
            Timebase::from_rate(48000).unwrap(),
            StreamParams::Audio(AudioParams {
                sample_rate: 48000,
                channels: 2,
                sample_format: "s16".to_string(),
            }),
        )
        .unwrap()
        .with_duration(90.5);
        let media = MediaInfo::new("music.wav", "wav", vec![stream]);

        let text = format_as_text(&media);
        assert!(text.contains("Format: wav"));
        assert!(text.contains("Duration: 01:30.500"));
        assert!(text.contains("Streams: 1 (0 video, 1 audio, 0 data)"));
        assert!(text.contains("#0 audio: pcm_s16le 48000 Hz 2ch s16"));
    }

    #[test]
    fn test_missing_file() {
        let interactor = InspectInteractor::new(Arc::new(WavBackend::new()));
        assert!(matches!(
            interactor.execute(Path::new("/nonexistent/in.wav"), InspectFormat::Text),
            Err(ShiftXError::InputFileNotFound { .. })
        ));
    }
}
