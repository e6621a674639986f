//! End of job summary

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::engine::pipeline::PipelineStatus;
use crate::error::{ShiftXError, ShiftXResult};
use crate::utils::time::{format_duration, format_file_size};

/// What happened to one requested stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub label: String,
    pub slot: usize,
    /// "rewrap" or "transcode"
    pub mode: String,
    pub profile: Option<String>,
    pub offset_seconds: f64,
    pub status: PipelineStatus,
    pub packets: u64,
    pub dropped: u64,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

impl StreamReport {
    /// Failed before producing anything
    pub fn is_skipped(&self) -> bool {
        self.status == PipelineStatus::Failed && self.packets == 0
    }

    fn status_text(&self) -> String {
        match self.status {
            PipelineStatus::Completed => "completed".to_string(),
            PipelineStatus::Truncated => "truncated".to_string(),
            PipelineStatus::Interrupted => "interrupted".to_string(),
            PipelineStatus::Failed if self.packets == 0 => "skipped".to_string(),
            PipelineStatus::Failed => format!("failed after {} packets", self.packets),
        }
    }
}

/// One stream of the written container
#[derive(Debug, Clone, Serialize)]
pub struct SlotReport {
    pub slot: usize,
    pub container_index: usize,
    pub stream: String,
    pub packets: u64,
    pub bytes: u64,
    pub duration_seconds: f64,
}

/// Outcome of [`Transcoder::process`](crate::engine::Transcoder::process)
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub output: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    /// Output container was written and closed
    pub written: bool,
    pub cancelled: bool,
    pub streams: Vec<StreamReport>,
    pub slots: Vec<SlotReport>,
}

impl ProcessReport {
    /// Process exit status: non-zero when a stream failed without producing packets
    pub fn exit_code(&self) -> i32 {
        if self.streams.iter().any(StreamReport::is_skipped) {
            1
        } else {
            0
        }
    }

    pub fn stream(&self, label: &str) -> Option<&StreamReport> {
        self.streams.iter().find(|s| s.label == label)
    }

    /// Human readable summary
    pub fn summary(&self) -> String {
        let mut text = String::new();
        let target = self
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "output".to_string());

        if self.written {
            let _ = writeln!(text, "Wrote {} in {:.2}s", target, self.elapsed_seconds);
        } else {
            let _ = writeln!(text, "Nothing written to {}", target);
        }
        if self.cancelled {
            let _ = writeln!(text, "Cancelled: output closed with the data written so far");
        }

        for stream in &self.streams {
            let _ = write!(
                text,
                "  [{}] {} ({}{}, offset {}) {}: {} packets, {}",
                stream.slot,
                stream.label,
                stream.mode,
                stream
                    .profile
                    .as_deref()
                    .map(|p| format!(" {}", p))
                    .unwrap_or_default(),
                stream.offset_seconds,
                stream.status_text(),
                stream.packets,
                format_duration(stream.duration_seconds)
            );
            if let Some(error) = &stream.error {
                let _ = write!(text, " ({})", error);
            }
            text.push('\n');
        }

        for slot in &self.slots {
            let _ = writeln!(
                text,
                "  slot {} -> stream {}: {}, {} packets, {}, {}",
                slot.slot,
                slot.container_index,
                slot.stream,
                slot.packets,
                format_file_size(slot.bytes),
                format_duration(slot.duration_seconds)
            );
        }

        let _ = write!(text, "Exit code: {}", self.exit_code());
        text
    }

    pub fn to_json(&self) -> ShiftXResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ShiftXError::config(format!("Failed to serialize report: {}", e)))
    }
}
