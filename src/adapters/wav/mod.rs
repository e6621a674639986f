//! Pure Rust WAVE backend
//!
//! Reads and writes RIFF/WAVE files holding one interleaved PCM stream, and
//! converts between PCM layouts of the same sample rate.

mod pcm;
mod reader;
mod writer;

pub use pcm::PcmTransform;
pub use reader::{WavHeader, WavSource, PACKET_FRAMES};
pub use writer::WavWriter;

use std::path::Path;
use tracing::debug;

use crate::domain::{MediaInfo, Profile, StreamDescriptor};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::{ContainerWriter, MediaBackend, PacketSource, StreamTransform};
use crate::utils::path::extension_of;

/// Backend for `.wav` files
#[derive(Debug, Default, Clone, Copy)]
pub struct WavBackend;

impl WavBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for WavBackend {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn handles(&self, path: &Path) -> bool {
        matches!(extension_of(path).as_deref(), Some("wav" | "wave"))
    }

    fn probe(&self, path: &Path) -> ShiftXResult<MediaInfo> {
        let header = WavHeader::open(path)?;
        debug!("Probed {}: {:?}", path.display(), header);
        Ok(MediaInfo::new(path, "wav", vec![header.stream_info()?]))
    }

    fn open_source(&self, descriptor: &StreamDescriptor) -> ShiftXResult<Box<dyn PacketSource>> {
        if descriptor.stream_index() != 0 {
            return Err(ShiftXError::InvalidStreamReference {
                path: descriptor.source().display().to_string(),
                index: descriptor.stream_index(),
                reason: "WAVE files hold a single stream".to_string(),
            });
        }
        Ok(Box::new(WavSource::open(descriptor.source())?))
    }

    fn open_transform(
        &self,
        descriptor: &StreamDescriptor,
        profile: &Profile,
    ) -> ShiftXResult<Box<dyn StreamTransform>> {
        Ok(Box::new(PcmTransform::new(descriptor, profile)?))
    }

    fn create_writer(&self, path: &Path) -> ShiftXResult<Box<dyn ContainerWriter>> {
        Ok(Box::new(WavWriter::new(path)))
    }
}
