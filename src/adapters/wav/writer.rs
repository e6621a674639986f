//! WAVE container writer
//!
//! Samples go to a temporary file next to the destination, which replaces the
//! destination only once the trailer is written. Gaps between packets are
//! filled with silence and overlapping samples are discarded.

use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::domain::{Packet, SampleFormat, StreamInfo, StreamKind};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::ContainerWriter;

const HEADER_LEN: u64 = 44;

#[derive(Debug, Clone, Copy)]
struct Layout {
    format: SampleFormat,
    channels: u16,
    sample_rate: u32,
}

impl Layout {
    fn block_align(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    fn silence(&self, frames: u64) -> Vec<u8> {
        let value = if self.format == SampleFormat::U8 { 0x80 } else { 0 };
        vec![value; frames as usize * self.block_align()]
    }

    fn header(&self, data_len: u32) -> [u8; HEADER_LEN as usize] {
        let tag: u16 = if self.format.is_float() { 3 } else { 1 };
        let block_align = self.block_align() as u16;
        let byte_rate = self.sample_rate * block_align as u32;

        let mut header = [0u8; HEADER_LEN as usize];
        header[0..4].copy_from_slice(b"RIFF");
        header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
        header[8..12].copy_from_slice(b"WAVE");
        header[12..16].copy_from_slice(b"fmt ");
        header[16..20].copy_from_slice(&16u32.to_le_bytes());
        header[20..22].copy_from_slice(&tag.to_le_bytes());
        header[22..24].copy_from_slice(&self.channels.to_le_bytes());
        header[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
        header[32..34].copy_from_slice(&block_align.to_le_bytes());
        header[34..36].copy_from_slice(&self.format.bits_per_sample().to_le_bytes());
        header[36..40].copy_from_slice(b"data");
        header[40..44].copy_from_slice(&data_len.to_le_bytes());
        header
    }
}

/// Single stream PCM WAVE writer
pub struct WavWriter {
    path: PathBuf,
    layout: Option<Layout>,
    file: Option<BufWriter<NamedTempFile>>,
    frames: u64,
    padded: u64,
    trimmed: u64,
}

impl WavWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            layout: None,
            file: None,
            frames: 0,
            padded: 0,
            trimmed: 0,
        }
    }

    /// Silent frames inserted into timestamp gaps so far
    pub fn padded_frames(&self) -> u64 {
        self.padded
    }

    /// Frames dropped because they overlapped data already written
    pub fn trimmed_frames(&self) -> u64 {
        self.trimmed
    }

    fn layout(&self) -> ShiftXResult<Layout> {
        self.layout
            .ok_or_else(|| ShiftXError::mux("WAVE output has no stream"))
    }

    fn file(&mut self) -> ShiftXResult<&mut BufWriter<NamedTempFile>> {
        self.file
            .as_mut()
            .ok_or_else(|| ShiftXError::mux("WAVE output is not open"))
    }
}

impl ContainerWriter for WavWriter {
    fn add_stream(&mut self, stream: &StreamInfo) -> ShiftXResult<usize> {
        if self.layout.is_some() {
            return Err(ShiftXError::mux(
                "WAVE output holds a single audio stream, use another container for more",
            ));
        }
        let (Some(audio), Some(format)) = (stream.audio(), SampleFormat::from_codec_name(&stream.codec)) else {
            return Err(ShiftXError::mux(format!(
                "WAVE output cannot store {}",
                stream.describe()
            )));
        };
        self.layout = Some(Layout {
            format,
            channels: audio.channels,
            sample_rate: audio.sample_rate,
        });
        Ok(0)
    }

    fn write_header(&mut self) -> ShiftXResult<()> {
        let layout = self.layout()?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".shiftx-")
            .suffix(".wav.part")
            .tempfile_in(&dir)
            .map_err(|e| ShiftXError::mux(format!("Failed to create temp file in {}: {}", dir.display(), e)))?;
        debug!("Writing {} through {}", self.path.display(), temp.path().display());

        let mut file = BufWriter::new(temp);
        file.write_all(&layout.header(0))?;
        self.file = Some(file);
        Ok(())
    }

    fn write_packet(&mut self, stream: usize, packet: &Packet) -> ShiftXResult<()> {
        let layout = self.layout()?;
        if stream != 0 || packet.kind != StreamKind::Audio {
            return Err(ShiftXError::mux(format!("unknown WAVE stream {}", stream)));
        }
        let block_align = layout.block_align();
        if packet.payload.len() % block_align != 0 {
            return Err(ShiftXError::mux(format!(
                "packet of {} bytes is not a whole number of {} byte frames",
                packet.payload.len(),
                block_align
            )));
        }
        if packet.pts < 0 {
            return Err(ShiftXError::mux(format!("negative timestamp {}", packet.pts)));
        }

        let start = packet.pts as u64;
        let mut payload = &packet.payload[..];
        if start > self.frames {
            let gap = start - self.frames;
            let silence = layout.silence(gap);
            self.file()?.write_all(&silence)?;
            self.frames += gap;
            self.padded += gap;
        } else if start < self.frames {
            let overlap = ((self.frames - start) as usize * block_align).min(payload.len());
            payload = &payload[overlap..];
            self.trimmed += (overlap / block_align) as u64;
        }

        self.file()?.write_all(payload)?;
        self.frames += (payload.len() / block_align) as u64;
        Ok(())
    }

    fn write_trailer(&mut self) -> ShiftXResult<()> {
        let layout = self.layout()?;
        let file = self
            .file
            .take()
            .ok_or_else(|| ShiftXError::mux("WAVE output is not open"))?;

        let data_len = self.frames * layout.block_align() as u64;
        let data_len = u32::try_from(data_len)
            .ok()
            .filter(|len| *len <= u32::MAX - 36)
            .ok_or_else(|| ShiftXError::mux(format!("{} bytes of samples exceed the WAVE size limit", data_len)))?;

        let mut temp = file.into_inner().map_err(|e| ShiftXError::IoError(e.into_error()))?;
        temp.seek(SeekFrom::Start(0))?;
        temp.write_all(&layout.header(data_len))?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| ShiftXError::mux(format!("Failed to move output into {}: {}", self.path.display(), e.error)))?;

        if self.padded > 0 {
            debug!("Padded {} frames of silence", self.padded);
        }
        if self.trimmed > 0 {
            warn!(
                "Dropped {} overlapping frames, packets arrived with overlapping timestamps",
                self.trimmed
            );
        }
        info!(
            "Wrote {} ({} frames, {:.3}s)",
            self.path.display(),
            self.frames,
            self.frames as f64 / layout.sample_rate as f64
        );
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(file) = self.file.take() {
            warn!("Discarding partial output for {}", self.path.display());
            // Dropping the temporary file removes it
            drop(file);
        }
    }
}
