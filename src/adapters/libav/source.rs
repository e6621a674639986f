//! Demuxer reading one stream of a container

use bytes::Bytes;
use tracing::debug;

use ffmpeg_next::format::context::Input as InputContext;

use crate::adapters::libav::{open_input, timebase_from};
use crate::domain::{Packet, StreamDescriptor, StreamKind, Timebase};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::PacketSource;

/// Packets of a single stream, other streams are skipped
pub struct LibavSource {
    label: String,
    input: InputContext,
    stream_index: usize,
    kind: StreamKind,
    time_base: Timebase,
    exhausted: bool,
}

impl LibavSource {
    pub fn open(descriptor: &StreamDescriptor) -> ShiftXResult<Self> {
        let input = open_input(descriptor.source())?;
        let stream = input
            .stream(descriptor.stream_index())
            .ok_or_else(|| ShiftXError::InvalidStreamReference {
                path: descriptor.source().display().to_string(),
                index: descriptor.stream_index(),
                reason: "stream disappeared since probing".to_string(),
            })?;
        let time_base = timebase_from(stream.time_base())?;
        debug!("Demuxing {} at {}", descriptor.label(), time_base);

        Ok(Self {
            label: descriptor.label(),
            stream_index: descriptor.stream_index(),
            kind: descriptor.kind(),
            time_base,
            input,
            exhausted: false,
        })
    }
}

impl PacketSource for LibavSource {
    fn read_next(&mut self) -> ShiftXResult<Option<Packet>> {
        if self.exhausted {
            return Err(ShiftXError::read(&self.label, "read past end of stream"));
        }

        loop {
            let mut raw = ffmpeg_next::Packet::empty();
            match raw.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(e) => return Err(ShiftXError::read(&self.label, e.to_string())),
            }
            if raw.stream() != self.stream_index {
                continue;
            }

            let pts = match (raw.pts(), raw.dts()) {
                (Some(pts), _) => pts,
                (None, Some(dts)) => dts,
                (None, None) => {
                    return Err(ShiftXError::read(&self.label, "packet without timestamp"));
                }
            };
            let mut packet = Packet::new(
                self.kind,
                Bytes::copy_from_slice(raw.data().unwrap_or_default()),
                pts,
                raw.duration(),
                self.time_base,
            );
            packet.dts = raw.dts().unwrap_or(pts);
            packet.keyframe = raw.is_key();
            return Ok(Some(packet));
        }
    }
}
