//! PCM to PCM transform
//!
//! Samples are widened to left-justified `i32` between decode and encode, so
//! bit depth conversions that go back to the original depth are lossless.

use bytes::Bytes;

use crate::adapters::wav::reader::PACKET_FRAMES;
use crate::domain::{AudioParams, Packet, Profile, SampleFormat, StreamDescriptor, StreamInfo, StreamKind, StreamParams, Timebase};
use crate::engine::scheduler::OffsetScheduler;
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::StreamTransform;

/// How source channels become output channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelMap {
    Identity,
    /// One channel copied to every output channel
    Duplicate,
    /// All channels averaged into one
    Downmix,
}

/// Re-encodes PCM samples into another PCM layout
pub struct PcmTransform {
    input: SampleFormat,
    input_channels: usize,
    select: Option<usize>,
    output: SampleFormat,
    output_channels: usize,
    map: ChannelMap,
    time_base: Timebase,
    stream: StreamInfo,
}

impl PcmTransform {
    pub fn new(descriptor: &StreamDescriptor, profile: &Profile) -> ShiftXResult<Self> {
        let source = descriptor.stream_info();
        let input = SampleFormat::from_codec_name(&source.codec)
            .ok_or_else(|| ShiftXError::transform(format!("cannot decode {}", source.codec)))?;
        let audio = source
            .audio()
            .ok_or_else(|| ShiftXError::transform(format!("{} is not an audio stream", descriptor.label())))?;
        let output = profile.pcm_format().ok_or_else(|| {
            ShiftXError::transform(format!(
                "profile {} encodes {}, only PCM can be written here",
                profile.name, profile.codec
            ))
        })?;

        let sample_rate = profile.sample_rate()?.unwrap_or(audio.sample_rate);
        if sample_rate != audio.sample_rate {
            return Err(ShiftXError::transform(format!(
                "resampling {} Hz to {} Hz is not supported",
                audio.sample_rate, sample_rate
            )));
        }

        let source_channels = if descriptor.channel().is_some() {
            1
        } else {
            audio.channels as usize
        };
        let output_channels = profile.channels()?.map_or(source_channels, usize::from);
        let map = match (source_channels, output_channels) {
            (s, o) if s == o => ChannelMap::Identity,
            (1, _) => ChannelMap::Duplicate,
            (_, 1) => ChannelMap::Downmix,
            (s, o) => {
                return Err(ShiftXError::transform(format!(
                    "cannot map {} channels to {}",
                    s, o
                )))
            }
        };

        let time_base = source.time_base;
        let stream = StreamInfo::new(
            0,
            output.codec_name(),
            time_base,
            StreamParams::Audio(AudioParams {
                sample_rate,
                channels: output_channels as u16,
                sample_format: output.name().to_string(),
            }),
        )?;

        Ok(Self {
            input,
            input_channels: audio.channels as usize,
            select: descriptor.channel(),
            output,
            output_channels,
            map,
            time_base,
            stream,
        })
    }

    fn encode(&self, frames: &[Vec<i32>]) -> Bytes {
        let mut out = Vec::with_capacity(frames.len() * self.output_channels * self.output.bytes_per_sample());
        for frame in frames {
            match self.map {
                ChannelMap::Identity => frame.iter().for_each(|s| encode_sample(self.output, *s, &mut out)),
                ChannelMap::Duplicate => {
                    let sample = frame.first().copied().unwrap_or(0);
                    for _ in 0..self.output_channels {
                        encode_sample(self.output, sample, &mut out);
                    }
                }
                ChannelMap::Downmix => {
                    let sum: i64 = frame.iter().map(|s| *s as i64).sum();
                    let mean = sum / frame.len().max(1) as i64;
                    encode_sample(self.output, mean as i32, &mut out);
                }
            }
        }
        Bytes::from(out)
    }

    /// Decoded frames of `payload`, restricted to the selected channel
    fn decode(&self, payload: &[u8]) -> ShiftXResult<Vec<Vec<i32>>> {
        let width = self.input.bytes_per_sample();
        let block = width * self.input_channels;
        if payload.len() % block != 0 {
            return Err(ShiftXError::transform(format!(
                "{} bytes is not a whole number of {} byte frames",
                payload.len(),
                block
            )));
        }

        Ok(payload
            .chunks_exact(block)
            .map(|frame| {
                let samples = frame.chunks_exact(width).map(|raw| decode_sample(self.input, raw));
                match self.select {
                    Some(channel) => samples.skip(channel).take(1).collect(),
                    None => samples.collect(),
                }
            })
            .collect())
    }
}

impl StreamTransform for PcmTransform {
    fn output_stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn fill(&mut self, from: i64, until: i64) -> ShiftXResult<Vec<Packet>> {
        let silence = vec![0i32; if self.map == ChannelMap::Duplicate { 1 } else { self.output_channels }];
        let mut packets = Vec::new();
        let mut pts = from;
        while pts < until {
            let length = (until - pts).min(PACKET_FRAMES as i64);
            let frames = vec![silence.clone(); length as usize];
            packets.push(Packet::new(StreamKind::Audio, self.encode(&frames), pts, length, self.time_base));
            pts += length;
        }
        Ok(packets)
    }

    fn transform(&mut self, packet: &Packet, scheduler: &OffsetScheduler) -> ShiftXResult<Vec<Packet>> {
        let frames = self.decode(&packet.payload)?;
        let Some(span) = scheduler.trim_span(packet.pts, frames.len() as i64) else {
            return Ok(Vec::new());
        };

        let kept = &frames[span.skip as usize..(span.skip + span.length) as usize];
        Ok(vec![Packet::new(
            StreamKind::Audio,
            self.encode(kept),
            span.start,
            span.length,
            self.time_base,
        )])
    }

    fn flush(&mut self, _scheduler: &OffsetScheduler) -> ShiftXResult<Vec<Packet>> {
        Ok(Vec::new())
    }
}

fn decode_sample(format: SampleFormat, raw: &[u8]) -> i32 {
    match format {
        SampleFormat::U8 => (raw[0] as i32 - 128) << 24,
        SampleFormat::S16 => (i16::from_le_bytes([raw[0], raw[1]]) as i32) << 16,
        SampleFormat::S24 => i32::from_le_bytes([0, raw[0], raw[1], raw[2]]),
        SampleFormat::S32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
        SampleFormat::F32 => {
            let value = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64;
            (value.clamp(-1.0, 1.0) * i32::MAX as f64).round() as i32
        }
    }
}

fn encode_sample(format: SampleFormat, sample: i32, out: &mut Vec<u8>) {
    match format {
        SampleFormat::U8 => out.push(((sample >> 24) + 128) as u8),
        SampleFormat::S16 => out.extend_from_slice(&((sample >> 16) as i16).to_le_bytes()),
        SampleFormat::S24 => out.extend_from_slice(&sample.to_le_bytes()[1..4]),
        SampleFormat::S32 => out.extend_from_slice(&sample.to_le_bytes()),
        SampleFormat::F32 => out.extend_from_slice(&((sample as f64 / 2_147_483_648.0) as f32).to_le_bytes()),
    }
}
