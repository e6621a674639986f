//! Decode, schedule and re-encode one stream
//!
//! Audio goes through a resampler into a sample FIFO that feeds the encoder
//! with frames of its preferred size. Video goes through a scaler, frames
//! that would collide on the output time base are dropped.

use bytes::Bytes;
use tracing::{debug, trace};

use ffmpeg_next::{
    codec::{self, decoder, encoder},
    ffi,
    format::{Pixel, Sample},
    frame,
    software::{resampling, scaling},
    ChannelLayout, Dictionary,
};

use crate::adapters::libav::{open_input, rational_from, timebase_from};
use crate::domain::{
    AudioParams, Packet, Profile, StreamDescriptor, StreamInfo, StreamKind, StreamParams, Timebase, VideoParams,
};
use crate::engine::scheduler::OffsetScheduler;
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::StreamTransform;

/// Profile keys consumed here, everything else goes to the encoder as an option
const RESERVED_OPTIONS: &[&str] = &[
    "sample_rate",
    "channels",
    "sample_format",
    "width",
    "height",
    "frame_rate",
    "pixel_format",
    "bit_rate",
];

pub struct LibavTransform {
    chain: Chain,
    stream: StreamInfo,
}

enum Chain {
    Audio(AudioChain),
    Video(VideoChain),
}

impl LibavTransform {
    /// Open the decoder of the descriptor's stream and an encoder for `profile`
    ///
    /// `threads` is the decoder thread count.
    pub fn open(descriptor: &StreamDescriptor, profile: &Profile, threads: usize) -> ShiftXResult<Self> {
        if descriptor.channel().is_some() {
            return Err(ShiftXError::transform(format!(
                "channel extraction is only available for WAVE sources ({})",
                descriptor.label()
            )));
        }

        let input = open_input(descriptor.source())?;
        let source = input
            .stream(descriptor.stream_index())
            .ok_or_else(|| ShiftXError::transform(format!("{} not found", descriptor.label())))?;
        let in_time_base = timebase_from(source.time_base())?;
        let mut context = codec::context::Context::from_parameters(source.parameters())
            .map_err(|e| ShiftXError::transform(format!("cannot decode {}: {}", descriptor.label(), e)))?;
        context.set_threading(codec::threading::Config {
            kind: codec::threading::Type::Frame,
            count: threads,
            ..Default::default()
        });

        let codec = ffmpeg_next::encoder::find_by_name(&profile.codec)
            .ok_or_else(|| ShiftXError::transform(format!("encoder {} is not available", profile.codec)))?;
        let options = encoder_options(profile);

        let (chain, stream) = match descriptor.kind() {
            StreamKind::Audio => {
                let decoder = context.decoder().audio().map_err(transform_error)?;
                let chain = AudioChain::open(decoder, codec, profile, options, in_time_base)?;
                let stream = chain.stream_info()?;
                (Chain::Audio(chain), stream)
            }
            StreamKind::Video => {
                let decoder = context.decoder().video().map_err(transform_error)?;
                let chain = VideoChain::open(decoder, codec, profile, options, in_time_base, descriptor)?;
                let stream = chain.stream_info()?;
                (Chain::Video(chain), stream)
            }
            StreamKind::Data => {
                return Err(ShiftXError::transform(format!(
                    "{} is a data stream and cannot be transcoded",
                    descriptor.label()
                )))
            }
        };
        debug!("Transcoding {} into {}", descriptor.label(), stream.describe());
        Ok(Self { chain, stream })
    }
}

impl StreamTransform for LibavTransform {
    fn output_stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn fill(&mut self, from: i64, until: i64) -> ShiftXResult<Vec<Packet>> {
        let raw = match &mut self.chain {
            Chain::Audio(chain) => chain.fill(from, until)?,
            Chain::Video(chain) => chain.fill(from, until)?,
        };
        Ok(self.wrap(raw))
    }

    fn transform(&mut self, packet: &Packet, scheduler: &OffsetScheduler) -> ShiftXResult<Vec<Packet>> {
        let mut raw = ffmpeg_next::Packet::copy(&packet.payload);
        raw.set_pts(Some(packet.pts));
        raw.set_dts(Some(packet.dts));
        raw.set_duration(packet.duration);

        let out = match &mut self.chain {
            Chain::Audio(chain) => chain.push(Some(&raw), scheduler)?,
            Chain::Video(chain) => chain.push(Some(&raw), scheduler)?,
        };
        Ok(self.wrap(out))
    }

    fn flush(&mut self, scheduler: &OffsetScheduler) -> ShiftXResult<Vec<Packet>> {
        let out = match &mut self.chain {
            Chain::Audio(chain) => {
                let mut out = chain.push(None, scheduler)?;
                out.extend(chain.finish()?);
                out
            }
            Chain::Video(chain) => {
                let mut out = chain.push(None, scheduler)?;
                out.extend(chain.finish()?);
                out
            }
        };
        Ok(self.wrap(out))
    }
}

impl LibavTransform {
    fn wrap(&self, raw: Vec<ffmpeg_next::Packet>) -> Vec<Packet> {
        let kind = self.stream.kind();
        raw.into_iter()
            .map(|encoded| {
                let pts = encoded.pts().or(encoded.dts()).unwrap_or(0);
                let mut packet = Packet::new(
                    kind,
                    Bytes::copy_from_slice(encoded.data().unwrap_or_default()),
                    pts,
                    encoded.duration(),
                    self.stream.time_base,
                );
                packet.dts = encoded.dts().unwrap_or(pts);
                packet.keyframe = encoded.is_key();
                packet
            })
            .collect()
    }
}

fn transform_error(e: ffmpeg_next::Error) -> ShiftXError {
    ShiftXError::transform(e.to_string())
}

fn is_again(e: &ffmpeg_next::Error) -> bool {
    matches!(e, ffmpeg_next::Error::Other { errno } if *errno == ffi::EAGAIN)
}

fn encoder_options(profile: &Profile) -> Dictionary<'static> {
    let mut options = Dictionary::new();
    for (key, value) in &profile.options {
        if !RESERVED_OPTIONS.contains(&key.as_str()) {
            options.set(key, value);
        }
    }
    options
}

fn encoder_extradata(ctx: *const ffi::AVCodecContext) -> Option<Bytes> {
    // SAFETY: the caller passes a pointer to an opened encoder context
    unsafe {
        if (*ctx).extradata_size > 0 && !(*ctx).extradata.is_null() {
            let slice = std::slice::from_raw_parts((*ctx).extradata, (*ctx).extradata_size as usize);
            Some(Bytes::copy_from_slice(slice))
        } else {
            None
        }
    }
}

fn encoder_bit_rate(ctx: *const ffi::AVCodecContext) -> Option<u64> {
    // SAFETY: the caller passes a pointer to an opened encoder context
    let rate = unsafe { (*ctx).bit_rate };
    (rate > 0).then_some(rate as u64)
}

/// Send `packet` (or end of stream) and collect every decoded frame
fn decode_all<F: std::ops::DerefMut<Target = frame::Frame>>(
    decoder: &mut decoder::Opened,
    packet: Option<&ffmpeg_next::Packet>,
    empty: fn() -> F,
) -> ShiftXResult<Vec<F>> {
    let mut frames = Vec::new();
    send_with_retry(
        decoder,
        |decoder| match packet {
            Some(packet) => decoder.send_packet(packet),
            None => decoder.send_eof(),
        },
        |decoder, frames: &mut Vec<F>| receive_frames(decoder, empty, frames),
        &mut frames,
    )?;
    Ok(frames)
}

/// Submit with `send`, draining with `receive` and sending again when the codec is full
///
/// A submission refused twice is an error, the input would be lost otherwise.
fn send_with_retry<C, T>(
    codec: &mut C,
    mut send: impl FnMut(&mut C) -> Result<(), ffmpeg_next::Error>,
    mut receive: impl FnMut(&mut C, &mut Vec<T>) -> ShiftXResult<()>,
    out: &mut Vec<T>,
) -> ShiftXResult<()> {
    match send(codec) {
        Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
        Err(e) if is_again(&e) => {
            trace!("Decoder full, draining before sending again");
            receive(codec, out)?;
            match send(codec) {
                Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
                Err(e) => {
                    return Err(ShiftXError::transform(format!(
                        "decoder refused a packet after draining: {}",
                        e
                    )))
                }
            }
        }
        Err(e) => return Err(transform_error(e)),
    }
    receive(codec, out)
}

/// Collect every frame the decoder has ready
fn receive_frames<F: std::ops::DerefMut<Target = frame::Frame>>(
    decoder: &mut decoder::Opened,
    empty: fn() -> F,
    frames: &mut Vec<F>,
) -> ShiftXResult<()> {
    loop {
        let mut decoded = empty();
        match decoder.receive_frame(&mut *decoded) {
            Ok(()) => frames.push(decoded),
            Err(ffmpeg_next::Error::Eof) => break,
            Err(e) if is_again(&e) => break,
            Err(e) => return Err(transform_error(e)),
        }
    }
    Ok(())
}

/// Collect every packet the encoder has ready
fn receive_packets(encoder: &mut encoder::Encoder) -> ShiftXResult<Vec<ffmpeg_next::Packet>> {
    let mut packets = Vec::new();
    loop {
        let mut encoded = ffmpeg_next::Packet::empty();
        match encoder.receive_packet(&mut encoded) {
            Ok(()) => packets.push(encoded),
            Err(ffmpeg_next::Error::Eof) => break,
            Err(e) if is_again(&e) => break,
            Err(e) => return Err(transform_error(e)),
        }
    }
    Ok(packets)
}

/// Interleaved or planar samples waiting for a full encoder frame
struct SampleFifo {
    planes: Vec<Vec<u8>>,
    unit: usize,
    silence: u8,
}

impl SampleFifo {
    fn new(format: Sample, channels: usize) -> Self {
        let (planes, unit) = if format.is_planar() {
            (channels, format.bytes())
        } else {
            (1, format.bytes() * channels)
        };
        Self {
            planes: vec![Vec::new(); planes],
            unit,
            silence: if matches!(format, Sample::U8(_)) { 0x80 } else { 0 },
        }
    }

    fn len(&self) -> usize {
        self.planes[0].len() / self.unit
    }

    fn push_frame(&mut self, source: &frame::Audio, skip: usize) {
        let samples = source.samples();
        if skip >= samples {
            return;
        }
        for (index, plane) in self.planes.iter_mut().enumerate() {
            // SAFETY: audio planes all share linesize[0] and hold `samples` units
            let data = unsafe {
                let ptr = (*source.as_ptr()).data[index];
                std::slice::from_raw_parts(ptr, samples * self.unit)
            };
            plane.extend_from_slice(&data[skip * self.unit..]);
        }
    }

    fn push_silence(&mut self, samples: usize) {
        for plane in &mut self.planes {
            plane.resize(plane.len() + samples * self.unit, self.silence);
        }
    }

    fn pop_into(&mut self, target: &mut frame::Audio, samples: usize) {
        let bytes = samples * self.unit;
        for (index, plane) in self.planes.iter_mut().enumerate() {
            let taken: Vec<u8> = plane.drain(..bytes).collect();
            target.data_mut(index)[..bytes].copy_from_slice(&taken);
        }
    }
}

struct AudioChain {
    decoder: decoder::Audio,
    encoder: encoder::Audio,
    resampler: Option<resampling::Context>,
    in_time_base: Timebase,
    out_format: Sample,
    out_layout: ChannelLayout,
    out_rate: u32,
    frame_size: usize,
    fifo: SampleFifo,
    next_pts: Option<i64>,
    position: i64,
}

// SAFETY: the chain is owned by a single pipeline and never shared between threads
unsafe impl Send for AudioChain {}

impl AudioChain {
    fn open(
        decoder: decoder::Audio,
        codec: ffmpeg_next::Codec,
        profile: &Profile,
        options: Dictionary<'static>,
        in_time_base: Timebase,
    ) -> ShiftXResult<Self> {
        let out_rate = profile.sample_rate()?.unwrap_or(decoder.rate());
        let channels = profile.channels()?.map_or(decoder.channels() as i32, i32::from);
        let out_layout = ChannelLayout::default(channels);
        let out_format = match profile.get("sample_format") {
            Some(name) => Sample::from(name),
            None => codec
                .audio()
                .ok()
                .and_then(|audio| audio.formats())
                .and_then(|mut formats| formats.next())
                .unwrap_or(decoder.format()),
        };

        let mut setup = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(transform_error)?;
        setup.set_rate(out_rate as i32);
        setup.set_channel_layout(out_layout);
        setup.set_format(out_format);
        setup.set_time_base(ffmpeg_next::Rational::new(1, out_rate as i32));
        if let Some(bit_rate) = profile.bit_rate()? {
            setup.set_bit_rate(bit_rate as usize);
        }
        setup.set_flags(codec::Flags::GLOBAL_HEADER);
        let encoder = setup
            .open_with(options)
            .map_err(|e| ShiftXError::transform(format!("failed to open {} encoder: {}", profile.codec, e)))?;

        let frame_size = match encoder.frame_size() {
            0 => 1024,
            size => size as usize,
        };

        Ok(Self {
            decoder,
            encoder,
            resampler: None,
            in_time_base,
            out_format,
            out_layout,
            out_rate,
            frame_size,
            fifo: SampleFifo::new(out_format, channels.max(1) as usize),
            next_pts: None,
            position: 0,
        })
    }

    fn output_time_base(&self) -> ShiftXResult<Timebase> {
        Timebase::from_rate(self.out_rate)
    }

    fn stream_info(&self) -> ShiftXResult<StreamInfo> {
        let mut info = StreamInfo::new(
            0,
            self.encoder.codec().map(|c| c.id().name()).unwrap_or("unknown"),
            self.output_time_base()?,
            StreamParams::Audio(AudioParams {
                sample_rate: self.out_rate,
                channels: self.out_layout.channels() as u16,
                sample_format: self.out_format.name().to_string(),
            }),
        )?;
        info.bit_rate = encoder_bit_rate(self.encoder.as_ptr());
        info.extradata = encoder_extradata(self.encoder.as_ptr());
        Ok(info)
    }

    fn push(
        &mut self,
        packet: Option<&ffmpeg_next::Packet>,
        scheduler: &OffsetScheduler,
    ) -> ShiftXResult<Vec<ffmpeg_next::Packet>> {
        let frames: Vec<frame::Audio> = decode_all(&mut self.decoder, packet, frame::Audio::empty)?;
        let out_tb = self.output_time_base()?;

        for decoded in frames {
            let in_rate = decoded.rate();
            let sample_tb = Timebase::from_rate(in_rate)?;
            let start = decoded
                .timestamp()
                .or(decoded.pts())
                .map(|pts| self.in_time_base.rescale(pts, sample_tb))
                .unwrap_or(self.position);
            let count = decoded.samples() as i64;
            self.position = start + count;

            let Some(span) = scheduler.rebased(sample_tb).trim_span(start, count) else {
                trace!("Dropping {} samples before the output start", count);
                continue;
            };

            let converted = self.resample(&decoded)?;
            let skip = sample_tb.rescale(span.skip, out_tb).max(0) as usize;
            if self.next_pts.is_none() {
                self.next_pts = Some(sample_tb.rescale(span.start, out_tb));
            }
            self.fifo.push_frame(&converted, skip);
        }

        self.drain(false)
    }

    fn resample(&mut self, decoded: &frame::Audio) -> ShiftXResult<frame::Audio> {
        if self.resampler.is_none() {
            self.resampler = Some(
                resampling::Context::get(
                    decoded.format(),
                    decoded.channel_layout(),
                    decoded.rate(),
                    self.out_format,
                    self.out_layout,
                    self.out_rate,
                )
                .map_err(|e| ShiftXError::transform(format!("failed to create resampler: {}", e)))?,
            );
        }
        let capacity = decoded.samples() as u64 * self.out_rate as u64 / decoded.rate().max(1) as u64 + 64;
        let mut converted = frame::Audio::new(self.out_format, capacity as usize, self.out_layout);
        converted.set_rate(self.out_rate);
        if let Some(resampler) = self.resampler.as_mut() {
            resampler
                .run(decoded, &mut converted)
                .map_err(|e| ShiftXError::transform(format!("resampling failed: {}", e)))?;
        }
        Ok(converted)
    }

    fn fill(&mut self, from: i64, until: i64) -> ShiftXResult<Vec<ffmpeg_next::Packet>> {
        if until <= from {
            return Ok(Vec::new());
        }
        self.next_pts.get_or_insert(from);
        self.fifo.push_silence((until - from) as usize);
        self.drain(false)
    }

    /// Encode whole frames from the FIFO, and the remainder when `all`
    fn drain(&mut self, all: bool) -> ShiftXResult<Vec<ffmpeg_next::Packet>> {
        let mut packets = Vec::new();
        while self.fifo.len() >= self.frame_size || (all && self.fifo.len() > 0) {
            let samples = self.fifo.len().min(self.frame_size);
            let mut chunk = frame::Audio::new(self.out_format, samples, self.out_layout);
            chunk.set_rate(self.out_rate);
            self.fifo.pop_into(&mut chunk, samples);

            let pts = self.next_pts.unwrap_or(0);
            chunk.set_pts(Some(pts));
            self.next_pts = Some(pts + samples as i64);

            self.encoder.send_frame(&chunk).map_err(transform_error)?;
            packets.extend(receive_packets(&mut self.encoder)?);
        }
        Ok(packets)
    }

    fn finish(&mut self) -> ShiftXResult<Vec<ffmpeg_next::Packet>> {
        let mut packets = self.drain(true)?;
        match self.encoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(e) => return Err(transform_error(e)),
        }
        packets.extend(receive_packets(&mut self.encoder)?);
        Ok(packets)
    }
}

struct VideoChain {
    decoder: decoder::Video,
    encoder: encoder::Video,
    scaler: Option<scaling::Context>,
    in_time_base: Timebase,
    out_time_base: Timebase,
    out_format: Pixel,
    width: u32,
    height: u32,
    frame_rate: f64,
    last_pts: Option<i64>,
}

// SAFETY: the chain is owned by a single pipeline and never shared between threads
unsafe impl Send for VideoChain {}

impl VideoChain {
    fn open(
        decoder: decoder::Video,
        codec: ffmpeg_next::Codec,
        profile: &Profile,
        options: Dictionary<'static>,
        in_time_base: Timebase,
        descriptor: &StreamDescriptor,
    ) -> ShiftXResult<Self> {
        let source = descriptor.stream_info().video();
        let width = profile.width()?.unwrap_or(decoder.width());
        let height = profile.height()?.unwrap_or(decoder.height());
        let frame_rate = profile
            .frame_rate()?
            .or_else(|| source.map(|v| v.frame_rate).filter(|rate| *rate > 0.0))
            .unwrap_or(25.0);
        let out_format = match profile.pixel_format() {
            Some(name) => name
                .parse::<Pixel>()
                .map_err(|_| ShiftXError::transform(format!("unknown pixel format {}", name)))?,
            None => codec
                .video()
                .ok()
                .and_then(|video| video.formats())
                .and_then(|mut formats| formats.next())
                .unwrap_or(Pixel::YUV420P),
        };

        // SAFETY: av_d2q is a pure conversion
        let rate = unsafe { ffi::av_d2q(frame_rate, 100_000) };
        let rate = ffmpeg_next::Rational::new(rate.num, rate.den);
        let out_time_base = Timebase::new(rate.denominator(), rate.numerator())?;

        let mut setup = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(transform_error)?;
        setup.set_width(width);
        setup.set_height(height);
        setup.set_format(out_format);
        setup.set_frame_rate(Some(rate));
        setup.set_time_base(rational_from(out_time_base));
        if let Some(bit_rate) = profile.bit_rate()? {
            setup.set_bit_rate(bit_rate as usize);
        }
        setup.set_flags(codec::Flags::GLOBAL_HEADER);
        let encoder = setup
            .open_with(options)
            .map_err(|e| ShiftXError::transform(format!("failed to open {} encoder: {}", profile.codec, e)))?;

        Ok(Self {
            decoder,
            encoder,
            scaler: None,
            in_time_base,
            out_time_base,
            out_format,
            width,
            height,
            frame_rate,
            last_pts: None,
        })
    }

    fn stream_info(&self) -> ShiftXResult<StreamInfo> {
        let mut info = StreamInfo::new(
            0,
            self.encoder.codec().map(|c| c.id().name()).unwrap_or("unknown"),
            self.out_time_base,
            StreamParams::Video(VideoParams {
                width: self.width,
                height: self.height,
                frame_rate: self.frame_rate,
                pixel_format: self
                    .out_format
                    .descriptor()
                    .map(|d| d.name().to_string())
                    .unwrap_or_else(|| "none".to_string()),
            }),
        )?;
        info.bit_rate = encoder_bit_rate(self.encoder.as_ptr());
        // SAFETY: reading a field of the opened encoder context
        info.reorders = unsafe { (*self.encoder.as_ptr()).max_b_frames > 0 };
        info.extradata = encoder_extradata(self.encoder.as_ptr());
        Ok(info)
    }

    fn push(
        &mut self,
        packet: Option<&ffmpeg_next::Packet>,
        scheduler: &OffsetScheduler,
    ) -> ShiftXResult<Vec<ffmpeg_next::Packet>> {
        let frames: Vec<frame::Video> = decode_all(&mut self.decoder, packet, frame::Video::empty)?;
        let mut packets = Vec::new();

        for decoded in frames {
            let Some(pts) = decoded.timestamp().or(decoded.pts()) else {
                continue;
            };
            let Some(shifted) = scheduler.schedule(pts) else {
                continue;
            };
            let out_pts = self.in_time_base.rescale(shifted, self.out_time_base);
            if self.last_pts.map_or(false, |last| out_pts <= last) {
                trace!("Dropping frame colliding at output tick {}", out_pts);
                continue;
            }

            let mut scaled = self.scale(&decoded)?;
            scaled.set_pts(Some(out_pts));
            self.last_pts = Some(out_pts);
            self.encoder.send_frame(&scaled).map_err(transform_error)?;
            packets.extend(receive_packets(&mut self.encoder)?);
        }
        Ok(packets)
    }

    fn scale(&mut self, decoded: &frame::Video) -> ShiftXResult<frame::Video> {
        if self.scaler.is_none() {
            self.scaler = Some(
                scaling::Context::get(
                    decoded.format(),
                    decoded.width(),
                    decoded.height(),
                    self.out_format,
                    self.width,
                    self.height,
                    scaling::flag::Flags::BILINEAR,
                )
                .map_err(|e| ShiftXError::transform(format!("failed to create scaler: {}", e)))?,
            );
        }
        let mut scaled = frame::Video::new(self.out_format, self.width, self.height);
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .run(decoded, &mut scaled)
                .map_err(|e| ShiftXError::transform(format!("scaling failed: {}", e)))?;
        }
        Ok(scaled)
    }

    /// One black frame per output tick in `[from, until)`
    fn fill(&mut self, from: i64, until: i64) -> ShiftXResult<Vec<ffmpeg_next::Packet>> {
        let mut black = frame::Video::new(self.out_format, self.width, self.height);
        for plane in 0..black.planes() {
            let value = if plane == 0 { 16 } else { 128 };
            black.data_mut(plane).fill(value);
        }

        let mut packets = Vec::new();
        for pts in from..until {
            black.set_pts(Some(pts));
            self.encoder.send_frame(&black).map_err(transform_error)?;
            packets.extend(receive_packets(&mut self.encoder)?);
            self.last_pts = Some(pts);
        }
        Ok(packets)
    }

    fn finish(&mut self) -> ShiftXResult<Vec<ffmpeg_next::Packet>> {
        match self.encoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(e) => return Err(transform_error(e)),
        }
        receive_packets(&mut self.encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Codec that holds one item and refuses input while it is full
    #[derive(Default)]
    struct OneSlotCodec {
        held: Option<u32>,
        accepted: Vec<u32>,
        stuck: bool,
    }

    impl OneSlotCodec {
        fn send(&mut self, item: u32) -> Result<(), ffmpeg_next::Error> {
            if self.held.is_some() {
                return Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN });
            }
            self.held = Some(item);
            self.accepted.push(item);
            Ok(())
        }

        fn receive(&mut self, out: &mut Vec<u32>) -> ShiftXResult<()> {
            if !self.stuck {
                out.extend(self.held.take());
            }
            Ok(())
        }
    }

    #[test]
    fn test_full_decoder_gets_packet_again_after_draining() {
        let mut codec = OneSlotCodec {
            held: Some(1),
            ..Default::default()
        };
        let mut out = Vec::new();

        send_with_retry(&mut codec, |c| c.send(2), |c, out| c.receive(out), &mut out).unwrap();

        assert_eq!(codec.accepted, vec![2]);
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn test_packet_refused_twice_is_an_error() {
        let mut codec = OneSlotCodec {
            held: Some(1),
            stuck: true,
            ..Default::default()
        };
        let mut out = Vec::new();

        let result = send_with_retry(&mut codec, |c| c.send(2), |c, out| c.receive(out), &mut out);

        assert!(matches!(result, Err(ShiftXError::TransformError { .. })));
        assert!(codec.accepted.is_empty());
    }
}
