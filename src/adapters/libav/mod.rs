//! FFmpeg backed media backend
//!
//! Probes, demuxes, transcodes and muxes every container and codec the linked
//! FFmpeg libraries know about.

mod source;
mod transform;
mod writer;

pub use source::LibavSource;
pub use transform::LibavTransform;
pub use writer::LibavWriter;

use bytes::Bytes;
use std::ffi::CString;
use std::path::Path;
use tracing::debug;

use ffmpeg_next::{ffi, format::context::Input as InputContext, media::Type};

use crate::domain::{
    AudioParams, MediaInfo, Profile, StreamDescriptor, StreamInfo, StreamParams, Timebase, VideoParams,
};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::{ContainerWriter, MediaBackend, PacketSource, StreamTransform};

/// Backend for everything FFmpeg can open
#[derive(Debug, Clone, Copy)]
pub struct LibavBackend {
    threads: usize,
}

impl LibavBackend {
    pub fn new() -> ShiftXResult<Self> {
        ffmpeg_next::init().map_err(|e| ShiftXError::CodecRegistryError {
            message: e.to_string(),
        })?;
        Ok(Self {
            threads: num_cpus::get(),
        })
    }

    /// Decoder thread count, at least one
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }
}

impl MediaBackend for LibavBackend {
    fn name(&self) -> &'static str {
        "libav"
    }

    fn handles(&self, _path: &Path) -> bool {
        true
    }

    fn probe(&self, path: &Path) -> ShiftXResult<MediaInfo> {
        let input = open_input(path)?;
        let streams = input
            .streams()
            .map(|stream| stream_info(&stream))
            .collect::<ShiftXResult<Vec<_>>>()?;
        debug!("Probed {}: {} streams", path.display(), streams.len());

        let mut media = MediaInfo::new(path, input.format().name(), streams);
        if media.duration.is_none() && input.duration() > 0 {
            media.duration = Some(input.duration() as f64 / ffi::AV_TIME_BASE as f64);
        }
        Ok(media)
    }

    fn open_source(&self, descriptor: &StreamDescriptor) -> ShiftXResult<Box<dyn PacketSource>> {
        Ok(Box::new(LibavSource::open(descriptor)?))
    }

    fn open_transform(
        &self,
        descriptor: &StreamDescriptor,
        profile: &Profile,
    ) -> ShiftXResult<Box<dyn StreamTransform>> {
        Ok(Box::new(LibavTransform::open(descriptor, profile, self.threads)?))
    }

    fn create_writer(&self, path: &Path) -> ShiftXResult<Box<dyn ContainerWriter>> {
        Ok(Box::new(LibavWriter::create(path)?))
    }
}

pub(crate) fn open_input(path: &Path) -> ShiftXResult<InputContext> {
    ffmpeg_next::format::input(&path).map_err(|e| ShiftXError::ProbeError {
        message: format!("{}: {}", path.display(), e),
    })
}

pub(crate) fn timebase_from(rational: ffmpeg_next::Rational) -> ShiftXResult<Timebase> {
    Timebase::new(rational.numerator(), rational.denominator())
}

pub(crate) fn rational_from(time_base: Timebase) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(time_base.num, time_base.den)
}

/// Codec id registered under `name`
pub(crate) fn codec_id(name: &str) -> ShiftXResult<ffi::AVCodecID> {
    let c_name = CString::new(name).map_err(|_| ShiftXError::mux(format!("invalid codec name {}", name)))?;
    // SAFETY: c_name is a valid NUL terminated string for the duration of the call
    let descriptor = unsafe { ffi::avcodec_descriptor_get_by_name(c_name.as_ptr()) };
    if descriptor.is_null() {
        return Err(ShiftXError::mux(format!("unknown codec {}", name)));
    }
    // SAFETY: checked for null above, descriptors are static
    Ok(unsafe { (*descriptor).id })
}

fn stream_info(stream: &ffmpeg_next::format::stream::Stream) -> ShiftXResult<StreamInfo> {
    let parameters = stream.parameters();
    let time_base = timebase_from(stream.time_base())?;
    let codec = parameters.id().name().to_string();

    let params = match parameters.medium() {
        Type::Audio => {
            let decoder = ffmpeg_next::codec::context::Context::from_parameters(parameters.clone())?
                .decoder()
                .audio()?;
            StreamParams::Audio(AudioParams {
                sample_rate: decoder.rate(),
                channels: decoder.channels() as u16,
                sample_format: decoder.format().name().to_string(),
            })
        }
        Type::Video => {
            let decoder = ffmpeg_next::codec::context::Context::from_parameters(parameters.clone())?
                .decoder()
                .video()?;
            let rate = stream.avg_frame_rate();
            let frame_rate = if rate.numerator() > 0 && rate.denominator() > 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            };
            StreamParams::Video(VideoParams {
                width: decoder.width(),
                height: decoder.height(),
                frame_rate,
                pixel_format: decoder
                    .format()
                    .descriptor()
                    .map(|d| d.name().to_string())
                    .unwrap_or_else(|| "none".to_string()),
            })
        }
        _ => StreamParams::Data,
    };

    let mut info = StreamInfo::new(stream.index(), codec, time_base, params)?;
    if stream.duration() > 0 {
        info.duration = Some(time_base.pts_to_seconds(stream.duration()));
    }

    // SAFETY: the parameters pointer stays valid while `stream` is borrowed
    unsafe {
        let ptr = parameters.as_ptr();
        if (*ptr).bit_rate > 0 {
            info.bit_rate = Some((*ptr).bit_rate as u64);
        }
        info.reorders = (*ptr).video_delay > 0;
        if (*ptr).extradata_size > 0 && !(*ptr).extradata.is_null() {
            let slice = std::slice::from_raw_parts((*ptr).extradata, (*ptr).extradata_size as usize);
            info.extradata = Some(Bytes::copy_from_slice(slice));
        }
    }
    Ok(info)
}
