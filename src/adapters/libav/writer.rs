//! Container muxer
//!
//! The container is written to a temporary file next to the destination and
//! moved in place by the trailer.

use std::ffi::CString;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

use ffmpeg_next::{ffi, format::context::Output as OutputContext};

use crate::adapters::libav::{codec_id, rational_from};
use crate::domain::{Packet, StreamInfo, StreamParams, Timebase};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::ContainerWriter;
use crate::utils::path::extension_of;

pub struct LibavWriter {
    path: PathBuf,
    temp: Option<TempPath>,
    output: Option<OutputContext>,
    declared: Vec<Timebase>,
    header_written: bool,
}

impl LibavWriter {
    pub fn create(path: &Path) -> ShiftXResult<Self> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let suffix = extension_of(path)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(".shiftx-")
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(|e| ShiftXError::mux(format!("Failed to create temp file in {}: {}", dir.display(), e)))?
            .into_temp_path();

        // Container format follows the destination name, not the temp name
        let format = format_name(path)?;
        let output = ffmpeg_next::format::output_as(&temp.to_path_buf(), &format)
            .map_err(|e| ShiftXError::mux(format!("Failed to create {}: {}", path.display(), e)))?;
        debug!("Muxing {} as {} through {}", path.display(), format, temp.display());

        Ok(Self {
            path: path.to_path_buf(),
            temp: Some(temp),
            output: Some(output),
            declared: Vec::new(),
            header_written: false,
        })
    }

    fn output(&mut self) -> ShiftXResult<&mut OutputContext> {
        self.output
            .as_mut()
            .ok_or_else(|| ShiftXError::mux("output already closed"))
    }
}

fn format_name(path: &Path) -> ShiftXResult<String> {
    let c_path = CString::new(path.to_string_lossy().as_bytes())
        .map_err(|_| ShiftXError::mux(format!("invalid output path {}", path.display())))?;
    // SAFETY: guessing only reads the NUL terminated file name
    let format = unsafe { ffi::av_guess_format(std::ptr::null(), c_path.as_ptr(), std::ptr::null()) };
    if format.is_null() {
        return Err(ShiftXError::mux(format!(
            "no container format for {}",
            path.display()
        )));
    }
    // SAFETY: output formats are static and their names NUL terminated
    let name = unsafe { std::ffi::CStr::from_ptr((*format).name) };
    Ok(name.to_string_lossy().into_owned())
}

impl ContainerWriter for LibavWriter {
    fn add_stream(&mut self, stream: &StreamInfo) -> ShiftXResult<usize> {
        let id = codec_id(&stream.codec)?;
        let output = self.output()?;
        let mut target = output.add_stream(ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::None))?;
        target.set_time_base(rational_from(stream.time_base));

        // SAFETY: the stream was just created and owns its parameters
        unsafe {
            let ptr = (*target.as_mut_ptr()).codecpar;
            (*ptr).codec_id = id;
            (*ptr).codec_tag = 0;
            if let Some(bit_rate) = stream.bit_rate {
                (*ptr).bit_rate = bit_rate as i64;
            }

            match &stream.params {
                StreamParams::Audio(audio) => {
                    (*ptr).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
                    (*ptr).sample_rate = audio.sample_rate as i32;
                    ffi::av_channel_layout_default(&mut (*ptr).ch_layout, audio.channels as i32);
                    let name = CString::new(audio.sample_format.as_str()).unwrap_or_default();
                    (*ptr).format = ffi::av_get_sample_fmt(name.as_ptr()) as i32;
                }
                StreamParams::Video(video) => {
                    (*ptr).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
                    (*ptr).width = video.width as i32;
                    (*ptr).height = video.height as i32;
                    let name = CString::new(video.pixel_format.as_str()).unwrap_or_default();
                    (*ptr).format = ffi::av_get_pix_fmt(name.as_ptr()) as i32;
                    if video.frame_rate > 0.0 {
                        (*target.as_mut_ptr()).avg_frame_rate = ffi::av_d2q(video.frame_rate, 100_000);
                    }
                }
                StreamParams::Data => {
                    (*ptr).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_DATA;
                }
            }

            if let Some(extradata) = stream.extradata.as_ref().filter(|e| !e.is_empty()) {
                let size = extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
                let buf = ffi::av_mallocz(size) as *mut u8;
                if !buf.is_null() {
                    std::ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
                    (*ptr).extradata = buf;
                    (*ptr).extradata_size = extradata.len() as i32;
                }
            }
        }

        let index = target.index();
        self.declared.push(stream.time_base);
        Ok(index)
    }

    fn write_header(&mut self) -> ShiftXResult<()> {
        self.output()?
            .write_header()
            .map_err(|e| ShiftXError::mux(format!("Failed to write header: {}", e)))?;
        self.header_written = true;
        Ok(())
    }

    fn write_packet(&mut self, stream: usize, packet: &Packet) -> ShiftXResult<()> {
        let declared = *self
            .declared
            .get(stream)
            .ok_or_else(|| ShiftXError::mux(format!("unknown output stream {}", stream)))?;
        let output = self.output()?;
        let actual = output
            .stream(stream)
            .map(|s| s.time_base())
            .ok_or_else(|| ShiftXError::mux(format!("unknown output stream {}", stream)))?;

        let mut raw = if packet.payload.is_empty() {
            ffmpeg_next::Packet::empty()
        } else {
            ffmpeg_next::Packet::copy(&packet.payload)
        };
        raw.set_stream(stream);
        raw.set_pts(Some(packet.pts));
        raw.set_dts(Some(packet.dts));
        raw.set_duration(packet.duration);
        if packet.keyframe {
            raw.set_flags(ffmpeg_next::packet::Flags::KEY);
        }
        raw.rescale_ts(rational_from(declared), actual);

        raw.write_interleaved(output)
            .map_err(|e| ShiftXError::mux(format!("Failed to write packet: {}", e)))
    }

    fn write_trailer(&mut self) -> ShiftXResult<()> {
        let mut output = self
            .output
            .take()
            .ok_or_else(|| ShiftXError::mux("output already closed"))?;
        output
            .write_trailer()
            .map_err(|e| ShiftXError::mux(format!("Failed to write trailer: {}", e)))?;
        drop(output);

        if let Some(temp) = self.temp.take() {
            temp.persist(&self.path).map_err(|e| {
                ShiftXError::mux(format!("Failed to move output into {}: {}", self.path.display(), e.error))
            })?;
        }
        info!("Wrote {}", self.path.display());
        Ok(())
    }

    fn abort(&mut self) {
        // Close the container before its file is removed
        self.output = None;
        if self.temp.take().is_some() {
            warn!("Discarded partial output for {}", self.path.display());
        }
    }
}
