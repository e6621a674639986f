// Domain models - Streams, packets and time bases

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ShiftXError, ShiftXResult};


/// Timebase for timestamp calculations - seconds per tick as a rational number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timebase {
    pub num: i32,
    pub den: i32,
}

impl Timebase {
    /// Create a new timebase
    pub fn new(num: i32, den: i32) -> ShiftXResult<Self> {
        if den <= 0 || num <= 0 {
            return Err(ShiftXError::config(format!(
                "Timebase {}/{} must be positive",
                num, den
            )));
        }
        Ok(Self { num, den })
    }

    /// One tick per sample at `rate` Hz
    pub fn from_rate(rate: u32) -> ShiftXResult<Self> {
        let den = i32::try_from(rate)
            .map_err(|_| ShiftXError::config(format!("Sample rate {} is out of range", rate)))?;
        Self::new(1, den)
    }

    /// Convert to floating point seconds
    pub fn to_seconds(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Rescale a timestamp into `target`, rounding to the nearest tick
    pub fn rescale(&self, ts: i64, target: Timebase) -> i64 {
        if *self == target {
            return ts;
        }

        let n = ts as i128 * self.num as i128 * target.den as i128;
        let d = self.den as i128 * target.num as i128;
        if d == 0 {
            return ts;
        }
        let half = d / 2;
        let rounded = if n >= 0 { (n + half) / d } else { (n - half) / d };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Convert PTS to seconds
    pub fn pts_to_seconds(&self, pts: i64) -> f64 {
        pts as f64 * self.to_seconds()
    }

    /// Convert seconds to PTS
    pub fn seconds_to_pts(&self, seconds: f64) -> i64 {
        (seconds * self.den as f64 / self.num as f64).round() as i64
    }

    /// Microsecond timebase used by container level durations
    pub fn av_time_base() -> Self {
        Self {
            num: 1,
            den: 1_000_000,
        }
    }
}

impl fmt::Display for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Media type of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Data,
}

impl StreamKind {
    /// Parse a stream kind name
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "video" => Some(StreamKind::Video),
            "audio" => Some(StreamKind::Audio),
            "data" => Some(StreamKind::Data),
            _ => None,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Data => "data",
        };
        f.write_str(name)
    }
}

/// Interleaved little-endian PCM sample layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S24,
    S32,
    F32,
}

impl SampleFormat {
    /// Bytes used by one sample of one channel
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S24 => 3,
            SampleFormat::S32 | SampleFormat::F32 => 4,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleFormat::F32)
    }

    /// Short sample format name, as found in [`AudioParams::sample_format`]
    pub fn name(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S24 => "s24",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "f32",
        }
    }

    /// Codec name of the matching PCM codec
    pub fn codec_name(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "pcm_u8",
            SampleFormat::S16 => "pcm_s16le",
            SampleFormat::S24 => "pcm_s24le",
            SampleFormat::S32 => "pcm_s32le",
            SampleFormat::F32 => "pcm_f32le",
        }
    }

    /// Resolve a PCM codec name
    pub fn from_codec_name(name: &str) -> Option<Self> {
        match name {
            "pcm_u8" => Some(SampleFormat::U8),
            "pcm_s16le" => Some(SampleFormat::S16),
            "pcm_s24le" => Some(SampleFormat::S24),
            "pcm_s32le" => Some(SampleFormat::S32),
            "pcm_f32le" => Some(SampleFormat::F32),
            _ => None,
        }
    }
}

/// Audio specific codec parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub channels: u16,
    /// Codec level sample format name (e.g. "s16", "fltp")
    pub sample_format: String,
}

/// Video specific codec parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub pixel_format: String,
}

/// Kind specific codec parameters of a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamParams {
    Video(VideoParams),
    Audio(AudioParams),
    Data,
}

/// Stream information, used both for probed inputs and declared output slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    pub codec: String,
    pub time_base: Timebase,
    pub params: StreamParams,
    /// Duration in seconds, when the container knows it
    pub duration: Option<f64>,
    pub bit_rate: Option<u64>,
    /// Presentation order differs from decode order (B-frames)
    pub reorders: bool,
    #[serde(skip)]
    pub extradata: Option<Bytes>,
}

impl StreamInfo {
    /// Create new stream info with validation
    pub fn new(
        index: usize,
        codec: impl Into<String>,
        time_base: Timebase,
        params: StreamParams,
    ) -> ShiftXResult<Self> {
        match &params {
            StreamParams::Audio(audio) if audio.sample_rate == 0 || audio.channels == 0 => {
                return Err(ShiftXError::ProbeError {
                    message: format!("Audio stream {} has no sample rate or channels", index),
                });
            }
            StreamParams::Video(video) if video.width == 0 || video.height == 0 => {
                return Err(ShiftXError::ProbeError {
                    message: format!("Video stream {} has zero dimensions", index),
                });
            }
            _ => {}
        }

        Ok(Self {
            index,
            codec: codec.into(),
            time_base,
            params,
            duration: None,
            bit_rate: None,
            reorders: false,
            extradata: None,
        })
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn kind(&self) -> StreamKind {
        match self.params {
            StreamParams::Video(_) => StreamKind::Video,
            StreamParams::Audio(_) => StreamKind::Audio,
            StreamParams::Data => StreamKind::Data,
        }
    }

    pub fn audio(&self) -> Option<&AudioParams> {
        match &self.params {
            StreamParams::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoParams> {
        match &self.params {
            StreamParams::Video(video) => Some(video),
            _ => None,
        }
    }

    /// Two slots can be fed by either stream when codec and parameters agree
    pub fn is_compatible_with(&self, other: &StreamInfo) -> bool {
        self.codec == other.codec && self.time_base == other.time_base && self.params == other.params
    }

    /// One line description for logs and summaries
    pub fn describe(&self) -> String {
        match &self.params {
            StreamParams::Audio(a) => format!(
                "{} {} Hz {}ch {}",
                self.codec, a.sample_rate, a.channels, a.sample_format
            ),
            StreamParams::Video(v) => format!(
                "{} {}x{} {:.3} fps {}",
                self.codec, v.width, v.height, v.frame_rate, v.pixel_format
            ),
            StreamParams::Data => format!("{} data", self.codec),
        }
    }
}

/// Complete media file information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub format: String,
    pub duration: Option<f64>,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn new(path: impl AsRef<Path>, format: impl Into<String>, streams: Vec<StreamInfo>) -> Self {
        let duration = streams
            .iter()
            .filter_map(|s| s.duration)
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));
        Self {
            path: path.as_ref().to_path_buf(),
            format: format.into(),
            duration,
            streams,
        }
    }

    /// Stream at `index`, if present
    pub fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.index == index)
    }

    /// Count streams by kind (video, audio, data)
    pub fn stream_counts(&self) -> (usize, usize, usize) {
        self.streams
            .iter()
            .fold((0, 0, 0), |(v, a, d), s| match s.kind() {
                StreamKind::Video => (v + 1, a, d),
                StreamKind::Audio => (v, a + 1, d),
                StreamKind::Data => (v, a, d + 1),
            })
    }
}

/// A compressed (or raw PCM) unit of one stream
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: StreamKind,
    pub payload: Bytes,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub time_base: Timebase,
    pub keyframe: bool,
}

impl Packet {
    /// Packet whose decode and presentation timestamps coincide
    pub fn new(kind: StreamKind, payload: Bytes, pts: i64, duration: i64, time_base: Timebase) -> Self {
        Self {
            kind,
            payload,
            pts,
            dts: pts,
            duration,
            time_base,
            keyframe: true,
        }
    }

    /// Presentation end timestamp
    pub fn end(&self) -> i64 {
        self.pts.saturating_add(self.duration)
    }

    /// Copy of this packet moved by `delta` ticks on both timestamps
    pub fn shifted(&self, delta: i64) -> Self {
        Self {
            pts: self.pts.saturating_add(delta),
            dts: self.dts.saturating_add(delta),
            ..self.clone()
        }
    }

    /// Copy of this packet expressed in `target`
    pub fn rescaled(&self, target: Timebase) -> Self {
        if self.time_base == target {
            return self.clone();
        }
        Self {
            pts: self.time_base.rescale(self.pts, target),
            dts: self.time_base.rescale(self.dts, target),
            duration: self.time_base.rescale(self.duration, target),
            time_base: target,
            ..self.clone()
        }
    }
}
