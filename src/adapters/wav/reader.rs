//! RIFF/WAVE parsing and packet source

use bytes::{Buf, Bytes};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::domain::{AudioParams, Packet, SampleFormat, StreamInfo, StreamKind, StreamParams, Timebase};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::PacketSource;

/// Sample frames carried by one packet
pub const PACKET_FRAMES: u64 = 1024;

const FORMAT_PCM: u16 = 0x0001;
const FORMAT_FLOAT: u16 = 0x0003;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Layout of a WAVE file's sample data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    pub data_offset: u64,
    pub data_len: u64,
}

impl WavHeader {
    pub fn open(path: &Path) -> ShiftXResult<Self> {
        let mut file = File::open(path).map_err(|e| probe_error(path, e.to_string()))?;
        Self::read(&mut file).map_err(|e| match e {
            ShiftXError::ProbeError { message } => probe_error(path, message),
            other => probe_error(path, other.to_string()),
        })
    }

    /// Parse the RIFF chunks up to the start of the `data` chunk
    pub fn read<R: Read + Seek>(reader: &mut R) -> ShiftXResult<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut riff = [0u8; 12];
        reader.read_exact(&mut riff)?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(ShiftXError::ProbeError {
                message: "not a RIFF/WAVE file".to_string(),
            });
        }

        let mut fmt: Option<(SampleFormat, u16, u32)> = None;
        loop {
            let mut chunk = [0u8; 8];
            if let Err(e) = reader.read_exact(&mut chunk) {
                return Err(ShiftXError::ProbeError {
                    message: format!("no data chunk found ({})", e),
                });
            }
            let mut fields = &chunk[4..];
            let size = fields.get_u32_le() as u64;

            match &chunk[0..4] {
                b"fmt " => {
                    let mut body = vec![0u8; size as usize];
                    reader.read_exact(&mut body)?;
                    fmt = Some(parse_fmt(Bytes::from(body))?);
                    if size % 2 == 1 {
                        reader.seek(SeekFrom::Current(1))?;
                    }
                }
                b"data" => {
                    let (format, channels, sample_rate) = fmt.ok_or_else(|| ShiftXError::ProbeError {
                        message: "data chunk before fmt chunk".to_string(),
                    })?;
                    let data_offset = reader.stream_position()?;
                    let available = file_len.saturating_sub(data_offset);
                    let data_len = if size > available {
                        warn!(
                            "WAVE data chunk declares {} bytes but only {} are present",
                            size, available
                        );
                        available
                    } else {
                        size
                    };
                    return Ok(Self {
                        format,
                        channels,
                        sample_rate,
                        data_offset,
                        data_len,
                    });
                }
                other => {
                    trace!("Skipping RIFF chunk {:?} ({} bytes)", String::from_utf8_lossy(other), size);
                    reader.seek(SeekFrom::Current((size + size % 2) as i64))?;
                }
            }
        }
    }

    /// Bytes of one sample frame
    pub fn block_align(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    pub fn frames(&self) -> u64 {
        self.data_len / self.block_align() as u64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn time_base(&self) -> ShiftXResult<Timebase> {
        Timebase::from_rate(self.sample_rate)
    }

    pub fn stream_info(&self) -> ShiftXResult<StreamInfo> {
        let mut info = StreamInfo::new(
            0,
            self.format.codec_name(),
            self.time_base()?,
            StreamParams::Audio(AudioParams {
                sample_rate: self.sample_rate,
                channels: self.channels,
                sample_format: self.format.name().to_string(),
            }),
        )?
        .with_duration(self.duration_seconds());
        info.bit_rate = Some(self.sample_rate as u64 * self.block_align() as u64 * 8);
        Ok(info)
    }
}

fn parse_fmt(mut body: Bytes) -> ShiftXResult<(SampleFormat, u16, u32)> {
    if body.len() < 16 {
        return Err(ShiftXError::ProbeError {
            message: format!("fmt chunk too short ({} bytes)", body.len()),
        });
    }
    let mut tag = body.get_u16_le();
    let channels = body.get_u16_le();
    let sample_rate = body.get_u32_le();
    let _byte_rate = body.get_u32_le();
    let _block_align = body.get_u16_le();
    let bits = body.get_u16_le();

    if tag == FORMAT_EXTENSIBLE {
        // cbSize, valid bits, channel mask, then the sub-format GUID
        if body.len() < 2 + 2 + 4 + 2 {
            return Err(ShiftXError::ProbeError {
                message: "truncated WAVE_FORMAT_EXTENSIBLE header".to_string(),
            });
        }
        body.advance(8);
        tag = body.get_u16_le();
    }

    let format = match (tag, bits) {
        (FORMAT_PCM, 8) => SampleFormat::U8,
        (FORMAT_PCM, 16) => SampleFormat::S16,
        (FORMAT_PCM, 24) => SampleFormat::S24,
        (FORMAT_PCM, 32) => SampleFormat::S32,
        (FORMAT_FLOAT, 32) => SampleFormat::F32,
        _ => {
            return Err(ShiftXError::ProbeError {
                message: format!("unsupported WAVE encoding (format tag {:#06x}, {} bits)", tag, bits),
            })
        }
    };
    if channels == 0 || sample_rate == 0 {
        return Err(ShiftXError::ProbeError {
            message: format!("invalid WAVE layout: {} channels at {} Hz", channels, sample_rate),
        });
    }
    Ok((format, channels, sample_rate))
}

fn probe_error(path: &Path, message: String) -> ShiftXError {
    ShiftXError::ProbeError {
        message: format!("{}: {}", path.display(), message),
    }
}

/// Forward-only reader of a WAVE file's single stream
pub struct WavSource {
    path: PathBuf,
    reader: BufReader<File>,
    header: WavHeader,
    time_base: Timebase,
    position: u64,
    exhausted: bool,
}

impl WavSource {
    pub fn open(path: &Path) -> ShiftXResult<Self> {
        let mut file = File::open(path).map_err(|e| ShiftXError::read(path.display().to_string(), e.to_string()))?;
        let header = WavHeader::read(&mut file)?;
        file.seek(SeekFrom::Start(header.data_offset))?;
        debug!(
            "Opened {}: {} {} Hz {}ch, {} frames",
            path.display(),
            header.format.codec_name(),
            header.sample_rate,
            header.channels,
            header.frames()
        );
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            time_base: header.time_base()?,
            header,
            position: 0,
            exhausted: false,
        })
    }

    pub fn header(&self) -> &WavHeader {
        &self.header
    }
}

impl PacketSource for WavSource {
    fn read_next(&mut self) -> ShiftXResult<Option<Packet>> {
        if self.exhausted {
            return Err(ShiftXError::read(
                self.path.display().to_string(),
                "read past end of stream",
            ));
        }

        let frames = (self.header.frames() - self.position).min(PACKET_FRAMES);
        if frames == 0 {
            self.exhausted = true;
            return Ok(None);
        }

        let mut payload = vec![0u8; frames as usize * self.header.block_align()];
        self.reader.read_exact(&mut payload).map_err(|e| {
            ShiftXError::read(
                self.path.display().to_string(),
                format!("frame {}: {}", self.position, e),
            )
        })?;

        let packet = Packet::new(
            StreamKind::Audio,
            Bytes::from(payload),
            self.position as i64,
            frames as i64,
            self.time_base,
        );
        self.position += frames;
        Ok(Some(packet))
    }
}
