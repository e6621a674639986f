//! In-memory sources, transforms and writers for engine tests

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::domain::{
    AudioParams, MediaInfo, Packet, ProfileRegistry, StreamDescriptor, StreamInfo, StreamKind,
    StreamParams, StreamRequest, Timebase, VideoParams,
};
use crate::engine::scheduler::OffsetScheduler;
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::{ContainerWriter, PacketSource, StreamTransform};

pub fn audio_stream(index: usize, rate: u32) -> StreamInfo {
    StreamInfo::new(
        index,
        "pcm_s16le",
        Timebase::from_rate(rate).unwrap(),
        StreamParams::Audio(AudioParams {
            sample_rate: rate,
            channels: 1,
            sample_format: "s16".to_string(),
        }),
    )
    .unwrap()
}

pub fn video_stream(index: usize, fps: u32) -> StreamInfo {
    StreamInfo::new(
        index,
        "mpeg2video",
        Timebase::from_rate(fps).unwrap(),
        StreamParams::Video(VideoParams {
            width: 720,
            height: 576,
            frame_rate: fps as f64,
            pixel_format: "yuv420p".to_string(),
        }),
    )
    .unwrap()
}

fn descriptor(stream: StreamInfo, request: StreamRequest) -> StreamDescriptor {
    let media = MediaInfo::new(request.path.clone(), "memory", vec![stream]);
    StreamDescriptor::new(&request, &media, &ProfileRegistry::with_builtins()).unwrap()
}

pub fn audio_descriptor(rate: u32, offset: f64) -> StreamDescriptor {
    descriptor(
        audio_stream(0, rate),
        StreamRequest::new("memory.wav").with_offset(offset),
    )
}

pub fn audio_descriptor_lasting(rate: u32, offset: f64, seconds: f64) -> StreamDescriptor {
    descriptor(
        audio_stream(0, rate).with_duration(seconds),
        StreamRequest::new("memory.wav").with_offset(offset),
    )
}

pub fn audio_descriptor_with_profile(rate: u32, offset: f64) -> StreamDescriptor {
    descriptor(
        audio_stream(0, rate),
        StreamRequest::new("memory.wav")
            .with_offset(offset)
            .with_profile("wave16b48kmono"),
    )
}

pub fn video_descriptor(fps: u32, offset: f64) -> StreamDescriptor {
    descriptor(
        video_stream(0, fps),
        StreamRequest::new("memory.mov").with_offset(offset),
    )
}

/// Source replaying a fixed list of packets
pub struct MemorySource {
    queue: VecDeque<Packet>,
    all: Vec<Packet>,
    fail_at: Option<usize>,
    read: usize,
    exhausted: bool,
}

impl MemorySource {
    pub fn new(packets: Vec<Packet>) -> Self {
        Self {
            queue: packets.iter().cloned().collect(),
            all: packets,
            fail_at: None,
            read: 0,
            exhausted: false,
        }
    }

    /// `count` audio blocks of `block` samples, each with a distinct payload
    pub fn audio_blocks(count: usize, block: i64, rate: u32) -> Self {
        let tb = Timebase::from_rate(rate).unwrap();
        let packets = (0..count)
            .map(|i| {
                Packet::new(
                    StreamKind::Audio,
                    Bytes::from(vec![i as u8; 4]),
                    i as i64 * block,
                    block,
                    tb,
                )
            })
            .collect();
        Self::new(packets)
    }

    /// `count` video frames with a keyframe every `gop` frames
    pub fn video_frames(count: usize, gop: usize, fps: u32) -> Self {
        let tb = Timebase::from_rate(fps).unwrap();
        let packets = (0..count)
            .map(|i| {
                let mut packet =
                    Packet::new(StreamKind::Video, Bytes::from(vec![i as u8; 16]), i as i64, 1, tb);
                packet.keyframe = i % gop == 0;
                packet
            })
            .collect();
        Self::new(packets)
    }

    /// Fail with a read error once `count` packets were delivered
    pub fn failing_at(mut self, count: usize) -> Self {
        self.fail_at = Some(count);
        self
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.all.clone()
    }
}

impl PacketSource for MemorySource {
    fn read_next(&mut self) -> ShiftXResult<Option<Packet>> {
        if self.exhausted {
            return Err(ShiftXError::read("memory", "read after end of stream"));
        }
        if self.fail_at == Some(self.read) {
            return Err(ShiftXError::read("memory", "simulated read failure"));
        }
        match self.queue.pop_front() {
            Some(packet) => {
                self.read += 1;
                Ok(Some(packet))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }
}

/// Transform that re-emits payloads on trimmed spans of the same time base
pub struct CopyTransform {
    output: StreamInfo,
    block: i64,
    calls: usize,
    fail_after: Option<usize>,
}

impl CopyTransform {
    pub fn new(rate: u32) -> Self {
        Self {
            output: audio_stream(0, rate),
            block: rate as i64,
            calls: 0,
            fail_after: None,
        }
    }

    pub fn failing_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }
}

impl StreamTransform for CopyTransform {
    fn output_stream(&self) -> &StreamInfo {
        &self.output
    }

    fn fill(&mut self, from: i64, until: i64) -> ShiftXResult<Vec<Packet>> {
        let tb = self.output.time_base;
        let mut packets = Vec::new();
        let mut pts = from;
        while pts < until {
            let length = self.block.min(until - pts);
            packets.push(Packet::new(StreamKind::Audio, Bytes::new(), pts, length, tb));
            pts += length;
        }
        Ok(packets)
    }

    fn transform(&mut self, packet: &Packet, scheduler: &OffsetScheduler) -> ShiftXResult<Vec<Packet>> {
        if self.fail_after.map_or(false, |limit| self.calls >= limit) {
            return Err(ShiftXError::transform("simulated encoder failure"));
        }
        self.calls += 1;

        Ok(scheduler
            .trim_span(packet.pts, packet.duration)
            .map(|span| {
                Packet::new(
                    StreamKind::Audio,
                    packet.payload.clone(),
                    span.start,
                    span.length,
                    self.output.time_base,
                )
            })
            .into_iter()
            .collect())
    }

    fn flush(&mut self, _scheduler: &OffsetScheduler) -> ShiftXResult<Vec<Packet>> {
        Ok(Vec::new())
    }
}

/// Everything a [`MemoryWriter`] was asked to do
#[derive(Debug, Default)]
pub struct WriterLog {
    pub streams: Vec<StreamInfo>,
    pub header: bool,
    pub trailer: bool,
    pub aborted: bool,
    pub packets: Vec<(usize, Packet)>,
}

/// Container writer keeping packets in memory
pub struct MemoryWriter {
    log: Arc<Mutex<WriterLog>>,
    fail_on_packet: Option<usize>,
}

impl MemoryWriter {
    pub fn new() -> (Self, Arc<Mutex<WriterLog>>) {
        let log = Arc::new(Mutex::new(WriterLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                fail_on_packet: None,
            },
            log,
        )
    }

    pub fn failing_on_packet(mut self, index: usize) -> Self {
        self.fail_on_packet = Some(index);
        self
    }
}

impl ContainerWriter for MemoryWriter {
    fn add_stream(&mut self, stream: &StreamInfo) -> ShiftXResult<usize> {
        let mut log = self.log.lock().unwrap();
        log.streams.push(stream.clone());
        Ok(log.streams.len() - 1)
    }

    fn write_header(&mut self) -> ShiftXResult<()> {
        self.log.lock().unwrap().header = true;
        Ok(())
    }

    fn write_packet(&mut self, stream: usize, packet: &Packet) -> ShiftXResult<()> {
        let mut log = self.log.lock().unwrap();
        if self.fail_on_packet == Some(log.packets.len()) {
            return Err(ShiftXError::mux("simulated disk full"));
        }
        log.packets.push((stream, packet.clone()));
        Ok(())
    }

    fn write_trailer(&mut self) -> ShiftXResult<()> {
        self.log.lock().unwrap().trailer = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.log.lock().unwrap().aborted = true;
    }
}
