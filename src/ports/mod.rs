// Ports - Interface definitions (contracts) between the engine and media adapters

use std::path::Path;

use crate::domain::{MediaInfo, Packet, Profile, StreamDescriptor, StreamInfo};
use crate::engine::scheduler::OffsetScheduler;
use crate::error::ShiftXResult;

/// Port for opening inputs, transforms and outputs of one media library
pub trait MediaBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Whether this backend can read or write `path`
    fn handles(&self, path: &Path) -> bool;

    /// Probe media file and return its streams
    fn probe(&self, path: &Path) -> ShiftXResult<MediaInfo>;

    /// Open a forward-only packet reader on the descriptor's stream
    fn open_source(&self, descriptor: &StreamDescriptor) -> ShiftXResult<Box<dyn PacketSource>>;

    /// Open a decode/encode transform from the descriptor's stream to `profile`
    fn open_transform(
        &self,
        descriptor: &StreamDescriptor,
        profile: &Profile,
    ) -> ShiftXResult<Box<dyn StreamTransform>>;

    /// Create a container writer for `path`
    fn create_writer(&self, path: &Path) -> ShiftXResult<Box<dyn ContainerWriter>>;
}

/// Lazy, finite, forward-only packet reader for one stream
pub trait PacketSource: Send {
    /// Next packet, `None` once the stream is exhausted
    ///
    /// Reading again after `None` fails with `ReadError`.
    fn read_next(&mut self) -> ShiftXResult<Option<Packet>>;
}

/// Decode then re-encode transform of one stream
///
/// The scheduler is applied to decoded frames, so trimming always happens on a
/// decodable boundary.
pub trait StreamTransform: Send {
    /// Codec parameters of the encoded output
    fn output_stream(&self) -> &StreamInfo;

    /// Encode generated silence or black frames covering `[from, until)` in output ticks
    fn fill(&mut self, from: i64, until: i64) -> ShiftXResult<Vec<Packet>>;

    /// Decode `packet`, schedule its frames and encode the survivors
    fn transform(&mut self, packet: &Packet, scheduler: &OffsetScheduler) -> ShiftXResult<Vec<Packet>>;

    /// Flush buffered decoder and encoder state
    fn flush(&mut self, scheduler: &OffsetScheduler) -> ShiftXResult<Vec<Packet>>;
}

/// Output container
pub trait ContainerWriter: Send {
    /// Declare a stream and return its index in the container
    fn add_stream(&mut self, stream: &StreamInfo) -> ShiftXResult<usize>;

    /// Open the container and write its header
    fn write_header(&mut self) -> ShiftXResult<()>;

    /// Write one packet, timestamps already in the declared stream time base
    fn write_packet(&mut self, stream: usize, packet: &Packet) -> ShiftXResult<()>;

    /// Write the trailer and close the container
    fn write_trailer(&mut self) -> ShiftXResult<()>;

    /// Close without finalizing and remove any partial output
    fn abort(&mut self);
}
