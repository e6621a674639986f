//! Output muxer
//!
//! The single serialization point of a job. Packets of every slot go through
//! [`Muxer::write`], which enforces the per-slot ordering invariant before
//! handing them to the container writer.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::domain::{Packet, StreamInfo};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::ContainerWriter;

/// Write session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MuxState {
    /// Slots may still be declared
    Configuring,
    /// Between begin_wrap and end_wrap
    Writing,
    /// Trailer written
    Closed,
    /// Partial output discarded
    Aborted,
}

/// Destination stream of the output container
#[derive(Debug, Clone, Serialize)]
pub struct OutputStreamSlot {
    pub index: usize,
    pub stream: StreamInfo,
    pub packets: u64,
    pub bytes: u64,
    pub first_pts: Option<i64>,
    pub last_ts: Option<i64>,
    pub end_ts: Option<i64>,
}

impl OutputStreamSlot {
    fn new(index: usize, stream: StreamInfo) -> Self {
        Self {
            index,
            stream,
            packets: 0,
            bytes: 0,
            first_pts: None,
            last_ts: None,
            end_ts: None,
        }
    }

    /// End of the slot's written timeline in seconds
    pub fn end_seconds(&self) -> f64 {
        self.end_ts
            .map(|end| self.stream.time_base.pts_to_seconds(end))
            .unwrap_or(0.0)
    }

    /// Timestamp checked for ordering: decode order when frames are reordered
    fn ordering_key(&self, packet: &Packet) -> i64 {
        if self.stream.reorders {
            packet.dts
        } else {
            packet.pts
        }
    }
}

/// Writes ready packets of all slots into one container
pub struct Muxer {
    writer: Box<dyn ContainerWriter>,
    slots: Vec<OutputStreamSlot>,
    state: MuxState,
}

impl Muxer {
    pub fn new(writer: Box<dyn ContainerWriter>) -> Self {
        Self {
            writer,
            slots: Vec::new(),
            state: MuxState::Configuring,
        }
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    pub fn slots(&self) -> &[OutputStreamSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&OutputStreamSlot> {
        self.slots.get(index)
    }

    /// Declare an output stream, only before the session starts
    pub fn add_slot(&mut self, stream: &StreamInfo) -> ShiftXResult<usize> {
        if self.state != MuxState::Configuring {
            return Err(ShiftXError::mux("streams must be declared before begin_wrap"));
        }

        let index = self.writer.add_stream(stream)?;
        if index != self.slots.len() {
            return Err(ShiftXError::mux(format!(
                "container assigned stream {} to slot {}",
                index,
                self.slots.len()
            )));
        }
        debug!("Declared output slot {}: {}", index, stream.describe());
        self.slots.push(OutputStreamSlot::new(index, stream.clone()));
        Ok(index)
    }

    /// Open the container and write its header
    pub fn begin_wrap(&mut self) -> ShiftXResult<()> {
        if self.state != MuxState::Configuring {
            return Err(ShiftXError::mux("write session already started"));
        }
        if self.slots.is_empty() {
            return Err(ShiftXError::mux("no output stream declared"));
        }

        self.writer.write_header()?;
        self.state = MuxState::Writing;
        info!("Output opened with {} stream(s)", self.slots.len());
        Ok(())
    }

    /// Write one packet to `slot`
    pub fn write(&mut self, slot: usize, packet: &Packet) -> ShiftXResult<()> {
        if self.state != MuxState::Writing {
            return Err(ShiftXError::mux(format!(
                "packet for slot {} written outside the write session ({:?})",
                slot, self.state
            )));
        }

        let target = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| ShiftXError::mux(format!("unknown output slot {}", slot)))?;
        let packet = packet.rescaled(target.stream.time_base);

        let key = target.ordering_key(&packet);
        if packet.pts < 0 || target.last_ts.map_or(false, |last| key < last) {
            let previous = target.last_ts.unwrap_or(0);
            error!(
                "Slot {} timestamp order violation: {} after {}",
                slot, packet.pts, previous
            );
            return Err(ShiftXError::TimestampOrderError {
                slot,
                previous,
                current: if packet.pts < 0 { packet.pts } else { key },
            });
        }

        self.writer.write_packet(slot, &packet)?;

        target.packets += 1;
        target.bytes += packet.payload.len() as u64;
        target.first_pts.get_or_insert(packet.pts);
        target.last_ts = Some(key);
        let end = packet.end();
        target.end_ts = Some(target.end_ts.map_or(end, |current| current.max(end)));
        Ok(())
    }

    /// Write the trailer and close the container
    pub fn end_wrap(&mut self) -> ShiftXResult<()> {
        if self.state != MuxState::Writing {
            return Err(ShiftXError::mux(format!(
                "cannot close output in state {:?}",
                self.state
            )));
        }

        self.writer.write_trailer()?;
        self.state = MuxState::Closed;
        for slot in &self.slots {
            info!(
                "Slot {} closed: {} packets, {} bytes, {:.3}s",
                slot.index,
                slot.packets,
                slot.bytes,
                slot.end_seconds()
            );
        }
        Ok(())
    }

    /// Drop the session and remove the partial output
    pub fn abort(&mut self) {
        if matches!(self.state, MuxState::Closed | MuxState::Aborted) {
            return;
        }
        self.writer.abort();
        self.state = MuxState::Aborted;
        error!("Output aborted, partial file removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StreamKind, Timebase};
    use crate::engine::test_support::*;
    use bytes::Bytes;

    fn packet(pts: i64, rate: u32) -> Packet {
        Packet::new(
            StreamKind::Audio,
            Bytes::from_static(&[1, 2, 3, 4]),
            pts,
            2,
            Timebase::from_rate(rate).unwrap(),
        )
    }

    fn open_muxer() -> (Muxer, std::sync::Arc<std::sync::Mutex<WriterLog>>) {
        let (writer, log) = MemoryWriter::new();
        let mut muxer = Muxer::new(Box::new(writer));
        muxer.add_slot(&audio_stream(0, 1000)).unwrap();
        muxer.add_slot(&audio_stream(1, 1000)).unwrap();
        muxer.begin_wrap().unwrap();
        (muxer, log)
    }

    #[test]
    fn test_write_session_bracket() {
        let (writer, log) = MemoryWriter::new();
        let mut muxer = Muxer::new(Box::new(writer));
        muxer.add_slot(&audio_stream(0, 1000)).unwrap();

        assert!(muxer.write(0, &packet(0, 1000)).is_err());
        muxer.begin_wrap().unwrap();
        assert!(muxer.add_slot(&audio_stream(1, 1000)).is_err());
        muxer.write(0, &packet(0, 1000)).unwrap();
        muxer.end_wrap().unwrap();
        assert!(muxer.write(0, &packet(10, 1000)).is_err());

        let log = log.lock().unwrap();
        assert!(log.header);
        assert!(log.trailer);
        assert_eq!(log.packets.len(), 1);
        assert_eq!(muxer.state(), MuxState::Closed);
    }

    #[test]
    fn test_begin_wrap_requires_streams() {
        let (writer, _log) = MemoryWriter::new();
        let mut muxer = Muxer::new(Box::new(writer));
        assert!(muxer.begin_wrap().is_err());
    }

    #[test]
    fn test_per_slot_ordering() {
        let (mut muxer, _log) = open_muxer();

        muxer.write(0, &packet(10, 1000)).unwrap();
        // Other slots are independent
        muxer.write(1, &packet(0, 1000)).unwrap();
        // Equal timestamps are allowed
        muxer.write(0, &packet(10, 1000)).unwrap();

        let err = muxer.write(0, &packet(9, 1000)).unwrap_err();
        assert!(matches!(
            err,
            ShiftXError::TimestampOrderError {
                slot: 0,
                previous: 10,
                current: 9
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_negative_timestamp_rejected() {
        let (mut muxer, log) = open_muxer();
        assert!(matches!(
            muxer.write(1, &packet(-1, 1000)),
            Err(ShiftXError::TimestampOrderError { .. })
        ));
        assert!(log.lock().unwrap().packets.is_empty());
    }

    #[test]
    fn test_packets_rescaled_to_slot_time_base() {
        let (mut muxer, log) = open_muxer();
        muxer.write(0, &packet(96000, 48000)).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.packets[0].1.pts, 2000);
        assert_eq!(log.packets[0].1.time_base, Timebase::from_rate(1000).unwrap());
        assert_eq!(muxer.slot(0).unwrap().end_ts, Some(2000));
    }

    #[test]
    fn test_reordering_slot_checks_decode_order() {
        let (writer, _log) = MemoryWriter::new();
        let mut muxer = Muxer::new(Box::new(writer));
        let mut stream = video_stream(0, 25);
        stream.reorders = true;
        muxer.add_slot(&stream).unwrap();
        muxer.begin_wrap().unwrap();

        let tb = Timebase::from_rate(25).unwrap();
        let frame = |pts: i64, dts: i64| {
            let mut p = Packet::new(StreamKind::Video, Bytes::from_static(&[0]), pts, 1, tb);
            p.dts = dts;
            p
        };
        // I P B B in decode order
        muxer.write(0, &frame(0, -1)).unwrap();
        muxer.write(0, &frame(3, 0)).unwrap();
        muxer.write(0, &frame(1, 1)).unwrap();
        muxer.write(0, &frame(2, 2)).unwrap();
        assert!(muxer.write(0, &frame(4, 1)).is_err());
    }

    #[test]
    fn test_slot_statistics() {
        let (mut muxer, _log) = open_muxer();
        muxer.write(0, &packet(0, 1000)).unwrap();
        muxer.write(0, &packet(2, 1000)).unwrap();

        let slot = muxer.slot(0).unwrap();
        assert_eq!(slot.packets, 2);
        assert_eq!(slot.bytes, 8);
        assert_eq!(slot.first_pts, Some(0));
        assert_eq!(slot.end_ts, Some(4));
        assert!((slot.end_seconds() - 0.004).abs() < 1e-12);
    }

    #[test]
    fn test_abort_discards_output() {
        let (mut muxer, log) = open_muxer();
        muxer.write(0, &packet(0, 1000)).unwrap();
        muxer.abort();

        assert_eq!(muxer.state(), MuxState::Aborted);
        assert!(log.lock().unwrap().aborted);
        assert!(muxer.end_wrap().is_err());
    }
}
