//! Offset scheduling
//!
//! Maps source timestamps onto the output timeline of one stream. A positive
//! offset moves the stream later, a negative offset moves it earlier and
//! everything that would land before the stream's origin is dropped, never
//! clamped. The origin is zero unless the stream follows another one in a
//! shared slot.

use crate::domain::model::Timebase;

/// Surviving part of a decoded frame or sample block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Output timestamp of the first kept unit
    pub start: i64,
    /// Leading units to discard
    pub skip: i64,
    /// Units kept
    pub length: i64,
}

/// Constant per-stream timestamp offset from a timeline origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetScheduler {
    offset_seconds: f64,
    origin_seconds: f64,
    time_base: Timebase,
    offset_ticks: i64,
    origin_ticks: i64,
}

impl OffsetScheduler {
    /// Scheduler for `offset_seconds`, rounded to the nearest tick of `time_base`
    pub fn new(offset_seconds: f64, time_base: Timebase) -> Self {
        Self {
            offset_seconds,
            origin_seconds: 0.0,
            time_base,
            offset_ticks: time_base.seconds_to_pts(offset_seconds),
            origin_ticks: 0,
        }
    }

    /// Same offset, measured from `origin_seconds` on the output timeline
    pub fn with_origin(mut self, origin_seconds: f64) -> Self {
        self.origin_seconds = origin_seconds;
        self.origin_ticks = self.time_base.seconds_to_pts(origin_seconds);
        self
    }

    /// Same offset and origin expressed in another time base
    pub fn rebased(&self, time_base: Timebase) -> Self {
        Self::new(self.offset_seconds, time_base).with_origin(self.origin_seconds)
    }

    pub fn offset_seconds(&self) -> f64 {
        self.offset_seconds
    }

    pub fn origin_seconds(&self) -> f64 {
        self.origin_seconds
    }

    pub fn time_base(&self) -> Timebase {
        self.time_base
    }

    pub fn offset_ticks(&self) -> i64 {
        self.offset_ticks
    }

    pub fn origin_ticks(&self) -> i64 {
        self.origin_ticks
    }

    /// Total distance a kept packet moves, offset plus origin
    pub fn shift_ticks(&self) -> i64 {
        self.offset_ticks.saturating_add(self.origin_ticks)
    }

    /// Output timestamp for `ts`, `None` when the packet must be dropped
    pub fn schedule(&self, ts: i64) -> Option<i64> {
        let relative = ts.checked_add(self.offset_ticks)?;
        if relative < 0 {
            return None;
        }
        relative.checked_add(self.origin_ticks)
    }

    /// Raw shifted timestamp, possibly before the origin
    pub fn shift(&self, ts: i64) -> i64 {
        ts.saturating_add(self.shift_ticks())
    }

    /// Part of `[ts, ts + duration)` that lands at or after the origin
    pub fn trim_span(&self, ts: i64, duration: i64) -> Option<Span> {
        let relative = ts.saturating_add(self.offset_ticks);
        if relative >= 0 {
            return Some(Span {
                start: relative.saturating_add(self.origin_ticks),
                skip: 0,
                length: duration,
            });
        }

        let end = relative.saturating_add(duration);
        if end <= 0 {
            return None;
        }
        Some(Span {
            start: self.origin_ticks,
            skip: -relative,
            length: end,
        })
    }

    /// Gap between the origin and the first output timestamp
    pub fn lead_in(&self) -> i64 {
        self.offset_ticks.max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tb48k() -> Timebase {
        Timebase::from_rate(48000).unwrap()
    }

    #[test]
    fn test_positive_offset_shifts_everything() {
        let scheduler = OffsetScheduler::new(10.0, tb48k());
        assert_eq!(scheduler.offset_ticks(), 480000);
        assert_eq!(scheduler.schedule(0), Some(480000));
        assert_eq!(scheduler.schedule(1024), Some(481024));
        assert_eq!(scheduler.lead_in(), 480000);
    }

    #[test]
    fn test_negative_offset_drops_before_zero() {
        let scheduler = OffsetScheduler::new(-5.5, tb48k());
        assert_eq!(scheduler.offset_ticks(), -264000);
        assert_eq!(scheduler.schedule(0), None);
        assert_eq!(scheduler.schedule(263999), None);
        assert_eq!(scheduler.schedule(264000), Some(0));
        assert_eq!(scheduler.schedule(300000), Some(36000));
        assert_eq!(scheduler.lead_in(), 0);
    }

    #[test]
    fn test_zero_offset_is_identity() {
        let scheduler = OffsetScheduler::new(0.0, tb48k());
        for ts in [0, 1, 1024, 1 << 40] {
            assert_eq!(scheduler.schedule(ts), Some(ts));
        }
    }

    #[test]
    fn test_offset_rounds_to_nearest_tick() {
        let scheduler = OffsetScheduler::new(0.1, Timebase::new(1, 25).unwrap());
        assert_eq!(scheduler.offset_ticks(), 3);
        let scheduler = OffsetScheduler::new(-0.1, Timebase::new(1, 25).unwrap());
        assert_eq!(scheduler.offset_ticks(), -3);
    }

    #[test]
    fn test_schedule_overflow_drops() {
        let scheduler = OffsetScheduler::new(1.0, tb48k());
        assert_eq!(scheduler.schedule(i64::MAX), None);
    }

    #[test]
    fn test_trim_span() {
        let scheduler = OffsetScheduler::new(-1.0, tb48k());

        // Entirely before zero
        assert_eq!(scheduler.trim_span(0, 1024), None);
        assert_eq!(scheduler.trim_span(46976, 1024), None);

        // Straddles zero
        assert_eq!(
            scheduler.trim_span(47500, 1024),
            Some(Span {
                start: 0,
                skip: 500,
                length: 524
            })
        );

        // Entirely after zero
        assert_eq!(
            scheduler.trim_span(48000, 1024),
            Some(Span {
                start: 0,
                skip: 0,
                length: 1024
            })
        );
    }

    #[test]
    fn test_rebased_keeps_seconds() {
        let scheduler = OffsetScheduler::new(2.0, tb48k());
        let video = scheduler.rebased(Timebase::new(1, 25).unwrap());
        assert_eq!(video.offset_ticks(), 50);
        assert_eq!(video.offset_seconds(), 2.0);

        let shared = scheduler.with_origin(3.0).rebased(Timebase::new(1, 25).unwrap());
        assert_eq!(shared.origin_ticks(), 75);
        assert_eq!(shared.shift_ticks(), 125);
    }

    #[test]
    fn test_negative_offset_trims_at_origin() {
        let scheduler = OffsetScheduler::new(-1.5, Timebase::from_rate(1000).unwrap()).with_origin(2.0);
        assert_eq!(scheduler.shift_ticks(), 500);

        assert_eq!(scheduler.schedule(0), None);
        assert_eq!(scheduler.schedule(1499), None);
        assert_eq!(scheduler.schedule(1500), Some(2000));
        assert_eq!(scheduler.schedule(2000), Some(2500));

        assert_eq!(scheduler.trim_span(0, 1000), None);
        assert_eq!(
            scheduler.trim_span(1000, 1000),
            Some(Span {
                start: 2000,
                skip: 500,
                length: 500
            })
        );
        assert_eq!(
            scheduler.trim_span(2000, 1000),
            Some(Span {
                start: 2500,
                skip: 0,
                length: 1000
            })
        );
        assert_eq!(scheduler.lead_in(), 0);
    }
}
