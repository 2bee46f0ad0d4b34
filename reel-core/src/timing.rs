//! Conversions between the three time domains of a video substream.
//!
//! A decoded stream is addressed in container ticks (the substream's rational
//! time base), in microseconds, or by frame index. A [`Timeline`] is seeded
//! once per stream with the time base, the average frame rate and the probed
//! start timestamp, after which every conversion is a pure rescale.

use crate::rescale::{rescale, Rational, MICROSECONDS};

#[derive(Debug, Clone, Copy)]
pub struct Timeline {
    time_base: Rational,
    frame_rate: Rational,
    start_timestamp: i64,
}

impl Timeline {
    pub fn new(time_base: Rational, frame_rate: Rational, start_timestamp: i64) -> Self {
        Self { time_base, frame_rate, start_timestamp }
    }

    /// Container timestamp of the first presented frame.
    pub fn start_timestamp(&self) -> i64 {
        self.start_timestamp
    }

    pub fn frame_rate(&self) -> Rational {
        self.frame_rate
    }

    /// Microseconds to container ticks, anchored at the stream start.
    pub fn time_to_timestamp(&self, time: i64) -> i64 {
        self.start_timestamp + rescale(time, MICROSECONDS, self.time_base)
    }

    /// Container ticks to microseconds, anchored at the stream start.
    pub fn timestamp_to_time(&self, timestamp: i64) -> i64 {
        rescale(timestamp - self.start_timestamp, self.time_base, MICROSECONDS)
    }

    /// Frame index to container ticks.
    pub fn frame_to_timestamp(&self, frame: i64) -> i64 {
        self.start_timestamp + rescale(frame, self.frame_rate.inverse(), self.time_base)
    }

    /// Container ticks to frame index.
    pub fn timestamp_to_frame(&self, timestamp: i64) -> i64 {
        rescale(timestamp - self.start_timestamp, self.frame_rate, self.time_base.inverse())
    }

    /// Frame index to microseconds.
    pub fn frame_to_time(&self, frame: i64) -> i64 {
        rescale(frame, Rational::new(1_000_000, 1), self.frame_rate)
    }

    /// Microseconds to frame index.
    pub fn time_to_frame(&self, time: i64) -> i64 {
        rescale(time, MICROSECONDS, self.frame_rate.inverse())
    }
}
