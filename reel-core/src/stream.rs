//! Random-access frame cursor over one video substream.
//!
//! A [`Stream`] owns a demuxer and decoder pair behind the media seam and
//! exposes decoded frames through a peek/pop cursor: `peek_next_frame` looks
//! at the next frame without consuming it, `next_frame` consumes it,
//! `next_frame_sequence` consumes a run of frames at given offsets, and the
//! two seek entry points reposition the cursor by microsecond time or frame
//! index.
//!
//! Decoding is double buffered: frames decode into a write-side buffer in
//! blocks of `buffer_length`, and the buffers swap whenever the read side is
//! exhausted. The block decode is synchronous today but kept behind the
//! cursor so a task-based refill can replace it without touching the API.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::frame::Frame;
use crate::media::{
    Demuxer, Drain, MediaBackend, MediaError, MediaInput, SeekFlags, StreamOptions, VideoDecoder,
    VideoStreamInfo,
};
use crate::probe;
use crate::timing::Timeline;

/// Frames a time-based seek will decode forward rather than reposition the
/// demuxer for.
const FORWARD_SEEK_FRAMES: i64 = 25;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open `{path}`: {source}")]
    Open {
        path: String,
        #[source]
        source: MediaError,
    },
    #[error("decoding failed: {0}")]
    Decode(#[source] MediaError),
    #[error("failed to seek to requested position {0}")]
    Seek(i64),
    #[error("sequence offsets must be non-negative and ascending")]
    InvalidSequence,
}

/// Mutable decode state, guarded by the stream's lock.
///
/// The demuxer read position and the decoder state only change through this
/// struct, so holding the lock for a whole public operation keeps them
/// coherent with the buffers.
struct StreamState {
    demuxer: Box<dyn Demuxer>,
    decoder: Box<dyn VideoDecoder>,
    /// Read-side buffer. Consumed slots are dropped in place so a frame's
    /// backing memory is released as soon as it is popped.
    ping: Vec<Option<Arc<Frame>>>,
    /// Write-side buffer, filled by the block decode and swapped into `ping`.
    pong: Vec<Option<Arc<Frame>>>,
    /// Index of the next unconsumed frame in `ping`.
    ping_head: usize,
    /// Falls to false on the first failed frame-index seek and never
    /// recovers; later frame seeks go straight to the time-based path.
    frame_seek_supported: bool,
}

impl StreamState {
    /// Next unconsumed frame, if the read buffer holds one.
    fn front(&self) -> Option<&Arc<Frame>> {
        self.ping.get(self.ping_head).and_then(Option::as_ref)
    }

    /// Last frame of the read buffer, unless it has already been consumed.
    fn back(&self) -> Option<&Arc<Frame>> {
        self.ping.last().and_then(Option::as_ref)
    }

    /// Release the frame under the cursor and advance.
    fn pop_frame(&mut self) {
        if self.ping_head >= self.ping.len() {
            log::error!("no more frames to pop");
            return;
        }
        self.ping[self.ping_head] = None;
        self.ping_head += 1;
    }

    fn clear_ping(&mut self) {
        self.ping.clear();
        self.ping_head = 0;
    }
}

/// One open video substream with a seekable frame cursor.
pub struct Stream {
    video: VideoStreamInfo,
    timeline: Timeline,
    total_frames: i64,
    total_duration: i64,
    buffer_length: usize,
    state: Mutex<StreamState>,
}

impl Stream {
    /// Open `path` through `backend` and probe the stream geometry.
    ///
    /// Blocks until the backend has opened the container and the probes have
    /// resolved the start timestamp, frame total and duration, which may
    /// require reading from the input.
    pub fn open(
        backend: &dyn MediaBackend,
        path: impl AsRef<Path>,
        options: &StreamOptions,
    ) -> Result<Arc<Self>, StreamError> {
        let path = path.as_ref();
        let open_error = |source: MediaError| StreamError::Open {
            path: path.display().to_string(),
            source,
        };

        if options.buffer_length < 1 {
            return Err(open_error(MediaError::Open("buffer length must be at least 1".into())));
        }

        let MediaInput { mut demuxer, mut decoder, video, container_duration } =
            backend.open(path, options).map_err(open_error)?;

        if !video.time_base.is_positive() || !video.frame_rate.is_positive() {
            return Err(open_error(MediaError::Open(
                "stream declares no usable time base or frame rate".into(),
            )));
        }

        let start = probe::stream_start_time(demuxer.as_mut(), decoder.as_mut(), &video);
        let timeline = Timeline::new(video.time_base, video.frame_rate, start);
        let total_frames = probe::stream_frame_total(
            demuxer.as_mut(),
            decoder.as_mut(),
            &video,
            container_duration,
            &timeline,
        );
        let total_duration = probe::stream_duration(
            demuxer.as_mut(),
            decoder.as_mut(),
            &video,
            container_duration,
            &timeline,
        );

        log::debug!(
            "opened `{}`: {}x{}, {} frames, {} us, start timestamp {}",
            path.display(),
            video.width,
            video.height,
            total_frames,
            total_duration,
            start,
        );

        Ok(Arc::new(Self {
            timeline,
            total_frames,
            total_duration,
            buffer_length: options.buffer_length,
            state: Mutex::new(StreamState {
                demuxer,
                decoder,
                ping: Vec::with_capacity(options.buffer_length),
                pong: Vec::with_capacity(options.buffer_length),
                ping_head: 0,
                frame_seek_supported: true,
            }),
            video,
        }))
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    /// Look at the next frame without consuming it.
    ///
    /// `Ok(None)` is end of stream. Peeking twice returns the same frame.
    pub fn peek_next_frame(&self) -> Result<Option<Arc<Frame>>, StreamError> {
        let mut state = self.state.lock();
        self.peek_next(&mut state)
    }

    /// Consume and return the next frame. `Ok(None)` is end of stream.
    pub fn next_frame(&self) -> Result<Option<Arc<Frame>>, StreamError> {
        let mut state = self.state.lock();
        let frame = self.peek_next(&mut state)?;
        if frame.is_some() {
            state.pop_frame();
        }
        Ok(frame)
    }

    /// Consume a run of frames, returning the ones at the given offsets.
    ///
    /// Offsets are positions relative to the frame the cursor is on when the
    /// call starts: `[0, 5, 11]` returns that frame, the one five frames
    /// ahead of it, and the one eleven ahead of it, discarding everything in
    /// between. Offsets must be strictly ascending. `Ok(None)` means the
    /// stream ended before the run completed.
    pub fn next_frame_sequence(
        &self,
        offsets: &[i64],
    ) -> Result<Option<Vec<Arc<Frame>>>, StreamError> {
        let mut state = self.state.lock();
        let mut frames = Vec::with_capacity(offsets.len());
        let mut next = 0i64;
        for &offset in offsets {
            if offset < next {
                log::error!("frame sequence offsets must be in ascending order");
                return Err(StreamError::InvalidSequence);
            }
            for _ in next..offset {
                if self.peek_next(&mut state)?.is_none() {
                    return Ok(None);
                }
                state.pop_frame();
            }
            let Some(frame) = self.peek_next(&mut state)? else {
                return Ok(None);
            };
            state.pop_frame();
            frames.push(frame);
            next = offset + 1;
        }
        Ok(Some(frames))
    }

    // ------------------------------------------------------------------
    // Seeking
    // ------------------------------------------------------------------

    /// Position the cursor so the next frame covers `time` microseconds.
    pub fn seek_time(&self, time: i64) -> Result<(), StreamError> {
        let mut state = self.state.lock();
        self.seek_time_at(&mut state, time, false)
    }

    /// Position the cursor on frame index `frame`.
    ///
    /// Falls back to a time-based seek when the demuxer rejects frame-index
    /// seeking; the downgrade is permanent for this stream.
    pub fn seek_frame(&self, frame: i64) -> Result<(), StreamError> {
        let mut state = self.state.lock();
        self.seek_frame_at(&mut state, frame, false)
    }

    // ------------------------------------------------------------------
    // Geometry and conversions
    // ------------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.video.width
    }

    pub fn height(&self) -> u32 {
        self.video.height
    }

    /// Declared display aspect ratio, else width over height.
    pub fn aspect_ratio(&self) -> f64 {
        match self.video.display_aspect_ratio {
            Some(ratio) if ratio.num > 0 => ratio.as_f64(),
            _ => self.video.width as f64 / self.video.height as f64,
        }
    }

    pub fn total_frames(&self) -> i64 {
        self.total_frames
    }

    /// Total duration in microseconds.
    pub fn duration(&self) -> i64 {
        self.total_duration
    }

    pub fn frame_rate(&self) -> f64 {
        self.video.frame_rate.as_f64()
    }

    /// Display time of a single frame in microseconds.
    pub fn frame_time(&self) -> i64 {
        self.timeline.frame_to_time(1)
    }

    pub fn time_to_timestamp(&self, time: i64) -> i64 {
        self.timeline.time_to_timestamp(time)
    }

    pub fn timestamp_to_time(&self, timestamp: i64) -> i64 {
        self.timeline.timestamp_to_time(timestamp)
    }

    pub fn frame_to_timestamp(&self, frame: i64) -> i64 {
        self.timeline.frame_to_timestamp(frame)
    }

    pub fn timestamp_to_frame(&self, timestamp: i64) -> i64 {
        self.timeline.timestamp_to_frame(timestamp)
    }

    pub fn frame_to_time(&self, frame: i64) -> i64 {
        self.timeline.frame_to_time(frame)
    }

    pub fn time_to_frame(&self, time: i64) -> i64 {
        self.timeline.time_to_frame(time)
    }

    // ------------------------------------------------------------------
    // Internals (state lock held by the caller)
    // ------------------------------------------------------------------

    fn peek_next(&self, state: &mut StreamState) -> Result<Option<Arc<Frame>>, StreamError> {
        if state.ping_head == state.ping.len() {
            self.decode_next_block(state)?;
            std::mem::swap(&mut state.ping, &mut state.pong);
            state.ping_head = 0;
            state.pong.clear();
            if state.ping.is_empty() {
                log::error!("cannot get a new frame, end of stream reached");
                return Ok(None);
            }
        }
        Ok(state.ping[state.ping_head].clone())
    }

    /// Fill the write-side buffer with the next block of decoded frames.
    ///
    /// Returns `Ok` at end of container as well; the caller detects that
    /// case by the buffer coming back short or empty.
    fn decode_next_block(&self, state: &mut StreamState) -> Result<(), StreamError> {
        state.pong.clear();
        loop {
            let packet = match state.demuxer.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(()),
                Err(err) => {
                    log::error!("failed to retrieve a new packet: {err}");
                    return Err(StreamError::Decode(err));
                }
            };
            if packet.stream_index != self.video.index {
                continue;
            }
            if let Err(err) = state.decoder.send_packet(&packet) {
                log::error!("failed to send packet to decoder: {err}");
                return Err(StreamError::Decode(err));
            }
            loop {
                match state.decoder.receive_frame() {
                    Ok(Drain::Received(picture)) => {
                        let best = picture.best_effort_timestamp().unwrap_or(0);
                        let frame = Frame::new(
                            picture,
                            self.timeline.timestamp_to_time(best),
                            self.timeline.timestamp_to_frame(best),
                            self.video.display_aspect_ratio,
                        );
                        state.pong.push(Some(Arc::new(frame)));
                    }
                    Ok(Drain::Again) | Ok(Drain::Eof) => {
                        // The decoder may emit a few more frames than asked
                        // for when it flushes mid-block; they are already
                        // decoded, so keep them.
                        if state.pong.len() >= self.buffer_length {
                            return Ok(());
                        }
                        break;
                    }
                    Err(err) => {
                        log::error!("failed to receive decoded frame: {err}");
                        return Err(StreamError::Decode(err));
                    }
                }
            }
        }
    }

    /// Advance the cursor until the next peek is at or past `frame`.
    fn walk_to_frame(&self, state: &mut StreamState, frame: i64) -> Result<(), StreamError> {
        loop {
            let Some(peeked) = self.peek_next(state)? else {
                return Err(StreamError::Seek(frame));
            };
            if frame <= peeked.frame_number() {
                return Ok(());
            }
            state.pop_frame();
        }
    }

    fn seek_time_at(
        &self,
        state: &mut StreamState,
        time: i64,
        recursed: bool,
    ) -> Result<(), StreamError> {
        let bounds = match (state.front(), state.back()) {
            (Some(front), Some(back)) => Some((front.timestamp(), back.timestamp())),
            _ => None,
        };
        if let Some((front, back)) = bounds {
            if time >= front && time <= back {
                // Walk to the frame whose display interval covers the target.
                loop {
                    let Some(frame) = self.peek_next(state)? else {
                        return Err(StreamError::Seek(time));
                    };
                    let ts = frame.timestamp();
                    if time <= ts || (time > ts && time < ts + self.frame_time()) {
                        return Ok(());
                    }
                    state.pop_frame();
                }
            }
            if time > back {
                // A target only a few frames ahead is cheaper to decode
                // towards than to reposition the demuxer for.
                let range = self.timeline.frame_to_time(FORWARD_SEEK_FRAMES);
                if time <= back + range {
                    state.clear_ping();
                    if self.peek_next(state)?.is_none() {
                        return Err(StreamError::Seek(time));
                    }
                    return self.seek_time_at(state, time, true);
                }
            }
        }

        if recursed {
            log::error!("failed to seek to time {time}");
            return Err(StreamError::Seek(time));
        }

        state.decoder.flush();
        // The demuxer positions on absolute stream timestamps, so the start
        // offset goes on top of the converted target.
        let target = self.timeline.time_to_timestamp(time) + self.timeline.start_timestamp();
        if let Err(err) =
            state.demuxer.seek(self.video.index, i64::MIN, target, target, SeekFlags::default())
        {
            log::error!("failed to seek to time {time}: {err}");
            state.clear_ping();
            return Err(StreamError::Seek(time));
        }
        state.clear_ping();
        if self.peek_next(state)?.is_none() {
            return Err(StreamError::Seek(time));
        }
        self.seek_time_at(state, time, true)
    }

    fn seek_frame_at(
        &self,
        state: &mut StreamState,
        frame: i64,
        recursed: bool,
    ) -> Result<(), StreamError> {
        let bounds = match (state.front(), state.back()) {
            (Some(front), Some(back)) => Some((front.frame_number(), back.frame_number())),
            _ => None,
        };
        if let Some((front, back)) = bounds {
            if frame >= front && frame <= back {
                return self.walk_to_frame(state, frame);
            }
            if frame > back {
                let range = 2 * self.buffer_length as i64;
                if frame <= back + range {
                    return self.walk_to_frame(state, frame);
                }
            }
        }

        if recursed || !state.frame_seek_supported {
            if state.frame_seek_supported {
                state.frame_seek_supported = false;
                log::error!("failed to seek to frame {frame}, retrying using a time based seek");
            } else if recursed {
                return Err(StreamError::Seek(frame));
            }
            return self.seek_time_at(state, self.timeline.frame_to_time(frame), false);
        }

        state.decoder.flush();
        let target = frame + self.timeline.timestamp_to_frame(self.timeline.start_timestamp());
        if let Err(err) =
            state.demuxer.seek(self.video.index, i64::MIN, target, target, SeekFlags::BY_FRAME)
        {
            state.frame_seek_supported = false;
            log::error!("failed to seek to frame {frame}: {err}, retrying using a time based seek");
            state.clear_ping();
            return self.seek_time_at(state, self.timeline.frame_to_time(frame), false);
        }
        state.clear_ping();
        if self.peek_next(state)?.is_none() {
            return Err(StreamError::Seek(frame));
        }
        self.seek_frame_at(state, frame, true)
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("width", &self.video.width)
            .field("height", &self.video.height)
            .field("total_frames", &self.total_frames)
            .field("total_duration", &self.total_duration)
            .field("buffer_length", &self.buffer_length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::DecodeType;
    use crate::synth::{SynthBackend, SynthConfig, SynthCounters};

    fn open_with(
        config: SynthConfig,
        options: StreamOptions,
    ) -> (Arc<Stream>, Arc<SynthCounters>) {
        let backend = SynthBackend::new(config);
        let counters = backend.counters();
        let stream = Stream::open(&backend, "synth://clip", &options).expect("open stream");
        (stream, counters)
    }

    fn open_default() -> (Arc<Stream>, Arc<SynthCounters>) {
        open_with(SynthConfig::default(), StreamOptions::default())
    }

    #[test]
    fn reads_every_frame_then_reports_end() {
        let (stream, _) = open_default();
        assert_eq!(stream.total_frames(), 300);
        assert_eq!(stream.duration(), 10_000_000);

        let mut last = None;
        for _ in 0..300 {
            last = stream.next_frame().expect("read");
            assert!(last.is_some());
        }
        assert_eq!(last.expect("last frame").frame_number(), 299);
        assert!(stream.next_frame().expect("read").is_none());
        // End of stream is sticky.
        assert!(stream.next_frame().expect("read").is_none());
    }

    #[test]
    fn peek_is_idempotent_and_matches_next() {
        let (stream, _) = open_default();
        let first = stream.peek_next_frame().expect("peek").expect("frame");
        let second = stream.peek_next_frame().expect("peek").expect("frame");
        assert!(Arc::ptr_eq(&first, &second));

        let taken = stream.next_frame().expect("read").expect("frame");
        assert!(Arc::ptr_eq(&first, &taken));
        assert_eq!(taken.frame_number(), 0);
        assert_eq!(taken.timestamp(), 0);

        // The cursor advanced past the popped frame.
        let next = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(next.frame_number(), 1);
    }

    #[test]
    fn reads_are_monotone() {
        let (stream, _) = open_default();
        let mut expected = 0;
        let mut last_time = i64::MIN;
        while let Some(frame) = stream.next_frame().expect("read") {
            assert_eq!(frame.frame_number(), expected);
            assert!(frame.timestamp() >= last_time);
            expected += 1;
            last_time = frame.timestamp();
        }
        assert_eq!(expected, 300);
    }

    #[test]
    fn other_substreams_are_discarded() {
        let (stream, counters) = open_with(
            SynthConfig { interleave_audio: true, ..SynthConfig::default() },
            StreamOptions::default(),
        );
        let mut count = 0;
        while let Some(frame) = stream.next_frame().expect("read") {
            assert_eq!(frame.frame_number(), count);
            count += 1;
        }
        assert_eq!(count, 300);
        assert_eq!(counters.packets_read(), 600);
    }

    #[test]
    fn seek_frame_lands_on_exact_frame() {
        let (stream, _) = open_default();
        stream.seek_frame(150).expect("seek");
        let frame = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(frame.frame_number(), 150);
        assert_eq!(frame.timestamp(), 5_000_000);
    }

    #[test]
    fn seek_time_brackets_a_target_between_frames() {
        let (stream, _) = open_default();
        // 3_350_000 us falls between frame 100 and frame 101.
        stream.seek_time(3_350_000).expect("seek");
        let frame = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(frame.frame_number(), 100);
        assert!((frame.timestamp() - 3_350_000).abs() < stream.frame_time());
    }

    #[test]
    fn seek_to_current_position_is_a_noop() {
        let (stream, counters) = open_default();
        for _ in 0..5 {
            stream.next_frame().expect("read");
        }
        let seeks = counters.demux_seeks();
        stream.seek_frame(5).expect("seek");
        let frame = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(frame.frame_number(), 5);
        assert_eq!(counters.demux_seeks(), seeks);
    }

    #[test]
    fn nearby_seek_walks_the_buffer() {
        let (stream, counters) = open_default();
        stream.seek_frame(10).expect("seek");
        let seeks = counters.demux_seeks();
        stream.seek_frame(12).expect("seek");
        let frame = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(frame.frame_number(), 12);
        // Still inside the read buffer, so the demuxer was left alone.
        assert_eq!(counters.demux_seeks(), seeks);
    }

    #[test]
    fn short_forward_seek_decodes_instead_of_seeking() {
        let options = StreamOptions { buffer_length: 4, ..Default::default() };
        let (stream, counters) = open_with(SynthConfig::default(), options);

        stream.seek_frame(10).expect("seek");
        let seeks = counters.demux_seeks();

        // Within two buffer lengths of the last buffered frame: decode
        // forward.
        stream.seek_frame(16).expect("seek");
        let frame = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(frame.frame_number(), 16);
        assert_eq!(counters.demux_seeks(), seeks);

        // Far past the window: the demuxer has to move.
        stream.seek_frame(100).expect("seek");
        let frame = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(frame.frame_number(), 100);
        assert_eq!(counters.demux_seeks(), seeks + 1);
    }

    #[test]
    fn backward_seek_repositions_the_demuxer() {
        let (stream, counters) = open_default();
        stream.seek_frame(200).expect("seek");
        let seeks = counters.demux_seeks();
        stream.seek_frame(50).expect("seek");
        let frame = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(frame.frame_number(), 50);
        assert!(counters.demux_seeks() > seeks);
    }

    #[test]
    fn frame_seek_falls_back_to_time_and_latches() {
        let (stream, counters) = open_with(
            SynthConfig { support_frame_seek: false, ..SynthConfig::default() },
            StreamOptions::default(),
        );

        stream.seek_frame(100).expect("seek");
        let frame = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(frame.frame_number(), 100);
        assert_eq!(counters.frame_seeks(), 1);

        // The downgrade is permanent: no second frame-seek attempt.
        stream.seek_frame(200).expect("seek");
        let frame = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(frame.frame_number(), 200);
        assert_eq!(counters.frame_seeks(), 1);
    }

    #[test]
    fn frame_seek_matches_time_seek() {
        let (by_frame, _) = open_default();
        let (by_time, _) = open_default();
        for target in [3, 37, 137, 299] {
            by_frame.seek_frame(target).expect("seek");
            by_time.seek_time(by_time.frame_to_time(target)).expect("seek");
            let a = by_frame.peek_next_frame().expect("peek").expect("frame");
            let b = by_time.peek_next_frame().expect("peek").expect("frame");
            assert_eq!(a.frame_number(), target);
            assert_eq!(a.frame_number(), b.frame_number());
            assert_eq!(a.timestamp(), b.timestamp());
        }
    }

    #[test]
    fn sequence_matches_manual_walk() {
        let options = StreamOptions { buffer_length: 4, ..Default::default() };
        let (stream, _) = open_with(SynthConfig::default(), options.clone());
        let frames = stream
            .next_frame_sequence(&[0, 5, 11])
            .expect("sequence")
            .expect("frames");
        let numbers: Vec<i64> = frames.iter().map(|f| f.frame_number()).collect();

        // The same offsets walked by hand: pop to each index, take one.
        let (manual, _) = open_with(SynthConfig::default(), options);
        let mut expected = Vec::new();
        let mut cursor = 0i64;
        for offset in [0i64, 5, 11] {
            for _ in cursor..offset {
                manual.next_frame().expect("read").expect("frame");
            }
            expected.push(manual.next_frame().expect("read").expect("frame").frame_number());
            cursor = offset + 1;
        }
        assert_eq!(numbers, expected);
        assert_eq!(numbers, vec![0, 5, 11]);

        // The cursor continues after the sequence.
        let next = stream.peek_next_frame().expect("peek").expect("frame");
        assert_eq!(next.frame_number(), 12);
    }

    #[test]
    fn sequence_rejects_non_ascending_offsets() {
        let (stream, _) = open_default();
        let err = stream.next_frame_sequence(&[4, 2]).unwrap_err();
        assert!(matches!(err, StreamError::InvalidSequence));
        let err = stream.next_frame_sequence(&[3, 3]).unwrap_err();
        assert!(matches!(err, StreamError::InvalidSequence));
        let err = stream.next_frame_sequence(&[-1]).unwrap_err();
        assert!(matches!(err, StreamError::InvalidSequence));
    }

    #[test]
    fn sequence_past_the_end_reports_end_of_stream() {
        let (stream, _) = open_default();
        assert!(stream.next_frame_sequence(&[0, 400]).expect("sequence").is_none());
    }

    #[test]
    fn seeking_past_the_end_fails() {
        let (stream, _) = open_default();
        assert!(matches!(stream.seek_time(20_000_000), Err(StreamError::Seek(_))));
        assert!(matches!(stream.seek_frame(1_000), Err(StreamError::Seek(_))));
        // A failed seek leaves the stream usable; reads re-prime from the
        // demuxer's current position.
        assert!(stream.next_frame().expect("read").is_some());
    }

    #[test]
    fn read_failures_surface_as_decode_errors() {
        let (stream, _) = open_with(
            SynthConfig { fail_read_at: Some(0), ..SynthConfig::default() },
            StreamOptions::default(),
        );
        assert!(matches!(stream.next_frame(), Err(StreamError::Decode(_))));
        // The failure repeats rather than corrupting the cursor.
        assert!(matches!(stream.next_frame(), Err(StreamError::Decode(_))));
    }

    #[test]
    fn cuda_decoding_reports_device_memory() {
        let options = StreamOptions {
            decode: DecodeType::Cuda,
            output_host: false,
            ..Default::default()
        };
        let (stream, _) = open_with(SynthConfig::default(), options);
        let frame = stream.next_frame().expect("read").expect("frame");
        assert_eq!(frame.decode_type(), DecodeType::Cuda);
        assert!(frame.plane(0).is_none());

        // Downloading to host memory yields software frames instead.
        let options =
            StreamOptions { decode: DecodeType::Cuda, output_host: true, ..Default::default() };
        let (stream, _) = open_with(SynthConfig::default(), options);
        let frame = stream.next_frame().expect("read").expect("frame");
        assert_eq!(frame.decode_type(), DecodeType::Software);
        assert!(frame.plane(0).is_some());
    }

    #[test]
    fn stream_geometry_accessors() {
        let (stream, _) = open_default();
        assert_eq!(stream.width(), 64);
        assert_eq!(stream.height(), 48);
        assert!((stream.aspect_ratio() - 64.0 / 48.0).abs() < 1e-9);
        assert!((stream.frame_rate() - 30.0).abs() < 1e-9);
        assert_eq!(stream.frame_time(), 33_333);
        assert_eq!(stream.time_to_frame(stream.frame_to_time(42)), 42);
        assert_eq!(stream.timestamp_to_frame(stream.frame_to_timestamp(42)), 42);

        let (stream, _) = open_with(
            SynthConfig {
                display_aspect_ratio: Some(crate::rescale::Rational::new(16, 9)),
                ..SynthConfig::default()
            },
            StreamOptions::default(),
        );
        assert!((stream.aspect_ratio() - 16.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn zero_buffer_length_is_rejected() {
        let backend = SynthBackend::new(SynthConfig::default());
        let options = StreamOptions { buffer_length: 0, ..Default::default() };
        let err = Stream::open(&backend, "synth://clip", &options).unwrap_err();
        assert!(matches!(err, StreamError::Open { .. }));
    }
}
