//! Synthetic media backend.
//!
//! A fully scripted container and decoder pair: a configurable frame count,
//! frame rate, start offset, GOP length and decoder latency, with no codec
//! work behind it. The tests drive every cursor and seek path against this
//! backend, and `reel-probe` uses it to benchmark the reader without needing
//! media files. Counters record demuxer and decoder activity so tests can
//! assert which seek tier actually ran.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::media::{
    DecodeType, DecodedPicture, Demuxer, Drain, MediaBackend, MediaError, MediaInput, Packet,
    PixelFormat, Plane, SeekFlags, StreamOptions, VideoDecoder, VideoStreamInfo,
};
use crate::rescale::{rescale, Rational};

/// Shape of the scripted stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    pub time_base: Rational,
    pub frame_rate: Rational,
    pub frame_count: i64,
    /// Presentation timestamp of frame 0, in container ticks.
    pub start_pts: i64,
    pub keyframe_interval: i64,
    /// Packets the decoder buffers before emitting its first picture.
    pub decoder_delay: i32,
    pub b_frames: i32,
    pub declare_start_time: bool,
    pub declare_frame_count: bool,
    pub declare_stream_duration: bool,
    pub declare_container_duration: bool,
    /// Interleave a second, non-video substream between video packets.
    pub interleave_audio: bool,
    /// Whether the demuxer accepts frame-index seeks.
    pub support_frame_seek: bool,
    /// Fail every packet read once this many have been served.
    pub fail_read_at: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub display_aspect_ratio: Option<Rational>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            time_base: Rational::new(1, 15_360),
            frame_rate: Rational::new(30, 1),
            frame_count: 300,
            start_pts: 0,
            keyframe_interval: 30,
            decoder_delay: 0,
            b_frames: 0,
            declare_start_time: true,
            declare_frame_count: true,
            declare_stream_duration: true,
            declare_container_duration: true,
            interleave_audio: false,
            support_frame_seek: true,
            fail_read_at: None,
            width: 64,
            height: 48,
            display_aspect_ratio: None,
        }
    }
}

impl SynthConfig {
    fn ticks_per_frame(&self) -> i64 {
        rescale(1, self.frame_rate.inverse(), self.time_base)
    }

    fn pts_of(&self, frame: i64) -> i64 {
        self.start_pts + frame * self.ticks_per_frame()
    }

    /// Frame whose display interval contains `ts`, clamped to the stream.
    fn frame_at_or_before(&self, ts: i64) -> i64 {
        let frame = (ts - self.start_pts).div_euclid(self.ticks_per_frame());
        frame.clamp(0, self.frame_count - 1)
    }

    fn keyframe_of(&self, frame: i64) -> i64 {
        frame - frame.rem_euclid(self.keyframe_interval)
    }

    fn packets_per_frame(&self) -> i64 {
        if self.interleave_audio {
            2
        } else {
            1
        }
    }

    fn total_packets(&self) -> i64 {
        self.frame_count * self.packets_per_frame()
    }
}

/// Activity counters shared by a backend and everything it opens.
#[derive(Debug, Default)]
pub struct SynthCounters {
    demux_seeks: AtomicU64,
    frame_seeks: AtomicU64,
    packets_read: AtomicU64,
    decoder_flushes: AtomicU64,
    opens: AtomicU64,
}

impl SynthCounters {
    pub fn demux_seeks(&self) -> u64 {
        self.demux_seeks.load(Ordering::Relaxed)
    }

    pub fn frame_seeks(&self) -> u64 {
        self.frame_seeks.load(Ordering::Relaxed)
    }

    pub fn packets_read(&self) -> u64 {
        self.packets_read.load(Ordering::Relaxed)
    }

    pub fn decoder_flushes(&self) -> u64 {
        self.decoder_flushes.load(Ordering::Relaxed)
    }

    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }
}

/// Scripted [`MediaBackend`].
pub struct SynthBackend {
    config: SynthConfig,
    counters: Arc<SynthCounters>,
}

impl SynthBackend {
    pub fn new(config: SynthConfig) -> Self {
        Self { config, counters: Arc::new(SynthCounters::default()) }
    }

    pub fn counters(&self) -> Arc<SynthCounters> {
        Arc::clone(&self.counters)
    }
}

impl MediaBackend for SynthBackend {
    fn open(&self, _path: &Path, options: &StreamOptions) -> Result<MediaInput, MediaError> {
        if options.buffer_length == 0 {
            return Err(MediaError::Open("buffer length must be at least 1".into()));
        }
        if self.config.frame_count <= 0 || self.config.keyframe_interval <= 0 {
            return Err(MediaError::Open("scripted stream must contain frames".into()));
        }
        if self.config.ticks_per_frame() <= 0 {
            return Err(MediaError::Open(
                "time base is too coarse for the configured frame rate".into(),
            ));
        }
        self.counters.opens.fetch_add(1, Ordering::Relaxed);

        let script = Arc::new(self.config.clone());
        let pixel_format = match options.decode {
            DecodeType::Software => PixelFormat::Yuv420p,
            DecodeType::Cuda => PixelFormat::Nv12,
        };
        let video = VideoStreamInfo {
            index: 0,
            time_base: script.time_base,
            frame_rate: script.frame_rate,
            start_time: script.declare_start_time.then_some(script.start_pts),
            first_dts: Some(script.start_pts),
            frame_count: script.declare_frame_count.then_some(script.frame_count),
            duration: script
                .declare_stream_duration
                .then(|| script.frame_count * script.ticks_per_frame()),
            width: script.width,
            height: script.height,
            display_aspect_ratio: script.display_aspect_ratio,
            pixel_format,
        };
        let container_duration = script
            .declare_container_duration
            .then(|| rescale(script.frame_count, Rational::new(1_000_000, 1), script.frame_rate));

        Ok(MediaInput {
            demuxer: Box::new(SynthDemuxer {
                script: Arc::clone(&script),
                cursor: 0,
                reads: 0,
                counters: Arc::clone(&self.counters),
            }),
            decoder: Box::new(SynthDecoder {
                script,
                pending: VecDeque::new(),
                pixel_format,
                decode_type: options.decode,
                output_host: options.output_host,
                counters: Arc::clone(&self.counters),
            }),
            video,
            container_duration,
        })
    }
}

struct SynthDemuxer {
    script: Arc<SynthConfig>,
    /// Index into the interleaved packet sequence.
    cursor: i64,
    reads: u64,
    counters: Arc<SynthCounters>,
}

impl Demuxer for SynthDemuxer {
    fn read_packet(&mut self) -> Result<Option<Packet>, MediaError> {
        if let Some(fail_at) = self.script.fail_read_at {
            if self.reads >= fail_at {
                return Err(MediaError::Demux("scripted read failure".into()));
            }
        }
        if self.cursor >= self.script.total_packets() {
            return Ok(None);
        }
        self.reads += 1;
        self.counters.packets_read.fetch_add(1, Ordering::Relaxed);

        let per_frame = self.script.packets_per_frame();
        let frame = self.cursor / per_frame;
        let is_audio = self.script.interleave_audio && self.cursor % per_frame == 1;
        self.cursor += 1;

        let pts = self.script.pts_of(frame);
        Ok(Some(Packet {
            stream_index: if is_audio { 1 } else { 0 },
            pts: Some(pts),
            dts: Some(pts),
            data: Vec::new(),
        }))
    }

    fn seek(
        &mut self,
        _stream_index: usize,
        _min_ts: i64,
        ts: i64,
        _max_ts: i64,
        flags: SeekFlags,
    ) -> Result<(), MediaError> {
        self.counters.demux_seeks.fetch_add(1, Ordering::Relaxed);

        let frame = if flags.by_frame {
            self.counters.frame_seeks.fetch_add(1, Ordering::Relaxed);
            if !self.script.support_frame_seek {
                return Err(MediaError::Unsupported("frame-index seeking".into()));
            }
            if ts < 0 {
                return Err(MediaError::Seek(format!("negative frame index {ts}")));
            }
            if ts >= self.script.frame_count {
                return Err(MediaError::Seek(format!("frame {ts} is beyond the stream")));
            }
            ts
        } else {
            if ts < 0 && !flags.backward {
                return Err(MediaError::Seek(format!("negative timestamp {ts}")));
            }
            self.script.frame_at_or_before(ts)
        };

        let keyframe = self.script.keyframe_of(frame);
        self.cursor = keyframe * self.script.packets_per_frame();
        Ok(())
    }
}

struct SynthDecoder {
    script: Arc<SynthConfig>,
    pending: VecDeque<i64>,
    pixel_format: PixelFormat,
    decode_type: DecodeType,
    output_host: bool,
    counters: Arc<SynthCounters>,
}

impl VideoDecoder for SynthDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<(), MediaError> {
        if packet.stream_index != 0 {
            return Err(MediaError::Decode("packet belongs to another substream".into()));
        }
        match packet.pts_or_dts() {
            Some(pts) => self.pending.push_back(pts),
            None => return Err(MediaError::Decode("packet carries no timestamp".into())),
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Drain, MediaError> {
        if self.pending.len() > self.script.decoder_delay.max(0) as usize {
            let pts = self.pending.pop_front();
            let Some(pts) = pts else {
                return Ok(Drain::Again);
            };
            let picture = if self.decode_type == DecodeType::Cuda && !self.output_host {
                SynthPicture::device(pts, self.script.width, self.script.height, self.pixel_format)
            } else {
                SynthPicture::host(pts, self.script.width, self.script.height, self.pixel_format)
            };
            return Ok(Drain::Received(Box::new(picture)));
        }
        Ok(Drain::Again)
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.counters.decoder_flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn delay(&self) -> i32 {
        self.script.decoder_delay
    }

    fn uses_delay(&self) -> bool {
        self.script.decoder_delay > 0
    }

    fn has_b_frames(&self) -> i32 {
        self.script.b_frames
    }
}

/// A scripted decoded picture with deterministic plane contents.
pub struct SynthPicture {
    pts: i64,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    decode_type: DecodeType,
    planes: Vec<(Vec<u8>, usize)>,
}

impl SynthPicture {
    pub fn host(pts: i64, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let (w, h) = (width as usize, height as usize);
        let fill = (pts.rem_euclid(251)) as u8;
        let planes: Vec<(Vec<u8>, usize)> = match pixel_format {
            PixelFormat::Yuv420p => vec![
                (vec![fill; w * h], w),
                (vec![128; (w / 2) * (h / 2)], w / 2),
                (vec![128; (w / 2) * (h / 2)], w / 2),
            ],
            PixelFormat::Nv12 | PixelFormat::P010 => {
                vec![(vec![fill; w * h], w), (vec![128; w * (h / 2)], w)]
            }
            PixelFormat::Rgb24 => vec![(vec![fill; w * h * 3], w * 3)],
            PixelFormat::Rgba => vec![(vec![fill; w * h * 4], w * 4)],
        };
        Self { pts, width, height, pixel_format, decode_type: DecodeType::Software, planes }
    }

    pub fn device(pts: i64, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self { pts, width, height, pixel_format, decode_type: DecodeType::Cuda, planes: Vec::new() }
    }
}

impl DecodedPicture for SynthPicture {
    fn best_effort_timestamp(&self) -> Option<i64> {
        Some(self.pts)
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn plane_count(&self) -> usize {
        self.pixel_format.plane_count()
    }

    fn plane(&self, index: usize) -> Option<Plane<'_>> {
        let (data, stride) = self.planes.get(index)?;
        Some(Plane { data: data.as_slice(), stride: *stride })
    }

    fn decode_type(&self) -> DecodeType {
        self.decode_type
    }
}
