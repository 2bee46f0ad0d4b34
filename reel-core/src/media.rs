//! Demuxer and decoder seam.
//!
//! The reader core does not link a container or codec library directly.
//! Everything it needs from one — packet demuxing, decode, flush, seeking,
//! stream metadata — is expressed as the traits below, and a backend
//! (FFmpeg-style bindings, a hardware pipeline, or the synthetic source used
//! by the tests and the probe harness) supplies the implementation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rescale::Rational;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to open input: {0}")]
    Open(String),
    #[error("demuxer error: {0}")]
    Demux(String),
    #[error("decoder error: {0}")]
    Decode(String),
    #[error("seek rejected: {0}")]
    Seek(String),
    #[error("not supported: {0}")]
    Unsupported(String),
}

/// Pixel layout of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Nv12,
    Yuv420p,
    P010,
    Rgb24,
    Rgba,
}

impl PixelFormat {
    pub fn plane_count(self) -> usize {
        match self {
            Self::Nv12 | Self::P010 => 2,
            Self::Yuv420p => 3,
            Self::Rgb24 | Self::Rgba => 1,
        }
    }
}

/// Where decoded picture memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeType {
    Software,
    Cuda,
}

/// Decoder selection and buffering options for one stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Target number of frames decoded per block. Must be at least 1.
    pub buffer_length: usize,
    /// Decoder backend to request from the opener.
    pub decode: DecodeType,
    /// When decoding on a device, download frames to host memory.
    pub output_host: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self { buffer_length: 10, decode: DecodeType::Software, output_host: true }
    }
}

/// One compressed packet as read from the container.
#[derive(Debug, Clone)]
pub struct Packet {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub data: Vec<u8>,
}

impl Packet {
    /// Presentation timestamp, falling back to the decode timestamp.
    pub fn pts_or_dts(&self) -> Option<i64> {
        self.pts.or(self.dts)
    }
}

/// Flags accepted by [`Demuxer::seek`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekFlags {
    /// Land on or before the requested position.
    pub backward: bool,
    /// The requested position is a frame index, not a timestamp.
    pub by_frame: bool,
}

impl SeekFlags {
    pub const BACKWARD: Self = Self { backward: true, by_frame: false };
    pub const BY_FRAME: Self = Self { backward: false, by_frame: true };
}

/// Packet source for one open container.
pub trait Demuxer: Send {
    /// Read the next packet in decode order. `Ok(None)` is end of container.
    fn read_packet(&mut self) -> Result<Option<Packet>, MediaError>;

    /// Reposition the read cursor. `ts` is in container ticks of
    /// `stream_index` unless `flags.by_frame` is set, in which case it is a
    /// frame index. `min_ts`/`max_ts` bound the position the demuxer may
    /// choose.
    fn seek(
        &mut self,
        stream_index: usize,
        min_ts: i64,
        ts: i64,
        max_ts: i64,
        flags: SeekFlags,
    ) -> Result<(), MediaError>;
}

/// A decoded picture owned by the decoder backend.
///
/// Released exactly once, when the box is dropped.
pub trait DecodedPicture: Send + Sync {
    /// Best-effort presentation timestamp in container ticks.
    fn best_effort_timestamp(&self) -> Option<i64>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn pixel_format(&self) -> PixelFormat;
    fn plane_count(&self) -> usize;
    /// Plane data and stride. `None` when the plane lives in device memory.
    fn plane(&self, index: usize) -> Option<Plane<'_>>;
    fn decode_type(&self) -> DecodeType;
}

/// Borrowed view of one picture plane.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

/// Result of draining one picture from the decoder.
pub enum Drain {
    Received(Box<dyn DecodedPicture>),
    /// The decoder needs more packets before it can emit a picture.
    Again,
    Eof,
}

/// Decoder for one selected substream.
pub trait VideoDecoder: Send {
    fn send_packet(&mut self, packet: &Packet) -> Result<(), MediaError>;
    fn receive_frame(&mut self) -> Result<Drain, MediaError>;
    /// Drop all buffered decoder state, e.g. around a demuxer seek.
    fn flush(&mut self);

    /// Declared decoder latency in packets.
    fn delay(&self) -> i32;
    /// Whether the codec advertises the delay capability.
    fn uses_delay(&self) -> bool;
    /// Declared number of B-frames in the reorder window.
    fn has_b_frames(&self) -> i32;

    /// Upper bound on packets consumed before the first picture appears.
    fn codec_delay(&self) -> i32 {
        let delay = if self.uses_delay() { self.delay() } else { 0 };
        (delay + self.has_b_frames()).max(1)
    }
}

/// Metadata of the selected video substream, as declared by the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub time_base: Rational,
    pub frame_rate: Rational,
    /// Declared timestamp of the first presented frame, when known.
    pub start_time: Option<i64>,
    /// Decode timestamp of the first packet, when known.
    pub first_dts: Option<i64>,
    /// Declared frame count, when known.
    pub frame_count: Option<i64>,
    /// Declared substream duration in container ticks, when known.
    pub duration: Option<i64>,
    pub width: u32,
    pub height: u32,
    /// Declared display aspect ratio, when the container carries one.
    pub display_aspect_ratio: Option<Rational>,
    pub pixel_format: PixelFormat,
}

/// Everything the reader needs from one opened file.
pub struct MediaInput {
    pub demuxer: Box<dyn Demuxer>,
    pub decoder: Box<dyn VideoDecoder>,
    pub video: VideoStreamInfo,
    /// Container-level duration in microseconds, when declared.
    pub container_duration: Option<i64>,
}

/// Opens containers and selects + configures a video decoder for them.
pub trait MediaBackend: Send + Sync {
    fn open(&self, path: &Path, options: &StreamOptions) -> Result<MediaInput, MediaError>;
}
