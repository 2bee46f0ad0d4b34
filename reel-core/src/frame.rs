//! Decoded frame carrier.

use crate::media::{DecodeType, DecodedPicture, PixelFormat, Plane};
use crate::rescale::Rational;

/// One decoded video frame with its derived position on the stream timeline.
///
/// Frames are immutable. The decoder-owned picture memory is released when
/// the last holder drops the frame.
pub struct Frame {
    picture: Box<dyn DecodedPicture>,
    timestamp: i64,
    frame_number: i64,
    display_aspect_ratio: Option<Rational>,
}

impl Frame {
    pub(crate) fn new(
        picture: Box<dyn DecodedPicture>,
        timestamp: i64,
        frame_number: i64,
        display_aspect_ratio: Option<Rational>,
    ) -> Self {
        Self { picture, timestamp, frame_number, display_aspect_ratio }
    }

    /// Presentation time in microseconds from the start of the stream.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Zero-based index of this frame in presentation order.
    pub fn frame_number(&self) -> i64 {
        self.frame_number
    }

    pub fn width(&self) -> u32 {
        self.picture.width()
    }

    pub fn height(&self) -> u32 {
        self.picture.height()
    }

    /// Display aspect ratio declared by the container, else width over
    /// height.
    pub fn aspect_ratio(&self) -> f64 {
        match self.display_aspect_ratio {
            Some(ratio) if ratio.num > 0 => ratio.as_f64(),
            _ => self.width() as f64 / self.height() as f64,
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.picture.pixel_format()
    }

    pub fn plane_count(&self) -> usize {
        self.picture.plane_count()
    }

    /// Data and stride for one plane. `None` for planes in device memory.
    pub fn plane(&self, index: usize) -> Option<Plane<'_>> {
        self.picture.plane(index)
    }

    /// Whether the picture lives in host or CUDA memory.
    pub fn decode_type(&self) -> DecodeType {
        self.picture.decode_type()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("frame_number", &self.frame_number)
            .field("timestamp", &self.timestamp)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("pixel_format", &self.pixel_format())
            .finish()
    }
}
