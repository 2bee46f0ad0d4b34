//! # Reel Core
//!
//! Random-access video frame reading: open a container, pick the video
//! substream, and read, peek or seek individual frames by index or by
//! microsecond timestamp.

// ============================================================================
// Time Domains
// ============================================================================
pub mod rescale;
pub mod timing;

// ============================================================================
// Demuxer / Decoder Seam
// ============================================================================
pub mod media;
pub mod synth;

// ============================================================================
// Frame Cursor
// ============================================================================
pub mod frame;
pub mod stream;
mod probe;

// ============================================================================
// Process-Wide Services
// ============================================================================
pub mod logging;
pub mod manager;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
