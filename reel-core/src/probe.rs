//! One-shot stream probes run at open time.
//!
//! Containers are inconsistent about what they declare: the start timestamp,
//! frame count and duration may each be present, partially present, or
//! missing. These probes resolve all three before the stream is handed out,
//! falling back to scanning packets when the metadata is incomplete. A probe
//! that moves the demuxer read position restores it, so the first read after
//! opening still returns frame zero.

use crate::media::{Demuxer, SeekFlags, VideoDecoder, VideoStreamInfo};
use crate::rescale::{rescale, Rational};
use crate::timing::Timeline;

/// Container timestamp of the first presented frame.
///
/// Prefers the declared start time. Otherwise seeks to the head of the
/// stream and scans up to one codec delay's worth of packets for the
/// smallest presentation timestamp, defaulting to 0.
pub(crate) fn stream_start_time(
    demuxer: &mut dyn Demuxer,
    decoder: &mut dyn VideoDecoder,
    video: &VideoStreamInfo,
) -> i64 {
    if let Some(start) = video.start_time {
        return start;
    }

    decoder.flush();
    let start_dts = video.first_dts.map_or(0, |dts| dts.min(0));
    if demuxer.seek(video.index, i64::MIN, start_dts, i64::MAX, SeekFlags::BACKWARD).is_err() {
        log::error!("failed to determine stream start time");
        return 0;
    }

    // B-frame reordering can put the lowest timestamp a few packets in.
    let max_packets = decoder.codec_delay();
    let mut found: Option<i64> = None;
    let mut seen = 0;
    while seen < max_packets {
        match demuxer.read_packet() {
            Ok(Some(packet)) => {
                if packet.stream_index != video.index {
                    continue;
                }
                if let Some(pts) = packet.pts_or_dts() {
                    found = Some(found.map_or(pts, |current| current.min(pts)));
                }
                seen += 1;
            }
            Ok(None) | Err(_) => break,
        }
    }

    // Put the read position back so decoding starts at the head.
    let _ = demuxer.seek(video.index, i64::MIN, start_dts, i64::MAX, SeekFlags::BACKWARD);
    found.unwrap_or(0)
}

/// Number of frames in the substream.
pub(crate) fn stream_frame_total(
    demuxer: &mut dyn Demuxer,
    decoder: &mut dyn VideoDecoder,
    video: &VideoStreamInfo,
    container_duration: Option<i64>,
    timeline: &Timeline,
) -> i64 {
    // The start offset is doubled because the conversion subtracts it once.
    let start_correction = timeline.timestamp_to_frame(2 * timeline.start_timestamp());

    // The container-level duration can override the per-stream values, so it
    // is checked first. Its tick resolution makes the derived count drift,
    // though, so when it agrees with the declared frame count to within one
    // frame the declared count wins.
    if let Some(duration) = container_duration.filter(|d| *d > 0) {
        let frames = rescale(duration, video.frame_rate, Rational::new(1_000_000, 1));
        let declared = video.frame_count.unwrap_or(0);
        if (frames - declared).abs() > 1 {
            return frames - start_correction;
        }
    }

    if let Some(count) = video.frame_count.filter(|c| *c > 0) {
        return count - start_correction;
    }

    if let Some(duration) = video.duration.filter(|d| *d > 0) {
        return timeline.timestamp_to_frame(duration);
    }

    // Nothing declared: scan the tail of the stream for the last timestamp.
    match scan_last_timestamp(demuxer, decoder, video, timeline) {
        Some(last) => 1 + timeline.timestamp_to_frame(last),
        None => {
            log::error!("failed to determine the number of frames in the stream");
            0
        }
    }
}

/// Total duration of the substream in microseconds.
pub(crate) fn stream_duration(
    demuxer: &mut dyn Demuxer,
    decoder: &mut dyn VideoDecoder,
    video: &VideoStreamInfo,
    container_duration: Option<i64>,
    timeline: &Timeline,
) -> i64 {
    if let Some(duration) = container_duration.filter(|d| *d > 0) {
        // Doubled for the same reason as in the frame total.
        return duration - timeline.timestamp_to_time(2 * timeline.start_timestamp());
    }

    if let Some(duration) = video.duration.filter(|d| *d > 0) {
        return timeline.timestamp_to_time(duration);
    }

    match scan_last_timestamp(demuxer, decoder, video, timeline) {
        Some(last) => timeline.timestamp_to_time(last) + timeline.frame_to_time(1),
        None => {
            log::error!("failed to determine stream duration");
            0
        }
    }
}

/// Seek near the end of the stream and read to the last packet, returning
/// the largest presentation timestamp seen. Leaves the read position at the
/// start of the stream.
fn scan_last_timestamp(
    demuxer: &mut dyn Demuxer,
    decoder: &mut dyn VideoDecoder,
    video: &VideoStreamInfo,
    timeline: &Timeline,
) -> Option<i64> {
    decoder.flush();
    // An absurdly large frame index with the backward flag lands the demuxer
    // on the last keyframe.
    let landing = timeline.frame_to_timestamp(1 << 29);
    if let Err(err) = demuxer.seek(video.index, i64::MIN, landing, i64::MAX, SeekFlags::BACKWARD) {
        log::error!("failed to seek towards the end of the stream: {err}");
        return None;
    }

    let mut last = timeline.start_timestamp();
    loop {
        match demuxer.read_packet() {
            Ok(Some(packet)) => {
                if packet.stream_index != video.index {
                    continue;
                }
                if let Some(pts) = packet.pts_or_dts() {
                    last = last.max(pts);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    // Future reads must continue from frame zero.
    let _ = demuxer.seek(video.index, i64::MIN, 0, i64::MAX, SeekFlags::default());
    Some(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaBackend, StreamOptions};
    use crate::synth::{SynthBackend, SynthConfig};
    use std::path::Path;

    fn probe_all(config: SynthConfig) -> (i64, i64, i64) {
        let backend = SynthBackend::new(config);
        let mut input =
            backend.open(Path::new("synth://clip"), &StreamOptions::default()).expect("open");
        let start =
            stream_start_time(input.demuxer.as_mut(), input.decoder.as_mut(), &input.video);
        let timeline =
            Timeline::new(input.video.time_base, input.video.frame_rate, start);
        let frames = stream_frame_total(
            input.demuxer.as_mut(),
            input.decoder.as_mut(),
            &input.video,
            input.container_duration,
            &timeline,
        );
        let duration = stream_duration(
            input.demuxer.as_mut(),
            input.decoder.as_mut(),
            &input.video,
            input.container_duration,
            &timeline,
        );
        (start, frames, duration)
    }

    #[test]
    fn declared_metadata_is_used_directly() {
        let (start, frames, duration) = probe_all(SynthConfig::default());
        assert_eq!(start, 0);
        assert_eq!(frames, 300);
        assert_eq!(duration, 10_000_000);
    }

    #[test]
    fn start_time_is_probed_from_packets() {
        let backend = SynthBackend::new(SynthConfig {
            declare_start_time: false,
            start_pts: 1_024,
            decoder_delay: 2,
            b_frames: 1,
            ..SynthConfig::default()
        });
        let counters = backend.counters();
        let mut input =
            backend.open(Path::new("synth://clip"), &StreamOptions::default()).expect("open");
        let start =
            stream_start_time(input.demuxer.as_mut(), input.decoder.as_mut(), &input.video);
        assert_eq!(start, 1_024);
        // One seek to the head, one to restore the read position.
        assert_eq!(counters.demux_seeks(), 2);
        assert_eq!(counters.packets_read(), 3);

        // The restore leaves the next read at the first packet.
        let packet = input.demuxer.read_packet().expect("read").expect("packet");
        assert_eq!(packet.pts, Some(1_024));
    }

    #[test]
    fn frame_total_scans_when_nothing_is_declared() {
        let config = SynthConfig {
            declare_frame_count: false,
            declare_stream_duration: false,
            declare_container_duration: false,
            ..SynthConfig::default()
        };
        let (_, frames, duration) = probe_all(config);
        assert_eq!(frames, 300);
        assert_eq!(duration, 10_000_000);
    }

    #[test]
    fn container_duration_overrides_a_disagreeing_frame_count() {
        // The container claims twice the length the stream declares; the
        // container wins.
        let backend = SynthBackend::new(SynthConfig::default());
        let mut input =
            backend.open(Path::new("synth://clip"), &StreamOptions::default()).expect("open");
        input.container_duration = Some(20_000_000);
        let timeline =
            Timeline::new(input.video.time_base, input.video.frame_rate, 0);
        let frames = stream_frame_total(
            input.demuxer.as_mut(),
            input.decoder.as_mut(),
            &input.video,
            input.container_duration,
            &timeline,
        );
        assert_eq!(frames, 600);
    }

    #[test]
    fn stream_duration_is_used_when_container_is_silent() {
        let config = SynthConfig {
            declare_container_duration: false,
            ..SynthConfig::default()
        };
        let (_, frames, duration) = probe_all(config);
        // 300 frames declared, duration derived from stream ticks.
        assert_eq!(frames, 300);
        assert_eq!(duration, 10_000_000);
    }

    #[test]
    fn scan_restores_the_read_position() {
        let config = SynthConfig {
            declare_frame_count: false,
            declare_stream_duration: false,
            declare_container_duration: false,
            ..SynthConfig::default()
        };
        let backend = SynthBackend::new(config);
        let mut input =
            backend.open(Path::new("synth://clip"), &StreamOptions::default()).expect("open");
        let timeline = Timeline::new(input.video.time_base, input.video.frame_rate, 0);
        let _ = stream_frame_total(
            input.demuxer.as_mut(),
            input.decoder.as_mut(),
            &input.video,
            None,
            &timeline,
        );
        let packet = input.demuxer.read_packet().expect("read").expect("packet");
        assert_eq!(packet.pts, Some(0));
    }
}
