//! # Reel Probe
//!
//! Drives a reel-core stream through its read and seek paths against the
//! synthetic backend and reports per-frame timing. Useful for eyeballing
//! cursor overhead (buffer swaps, seek tiers) without any codec cost mixed
//! in.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use reel_core::media::{DecodeType, StreamOptions};
use reel_core::rescale::Rational;
use reel_core::stream::Stream;
use reel_core::synth::{SynthBackend, SynthConfig};

#[derive(Debug, Parser)]
#[command(name = "reel-probe", version, about = "Exercise and time the reel frame cursor")]
struct Args {
    /// Access pattern to run.
    #[arg(long, value_enum, default_value_t = Mode::Sequential)]
    mode: Mode,

    /// Frames in the synthetic stream.
    #[arg(long, default_value_t = 3_000)]
    frames: i64,

    /// Frame rate of the synthetic stream.
    #[arg(long, default_value_t = 30)]
    fps: i64,

    /// Keyframe interval of the synthetic stream.
    #[arg(long, default_value_t = 30)]
    gop: i64,

    /// Frames decoded per block.
    #[arg(long, default_value_t = 10)]
    buffer_length: usize,

    /// Frames to jump per step in seek mode, and the gap between sequence
    /// offsets in sequence mode.
    #[arg(long, default_value_t = 25)]
    stride: i64,

    /// Request CUDA decoding from the backend.
    #[arg(long)]
    cuda: bool,

    /// Emit the report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Mode {
    /// Read every frame front to back.
    Sequential,
    /// Seek forward by a fixed stride, reading one frame per step.
    Seek,
    /// Fetch frames through `next_frame_sequence` in strided batches.
    Sequence,
}

/// Summary of per-step timings in microseconds.
#[derive(Debug, Default, Serialize)]
struct TimingStats {
    count: u64,
    total_us: u64,
    min_us: u64,
    max_us: u64,
    mean_us: f64,
    p50_us: u64,
    p90_us: u64,
    p99_us: u64,
    steps_per_second: f64,
}

impl TimingStats {
    fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let count = sorted.len() as u64;
        let total: u64 = sorted.iter().sum();
        let percentile = |p: f64| {
            let rank = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
            sorted[rank]
        };
        Self {
            count,
            total_us: total,
            min_us: sorted[0],
            max_us: *sorted.last().unwrap_or(&0),
            mean_us: total as f64 / count as f64,
            p50_us: percentile(50.0),
            p90_us: percentile(90.0),
            p99_us: percentile(99.0),
            steps_per_second: if total > 0 { count as f64 * 1_000_000.0 / total as f64 } else { 0.0 },
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    mode: Mode,
    frames_read: u64,
    demux_seeks: u64,
    packets_read: u64,
    decoder_flushes: u64,
    timing: TimingStats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!(
        "reel-probe v{}: {:?} over {} frames, buffer length {}",
        reel_core::VERSION,
        args.mode,
        args.frames,
        args.buffer_length,
    );

    let config = SynthConfig {
        frame_rate: Rational::new(args.fps, 1),
        frame_count: args.frames,
        keyframe_interval: args.gop,
        ..SynthConfig::default()
    };
    let backend = SynthBackend::new(config);
    let counters = backend.counters();
    let options = StreamOptions {
        buffer_length: args.buffer_length,
        decode: if args.cuda { DecodeType::Cuda } else { DecodeType::Software },
        output_host: true,
    };
    let stream =
        Stream::open(&backend, "synth://probe", &options).context("failed to open stream")?;
    tracing::info!(
        "stream: {}x{} @ {:.2} fps, {} frames, {} us",
        stream.width(),
        stream.height(),
        stream.frame_rate(),
        stream.total_frames(),
        stream.duration(),
    );

    let (samples, frames_read) = match args.mode {
        Mode::Sequential => run_sequential(&stream)?,
        Mode::Seek => run_seek(&stream, args.stride)?,
        Mode::Sequence => run_sequence(&stream, args.stride)?,
    };

    let report = Report {
        mode: args.mode,
        frames_read,
        demux_seeks: counters.demux_seeks(),
        packets_read: counters.packets_read(),
        decoder_flushes: counters.decoder_flushes(),
        timing: TimingStats::from_samples(&samples),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Read every frame once; one sample per frame.
fn run_sequential(stream: &Stream) -> Result<(Vec<u64>, u64)> {
    let mut samples = Vec::new();
    let mut frames_read = 0;
    loop {
        let begin = Instant::now();
        let frame = stream.next_frame().context("read failed")?;
        let elapsed = begin.elapsed().as_micros() as u64;
        match frame {
            Some(_) => {
                samples.push(elapsed);
                frames_read += 1;
            }
            None => break,
        }
    }
    Ok((samples, frames_read))
}

/// Seek forward by `stride` frames per step, reading one frame each time.
fn run_seek(stream: &Stream, stride: i64) -> Result<(Vec<u64>, u64)> {
    let mut samples = Vec::new();
    let mut frames_read = 0;
    let mut position = 0;
    while position < stream.total_frames() {
        let begin = Instant::now();
        stream.seek_frame(position).context("seek failed")?;
        let frame = stream.next_frame().context("read failed")?;
        samples.push(begin.elapsed().as_micros() as u64);
        if frame.is_none() {
            break;
        }
        frames_read += 1;
        position += stride;
    }
    Ok((samples, frames_read))
}

/// Fetch strided batches of frames through the sequence call.
fn run_sequence(stream: &Stream, stride: i64) -> Result<(Vec<u64>, u64)> {
    const BATCH: i64 = 8;
    let mut samples = Vec::new();
    let mut frames_read = 0;
    let mut remaining = stream.total_frames();
    while remaining >= BATCH * stride.max(1) {
        let offsets: Vec<i64> = (0..BATCH).map(|i| i * stride.max(1)).collect();
        let begin = Instant::now();
        let frames = stream.next_frame_sequence(&offsets).context("sequence failed")?;
        samples.push(begin.elapsed().as_micros() as u64);
        match frames {
            Some(frames) => frames_read += frames.len() as u64,
            None => break,
        }
        // The sequence consumed everything up to its last offset.
        remaining -= (BATCH - 1) * stride.max(1) + 1;
    }
    Ok((samples, frames_read))
}

fn print_report(report: &Report) {
    println!("mode:            {:?}", report.mode);
    println!("frames read:     {}", report.frames_read);
    println!("demuxer seeks:   {}", report.demux_seeks);
    println!("packets read:    {}", report.packets_read);
    println!("decoder flushes: {}", report.decoder_flushes);
    let t = &report.timing;
    println!("steps:           {}", t.count);
    println!(
        "step time us:    min {} / p50 {} / p90 {} / p99 {} / max {} (mean {:.1})",
        t.min_us, t.p50_us, t.p90_us, t.p99_us, t.max_us, t.mean_us,
    );
    println!("steps/s:         {:.0}", t.steps_per_second);
}
