//! Synthetic recorder: renders a moving test pattern (and optionally a sine
//! tone) into any supported format.
//!
//! Usage:
//!   framecorder-record [options]
//!
//! Options:
//!   --format <fmt>          mp4 | hevc | gif | webm | wav | jpeg (default: gif)
//!   --output-dir <dir>      Output directory (default: .)
//!   --width <px>            Frame width (default: 320)
//!   --height <px>           Frame height (default: 240)
//!   --fps <rate>            Frame rate (default: 30)
//!   --frames <n>            Frames to record (default: 90)
//!   --audio                 Add a 440 Hz stereo tone at 48 kHz

use std::f32::consts::TAU;

use anyhow::{bail, Result};
use framecorder::{recording_path, Clock, FixedIntervalClock, Format, RecorderFactory, RecordingConfig};

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u32 = 2;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

struct Args {
    format: Format,
    output_dir: String,
    width: u32,
    height: u32,
    fps: f32,
    frames: u32,
    audio: bool,
}

fn parse_format(name: &str) -> Option<Format> {
    match name.to_ascii_lowercase().as_str() {
        "mp4" => Some(Format::Mp4),
        "hevc" => Some(Format::Hevc),
        "gif" => Some(Format::Gif),
        "webm" => Some(Format::Webm),
        "wav" => Some(Format::Wav),
        "jpeg" | "jpg" => Some(Format::Jpeg),
        _ => None,
    }
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        format: Format::Gif,
        output_dir: ".".to_string(),
        width: 320,
        height: 240,
        fps: 30.0,
        frames: 90,
        audio: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--format" if i + 1 < args.len() => {
                parsed.format = match parse_format(&args[i + 1]) {
                    Some(format) => format,
                    None => bail!("unknown format '{}'", args[i + 1]),
                };
                i += 2;
            }
            "--output-dir" if i + 1 < args.len() => {
                parsed.output_dir = args[i + 1].clone();
                i += 2;
            }
            "--width" if i + 1 < args.len() => {
                parsed.width = args[i + 1].parse()?;
                i += 2;
            }
            "--height" if i + 1 < args.len() => {
                parsed.height = args[i + 1].parse()?;
                i += 2;
            }
            "--fps" if i + 1 < args.len() => {
                parsed.fps = args[i + 1].parse()?;
                i += 2;
            }
            "--frames" if i + 1 < args.len() => {
                parsed.frames = args[i + 1].parse()?;
                i += 2;
            }
            "--audio" => {
                parsed.audio = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }
    Ok(parsed)
}

fn print_usage() {
    println!("framecorder-record: renders a synthetic clip to disk");
    println!();
    println!("Usage: framecorder-record [options]");
    println!();
    println!("Options:");
    println!("  --format <fmt>          mp4 | hevc | gif | webm | wav | jpeg (default: gif)");
    println!("  --output-dir <dir>      Output directory (default: .)");
    println!("  --width <px>            Frame width (default: 320)");
    println!("  --height <px>           Frame height (default: 240)");
    println!("  --fps <rate>            Frame rate (default: 30)");
    println!("  --frames <n>            Frames to record (default: 90)");
    println!("  --audio                 Add a 440 Hz stereo tone at 48 kHz");
    println!();
    println!("Examples:");
    println!("  framecorder-record --format gif --frames 30");
    println!("  framecorder-record --format wav --audio --frames 300");
}

// ---------------------------------------------------------------------------
// Synthetic media
// ---------------------------------------------------------------------------

/// Diagonal gradient scrolling one pixel per frame.
fn render_frame(width: u32, height: u32, index: u32, pixels: &mut [u8]) {
    for y in 0..height {
        for x in 0..width {
            let offset = ((y * width + x) * 4) as usize;
            let phase = (x + y + index * 4) % 256;
            pixels[offset] = phase as u8;
            pixels[offset + 1] = (255 - phase) as u8;
            pixels[offset + 2] = ((index * 3) % 256) as u8;
            pixels[offset + 3] = 255;
        }
    }
}

/// Interleaved stereo sine block starting at PCM frame `start`.
fn render_tone(start: u64, frames: usize) -> Vec<f32> {
    let mut samples = Vec::with_capacity(frames * CHANNELS as usize);
    for n in 0..frames as u64 {
        let t = (start + n) as f32 / SAMPLE_RATE as f32;
        let value = 0.25 * (TAU * 440.0 * t).sin();
        samples.extend(std::iter::repeat(value).take(CHANNELS as usize));
    }
    samples
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("framecorder=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let args = parse_args()?;
    let extension = args.format.extension().unwrap_or("");
    let path = recording_path(&args.output_dir, extension);

    let mut config = RecordingConfig::new(&path)
        .size(args.width, args.height)
        .frame_rate(args.fps)
        .frame_delay(1.0 / args.fps);
    let with_audio = args.audio || args.format == Format::Wav;
    if with_audio {
        config = config.audio(SAMPLE_RATE, CHANNELS);
    }

    let factory = RecorderFactory::new();
    let session = factory.create(args.format, config)?;
    tracing::info!("Recording {} frames to {}", args.frames, path.display());

    let clock = FixedIntervalClock::new(args.fps);
    let block_frames = (SAMPLE_RATE as f32 / args.fps).round() as usize;
    let mut pixels = vec![0u8; args.width as usize * args.height as usize * 4];
    let mut audio_position = 0u64;

    for index in 0..args.frames {
        let timestamp = clock.timestamp();
        if args.format != Format::Wav {
            render_frame(args.width, args.height, index, &mut pixels);
            session.commit_frame(&pixels, timestamp)?;
        }
        if with_audio {
            session.commit_samples(&render_tone(audio_position, block_frames), timestamp)?;
            audio_position += block_frames as u64;
        }
    }

    let stats = session.stats();
    tracing::info!(
        "Committed {} samples ({} dropped, {} queued)",
        stats.committed,
        stats.dropped,
        stats.queued
    );

    match session.finish()?.await {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => bail!("recording failed"),
    }
}
