//! sBitx IQ streamer
//!
//! Captures the radio's IF, converts it to 48 kHz complex baseband and writes
//! little-endian interleaved f32 I/Q to stdout.
//!
//! Usage: `sbitx-iq [--list-devices] [config.toml]`

use anyhow::{Context, Result};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sbitx_iq::{
    config::AppConfig,
    constants::*,
    device::{Direction, SbitxDevice},
    dsp::ComplexSample,
    error::StreamError,
};

/// Samples requested per read
const READ_CHUNK: usize = 4096;

const READ_TIMEOUT: Duration = Duration::from_millis(100);

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries samples
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        if arg == "--list-devices" {
            list_devices();
            return Ok(());
        }
        config_path = Some(PathBuf::from(arg));
    }
    let config = AppConfig::load_or_default(config_path.as_deref()).context("loading configuration")?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping");
            flag.store(false, Ordering::SeqCst);
        }
    });

    tokio::task::spawn_blocking(move || stream_to_stdout(config, &running))
        .await
        .context("streaming task panicked")?
}

fn stream_to_stdout(config: AppConfig, running: &AtomicBool) -> Result<()> {
    let mut device = SbitxDevice::new(config.stream);
    let stream = device.setup_stream(Direction::Rx, FORMAT_CF32, &[0])?;
    device.activate_stream(&stream)?;

    let mut out = BufWriter::new(io::stdout().lock());
    let mut samples = vec![ComplexSample::default(); READ_CHUNK];
    let mut bytes = Vec::with_capacity(READ_CHUNK * 8);
    let mut written: u64 = 0;
    let mut timeouts: u64 = 0;
    let mut last_stats = Instant::now();

    tracing::info!("Streaming CF32 at {} sps to stdout - press Ctrl+C to stop", OUTPUT_SAMPLE_RATE);

    let result = loop {
        if !running.load(Ordering::SeqCst) {
            break Ok(());
        }

        match device.read_stream(&stream, &mut samples, READ_TIMEOUT) {
            Ok(n) => {
                bytes.clear();
                for z in &samples[..n] {
                    bytes.extend_from_slice(&z.re.to_le_bytes());
                    bytes.extend_from_slice(&z.im.to_le_bytes());
                }
                if let Err(e) = out.write_all(&bytes).and_then(|_| out.flush()) {
                    if e.kind() == io::ErrorKind::BrokenPipe {
                        tracing::info!("Output closed");
                        break Ok(());
                    }
                    break Err(e.into());
                }
                written += n as u64;
            }
            Err(StreamError::Timeout) => timeouts += 1,
            Err(e) => break Err(e.into()),
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            if let Some(stats) = device.capture_stats() {
                tracing::info!(
                    "Stats: {} samples out, {} chunks, {} xruns, {} read errors, {} overwritten, {} read timeouts",
                    written,
                    stats.chunks,
                    stats.xruns,
                    stats.read_errors,
                    device.overflow_count(),
                    timeouts
                );
            }
            last_stats = Instant::now();
        }
    };

    device.close_stream(stream);
    tracing::info!("Stopped after {} samples", written);
    result
}

#[cfg(feature = "cpal-capture")]
fn list_devices() {
    println!("\n=== Capture Devices ===");
    for device in sbitx_iq::audio::device::list_input_devices(CAPTURE_SAMPLE_RATE) {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        let format = if device.supports_capture_format {
            "stereo S32 @ 96 kHz"
        } else {
            "no stereo S32 @ 96 kHz"
        };
        println!("  {}{} ({})", device.name, default_marker, format);
    }
    println!();
}

#[cfg(not(feature = "cpal-capture"))]
fn list_devices() {
    eprintln!("built without the cpal-capture feature; no devices to list");
}
