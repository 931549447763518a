//! # sBitx IQ Bridge
//!
//! Turns the sBitx analog IF audio into a complex-baseband sample stream and
//! keeps the radio's local oscillator in step with the tuning frequency the
//! consumer application asks for.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── STREAMING PROCESS ────────────────────────────┐
//! │                                                                            │
//! │  ┌─────────────┐   S32 stereo   ┌──────────────────────────────────────┐   │
//! │  │ Audio codec │ ─────────────▶ │   Capture thread (audio::capture)    │   │
//! │  │  96 kHz IF  │   L = IF       │  ┌────────────┐    ┌──────────────┐  │   │
//! │  └─────────────┘   R = ignored  │  │ DownConv.  │───▶│  RingBuffer  │  │   │
//! │                                 │  │ (dsp::ddc) │    │   2 seconds  │  │   │
//! │                                 │  └────────────┘    └──────┬───────┘  │   │
//! │                                 └───────────────────────────┼──────────┘   │
//! │                                                             ▼              │
//! │  ┌────────────────────────────┐  read_stream()   ┌──────────────────────┐  │
//! │  │ Consumer (48 kHz CF32 I/Q) │ ◀─────────────── │ SbitxDevice (device) │  │
//! │  └──────────────┬─────────────┘                  └──────────┬───────────┘  │
//! │                 │ set/get RF                                 │              │
//! │                 └───────────────────────────────────────────▶│              │
//! │                                                   ControlClient            │
//! └──────────────────────────────────────────────────────────┼─────────────────┘
//!                                                            │ TCP 127.0.0.1:9999
//!                                                            ▼ "f" / "F <hz>" / "t" / "T <0|1>"
//! ┌──────────────────────────── CONTROL PROCESS ───────────────────────────────┐
//! │  ControlServer (task per connection)                                        │
//! │        │                                                                    │
//! │        ▼                                                                    │
//! │  RadioController ── one lock ──▶ RadioState + RadioDriver (LO, T/R relay)   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod control;
pub mod device;
pub mod dsp;
pub mod error;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Rate the codec captures the IF at
    pub const CAPTURE_SAMPLE_RATE: u32 = 96_000;

    /// Rate of the complex output stream (capture rate / 2)
    pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;

    /// Default IF offset in Hz
    pub const DEFAULT_IF_HZ: f64 = 24_000.0;

    /// Channels delivered by the codec (left = IF, right = mic)
    pub const CAPTURE_CHANNELS: u16 = 2;

    /// Default capture period in frames
    pub const DEFAULT_PERIOD_FRAMES: u32 = 1000;

    /// Default capture buffer in frames
    pub const DEFAULT_BUFFER_FRAMES: u32 = 4000;

    /// Default SCHED_FIFO priority when real-time scheduling is requested
    pub const DEFAULT_RT_PRIORITY: u8 = 70;

    /// Ring buffer length in seconds of output
    pub const RING_BUFFER_SECONDS: usize = 2;

    /// Sleep between empty ring buffer polls in `read_stream`
    pub const STREAM_POLL_INTERVAL_US: u64 = 200;

    /// Backoff after a non-xrun capture read error
    pub const READ_ERROR_BACKOFF_MS: u64 = 2;

    /// Default TCP port of the control server
    pub const DEFAULT_CONTROL_PORT: u16 = 9999;

    /// Default bind/connect host of the control server
    pub const DEFAULT_CONTROL_HOST: &str = "127.0.0.1";

    /// Lowest hardware frequency accepted by `F`
    pub const MIN_FREQUENCY_HZ: u32 = 100_000;

    /// Highest hardware frequency accepted by `F`
    pub const MAX_FREQUENCY_HZ: u32 = 600_000_000;

    /// Hardware frequency applied when the control process starts
    pub const DEFAULT_FREQUENCY_HZ: u32 = 7_100_000;

    /// Listen backlog of the control socket
    pub const CONTROL_BACKLOG: i32 = 8;

    /// Longest command line the control server buffers
    pub const MAX_COMMAND_LEN: usize = 256;

    /// Stream format name for complex 32-bit float samples
    pub const FORMAT_CF32: &str = "CF32";

    /// Component name carrying the RF tuning frequency
    pub const RF_COMPONENT: &str = "RF";
}
