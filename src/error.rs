//! Error types for the IQ bridge and its control channel

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio capture errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Capture thread failed: {0}")]
    ThreadFailed(String),

    #[error("Capture backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Real-time scheduling refused: {0}")]
    Priority(String),
}

/// Failures reported by a single read from an audio source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Overrun or underrun; recoverable with `prepare`
    #[error("xrun")]
    Xrun,

    #[error("device read failed: {0}")]
    Device(String),
}

/// Errors visible to a stream consumer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Timed out waiting for samples")]
    Timeout,

    #[error("Stream is not set up")]
    NotSetUp,

    #[error("A receive stream is already set up")]
    Busy,

    #[error("Unsupported direction: {0}")]
    UnsupportedDirection(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported channel {0}: only channel 0")]
    UnsupportedChannel(usize),

    #[error("Unsupported sample rate {0}: only 48000 sps supported")]
    UnsupportedSampleRate(f64),
}

/// Control channel errors
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Address resolution failed: {0}")]
    Resolve(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Empty reply")]
    EmptyReply,

    #[error("Malformed reply: {0:?}")]
    MalformedReply(String),

    #[error("Hardware driver error: {0}")]
    Driver(String),

    #[error("Radio has been shut down")]
    ShutDown,
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
