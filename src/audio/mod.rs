//! Audio capture subsystem

pub mod buffer;
pub mod capture;
#[cfg(feature = "cpal-capture")]
pub mod device;
pub mod priority;
pub mod source;

pub use buffer::{create_shared_buffer, RingBuffer, SharedRingBuffer};
pub use capture::{CaptureLoop, CaptureParameters, CaptureStats};
pub use priority::{platform_elevator, PriorityElevator};
pub use source::{default_opener, AudioSource, SourceOpener};
