//! Pull-model audio sources
//!
//! The capture loop reads fixed-size chunks of interleaved stereo S32 frames
//! and resets the source after an xrun. Backends are opened on the capture
//! thread itself, so a source does not need to be `Send`.

use std::sync::Arc;

use crate::audio::capture::CaptureParameters;
use crate::error::{AudioError, ReadError};

/// A capture device delivering interleaved stereo S32 frames
pub trait AudioSource {
    /// Fill `buf` with up to `buf.len() / 2` frames
    ///
    /// Returns the number of frames read. `Ok(0)` means nothing arrived in
    /// time and the caller should simply try again.
    fn read_frames(&mut self, buf: &mut [i32]) -> Result<usize, ReadError>;

    /// Reset the device after an xrun so reading can continue
    fn prepare(&mut self) -> Result<(), AudioError>;
}

/// Opens an [`AudioSource`] for a set of capture parameters
pub trait SourceOpener: Send + Sync {
    fn open(&self, params: &CaptureParameters) -> Result<Box<dyn AudioSource>, AudioError>;
}

/// The opener for the compiled-in capture backend
pub fn default_opener() -> Arc<dyn SourceOpener> {
    #[cfg(feature = "cpal-capture")]
    {
        Arc::new(cpal_backend::CpalOpener)
    }
    #[cfg(not(feature = "cpal-capture"))]
    {
        Arc::new(NoBackend)
    }
}

#[cfg(not(feature = "cpal-capture"))]
struct NoBackend;

#[cfg(not(feature = "cpal-capture"))]
impl SourceOpener for NoBackend {
    fn open(&self, _params: &CaptureParameters) -> Result<Box<dyn AudioSource>, AudioError> {
        Err(AudioError::BackendUnavailable(
            "built without the cpal-capture feature".to_string(),
        ))
    }
}

#[cfg(feature = "cpal-capture")]
pub mod cpal_backend {
    //! Capture through cpal (ALSA on Linux)
    //!
    //! cpal pushes periods from its own callback; they are handed over a
    //! bounded channel sized like the device buffer. A full channel means the
    //! capture thread fell behind, which is reported as an xrun.

    use cpal::traits::{DeviceTrait, StreamTrait};
    use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{AudioSource, SourceOpener};
    use crate::audio::capture::CaptureParameters;
    use crate::audio::device::find_input_device;
    use crate::constants::CAPTURE_CHANNELS;
    use crate::error::{AudioError, ReadError};

    /// Longest a single read waits for the next period
    const READ_TIMEOUT: Duration = Duration::from_millis(50);

    pub struct CpalOpener;

    impl SourceOpener for CpalOpener {
        fn open(&self, params: &CaptureParameters) -> Result<Box<dyn AudioSource>, AudioError> {
            Ok(Box::new(CpalSource::open(params)?))
        }
    }

    pub struct CpalSource {
        stream: cpal::Stream,
        periods: Receiver<Vec<i32>>,
        errors: Receiver<String>,
        overrun: Arc<AtomicBool>,
        pending: Vec<i32>,
        pending_pos: usize,
    }

    impl CpalSource {
        pub fn open(params: &CaptureParameters) -> Result<Self, AudioError> {
            let device = find_input_device(&params.device)?;

            let config = cpal::StreamConfig {
                channels: CAPTURE_CHANNELS,
                sample_rate: cpal::SampleRate(params.capture_rate),
                buffer_size: cpal::BufferSize::Fixed(params.period_frames),
            };

            let depth = (params.buffer_frames / params.period_frames.max(1)).max(2) as usize;
            let (period_tx, period_rx) = bounded::<Vec<i32>>(depth);
            let (error_tx, error_rx) = bounded::<String>(16);
            let overrun = Arc::new(AtomicBool::new(false));
            let overrun_flag = overrun.clone();

            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[i32], _: &cpal::InputCallbackInfo| {
                        if period_tx.try_send(data.to_vec()).is_err() {
                            overrun_flag.store(true, Ordering::Release);
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(err.to_string());
                    },
                    None,
                )
                .map_err(|e| match e {
                    cpal::BuildStreamError::StreamConfigNotSupported => {
                        AudioError::UnsupportedFormat(format!(
                            "{} does not support stereo S32 at {} Hz",
                            params.device, params.capture_rate
                        ))
                    }
                    other => AudioError::StreamError(other.to_string()),
                })?;

            stream
                .play()
                .map_err(|e| AudioError::StreamError(e.to_string()))?;

            tracing::debug!(
                device = %params.device,
                rate = params.capture_rate,
                period = params.period_frames,
                depth,
                "cpal capture stream running"
            );

            Ok(Self {
                stream,
                periods: period_rx,
                errors: error_rx,
                overrun,
                pending: Vec::new(),
                pending_pos: 0,
            })
        }
    }

    impl AudioSource for CpalSource {
        fn read_frames(&mut self, buf: &mut [i32]) -> Result<usize, ReadError> {
            if let Ok(msg) = self.errors.try_recv() {
                return Err(ReadError::Device(msg));
            }
            if self.overrun.swap(false, Ordering::AcqRel) {
                return Err(ReadError::Xrun);
            }

            let want = buf.len() - buf.len() % 2;
            let mut filled = 0;

            while filled < want {
                if self.pending_pos >= self.pending.len() {
                    match self.periods.recv_timeout(READ_TIMEOUT) {
                        Ok(period) => {
                            self.pending = period;
                            self.pending_pos = 0;
                            continue;
                        }
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(ReadError::Device("capture stream closed".to_string()))
                        }
                    }
                }

                let n = (want - filled).min(self.pending.len() - self.pending_pos);
                buf[filled..filled + n]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                filled += n;
                self.pending_pos += n;
            }

            Ok(filled / 2)
        }

        fn prepare(&mut self) -> Result<(), AudioError> {
            while self.periods.try_recv().is_ok() {}
            self.pending.clear();
            self.pending_pos = 0;
            self.overrun.store(false, Ordering::Release);
            self.stream
                .play()
                .map_err(|e| AudioError::StreamError(e.to_string()))
        }
    }
}
