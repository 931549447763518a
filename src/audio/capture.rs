//! IF capture thread
//!
//! Pulls fixed-size chunks from the audio source, runs them through the
//! down-converter and writes the complex result into the shared ring buffer.
//! Transient device trouble never ends the loop; only `stop` does.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::bounded;

use crate::audio::buffer::{RingBuffer, SharedRingBuffer};
use crate::audio::priority::PriorityElevator;
use crate::audio::source::{AudioSource, SourceOpener};
use crate::config::StreamConfig;
use crate::constants::*;
use crate::dsp::DownConverter;
use crate::error::{AudioError, ReadError};

/// Fixed settings of one stream instance
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureParameters {
    /// Capture device name
    pub device: String,
    pub capture_rate: u32,
    pub output_rate: u32,
    pub if_hz: f64,
    pub iq_swap: bool,
    pub period_frames: u32,
    pub buffer_frames: u32,
    /// SCHED_FIFO priority to request, if any
    pub realtime_priority: Option<u8>,
}

impl CaptureParameters {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            device: config.device.clone(),
            capture_rate: CAPTURE_SAMPLE_RATE,
            output_rate: OUTPUT_SAMPLE_RATE,
            if_hz: config.if_hz,
            iq_swap: config.iq_swap,
            period_frames: config.period_frames,
            buffer_frames: config.buffer_frames,
            realtime_priority: config.realtime.then_some(config.rt_priority),
        }
    }

    /// Frames per read, rounded up to even so every chunk converts whole
    pub fn chunk_frames(&self) -> usize {
        let period = self.period_frames.max(2) as usize;
        period + period % 2
    }

    fn new_converter(&self) -> DownConverter {
        DownConverter::new(self.if_hz, self.capture_rate, self.iq_swap)
    }
}

impl Default for CaptureParameters {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

#[derive(Default)]
struct CaptureCounters {
    chunks: AtomicU64,
    samples_produced: AtomicU64,
    xruns: AtomicU64,
    read_errors: AtomicU64,
}

/// Snapshot of capture activity since the loop was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub chunks: u64,
    pub samples_produced: u64,
    pub xruns: u64,
    pub read_errors: u64,
}

/// Owner of the capture thread
pub struct CaptureLoop {
    params: CaptureParameters,
    opener: Arc<dyn SourceOpener>,
    elevator: Arc<dyn PriorityElevator>,
    output: SharedRingBuffer,

    /// Cleared by `stop`, checked every iteration
    running: Arc<AtomicBool>,

    /// The thread hands the converter back so phase survives a restart
    thread_handle: Option<JoinHandle<DownConverter>>,
    converter: Option<DownConverter>,

    counters: Arc<CaptureCounters>,
}

impl CaptureLoop {
    pub fn new(
        params: CaptureParameters,
        opener: Arc<dyn SourceOpener>,
        elevator: Arc<dyn PriorityElevator>,
        output: SharedRingBuffer,
    ) -> Self {
        let converter = params.new_converter();
        Self {
            params,
            opener,
            elevator,
            output,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            converter: Some(converter),
            counters: Arc::new(CaptureCounters::default()),
        }
    }

    /// Open the source and start capturing; a no-op while already running
    ///
    /// Returns once the source is open, so an unusable device is reported here.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.thread_handle.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let params = self.params.clone();
        let opener = self.opener.clone();
        let elevator = self.elevator.clone();
        let output = self.output.clone();
        let running = self.running.clone();
        let counters = self.counters.clone();
        let mut converter = self
            .converter
            .take()
            .unwrap_or_else(|| self.params.new_converter());

        self.running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("sbitx-capture".to_string())
            .spawn(move || {
                if let Some(priority) = params.realtime_priority {
                    match elevator.elevate(priority) {
                        Ok(()) => tracing::info!(priority, "capture thread running SCHED_FIFO"),
                        Err(e) => tracing::warn!("Failed to set real-time scheduling: {}", e),
                    }
                }

                let mut source = match opener.open(&params) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return converter;
                    }
                };

                run_capture(
                    source.as_mut(),
                    &mut converter,
                    &output,
                    &running,
                    &counters,
                    params.chunk_frames(),
                );

                // Source is dropped here, releasing the device
                drop(source);
                converter
            });

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.converter = Some(self.params.new_converter());
                return Err(AudioError::ThreadFailed(e.to_string()));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!(
                    device = %self.params.device,
                    chunk_frames = self.params.chunk_frames(),
                    "IF capture started"
                );
                self.thread_handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.converter = handle.join().ok();
                tracing::error!("Capture open failed for {}: {}", self.params.device, e);
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(AudioError::ThreadFailed(
                    "capture thread exited before opening the source".to_string(),
                ))
            }
        }
    }

    /// Stop capturing and release the source; a no-op when idle
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            match handle.join() {
                Ok(converter) => self.converter = Some(converter),
                Err(_) => tracing::error!("Capture thread panicked"),
            }
            tracing::info!("IF capture stopped");
        }
    }

    /// Check if capture is running
    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    pub fn params(&self) -> &CaptureParameters {
        &self.params
    }

    /// Ring buffer the loop writes into
    pub fn output(&self) -> &SharedRingBuffer {
        &self.output
    }

    /// Oscillator phase carried into the next start; `None` while running
    pub fn phase(&self) -> Option<f64> {
        self.converter.as_ref().map(DownConverter::phase)
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            chunks: self.counters.chunks.load(Ordering::Relaxed),
            samples_produced: self.counters.samples_produced.load(Ordering::Relaxed),
            xruns: self.counters.xruns.load(Ordering::Relaxed),
            read_errors: self.counters.read_errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture(
    source: &mut dyn AudioSource,
    converter: &mut DownConverter,
    output: &RingBuffer,
    running: &AtomicBool,
    counters: &CaptureCounters,
    chunk_frames: usize,
) {
    let mut raw = vec![0i32; chunk_frames * CAPTURE_CHANNELS as usize];
    let mut iq = Vec::with_capacity(chunk_frames / 2);

    while running.load(Ordering::Relaxed) {
        match source.read_frames(&mut raw) {
            Ok(0) => continue,
            Ok(frames) => {
                iq.clear();
                let produced = converter.process(&raw[..frames * CAPTURE_CHANNELS as usize], &mut iq);
                output.write(&iq);

                counters.chunks.fetch_add(1, Ordering::Relaxed);
                counters
                    .samples_produced
                    .fetch_add(produced as u64, Ordering::Relaxed);
            }
            Err(ReadError::Xrun) => {
                counters.xruns.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("capture xrun, preparing device");
                if let Err(e) = source.prepare() {
                    tracing::warn!("Device prepare failed: {}", e);
                    thread::sleep(Duration::from_millis(READ_ERROR_BACKOFF_MS));
                }
            }
            Err(e) => {
                counters.read_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Capture read failed: {}", e);
                thread::sleep(Duration::from_millis(READ_ERROR_BACKOFF_MS));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::create_shared_buffer;
    use crate::audio::source::testing::{Probe, ScriptedOpener, Step};
    use crate::dsp::ComplexSample;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct RecordingElevator {
        calls: AtomicUsize,
        refuse: bool,
    }

    impl PriorityElevator for RecordingElevator {
        fn elevate(&self, _priority: u8) -> Result<(), AudioError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                Err(AudioError::Priority("not permitted".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn elevator(refuse: bool) -> Arc<RecordingElevator> {
        Arc::new(RecordingElevator {
            calls: AtomicUsize::new(0),
            refuse,
        })
    }

    /// `frames` stereo frames with a constant left channel
    fn frames(frames: usize, left: i32) -> Vec<i32> {
        (0..frames).flat_map(|_| [left, 0]).collect()
    }

    fn wait_for(what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn capture_with(
        steps: Vec<Step>,
        params: CaptureParameters,
        elevator: Arc<dyn PriorityElevator>,
    ) -> (CaptureLoop, Arc<Probe>, SharedRingBuffer) {
        let opener = Arc::new(ScriptedOpener::new(steps));
        let probe = opener.probe.clone();
        let ring = create_shared_buffer(1024);
        let capture = CaptureLoop::new(params, opener, elevator, ring.clone());
        (capture, probe, ring)
    }

    #[test]
    fn test_chunk_frames_rounds_up_to_even() {
        let mut params = CaptureParameters::default();
        assert_eq!(params.chunk_frames(), 1000);
        params.period_frames = 1001;
        assert_eq!(params.chunk_frames(), 1002);
    }

    #[test]
    fn test_from_config_maps_realtime_request() {
        let mut config = StreamConfig::default();
        assert_eq!(CaptureParameters::from_config(&config).realtime_priority, None);

        config.realtime = true;
        config.rt_priority = 42;
        let params = CaptureParameters::from_config(&config);
        assert_eq!(params.realtime_priority, Some(42));
        assert_eq!(params.capture_rate, 96_000);
        assert_eq!(params.output_rate, 48_000);
    }

    #[test]
    fn test_capture_converts_into_ring() {
        let steps = vec![Step::Frames(frames(100, 0)), Step::Frames(frames(100, 0))];
        let (mut capture, probe, ring) =
            capture_with(steps, CaptureParameters::default(), elevator(false));

        capture.start().unwrap();
        assert!(capture.is_running());
        wait_for("200 frames to convert", || ring.len() == 100);

        capture.stop();
        assert!(!capture.is_running());
        assert_eq!(probe.released.load(Ordering::SeqCst), 1);

        let mut out = vec![ComplexSample::new(1.0, 1.0); 100];
        assert_eq!(ring.read(&mut out), 100);
        assert!(out.iter().all(|z| z.re == 0.0 && z.im == 0.0));
        assert_eq!(capture.stats().samples_produced, 100);
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut capture, probe, _ring) =
            capture_with(Vec::new(), CaptureParameters::default(), elevator(false));

        capture.start().unwrap();
        capture.start().unwrap();
        assert_eq!(probe.opened.load(Ordering::SeqCst), 1);

        capture.stop();
        capture.stop();
        assert_eq!(probe.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_xrun_prepares_and_keeps_running() {
        let steps = vec![
            Step::Frames(frames(10, 0)),
            Step::Fail(ReadError::Xrun),
            Step::Fail(ReadError::Xrun),
            Step::Frames(frames(10, 0)),
        ];
        let (mut capture, probe, ring) =
            capture_with(steps, CaptureParameters::default(), elevator(false));

        capture.start().unwrap();
        wait_for("both chunks", || ring.len() == 10);

        assert_eq!(probe.prepares.load(Ordering::SeqCst), 2);
        assert_eq!(capture.stats().xruns, 2);
        assert!(capture.is_running());
        capture.stop();
    }

    #[test]
    fn test_read_error_is_retried() {
        let steps = vec![
            Step::Fail(ReadError::Device("EIO".to_string())),
            Step::Frames(frames(4, 0)),
        ];
        let (mut capture, probe, ring) =
            capture_with(steps, CaptureParameters::default(), elevator(false));

        capture.start().unwrap();
        wait_for("chunk after error", || ring.len() == 2);

        assert_eq!(capture.stats().read_errors, 1);
        assert_eq!(probe.prepares.load(Ordering::SeqCst), 0);
        capture.stop();
    }

    #[test]
    fn test_open_failure_is_reported() {
        let (mut capture, probe, _ring) =
            capture_with(Vec::new(), CaptureParameters::default(), elevator(false));
        probe.fail_open.store(true, Ordering::SeqCst);

        let err = capture.start().unwrap_err();
        assert!(matches!(err, AudioError::DeviceNotFound(_)));
        assert!(!capture.is_running());

        probe.fail_open.store(false, Ordering::SeqCst);
        capture.start().unwrap();
        assert!(capture.is_running());
        capture.stop();
    }

    #[test]
    fn test_refused_priority_is_not_fatal() {
        let mut params = CaptureParameters::default();
        params.realtime_priority = Some(70);
        let elevator = elevator(true);
        let (mut capture, _probe, ring) =
            capture_with(vec![Step::Frames(frames(2, 0))], params, elevator.clone());

        capture.start().unwrap();
        wait_for("chunk", || ring.len() == 1);
        assert_eq!(elevator.calls.load(Ordering::SeqCst), 1);
        capture.stop();
    }

    #[test]
    fn test_phase_survives_restart() {
        let params = CaptureParameters {
            if_hz: 12_000.0,
            ..CaptureParameters::default()
        };
        let (mut capture, _probe, ring) =
            capture_with(vec![Step::Frames(frames(2, 0))], params, elevator(false));

        assert_eq!(capture.phase(), Some(0.0));
        capture.start().unwrap();
        assert_eq!(capture.phase(), None);
        wait_for("chunk", || ring.len() == 1);
        capture.stop();

        let phase = capture.phase().unwrap();
        assert!((phase - std::f64::consts::FRAC_PI_2).abs() < 1e-9);

        capture.start().unwrap();
        capture.stop();
        assert_eq!(capture.phase(), Some(phase));
    }
}
