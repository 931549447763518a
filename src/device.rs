//! Stream-facing device
//!
//! Presents the radio as a single-channel receive-only source of 48 kHz CF32
//! samples. Tuning goes through the control port: the application-visible RF
//! frequency is the hardware frequency plus the IF offset.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::buffer::{RingBuffer, SharedRingBuffer};
use crate::audio::capture::{CaptureLoop, CaptureParameters, CaptureStats};
use crate::audio::priority::{platform_elevator, PriorityElevator};
use crate::audio::source::{default_opener, SourceOpener};
use crate::config::StreamConfig;
use crate::constants::*;
use crate::control::client::ControlClient;
use crate::dsp::ComplexSample;
use crate::error::{Error, StreamError};

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// Handle to the receive stream returned by [`SbitxDevice::setup_stream`]
#[derive(Debug, PartialEq, Eq)]
pub struct RxStream {
    id: u64,
}

/// Polls a ring buffer for samples under a deadline
pub struct StreamReader {
    ring: SharedRingBuffer,
    poll_interval: Duration,
}

impl StreamReader {
    pub fn new(ring: SharedRingBuffer) -> Self {
        Self {
            ring,
            poll_interval: Duration::from_micros(STREAM_POLL_INTERVAL_US),
        }
    }

    /// Copy available samples into `out`, waiting up to `timeout` for the first one
    ///
    /// Returns as soon as anything is available, even if fewer than
    /// `out.len()` samples were read.
    pub fn read(&self, out: &mut [ComplexSample], timeout: Duration) -> Result<usize, StreamError> {
        if out.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        loop {
            let got = self.ring.read(out);
            if got > 0 {
                return Ok(got);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(StreamError::Timeout);
            }
            thread::sleep(self.poll_interval.min(timeout - elapsed));
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

struct ActiveStream {
    id: u64,
    capture: CaptureLoop,
}

/// The radio as seen by a stream consumer
pub struct SbitxDevice {
    config: StreamConfig,
    params: CaptureParameters,
    client: ControlClient,
    opener: Arc<dyn SourceOpener>,
    elevator: Arc<dyn PriorityElevator>,
    ring: SharedRingBuffer,
    reader: StreamReader,
    stream: Option<ActiveStream>,
    next_stream_id: u64,
    /// Last RF frequency set or confirmed by the control server
    tune_hz: Mutex<f64>,
}

impl SbitxDevice {
    /// Device using the compiled-in capture backend
    pub fn new(config: StreamConfig) -> Self {
        Self::with_backends(config, default_opener(), platform_elevator())
    }

    pub fn with_backends(
        config: StreamConfig,
        opener: Arc<dyn SourceOpener>,
        elevator: Arc<dyn PriorityElevator>,
    ) -> Self {
        let params = CaptureParameters::from_config(&config);
        let ring: SharedRingBuffer = Arc::new(RingBuffer::for_output_rate(params.output_rate));
        let client = ControlClient::new(config.ctrl_host.clone(), config.ctrl_port);

        tracing::info!(
            "SBITX: device={} fs={} cap_fs={} if={:.1} iq_swap={} period={} buffer={} rt={} ctrl={}:{}",
            config.device,
            params.output_rate,
            params.capture_rate,
            config.if_hz,
            config.iq_swap,
            config.period_frames,
            config.buffer_frames,
            config.realtime,
            config.ctrl_host,
            config.ctrl_port
        );

        Self {
            reader: StreamReader::new(ring.clone()),
            config,
            params,
            client,
            opener,
            elevator,
            ring,
            stream: None,
            next_stream_id: 1,
            tune_hz: Mutex::new(0.0),
        }
    }

    pub fn driver_key(&self) -> &'static str {
        "sbitx"
    }

    pub fn hardware_key(&self) -> &'static str {
        "sbitx"
    }

    /// Static description of the device and its control endpoint
    pub fn hardware_info(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("origin".to_string(), "sbitx".to_string()),
            ("alsa_capture".to_string(), self.config.device.clone()),
            ("fs".to_string(), self.params.output_rate.to_string()),
            ("cap_fs".to_string(), self.params.capture_rate.to_string()),
            ("if_hz".to_string(), format!("{:.6}", self.config.if_hz)),
            ("ctrl_host".to_string(), self.config.ctrl_host.clone()),
            ("ctrl_port".to_string(), self.config.ctrl_port.to_string()),
        ])
    }

    pub fn num_channels(&self, _direction: Direction) -> usize {
        1
    }

    pub fn list_sample_rates(&self) -> Vec<f64> {
        vec![OUTPUT_SAMPLE_RATE as f64]
    }

    /// Only the fixed output rate is accepted
    pub fn set_sample_rate(&self, rate: f64) -> Result<(), StreamError> {
        if rate.round() as i64 != OUTPUT_SAMPLE_RATE as i64 {
            return Err(StreamError::UnsupportedSampleRate(rate));
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> f64 {
        OUTPUT_SAMPLE_RATE as f64
    }

    pub fn stream_formats(&self) -> Vec<&'static str> {
        vec![FORMAT_CF32]
    }

    /// Native format and its full-scale value
    pub fn native_stream_format(&self) -> (&'static str, f64) {
        (FORMAT_CF32, 1.0)
    }

    /// Tune to RF `frequency`; only the "RF" component is handled
    ///
    /// The hardware is set to `RF - IF` so the wanted signal sits at the IF.
    /// A control failure is logged and the cached value kept as the new RF.
    pub fn set_frequency(&self, name: &str, frequency: f64) {
        if name != RF_COMPONENT {
            return;
        }

        *self.tune_hz.lock() = frequency;

        let hw_hz = (frequency - self.config.if_hz).round() as i64;
        if let Err(e) = self.client.set_hardware_frequency(hw_hz) {
            tracing::warn!(
                "SBITX: failed to set HW freq to {} Hz via {}:{}: {}",
                hw_hz,
                self.client.host(),
                self.client.port(),
                e
            );
        }
    }

    /// Current RF frequency; falls back to the cached value if the server is unreachable
    pub fn frequency(&self, name: &str) -> f64 {
        if name != RF_COMPONENT {
            return 0.0;
        }

        match self.client.hardware_frequency() {
            Ok(hw_hz) => {
                let rf = hw_hz as f64 + self.config.if_hz;
                *self.tune_hz.lock() = rf;
                rf
            }
            Err(e) => {
                tracing::debug!("SBITX: frequency query failed, using cached value: {}", e);
                *self.tune_hz.lock()
            }
        }
    }

    /// Validate the request and prepare the receive stream
    ///
    /// Nothing is left configured when validation fails.
    pub fn setup_stream(
        &mut self,
        direction: Direction,
        format: &str,
        channels: &[usize],
    ) -> Result<RxStream, StreamError> {
        if direction != Direction::Rx {
            return Err(StreamError::UnsupportedDirection("RX only".to_string()));
        }
        if format != FORMAT_CF32 {
            return Err(StreamError::UnsupportedFormat(format!(
                "{format} (only {FORMAT_CF32} supported)"
            )));
        }
        if let Some(&channel) = channels.iter().find(|&&c| c != 0) {
            return Err(StreamError::UnsupportedChannel(channel));
        }
        if self.stream.is_some() {
            return Err(StreamError::Busy);
        }

        let id = self.next_stream_id;
        self.next_stream_id += 1;
        self.stream = Some(ActiveStream {
            id,
            capture: CaptureLoop::new(
                self.params.clone(),
                self.opener.clone(),
                self.elevator.clone(),
                self.ring.clone(),
            ),
        });

        tracing::debug!(id, "rx stream set up");
        Ok(RxStream { id })
    }

    /// Stop capture, release the device and drop anything left unread
    pub fn close_stream(&mut self, stream: RxStream) {
        if let Some(mut active) = self.take_stream(&stream) {
            active.capture.stop();
            self.ring.clear();
            tracing::debug!(id = stream.id, "rx stream closed");
        }
    }

    /// Start capturing; calling it again while active is harmless
    pub fn activate_stream(&mut self, stream: &RxStream) -> Result<(), Error> {
        let active = self.active_mut(stream)?;
        active.capture.start()?;
        Ok(())
    }

    pub fn deactivate_stream(&mut self, stream: &RxStream) -> Result<(), StreamError> {
        let active = self.active_mut(stream)?;
        active.capture.stop();
        Ok(())
    }

    /// Read up to `out.len()` samples, waiting at most `timeout` for the first
    pub fn read_stream(
        &self,
        stream: &RxStream,
        out: &mut [ComplexSample],
        timeout: Duration,
    ) -> Result<usize, StreamError> {
        match &self.stream {
            Some(active) if active.id == stream.id => self.reader.read(out, timeout),
            _ => Err(StreamError::NotSetUp),
        }
    }

    pub fn capture_stats(&self) -> Option<CaptureStats> {
        self.stream.as_ref().map(|active| active.capture.stats())
    }

    /// Samples overwritten before the consumer read them
    pub fn overflow_count(&self) -> usize {
        self.ring.overflow_count()
    }

    fn active_mut(&mut self, stream: &RxStream) -> Result<&mut ActiveStream, StreamError> {
        match self.stream.as_mut() {
            Some(active) if active.id == stream.id => Ok(active),
            _ => Err(StreamError::NotSetUp),
        }
    }

    fn take_stream(&mut self, stream: &RxStream) -> Option<ActiveStream> {
        match &self.stream {
            Some(active) if active.id == stream.id => self.stream.take(),
            _ => None,
        }
    }
}
