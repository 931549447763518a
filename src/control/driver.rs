//! Hardware driver seam
//!
//! The register-level driver that retunes the local oscillator and flips the
//! transmit/receive relay lives outside this crate. The control server only
//! needs the three operations below.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::HardwareConfig;
use crate::error::ControlError;

/// Operations the control server performs on the radio
pub trait RadioDriver: Send {
    /// Tune the local oscillator so `hz` is the hardware frequency
    fn set_frequency(&mut self, hz: u32) -> Result<(), ControlError>;

    /// Switch the T/R relay; `true` keys the transmitter
    fn set_transmit(&mut self, tx: bool) -> Result<(), ControlError>;

    /// Release the hardware
    fn shutdown(&mut self) -> Result<(), ControlError>;
}

/// One call made on a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    SetFrequency(u32),
    SetTransmit(bool),
    Shutdown,
}

/// Shared view of the calls a [`SimulatedDriver`] received
pub type CallLog = Arc<Mutex<Vec<DriverCall>>>;

/// Driver that logs instead of touching hardware
///
/// Used when no hardware driver is linked in. Built with
/// [`recording`](Self::recording) it also keeps every call it received, so
/// tests can observe what the server asked of the radio.
pub struct SimulatedDriver {
    config: HardwareConfig,
    history: Option<CallLog>,
}

impl SimulatedDriver {
    /// Driver without call history
    pub fn new(config: HardwareConfig) -> Self {
        tracing::info!(
            i2c = %config.i2c_device,
            bfo_hz = config.bfo_frequency_hz,
            bridge_compensation = config.bridge_compensation,
            "simulated radio driver initialised"
        );
        Self {
            config,
            history: None,
        }
    }

    /// Driver that records every call; the log grows without bound
    pub fn recording(config: HardwareConfig) -> Self {
        Self {
            history: Some(Arc::new(Mutex::new(Vec::new()))),
            ..Self::new(config)
        }
    }

    /// Handle on the call history, if recording; stays valid after the driver is boxed
    pub fn calls(&self) -> Option<CallLog> {
        self.history.clone()
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    fn record(&self, call: DriverCall) {
        if let Some(history) = &self.history {
            history.lock().push(call);
        }
    }
}

impl RadioDriver for SimulatedDriver {
    fn set_frequency(&mut self, hz: u32) -> Result<(), ControlError> {
        tracing::debug!(hz, "driver: set_frequency");
        self.record(DriverCall::SetFrequency(hz));
        Ok(())
    }

    fn set_transmit(&mut self, tx: bool) -> Result<(), ControlError> {
        tracing::debug!(tx, "driver: tr_switch");
        self.record(DriverCall::SetTransmit(tx));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ControlError> {
        tracing::debug!("driver: shutdown");
        self.record(DriverCall::Shutdown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_driver_keeps_no_history() {
        let mut driver = SimulatedDriver::new(HardwareConfig::default());
        for hz in 0..10_000 {
            driver.set_frequency(7_000_000 + hz).unwrap();
        }
        driver.set_transmit(true).unwrap();
        assert!(driver.calls().is_none());
    }

    #[test]
    fn test_recording_driver_logs_calls_in_order() {
        let mut driver = SimulatedDriver::recording(HardwareConfig::default());
        let calls = driver.calls().unwrap();

        driver.set_transmit(false).unwrap();
        driver.set_frequency(14_210_000).unwrap();
        driver.shutdown().unwrap();

        assert_eq!(
            *calls.lock(),
            vec![
                DriverCall::SetTransmit(false),
                DriverCall::SetFrequency(14_210_000),
                DriverCall::Shutdown
            ]
        );
    }
}
