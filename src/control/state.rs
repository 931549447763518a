//! Authoritative radio state and the lock that serializes it
//!
//! Every read and write of [`RadioState`] and every driver call happens with
//! the controller's mutex held, so at most one hardware mutation is in flight
//! and all connections see a consistent state.

use parking_lot::Mutex;

use crate::control::driver::RadioDriver;
use crate::control::protocol::{Command, Reply};
use crate::error::ControlError;

/// What the control process believes the radio is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioState {
    pub frequency_hz: u32,
    pub ptt_tx: bool,
}

struct Inner {
    state: RadioState,
    driver: Box<dyn RadioDriver>,
    shut_down: bool,
}

/// Sole owner of the radio state and the hardware driver
pub struct RadioController {
    inner: Mutex<Inner>,
}

impl RadioController {
    /// Take ownership of the driver, force receive and apply `initial_frequency_hz`
    pub fn new(mut driver: Box<dyn RadioDriver>, initial_frequency_hz: u32) -> Self {
        if let Err(e) = driver.set_transmit(false) {
            tracing::error!("Failed to force RX at startup: {}", e);
        }
        if let Err(e) = driver.set_frequency(initial_frequency_hz) {
            tracing::error!("Failed to set initial frequency {}: {}", initial_frequency_hz, e);
        }

        Self {
            inner: Mutex::new(Inner {
                state: RadioState {
                    frequency_hz: initial_frequency_hz,
                    ptt_tx: false,
                },
                driver,
                shut_down: false,
            }),
        }
    }

    pub fn state(&self) -> RadioState {
        self.inner.lock().state
    }

    pub fn frequency(&self) -> u32 {
        self.inner.lock().state.frequency_hz
    }

    pub fn ptt(&self) -> bool {
        self.inner.lock().state.ptt_tx
    }

    /// Command the hardware and cache the new frequency
    ///
    /// The cache follows the command even if the driver reports a failure;
    /// the failure is logged and returned. After [`shutdown`](Self::shutdown)
    /// neither the driver nor the cache is touched.
    pub fn set_frequency(&self, hz: u32) -> Result<(), ControlError> {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Err(ControlError::ShutDown);
        }
        inner.state.frequency_hz = hz;
        inner.driver.set_frequency(hz).map_err(|e| {
            tracing::error!("Driver failed to set {} Hz: {}", hz, e);
            e
        })
    }

    /// Switch T/R and cache the new state
    pub fn set_ptt(&self, tx: bool) -> Result<(), ControlError> {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Err(ControlError::ShutDown);
        }
        inner.state.ptt_tx = tx;
        inner.driver.set_transmit(tx).map_err(|e| {
            tracing::error!("Driver failed to switch to {}: {}", if tx { "TX" } else { "RX" }, e);
            e
        })
    }

    /// Run one parsed command and produce its reply
    pub fn execute(&self, command: Command) -> Reply {
        match command {
            Command::GetFrequency => Reply::Frequency(self.frequency()),
            Command::SetFrequency(hz) => {
                let _ = self.set_frequency(hz);
                Reply::FrequencySet(hz)
            }
            Command::GetPtt => Reply::Ptt(self.ptt()),
            Command::SetPtt(tx) => {
                let _ = self.set_ptt(tx);
                Reply::PttSet(tx)
            }
        }
    }

    /// Force receive, then release the hardware; later calls are no-ops
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return;
        }
        inner.shut_down = true;
        inner.state.ptt_tx = false;

        if let Err(e) = inner.driver.set_transmit(false) {
            tracing::error!("Failed to force RX on shutdown: {}", e);
        }
        if let Err(e) = inner.driver.shutdown() {
            tracing::error!("Driver shutdown failed: {}", e);
        }
        tracing::info!("radio left in RX, hardware released");
    }
}

impl Drop for RadioController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HardwareConfig;
    use crate::control::driver::{DriverCall, SimulatedDriver};
    use crate::control::protocol::parse_line;
    use proptest::prelude::*;

    fn controller() -> (RadioController, crate::control::driver::CallLog) {
        let driver = SimulatedDriver::recording(HardwareConfig::default());
        let calls = driver.calls().unwrap();
        (RadioController::new(Box::new(driver), 7_100_000), calls)
    }

    /// Parse and execute like a connection would
    fn send(controller: &RadioController, line: &str) -> String {
        match parse_line(line).unwrap() {
            Ok(command) => controller.execute(command).to_string(),
            Err(reason) => Reply::Error(reason).to_string(),
        }
    }

    #[test]
    fn test_startup_forces_rx_then_tunes() {
        let (controller, calls) = controller();
        assert_eq!(
            *calls.lock(),
            vec![DriverCall::SetTransmit(false), DriverCall::SetFrequency(7_100_000)]
        );
        assert_eq!(
            controller.state(),
            RadioState {
                frequency_hz: 7_100_000,
                ptt_tx: false
            }
        );
    }

    #[test]
    fn test_set_then_get_frequency() {
        let (controller, calls) = controller();
        assert_eq!(send(&controller, "F 14210000"), "OK 14210000");
        assert_eq!(send(&controller, "f"), "14210000");
        assert_eq!(calls.lock().last(), Some(&DriverCall::SetFrequency(14_210_000)));
    }

    #[test]
    fn test_rejections_leave_state_alone() {
        let (controller, calls) = controller();
        let before = controller.state();
        let driver_calls = calls.lock().len();

        assert_eq!(send(&controller, "F 99999"), "ERR range");
        assert_eq!(send(&controller, "F 600000001"), "ERR range");
        assert_eq!(send(&controller, "F"), "ERR missing");
        assert_eq!(send(&controller, "T 2"), "ERR arg");
        assert_eq!(send(&controller, "X"), "ERR unknown");

        assert_eq!(controller.state(), before);
        assert_eq!(calls.lock().len(), driver_calls);
    }

    #[test]
    fn test_ptt_round_trip() {
        let (controller, calls) = controller();
        assert_eq!(send(&controller, "T 1"), "OK 1");
        assert_eq!(send(&controller, "t"), "1");
        assert_eq!(send(&controller, "T 0"), "OK 0");
        assert_eq!(send(&controller, "t"), "0");

        assert_eq!(send(&controller, "T 1"), "OK 1");
        assert_eq!(send(&controller, "T 2"), "ERR arg");
        assert_eq!(send(&controller, "t"), "1");
        assert_eq!(calls.lock().last(), Some(&DriverCall::SetTransmit(true)));
    }

    #[test]
    fn test_shutdown_forces_rx_once() {
        let (controller, calls) = controller();
        controller.set_ptt(true).unwrap();
        calls.lock().clear();

        controller.shutdown();
        controller.shutdown();
        assert!(!controller.ptt());
        assert_eq!(
            *calls.lock(),
            vec![DriverCall::SetTransmit(false), DriverCall::Shutdown]
        );
    }

    #[test]
    fn test_no_driver_calls_after_shutdown() {
        let (controller, calls) = controller();
        controller.shutdown();
        let after_shutdown = calls.lock().len();

        assert!(matches!(controller.set_ptt(true), Err(ControlError::ShutDown)));
        assert!(matches!(
            controller.set_frequency(14_210_000),
            Err(ControlError::ShutDown)
        ));

        assert_eq!(calls.lock().len(), after_shutdown);
        assert_eq!(
            controller.state(),
            RadioState {
                frequency_hz: 7_100_000,
                ptt_tx: false
            }
        );
    }

    #[test]
    fn test_drop_leaves_radio_in_rx() {
        let (controller, calls) = controller();
        controller.set_ptt(true).unwrap();
        drop(controller);

        let calls = calls.lock();
        let n = calls.len();
        assert_eq!(&calls[n - 2..], &[DriverCall::SetTransmit(false), DriverCall::Shutdown]);
    }

    proptest! {
        #[test]
        fn prop_set_then_get_returns_same_hz(hz in 100_000u32..=600_000_000) {
            let (controller, _calls) = controller();
            prop_assert_eq!(send(&controller, &format!("F {hz}")), format!("OK {hz}"));
            prop_assert_eq!(send(&controller, "f"), hz.to_string());
        }
    }
}
