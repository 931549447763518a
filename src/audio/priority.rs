//! Best-effort real-time scheduling for the capture thread

use std::sync::Arc;

use crate::error::AudioError;

/// Raises the scheduling class of the calling thread
///
/// Callers treat a failure as a warning; capture runs either way.
pub trait PriorityElevator: Send + Sync {
    fn elevate(&self, priority: u8) -> Result<(), AudioError>;
}

/// SCHED_FIFO through pthreads
pub struct FifoScheduler;

impl PriorityElevator for FifoScheduler {
    #[cfg(target_os = "linux")]
    fn elevate(&self, priority: u8) -> Result<(), AudioError> {
        // SAFETY: sched_param is plain old data; zeroed is a valid value.
        let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
        param.sched_priority = libc::c_int::from(priority);

        // SAFETY: pthread_self() names the calling thread and `param` outlives the call.
        let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
        if rc == 0 {
            Ok(())
        } else {
            Err(AudioError::Priority(format!(
                "SCHED_FIFO {}: {} (run as root or grant CAP_SYS_NICE)",
                priority,
                std::io::Error::from_raw_os_error(rc)
            )))
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn elevate(&self, _priority: u8) -> Result<(), AudioError> {
        Err(AudioError::Priority(
            "SCHED_FIFO is only available on Linux".to_string(),
        ))
    }
}

/// The elevator for the current platform
pub fn platform_elevator() -> Arc<dyn PriorityElevator> {
    Arc::new(FifoScheduler)
}
