//! Application configuration
//!
//! One TOML file carries the settings of both processes. Every field has a
//! default, so an empty or missing file yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub control: ControlConfig,
    pub hardware: HardwareConfig,
}

/// Streaming side: capture device, down-converter and control endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Capture device name, or "default"
    pub device: String,
    /// IF offset the radio presents the signal at
    pub if_hz: f64,
    /// Swap I and Q on output
    pub iq_swap: bool,
    pub period_frames: u32,
    pub buffer_frames: u32,
    /// Request SCHED_FIFO for the capture thread
    pub realtime: bool,
    pub rt_priority: u8,
    pub ctrl_host: String,
    pub ctrl_port: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            if_hz: DEFAULT_IF_HZ,
            iq_swap: false,
            period_frames: DEFAULT_PERIOD_FRAMES,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            realtime: false,
            rt_priority: DEFAULT_RT_PRIORITY,
            ctrl_host: DEFAULT_CONTROL_HOST.to_string(),
            ctrl_port: DEFAULT_CONTROL_PORT,
        }
    }
}

/// Control server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub bind_address: String,
    pub port: u16,
    /// Hardware frequency applied before the first client connects
    pub initial_frequency_hz: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_CONTROL_HOST.to_string(),
            port: DEFAULT_CONTROL_PORT,
            initial_frequency_hz: DEFAULT_FREQUENCY_HZ,
        }
    }
}

/// Parameters handed to the hardware driver at init
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub i2c_device: String,
    pub bfo_frequency_hz: u32,
    pub bridge_compensation: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_device: "/dev/i2c-22".to_string(),
            bfo_frequency_hz: 40_035_000,
            bridge_compensation: 100,
        }
    }
}

impl AppConfig {
    /// Parse and validate a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load from `path`, else from the per-user config file, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading user config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Write configuration as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.stream;
        if s.period_frames == 0 {
            return Err(invalid("stream.period_frames", "must be greater than zero"));
        }
        if s.buffer_frames < s.period_frames {
            return Err(invalid(
                "stream.buffer_frames",
                format!("must be at least period_frames ({})", s.period_frames),
            ));
        }
        let nyquist = CAPTURE_SAMPLE_RATE as f64 / 2.0;
        if !(s.if_hz > 0.0 && s.if_hz < nyquist) {
            return Err(invalid(
                "stream.if_hz",
                format!("{} is outside (0, {})", s.if_hz, nyquist),
            ));
        }
        if !(1..=99).contains(&s.rt_priority) {
            return Err(invalid("stream.rt_priority", "must be in 1..=99"));
        }

        let hz = self.control.initial_frequency_hz;
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&hz) {
            return Err(invalid(
                "control.initial_frequency_hz",
                format!("{hz} is outside {MIN_FREQUENCY_HZ}..={MAX_FREQUENCY_HZ}"),
            ));
        }
        Ok(())
    }
}

/// `<config dir>/sbitx-iq/config.toml` for the current user
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sbitx-iq")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.stream.if_hz, 24_000.0);
        assert_eq!(config.control.port, 9999);
        assert_eq!(config.control.initial_frequency_hz, 7_100_000);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [stream]
            iq_swap = true
            period_frames = 512
            "#,
        )
        .unwrap();
        assert!(config.stream.iq_swap);
        assert_eq!(config.stream.period_frames, 512);
        assert_eq!(config.stream.buffer_frames, DEFAULT_BUFFER_FRAMES);
        assert_eq!(config.hardware, HardwareConfig::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = AppConfig::from_toml("[stream]\nperiod_frames = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "stream.period_frames", .. }));

        let err = AppConfig::from_toml("[stream]\nif_hz = 50000.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "stream.if_hz", .. }));

        let err = AppConfig::from_toml("[control]\ninitial_frequency_hz = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("sbitx-iq-config-{}", std::process::id()));
        let path = dir.join("config.toml");

        let mut config = AppConfig::default();
        config.stream.device = "hw:0,0".to_string();
        config.control.port = 10_000;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(dir);
    }
}
