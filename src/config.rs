//! Configuration system using Figment
//!
//! Configuration is loaded from:
//! 1. `bench_daq.toml` (base configuration, optional)
//! 2. Environment variables (prefixed with `BENCHDAQ_`, `__` separates sections)
//!
//! # Environment Variable Overrides
//!
//! ```text
//! BENCHDAQ_APPLICATION__LOG_LEVEL=debug
//! BENCHDAQ_SERIAL__PORT=/dev/ttyACM0
//! BENCHDAQ_OPEN_LOOP__SAMPLES=500
//! ```
//!
//! # Example
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//! response_timeout_ms = 2000
//!
//! [open_loop]
//! sampling_frequency = 1000
//! samples = 100
//! x1 = 0
//! y1 = 0
//! x2 = 1024
//! y2 = 1024
//!
//! [camera]
//! color_mode = "MONO12"
//! exposure_ms = 10.0
//! ```

use crate::camera::sdk::ColorMode;
use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "bench_daq.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "BENCHDAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Scanner controller serial link
    #[serde(default)]
    pub serial: SerialConfig,
    /// Open-loop step-response parameters
    #[serde(default)]
    pub open_loop: OpenLoopConfig,
    /// Camera parameters applied after connection
    #[serde(default)]
    pub camera: CameraConfig,
    /// Export settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Serial link to the scanner/photodiode controller board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port (e.g., "/dev/ttyACM0", "COM3")
    #[serde(default)]
    pub port: Option<String>,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Appended after the `_!` frame end
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,
    /// Polls performed by the connection check before giving up
    #[serde(default = "default_check_attempts")]
    pub connection_check_attempts: u32,
    /// Interval between connection-check polls
    #[serde(default = "default_check_interval")]
    pub connection_check_interval_ms: u64,
    /// Upper bound on every other response wait. `0` waits forever.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: Option<u64>,
    /// Sleep between `bytes_waiting` polls while waiting for a response
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Open-loop step-response parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenLoopConfig {
    /// Sampling frequency in Hz
    #[serde(default = "default_sampling_frequency")]
    pub sampling_frequency: u32,
    /// Samples read back per channel
    #[serde(default = "default_samples")]
    pub samples: u32,
    /// Largest sample count the board can store
    #[serde(default = "default_max_samples")]
    pub max_samples: u32,
    /// First step, X drive value
    #[serde(default)]
    pub x1: i32,
    /// First step, Y drive value
    #[serde(default)]
    pub y1: i32,
    /// Second step, X drive value
    #[serde(default)]
    pub x2: i32,
    /// Second step, Y drive value
    #[serde(default)]
    pub y2: i32,
}

/// Camera parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera index passed to the SDK
    #[serde(default)]
    pub id: u32,
    /// Color mode name (MONO8, MONO10, MONO12)
    #[serde(default = "default_color_mode")]
    pub color_mode: String,
    /// Exposure time in milliseconds
    #[serde(default)]
    pub exposure_ms: Option<f64>,
    /// Frame rate in frames per second
    #[serde(default)]
    pub frame_rate: Option<f64>,
    /// Black level offset
    #[serde(default)]
    pub black_level: Option<u32>,
    /// Test `y` (not `x`) against the upper bound when clamping the AOI origin
    #[serde(default)]
    pub strict_y_bound: bool,
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory that receives exported CSV files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Settings {
    /// Load from `bench_daq.toml` (if present) and `BENCHDAQ_` environment variables.
    pub fn load() -> AppResult<Self> {
        Self::from_figment(Self::figment(Path::new(DEFAULT_CONFIG_FILE)))
    }

    /// Load from an explicit TOML file, still honouring environment overrides.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(DaqError::Configuration(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }
        Self::from_figment(Self::figment(path))
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn from_figment(figment: Figment) -> AppResult<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values that parse but make no sense for the hardware.
    pub fn validate(&self) -> AppResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(DaqError::Configuration("baud_rate must be > 0".into()));
        }
        if self.serial.connection_check_attempts == 0 {
            return Err(DaqError::Configuration(
                "connection_check_attempts must be > 0".into(),
            ));
        }
        self.open_loop.check_samples(self.open_loop.samples)?;
        if self.open_loop.sampling_frequency == 0 {
            return Err(DaqError::Configuration(
                "open_loop.sampling_frequency must be > 0".into(),
            ));
        }
        self.camera.color_mode()?;
        Ok(())
    }
}

impl SerialConfig {
    /// Response timeout as a `Duration`, `None` meaning unbounded.
    pub fn response_timeout(&self) -> Option<Duration> {
        match self.response_timeout_ms {
            None | Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

impl OpenLoopConfig {
    /// Accept `samples` only within `1..=max_samples`.
    pub fn check_samples(&self, samples: u32) -> AppResult<()> {
        if samples == 0 || samples > self.max_samples {
            return Err(DaqError::Configuration(format!(
                "open_loop.samples must be in 1..={}, got {}",
                self.max_samples, samples
            )));
        }
        Ok(())
    }
}

impl CameraConfig {
    /// Parsed color mode.
    pub fn color_mode(&self) -> AppResult<ColorMode> {
        self.color_mode.parse()
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            line_terminator: default_line_terminator(),
            connection_check_attempts: default_check_attempts(),
            connection_check_interval_ms: default_check_interval(),
            response_timeout_ms: default_response_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for OpenLoopConfig {
    fn default() -> Self {
        Self {
            sampling_frequency: default_sampling_frequency(),
            samples: default_samples(),
            max_samples: default_max_samples(),
            x1: 0,
            y1: 0,
            x2: 0,
            y2: 0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: 0,
            color_mode: default_color_mode(),
            exposure_ms: None,
            frame_rate: None,
            black_level: None,
            strict_y_bound: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_line_terminator() -> String {
    "\r\n".to_string()
}

fn default_check_attempts() -> u32 {
    10
}

fn default_check_interval() -> u64 {
    100
}

fn default_response_timeout() -> Option<u64> {
    Some(2000)
}

fn default_poll_interval() -> u64 {
    1
}

fn default_sampling_frequency() -> u32 {
    1000
}

fn default_samples() -> u32 {
    100
}

fn default_max_samples() -> u32 {
    1000
}

fn default_color_mode() -> String {
    "MONO8".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_match_controller_board() {
        let settings = Settings::default();
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.serial.line_terminator, "\r\n");
        assert_eq!(settings.serial.connection_check_attempts, 10);
        assert_eq!(settings.serial.connection_check_interval_ms, 100);
        assert_eq!(settings.camera.color_mode().unwrap(), ColorMode::Mono8);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
[serial]
port = "/dev/ttyACM0"
response_timeout_ms = 500

[open_loop]
samples = 42
x2 = 2048
"#,
        );
        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(
            settings.serial.response_timeout(),
            Some(Duration::from_millis(500))
        );
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.open_loop.samples, 42);
        assert_eq!(settings.open_loop.x2, 2048);
        assert_eq!(settings.open_loop.sampling_frequency, 1000);
    }

    #[test]
    fn test_rejects_unknown_color_mode() {
        let file = write_config("[camera]\ncolor_mode = \"RGB8\"\n");
        let err = Settings::from_path(file.path()).unwrap_err();
        assert!(matches!(err, DaqError::UnsupportedColorMode(_)));
    }

    #[test]
    fn test_rejects_zero_samples() {
        let file = write_config("[open_loop]\nsamples = 0\n");
        let err = Settings::from_path(file.path()).unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)));
    }

    #[test]
    fn test_rejects_samples_above_board_limit() {
        let file = write_config("[open_loop]\nsamples = 1001\n");
        let err = Settings::from_path(file.path()).unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)));

        let file = write_config("[open_loop]\nsamples = 5000\nmax_samples = 8192\n");
        assert_eq!(Settings::from_path(file.path()).unwrap().open_loop.samples, 5000);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = Settings::from_path(Path::new("/nonexistent/bench_daq.toml")).unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)));
    }
}
