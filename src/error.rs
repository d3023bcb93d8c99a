//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, shared by the camera and
//! scanner-controller layers. Using the `thiserror` crate, it provides a centralized
//! and consistent way to handle the failures that can occur when talking to bench
//! hardware.
//!
//! ## Error Hierarchy
//!
//! - **`Config`** / **`Configuration`**: figment load failures and semantic validation
//!   failures of the loaded settings.
//! - **`Io`** / **`Serial`**: failures of the underlying byte channel.
//! - **`Timeout`** / **`Cancelled`**: a blocking read gave up before a response arrived.
//! - **`Sdk`**: a camera SDK call returned a non-success status. The variant carries the
//!   name of the failing SDK operation so callers can report it.
//! - **`InvalidAoi`**: an AOI request was rejected by the range check.
//!
//! Malformed controller responses are *not* errors. The protocol layer degrades them to
//! `None` and leaves the decision to the caller.

use crate::camera::aoi::Aoi;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Serial port not connected")]
    SerialPortNotConnected,

    #[error("No response to '{command}' after {waited:?}")]
    Timeout { command: String, waited: Duration },

    #[error("Read for '{0}' was cancelled")]
    Cancelled(String),

    #[error("Camera SDK call '{operation}' failed with status {code}")]
    Sdk { operation: &'static str, code: i32 },

    #[error("No camera connected")]
    CameraNotConnected,

    #[error("AOI {0} is outside the sensor")]
    InvalidAoi(Aoi),

    #[error("Unsupported color mode: {0}")]
    UnsupportedColorMode(String),

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}
