//! Tracing initialisation.
//!
//! `RUST_LOG` takes precedence over the configured level, e.g.
//! `RUST_LOG=bench_daq::instrument=debug` to see every frame exchanged with the board.

use crate::error::{AppResult, DaqError};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init(level: &str) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| DaqError::Configuration(format!("invalid log level '{level}': {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| DaqError::Configuration(format!("logging already initialised: {e}")))
}
