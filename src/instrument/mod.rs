//! Instrument drivers.
//!
//! Currently the bench has one serial instrument: the microcontroller board that
//! steers the laser spot and reads the photodiode.

pub mod scanner;

pub use scanner::{CancelToken, OpenLoopSample, OpenLoopSteps, ScannerController};
