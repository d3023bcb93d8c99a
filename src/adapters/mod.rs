//! Hardware adapter implementations
//!
//! This module defines the [`SerialLink`] byte-channel trait used by the scanner
//! controller, and its implementations:
//!
//! - [`SerialAdapter`] - a real serial port through the `serialport` crate
//! - [`MockAdapter`] - scripted replies and a record of sent frames, for tests

pub mod mock;
pub mod serial_adapter;

pub use mock::MockAdapter;
pub use serial_adapter::{list_ports, SerialAdapter};

use crate::error::AppResult;

/// Half-duplex byte channel to a device.
///
/// Methods never block longer than the underlying port's own short timeout; waiting
/// for a response is the caller's job (see `ScannerController`).
pub trait SerialLink: Send {
    /// Human-readable identifier, e.g. the port path.
    fn name(&self) -> &str;

    /// Write a complete frame and flush it.
    fn write_frame(&mut self, frame: &[u8]) -> AppResult<()>;

    /// Number of received bytes not yet read.
    fn bytes_waiting(&mut self) -> AppResult<usize>;

    /// Read every byte currently waiting. May return an empty buffer.
    fn read_waiting(&mut self) -> AppResult<Vec<u8>>;

    /// Discard every received byte not yet read.
    fn clear_input(&mut self) -> AppResult<()>;
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_frame(&mut self, frame: &[u8]) -> AppResult<()> {
        (**self).write_frame(frame)
    }

    fn bytes_waiting(&mut self) -> AppResult<usize> {
        (**self).bytes_waiting()
    }

    fn read_waiting(&mut self) -> AppResult<Vec<u8>> {
        (**self).read_waiting()
    }

    fn clear_input(&mut self) -> AppResult<()> {
        (**self).clear_input()
    }
}
