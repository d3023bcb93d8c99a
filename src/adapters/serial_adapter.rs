//! Serial adapter for USB-serial controller boards
//!
//! Wraps the `serialport` crate behind [`SerialLink`]. The port is opened with a short
//! internal timeout so `read_waiting` never stalls; response waiting and its deadline
//! live in the protocol layer.

use crate::adapters::SerialLink;
use crate::error::AppResult;
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Internal read timeout of the opened port.
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial port paths currently present on the system.
pub fn list_ports() -> AppResult<Vec<String>> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Serial adapter for RS-232 / USB CDC communication
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 115200)
    baud_rate: u32,

    port: Box<dyn SerialPort>,
}

impl SerialAdapter {
    /// Open a port, 8N1, no flow control.
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyACM0", "COM3")
    /// * `baud_rate` - Communication speed (e.g., 115200)
    pub fn open(port_name: &str, baud_rate: u32) -> AppResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(PORT_TIMEOUT)
            .open()?;

        debug!("Serial port '{}' opened at {} baud", port_name, baud_rate);

        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            port,
        })
    }

    /// Configured baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl SerialLink for SerialAdapter {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn write_frame(&mut self, frame: &[u8]) -> AppResult<()> {
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn bytes_waiting(&mut self) -> AppResult<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_waiting(&mut self) -> AppResult<Vec<u8>> {
        let waiting = self.bytes_waiting()?;
        let mut buffer = vec![0u8; waiting];
        if waiting == 0 {
            return Ok(buffer);
        }

        let mut filled = 0;
        while filled < waiting {
            match self.port.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    fn clear_input(&mut self) -> AppResult<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl Drop for SerialAdapter {
    fn drop(&mut self) {
        debug!("Serial port '{}' closed", self.port_name);
    }
}
