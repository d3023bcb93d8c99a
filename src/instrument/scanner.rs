//! 2-axis scanner / photodiode controller
//!
//! Drives the microcontroller board that positions the laser spot and reads the
//! quadrant photodiode. See [`crate::protocol`] for the wire format.
//!
//! ## Request/response discipline
//!
//! Exactly one request is outstanding at a time. Every call blocks the caller until
//! the response arrives, the configured response timeout elapses, or the
//! [`CancelToken`] fires. The connection check is the only verified round trip with a
//! fixed budget (`connection_check_attempts` × `connection_check_interval_ms`).
//! `stop` and `reset_open_loop_scan` are best-effort sends: the board does not answer
//! them.
//!
//! ## Failure semantics
//!
//! - channel not open / cannot be opened → `false` from `connect`, or
//!   [`DaqError::SerialPortNotConnected`]
//! - malformed response, or a move reply echoing another target → `Ok(None)` (logged at
//!   `warn`)
//! - no response in time → [`DaqError::Timeout`]. A reply arriving later is discarded
//!   when the next command is sent.
//!
//! Nothing reconnects or retries on its own.
//!
//! # Example
//!
//! ```no_run
//! use bench_daq::config::Settings;
//! use bench_daq::instrument::ScannerController;
//!
//! let settings = Settings::load()?;
//! let mut board = ScannerController::from_settings(&settings);
//! if board.connect("/dev/ttyACM0") && board.check_connection() {
//!     if let Some(pos) = board.move_to(100.0, 200.0)? {
//!         println!("photodiode at ({}, {})", pos.x, pos.y);
//!     }
//! }
//! # Ok::<(), bench_daq::error::DaqError>(())
//! ```

use crate::adapters::{SerialAdapter, SerialLink};
use crate::config::{OpenLoopConfig, SerialConfig, Settings};
use crate::error::{AppResult, DaqError};
use crate::protocol::{self, Channel, Command, OpenLoopAck, Position};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Silence after which a partial frame is returned as-is.
const FRAME_GAP: Duration = Duration::from_millis(20);

/// Opens a link to the given port at the given baud rate.
pub type LinkOpener = Box<dyn Fn(&str, u32) -> AppResult<Box<dyn SerialLink>> + Send>;

/// Cooperative cancellation for blocking reads. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the wait in progress (and any later one until [`reset`](Self::reset)).
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the token.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Open-loop drive steps `(x1, y1) → (x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenLoopSteps {
    /// First step X
    pub x1: i32,
    /// First step Y
    pub y1: i32,
    /// Second step X
    pub x2: i32,
    /// Second step Y
    pub y2: i32,
}

/// One sample of an open-loop capture. Missing or malformed channels are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OpenLoopSample {
    /// Sample index
    pub index: u32,
    /// Photodiode X
    pub x: Option<f64>,
    /// Photodiode Y
    pub y: Option<f64>,
    /// Step value
    pub step: Option<f64>,
}

impl OpenLoopSample {
    fn set(&mut self, channel: Channel, value: Option<f64>) {
        match channel {
            Channel::X => self.x = value,
            Channel::Y => self.y = value,
            Channel::Step => self.step = value,
        }
    }
}

enum Link {
    Disconnected,
    Connected(Box<dyn SerialLink>),
}

/// Controller board state and protocol driver.
pub struct ScannerController {
    link: Link,
    opener: LinkOpener,
    serial: SerialConfig,
    cancel: Option<CancelToken>,
    scan: Position,
    photodiode: Option<Position>,
    sampling_frequency: u32,
    samples: u32,
    max_samples: u32,
    steps: OpenLoopSteps,
}

impl ScannerController {
    /// Disconnected controller; `connect` opens real serial ports.
    pub fn new(serial: SerialConfig, open_loop: &OpenLoopConfig) -> Self {
        Self {
            link: Link::Disconnected,
            opener: Box::new(|port: &str, baud: u32| {
                Ok(Box::new(SerialAdapter::open(port, baud)?) as Box<dyn SerialLink>)
            }),
            serial,
            cancel: None,
            scan: Position::default(),
            photodiode: None,
            sampling_frequency: open_loop.sampling_frequency,
            samples: open_loop.samples,
            max_samples: open_loop.max_samples,
            steps: OpenLoopSteps {
                x1: open_loop.x1,
                y1: open_loop.y1,
                x2: open_loop.x2,
                y2: open_loop.y2,
            },
        }
    }

    /// Controller configured from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.serial.clone(), &settings.open_loop)
    }

    /// Replace how `connect` opens a port.
    pub fn with_opener<F>(mut self, opener: F) -> Self
    where
        F: Fn(&str, u32) -> AppResult<Box<dyn SerialLink>> + Send + 'static,
    {
        self.opener = Box::new(opener);
        self
    }

    /// Attach an already-open link.
    pub fn attach(&mut self, link: Box<dyn SerialLink>) {
        info!("Attached to controller on '{}'", link.name());
        self.link = Link::Connected(link);
    }

    /// Abort blocking reads when `token` is cancelled.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Open the channel. No retry.
    pub fn connect(&mut self, port: &str) -> bool {
        match (self.opener)(port, self.serial.baud_rate) {
            Ok(link) => {
                self.attach(link);
                true
            }
            Err(e) => {
                warn!("Cannot open '{}': {}", port, e);
                self.link = Link::Disconnected;
                false
            }
        }
    }

    /// Drop the channel.
    pub fn disconnect(&mut self) {
        if let Link::Connected(link) = std::mem::replace(&mut self.link, Link::Disconnected) {
            info!("Disconnected from '{}'", link.name());
        }
    }

    /// Whether a channel is open. Says nothing about the board answering.
    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected(_))
    }

    fn link(&mut self) -> AppResult<&mut Box<dyn SerialLink>> {
        match &mut self.link {
            Link::Connected(link) => Ok(link),
            Link::Disconnected => Err(DaqError::SerialPortNotConnected),
        }
    }

    /// Liveness probe: send `C`, poll for an answer within the configured budget.
    ///
    /// Never fails; any problem reads as `false`.
    pub fn check_connection(&mut self) -> bool {
        match self.probe() {
            Ok(true) => {
                info!("Controller answered connection check");
                true
            }
            Ok(false) => {
                warn!("Controller did not answer connection check");
                false
            }
            Err(e) => {
                warn!("Connection check failed: {}", e);
                false
            }
        }
    }

    fn probe(&mut self) -> AppResult<bool> {
        let attempts = self.serial.connection_check_attempts;
        let interval = Duration::from_millis(self.serial.connection_check_interval_ms);

        self.send(&Command::ConnectionCheck)?;
        let link = self.link()?;
        let mut answered = false;
        for _ in 0..attempts {
            if link.bytes_waiting()? > 0 {
                answered = true;
                break;
            }
            thread::sleep(interval);
        }
        // bytes may land during the last sleep
        answered = answered || link.bytes_waiting()? > 0;
        if !answered {
            return Ok(false);
        }

        let response = String::from_utf8_lossy(&link.read_waiting()?).into_owned();
        debug!("[{}] Received response: {}", link.name(), response.trim());
        Ok(protocol::is_connection_ack(&response))
    }

    // ------------------------------------------------------------------
    // Framing
    // ------------------------------------------------------------------

    /// Write one frame after dropping whatever is left in the input buffer, so a reply
    /// that arrived after an earlier timeout is never read as the answer to this one.
    fn send(&mut self, command: &Command) -> AppResult<()> {
        let frame = command.encode(&self.serial.line_terminator);
        let link = self.link()?;
        let stale = link.bytes_waiting()?;
        if stale > 0 {
            debug!("[{}] Discarding {} unread bytes", link.name(), stale);
        }
        link.clear_input()?;
        link.write_frame(frame.as_bytes())?;
        debug!("[{}] Sent command: {}", link.name(), frame.trim());
        Ok(())
    }

    /// Send, then block until a complete frame is read.
    fn transact(&mut self, command: &Command) -> AppResult<String> {
        self.send(command)?;

        let timeout = self.serial.response_timeout();
        let poll = Duration::from_millis(self.serial.poll_interval_ms);
        let cancel = self.cancel.clone();
        let start = Instant::now();
        let frame = command.frame();
        let link = self.link()?;

        let mut response = Vec::new();
        let mut last_byte = None;
        loop {
            if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(DaqError::Cancelled(frame));
            }

            if link.bytes_waiting()? > 0 {
                response.extend(link.read_waiting()?);
                last_byte = Some(Instant::now());
                if protocol::is_complete(&String::from_utf8_lossy(&response)) {
                    break;
                }
            } else if last_byte.is_some_and(|t| t.elapsed() >= FRAME_GAP) {
                break;
            }

            if let Some(limit) = timeout {
                if start.elapsed() > limit {
                    if last_byte.is_some() {
                        break;
                    }
                    return Err(DaqError::Timeout {
                        command: frame,
                        waited: limit,
                    });
                }
            }
            thread::sleep(poll);
        }

        let response = String::from_utf8_lossy(&response).trim().to_string();
        debug!("[{}] Received response: {}", link.name(), response);
        Ok(response)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Halt motion. Best effort, nothing is read back.
    pub fn stop(&mut self) -> AppResult<()> {
        self.send(&Command::Stop)
    }

    /// Current photodiode reading, `None` if the response is malformed.
    pub fn query_position(&mut self) -> AppResult<Option<Position>> {
        let response = self.transact(&Command::QueryPosition)?;
        let position = protocol::decode_position(&response);
        match position {
            Some(pos) => self.photodiode = Some(pos),
            None => warn!("Malformed position response: {:?}", response),
        }
        Ok(position)
    }

    /// Command the scanner; returns the photodiode position measured after the move.
    pub fn move_to(&mut self, x: f64, y: f64) -> AppResult<Option<Position>> {
        let response = self.transact(&Command::Move { x, y })?;
        self.scan = Position::new(x, y);
        let position = protocol::decode_move_for(&response, x, y);
        match position {
            Some(pos) => self.photodiode = Some(pos),
            None => warn!("Malformed or stale move response: {:?}", response),
        }
        Ok(position)
    }

    /// Begin a step-response capture with the configured steps and sampling frequency.
    ///
    /// `Some(OpenLoopAck::Rejected)` means the board refused the sample count.
    pub fn start_open_loop_scan(&mut self) -> AppResult<Option<OpenLoopAck>> {
        let OpenLoopSteps { x1, y1, x2, y2 } = self.steps;
        let response = self.transact(&Command::StartOpenLoop {
            x1,
            x2,
            y1,
            y2,
            fs: self.sampling_frequency,
        })?;
        let ack = protocol::decode_open_loop_ack(&response);
        match ack {
            Some(OpenLoopAck::Accepted) => info!("Open-loop scan started"),
            Some(OpenLoopAck::Rejected) => warn!("Open-loop scan rejected by controller"),
            None => warn!("Malformed open-loop acknowledgement: {:?}", response),
        }
        Ok(ack)
    }

    /// Abort/reset the step-response capture. Best effort, nothing is read back.
    pub fn reset_open_loop_scan(&mut self) -> AppResult<()> {
        self.send(&Command::ResetOpenLoop)
    }

    /// One channel of one open-loop sample.
    pub fn read_open_loop_sample(&mut self, index: u32, channel: Channel) -> AppResult<Option<f64>> {
        let response = self.transact(&Command::ReadSample { channel, index })?;
        let value = protocol::decode_sample(&response, channel, index);
        if value.is_none() {
            warn!("Malformed sample {}{}: {:?}", channel, index, response);
        }
        Ok(value)
    }

    /// Read back every channel of every configured sample, one round trip each.
    pub fn acquire_open_loop_data(&mut self) -> AppResult<Vec<OpenLoopSample>> {
        let mut data = Vec::new();
        for index in 0..self.samples {
            let mut sample = OpenLoopSample {
                index,
                ..Default::default()
            };
            for channel in Channel::ALL {
                let value = self.read_open_loop_sample(index, channel)?;
                sample.set(channel, value);
            }
            data.push(sample);
        }
        debug!("Read {} open-loop samples", data.len());
        Ok(data)
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// Last scanner target sent with `move_to`.
    pub fn scan_position(&self) -> Position {
        self.scan
    }

    /// Last photodiode position decoded from the board.
    pub fn photodiode_position(&self) -> Option<Position> {
        self.photodiode
    }

    /// Sampling frequency for open-loop captures, in Hz.
    pub fn sampling_frequency(&self) -> u32 {
        self.sampling_frequency
    }

    /// Set the sampling frequency used by the next `start_open_loop_scan`.
    pub fn set_sampling_frequency(&mut self, fs: u32) {
        self.sampling_frequency = fs;
    }

    /// Samples read back by `acquire_open_loop_data`.
    pub fn open_loop_samples(&self) -> u32 {
        self.samples
    }

    /// Set the number of samples read back, within `1..=max_samples`.
    pub fn set_open_loop_samples(&mut self, samples: u32) -> AppResult<()> {
        if samples == 0 || samples > self.max_samples {
            return Err(DaqError::Configuration(format!(
                "open-loop samples must be in 1..={}, got {}",
                self.max_samples, samples
            )));
        }
        self.samples = samples;
        Ok(())
    }

    /// Open-loop drive steps.
    pub fn open_loop_steps(&self) -> OpenLoopSteps {
        self.steps
    }

    /// Set the open-loop drive steps.
    pub fn set_open_loop_steps(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        self.steps = OpenLoopSteps { x1, y1, x2, y2 };
    }
}
