//! Scanner/photodiode controller wire protocol
//!
//! ASCII frames of underscore-separated tokens. Token 0 is the command letter and
//! every frame except the connection check ends with `_!`, followed by the configured
//! line terminator.
//!
//! | Command          | Request                        | Response                  |
//! |------------------|--------------------------------|---------------------------|
//! | Stop             | `O_!`                          | none                      |
//! | Query position   | `A_!`                          | `A_<x>_<y>_!`             |
//! | Move             | `M_<x>_<y>_!`                  | `M_<x>_<y>_<px>_<py>_!`   |
//! | Connection check | `C`                            | anything starting with `C`|
//! | Start open loop  | `S_<x1>_<x2>_<y1>_<y2>_<fs>_!` | `S_OK!` or `S_NK!`        |
//! | Reset open loop  | `R_!`                          | none                      |
//! | Read sample      | `T_<channel>_<index>_!`        | `T_<channel>_<index>_<value>_!` |
//!
//! Decoders never fail: a response with the wrong command letter, the wrong token
//! count or a non-numeric field decodes to `None`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marks the end of a frame.
pub const FRAME_END: &str = "!";

/// Open-loop sample channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Photodiode X
    X,
    /// Photodiode Y
    Y,
    /// Step (drive) value
    Step,
}

impl Channel {
    /// All channels in the order they are read back.
    pub const ALL: [Channel; 3] = [Channel::X, Channel::Y, Channel::Step];

    /// Letter used on the wire.
    pub fn letter(&self) -> char {
        match self {
            Channel::X => 'X',
            Channel::Y => 'Y',
            Channel::Step => 'S',
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Outbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Halt motion
    Stop,
    /// Read the photodiode position
    QueryPosition,
    /// Drive the scanner and report the resulting photodiode position
    Move {
        /// Scanner X target
        x: f64,
        /// Scanner Y target
        y: f64,
    },
    /// Liveness probe
    ConnectionCheck,
    /// Begin step-response capture
    StartOpenLoop {
        /// First step X
        x1: i32,
        /// Second step X
        x2: i32,
        /// First step Y
        y1: i32,
        /// Second step Y
        y2: i32,
        /// Sampling frequency in Hz
        fs: u32,
    },
    /// Abort/reset step-response capture
    ResetOpenLoop,
    /// Fetch one sample of one channel
    ReadSample {
        /// Channel to read
        channel: Channel,
        /// Sample index
        index: u32,
    },
}

impl Command {
    /// Command letter (token 0).
    pub fn letter(&self) -> char {
        match self {
            Command::Stop => 'O',
            Command::QueryPosition => 'A',
            Command::Move { .. } => 'M',
            Command::ConnectionCheck => 'C',
            Command::StartOpenLoop { .. } => 'S',
            Command::ResetOpenLoop => 'R',
            Command::ReadSample { .. } => 'T',
        }
    }

    /// Whether the board answers this command.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Command::Stop | Command::ResetOpenLoop)
    }

    /// Frame body without line terminator.
    pub fn frame(&self) -> String {
        match self {
            Command::Stop => "O_!".to_string(),
            Command::QueryPosition => "A_!".to_string(),
            Command::Move { x, y } => format!("M_{x}_{y}_!"),
            Command::ConnectionCheck => "C".to_string(),
            Command::StartOpenLoop {
                x1,
                x2,
                y1,
                y2,
                fs,
            } => format!("S_{x1}_{x2}_{y1}_{y2}_{fs}_!"),
            Command::ResetOpenLoop => "R_!".to_string(),
            Command::ReadSample { channel, index } => format!("T_{channel}_{index}_!"),
        }
    }

    /// Bytes to put on the wire. The connection check is sent bare.
    pub fn encode(&self, line_terminator: &str) -> String {
        match self {
            Command::ConnectionCheck => self.frame(),
            _ => format!("{}{}", self.frame(), line_terminator),
        }
    }
}

/// 2-D position reported by the board.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Position {
    /// Position from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Acknowledgement of `StartOpenLoop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenLoopAck {
    /// `S_OK!`
    Accepted,
    /// `S_NK!`: requested sample count exceeds the board's limit
    Rejected,
}

/// Split a response into tokens after dropping line endings and surrounding blanks.
pub fn tokens(response: &str) -> Vec<&str> {
    response.trim().split('_').collect()
}

fn field(token: &str) -> Option<f64> {
    token.trim().parse().ok()
}

/// Largest difference between a move target and its echo that still counts as the same.
pub const ECHO_TOLERANCE: f64 = 1e-4;

/// `A_<x>_<y>_!` → position. Exactly 4 tokens, token 0 must be `A`.
pub fn decode_position(response: &str) -> Option<Position> {
    match tokens(response).as_slice() {
        ["A", x, y, _] => Some(Position::new(field(x)?, field(y)?)),
        _ => None,
    }
}

/// `M_<x>_<y>_<px>_<py>_!` → measured position `(px, py)`. Exactly 6 tokens, token 0
/// must be `M`.
pub fn decode_move(response: &str) -> Option<Position> {
    match tokens(response).as_slice() {
        ["M", _, _, px, py, _] => Some(Position::new(field(px)?, field(py)?)),
        _ => None,
    }
}

/// [`decode_move`], additionally requiring the echoed target to be `(x, y)`.
///
/// A reply to an earlier move that arrived late echoes a different target.
pub fn decode_move_for(response: &str, x: f64, y: f64) -> Option<Position> {
    let echoes = |token: &str, target: f64| {
        field(token).is_some_and(|v| (v - target).abs() <= ECHO_TOLERANCE)
    };
    match tokens(response).as_slice() {
        ["M", ex, ey, _, _, _] if echoes(*ex, x) && echoes(*ey, y) => decode_move(response),
        _ => None,
    }
}

/// `S_OK!` / `S_NK!`.
pub fn decode_open_loop_ack(response: &str) -> Option<OpenLoopAck> {
    match response.trim() {
        "S_OK!" => Some(OpenLoopAck::Accepted),
        "S_NK!" => Some(OpenLoopAck::Rejected),
        _ => None,
    }
}

/// `T_<channel>_<index>_<value>_!`, checked against the request it answers.
pub fn decode_sample(response: &str, channel: Channel, index: u32) -> Option<f64> {
    match tokens(response).as_slice() {
        ["T", ch, idx, value, _]
            if ch.len() == 1
                && ch.starts_with(channel.letter())
                && idx.parse::<u32>().ok() == Some(index) =>
        {
            field(value)
        }
        _ => None,
    }
}

/// Connection check succeeds when the first decoded character is `C`.
pub fn is_connection_ack(response: &str) -> bool {
    response.starts_with('C')
}

/// Whether a buffered response holds a complete `_!`/`!` terminated frame.
pub fn is_complete(response: &str) -> bool {
    response.trim_end().ends_with(FRAME_END)
}
