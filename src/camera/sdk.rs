//! Camera SDK capability boundary
//!
//! The vendor SDK is opaque to this crate. Everything the camera layer needs from it is
//! expressed by [`CameraSdk`] (one opened camera) and [`CameraDriver`] (enumeration and
//! opening). Bindings to a real SDK translate its integer status codes with [`check`],
//! so every failing call surfaces as [`DaqError::Sdk`] carrying the operation name.

use crate::camera::aoi::Aoi;
use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status code the SDK returns on success.
pub const SDK_SUCCESS: i32 = 0;

/// Map an SDK status code to a result.
pub fn check(operation: &'static str, status: i32) -> AppResult<()> {
    if status == SDK_SUCCESS {
        Ok(())
    } else {
        Err(DaqError::Sdk {
            operation,
            code: status,
        })
    }
}

/// Monochrome pixel formats supported by the characterisation bench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorMode {
    /// 8-bit monochrome
    Mono8,
    /// 10-bit monochrome, one pixel per 16-bit word
    Mono10,
    /// 12-bit monochrome, one pixel per 16-bit word
    Mono12,
}

impl ColorMode {
    /// Name used in configuration files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMode::Mono8 => "MONO8",
            ColorMode::Mono10 => "MONO10",
            ColorMode::Mono12 => "MONO12",
        }
    }

    /// Significant bits per pixel.
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            ColorMode::Mono8 => 8,
            ColorMode::Mono10 => 10,
            ColorMode::Mono12 => 12,
        }
    }

    /// Bytes each pixel occupies in the frame buffer.
    pub fn bytes_per_pixel(&self) -> usize {
        if self.bits_per_pixel() > 8 {
            2
        } else {
            1
        }
    }

    /// Largest raw value a pixel can hold.
    pub fn max_value(&self) -> u16 {
        ((1u32 << self.bits_per_pixel()) - 1) as u16
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorMode {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MONO8" => Ok(ColorMode::Mono8),
            "MONO10" => Ok(ColorMode::Mono10),
            "MONO12" => Ok(ColorMode::Mono12),
            _ => Err(DaqError::UnsupportedColorMode(s.to_string())),
        }
    }
}

/// One entry of the connected-camera list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraListing {
    /// SDK camera id
    pub id: u32,
    /// Serial number
    pub serial_number: String,
    /// Full model name
    pub model: String,
}

/// Static description of the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    /// Maximum AOI width
    pub max_width: i32,
    /// Maximum AOI height
    pub max_height: i32,
    /// Sensor name
    pub name: String,
    /// Pixel pitch in 1/100 µm
    pub pixel_size: u32,
}

/// Frame buffer contents as delivered by the SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Row-major bytes, `pitch` bytes per row
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// Bytes per row, including padding
    pub pitch: usize,
    /// Color mode the buffer was filled with
    pub color_mode: ColorMode,
}

impl RawFrame {
    /// Decode to one `u16` per pixel, dropping row padding.
    ///
    /// Wide pixels are little-endian. Rows shorter than expected are ignored.
    pub fn pixels(&self) -> Vec<u16> {
        let bpp = self.color_mode.bytes_per_pixel();
        let row_bytes = self.width * bpp;
        let mut out = Vec::with_capacity(self.width * self.height);

        for row in self.data.chunks(self.pitch.max(row_bytes)).take(self.height) {
            let Some(row) = row.get(..row_bytes) else {
                break;
            };
            if bpp == 1 {
                out.extend(row.iter().map(|&b| u16::from(b)));
            } else {
                out.extend(
                    row.chunks_exact(2)
                        .map(|pair| u16::from_le_bytes([pair[0], pair[1]])),
                );
            }
        }
        out
    }
}

/// One opened camera.
///
/// Every method maps to a single SDK call. Implementations report failed calls as
/// [`DaqError::Sdk`]; they never retry.
pub trait CameraSdk: Send {
    /// Serial number and id of the opened camera.
    fn camera_info(&self) -> AppResult<CameraListing>;
    /// Sensor limits and description.
    fn sensor_info(&self) -> AppResult<SensorInfo>;
    /// Restore the camera's factory defaults.
    fn reset_to_default(&mut self) -> AppResult<()>;
    /// Release the camera. Further calls are invalid.
    fn exit(&mut self) -> AppResult<()>;

    /// Current color mode.
    fn color_mode(&self) -> AppResult<ColorMode>;
    /// Change the color mode.
    fn set_color_mode(&mut self, mode: ColorMode) -> AppResult<()>;

    /// AOI currently programmed.
    fn aoi(&self) -> AppResult<Aoi>;
    /// Program an AOI. The rectangle must already be on the sensor grid.
    fn set_aoi(&mut self, aoi: Aoi) -> AppResult<()>;

    /// Allocate the frame buffer and make it active.
    fn alloc_buffer(&mut self, width: i32, height: i32, bits_per_pixel: u32) -> AppResult<()>;
    /// Free the active frame buffer.
    fn free_buffer(&mut self) -> AppResult<()>;
    /// Start free-run capture into the active buffer.
    fn start_capture(&mut self) -> AppResult<()>;
    /// Stop free-run capture.
    fn stop_capture(&mut self) -> AppResult<()>;
    /// Copy of the active buffer.
    fn read_frame(&mut self) -> AppResult<RawFrame>;

    /// Exposure time in milliseconds.
    fn exposure(&self) -> AppResult<f64>;
    /// `(min, max)` exposure in milliseconds for the current frame rate.
    fn exposure_range(&self) -> AppResult<(f64, f64)>;
    /// Set the exposure time in milliseconds.
    fn set_exposure(&mut self, exposure_ms: f64) -> AppResult<()>;

    /// Current frame rate in frames per second.
    fn frame_rate(&self) -> AppResult<f64>;
    /// `(min, max, step)` frame time in seconds.
    fn frame_time_range(&self) -> AppResult<(f64, f64, f64)>;
    /// Request a frame rate; returns the rate actually applied.
    fn set_frame_rate(&mut self, fps: f64) -> AppResult<f64>;

    /// Pixel clock in MHz.
    fn pixel_clock(&self) -> AppResult<u32>;
    /// Set the pixel clock in MHz.
    fn set_pixel_clock(&mut self, mhz: u32) -> AppResult<()>;

    /// Black level offset.
    fn black_level(&self) -> AppResult<u32>;
    /// Set the black level offset.
    fn set_black_level(&mut self, level: u32) -> AppResult<()>;
}

/// Entry point of an SDK: enumerate and open cameras.
pub trait CameraDriver {
    /// Cameras currently attached.
    fn list_cameras(&self) -> AppResult<Vec<CameraListing>>;
    /// Initialise and open the camera with the given id.
    fn open(&self, id: u32) -> AppResult<Box<dyn CameraSdk>>;
}
