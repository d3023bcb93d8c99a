//! Camera handle with explicit connection state
//!
//! [`Camera`] owns at most one opened [`CameraSdk`]. All operations that need the
//! hardware return [`DaqError::CameraNotConnected`] while disconnected.
//!
//! AOI changes follow a fixed sequence so no capture can run against a stale buffer:
//! stop capture → free buffer → negotiate + program AOI → allocate → restart capture.

use crate::camera::aoi::{Aoi, AoiGrid};
use crate::camera::sdk::{CameraDriver, CameraListing, CameraSdk, ColorMode, RawFrame, SensorInfo};
use crate::config::CameraConfig;
use crate::error::{AppResult, DaqError};
use tracing::{debug, info, warn};

/// Connection state of the camera.
pub enum CameraState {
    /// No camera opened
    Disconnected,
    /// Live SDK handle
    Connected(Connected),
}

/// Everything known about an opened camera.
pub struct Connected {
    sdk: Box<dyn CameraSdk>,
    sensor: SensorInfo,
    color_mode: ColorMode,
    buffer_allocated: bool,
    capturing: bool,
}

/// Camera used by the characterisation bench.
pub struct Camera {
    state: CameraState,
    grid: AoiGrid,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(AoiGrid::default())
    }
}

impl Camera {
    /// Disconnected camera using the given AOI grid rules.
    pub fn new(grid: AoiGrid) -> Self {
        Self {
            state: CameraState::Disconnected,
            grid,
        }
    }

    /// Camera configured from settings; still disconnected.
    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(AoiGrid {
            strict_y_bound: config.strict_y_bound,
        })
    }

    /// Cameras the driver can see.
    pub fn list(driver: &dyn CameraDriver) -> AppResult<Vec<CameraListing>> {
        driver.list_cameras()
    }

    /// Open a camera, reset it, select the color mode and start full-frame capture.
    pub fn connect(
        &mut self,
        driver: &dyn CameraDriver,
        id: u32,
        color_mode: ColorMode,
    ) -> AppResult<()> {
        if self.is_connected() {
            self.disconnect()?;
        }

        let mut sdk = driver.open(id)?;
        let sensor = match Self::prepare(sdk.as_mut(), color_mode) {
            Ok(sensor) => sensor,
            Err(e) => {
                if let Err(exit_err) = sdk.exit() {
                    warn!("Camera {} exit after failed setup: {}", id, exit_err);
                }
                return Err(e);
            }
        };
        info!(
            "Camera {} connected: sensor '{}' {}x{}, {}",
            id, sensor.name, sensor.max_width, sensor.max_height, color_mode
        );

        self.state = CameraState::Connected(Connected {
            sdk,
            sensor,
            color_mode,
            buffer_allocated: false,
            capturing: false,
        });
        self.set_full_frame()?;
        Ok(())
    }

    fn prepare(sdk: &mut dyn CameraSdk, color_mode: ColorMode) -> AppResult<SensorInfo> {
        sdk.reset_to_default()?;
        sdk.set_color_mode(color_mode)?;
        sdk.sensor_info()
    }

    /// Connect and apply the optional parameters from settings.
    pub fn connect_with_config(
        &mut self,
        driver: &dyn CameraDriver,
        config: &CameraConfig,
    ) -> AppResult<()> {
        self.connect(driver, config.id, config.color_mode()?)?;
        if let Some(fps) = config.frame_rate {
            self.set_frame_rate(fps)?;
        }
        if let Some(exposure) = config.exposure_ms {
            self.set_exposure(exposure)?;
        }
        if let Some(level) = config.black_level {
            self.set_black_level(level)?;
        }
        Ok(())
    }

    /// Stop capture, release the buffer and close the camera.
    pub fn disconnect(&mut self) -> AppResult<()> {
        let state = std::mem::replace(&mut self.state, CameraState::Disconnected);
        if let CameraState::Connected(mut cam) = state {
            if cam.capturing {
                cam.sdk.stop_capture()?;
            }
            if cam.buffer_allocated {
                cam.sdk.free_buffer()?;
            }
            cam.sdk.exit()?;
            info!("Camera disconnected");
        }
        Ok(())
    }

    /// Whether an SDK handle is held.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, CameraState::Connected(_))
    }

    /// AOI grid rules in effect.
    pub fn grid(&self) -> AoiGrid {
        self.grid
    }

    fn connected(&self) -> AppResult<&Connected> {
        match &self.state {
            CameraState::Connected(cam) => Ok(cam),
            CameraState::Disconnected => Err(DaqError::CameraNotConnected),
        }
    }

    fn connected_mut(&mut self) -> AppResult<&mut Connected> {
        match &mut self.state {
            CameraState::Connected(cam) => Ok(cam),
            CameraState::Disconnected => Err(DaqError::CameraNotConnected),
        }
    }

    /// Sensor description captured at connection.
    pub fn sensor(&self) -> AppResult<&SensorInfo> {
        Ok(&self.connected()?.sensor)
    }

    /// Color mode selected at connection.
    pub fn color_mode(&self) -> AppResult<ColorMode> {
        Ok(self.connected()?.color_mode)
    }

    /// Whether free-run capture is active.
    pub fn is_capturing(&self) -> bool {
        self.connected().map(|cam| cam.capturing).unwrap_or(false)
    }

    /// Serial number and id reported by the SDK.
    pub fn info(&self) -> AppResult<CameraListing> {
        self.connected()?.sdk.camera_info()
    }

    // ------------------------------------------------------------------
    // Area of interest
    // ------------------------------------------------------------------

    /// Pure range check against the sensor size. False while disconnected.
    pub fn is_aoi_in_range(&self, x: i32, y: i32, width: i32, height: i32) -> bool {
        match self.connected() {
            Ok(cam) => Aoi::new(x, y, width, height)
                .is_in_range(cam.sensor.max_width, cam.sensor.max_height),
            Err(_) => false,
        }
    }

    /// Snap the request to the sensor grid and apply it, pausing capture meanwhile.
    ///
    /// Returns the AOI actually programmed.
    pub fn set_aoi(&mut self, x: i32, y: i32, width: i32, height: i32) -> AppResult<Aoi> {
        let grid = self.grid;
        let cam = self.connected_mut()?;

        if cam.capturing {
            cam.sdk.stop_capture()?;
            cam.capturing = false;
        }
        if cam.buffer_allocated {
            cam.sdk.free_buffer()?;
            cam.buffer_allocated = false;
        }

        let requested = Aoi::new(x, y, width, height);
        let aoi = grid.negotiate(requested, cam.sensor.max_width, cam.sensor.max_height);
        if aoi != requested {
            debug!("AOI {} adjusted to {}", requested, aoi);
        }

        cam.sdk.set_aoi(aoi)?;
        cam.sdk
            .alloc_buffer(aoi.width, aoi.height, cam.color_mode.bits_per_pixel())?;
        cam.buffer_allocated = true;
        cam.sdk.start_capture()?;
        cam.capturing = true;

        info!("AOI set to {}", aoi);
        Ok(aoi)
    }

    /// [`set_aoi`](Self::set_aoi) after validating the request with the range check.
    pub fn set_aoi_checked(&mut self, aoi: Aoi) -> AppResult<Aoi> {
        if !self.is_aoi_in_range(aoi.x, aoi.y, aoi.width, aoi.height) {
            warn!("Rejected AOI {}", aoi);
            return Err(DaqError::InvalidAoi(aoi));
        }
        self.set_aoi(aoi.x, aoi.y, aoi.width, aoi.height)
    }

    /// Whole sensor.
    pub fn set_full_frame(&mut self) -> AppResult<Aoi> {
        let sensor = self.sensor()?;
        let full = Aoi::full_sensor(sensor.max_width, sensor.max_height);
        self.set_aoi(full.x, full.y, full.width, full.height)
    }

    /// AOI of the given size centred on the sensor.
    pub fn set_centered_aoi(&mut self, width: i32, height: i32) -> AppResult<Aoi> {
        let sensor = self.sensor()?;
        let aoi = Aoi::centered(width, height, sensor.max_width, sensor.max_height);
        self.set_aoi(aoi.x, aoi.y, aoi.width, aoi.height)
    }

    /// AOI reported by the SDK.
    pub fn aoi(&self) -> AppResult<Aoi> {
        self.connected()?.sdk.aoi()
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    /// Copy of the current frame buffer.
    pub fn grab_raw(&mut self) -> AppResult<RawFrame> {
        self.connected_mut()?.sdk.read_frame()
    }

    /// Current frame decoded to one value per pixel.
    pub fn grab_frame(&mut self) -> AppResult<Vec<u16>> {
        Ok(self.grab_raw()?.pixels())
    }

    // ------------------------------------------------------------------
    // Acquisition parameters
    // ------------------------------------------------------------------

    /// Exposure time in milliseconds.
    pub fn exposure(&self) -> AppResult<f64> {
        self.connected()?.sdk.exposure()
    }

    /// `(min, max)` exposure in milliseconds.
    pub fn exposure_range(&self) -> AppResult<(f64, f64)> {
        self.connected()?.sdk.exposure_range()
    }

    /// Set the exposure time in milliseconds.
    pub fn set_exposure(&mut self, exposure_ms: f64) -> AppResult<()> {
        debug!("Exposure -> {} ms", exposure_ms);
        self.connected_mut()?.sdk.set_exposure(exposure_ms)
    }

    /// Frame rate in frames per second.
    pub fn frame_rate(&self) -> AppResult<f64> {
        self.connected()?.sdk.frame_rate()
    }

    /// `(min, max, step)` frame rate derived from the frame time range.
    pub fn frame_rate_range(&self) -> AppResult<(f64, f64, f64)> {
        let (min_t, max_t, step_t) = self.connected()?.sdk.frame_time_range()?;
        Ok((1.0 / max_t, 1.0 / min_t, 1.0 / step_t))
    }

    /// Request a frame rate; returns the rate applied.
    pub fn set_frame_rate(&mut self, fps: f64) -> AppResult<f64> {
        let applied = self.connected_mut()?.sdk.set_frame_rate(fps)?;
        debug!("Frame rate -> {} fps (requested {})", applied, fps);
        Ok(applied)
    }

    /// Pixel clock in MHz.
    pub fn pixel_clock(&self) -> AppResult<u32> {
        self.connected()?.sdk.pixel_clock()
    }

    /// Set the pixel clock in MHz.
    pub fn set_pixel_clock(&mut self, mhz: u32) -> AppResult<()> {
        self.connected_mut()?.sdk.set_pixel_clock(mhz)
    }

    /// Black level offset.
    pub fn black_level(&self) -> AppResult<u32> {
        self.connected()?.sdk.black_level()
    }

    /// Set the black level offset.
    pub fn set_black_level(&mut self, level: u32) -> AppResult<()> {
        self.connected_mut()?.sdk.set_black_level(level)
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Camera shutdown failed: {}", e);
        }
    }
}
