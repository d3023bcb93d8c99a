//! Simulated camera SDK
//!
//! Stands in for the vendor SDK in tests and with `--simulate` on the command line.
//! Provides:
//! - a 2456x2054 sensor with a deterministic pixel pattern
//! - call logging for test verification
//! - per-operation failure injection

use crate::camera::aoi::Aoi;
use crate::camera::sdk::{
    check, CameraDriver, CameraListing, CameraSdk, ColorMode, RawFrame, SensorInfo,
};
use crate::error::{AppResult, DaqError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Status code returned by injected failures.
pub const SIMULATED_FAILURE: i32 = -1;

fn failure(operation: &'static str) -> DaqError {
    DaqError::Sdk {
        operation,
        code: SIMULATED_FAILURE,
    }
}

#[derive(Debug)]
struct SimState {
    color_mode: ColorMode,
    aoi: Aoi,
    buffer: Option<(i32, i32, u32)>,
    capturing: bool,
    frames_read: u64,
    exposure_ms: f64,
    frame_rate: f64,
    pixel_clock: u32,
    black_level: u32,
    failures: HashMap<&'static str, i32>,
    call_log: Vec<String>,
}

/// Shared handle onto a simulated camera. Clones observe the same state.
#[derive(Clone, Debug)]
pub struct SimulatedCamera {
    id: u32,
    sensor: SensorInfo,
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SimulatedCamera {
    /// Simulated camera with the bench sensor geometry.
    pub fn new(id: u32) -> Self {
        Self::with_sensor(id, 2456, 2054)
    }

    /// Simulated camera with a custom sensor size.
    pub fn with_sensor(id: u32, max_width: i32, max_height: i32) -> Self {
        Self {
            id,
            sensor: SensorInfo {
                max_width,
                max_height,
                name: "SIM-CMOS".to_string(),
                pixel_size: 345,
            },
            state: Arc::new(Mutex::new(SimState {
                color_mode: ColorMode::Mono8,
                aoi: Aoi::full_sensor(max_width, max_height),
                buffer: None,
                capturing: false,
                frames_read: 0,
                exposure_ms: 10.0,
                frame_rate: 10.0,
                pixel_clock: 30,
                black_level: 0,
                failures: HashMap::new(),
                call_log: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent call of `operation` fail with [`SIMULATED_FAILURE`].
    pub fn inject_failure(&self, operation: &'static str) {
        self.lock().failures.insert(operation, SIMULATED_FAILURE);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Names of the SDK operations called so far, in order.
    pub fn call_log(&self) -> Vec<String> {
        self.lock().call_log.clone()
    }

    /// Clear the call log.
    pub fn clear_log(&self) {
        self.lock().call_log.clear();
    }

    /// Whether a frame buffer is currently allocated.
    pub fn buffer(&self) -> Option<(i32, i32, u32)> {
        self.lock().buffer
    }

    /// Whether free-run capture is active.
    pub fn is_capturing(&self) -> bool {
        self.lock().capturing
    }

    fn call(&self, operation: &'static str) -> AppResult<MutexGuard<'_, SimState>> {
        let mut state = self.lock();
        state.call_log.push(operation.to_string());
        let status = state.failures.get(operation).copied().unwrap_or(0);
        check(operation, status)?;
        Ok(state)
    }

    fn pixel_value(mode: ColorMode, x: i32, y: i32, frame: u64, black_level: u32) -> u16 {
        // Smooth gradient plus a small frame-dependent ripple
        let base = ((x + 2 * y).rem_euclid(64)) as u32 * 2;
        let ripple = ((x as u64 * 31 + y as u64 * 17 + frame * 7) % 5) as u32;
        let value = base + ripple + black_level;
        value.min(u32::from(mode.max_value())) as u16
    }
}

impl CameraSdk for SimulatedCamera {
    fn camera_info(&self) -> AppResult<CameraListing> {
        self.call("is_GetCameraInfo")?;
        Ok(CameraListing {
            id: self.id,
            serial_number: format!("SIM{:05}", self.id),
            model: "Simulated CMOS".to_string(),
        })
    }

    fn sensor_info(&self) -> AppResult<SensorInfo> {
        self.call("is_GetSensorInfo")?;
        Ok(self.sensor.clone())
    }

    fn reset_to_default(&mut self) -> AppResult<()> {
        let mut state = self.call("is_ResetToDefault")?;
        state.color_mode = ColorMode::Mono8;
        state.aoi = Aoi::full_sensor(self.sensor.max_width, self.sensor.max_height);
        Ok(())
    }

    fn exit(&mut self) -> AppResult<()> {
        let mut state = self.call("is_ExitCamera")?;
        state.capturing = false;
        state.buffer = None;
        Ok(())
    }

    fn color_mode(&self) -> AppResult<ColorMode> {
        Ok(self.call("is_GetColorMode")?.color_mode)
    }

    fn set_color_mode(&mut self, mode: ColorMode) -> AppResult<()> {
        self.call("is_SetColorMode")?.color_mode = mode;
        Ok(())
    }

    fn aoi(&self) -> AppResult<Aoi> {
        Ok(self.call("is_AOI_get")?.aoi)
    }

    fn set_aoi(&mut self, aoi: Aoi) -> AppResult<()> {
        let mut state = self.call("is_AOI_set")?;
        if !aoi.is_in_range(self.sensor.max_width, self.sensor.max_height) {
            return Err(failure("is_AOI_set"));
        }
        state.aoi = aoi;
        Ok(())
    }

    fn alloc_buffer(&mut self, width: i32, height: i32, bits_per_pixel: u32) -> AppResult<()> {
        let mut state = self.call("is_AllocImageMem")?;
        if state.buffer.is_some() {
            return Err(failure("is_AllocImageMem"));
        }
        state.buffer = Some((width, height, bits_per_pixel));
        Ok(())
    }

    fn free_buffer(&mut self) -> AppResult<()> {
        let mut state = self.call("is_FreeImageMem")?;
        if state.buffer.take().is_none() {
            return Err(failure("is_FreeImageMem"));
        }
        Ok(())
    }

    fn start_capture(&mut self) -> AppResult<()> {
        let mut state = self.call("is_CaptureVideo")?;
        if state.buffer.is_none() {
            return Err(failure("is_CaptureVideo"));
        }
        state.capturing = true;
        Ok(())
    }

    fn stop_capture(&mut self) -> AppResult<()> {
        self.call("is_StopLiveVideo")?.capturing = false;
        Ok(())
    }

    fn read_frame(&mut self) -> AppResult<RawFrame> {
        let mut state = self.call("get_image")?;
        let Some((width, height, _)) = state.buffer.filter(|_| state.capturing) else {
            return Err(failure("get_image"));
        };

        let mode = state.color_mode;
        let frame = state.frames_read;
        let black_level = state.black_level;
        let origin = state.aoi;
        let (width, height) = (width.max(0) as usize, height.max(0) as usize);
        let bpp = mode.bytes_per_pixel();

        let mut data = Vec::with_capacity(width * height * bpp);
        for row in 0..height {
            for col in 0..width {
                let value = Self::pixel_value(
                    mode,
                    origin.x + col as i32,
                    origin.y + row as i32,
                    frame,
                    black_level,
                );
                if bpp == 1 {
                    data.push(value as u8);
                } else {
                    data.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        state.frames_read += 1;

        Ok(RawFrame {
            data,
            width,
            height,
            pitch: width * bpp,
            color_mode: mode,
        })
    }

    fn exposure(&self) -> AppResult<f64> {
        Ok(self.call("is_Exposure_get")?.exposure_ms)
    }

    fn exposure_range(&self) -> AppResult<(f64, f64)> {
        let state = self.call("is_Exposure_range")?;
        Ok((0.01, 1000.0 / state.frame_rate))
    }

    fn set_exposure(&mut self, exposure_ms: f64) -> AppResult<()> {
        let mut state = self.call("is_Exposure_set")?;
        let max = 1000.0 / state.frame_rate;
        state.exposure_ms = exposure_ms.clamp(0.01, max);
        Ok(())
    }

    fn frame_rate(&self) -> AppResult<f64> {
        Ok(self.call("is_GetFramesPerSecond")?.frame_rate)
    }

    fn frame_time_range(&self) -> AppResult<(f64, f64, f64)> {
        self.call("is_GetFrameTimeRange")?;
        Ok((0.02, 2.0, 0.001))
    }

    fn set_frame_rate(&mut self, fps: f64) -> AppResult<f64> {
        let mut state = self.call("is_SetFrameRate")?;
        state.frame_rate = fps.clamp(0.5, 50.0);
        Ok(state.frame_rate)
    }

    fn pixel_clock(&self) -> AppResult<u32> {
        Ok(self.call("is_PixelClock_get")?.pixel_clock)
    }

    fn set_pixel_clock(&mut self, mhz: u32) -> AppResult<()> {
        self.call("is_PixelClock_set")?.pixel_clock = mhz;
        Ok(())
    }

    fn black_level(&self) -> AppResult<u32> {
        Ok(self.call("is_Blacklevel_get")?.black_level)
    }

    fn set_black_level(&mut self, level: u32) -> AppResult<()> {
        self.call("is_Blacklevel_set")?.black_level = level;
        Ok(())
    }
}

/// Driver exposing a fixed set of simulated cameras.
#[derive(Clone, Debug, Default)]
pub struct SimulatedDriver {
    cameras: Vec<SimulatedCamera>,
}

impl SimulatedDriver {
    /// Driver with a single camera, id 0.
    pub fn new() -> Self {
        Self::with_cameras(vec![SimulatedCamera::new(0)])
    }

    /// Driver exposing the given cameras; tests keep clones to inspect them.
    pub fn with_cameras(cameras: Vec<SimulatedCamera>) -> Self {
        Self { cameras }
    }
}

impl CameraDriver for SimulatedDriver {
    fn list_cameras(&self) -> AppResult<Vec<CameraListing>> {
        self.cameras.iter().map(|cam| cam.camera_info()).collect()
    }

    fn open(&self, id: u32) -> AppResult<Box<dyn CameraSdk>> {
        match self.cameras.iter().find(|cam| cam.id == id) {
            Some(cam) => {
                cam.call("is_InitCamera")?;
                Ok(Box::new(cam.clone()))
            }
            None => Err(failure("is_InitCamera")),
        }
    }
}
