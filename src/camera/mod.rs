//! CMOS camera support.
//!
//! - [`aoi`] - area-of-interest grid quantization and range checks
//! - [`sdk`] - the capability boundary to the vendor SDK
//! - [`device`] - connection state, AOI negotiation and parameter access
//! - [`simulated`] - an in-process SDK for tests and dry runs

pub mod aoi;
pub mod device;
pub mod sdk;
pub mod simulated;

pub use aoi::{is_aoi_in_range, Aoi, AoiGrid};
pub use device::Camera;
pub use sdk::{CameraDriver, CameraSdk, ColorMode};
pub use simulated::{SimulatedCamera, SimulatedDriver};
