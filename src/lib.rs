//! Core library for the bench_daq tools.
//!
//! Device communication for two independent laboratory bench instruments:
//!
//! - a USB CMOS camera, whose area of interest must be negotiated onto the sensor's
//!   fixed grid before it is handed to the vendor SDK ([`camera`])
//! - a microcontroller board driving a 2-axis scanner and reading a photodiode over a
//!   line-based serial protocol ([`instrument`], [`protocol`])
//!
//! Both are synchronous and blocking. Frame statistics and `;`-delimited export live
//! in [`data`].

pub mod adapters;
pub mod camera;
pub mod config;
pub mod data;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod protocol;
