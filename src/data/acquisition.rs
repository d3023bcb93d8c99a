//! CMOS characterisation acquisition.
//!
//! Grabs a fixed number of frames from a connected [`Camera`] and records, per frame,
//! the mean and standard deviation over the current AOI (rounded to two decimals)
//! together with the value of the central pixel. The central pixel series is what the
//! noise histogram of the bench is built from.
//!
//! Both series advance together: row `k` of the pixel series (time index `k`) and row
//! `k` of the frame statistics (frame number `k + 1`) come from the same frame.

use crate::camera::Camera;
use crate::data::stats::{mean_stdev, round2, FrameStats};
use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one acquisition run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionResult {
    /// Per-frame mean and standard deviation, frames numbered from 1
    pub frame_stats: Vec<FrameStats>,
    /// `(time_index, value)` of the central pixel, time indices from 0
    pub pixel_series: Vec<(usize, f64)>,
}

impl AcquisitionResult {
    /// `(mean, stdev)` of the central-pixel series.
    pub fn pixel_summary(&self) -> Option<(f64, f64)> {
        let values: Vec<f64> = self.pixel_series.iter().map(|&(_, v)| v).collect();
        mean_stdev(&values)
    }
}

/// Grab `frames` frames, waiting `interval` between them.
///
/// Empty frames are skipped with a warning; SDK failures abort the run.
pub fn run(camera: &mut Camera, frames: usize, interval: Duration) -> AppResult<AcquisitionResult> {
    let mut result = AcquisitionResult::default();
    info!("Acquiring {} frames", frames);

    for index in 0..frames {
        if index > 0 && !interval.is_zero() {
            thread::sleep(interval);
        }

        let pixels = camera.grab_frame()?;
        let Some((mean, stdev)) = mean_stdev(&pixels) else {
            warn!("Frame {} is empty", index);
            continue;
        };
        let centre = f64::from(pixels[pixels.len() / 2]);

        let recorded = result.frame_stats.len();
        debug!("Frame {}: mean {:.2}, stdev {:.2}", recorded + 1, mean, stdev);
        result.frame_stats.push(FrameStats {
            index: recorded + 1,
            mean: round2(mean),
            stdev: round2(stdev),
        });
        result.pixel_series.push((recorded, centre));
    }

    info!("Acquisition finished: {} frames", result.frame_stats.len());
    Ok(result)
}
