//! Summary statistics for frames and time series.
//!
//! Standard deviation is the population form (divide by `n`), matching what the
//! characterisation reports have always used.

use serde::{Deserialize, Serialize};

/// Mean and standard deviation of one frame, as exported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Frame number, counted from 1
    pub index: usize,
    /// Mean pixel value, two decimals
    pub mean: f64,
    /// Population standard deviation of the pixel values, two decimals
    pub stdev: f64,
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean of the values, `None` for an empty slice.
pub fn mean<T: Copy + Into<f64>>(values: &[T]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().map(|&v| v.into()).sum();
    Some(sum / values.len() as f64)
}

/// `(mean, population stdev)`, `None` for an empty slice.
pub fn mean_stdev<T: Copy + Into<f64>>(values: &[T]) -> Option<(f64, f64)> {
    let mean = mean(values)?;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v.into() - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    Some((mean, variance.sqrt()))
}
