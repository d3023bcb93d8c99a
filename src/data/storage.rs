//! Flat delimited-text export.
//!
//! Files are `;`-separated, have no header row, and print every value with six
//! decimals (`%f`), so they load directly into the spreadsheets used on the bench.

use crate::data::acquisition::AcquisitionResult;
use crate::data::stats::FrameStats;
use crate::error::AppResult;
use crate::instrument::OpenLoopSample;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Field separator of exported files.
pub const DELIMITER: u8 = b';';

fn writer(path: &Path) -> AppResult<csv::Writer<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .from_path(path)?)
}

fn fixed(value: f64) -> String {
    format!("{value:.6}")
}

fn optional(value: Option<f64>) -> String {
    value.map(fixed).unwrap_or_default()
}

/// `index;mean;stdev`, one row per frame. Values are written as given.
pub fn write_frame_statistics(path: &Path, rows: &[FrameStats]) -> AppResult<()> {
    let mut wtr = writer(path)?;
    for row in rows {
        wtr.write_record([fixed(row.index as f64), fixed(row.mean), fixed(row.stdev)])?;
    }
    wtr.flush()?;
    info!("Wrote {} frame rows to '{}'", rows.len(), path.display());
    Ok(())
}

/// `time_index;value`, one row per sample.
pub fn write_time_series(path: &Path, rows: &[(usize, f64)]) -> AppResult<()> {
    let mut wtr = writer(path)?;
    for &(index, value) in rows {
        wtr.write_record([fixed(index as f64), fixed(value)])?;
    }
    wtr.flush()?;
    info!("Wrote {} samples to '{}'", rows.len(), path.display());
    Ok(())
}

/// `index;x;y;step`; channels that could not be read are left empty.
pub fn write_open_loop(path: &Path, rows: &[OpenLoopSample]) -> AppResult<()> {
    let mut wtr = writer(path)?;
    for row in rows {
        wtr.write_record([
            fixed(f64::from(row.index)),
            optional(row.x),
            optional(row.y),
            optional(row.step),
        ])?;
    }
    wtr.flush()?;
    info!("Wrote {} open-loop samples to '{}'", rows.len(), path.display());
    Ok(())
}

/// Write `<name>_pixel_time.csv` and `<name>_frame_mean.csv` into `dir`.
///
/// Returns the two paths in that order.
pub fn export_session(
    dir: &Path,
    name: &str,
    result: &AcquisitionResult,
) -> AppResult<(PathBuf, PathBuf)> {
    let pixel_path = dir.join(format!("{name}_pixel_time.csv"));
    let frame_path = dir.join(format!("{name}_frame_mean.csv"));
    write_time_series(&pixel_path, &result.pixel_series)?;
    write_frame_statistics(&frame_path, &result.frame_stats)?;
    Ok((pixel_path, frame_path))
}

/// Timestamped default name, e.g. `session_20260101_120000`.
pub fn session_name() -> String {
    format!("session_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}
