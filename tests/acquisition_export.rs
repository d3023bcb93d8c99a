//! Frame acquisition on the simulated camera and session export.

use bench_daq::camera::sdk::ColorMode;
use bench_daq::camera::{Camera, SimulatedCamera, SimulatedDriver};
use bench_daq::data::{acquisition, storage};
use std::time::Duration;
use tempfile::tempdir;

fn small_aoi_camera(sim: &SimulatedCamera) -> Camera {
    let driver = SimulatedDriver::with_cameras(vec![sim.clone()]);
    let mut camera = Camera::default();
    camera.connect(&driver, 0, ColorMode::Mono8).unwrap();
    camera.set_aoi(0, 0, 256, 256).unwrap();
    camera
}

#[test]
fn test_acquire_and_export_session() {
    let sim = SimulatedCamera::new(0);
    let mut camera = small_aoi_camera(&sim);

    let result = acquisition::run(&mut camera, 5, Duration::ZERO).unwrap();
    assert_eq!(result.frame_stats.len(), 5);
    assert_eq!(result.pixel_series.len(), 5);
    for (i, stats) in result.frame_stats.iter().enumerate() {
        assert_eq!(stats.index, i + 1);
        assert_eq!(result.pixel_series[i].0, i);
        assert!(stats.mean > 0.0 && stats.mean < 255.0);
        assert!(stats.stdev > 0.0);
        assert_eq!(stats.mean, (stats.mean * 100.0).round() / 100.0);
        assert_eq!(stats.stdev, (stats.stdev * 100.0).round() / 100.0);
    }
    let (mean, stdev) = result.pixel_summary().unwrap();
    assert!(mean > 0.0);
    assert!(stdev >= 0.0);

    let dir = tempdir().unwrap();
    let (pixel_path, frame_path) = storage::export_session(dir.path(), "dark", &result).unwrap();
    assert_eq!(pixel_path, dir.path().join("dark_pixel_time.csv"));
    assert_eq!(frame_path, dir.path().join("dark_frame_mean.csv"));

    let pixel = std::fs::read_to_string(&pixel_path).unwrap();
    let lines: Vec<&str> = pixel.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("0.000000;"));
    assert!(lines[4].starts_with("4.000000;"));

    let frames = std::fs::read_to_string(&frame_path).unwrap();
    let frame_lines: Vec<&str> = frames.lines().collect();
    assert_eq!(frame_lines.len(), 5);
    assert!(frame_lines[0].starts_with("1.000000;"));
    assert!(frame_lines[4].starts_with("5.000000;"));
    for line in frame_lines {
        let fields: Vec<&str> = line.split(';').collect();
        assert_eq!(fields.len(), 3);
        assert!(fields.iter().all(|f| f.split('.').nth(1).map(str::len) == Some(6)));
        // mean and stdev carry two significant decimals
        assert!(fields[1..].iter().all(|f| f.ends_with("0000")));
    }
}

#[test]
fn test_acquisition_stops_on_sdk_failure() {
    let sim = SimulatedCamera::new(0);
    let mut camera = small_aoi_camera(&sim);
    sim.inject_failure("get_image");

    assert!(acquisition::run(&mut camera, 3, Duration::ZERO).is_err());
}

#[test]
fn test_zero_frames() {
    let sim = SimulatedCamera::new(0);
    let mut camera = small_aoi_camera(&sim);

    let result = acquisition::run(&mut camera, 0, Duration::ZERO).unwrap();
    assert!(result.frame_stats.is_empty());
    assert_eq!(result.pixel_summary(), None);
}
