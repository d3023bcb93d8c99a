//! Area-of-interest negotiation
//!
//! The sensor only accepts AOIs on a fixed grid:
//!
//! | field  | range           | step |
//! |--------|-----------------|------|
//! | x      | 0 ..= 2456      | 4    |
//! | y      | 0 ..= 2054      | 2    |
//! | width  | 256 ..= 2456    | 8    |
//! | height | 256 ..= 2054    | 2    |
//!
//! [`AoiGrid::adjust`] snaps a requested rectangle down to the closest legal one.
//! [`AoiGrid::negotiate`] additionally pulls the origin back so the rectangle lies on
//! the sensor, which is what the camera layer hands to the SDK.
//!
//! ## Upper bound on `y`
//!
//! Deployed tooling clamps `y` to its maximum when **`x`** exceeds 2054, not when `y`
//! does. [`AoiGrid::default`] keeps that behaviour so existing callers see the same
//! rectangles; set [`AoiGrid::strict_y_bound`] to test `y` itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest accepted origin x, also the largest width.
pub const X_MAX: i32 = 2456;
/// Largest accepted origin y, also the largest height.
pub const Y_MAX: i32 = 2054;
/// Smallest accepted width.
pub const WIDTH_MIN: i32 = 256;
/// Smallest accepted height.
pub const HEIGHT_MIN: i32 = 256;

const X_STEP: i32 = 4;
const Y_STEP: i32 = 2;
const WIDTH_STEP: i32 = 8;
const HEIGHT_STEP: i32 = 2;

/// Sub-rectangle of the sensor, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aoi {
    /// Top-left X coordinate
    pub x: i32,
    /// Top-left Y coordinate
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Aoi {
    /// Build an AOI from its origin and size.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// AOI covering a whole sensor.
    pub const fn full_sensor(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// AOI of the given size centred on the sensor. Not quantized.
    pub const fn centered(width: i32, height: i32, sensor_width: i32, sensor_height: i32) -> Self {
        Self::new(
            sensor_width / 2 - width / 2,
            sensor_height / 2 - height / 2,
            width,
            height,
        )
    }

    /// Number of pixels covered, zero for degenerate rectangles.
    pub fn pixel_count(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }

    /// Tuple form `(x, y, width, height)`.
    pub const fn as_tuple(&self) -> (i32, i32, i32, i32) {
        (self.x, self.y, self.width, self.height)
    }

    /// Whether the rectangle lies on a sensor of the given size.
    ///
    /// Pure bounds check with no quantization; boundary-exact rectangles are accepted.
    pub fn is_in_range(&self, sensor_width: i32, sensor_height: i32) -> bool {
        is_aoi_in_range(
            self.x,
            self.y,
            self.width,
            self.height,
            sensor_width,
            sensor_height,
        )
    }
}

impl fmt::Display for Aoi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

impl From<(i32, i32, i32, i32)> for Aoi {
    fn from((x, y, width, height): (i32, i32, i32, i32)) -> Self {
        Self::new(x, y, width, height)
    }
}

/// Range check used to validate user-entered AOI values before they are accepted.
pub fn is_aoi_in_range(
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    sensor_width: i32,
    sensor_height: i32,
) -> bool {
    let origin_ok = (0..sensor_width).contains(&x) && (0..sensor_height).contains(&y);
    // i64 so that huge user input cannot wrap around into range
    let x_end = i64::from(x) + i64::from(width);
    let y_end = i64::from(y) + i64::from(height);
    let extent_ok = x_end > 0
        && x_end <= i64::from(sensor_width)
        && y_end > 0
        && y_end <= i64::from(sensor_height);
    origin_ok && extent_ok
}

/// Quantization rules for the sensor grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoiGrid {
    /// Clamp `y` to [`Y_MAX`] when `y` exceeds it. When false, the test is made on `x`.
    pub strict_y_bound: bool,
}

impl AoiGrid {
    /// Grid with the corrected `y` upper-bound test.
    pub const fn strict() -> Self {
        Self {
            strict_y_bound: true,
        }
    }

    /// Snap a requested rectangle to the closest (smaller) legal one.
    ///
    /// Total over all integer inputs: out-of-range values are clamped, never rejected.
    pub fn adjust(&self, x: i32, y: i32, width: i32, height: i32) -> Aoi {
        let x0 = snap(x, 0, X_MAX, X_STEP);

        let y_over = if self.strict_y_bound { y > Y_MAX } else { x > Y_MAX };
        let y0 = if y < 0 {
            0
        } else if y_over {
            Y_MAX
        } else {
            floor_to(y, Y_STEP)
        };

        let width0 = snap(width, WIDTH_MIN, X_MAX, WIDTH_STEP);
        let height0 = snap(height, HEIGHT_MIN, Y_MAX, HEIGHT_STEP);

        Aoi::new(x0, y0, width0, height0)
    }

    /// [`adjust`](Self::adjust) applied to an [`Aoi`].
    pub fn adjust_aoi(&self, aoi: Aoi) -> Aoi {
        self.adjust(aoi.x, aoi.y, aoi.width, aoi.height)
    }

    /// Adjust, then pull the origin back (on its own grid) until the rectangle lies on
    /// the sensor. Sizes larger than the sensor are reduced to the largest legal size.
    pub fn negotiate(&self, requested: Aoi, sensor_width: i32, sensor_height: i32) -> Aoi {
        let adjusted = self.adjust_aoi(requested);

        let width = adjusted.width.min(floor_to(sensor_width, WIDTH_STEP));
        let height = adjusted.height.min(floor_to(sensor_height, HEIGHT_STEP));
        let x = adjusted.x.min(floor_to(sensor_width - width, X_STEP)).max(0);
        let y = adjusted.y.min(floor_to(sensor_height - height, Y_STEP)).max(0);

        Aoi::new(x, y, width, height)
    }
}

/// Clamp to `[min, max]`; values strictly inside are rounded down to `step`.
fn snap(value: i32, min: i32, max: i32, step: i32) -> i32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        floor_to(value, step)
    }
}

fn floor_to(value: i32, step: i32) -> i32 {
    value - value.rem_euclid(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENSOR_W: i32 = 2456;
    const SENSOR_H: i32 = 2054;

    fn on_grid(aoi: &Aoi) -> bool {
        aoi.x % 4 == 0 && aoi.y % 2 == 0 && aoi.width % 8 == 0 && aoi.height % 2 == 0
    }

    #[test]
    fn test_full_frame_unchanged() {
        let grid = AoiGrid::default();
        assert_eq!(grid.adjust(0, 0, 2456, 2054), Aoi::new(0, 0, 2456, 2054));
    }

    #[test]
    fn test_negative_origin_and_small_size_clamp() {
        let grid = AoiGrid::default();
        assert_eq!(grid.adjust(-5, -5, 100, 100), Aoi::new(0, 0, 256, 256));
    }

    #[test]
    fn test_rounds_down_to_grid() {
        let grid = AoiGrid::default();
        assert_eq!(grid.adjust(10, 10, 1000, 401), Aoi::new(8, 10, 1000, 400));
        assert_eq!(grid.adjust(7, 3, 1007, 1001), Aoi::new(4, 2, 1000, 1000));
    }

    #[test]
    fn test_oversize_clamps_to_maximum() {
        let grid = AoiGrid::default();
        assert_eq!(
            grid.adjust(9000, 9000, 9000, 9000),
            Aoi::new(2456, 2054, 2456, 2054)
        );
    }

    #[test]
    fn test_y_upper_bound_follows_x_by_default() {
        let grid = AoiGrid::default();
        // y above its maximum passes through when x is small
        assert_eq!(grid.adjust(0, 3001, 256, 256).y, 3000);
        // and is clamped whenever x is large, whatever y is
        assert_eq!(grid.adjust(2100, 10, 256, 256).y, 2054);
    }

    #[test]
    fn test_strict_y_bound() {
        let grid = AoiGrid::strict();
        assert_eq!(grid.adjust(0, 3001, 256, 256).y, 2054);
        assert_eq!(grid.adjust(2100, 10, 256, 256).y, 10);
    }

    #[test]
    fn test_adjust_is_on_grid_and_idempotent() {
        let samples = [
            i32::MIN,
            -1000,
            -1,
            0,
            1,
            3,
            255,
            257,
            1023,
            2053,
            2054,
            2055,
            2455,
            2456,
            2457,
            10_000,
            i32::MAX,
        ];
        for grid in [AoiGrid::default(), AoiGrid::strict()] {
            for &x in &samples {
                for &y in &samples {
                    for &w in &samples {
                        for &h in &[0, 256, 401, 2054, 5000] {
                            let once = grid.adjust(x, y, w, h);
                            assert!(on_grid(&once), "{once:?} from ({x},{y},{w},{h})");
                            assert!((0..=X_MAX).contains(&once.x));
                            assert!((WIDTH_MIN..=X_MAX).contains(&once.width));
                            assert!((HEIGHT_MIN..=Y_MAX).contains(&once.height));
                            if grid.strict_y_bound {
                                assert!((0..=Y_MAX).contains(&once.y));
                            }
                            assert_eq!(grid.adjust_aoi(once), once);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_negotiate_fits_sensor() {
        let grid = AoiGrid::default();
        let aoi = grid.negotiate(Aoi::new(2400, 2000, 1000, 400), SENSOR_W, SENSOR_H);
        assert!(on_grid(&aoi));
        assert!(aoi.is_in_range(SENSOR_W, SENSOR_H));
        assert_eq!(aoi, Aoi::new(1456, 1654, 1000, 400));
    }

    #[test]
    fn test_negotiate_on_small_sensor() {
        let grid = AoiGrid::strict();
        let aoi = grid.negotiate(Aoi::new(0, 0, 2456, 2054), 1280, 1024);
        assert_eq!(aoi, Aoi::new(0, 0, 1280, 1024));
        assert!(aoi.is_in_range(1280, 1024));
    }

    #[test]
    fn test_negotiate_keeps_legal_request() {
        let grid = AoiGrid::default();
        let requested = Aoi::new(200, 300, 1000, 400);
        assert_eq!(grid.negotiate(requested, SENSOR_W, SENSOR_H), requested);
    }

    #[test]
    fn test_in_range_accepts_boundary_exact() {
        assert!(is_aoi_in_range(456, 54, 2000, 2000, SENSOR_W, SENSOR_H));
        assert!(is_aoi_in_range(0, 0, SENSOR_W, SENSOR_H, SENSOR_W, SENSOR_H));
    }

    #[test]
    fn test_in_range_rejects_overflowing_extent() {
        assert!(!is_aoi_in_range(457, 0, 2000, 256, SENSOR_W, SENSOR_H));
        assert!(!is_aoi_in_range(0, 55, 256, 2000, SENSOR_W, SENSOR_H));
        assert!(!is_aoi_in_range(-1, 0, 256, 256, SENSOR_W, SENSOR_H));
        assert!(!is_aoi_in_range(SENSOR_W, 0, 0, 256, SENSOR_W, SENSOR_H));
        assert!(!is_aoi_in_range(0, 0, 0, 0, SENSOR_W, SENSOR_H));
        assert!(!is_aoi_in_range(10, 10, i32::MAX, 256, SENSOR_W, SENSOR_H));
    }

    #[test]
    fn test_centered() {
        let aoi = Aoi::centered(1000, 400, SENSOR_W, SENSOR_H);
        assert_eq!(aoi, Aoi::new(728, 827, 1000, 400));
    }

    #[test]
    fn test_display() {
        assert_eq!(Aoi::new(8, 10, 1000, 400).to_string(), "1000x400+8+10");
    }
}
