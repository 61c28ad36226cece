//! Point and lookup-table types shared by every backend
//!
//! All values are f32 so that CPU and GPU results stay comparable, and
//! `Point` is repr(C) so a position buffer uploads directly as a WGSL
//! `array<vec2<f32>>`.

use std::ops::{Add, AddAssign, Div, Mul, Sub};

#[cfg(feature = "gpu")]
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::error::{ForceError, ForceResult};

// =============================================================================
// Default Constants
// =============================================================================

/// Default fraction of tiles visited per step (every 7th tile)
pub const TILES_PER_ITERATION: u32 = 7;

/// Default energy with which points repulse each other
pub const POINT_REPULSION: f32 = -0.00001;

/// Default strength of the pull toward the canvas center
pub const GRAVITY_FROM_CENTER: f32 = 0.2;

/// Energy with which the walls repulse points, when wall repulsion is enabled
pub const WALL_REPULSION: f32 = -0.0002;

/// Length of the random offset table
pub const RAND_LENGTH: usize = 73;

/// A 2D position.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "gpu", derive(Pod, Zeroable))]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared length. The force law works on squared distances so no root is taken.
    pub fn length_squared(self) -> f32 {
        (self.x * self.x) + (self.y * self.y)
    }

    /// Component-wise clamp with shader semantics: `min(max(v, lo), hi)`.
    ///
    /// Never panics; a NaN bound is ignored and `hi` wins when `lo > hi`.
    pub fn clamp(self, min: Point, max: Point) -> Self {
        Self::new(self.x.max(min.x).min(max.x), self.y.max(min.y).min(max.y))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self::new(x, y)
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Self;

    fn mul(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k)
    }
}

impl Div<f32> for Point {
    type Output = Self;

    fn div(self, k: f32) -> Self {
        Self::new(self.x / k, self.y / k)
    }
}

/// Fixed table of precomputed random positions.
///
/// Used as the stand-in "other point" when two points coincide, so the
/// force never divides by zero. The table is filled by the caller; nothing
/// in this crate generates random values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct RandTable {
    values: Vec<Point>,
}

impl RandTable {
    pub fn new(values: [Point; RAND_LENGTH]) -> Self {
        Self {
            values: values.to_vec(),
        }
    }

    /// Build a table from a slice, which must hold exactly `RAND_LENGTH` entries
    pub fn from_slice(values: &[Point]) -> ForceResult<Self> {
        Self::try_from(values.to_vec())
    }

    pub fn as_slice(&self) -> &[Point] {
        &self.values
    }

    /// Table slot used for `point_id` at the given offset.
    ///
    /// The product wraps like unsigned 32-bit kernel arithmetic so the CPU
    /// and GPU backends pick the same slot.
    pub fn index_for(point_id: u32, offset: u32) -> usize {
        (point_id.wrapping_mul(offset) % RAND_LENGTH as u32) as usize
    }

    pub fn pick(&self, point_id: u32, offset: u32) -> Point {
        self.values[Self::index_for(point_id, offset)]
    }
}

impl TryFrom<Vec<Point>> for RandTable {
    type Error = ForceError;

    fn try_from(values: Vec<Point>) -> ForceResult<Self> {
        if values.len() != RAND_LENGTH {
            return Err(ForceError::RandTableLength {
                expected: RAND_LENGTH,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }
}

impl From<RandTable> for Vec<Point> {
    fn from(table: RandTable) -> Self {
        table.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_table() -> RandTable {
        let values: Vec<Point> = (0..RAND_LENGTH)
            .map(|i| Point::new(i as f32, -(i as f32)))
            .collect();
        RandTable::try_from(values).unwrap()
    }

    #[test]
    fn test_point_size() {
        // Two f32 lanes, matching vec2<f32> in WGSL storage buffers
        assert_eq!(std::mem::size_of::<Point>(), 8);
    }

    #[test]
    fn test_point_arithmetic() {
        let a = Point::new(1.0, 2.0);
        let b = Point::new(4.0, 6.0);
        assert_eq!(b - a, Point::new(3.0, 4.0));
        assert_eq!((b - a).length_squared(), 25.0);
        assert_eq!(a * 2.0, Point::new(2.0, 4.0));
        assert_eq!(b / 2.0, Point::new(2.0, 3.0));

        let mut acc = Point::ZERO;
        acc += a;
        acc += b;
        assert_eq!(acc, Point::new(5.0, 8.0));
    }

    #[test]
    fn test_point_clamp() {
        let p = Point::new(-3.0, 25.0);
        let clamped = p.clamp(Point::ZERO, Point::new(20.0, 20.0));
        assert_eq!(clamped, Point::new(0.0, 20.0));
    }

    #[test]
    fn test_point_clamp_tolerates_bad_bounds() {
        let p = Point::new(3.0, 4.0);
        // Inverted bounds: the upper one wins, like WGSL clamp
        assert_eq!(p.clamp(Point::ZERO, Point::new(-5.0, -5.0)), Point::new(-5.0, -5.0));
        // NaN bounds are skipped
        let clamped = p.clamp(Point::ZERO, Point::new(f32::NAN, 2.0));
        assert_eq!(clamped, Point::new(3.0, 2.0));
    }

    #[test]
    fn test_rand_table_rejects_wrong_length() {
        let err = RandTable::from_slice(&[Point::ZERO; 10]).unwrap_err();
        assert!(matches!(
            err,
            ForceError::RandTableLength {
                expected: RAND_LENGTH,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_rand_table_index_wraps() {
        assert_eq!(RandTable::index_for(0, 12345), 0);
        assert_eq!(RandTable::index_for(3, 5), 15);
        assert_eq!(RandTable::index_for(10, 8), 80 % RAND_LENGTH);
        // 2^16 * 2^16 wraps to 0 in u32
        assert_eq!(RandTable::index_for(1 << 16, 1 << 16), 0);
    }

    #[test]
    fn test_rand_table_pick() {
        let table = ramp_table();
        assert_eq!(table.pick(3, 5), Point::new(15.0, -15.0));
    }

    #[test]
    fn test_rand_table_serde_round_trip() {
        let table = ramp_table();
        let json = serde_json::to_string(&table).unwrap();
        let back: RandTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);

        let short = serde_json::to_string(&vec![Point::ZERO; 3]).unwrap();
        assert!(serde_json::from_str::<RandTable>(&short).is_err());
    }
}
