//! Damping and step-fraction tile scheduling
//!
//! Points are partitioned into tiles of `tile_size` (the work-group size).
//! Each step only visits every `modulus`-th tile, rotating with the step
//! number, so the O(n²) repulsion cost is spread over `modulus` steps.

use std::ops::Range;

/// Damping factor for a step: `1 / clamp(step / 2, 1, 30)`.
///
/// Early steps get full-strength forces, later ones as little as 1/30.
pub fn alpha_for_step(step_number: u32) -> f32 {
    1.0 / (step_number as f32 / 2.0).clamp(1.0, 30.0)
}

/// Partition of the point index space into tiles, and which tiles a step visits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSchedule {
    num_points: u32,
    tile_size: u32,
    num_tiles: u32,
    modulus: u32,
}

impl TileSchedule {
    /// Build the schedule for one step.
    ///
    /// `modulus` is `num_tiles / tiles_per_iteration`, clamped to at least 1:
    /// with fewer tiles than `tiles_per_iteration`, every tile is visited
    /// every step. Zero sizes are treated as 1.
    pub fn new(num_points: u32, tile_size: u32, tiles_per_iteration: u32) -> Self {
        let tile_size = tile_size.max(1);
        let num_tiles = num_points.div_ceil(tile_size);
        let modulus = (num_tiles / tiles_per_iteration.max(1)).max(1);
        Self {
            num_points,
            tile_size,
            num_tiles,
            modulus,
        }
    }

    pub fn num_points(&self) -> u32 {
        self.num_points
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn num_tiles(&self) -> u32 {
        self.num_tiles
    }

    /// Number of steps after which every tile has been visited once
    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    /// Index of the first point in `tile`
    pub fn tile_start(&self, tile: u32) -> u32 {
        tile * self.tile_size
    }

    /// Number of points in `tile`; the last tile may be partial
    pub fn tile_len(&self, tile: u32) -> u32 {
        let start = self.tile_start(tile);
        if start >= self.num_points {
            0
        } else {
            (self.num_points - start).min(self.tile_size)
        }
    }

    /// Point indices covered by `tile`
    pub fn tile_range(&self, tile: u32) -> Range<usize> {
        let start = self.tile_start(tile) as usize;
        start..start + self.tile_len(tile) as usize
    }

    pub fn is_active(&self, tile: u32, step_number: u32) -> bool {
        tile % self.modulus == step_number % self.modulus
    }

    /// Tiles visited in `step_number`, in ascending order
    pub fn active_tiles(&self, step_number: u32) -> impl Iterator<Item = u32> + use<> {
        (step_number % self.modulus..self.num_tiles).step_by(self.modulus as usize)
    }
}
