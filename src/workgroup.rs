//! CPU work-group backend
//!
//! Mirrors the GPU execution model: one cooperating group per tile-sized
//! block of points, each with its own tile cache. Per active tile a group
//! runs two phases, and the boundary after each one is the barrier:
//!
//! 1. copy: each unit with a local id below the tile length loads one
//!    position into the cache;
//! 2. read: every unit folds the whole cached tile into its `pos_delta`,
//!    after which the cache is invalidated.
//!
//! A phase finishes for every unit of the group before the next one starts,
//! so no unit ever reads a half-filled cache or one overwritten by the next
//! tile. Groups share nothing but the input snapshot and run on the rayon
//! pool, each writing its own disjoint chunk of the output.

use rayon::prelude::*;
use tracing::trace;

use crate::config::ForceConfig;
use crate::error::{ForceError, ForceResult};
use crate::kernel::{ForceStep, StepArgs, StepContext};
use crate::types::Point;

/// Per-unit registers
#[derive(Debug, Clone, Copy)]
struct Unit {
    point_id: u32,
    my_pos: Point,
    pos_delta: Point,
}

/// One cooperating group: its units and their shared tile cache
#[derive(Debug)]
pub struct WorkGroup {
    group_id: u32,
    tile_size: u32,
    units: Vec<Unit>,
    tile_cache: Vec<Point>,
    cached_tile: Option<(u32, usize)>,
}

impl WorkGroup {
    /// Set up the units of `group_id`. Units past the end of the input still
    /// take part in the copy phase but own no output slot.
    pub fn new(group_id: u32, tile_size: u32, input: &[Point]) -> Self {
        let first = group_id as usize * tile_size as usize;
        let units = input
            .iter()
            .skip(first)
            .take(tile_size as usize)
            .enumerate()
            .map(|(local_id, &my_pos)| Unit {
                point_id: (first + local_id) as u32,
                my_pos,
                pos_delta: Point::ZERO,
            })
            .collect();

        Self {
            group_id,
            tile_size,
            units,
            tile_cache: vec![Point::ZERO; tile_size as usize],
            cached_tile: None,
        }
    }

    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    /// Copy phase: fill the cache with `tile`'s positions
    pub fn load_tile(&mut self, ctx: &StepContext<'_>, input: &[Point], tile: u32) {
        let tile_start = ctx.schedule.tile_start(tile);
        let this_tile_size = ctx.schedule.tile_len(tile) as usize;

        for local_id in 0..self.tile_size as usize {
            if local_id < this_tile_size {
                self.tile_cache[local_id] = input[tile_start as usize + local_id];
            }
        }
        self.cached_tile = Some((tile_start, this_tile_size));
    }

    /// Read phase: every unit accumulates repulsion from the cached tile,
    /// then the cache is released for the next tile
    pub fn accumulate_tile(&mut self, ctx: &StepContext<'_>) {
        let Some((tile_start, this_tile_size)) = self.cached_tile.take() else {
            return;
        };
        let cached = &self.tile_cache[..this_tile_size];

        for unit in &mut self.units {
            for (cached_point, &other) in cached.iter().enumerate() {
                if tile_start + cached_point as u32 == unit.point_id {
                    continue;
                }
                unit.pos_delta += ctx.repulsion(unit.my_pos, other, unit.point_id);
            }
        }
    }

    /// Run every active tile, then write each unit's new position.
    ///
    /// `output` is this group's chunk of the output buffer.
    pub fn run(&mut self, ctx: &StepContext<'_>, input: &[Point], output: &mut [Point]) {
        for tile in ctx.active_tiles() {
            self.load_tile(ctx, input, tile);
            self.accumulate_tile(ctx);
        }

        for (unit, slot) in self.units.iter().zip(output.iter_mut()) {
            *slot = ctx.finish(unit.point_id, unit.my_pos, unit.pos_delta);
        }
    }
}

/// Parallel CPU force step with explicit per-group tile caches
#[derive(Debug, Clone)]
pub struct WorkGroupKernel {
    config: ForceConfig,
    tile_size: u32,
}

impl WorkGroupKernel {
    pub fn new(config: ForceConfig, tile_size: u32) -> ForceResult<Self> {
        if tile_size == 0 {
            return Err(ForceError::ZeroTileSize);
        }
        config.validate()?;
        Ok(Self { config, tile_size })
    }

    pub fn config(&self) -> &ForceConfig {
        &self.config
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }
}

impl ForceStep for WorkGroupKernel {
    fn step(&mut self, args: &StepArgs<'_>, output: &mut [Point]) -> ForceResult<()> {
        let num_points = args.check_output(output)?;
        if num_points == 0 {
            return Ok(());
        }

        let ctx = StepContext::new(&self.config, self.tile_size, num_points, args);
        trace!(
            backend = self.name(),
            step = args.step_number,
            num_points,
            groups = ctx.schedule.num_tiles(),
            active_tiles = ctx.active_tiles().count(),
            "force step"
        );

        let tile_size = self.tile_size;
        output
            .par_chunks_mut(tile_size as usize)
            .enumerate()
            .for_each(|(group_id, chunk)| {
                let mut group = WorkGroup::new(group_id as u32, tile_size, args.input);
                group.run(&ctx, args.input, chunk);
            });
        Ok(())
    }

    fn name(&self) -> &str {
        "workgroup"
    }
}
