//! Force math shared by every backend
//!
//! A step moves each point by `posDelta`: the sum of pairwise repulsion from
//! the points in this step's active tiles, plus a linear pull toward the
//! canvas center. Backends differ only in how they walk the tiles.

use tracing::debug;

use crate::config::ForceConfig;
use crate::error::{ForceError, ForceResult};
use crate::schedule::{TileSchedule, alpha_for_step};
use crate::types::{Point, RandTable};

/// Force of point `b` on point `a`, as a displacement for `a`.
///
/// Falls off with the squared distance; with a negative `force` the result
/// points away from `b`. When the points (nearly) coincide, `b` is replaced by
/// the random table entry picked by `point_id` and `rand_offset`, which keeps
/// the result finite and deterministic for a given point and step.
pub fn point_force(
    a: Point,
    b: Point,
    force: f32,
    rand_values: &RandTable,
    point_id: u32,
    rand_offset: u32,
) -> Point {
    let mut d = b - a;
    let mut r = d.length_squared();

    if r < f32::EPSILON * f32::EPSILON {
        let b = rand_values.pick(point_id, rand_offset);
        d = b - a;
        r = d.length_squared();
    }

    d * (force / r)
}

/// Everything one step reads: a frozen input snapshot plus step parameters
#[derive(Debug, Clone, Copy)]
pub struct StepArgs<'a> {
    pub input: &'a [Point],
    pub width: f32,
    pub height: f32,
    pub rand_values: &'a RandTable,
    pub step_number: u32,
}

impl<'a> StepArgs<'a> {
    pub fn new(
        input: &'a [Point],
        width: f32,
        height: f32,
        rand_values: &'a RandTable,
        step_number: u32,
    ) -> Self {
        Self {
            input,
            width,
            height,
            rand_values,
            step_number,
        }
    }

    /// Number of points, checked to fit the 32-bit index space
    pub fn num_points(&self) -> ForceResult<u32> {
        u32::try_from(self.input.len()).map_err(|_| ForceError::TooManyPoints(self.input.len()))
    }

    /// Check that `output` can receive exactly one position per input point
    pub fn check_output(&self, output: &[Point]) -> ForceResult<u32> {
        if output.len() != self.input.len() {
            return Err(ForceError::BufferLengthMismatch {
                input: self.input.len(),
                output: output.len(),
            });
        }
        self.num_points()
    }
}

/// A backend that runs one force step over a whole position buffer.
///
/// Every slot of `output` is written exactly once, from `args.input` only.
pub trait ForceStep {
    fn step(&mut self, args: &StepArgs<'_>, output: &mut [Point]) -> ForceResult<()>;

    /// Short backend name, used in logs
    fn name(&self) -> &str;
}

/// Per-step constants, derived once and shared by every point of the step
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub schedule: TileSchedule,
    pub alpha: f32,
    pub repulsion: f32,
    gravity: f32,
    wall_repulsion: Option<f32>,
    clamp_to_bounds: bool,
    dimensions: Point,
    rand_values: &'a RandTable,
    step_number: u32,
}

impl<'a> StepContext<'a> {
    pub fn new(config: &ForceConfig, tile_size: u32, num_points: u32, args: &StepArgs<'a>) -> Self {
        let schedule = TileSchedule::new(num_points, tile_size, config.tiles_per_iteration);
        if schedule.num_tiles() > 0 && schedule.num_tiles() < config.tiles_per_iteration {
            debug!(
                num_tiles = schedule.num_tiles(),
                tiles_per_iteration = config.tiles_per_iteration,
                "fewer tiles than tiles_per_iteration, visiting every tile each step"
            );
        }

        let alpha = alpha_for_step(args.step_number);
        let mut gravity = config.gravity_from_center * alpha;
        if config.balanced_gravity {
            gravity /= schedule.modulus() as f32;
        }

        Self {
            schedule,
            alpha,
            repulsion: config.point_repulsion * alpha,
            gravity,
            wall_repulsion: config.wall_repulsion.map(|w| w * alpha),
            clamp_to_bounds: config.clamp_to_bounds,
            dimensions: Point::new(args.width, args.height),
            rand_values: args.rand_values,
            step_number: args.step_number,
        }
    }

    pub fn step_number(&self) -> u32 {
        self.step_number
    }

    /// Tiles this step visits
    pub fn active_tiles(&self) -> impl Iterator<Item = u32> + use<> {
        self.schedule.active_tiles(self.step_number)
    }

    /// Repulsion of `other` on the point `point_id` sitting at `my_pos`
    pub fn repulsion(&self, my_pos: Point, other: Point, point_id: u32) -> Point {
        point_force(
            my_pos,
            other,
            self.repulsion,
            self.rand_values,
            point_id,
            self.step_number,
        )
    }

    /// Add gravity and any enabled wall terms to `pos_delta` and produce the
    /// point's new position.
    pub fn finish(&self, point_id: u32, my_pos: Point, mut pos_delta: Point) -> Point {
        let center = self.dimensions / 2.0;
        pos_delta += (center - my_pos) * self.gravity;

        if let Some(wall) = self.wall_repulsion {
            // Walls push from slightly outside the canvas so points resting
            // on an edge still get moved.
            let buffer = self.dimensions / 100.0;
            let walls = [
                Point::new(0.0 - buffer.x, my_pos.y),
                Point::new(self.dimensions.x + buffer.x, my_pos.y),
                Point::new(my_pos.x, 0.0 - buffer.y),
                Point::new(my_pos.x, self.dimensions.y + buffer.y),
            ];
            for wall_pos in walls {
                pos_delta += point_force(
                    my_pos,
                    wall_pos,
                    wall,
                    self.rand_values,
                    point_id,
                    self.step_number,
                );
            }
        }

        let new_pos = my_pos + pos_delta;
        if self.clamp_to_bounds {
            new_pos.clamp(Point::ZERO, self.dimensions)
        } else {
            new_pos
        }
    }
}
