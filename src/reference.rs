//! Single-threaded reference backend
//!
//! Reads every active tile straight from the input buffer instead of going
//! through a tile cache. Same visiting order as the cached backends, so its
//! output is the yardstick they are checked against.

use tracing::trace;

use crate::config::ForceConfig;
use crate::error::{ForceError, ForceResult};
use crate::kernel::{ForceStep, StepArgs, StepContext};
use crate::types::Point;

/// Sequential CPU force step
#[derive(Debug, Clone)]
pub struct ReferenceKernel {
    config: ForceConfig,
    tile_size: u32,
}

impl ReferenceKernel {
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

    /// New position of one point. `point_id` must index into `input`;
    /// `step` checks the buffers before calling this.
    pub(crate) fn step_point(&self, ctx: &StepContext<'_>, input: &[Point], point_id: u32) -> Point {
        let my_pos = input[point_id as usize];
        let mut pos_delta = Point::ZERO;

        for tile in ctx.active_tiles() {
            let range = ctx.schedule.tile_range(tile);
            let tile_start = range.start;
            for (j, &other) in input[range].iter().enumerate() {
                if tile_start + j == point_id as usize {
                    continue;
                }
                pos_delta += ctx.repulsion(my_pos, other, point_id);
            }
        }

        ctx.finish(point_id, my_pos, pos_delta)
    }
}

impl ForceStep for ReferenceKernel {
    fn step(&mut self, args: &StepArgs<'_>, output: &mut [Point]) -> ForceResult<()> {
        let num_points = args.check_output(output)?;
        let ctx = StepContext::new(&self.config, self.tile_size, num_points, args);
        trace!(
            backend = self.name(),
            step = args.step_number,
            num_points,
            active_tiles = ctx.active_tiles().count(),
            "force step"
        );

        for (point_id, slot) in (0..num_points).zip(output.iter_mut()) {
            *slot = self.step_point(&ctx, args.input, point_id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "reference"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RAND_LENGTH, RandTable};

    fn table() -> RandTable {
        RandTable::new([Point::new(3.0, 7.0); RAND_LENGTH])
    }

    #[test]
    fn rejects_zero_tile_size() {
        assert!(matches!(
            ReferenceKernel::new(ForceConfig::default(), 0),
            Err(ForceError::ZeroTileSize)
        ));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = ForceConfig::default().with_tiles_per_iteration(0);
        assert!(matches!(
            ReferenceKernel::new(config, 64),
            Err(ForceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let rand = table();
        let mut kernel = ReferenceKernel::new(ForceConfig::default(), 64).unwrap();
        let args = StepArgs::new(&[], 10.0, 10.0, &rand, 0);
        let mut output: [Point; 0] = [];
        kernel.step(&args, &mut output).unwrap();
    }

    #[test]
    fn rejects_short_output_before_indexing() {
        let rand = table();
        let input = [Point::ZERO; 3];
        let mut output = [Point::ZERO; 5];
        let mut kernel = ReferenceKernel::new(ForceConfig::default(), 2).unwrap();
        assert!(matches!(
            kernel.step(&StepArgs::new(&input, 10.0, 10.0, &rand, 0), &mut output),
            Err(ForceError::BufferLengthMismatch {
                input: 3,
                output: 5
            })
        ));
    }

    #[test]
    fn two_points_repel_along_x() {
        let rand = table();
        let input = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let mut output = [Point::ZERO; 2];
        let mut kernel = ReferenceKernel::new(ForceConfig::default(), 64).unwrap();
        kernel
            .step(&StepArgs::new(&input, 20.0, 20.0, &rand, 2), &mut output)
            .unwrap();

        // Gravity (2, 2) toward (10, 10), repulsion 1e-6 away from the other point
        assert!((output[0].x - (2.0 - 1e-6)).abs() < 1e-6);
        assert!((output[0].y - 2.0).abs() < 1e-6);
        assert!((output[1].x - (10.0 + 1e-6)).abs() < 1e-6);
        assert!((output[1].y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn inactive_tiles_are_skipped() {
        let rand = table();
        // 14 tiles of one point, modulus 2: odd steps skip tile 0
        let input: Vec<Point> = (0..14).map(|i| Point::new(i as f32 * 3.0, 0.0)).collect();
        let config = ForceConfig::default().with_gravity(0.0);
        let kernel = ReferenceKernel::new(config, 1).unwrap();

        let args = StepArgs::new(&input, 50.0, 50.0, &rand, 3);
        let ctx = StepContext::new(&config, 1, 14, &args);
        assert_eq!(ctx.schedule.modulus(), 2);
        assert!(!ctx.schedule.is_active(0, 3));

        // Point 1 is in an active tile, so its neighbours in even tiles are not felt
        let p1 = kernel.step_point(&ctx, &input, 1);
        let full_config = ForceConfig::default()
            .with_gravity(0.0)
            .with_tiles_per_iteration(14);
        let full_ctx = StepContext::new(&full_config, 1, 14, &args);
        let p1_full = kernel.step_point(&full_ctx, &input, 1);
        assert_ne!(p1, p1_full);
    }
}
