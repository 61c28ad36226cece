//! Runs a few hundred force steps over a random point cloud and logs how the
//! layout settles.
//!
//! ```text
//! RUST_LOG=info cargo run --example layout -- [POINTS] [STEPS] [CONFIG] [--walls]
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use nbody_layout::{
    ForceConfig, ForceStep, Point, RAND_LENGTH, RandTable, StepArgs, WALL_REPULSION,
    WorkGroupKernel,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

const WIDTH: f32 = 600.0;
const HEIGHT: f32 = 600.0;
const TILE_SIZE: u32 = 64;

/// Lay out a random point cloud with the tiled force step.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of points
    #[arg(default_value_t = 4096)]
    points: usize,

    /// Number of steps to run
    #[arg(default_value_t = 300)]
    steps: u32,

    /// Force config file (.json, .yaml or .yml)
    config: Option<PathBuf>,

    /// Turn on wall repulsion at its default strength if the config leaves it off
    #[arg(long)]
    walls: bool,
}

impl Args {
    fn force_config(&self) -> anyhow::Result<ForceConfig> {
        let mut config = match &self.config {
            Some(path) => ForceConfig::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => ForceConfig::default(),
        };
        if self.walls && config.wall_repulsion.is_none() {
            config = config.with_wall_repulsion(WALL_REPULSION);
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = args.force_config()?;
    let num_points = args.points;
    let steps = args.steps;

    let mut rng = StdRng::seed_from_u64(42);
    let mut random_point = || Point::new(rng.gen_range(0.0..WIDTH), rng.gen_range(0.0..HEIGHT));
    let rand_values: Vec<Point> = (0..RAND_LENGTH).map(|_| random_point()).collect();
    let rand_table = RandTable::from_slice(&rand_values)?;
    let mut positions: Vec<Point> = (0..num_points).map(|_| random_point()).collect();
    let mut next = vec![Point::ZERO; num_points];

    let mut kernel = WorkGroupKernel::new(config, TILE_SIZE)?;
    info!(num_points, steps, backend = kernel.name(), ?config, "starting layout");

    let start = Instant::now();
    for step_number in 0..steps {
        let args = StepArgs::new(&positions, WIDTH, HEIGHT, &rand_table, step_number);
        kernel.step(&args, &mut next)?;
        std::mem::swap(&mut positions, &mut next);

        if step_number % 50 == 0 || step_number + 1 == steps {
            let (centroid, spread) = summarize(&positions);
            info!(
                step_number,
                centroid_x = centroid.x,
                centroid_y = centroid.y,
                spread,
                "layout progress"
            );
        }
    }

    info!(elapsed = ?start.elapsed(), "layout finished");
    Ok(())
}

/// Centroid and RMS distance from it
fn summarize(points: &[Point]) -> (Point, f32) {
    if points.is_empty() {
        return (Point::ZERO, 0.0);
    }
    let n = points.len() as f32;
    let mut sum = Point::ZERO;
    for p in points {
        sum += *p;
    }
    let centroid = sum / n;
    let variance = points
        .iter()
        .map(|p| (*p - centroid).length_squared())
        .sum::<f32>()
        / n;
    (centroid, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_without_arguments() {
        let args = Args::try_parse_from(["layout"]).unwrap();
        assert_eq!(args.points, 4096);
        assert_eq!(args.steps, 300);
        assert!(args.config.is_none());
        assert!(!args.walls);
        assert_eq!(args.force_config().unwrap(), ForceConfig::default());
    }

    #[test]
    fn walls_flag_enables_default_wall_repulsion() {
        let args = Args::try_parse_from(["layout", "100", "10", "--walls"]).unwrap();
        assert_eq!(args.points, 100);
        assert_eq!(args.steps, 10);
        let config = args.force_config().unwrap();
        assert_eq!(config.wall_repulsion, Some(WALL_REPULSION));
    }

    #[test]
    fn rejects_non_numeric_points() {
        assert!(Args::try_parse_from(["layout", "many"]).is_err());
    }
}
