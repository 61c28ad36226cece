//! nbody-layout - one step of a tiled n-body force-directed layout.
//!
//! Every point is pushed away from the points of a rotating subset of tiles
//! and pulled toward the canvas center. Forces cool down with the step number.
//! The step is a pure function of the input snapshot: callers own the
//! position buffers, swap them between steps, and advance the step counter.
//!
//! Backends implementing [`ForceStep`]:
//!
//! - [`ReferenceKernel`]: sequential, reads tiles straight from the input
//! - [`WorkGroupKernel`]: parallel work-groups with explicit tile caches
//! - `gpu::GpuForceKernel`: WGSL compute kernel (feature `gpu`)

pub mod config;
pub mod error;
pub mod gpu;
pub mod kernel;
pub mod reference;
pub mod schedule;
pub mod types;
pub mod workgroup;

pub use config::ForceConfig;
pub use error::{ForceError, ForceResult};
pub use kernel::{ForceStep, StepArgs, StepContext, point_force};
pub use reference::ReferenceKernel;
pub use schedule::{TileSchedule, alpha_for_step};
pub use types::{
    GRAVITY_FROM_CENTER, POINT_REPULSION, Point, RAND_LENGTH, RandTable, TILES_PER_ITERATION,
    WALL_REPULSION,
};
pub use workgroup::{WorkGroup, WorkGroupKernel};
