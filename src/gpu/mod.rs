//! GPU force step (WGSL compute kernel)
//!
//! The shader source is always available so it can be inspected and
//! validated without a device. The wgpu backend itself needs the `gpu`
//! feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use nbody_layout::gpu::GpuForceKernel;
//! use nbody_layout::{ForceConfig, ForceStep, Point, RandTable, StepArgs};
//!
//! let mut kernel = GpuForceKernel::new(ForceConfig::default(), 256)?;
//!
//! let mut output = vec![Point::ZERO; positions.len()];
//! let args = StepArgs::new(&positions, 600.0, 600.0, &rand_table, step_number);
//! kernel.step(&args, &mut output)?;
//! ```
//!
//! # Kernel layout
//!
//! - one invocation per point, one work-group per tile
//! - a `var<workgroup>` cache holds the tile being visited
//! - two `workgroupBarrier()` calls per tile: after the copy and after the reads
//!
//! Results match the CPU backends up to floating-point variance (the GPU may
//! fuse multiply-adds).

mod shaders;

#[cfg(feature = "gpu")]
mod kernel;
#[cfg(feature = "gpu")]
mod types;

pub use shaders::{
    FLAG_BALANCED_GRAVITY, FLAG_CLAMP_TO_BOUNDS, FLAG_WALL_REPULSION, FORCE_STEP_ENTRY_POINT,
    force_step_shader,
};

#[cfg(feature = "gpu")]
pub use kernel::{GpuForceKernel, create_device};
#[cfg(feature = "gpu")]
pub use types::StepUniforms;
