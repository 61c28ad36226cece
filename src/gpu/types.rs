//! GPU buffer types for the force step
//!
//! Layouts match the WGSL declarations in `shaders.rs` so they can be
//! uploaded with `bytemuck` without conversion.

use bytemuck::{Pod, Zeroable};

use super::shaders::{FLAG_BALANCED_GRAVITY, FLAG_CLAMP_TO_BOUNDS, FLAG_WALL_REPULSION};
use crate::config::ForceConfig;

/// Per-step parameters passed to the kernel as uniforms
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct StepUniforms {
    /// Number of points in the input/output buffers
    pub num_points: u32,
    /// Current step index
    pub step_number: u32,
    /// Canvas width
    pub width: f32,
    /// Canvas height
    pub height: f32,
    /// Fraction of tiles visited per step
    pub tiles_per_iteration: u32,
    /// Pairwise force scale
    pub point_repulsion: f32,
    /// Center pull strength
    pub gravity_from_center: f32,
    /// Wall force scale, read only when `FLAG_WALL_REPULSION` is set
    pub wall_repulsion: f32,
    /// `FLAG_*` bits
    pub flags: u32,
    /// Padding for 16-byte alignment
    pub _padding: [u32; 3],
}

impl StepUniforms {
    pub fn new(
        config: &ForceConfig,
        num_points: u32,
        width: f32,
        height: f32,
        step_number: u32,
    ) -> Self {
        let mut flags = 0;
        if config.clamp_to_bounds {
            flags |= FLAG_CLAMP_TO_BOUNDS;
        }
        if config.wall_repulsion.is_some() {
            flags |= FLAG_WALL_REPULSION;
        }
        if config.balanced_gravity {
            flags |= FLAG_BALANCED_GRAVITY;
        }

        Self {
            num_points,
            step_number,
            width,
            height,
            tiles_per_iteration: config.tiles_per_iteration,
            point_repulsion: config.point_repulsion,
            gravity_from_center: config.gravity_from_center,
            wall_repulsion: config.wall_repulsion.unwrap_or(0.0),
            flags,
            _padding: [0; 3],
        }
    }
}
