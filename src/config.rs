//! Force step configuration
//!
//! Defaults reproduce the kernel's stock constants. Wall repulsion, bounds
//! clamping and balanced gravity are opt-in extras and stay off unless a
//! config turns them on.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ForceError, ForceResult};
use crate::types::{GRAVITY_FROM_CENTER, POINT_REPULSION, TILES_PER_ITERATION};

/// Tunable parameters of the force step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForceConfig {
    /// Roughly 1/N of all tiles are visited per step
    pub tiles_per_iteration: u32,
    /// Pairwise force scale (negative = repulsion)
    pub point_repulsion: f32,
    /// Strength of the linear pull toward the canvas center
    pub gravity_from_center: f32,
    /// Wall force scale; `None` disables wall repulsion
    pub wall_repulsion: Option<f32>,
    /// Clamp updated positions to `[0, width] x [0, height]`
    pub clamp_to_bounds: bool,
    /// Scale gravity down by the fraction of tiles visited per step
    pub balanced_gravity: bool,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            tiles_per_iteration: TILES_PER_ITERATION,
            point_repulsion: POINT_REPULSION,
            gravity_from_center: GRAVITY_FROM_CENTER,
            wall_repulsion: None,
            clamp_to_bounds: false,
            balanced_gravity: false,
        }
    }
}

impl ForceConfig {
    /// Load a config from a JSON or YAML file, chosen by extension
    pub fn from_path(path: &Path) -> ForceResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ForceError::UnknownExtension(path.display().to_string()))?;

        let content = fs::read_to_string(path)?;
        let config = if ext.eq_ignore_ascii_case("json") {
            Self::from_json_str(&content)?
        } else if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Self::from_yaml_str(&content)?
        } else {
            return Err(ForceError::UnsupportedFormat(ext.to_string()));
        };

        debug!(path = %path.display(), ?config, "loaded force config");
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> ForceResult<Self> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ForceError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> ForceResult<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| ForceError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every parameter is usable by the kernel
    pub fn validate(&self) -> ForceResult<()> {
        if self.tiles_per_iteration == 0 {
            return Err(ForceError::InvalidConfig(
                "tiles_per_iteration must be at least 1".to_string(),
            ));
        }
        if !self.point_repulsion.is_finite() {
            return Err(ForceError::InvalidConfig(format!(
                "point_repulsion must be finite, got {}",
                self.point_repulsion
            )));
        }
        if !self.gravity_from_center.is_finite() {
            return Err(ForceError::InvalidConfig(format!(
                "gravity_from_center must be finite, got {}",
                self.gravity_from_center
            )));
        }
        if let Some(wall) = self.wall_repulsion.filter(|w| !w.is_finite()) {
            return Err(ForceError::InvalidConfig(format!(
                "wall_repulsion must be finite, got {wall}"
            )));
        }
        Ok(())
    }

    pub fn with_tiles_per_iteration(mut self, tiles_per_iteration: u32) -> Self {
        self.tiles_per_iteration = tiles_per_iteration;
        self
    }

    pub fn with_point_repulsion(mut self, point_repulsion: f32) -> Self {
        self.point_repulsion = point_repulsion;
        self
    }

    pub fn with_gravity(mut self, gravity_from_center: f32) -> Self {
        self.gravity_from_center = gravity_from_center;
        self
    }

    /// Enable wall repulsion with the given force scale
    pub fn with_wall_repulsion(mut self, wall_repulsion: f32) -> Self {
        self.wall_repulsion = Some(wall_repulsion);
        self
    }

    pub fn with_clamp_to_bounds(mut self, clamp_to_bounds: bool) -> Self {
        self.clamp_to_bounds = clamp_to_bounds;
        self
    }

    pub fn with_balanced_gravity(mut self, balanced_gravity: bool) -> Self {
        self.balanced_gravity = balanced_gravity;
        self
    }
}
