//! Renderer Settings
//!
//! Construction-time configuration of the renderers, plus the runtime
//! string-keyed [`RenderVariables`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use clustered_forward::renderer::{ClusterGrid, RendererSettings};
//!
//! // Defaults: 16 × 8 × 24 clusters, 100 lights per cluster
//! let settings = RendererSettings::default();
//!
//! // A coarser grid for small targets
//! let settings = RendererSettings {
//!     grid: ClusterGrid { x: 8, y: 4, z: 12, ..Default::default() },
//!     ..Default::default()
//! };
//! settings.validate()?;
//! ```
//!
//! Settings are (de)serializable with serde so hosts can keep them in a
//! configuration file.

use std::collections::BTreeMap;

use glam::UVec3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::{ClusterError, Result};

/// Render variable toggling the cluster heat-map program.
pub const DEBUG_VIS_VARIABLE: &str = "DEBUG_VIS";

/// Invocation limit of one light-culling work group (WebGPU default).
pub const MAX_WORKGROUP_INVOCATIONS: u32 = 256;

// ---------------------------------------------------------------------------
// ClusterGrid
// ---------------------------------------------------------------------------

/// Dimensions of the view-frustum partition.
///
/// | Field | Description | Default |
/// |-------|-------------|---------|
/// | `x`, `y` | Screen tiles per axis | 16, 8 |
/// | `z` | Logarithmic depth slices | 24 |
/// | `z_threads` | Depth slices per light-culling work group | 2 |
/// | `max_lights_per_cluster` | Light indices reserved per cluster | 100 |
///
/// Cluster `(x, y, z)` has the linear index `X·Y·z + X·y + x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterGrid {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub z_threads: u32,
    pub max_lights_per_cluster: u32,
}

impl Default for ClusterGrid {
    fn default() -> Self {
        Self {
            x: 16,
            y: 8,
            z: 24,
            z_threads: 2,
            max_lights_per_cluster: 100,
        }
    }
}

impl ClusterGrid {
    #[inline]
    #[must_use]
    pub fn cluster_count(&self) -> u32 {
        self.x * self.y * self.z
    }

    /// Length of the light index list: every cluster owns a fixed range.
    #[inline]
    #[must_use]
    pub fn light_index_capacity(&self) -> u32 {
        self.cluster_count() * self.max_lights_per_cluster
    }

    #[inline]
    #[must_use]
    pub fn index(&self, x: u32, y: u32, z: u32) -> u32 {
        self.x * self.y * z + self.x * y + x
    }

    /// Inverse of [`Self::index`].
    #[must_use]
    pub fn coords(&self, index: u32) -> UVec3 {
        let slice = self.x * self.y;
        let z = index / slice;
        let rem = index % slice;
        UVec3::new(rem % self.x, rem / self.x, z)
    }

    /// Work groups of the cluster-building dispatch: one per cluster.
    #[must_use]
    pub fn build_groups(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }

    /// Work groups of the light-culling dispatch: one per depth batch.
    #[must_use]
    pub fn cull_groups(&self) -> [u32; 3] {
        [1, 1, self.z / self.z_threads.max(1)]
    }

    #[must_use]
    pub fn workgroup_invocations(&self) -> u32 {
        self.x * self.y * self.z_threads
    }

    /// Template constants for the cluster shaders.
    #[must_use]
    pub fn shader_defines(&self) -> BTreeMap<String, String> {
        [
            ("CLUSTERS_X", self.x),
            ("CLUSTERS_Y", self.y),
            ("CLUSTERS_Z", self.z),
            ("CLUSTERS_Z_THREADS", self.z_threads),
            ("MAX_LIGHTS_PER_CLUSTER", self.max_lights_per_cluster),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    pub fn validate(&self) -> Result<()> {
        for (axis, value) in [("x", self.x), ("y", self.y), ("z", self.z), ("z_threads", self.z_threads)] {
            if value == 0 {
                return Err(ClusterError::EmptyGridAxis { axis });
            }
        }
        if self.z % self.z_threads != 0 {
            return Err(ClusterError::UnevenDepthBatches {
                z: self.z,
                z_threads: self.z_threads,
            });
        }
        let invocations = self.workgroup_invocations();
        if invocations > MAX_WORKGROUP_INVOCATIONS {
            return Err(ClusterError::WorkgroupTooLarge {
                invocations,
                limit: MAX_WORKGROUP_INVOCATIONS,
            });
        }
        if self.max_lights_per_cluster == 0 {
            return Err(ClusterError::ZeroCapacity("max_lights_per_cluster"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Global configuration consumed by `initialize`.
///
/// | Field | Description | Default |
/// |-------|-------------|---------|
/// | `grid` | Cluster partition | see [`ClusterGrid`] |
/// | `max_lights` | Capacity of the point light buffer | 4096 |
/// | `debug_vis` | Initial value of the `DEBUG_VIS` variable | `false` |
/// | `fallback_clear_color` | Clear color while no scene is loaded | `0x303030FF` |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub grid: ClusterGrid,
    /// Lights beyond this count are dropped (with a warning) each frame.
    pub max_lights: u32,
    pub debug_vis: bool,
    /// Packed `0xRRGGBBAA`.
    pub fallback_clear_color: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            grid: ClusterGrid::default(),
            max_lights: 4096,
            debug_vis: false,
            fallback_clear_color: 0x3030_30ff,
        }
    }
}

impl RendererSettings {
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        if self.max_lights == 0 {
            return Err(ClusterError::ZeroCapacity("max_lights"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RenderVariables
// ---------------------------------------------------------------------------

/// String-keyed runtime switches, read by the renderers every frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderVariables {
    values: FxHashMap<String, String>,
}

impl RenderVariables {
    /// Variables seeded from the settings.
    #[must_use]
    pub fn from_settings(settings: &RendererSettings) -> Self {
        let mut vars = Self::default();
        vars.set(DEBUG_VIS_VARIABLE, if settings.debug_vis { "true" } else { "false" });
        vars
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_owned(), value.to_owned());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// `true` only for the exact value `"true"`.
    #[must_use]
    pub fn is_true(&self, name: &str) -> bool {
        self.get(name) == Some("true")
    }

    #[must_use]
    pub fn debug_vis(&self) -> bool {
        self.is_true(DEBUG_VIS_VARIABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_fills_a_workgroup() {
        let grid = ClusterGrid::default();
        assert_eq!(grid.workgroup_invocations(), MAX_WORKGROUP_INVOCATIONS);
        assert_eq!(grid.cluster_count(), 3072);
        assert_eq!(grid.cull_groups(), [1, 1, 12]);
        assert!(grid.validate().is_ok());
    }

    #[test]
    fn index_and_coords_are_inverse() {
        let grid = ClusterGrid::default();
        for index in [0, 1, 15, 16, 127, 128, 3071] {
            let c = grid.coords(index);
            assert_eq!(grid.index(c.x, c.y, c.z), index);
        }
        assert_eq!(grid.index(3, 2, 1), 16 * 8 + 16 * 2 + 3);
    }

    #[test]
    fn variables_match_exact_true() {
        let mut vars = RenderVariables::default();
        assert!(!vars.debug_vis());
        vars.set(DEBUG_VIS_VARIABLE, "TRUE");
        assert!(!vars.debug_vis());
        vars.set(DEBUG_VIS_VARIABLE, "true");
        assert!(vars.debug_vis());
    }
}
