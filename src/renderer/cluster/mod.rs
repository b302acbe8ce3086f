//! Clustered Light Assignment
//!
//! The view frustum is partitioned into a `X × Y × Z` grid of clusters: `X × Y`
//! screen tiles, each split into `Z` depth slices spaced logarithmically between
//! the near and far planes. Every frame:
//!
//! 1. **Cluster building** writes one eye-space [`ClusterAabb`] per cluster.
//! 2. **Light culling** tests every point light against every cluster and
//!    writes a [`LightGridEntry`] plus the matching light indices.
//! 3. **Shading** maps each fragment back to its cluster and only evaluates the
//!    lights listed there.
//!
//! # Light index layout
//!
//! Cluster `c` owns the fixed range `[c·C, c·C + C)` of the light index list,
//! where `C` is `max_lights_per_cluster`. Culling therefore needs no shared
//! counter, the result does not depend on thread scheduling, and a cluster can
//! never write into another cluster's range. Clusters touched by more than `C`
//! lights keep the first `C` in light-list order.
//!
//! # Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`partition`] | Depth slicing, screen → eye unprojection, cluster bounds |
//! | [`culling`] | Sphere/AABB test and per-cluster light assignment |
//! | [`lookup`] | Fragment → cluster mapping used by shading |
//! | [`buffers`] | The GPU buffer set holding the grid |
//! | [`kernels`] | CPU executions of the two compute passes |

pub mod buffers;
pub mod culling;
pub mod kernels;
pub mod lookup;
pub mod partition;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4, Vec3, Vec4};

pub use buffers::ClusterBufferSet;
pub use lookup::ClusterLookup;
pub use partition::DepthSlicing;

use crate::renderer::backend::ViewRect;
use crate::renderer::settings::ClusterGrid;
use crate::scene::PointLight;

/// Storage slot of the cluster bounds.
pub const CLUSTERS_SLOT: u32 = 0;
/// Storage slot of the light index list.
pub const LIGHT_INDICES_SLOT: u32 = 1;
/// Storage slot of the light grid.
pub const LIGHT_GRID_SLOT: u32 = 2;
/// Storage slot of the point light buffer.
pub const LIGHTS_SLOT: u32 = 3;

/// Eye-space bounds of one cluster. `w` components are padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ClusterAabb {
    pub min: Vec4,
    pub max: Vec4,
}

impl ClusterAabb {
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.extend(0.0),
            max: max.extend(0.0),
        }
    }

    #[inline]
    #[must_use]
    pub fn min3(&self) -> Vec3 {
        self.min.truncate()
    }

    #[inline]
    #[must_use]
    pub fn max3(&self) -> Vec3 {
        self.max.truncate()
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min3() + self.max3()) * 0.5
    }

    #[must_use]
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min3()).all() && point.cmple(self.max3()).all()
    }
}

/// Where a cluster's lights live in the light index list.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LightGridEntry {
    pub offset: u32,
    pub count: u32,
}

/// Point light as stored in the light buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuPointLight {
    /// World position in `xyz`, range in `w`.
    pub position_range: Vec4,
    /// Radiant flux in `xyz`.
    pub flux: Vec4,
}

impl GpuPointLight {
    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position_range.truncate()
    }

    #[inline]
    #[must_use]
    pub fn range(&self) -> f32 {
        self.position_range.w
    }
}

impl From<&PointLight> for GpuPointLight {
    fn from(light: &PointLight) -> Self {
        Self {
            position_range: light.position.extend(light.range),
            flux: light.flux().extend(0.0),
        }
    }
}

/// Per-frame inputs shared by the compute passes and the shading programs.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ClusterUniforms {
    pub view: Mat4,
    pub inv_proj: Mat4,
    /// `(x, y, width, height)` of the target in pixels.
    pub view_rect: Vec4,
    /// `(near, far, slice scale, slice bias)`.
    pub z_near_far: Vec4,
    /// `(X, Y, Z, Z_THREADS)`.
    pub grid: UVec4,
    /// `(light count, max lights per cluster, 0, 0)`.
    pub light_info: UVec4,
}

impl ClusterUniforms {
    #[must_use]
    pub fn new(
        view: Mat4,
        proj: Mat4,
        rect: ViewRect,
        near: f32,
        far: f32,
        grid: &ClusterGrid,
        light_count: u32,
    ) -> Self {
        let (scale, bias) = DepthSlicing::new(near, far, grid.z).scale_bias();
        Self {
            view,
            inv_proj: proj.inverse(),
            view_rect: rect.as_vec4(),
            z_near_far: Vec4::new(near, far, scale, bias),
            grid: UVec4::new(grid.x, grid.y, grid.z, grid.z_threads),
            light_info: UVec4::new(light_count, grid.max_lights_per_cluster, 0, 0),
        }
    }

    #[inline]
    #[must_use]
    pub fn near(&self) -> f32 {
        self.z_near_far.x
    }

    #[inline]
    #[must_use]
    pub fn far(&self) -> f32 {
        self.z_near_far.y
    }

    #[inline]
    #[must_use]
    pub fn light_count(&self) -> u32 {
        self.light_info.x
    }

    #[inline]
    #[must_use]
    pub fn max_lights_per_cluster(&self) -> u32 {
        self.light_info.y
    }

    /// Grid dimensions carried by the block.
    #[must_use]
    pub fn cluster_grid(&self) -> ClusterGrid {
        ClusterGrid {
            x: self.grid.x,
            y: self.grid.y,
            z: self.grid.z,
            z_threads: self.grid.w,
            max_lights_per_cluster: self.light_info.y,
        }
    }

    #[must_use]
    pub fn depth_slicing(&self) -> DepthSlicing {
        DepthSlicing::new(self.near(), self.far(), self.grid.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_layouts_match_wgsl() {
        assert_eq!(std::mem::size_of::<ClusterAabb>(), 32);
        assert_eq!(std::mem::size_of::<LightGridEntry>(), 8);
        assert_eq!(std::mem::size_of::<GpuPointLight>(), 32);
        assert_eq!(std::mem::size_of::<ClusterUniforms>() % 16, 0);
    }

    #[test]
    fn aabb_contains_is_inclusive() {
        let aabb = ClusterAabb::new(Vec3::new(-1.0, -1.0, -2.0), Vec3::new(1.0, 1.0, -1.0));
        assert!(aabb.contains(Vec3::new(1.0, -1.0, -1.0)));
        assert!(!aabb.contains(Vec3::new(0.0, 0.0, -0.5)));
        assert_eq!(aabb.center(), Vec3::new(0.0, 0.0, -1.5));
    }
}
