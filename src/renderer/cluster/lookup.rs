//! Fragment → cluster mapping, mirrored by the shading programs.

use glam::{UVec3, Vec2};

use super::partition::slice_from_scale_bias;
use super::{ClusterUniforms, LightGridEntry};

/// Maps fragments to cluster indices for one frame's uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterLookup {
    origin: Vec2,
    tile_size: Vec2,
    dims: UVec3,
    scale: f32,
    bias: f32,
}

impl ClusterLookup {
    #[must_use]
    pub fn new(uniforms: &ClusterUniforms) -> Self {
        let rect = uniforms.view_rect;
        Self {
            origin: Vec2::new(rect.x, rect.y),
            tile_size: Vec2::new(rect.z / uniforms.grid.x as f32, rect.w / uniforms.grid.y as f32),
            dims: uniforms.grid.truncate(),
            scale: uniforms.z_near_far.z,
            bias: uniforms.z_near_far.w,
        }
    }

    /// Cluster coordinates of a fragment at pixel `frag` with positive eye
    /// depth `eye_depth`. Out-of-range inputs clamp to the border clusters.
    #[must_use]
    pub fn cluster_coords(&self, frag: Vec2, eye_depth: f32) -> UVec3 {
        let tile = ((frag - self.origin) / self.tile_size).max(Vec2::ZERO).as_uvec2();
        UVec3::new(
            tile.x.min(self.dims.x - 1),
            tile.y.min(self.dims.y - 1),
            slice_from_scale_bias(eye_depth, self.scale, self.bias, self.dims.z),
        )
    }

    #[must_use]
    pub fn cluster_index(&self, frag: Vec2, eye_depth: f32) -> u32 {
        let c = self.cluster_coords(frag, eye_depth);
        self.dims.x * self.dims.y * c.z + self.dims.x * c.y + c.x
    }
}

/// Positive eye depth from a `[0, 1]` window depth of a standard perspective
/// projection.
#[inline]
#[must_use]
pub fn eye_depth_from_window(depth: f32, near: f32, far: f32) -> f32 {
    (far * near) / (near + (1.0 - depth) * (far - near))
}

/// Light indices assigned to `cluster`.
///
/// Reads at most `max_per_cluster` indices and never past the end of
/// `indices`, whatever the grid entry claims.
#[must_use]
pub fn cluster_lights<'a>(
    grid: &[LightGridEntry],
    indices: &'a [u32],
    cluster: u32,
    max_per_cluster: u32,
) -> &'a [u32] {
    let Some(entry) = grid.get(cluster as usize) else {
        return &[];
    };
    let start = (entry.offset as usize).min(indices.len());
    let len = entry.count.min(max_per_cluster) as usize;
    let end = (start + len).min(indices.len());
    &indices[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_depth_endpoints() {
        assert!((eye_depth_from_window(0.0, 0.1, 100.0) / 0.1 - 1.0).abs() < 1e-5);
        assert!((eye_depth_from_window(1.0, 0.1, 100.0) / 100.0 - 1.0).abs() < 1e-5);
        assert!((eye_depth_from_window(1.0, 0.01, 5000.0) / 5000.0 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn window_depth_inverts_the_projection() {
        let (near, far) = (0.1, 100.0);
        let proj = glam::Mat4::perspective_rh(1.0, 1.5, near, far);
        for eye in [0.5, 3.0, 42.0, 99.0] {
            let clip = proj * glam::Vec4::new(0.0, 0.0, -eye, 1.0);
            let depth = eye_depth_from_window(clip.z / clip.w, near, far);
            assert!((depth / eye - 1.0).abs() < 1e-3, "{eye} came back as {depth}");
        }
    }

    #[test]
    fn cluster_lights_is_bounded() {
        let grid = [LightGridEntry { offset: 2, count: 50 }];
        let indices = [0, 1, 2, 3, 4, 5];
        assert_eq!(cluster_lights(&grid, &indices, 0, 3), &[2, 3, 4]);
        assert_eq!(cluster_lights(&grid, &indices, 0, 100), &[2, 3, 4, 5]);
        assert!(cluster_lights(&grid, &indices, 9, 3).is_empty());
    }
}
