//! Frustum Partitioning
//!
//! Depth slices follow `near · (far / near)^(k / Z)`, so every slice covers the
//! same ratio of depth and near slices stay thin where the screen-space density
//! of geometry is highest. Boundary `0` is exactly `near` and boundary `Z` is
//! exactly `far`.
//!
//! Screen tiles are `width / X` by `height / Y` pixels (fractional), counted
//! from the top-left corner of the view rectangle.

use glam::{Mat4, UVec3, Vec2, Vec3, Vec4};

use super::{ClusterAabb, ClusterUniforms};

/// Logarithmic depth slicing between two positive planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSlicing {
    pub near: f32,
    pub far: f32,
    pub slices: u32,
}

impl DepthSlicing {
    #[must_use]
    pub fn new(near: f32, far: f32, slices: u32) -> Self {
        Self { near, far, slices }
    }

    /// Depth of slice boundary `k`, for `k` in `[0, slices]`.
    #[must_use]
    pub fn boundary(&self, k: u32) -> f32 {
        if k == 0 {
            self.near
        } else if k >= self.slices {
            self.far
        } else {
            self.near * (self.far / self.near).powf(k as f32 / self.slices as f32)
        }
    }

    /// `(near, far)` depths of slice `k`.
    #[must_use]
    pub fn slice_range(&self, k: u32) -> (f32, f32) {
        (self.boundary(k), self.boundary(k + 1))
    }

    /// `(scale, bias)` such that `slice = floor(ln(depth) · scale + bias)`.
    #[must_use]
    pub fn scale_bias(&self) -> (f32, f32) {
        let log_ratio = (self.far / self.near).ln();
        let slices = self.slices as f32;
        (slices / log_ratio, -(slices * self.near.ln()) / log_ratio)
    }

    /// Slice containing a positive eye depth, clamped to `[0, slices - 1]`.
    #[must_use]
    pub fn slice_for_depth(&self, depth: f32) -> u32 {
        let (scale, bias) = self.scale_bias();
        slice_from_scale_bias(depth, scale, bias, self.slices)
    }
}

#[inline]
pub(crate) fn slice_from_scale_bias(depth: f32, scale: f32, bias: f32, slices: u32) -> u32 {
    let z = depth.max(f32::MIN_POSITIVE).ln() * scale + bias;
    // `as` saturates: NaN and negatives land in slice 0
    (z.max(0.0) as u32).min(slices.saturating_sub(1))
}

/// Unprojects a pixel position onto the near plane (NDC z = 0) in eye space.
#[must_use]
pub fn screen_to_eye(screen: Vec2, view_rect: Vec4, inv_proj: &Mat4) -> Vec3 {
    let uv = (screen - view_rect.truncate().truncate()) / Vec2::new(view_rect.z, view_rect.w);
    let ndc = Vec4::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    let eye = *inv_proj * ndc;
    eye.truncate() / eye.w
}

/// Point on the ray through `on_near` whose eye depth is exactly `depth`.
#[inline]
fn at_depth(on_near: Vec3, depth: f32) -> Vec3 {
    let t = depth / -on_near.z;
    Vec3::new(on_near.x * t, on_near.y * t, -depth)
}

/// Eye-space bounds of cluster `coords`.
///
/// The box encloses the four points where the tile's corner rays cross the
/// slice's near and far depths; its z extent is exactly `[-far_k, -near_k]`.
#[must_use]
pub fn cluster_bounds(coords: UVec3, uniforms: &ClusterUniforms) -> ClusterAabb {
    let rect = uniforms.view_rect;
    let tile = Vec2::new(rect.z / uniforms.grid.x as f32, rect.w / uniforms.grid.y as f32);
    let origin = Vec2::new(rect.x, rect.y);

    let min_screen = origin + coords.truncate().as_vec2() * tile;
    let max_screen = origin + (coords.truncate() + 1).as_vec2() * tile;

    let min_ray = screen_to_eye(min_screen, rect, &uniforms.inv_proj);
    let max_ray = screen_to_eye(max_screen, rect, &uniforms.inv_proj);

    let (slice_near, slice_far) = uniforms.depth_slicing().slice_range(coords.z);

    let corners = [
        at_depth(min_ray, slice_near),
        at_depth(min_ray, slice_far),
        at_depth(max_ray, slice_near),
        at_depth(max_ray, slice_far),
    ];

    let (min, max) = corners
        .iter()
        .fold((Vec3::INFINITY, Vec3::NEG_INFINITY), |(lo, hi), &p| (lo.min(p), hi.max(p)));

    ClusterAabb::new(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_exact_at_the_ends() {
        let slicing = DepthSlicing::new(0.1, 1000.0, 24);
        assert_eq!(slicing.boundary(0), 0.1);
        assert_eq!(slicing.boundary(24), 1000.0);
    }

    #[test]
    fn boundaries_increase_with_constant_ratio() {
        let slicing = DepthSlicing::new(1.0, 100.0, 4);
        let mut prev = slicing.boundary(0);
        for k in 1..=4 {
            let b = slicing.boundary(k);
            assert!(b > prev);
            assert!(((b / prev) - 100f32.powf(0.25)).abs() < 1e-3);
            prev = b;
        }
    }

    #[test]
    fn depth_maps_back_to_its_slice() {
        let slicing = DepthSlicing::new(0.5, 200.0, 16);
        for k in 0..16 {
            let (lo, hi) = slicing.slice_range(k);
            let mid = (lo * hi).sqrt();
            assert_eq!(slicing.slice_for_depth(mid), k);
        }
        assert_eq!(slicing.slice_for_depth(0.01), 0);
        assert_eq!(slicing.slice_for_depth(1.0e6), 15);
    }

    #[test]
    fn screen_center_unprojects_onto_view_axis() {
        let proj = Mat4::perspective_rh(1.0, 2.0, 0.5, 50.0);
        let rect = Vec4::new(0.0, 0.0, 200.0, 100.0);
        let p = screen_to_eye(Vec2::new(100.0, 50.0), rect, &proj.inverse());
        assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5);
        assert!((p.z + 0.5).abs() < 1e-4);
    }
}
