use glam::{Affine3A, Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Per-frame camera snapshot.
///
/// The renderer reads it once per frame to derive the cluster geometry, so any
/// change here is picked up on the next `render` call. Eye space is
/// right-handed with the camera looking down `-Z`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Vertical field of view in radians, in `(0, π)`.
    pub fov: f32,
    /// Near plane distance, > 0.
    pub near: f32,
    /// Far plane distance, > `near`.
    pub far: f32,
    /// Exposure consumed by the (external) tonemapping pass.
    pub exposure: f32,

    world_matrix: Affine3A,
}

impl Camera {
    #[must_use]
    pub fn new_perspective(fov_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            fov: fov_degrees.to_radians(),
            near,
            far,
            exposure: 1.0,
            world_matrix: Affine3A::IDENTITY,
        }
    }

    /// Places the camera at `eye`, looking at `target`.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        // look_at_rh builds the view matrix (world -> camera); we store its inverse
        let view = Mat4::look_at_rh(eye, target, up);
        self.world_matrix = Affine3A::from_mat4(view.inverse());
    }

    pub fn set_world_matrix(&mut self, world: Affine3A) {
        self.world_matrix = world;
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.world_matrix.translation)
    }

    /// View matrix: the inverse of the camera's world matrix.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from(self.world_matrix).inverse()
    }

    /// Perspective projection with a `[0, 1]` depth range.
    #[must_use]
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new_perspective(60.0, 0.1, 1000.0)
    }
}
