use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A point light owned by the scene snapshot.
///
/// The renderer never mutates lights. Its influence volume is the sphere of
/// radius `range` around `position`; the light contributes nothing outside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    /// World space position.
    pub position: Vec3,
    /// Influence radius in world units.
    pub range: f32,
    /// Linear RGB color.
    pub color: Vec3,
    /// Radiant intensity; multiplied into `color` when packed for the GPU.
    pub intensity: f32,
}

impl PointLight {
    #[must_use]
    pub fn new(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            range,
            color,
            intensity,
        }
    }

    /// Radiant flux as seen by the shading pass.
    #[inline]
    #[must_use]
    pub fn flux(&self) -> Vec3 {
        self.color * self.intensity
    }
}

impl Default for PointLight {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 1.0, Vec3::ONE, 1.0)
    }
}
