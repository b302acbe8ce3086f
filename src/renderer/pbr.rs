//! Per-draw uniform blocks of the shading programs.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::scene::Material;

/// WGSL `mat3x3<f32>` layout: three columns padded to 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Mat3Padded {
    pub cols: [Vec4; 3],
}

impl From<Mat3> for Mat3Padded {
    fn from(m: Mat3) -> Self {
        Self {
            cols: [m.x_axis.extend(0.0), m.y_axis.extend(0.0), m.z_axis.extend(0.0)],
        }
    }
}

/// Normal matrix of a model transform: the cofactor matrix of its upper 3×3.
///
/// Equals the inverse transpose up to a positive scale for orientation
/// preserving transforms, and stays finite for singular ones.
#[must_use]
pub fn normal_matrix(model: &Mat4) -> Mat3 {
    let a = model.x_axis.truncate();
    let b = model.y_axis.truncate();
    let c = model.z_axis.truncate();
    Mat3::from_cols(b.cross(c), c.cross(a), a.cross(b))
}

/// Group 0, binding 1.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub model: Mat4,
    pub view_proj: Mat4,
    pub normal_matrix: Mat3Padded,
    /// World space camera position in `xyz`, exposure in `w`.
    pub camera_position: Vec4,
}

impl DrawUniforms {
    #[must_use]
    pub fn new(model: Mat4, view_proj: Mat4, camera_position: Vec3, exposure: f32) -> Self {
        Self {
            model,
            view_proj,
            normal_matrix: normal_matrix(&model).into(),
            camera_position: camera_position.extend(exposure),
        }
    }
}

/// Group 0, binding 2.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub base_color: Vec4,
    /// Emissive color in `xyz`, metallic in `w`.
    pub emissive_metallic: Vec4,
    /// Roughness in `x`.
    pub params: Vec4,
}

impl From<&Material> for MaterialUniforms {
    fn from(material: &Material) -> Self {
        Self {
            base_color: material.base_color,
            emissive_metallic: material.emissive.extend(material.metallic),
            params: Vec4::new(material.roughness.clamp(0.045, 1.0), 0.0, 0.0, 0.0),
        }
    }
}
