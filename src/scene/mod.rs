//! Scene Snapshot
//!
//! Read-only, per-frame view of the scene consumed by the renderers:
//! - [`Camera`]: projection parameters and view transform
//! - [`PointLight`]: the light list culled into clusters
//! - [`Mesh`] / [`Material`]: draw submissions of the shading pass
//!
//! Asset loading and the scene graph live outside this crate; they only have to
//! fill a [`Scene`] once per frame. Mesh buffers are created through the
//! command-stream service and referenced here by id.

pub mod camera;
pub mod light;

pub use camera::Camera;
pub use light::PointLight;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::renderer::backend::BufferId;

/// Vertex layout shared by every shading program: position, normal, uv.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;
}

/// Surface parameters handed to the material binder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: Vec3,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            emissive: Vec3::ZERO,
        }
    }
}

/// One draw submission: GPU geometry plus a material index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mesh {
    pub vertex_buffer: BufferId,
    /// 32-bit index buffer.
    pub index_buffer: BufferId,
    pub index_count: u32,
    /// Index into [`Scene::materials`].
    pub material: usize,
    pub transform: Mat4,
}

impl Mesh {
    #[must_use]
    pub fn new(vertex_buffer: BufferId, index_buffer: BufferId, index_count: u32, material: usize) -> Self {
        Self {
            vertex_buffer,
            index_buffer,
            index_count,
            material,
            transform: Mat4::IDENTITY,
        }
    }
}

/// Per-frame scene snapshot.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// `false` while nothing is loaded; the renderers then only clear the target.
    pub loaded: bool,
    pub camera: Camera,
    pub lights: Vec<PointLight>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    /// Sky color in sRGB, used as the clear color once loaded.
    pub sky_color: Vec3,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
