use log::warn;

use crate::renderer::backend::{Access, Binding, BufferDesc, BufferId, CommandStream, Owned};
use crate::renderer::cluster::{GpuPointLight, LIGHTS_SLOT};
use crate::scene::PointLight;

/// GPU copy of the scene's point lights.
///
/// The buffer holds `capacity` lights; uploads beyond that are truncated with a
/// warning (logged once per distinct overflow size).
#[derive(Debug)]
pub struct LightList {
    buffer: Owned<BufferId>,
    capacity: u32,
    count: u32,
    staging: Vec<GpuPointLight>,
    reported_overflow: Option<usize>,
}

impl LightList {
    pub fn new(gpu: &mut dyn CommandStream, capacity: u32) -> Self {
        let buffer = gpu.create_buffer(&BufferDesc::storage(
            "point_lights",
            u64::from(capacity) * std::mem::size_of::<GpuPointLight>() as u64,
        ));
        Self {
            buffer,
            capacity,
            count: 0,
            staging: Vec::with_capacity(capacity as usize),
            reported_overflow: None,
        }
    }

    /// Packs and uploads `lights`. Returns the number of lights uploaded.
    pub fn update(&mut self, gpu: &mut dyn CommandStream, lights: &[PointLight]) -> u32 {
        let kept = lights.len().min(self.capacity as usize);
        if kept < lights.len() {
            if self.reported_overflow != Some(lights.len()) {
                warn!(
                    "{} point lights exceed the light buffer capacity of {}; the rest are ignored",
                    lights.len(),
                    self.capacity
                );
                self.reported_overflow = Some(lights.len());
            }
        } else {
            self.reported_overflow = None;
        }

        self.staging.clear();
        self.staging.extend(lights[..kept].iter().map(GpuPointLight::from));
        if !self.staging.is_empty() {
            gpu.write_buffer(self.buffer.id(), 0, bytemuck::cast_slice(&self.staging));
        }
        self.count = kept as u32;
        self.count
    }

    /// Lights uploaded by the last [`update`](Self::update).
    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn buffer(&self) -> BufferId {
        self.buffer.id()
    }

    #[must_use]
    pub fn binding(&self) -> Binding {
        Binding::new(LIGHTS_SLOT, self.buffer.id(), Access::Read)
    }
}
