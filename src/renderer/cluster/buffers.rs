use glam::Mat4;
use log::debug;

use super::{
    CLUSTERS_SLOT, ClusterAabb, ClusterUniforms, LIGHT_GRID_SLOT, LIGHT_INDICES_SLOT, LightGridEntry,
};
use crate::renderer::backend::{
    Access, Binding, Bindings, BufferDesc, BufferId, CommandStream, Owned, ViewRect,
};
use crate::renderer::settings::ClusterGrid;

/// The three storage buffers that hold the cluster grid.
///
/// | Slot | Buffer | Elements |
/// |------|--------|----------|
/// | 0 | cluster bounds | `X·Y·Z` × [`ClusterAabb`] |
/// | 1 | light index list | `X·Y·Z·C` × `u32` |
/// | 2 | light grid | `X·Y·Z` × [`LightGridEntry`] |
///
/// Sizes are fixed by the grid at creation. Contents are rewritten by the two
/// compute passes every frame and never read back by the CPU.
#[derive(Debug)]
pub struct ClusterBufferSet {
    grid: ClusterGrid,
    clusters: Owned<BufferId>,
    light_indices: Owned<BufferId>,
    light_grid: Owned<BufferId>,
}

impl ClusterBufferSet {
    pub fn new(gpu: &mut dyn CommandStream, grid: ClusterGrid) -> Self {
        let count = u64::from(grid.cluster_count());
        let clusters = gpu.create_buffer(&BufferDesc::storage(
            "cluster_aabbs",
            count * std::mem::size_of::<ClusterAabb>() as u64,
        ));
        let light_indices = gpu.create_buffer(&BufferDesc::storage(
            "cluster_light_indices",
            u64::from(grid.light_index_capacity()) * 4,
        ));
        let light_grid = gpu.create_buffer(&BufferDesc::storage(
            "cluster_light_grid",
            count * std::mem::size_of::<LightGridEntry>() as u64,
        ));
        debug!(
            "Cluster buffers created: {}x{}x{} clusters, {} light slots",
            grid.x,
            grid.y,
            grid.z,
            grid.light_index_capacity()
        );
        Self {
            grid,
            clusters,
            light_indices,
            light_grid,
        }
    }

    #[inline]
    #[must_use]
    pub fn grid(&self) -> &ClusterGrid {
        &self.grid
    }

    #[must_use]
    pub fn clusters(&self) -> BufferId {
        self.clusters.id()
    }

    #[must_use]
    pub fn light_indices(&self) -> BufferId {
        self.light_indices.id()
    }

    #[must_use]
    pub fn light_grid(&self) -> BufferId {
        self.light_grid.id()
    }

    /// Bindings for the compute passes: all three buffers, writable.
    #[must_use]
    pub fn bind_for_write(&self) -> Bindings {
        Bindings::from_slice(&[
            Binding::new(CLUSTERS_SLOT, self.clusters.id(), Access::ReadWrite),
            Binding::new(LIGHT_INDICES_SLOT, self.light_indices.id(), Access::ReadWrite),
            Binding::new(LIGHT_GRID_SLOT, self.light_grid.id(), Access::ReadWrite),
        ])
    }

    /// Bindings for shading: light grid and light indices, read-only.
    #[must_use]
    pub fn bind_for_read(&self) -> Bindings {
        Bindings::from_slice(&[
            Binding::new(LIGHT_INDICES_SLOT, self.light_indices.id(), Access::Read),
            Binding::new(LIGHT_GRID_SLOT, self.light_grid.id(), Access::Read),
        ])
    }

    /// Per-frame uniforms for a camera and target rectangle.
    #[must_use]
    pub fn uniforms(
        &self,
        view: Mat4,
        proj: Mat4,
        rect: ViewRect,
        near: f32,
        far: f32,
        light_count: u32,
    ) -> ClusterUniforms {
        ClusterUniforms::new(view, proj, rect, near, far, &self.grid, light_count)
    }
}
