//! CPU executions of the cluster compute shaders.
//!
//! Both kernels follow the work group decomposition of their WGSL
//! counterparts, so the software backend reproduces the GPU results exactly:
//!
//! | Shader | Work groups | One work group handles |
//! |--------|-------------|------------------------|
//! | `cs_clustered_clusterbuilding` | `X × Y × Z` | one cluster |
//! | `cs_clustered_lightculling` | `1 × 1 × Z/Z_THREADS` | `Z_THREADS` depth slices |

use log::warn;

use super::culling::{cull_clusters, lights_to_eye};
use super::partition::cluster_bounds;
use super::{
    CLUSTERS_SLOT, ClusterAabb, ClusterUniforms, GpuPointLight, LIGHT_GRID_SLOT, LIGHT_INDICES_SLOT,
    LIGHTS_SLOT, LightGridEntry,
};
use crate::renderer::backend::software::{KernelBuffers, KernelContext, KernelFn};

pub const CLUSTER_BUILDING_SHADER: &str = "cs_clustered_clusterbuilding";
pub const LIGHT_CULLING_SHADER: &str = "cs_clustered_lightculling";

/// Kernels registered by every software backend.
pub const BUILTIN_KERNELS: &[(&str, KernelFn)] = &[
    (CLUSTER_BUILDING_SHADER, build_clusters),
    (LIGHT_CULLING_SHADER, cull_lights),
];

/// Writes the bounds of the cluster at the work group id.
pub fn build_clusters(ctx: &KernelContext<'_>, buffers: &mut KernelBuffers) {
    let Some(uniforms) = ctx.uniform::<ClusterUniforms>(0) else {
        warn!("{CLUSTER_BUILDING_SHADER}: missing cluster uniforms");
        return;
    };
    let coords = ctx.workgroup_id;
    let grid = uniforms.cluster_grid();
    let index = grid.index(coords.x, coords.y, coords.z) as usize;

    let Some(clusters) = buffers.write::<ClusterAabb>(CLUSTERS_SLOT) else {
        return;
    };
    if let Some(slot) = clusters.get_mut(index) {
        *slot = cluster_bounds(coords, &uniforms);
    }
}

/// Culls every light against the `X·Y·Z_THREADS` clusters of one depth batch.
pub fn cull_lights(ctx: &KernelContext<'_>, buffers: &mut KernelBuffers) {
    let Some(uniforms) = ctx.uniform::<ClusterUniforms>(0) else {
        warn!("{LIGHT_CULLING_SHADER}: missing cluster uniforms");
        return;
    };
    let grid = uniforms.cluster_grid();
    let per_batch = grid.x * grid.y * grid.z_threads;
    let first = ctx.workgroup_id.z * per_batch;

    let Some(all_lights) = buffers.read::<GpuPointLight>(LIGHTS_SLOT) else {
        return;
    };
    let light_count = (uniforms.light_count() as usize).min(all_lights.len());
    let lights = lights_to_eye(&uniforms.view, &all_lights[..light_count]);

    let Some(all_aabbs) = buffers.read::<ClusterAabb>(CLUSTERS_SLOT) else {
        return;
    };
    let start = (first as usize).min(all_aabbs.len());
    let end = (start + per_batch as usize).min(all_aabbs.len());
    let aabbs = all_aabbs[start..end].to_vec();

    let Some((grid_entries, indices)) =
        buffers.write_pair::<LightGridEntry, u32>(LIGHT_GRID_SLOT, LIGHT_INDICES_SLOT)
    else {
        return;
    };
    cull_clusters(first, &aabbs, &lights, grid.max_lights_per_cluster, grid_entries, indices);
}
