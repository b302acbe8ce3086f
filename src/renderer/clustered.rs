//! Clustered Forward Renderer
//!
//! Records three passes per frame:
//!
//! ```text
//! pass 0  Cluster building   (compute)  X × Y × Z groups       → cluster AABBs
//! pass 1  Light culling      (compute)  1 × 1 × Z/Z_THREADS    → light grid + indices
//! pass 2  Lighting           (graphics) one draw per mesh      → main framebuffer
//! ```
//!
//! The lighting pass always clears the target; when the scene is not loaded
//! nothing else is recorded. Setting the render variable `DEBUG_VIS` to `"true"`
//! replaces the shading program with a light-count heat map without changing
//! anything else about the frame.

use log::{debug, warn};

use crate::errors::Result;
use crate::renderer::backend::{
    BackendKind, Caps, CapsFlags, CommandStream, Dispatch, Draw, Owned, PassDescriptor, ProgramDesc,
    ProgramId, StorageSlot,
};
use crate::renderer::base::RendererCore;
use crate::renderer::cluster::kernels::{CLUSTER_BUILDING_SHADER, LIGHT_CULLING_SHADER};
use crate::renderer::cluster::{
    CLUSTERS_SLOT, ClusterBufferSet, LIGHT_GRID_SLOT, LIGHT_INDICES_SLOT, LIGHTS_SLOT,
};
use crate::renderer::lights::LightList;
use crate::renderer::pbr::{DrawUniforms, MaterialUniforms};
use crate::renderer::settings::RendererSettings;
use crate::renderer::stage::ClusteredStage;
use crate::renderer::Renderer;
use crate::scene::Scene;

const BUILD_SLOTS: &[StorageSlot] = &[StorageSlot::read_write(CLUSTERS_SLOT)];
const CULL_SLOTS: &[StorageSlot] = &[
    StorageSlot::read(CLUSTERS_SLOT),
    StorageSlot::read_write(LIGHT_INDICES_SLOT),
    StorageSlot::read_write(LIGHT_GRID_SLOT),
    StorageSlot::read(LIGHTS_SLOT),
];
const SHADE_SLOTS: &[StorageSlot] = &[
    StorageSlot::read(LIGHT_INDICES_SLOT),
    StorageSlot::read(LIGHT_GRID_SLOT),
    StorageSlot::read(LIGHTS_SLOT),
];
const DEBUG_VIS_SLOTS: &[StorageSlot] = &[
    StorageSlot::read(LIGHT_INDICES_SLOT),
    StorageSlot::read(LIGHT_GRID_SLOT),
];

/// GPU objects owned between `initialize` and `shutdown`.
#[derive(Debug)]
struct ClusteredResources {
    cluster_building: Owned<ProgramId>,
    light_culling: Owned<ProgramId>,
    lighting: Owned<ProgramId>,
    debug_vis: Owned<ProgramId>,
    clusters: ClusterBufferSet,
    lights: LightList,
}

#[derive(Debug)]
pub struct ClusteredRenderer {
    core: RendererCore,
    resources: Option<ClusteredResources>,
}

impl ClusteredRenderer {
    pub fn new(settings: RendererSettings) -> Result<Self> {
        Ok(Self {
            core: RendererCore::new(settings)?,
            resources: None,
        })
    }

    /// Base requirements plus compute, 32-bit indices (or Direct3D 12) and
    /// fragment depth.
    #[must_use]
    pub fn supported(caps: &Caps) -> bool {
        RendererCore::supported(caps)
            && caps.has(CapsFlags::COMPUTE)
            && (caps.has(CapsFlags::INDEX32) || caps.backend == BackendKind::Direct3D12)
            && caps.has(CapsFlags::FRAGMENT_DEPTH)
    }

    #[must_use]
    pub fn core(&self) -> &RendererCore {
        &self.core
    }

    /// The cluster buffers, once initialized.
    #[must_use]
    pub fn cluster_buffers(&self) -> Option<&ClusterBufferSet> {
        self.resources.as_ref().map(|r| &r.clusters)
    }

    #[must_use]
    pub fn light_list(&self) -> Option<&LightList> {
        self.resources.as_ref().map(|r| &r.lights)
    }
}

impl Renderer for ClusteredRenderer {
    fn name(&self) -> &'static str {
        "Clustered"
    }

    fn initialize(&mut self, gpu: &mut dyn CommandStream) {
        let grid = self.core.settings.grid;
        let defines = grid.shader_defines();
        let with_grid = |desc: ProgramDesc| desc.with_defines(defines.clone());

        let resources = ClusteredResources {
            cluster_building: gpu
                .create_program(&with_grid(ProgramDesc::compute(CLUSTER_BUILDING_SHADER, 1, BUILD_SLOTS))),
            light_culling: gpu.create_program(&with_grid(ProgramDesc::compute(LIGHT_CULLING_SHADER, 1, CULL_SLOTS))),
            lighting: gpu.create_program(&with_grid(ProgramDesc::graphics(
                "vs_clustered",
                "fs_clustered",
                3,
                SHADE_SLOTS,
            ))),
            debug_vis: gpu.create_program(&with_grid(ProgramDesc::graphics(
                "vs_clustered",
                "fs_clustered_debug_vis",
                3,
                DEBUG_VIS_SLOTS,
            ))),
            clusters: ClusterBufferSet::new(gpu, grid),
            lights: LightList::new(gpu, self.core.settings.max_lights),
        };
        debug!(
            "Clustered renderer initialized ({}x{}x{} clusters)",
            grid.x, grid.y, grid.z
        );
        self.resources = Some(resources);
    }

    fn reset(&mut self, gpu: &mut dyn CommandStream, width: u32, height: u32) {
        self.core.reset(gpu, width, height);
    }

    fn render(&mut self, gpu: &mut dyn CommandStream, scene: &Scene, dt: f32) {
        self.core.begin_frame(scene, dt);

        let lighting = ClusteredStage::Lighting;
        gpu.configure_pass(self.core.main_pass(lighting.view(), lighting.name()));

        if !scene.loaded {
            return;
        }
        let Some(res) = self.resources.as_mut() else {
            warn!("ClusteredRenderer::render called before initialize");
            return;
        };

        let transform = self.core.set_view_projection(scene);
        let rect = self.core.view_rect();
        let light_count = res.lights.update(gpu, &scene.lights);
        let uniforms = res.clusters.uniforms(
            transform.view,
            transform.proj,
            rect,
            scene.camera.near,
            scene.camera.far,
            light_count,
        );
        let cluster_block = bytemuck::bytes_of(&uniforms);
        let grid = *res.clusters.grid();

        // cluster building
        let building = ClusteredStage::ClusterBuilding;
        gpu.configure_pass(
            PassDescriptor::new(building.view(), building.name())
                .with_rect(rect)
                .with_transform(transform),
        );
        let bindings = res.clusters.bind_for_write();
        gpu.dispatch(
            building.view(),
            &Dispatch {
                program: res.cluster_building.id(),
                bindings: &bindings,
                uniforms: &[cluster_block],
                groups: grid.build_groups(),
            },
        );

        // light culling
        let culling = ClusteredStage::LightCulling;
        gpu.configure_pass(
            PassDescriptor::new(culling.view(), culling.name())
                .with_rect(rect)
                .with_transform(transform),
        );
        let mut bindings = res.clusters.bind_for_write();
        bindings.push(res.lights.binding());
        gpu.dispatch(
            culling.view(),
            &Dispatch {
                program: res.light_culling.id(),
                bindings: &bindings,
                uniforms: &[cluster_block],
                groups: grid.cull_groups(),
            },
        );

        // lighting
        gpu.configure_pass(
            self.core
                .main_pass(lighting.view(), lighting.name())
                .with_transform(transform),
        );
        let program = if self.core.variables.debug_vis() {
            res.debug_vis.id()
        } else {
            res.lighting.id()
        };
        let mut bindings = res.clusters.bind_for_read();
        bindings.push(res.lights.binding());
        let view_proj = transform.proj * transform.view;
        let camera_position = scene.camera.position();

        for mesh in &scene.meshes {
            let Some(material) = scene.materials.get(mesh.material) else {
                warn!("Mesh references missing material {}, skipped", mesh.material);
                continue;
            };
            let draw_block = DrawUniforms::new(mesh.transform, view_proj, camera_position, scene.camera.exposure);
            let material_block = MaterialUniforms::from(material);
            gpu.submit(
                lighting.view(),
                &Draw {
                    program,
                    vertex_buffer: mesh.vertex_buffer,
                    index_buffer: mesh.index_buffer,
                    index_count: mesh.index_count,
                    bindings: &bindings,
                    uniforms: &[
                        cluster_block,
                        bytemuck::bytes_of(&draw_block),
                        bytemuck::bytes_of(&material_block),
                    ],
                },
            );
        }
    }

    fn shutdown(&mut self) {
        self.resources = None;
        self.core.shutdown();
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.core.variables.set(name, value);
    }
}
