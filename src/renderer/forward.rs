//! Plain forward renderer: one pass, every mesh shaded against every light.
//!
//! Shares the target, clear and variable handling with the clustered variant
//! and serves as its fallback on backends without compute support.

use log::warn;

use crate::errors::Result;
use crate::renderer::backend::{
    Caps, CommandStream, Draw, Owned, ProgramDesc, ProgramId, StorageSlot, ViewId,
};
use crate::renderer::base::RendererCore;
use crate::renderer::cluster::{ClusterUniforms, LIGHTS_SLOT};
use crate::renderer::lights::LightList;
use crate::renderer::pbr::{DrawUniforms, MaterialUniforms};
use crate::renderer::settings::RendererSettings;
use crate::renderer::Renderer;
use crate::scene::Scene;

pub const FORWARD_VIEW: ViewId = 0;

const FORWARD_SLOTS: &[StorageSlot] = &[StorageSlot::read(LIGHTS_SLOT)];

#[derive(Debug)]
struct ForwardResources {
    program: Owned<ProgramId>,
    lights: LightList,
}

#[derive(Debug)]
pub struct ForwardRenderer {
    core: RendererCore,
    resources: Option<ForwardResources>,
}

impl ForwardRenderer {
    pub fn new(settings: RendererSettings) -> Result<Self> {
        Ok(Self {
            core: RendererCore::new(settings)?,
            resources: None,
        })
    }

    #[must_use]
    pub fn supported(caps: &Caps) -> bool {
        RendererCore::supported(caps)
    }

    #[must_use]
    pub fn core(&self) -> &RendererCore {
        &self.core
    }
}

impl Renderer for ForwardRenderer {
    fn name(&self) -> &'static str {
        "Forward"
    }

    fn initialize(&mut self, gpu: &mut dyn CommandStream) {
        let desc = ProgramDesc::graphics("vs_clustered", "fs_forward", 3, FORWARD_SLOTS)
            .with_defines(self.core.settings.grid.shader_defines());
        self.resources = Some(ForwardResources {
            program: gpu.create_program(&desc),
            lights: LightList::new(gpu, self.core.settings.max_lights),
        });
    }

    fn reset(&mut self, gpu: &mut dyn CommandStream, width: u32, height: u32) {
        self.core.reset(gpu, width, height);
    }

    fn render(&mut self, gpu: &mut dyn CommandStream, scene: &Scene, dt: f32) {
        self.core.begin_frame(scene, dt);
        gpu.configure_pass(self.core.main_pass(FORWARD_VIEW, "Forward lighting pass"));

        if !scene.loaded {
            return;
        }
        let Some(res) = self.resources.as_mut() else {
            warn!("ForwardRenderer::render called before initialize");
            return;
        };

        let transform = self.core.set_view_projection(scene);
        gpu.configure_pass(
            self.core
                .main_pass(FORWARD_VIEW, "Forward lighting pass")
                .with_transform(transform),
        );

        let light_count = res.lights.update(gpu, &scene.lights);
        let uniforms = ClusterUniforms::new(
            transform.view,
            transform.proj,
            self.core.view_rect(),
            scene.camera.near,
            scene.camera.far,
            &self.core.settings.grid,
            light_count,
        );
        let frame_block = bytemuck::bytes_of(&uniforms);
        let bindings = [res.lights.binding()];
        let view_proj = transform.proj * transform.view;

        for mesh in &scene.meshes {
            let Some(material) = scene.materials.get(mesh.material) else {
                warn!("Mesh references missing material {}, skipped", mesh.material);
                continue;
            };
            let draw_block = DrawUniforms::new(
                mesh.transform,
                view_proj,
                scene.camera.position(),
                scene.camera.exposure,
            );
            let material_block = MaterialUniforms::from(material);
            gpu.submit(
                FORWARD_VIEW,
                &Draw {
                    program: res.program.id(),
                    vertex_buffer: mesh.vertex_buffer,
                    index_buffer: mesh.index_buffer,
                    index_count: mesh.index_count,
                    bindings: &bindings,
                    uniforms: &[
                        frame_block,
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
