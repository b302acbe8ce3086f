//! Light Field
//!
//! Renders a tiled floor lit by a few hundred orbiting point lights without a
//! window. Uses the wgpu backend when an adapter is available and falls back to
//! the software backend otherwise, where it also prints the cluster occupancy.
//!
//! ```text
//! cargo run -p light_field -- [frames] [lights]
//! ```

use std::f32::consts::TAU;

use anyhow::Context;
use glam::{Vec3, Vec4};
use log::{info, warn};

use clustered_forward::renderer::backend::{BufferDesc, BufferId, BufferUsage, CommandStream, Owned};
use clustered_forward::renderer::cluster::LightGridEntry;
use clustered_forward::renderer::settings::DEBUG_VIS_VARIABLE;
use clustered_forward::{
    AnyRenderer, Camera, ClusteredRenderer, Material, Mesh, PointLight, RenderTechnique, Renderer, RendererSettings,
    Scene, SoftwareBackend, Vertex, WgpuBackend,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const TILES: u32 = 8;

struct Floor {
    mesh: Mesh,
    _vertices: Owned<BufferId>,
    _indices: Owned<BufferId>,
}

/// A `TILES × TILES` quad grid on the XZ plane, 40 units across.
fn build_floor(gpu: &mut dyn CommandStream) -> Floor {
    let step = 40.0 / TILES as f32;
    let mut vertices = Vec::new();
    for z in 0..=TILES {
        for x in 0..=TILES {
            vertices.push(Vertex {
                position: [x as f32 * step - 20.0, 0.0, z as f32 * step - 20.0],
                normal: [0.0, 1.0, 0.0],
                uv: [x as f32 / TILES as f32, z as f32 / TILES as f32],
            });
        }
    }
    let row = TILES + 1;
    let mut indices = Vec::new();
    for z in 0..TILES {
        for x in 0..TILES {
            let i = z * row + x;
            indices.extend_from_slice(&[i, i + row, i + 1, i + 1, i + row, i + row + 1]);
        }
    }

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
    let vb = gpu.create_buffer(&BufferDesc {
        label: "floor vertices".into(),
        size: vertex_bytes.len() as u64,
        usage: BufferUsage::VERTEX,
    });
    let ib = gpu.create_buffer(&BufferDesc {
        label: "floor indices".into(),
        size: index_bytes.len() as u64,
        usage: BufferUsage::INDEX,
    });
    gpu.write_buffer(vb.id(), 0, vertex_bytes);
    gpu.write_buffer(ib.id(), 0, index_bytes);

    Floor {
        mesh: Mesh::new(vb.id(), ib.id(), indices.len() as u32, 0),
        _vertices: vb,
        _indices: ib,
    }
}

/// Lights on concentric rings, rotating with `time`.
fn orbiting_lights(count: usize, time: f32) -> Vec<PointLight> {
    (0..count)
        .map(|i| {
            let t = i as f32 / count as f32;
            let radius = 3.0 + 15.0 * t;
            let angle = t * 40.0 + time * (0.2 + t);
            let color = Vec3::new(
                0.5 + 0.5 * (t * TAU).cos(),
                0.5 + 0.5 * (t * TAU + TAU / 3.0).cos(),
                0.5 + 0.5 * (t * TAU + 2.0 * TAU / 3.0).cos(),
            );
            PointLight::new(
                Vec3::new(radius * angle.cos(), 0.5 + 1.5 * t, radius * angle.sin()),
                2.5,
                color,
                8.0,
            )
        })
        .collect()
}

fn build_scene(floor: &Floor, light_count: usize) -> Scene {
    let mut camera = Camera::new_perspective(50.0, 0.1, 200.0);
    camera.look_at(Vec3::new(0.0, 14.0, 26.0), Vec3::ZERO, Vec3::Y);

    Scene {
        loaded: true,
        camera,
        lights: orbiting_lights(light_count, 0.0),
        meshes: vec![floor.mesh],
        materials: vec![Material {
            base_color: Vec4::new(0.7, 0.7, 0.72, 1.0),
            roughness: 0.6,
            ..Material::default()
        }],
        sky_color: Vec3::new(0.02, 0.02, 0.05),
    }
}

fn render_frames(
    gpu: &mut dyn CommandStream,
    renderer: &mut dyn Renderer,
    scene: &mut Scene,
    frames: u32,
    light_count: usize,
) {
    let dt = 1.0 / 60.0;
    for frame in 0..frames {
        scene.lights = orbiting_lights(light_count, frame as f32 * dt);
        if frame == frames / 2 {
            renderer.set_variable(DEBUG_VIS_VARIABLE, "true");
        }
        renderer.render(gpu, scene, dt);
        gpu.frame();
    }
}

fn report_occupancy(gpu: &SoftwareBackend, renderer: &ClusteredRenderer) {
    let Some(buffers) = renderer.cluster_buffers() else {
        return;
    };
    let grid: Vec<LightGridEntry> = gpu.read_buffer(buffers.light_grid());
    let occupied = grid.iter().filter(|e| e.count > 0).count();
    let max = grid.iter().map(|e| e.count).max().unwrap_or(0);
    let total: u64 = grid.iter().map(|e| u64::from(e.count)).sum();
    info!(
        "Clusters: {} of {} lit, {max} lights max, {:.2} per lit cluster",
        occupied,
        grid.len(),
        if occupied == 0 { 0.0 } else { total as f64 / occupied as f64 }
    );
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let frames: u32 = args
        .next()
        .map(|s| s.parse())
        .transpose()
        .context("frames must be a number")?
        .unwrap_or(120);
    let light_count: usize = args
        .next()
        .map(|s| s.parse())
        .transpose()
        .context("lights must be a number")?
        .unwrap_or(512);

    let settings = RendererSettings::default();
    settings.validate()?;

    match pollster::block_on(WgpuBackend::new_headless(wgpu::PowerPreference::HighPerformance)) {
        Ok(mut gpu) => {
            let Some(technique) = RenderTechnique::best_supported(gpu.caps()) else {
                anyhow::bail!("adapter supports neither renderer variant");
            };
            info!("Rendering {frames} frames with {light_count} lights ({technique:?})");
            let mut renderer = AnyRenderer::new(technique, settings)?;
            renderer.initialize(&mut gpu);
            renderer.reset(&mut gpu, WIDTH, HEIGHT);
            let floor = build_floor(&mut gpu);
            let mut scene = build_scene(&floor, light_count);
            render_frames(&mut gpu, &mut renderer, &mut scene, frames, light_count);
            renderer.shutdown();
            gpu.frame();
        }
        Err(e) => {
            warn!("No GPU available ({e}); using the software backend");
            let mut gpu = SoftwareBackend::new();
            let mut clustered = ClusteredRenderer::new(settings)?;
            clustered.initialize(&mut gpu);
            clustered.reset(&mut gpu, WIDTH, HEIGHT);
            let floor = build_floor(&mut gpu);
            let mut scene = build_scene(&floor, light_count);

            render_frames(&mut gpu, &mut clustered, &mut scene, frames, light_count);
            report_occupancy(&gpu, &clustered);
            info!("{} frames, {} passes in the last one", gpu.frame_count(), gpu.last_frame().len());
            clustered.shutdown();
            gpu.frame();
        }
    }
    Ok(())
}
