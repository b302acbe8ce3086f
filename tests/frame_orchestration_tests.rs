//! Frame Orchestration Tests
//!
//! Tests for:
//! - Capability checks of both renderer variants
//! - Pass order, names, dispatch sizes and draw counts of a clustered frame
//! - Clear-only frames while no scene is loaded
//! - `DEBUG_VIS` switching the shading program
//! - Framebuffer creation and resize handling
//! - Initialize / shutdown cycles releasing every GPU object

use glam::{Mat4, Vec3, Vec4};

use clustered_forward::renderer::backend::{
    BackendKind, BufferDesc, BufferId, BufferUsage, Caps, CapsFlags, ClearOp, CommandStream, Owned,
    SoftwareBackend,
};
use clustered_forward::renderer::cluster::LightGridEntry;
use clustered_forward::renderer::settings::{ClusterGrid, DEBUG_VIS_VARIABLE, RendererSettings};
use clustered_forward::renderer::{AnyRenderer, ClusteredStage, RenderTechnique, Renderer};
use clustered_forward::scene::{Camera, Material, Mesh, PointLight, Scene, Vertex};
use clustered_forward::{ClusteredRenderer, ForwardRenderer};

const DT: f32 = 1.0 / 60.0;

fn caps(supported: CapsFlags, backend: BackendKind) -> Caps {
    Caps { supported, backend }
}

/// Geometry buffers stay alive as long as the returned handles.
fn triangle(gpu: &mut dyn CommandStream, material: usize, keep: &mut Vec<Owned<BufferId>>) -> Mesh {
    let vertices = [
        Vertex {
            position: [-1.0, -1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0, 0.0],
        },
        Vertex {
            position: [1.0, -1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [1.0, 0.0],
        },
        Vertex {
            position: [0.0, 1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.5, 1.0],
        },
    ];
    let indices: [u32; 3] = [0, 1, 2];

    let vb = gpu.create_buffer(&BufferDesc {
        label: "triangle vertices".into(),
        size: std::mem::size_of_val(&vertices) as u64,
        usage: BufferUsage::VERTEX,
    });
    let ib = gpu.create_buffer(&BufferDesc {
        label: "triangle indices".into(),
        size: std::mem::size_of_val(&indices) as u64,
        usage: BufferUsage::INDEX,
    });
    gpu.write_buffer(vb.id(), 0, bytemuck::cast_slice(&vertices));
    gpu.write_buffer(ib.id(), 0, bytemuck::cast_slice(&indices));

    let mut mesh = Mesh::new(vb.id(), ib.id(), 3, material);
    mesh.transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
    keep.push(vb);
    keep.push(ib);
    mesh
}

fn loaded_scene(gpu: &mut dyn CommandStream, meshes: usize) -> (Scene, Vec<Owned<BufferId>>) {
    let mut scene = Scene {
        loaded: true,
        camera: Camera::new_perspective(60.0, 0.1, 100.0),
        lights: vec![
            PointLight::new(Vec3::new(0.0, 1.0, -4.0), 5.0, Vec3::ONE, 20.0),
            PointLight::new(Vec3::new(2.0, 0.0, -6.0), 3.0, Vec3::new(1.0, 0.5, 0.2), 10.0),
        ],
        materials: vec![Material {
            base_color: Vec4::new(0.8, 0.8, 0.8, 1.0),
            ..Material::default()
        }],
        sky_color: Vec3::new(0.5, 0.5, 0.5),
        ..Scene::default()
    };
    let mut geometry = Vec::new();
    scene.meshes = (0..meshes).map(|_| triangle(gpu, 0, &mut geometry)).collect();
    (scene, geometry)
}

fn clustered(gpu: &mut SoftwareBackend, settings: RendererSettings) -> ClusteredRenderer {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut renderer = ClusteredRenderer::new(settings).unwrap();
    renderer.initialize(gpu);
    renderer.reset(gpu, 1280, 720);
    renderer
}

// ============================================================================
// Capabilities
// ============================================================================

#[test]
fn clustered_requires_every_capability() {
    let all = CapsFlags::all();
    assert!(ClusteredRenderer::supported(&caps(all, BackendKind::Vulkan)));

    for missing in [
        CapsFlags::COMPUTE,
        CapsFlags::FRAGMENT_DEPTH,
        CapsFlags::RGBA16F_MSAA_TARGET,
    ] {
        assert!(
            !ClusteredRenderer::supported(&caps(all - missing, BackendKind::Vulkan)),
            "{missing:?} should be required"
        );
    }
}

#[test]
fn direct3d12_stands_in_for_32bit_indices() {
    let without_index32 = CapsFlags::all() - CapsFlags::INDEX32;
    assert!(!ClusteredRenderer::supported(&caps(without_index32, BackendKind::Vulkan)));
    assert!(!ClusteredRenderer::supported(&caps(without_index32, BackendKind::Metal)));
    assert!(ClusteredRenderer::supported(&caps(without_index32, BackendKind::Direct3D12)));
}

#[test]
fn forward_only_needs_the_hdr_target() {
    let hdr_only = CapsFlags::RGBA16F_MSAA_TARGET;
    assert!(ForwardRenderer::supported(&caps(hdr_only, BackendKind::OpenGl)));
    assert!(!ForwardRenderer::supported(&caps(CapsFlags::empty(), BackendKind::OpenGl)));
    assert_eq!(
        RenderTechnique::best_supported(&caps(hdr_only, BackendKind::OpenGl)),
        Some(RenderTechnique::Forward)
    );
    assert_eq!(
        RenderTechnique::best_supported(&caps(CapsFlags::all(), BackendKind::Vulkan)),
        Some(RenderTechnique::Clustered)
    );
    assert_eq!(RenderTechnique::best_supported(&caps(CapsFlags::empty(), BackendKind::Other)), None);
}

// ============================================================================
// Clustered Frame Layout
// ============================================================================

#[test]
fn loaded_frame_records_three_passes_in_order() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    let (scene, _geometry) = loaded_scene(&mut gpu, 3);

    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();

    let frame = gpu.last_frame();
    let ids: Vec<_> = frame.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    for (pass, stage) in frame.iter().zip(ClusteredStage::ALL) {
        assert_eq!(pass.name, stage.name());
    }

    let grid = ClusterGrid::default();
    assert_eq!(frame[0].dispatches.len(), 1);
    assert_eq!(frame[0].dispatches[0].groups, [16, 8, 24]);
    assert_eq!(frame[0].dispatches[0].groups, grid.build_groups());
    assert_eq!(frame[1].dispatches.len(), 1);
    assert_eq!(frame[1].dispatches[0].groups, [1, 1, 12]);

    let lighting = &frame[2];
    assert!(lighting.dispatches.is_empty());
    assert_eq!(lighting.draws.len(), 3);
    assert_eq!(lighting.target, renderer.core().frame_buffer());
    assert!(lighting.transform.is_some());
    for draw in &lighting.draws {
        assert_eq!(draw.label, "vs_clustered+fs_clustered");
        assert_eq!(draw.index_count, 3);
        assert_eq!(draw.uniform_sizes.len(), 3);
    }
}

#[test]
fn compute_passes_have_no_render_target() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    let (scene, _geometry) = loaded_scene(&mut gpu, 1);
    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();

    let frame = gpu.last_frame();
    assert!(frame[0].target.is_none() && frame[1].target.is_none());
    assert!(frame[0].draws.is_empty() && frame[1].draws.is_empty());
}

#[test]
fn unloaded_scene_only_clears() {
    let mut gpu = SoftwareBackend::new();
    let settings = RendererSettings::default();
    let fallback = settings.fallback_clear_color;
    let mut renderer = clustered(&mut gpu, settings);

    renderer.render(&mut gpu, &Scene::default(), DT);
    gpu.frame();

    let frame = gpu.last_frame();
    assert_eq!(frame.len(), 1);
    let pass = &frame[0];
    assert_eq!(pass.id, ClusteredStage::Lighting.view());
    assert_eq!(pass.name, "Clustered lighting pass");
    assert!(pass.dispatches.is_empty() && pass.draws.is_empty());
    assert_eq!(
        pass.clear,
        ClearOp::ColorDepth {
            rgba: fallback,
            depth: 1.0
        }
    );
}

#[test]
fn loaded_scene_clears_to_linear_sky_color() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    let (scene, _geometry) = loaded_scene(&mut gpu, 1);
    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();

    // sRGB 0.5 is linear ~0.214, i.e. 55 of 255.
    let ClearOp::ColorDepth { rgba, depth } = gpu.last_frame()[2].clear else {
        panic!("lighting pass must clear");
    };
    assert_eq!(rgba, 0x3737_37ff);
    assert_eq!(depth, 1.0);
}

#[test]
fn mesh_with_missing_material_is_skipped() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    let (mut scene, _geometry) = loaded_scene(&mut gpu, 2);
    scene.meshes[1].material = 7;

    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();
    assert_eq!(gpu.last_frame()[2].draws.len(), 1);
}

#[test]
fn debug_vis_only_swaps_the_shading_program() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    let (scene, _geometry) = loaded_scene(&mut gpu, 2);

    let cluster_state = |gpu: &SoftwareBackend, renderer: &ClusteredRenderer| {
        let buffers = renderer.cluster_buffers().unwrap();
        let lights = renderer.light_list().unwrap();
        [buffers.clusters(), buffers.light_grid(), buffers.light_indices(), lights.buffer()]
            .map(|id| gpu.read_buffer::<u32>(id))
    };

    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();
    let normal = gpu.last_frame().to_vec();
    let normal_buffers = cluster_state(&gpu, &renderer);

    renderer.set_variable(DEBUG_VIS_VARIABLE, "true");
    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();
    let debug = gpu.last_frame().to_vec();
    let debug_buffers = cluster_state(&gpu, &renderer);

    let grid: Vec<LightGridEntry> = gpu.read_buffer(renderer.cluster_buffers().unwrap().light_grid());
    assert!(grid.iter().any(|entry| entry.count > 0), "no cluster received a light");
    assert_eq!(normal_buffers, debug_buffers);

    assert_eq!(normal.len(), debug.len());
    assert_eq!(normal[0], debug[0]);
    assert_eq!(normal[1], debug[1]);
    assert_eq!(debug[2].draws.len(), 2);
    for (a, b) in normal[2].draws.iter().zip(&debug[2].draws) {
        assert_eq!(a.label, "vs_clustered+fs_clustered");
        assert_eq!(b.label, "vs_clustered+fs_clustered_debug_vis");
        assert_eq!(a.index_count, b.index_count);
    }

    renderer.set_variable(DEBUG_VIS_VARIABLE, "false");
    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();
    assert_eq!(gpu.last_frame()[2].draws[0].label, "vs_clustered+fs_clustered");
}

#[test]
fn debug_vis_setting_seeds_the_variable() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(
        &mut gpu,
        RendererSettings {
            debug_vis: true,
            ..RendererSettings::default()
        },
    );
    let (scene, _geometry) = loaded_scene(&mut gpu, 1);
    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();
    assert_eq!(gpu.last_frame()[2].draws[0].label, "vs_clustered+fs_clustered_debug_vis");
}

#[test]
fn render_before_initialize_still_clears() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = ClusteredRenderer::new(RendererSettings::default()).unwrap();
    renderer.reset(&mut gpu, 640, 480);
    let (scene, _geometry) = loaded_scene(&mut gpu, 1);

    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();
    let frame = gpu.last_frame();
    assert_eq!(frame.len(), 1);
    assert!(frame[0].draws.is_empty());
}

#[test]
fn clock_accumulates_frame_times() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    for _ in 0..4 {
        renderer.render(&mut gpu, &Scene::default(), 0.25);
        gpu.frame();
    }
    assert!((renderer.core().time() - 1.0).abs() < 1e-6);
}

// ============================================================================
// Framebuffer
// ============================================================================

#[test]
fn reset_creates_main_framebuffer() {
    let mut gpu = SoftwareBackend::new();
    let renderer = clustered(&mut gpu, RendererSettings::default());
    let fb = renderer.core().frame_buffer().expect("framebuffer");
    let desc = gpu.framebuffer(fb).unwrap();
    assert_eq!((desc.width, desc.height), (1280, 720));
    assert!(desc.depth);
}

#[test]
fn same_size_reset_keeps_the_framebuffer() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    let before = renderer.core().frame_buffer();
    renderer.reset(&mut gpu, 1280, 720);
    assert_eq!(renderer.core().frame_buffer(), before);
}

#[test]
fn resize_recreates_the_framebuffer() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    let before = renderer.core().frame_buffer();
    renderer.reset(&mut gpu, 800, 600);
    let after = renderer.core().frame_buffer();
    assert_ne!(after, before);
    let desc = gpu.framebuffer(after.unwrap()).unwrap();
    assert_eq!((desc.width, desc.height), (800, 600));

    gpu.frame();
    assert_eq!(gpu.live_objects().2, 1);
}

#[test]
fn failed_framebuffer_leaves_draws_unexecuted() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    renderer.reset(&mut gpu, 0, 0);
    assert!(renderer.core().frame_buffer().is_none());

    let (scene, _geometry) = loaded_scene(&mut gpu, 2);
    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();
    let frame = gpu.last_frame();
    assert_eq!(frame.len(), 3);
    assert!(frame[2].target.is_none());
    assert!(frame[2].draws.is_empty());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn shutdown_releases_everything() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    // 4 programs; cluster AABBs, light indices, light grid and lights; 1 framebuffer.
    assert_eq!(gpu.live_objects(), (4, 4, 1));

    renderer.shutdown();
    gpu.frame();
    assert_eq!(gpu.live_objects(), (0, 0, 0));
}

#[test]
fn initialize_shutdown_cycles_do_not_leak() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = ClusteredRenderer::new(RendererSettings::default()).unwrap();
    let scene = Scene::default();

    for _ in 0..3 {
        renderer.initialize(&mut gpu);
        renderer.reset(&mut gpu, 320, 240);
        renderer.render(&mut gpu, &scene, DT);
        gpu.frame();
        assert_eq!(gpu.live_objects(), (4, 4, 1));
        renderer.shutdown();
        gpu.frame();
        assert_eq!(gpu.live_objects(), (0, 0, 0));
    }
}

#[test]
fn reinitialize_replaces_resources() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = clustered(&mut gpu, RendererSettings::default());
    renderer.initialize(&mut gpu);
    gpu.frame();
    assert_eq!(gpu.live_objects(), (4, 4, 1));
}

// ============================================================================
// Forward Variant
// ============================================================================

#[test]
fn forward_frame_is_a_single_lighting_pass() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = AnyRenderer::new(RenderTechnique::Forward, RendererSettings::default()).unwrap();
    assert_eq!(renderer.technique(), RenderTechnique::Forward);
    renderer.initialize(&mut gpu);
    renderer.reset(&mut gpu, 640, 360);
    let (scene, _geometry) = loaded_scene(&mut gpu, 2);

    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();
    let frame = gpu.last_frame();
    assert_eq!(frame.len(), 1);
    assert_eq!(frame[0].name, "Forward lighting pass");
    assert!(frame[0].dispatches.is_empty());
    assert_eq!(frame[0].draws.len(), 2);
    assert_eq!(frame[0].draws[0].label, "vs_clustered+fs_forward");
}

#[test]
fn any_renderer_dispatches_to_clustered() {
    let mut gpu = SoftwareBackend::new();
    let mut renderer = AnyRenderer::new(RenderTechnique::Clustered, RendererSettings::default()).unwrap();
    assert_eq!(renderer.name(), "Clustered");
    renderer.initialize(&mut gpu);
    renderer.reset(&mut gpu, 640, 360);
    let (scene, _geometry) = loaded_scene(&mut gpu, 1);
    renderer.render(&mut gpu, &scene, DT);
    gpu.frame();
    assert_eq!(gpu.last_frame().len(), 3);
}
