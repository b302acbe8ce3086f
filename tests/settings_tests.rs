//! Settings Tests
//!
//! Tests for:
//! - Defaults of the cluster grid and renderer settings
//! - JSON (de)serialization with partial documents
//! - Validation errors
//! - Render variables

use clustered_forward::errors::ClusterError;
use clustered_forward::renderer::{AnyRenderer, RenderTechnique};
use clustered_forward::{ClusteredRenderer, ForwardRenderer};
use clustered_forward::renderer::settings::{
    ClusterGrid, DEBUG_VIS_VARIABLE, MAX_WORKGROUP_INVOCATIONS, RenderVariables, RendererSettings,
};

// ============================================================================
// Defaults
// ============================================================================

#[test]
fn default_grid_dimensions() {
    let grid = ClusterGrid::default();
    assert_eq!((grid.x, grid.y, grid.z), (16, 8, 24));
    assert_eq!(grid.z_threads, 2);
    assert_eq!(grid.max_lights_per_cluster, 100);
    assert_eq!(grid.cluster_count(), 3072);
    assert_eq!(grid.light_index_capacity(), 307_200);
    assert_eq!(grid.workgroup_invocations(), MAX_WORKGROUP_INVOCATIONS);
    assert!(grid.validate().is_ok());
}

#[test]
fn default_settings_validate() {
    let settings = RendererSettings::default();
    assert_eq!(settings.max_lights, 4096);
    assert!(!settings.debug_vis);
    assert_eq!(settings.fallback_clear_color, 0x3030_30ff);
    assert!(settings.validate().is_ok());
}

// ============================================================================
// Serialization
// ============================================================================

#[test]
fn partial_json_fills_defaults() {
    let settings: RendererSettings =
        serde_json::from_str(r#"{ "grid": { "z": 32, "z_threads": 1 }, "debug_vis": true }"#).unwrap();
    assert_eq!(settings.grid.z, 32);
    assert_eq!(settings.grid.z_threads, 1);
    assert_eq!(settings.grid.x, 16);
    assert_eq!(settings.max_lights, 4096);
    assert!(settings.debug_vis);
}

#[test]
fn settings_survive_json() {
    let settings = RendererSettings {
        grid: ClusterGrid {
            x: 8,
            y: 4,
            z: 16,
            z_threads: 4,
            max_lights_per_cluster: 64,
        },
        max_lights: 512,
        debug_vis: true,
        fallback_clear_color: 0x1020_30ff,
    };
    let json = serde_json::to_string(&settings).unwrap();
    let back: RendererSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(back, settings);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn empty_axis_is_rejected() {
    let grid = ClusterGrid {
        y: 0,
        ..ClusterGrid::default()
    };
    assert!(matches!(grid.validate(), Err(ClusterError::EmptyGridAxis { axis: "y" })));
}

#[test]
fn depth_batches_must_divide_slices() {
    let grid = ClusterGrid {
        z: 25,
        ..ClusterGrid::default()
    };
    assert!(matches!(
        grid.validate(),
        Err(ClusterError::UnevenDepthBatches { z: 25, z_threads: 2 })
    ));
}

#[test]
fn oversized_workgroup_is_rejected() {
    let grid = ClusterGrid {
        z_threads: 4,
        ..ClusterGrid::default()
    };
    assert!(matches!(
        grid.validate(),
        Err(ClusterError::WorkgroupTooLarge { invocations: 512, .. })
    ));
}

#[test]
fn zero_capacities_are_rejected() {
    let grid = ClusterGrid {
        max_lights_per_cluster: 0,
        ..ClusterGrid::default()
    };
    assert!(matches!(grid.validate(), Err(ClusterError::ZeroCapacity(_))));

    let settings = RendererSettings {
        max_lights: 0,
        ..RendererSettings::default()
    };
    assert!(matches!(settings.validate(), Err(ClusterError::ZeroCapacity("max_lights"))));
}

#[test]
fn grid_errors_surface_through_settings() {
    let settings = RendererSettings {
        grid: ClusterGrid {
            x: 0,
            ..ClusterGrid::default()
        },
        ..RendererSettings::default()
    };
    assert!(settings.validate().is_err());
}

#[test]
fn renderers_reject_invalid_settings() {
    for grid in [
        ClusterGrid {
            z_threads: 5,
            ..ClusterGrid::default()
        },
        ClusterGrid {
            z_threads: 0,
            ..ClusterGrid::default()
        },
    ] {
        let settings = RendererSettings {
            grid,
            ..RendererSettings::default()
        };
        assert!(ClusteredRenderer::new(settings.clone()).is_err(), "{grid:?}");
        assert!(ForwardRenderer::new(settings.clone()).is_err(), "{grid:?}");
        assert!(AnyRenderer::new(RenderTechnique::Clustered, settings).is_err(), "{grid:?}");
    }
}

#[test]
fn uneven_batches_surface_from_the_renderer() {
    let settings = RendererSettings {
        grid: ClusterGrid {
            z_threads: 5,
            ..ClusterGrid::default()
        },
        ..RendererSettings::default()
    };
    assert!(matches!(
        ClusteredRenderer::new(settings),
        Err(ClusterError::UnevenDepthBatches { z: 24, z_threads: 5 })
    ));
    assert!(ClusteredRenderer::new(RendererSettings::default()).is_ok());
}

// ============================================================================
// Grid Indexing
// ============================================================================

#[test]
fn index_is_x_fastest() {
    let grid = ClusterGrid::default();
    assert_eq!(grid.coords(grid.cluster_count() - 1), glam::UVec3::new(15, 7, 23));
    assert_eq!(grid.index(1, 0, 0), 1);
    assert_eq!(grid.index(0, 1, 0), 16);
    assert_eq!(grid.index(0, 0, 1), 128);
}

#[test]
fn dispatch_sizes_follow_the_grid() {
    let grid = ClusterGrid {
        x: 8,
        y: 4,
        z: 12,
        z_threads: 3,
        max_lights_per_cluster: 10,
    };
    assert_eq!(grid.build_groups(), [8, 4, 12]);
    assert_eq!(grid.cull_groups(), [1, 1, 4]);
}

#[test]
fn shader_defines_cover_every_dimension() {
    let defines = ClusterGrid::default().shader_defines();
    assert_eq!(defines["CLUSTERS_X"], "16");
    assert_eq!(defines["CLUSTERS_Y"], "8");
    assert_eq!(defines["CLUSTERS_Z"], "24");
    assert_eq!(defines["CLUSTERS_Z_THREADS"], "2");
    assert_eq!(defines["MAX_LIGHTS_PER_CLUSTER"], "100");
}

// ============================================================================
// Render Variables
// ============================================================================

#[test]
fn debug_vis_variable_round_trip() {
    let mut vars = RenderVariables::from_settings(&RendererSettings::default());
    assert!(!vars.debug_vis());
    vars.set(DEBUG_VIS_VARIABLE, "true");
    assert!(vars.debug_vis());
    assert_eq!(vars.get(DEBUG_VIS_VARIABLE), Some("true"));
    vars.set(DEBUG_VIS_VARIABLE, "0");
    assert!(!vars.debug_vis());
}

#[test]
fn unknown_variables_are_stored() {
    let mut vars = RenderVariables::default();
    vars.set("EXPOSURE", "1.5");
    assert_eq!(vars.get("EXPOSURE"), Some("1.5"));
    assert!(!vars.is_true("EXPOSURE"));
    assert_eq!(vars.get("MISSING"), None);
}
