#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod renderer;
pub mod scene;

pub use errors::{ClusterError, Result};
pub use renderer::backend::{CommandStream, SoftwareBackend, WgpuBackend};
pub use renderer::{
    AnyRenderer, ClusterGrid, ClusteredRenderer, ClusteredStage, ForwardRenderer, RenderTechnique, Renderer,
    RendererSettings,
};
pub use scene::{Camera, Material, Mesh, PointLight, Scene, Vertex};
