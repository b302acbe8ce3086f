//! Rendering Module
//!
//! Renderers turn a [`Scene`] snapshot into passes on a
//! [`CommandStream`](backend::CommandStream). All variants share the same
//! lifecycle:
//!
//! ```text
//! supported(caps)? ─► new(settings) ─► initialize ─► reset(w, h) ─► render … ─► shutdown
//!                                          ▲                                      │
//!                                          └──────────────────────────────────────┘
//! ```
//!
//! - `initialize` creates programs and buffers; calling it again replaces them.
//! - `reset` records the target size and creates the main framebuffer if it is
//!   missing (or the size changed).
//! - `render` records one frame; the caller submits it with
//!   [`CommandStream::frame`](backend::CommandStream::frame).
//! - `shutdown` releases everything `initialize` and `reset` created; the
//!   renderer can be initialized again afterwards.
//!
//! # Variants
//!
//! | Technique | Requirements | Passes |
//! |-----------|--------------|--------|
//! | [`RenderTechnique::Forward`] | HDR MSAA target | 1 |
//! | [`RenderTechnique::Clustered`] | + compute, 32-bit indices, fragment depth | 3 |

pub mod backend;
pub mod base;
pub mod cluster;
pub mod clustered;
pub mod forward;
pub mod lights;
pub mod pbr;
pub mod settings;
pub mod stage;

pub use base::RendererCore;
pub use clustered::ClusteredRenderer;
pub use forward::ForwardRenderer;
pub use settings::{ClusterGrid, RenderVariables, RendererSettings};
pub use stage::ClusteredStage;

use backend::{Caps, CommandStream};

use crate::errors::Result;
use crate::scene::Scene;

/// Lifecycle shared by every renderer variant.
pub trait Renderer {
    fn name(&self) -> &'static str;

    fn initialize(&mut self, gpu: &mut dyn CommandStream);

    fn reset(&mut self, gpu: &mut dyn CommandStream, width: u32, height: u32);

    fn render(&mut self, gpu: &mut dyn CommandStream, scene: &Scene, dt: f32);

    /// Drops every GPU object owned by the renderer. The backend destroys them
    /// at the end of the next frame.
    fn shutdown(&mut self);

    fn set_variable(&mut self, name: &str, value: &str);
}

/// The closed set of renderer variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTechnique {
    Forward,
    Clustered,
}

impl RenderTechnique {
    #[must_use]
    pub fn supported(self, caps: &Caps) -> bool {
        match self {
            Self::Forward => ForwardRenderer::supported(caps),
            Self::Clustered => ClusteredRenderer::supported(caps),
        }
    }

    /// The most capable technique `caps` supports, if any.
    #[must_use]
    pub fn best_supported(caps: &Caps) -> Option<Self> {
        [Self::Clustered, Self::Forward]
            .into_iter()
            .find(|t| t.supported(caps))
    }
}

/// A renderer of any technique.
#[derive(Debug)]
pub enum AnyRenderer {
    Forward(ForwardRenderer),
    Clustered(ClusteredRenderer),
}

impl AnyRenderer {
    pub fn new(technique: RenderTechnique, settings: RendererSettings) -> Result<Self> {
        Ok(match technique {
            RenderTechnique::Forward => Self::Forward(ForwardRenderer::new(settings)?),
            RenderTechnique::Clustered => Self::Clustered(ClusteredRenderer::new(settings)?),
        })
    }

    #[must_use]
    pub fn technique(&self) -> RenderTechnique {
        match self {
            Self::Forward(_) => RenderTechnique::Forward,
            Self::Clustered(_) => RenderTechnique::Clustered,
        }
    }

    fn inner(&mut self) -> &mut dyn Renderer {
        match self {
            Self::Forward(r) => r,
            Self::Clustered(r) => r,
        }
    }
}

impl Renderer for AnyRenderer {
    fn name(&self) -> &'static str {
        match self {
            Self::Forward(r) => r.name(),
            Self::Clustered(r) => r.name(),
        }
    }

    fn initialize(&mut self, gpu: &mut dyn CommandStream) {
        self.inner().initialize(gpu);
    }

    fn reset(&mut self, gpu: &mut dyn CommandStream, width: u32, height: u32) {
        self.inner().reset(gpu, width, height);
    }

    fn render(&mut self, gpu: &mut dyn CommandStream, scene: &Scene, dt: f32) {
        self.inner().render(gpu, scene, dt);
    }

    fn shutdown(&mut self) {
        self.inner().shutdown();
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.inner().set_variable(name, value);
    }
}
