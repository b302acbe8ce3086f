//! Command-Stream Service
//!
//! The renderers never talk to a graphics API directly. They record work into a
//! [`CommandStream`]: numbered passes ("views") that execute in ascending
//! [`ViewId`] order when the frame is submitted, with compute dispatches and
//! draws executing in submission order within a pass.
//!
//! Two implementations are provided:
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`WgpuBackend`] | Real GPU execution through wgpu |
//! | [`SoftwareBackend`] | CPU reference executor, used by tests and as a fallback |
//!
//! # Binding convention
//!
//! Programs bind their inputs in two groups:
//! - group 0: uniform blocks, in the order they are passed with the command
//! - group 1: storage buffers, by slot number
//!
//! A program declares its storage slots in [`ProgramDesc::storage`]; bindings
//! for undeclared slots are ignored, and a declared slot without a binding
//! skips the command with a warning.
//!
//! # Resource lifetime
//!
//! Creation returns [`Owned`] guards. Buffer writes become visible to every
//! pass of the current frame. Dropped guards are destroyed after the frame
//! executes, never while recorded commands may still reference them.

pub mod gpu;
pub mod handle;
pub mod software;

use std::borrow::Cow;
use std::collections::BTreeMap;

use bitflags::bitflags;
use glam::{Mat4, Vec4};
use smallvec::SmallVec;

pub use gpu::WgpuBackend;
pub use handle::{BufferId, FramebufferId, GpuKey, Owned, ProgramId, ReleaseRequest, Releaser};
pub use software::SoftwareBackend;

/// Pass number. Passes execute in ascending order.
pub type ViewId = u16;

// ─── Capabilities ─────────────────────────────────────────────────────────────

bitflags! {
    /// Optional features reported by a backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CapsFlags: u32 {
        /// Compute shaders with storage buffers.
        const COMPUTE = 1 << 0;
        /// 32-bit index buffers.
        const INDEX32 = 1 << 1;
        /// Fragment-stage access to window-space depth.
        const FRAGMENT_DEPTH = 1 << 2;
        /// Multisampled RGBA16F render targets.
        const RGBA16F_MSAA_TARGET = 1 << 3;
    }
}

/// Graphics API family behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Software,
    Vulkan,
    Metal,
    Direct3D12,
    OpenGl,
    WebGpu,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    pub supported: CapsFlags,
    pub backend: BackendKind,
}

impl Caps {
    #[inline]
    #[must_use]
    pub fn has(&self, flags: CapsFlags) -> bool {
        self.supported.contains(flags)
    }
}

// ─── Programs ─────────────────────────────────────────────────────────────────

/// Storage access granted to a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    #[inline]
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// A storage buffer slot declared by a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageSlot {
    pub slot: u32,
    pub access: Access,
}

impl StorageSlot {
    #[must_use]
    pub const fn read(slot: u32) -> Self {
        Self { slot, access: Access::Read }
    }

    #[must_use]
    pub const fn read_write(slot: u32) -> Self {
        Self {
            slot,
            access: Access::ReadWrite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStage {
    /// A compute program, entry point `main`.
    Compute { shader: &'static str },
    /// A graphics program, entry points `vs_main` / `fs_main`.
    Graphics {
        vertex: &'static str,
        fragment: &'static str,
    },
}

/// Program creation request. Shaders are referenced by logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDesc {
    pub stage: ProgramStage,
    /// Number of uniform blocks bound at group 0.
    pub uniform_blocks: u32,
    pub storage: &'static [StorageSlot],
    /// Compile-time constants substituted into the shader templates.
    pub defines: BTreeMap<String, String>,
}

impl ProgramDesc {
    #[must_use]
    pub fn compute(shader: &'static str, uniform_blocks: u32, storage: &'static [StorageSlot]) -> Self {
        Self {
            stage: ProgramStage::Compute { shader },
            uniform_blocks,
            storage,
            defines: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn graphics(
        vertex: &'static str,
        fragment: &'static str,
        uniform_blocks: u32,
        storage: &'static [StorageSlot],
    ) -> Self {
        Self {
            stage: ProgramStage::Graphics { vertex, fragment },
            uniform_blocks,
            storage,
            defines: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_defines(mut self, defines: BTreeMap<String, String>) -> Self {
        self.defines = defines;
        self
    }

    /// `shader` for compute programs, `vertex+fragment` otherwise.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.stage {
            ProgramStage::Compute { shader } => (*shader).to_string(),
            ProgramStage::Graphics { vertex, fragment } => format!("{vertex}+{fragment}"),
        }
    }

    #[must_use]
    pub fn storage_slot(&self, slot: u32) -> Option<&StorageSlot> {
        self.storage.iter().find(|s| s.slot == slot)
    }
}

// ─── Buffers & Framebuffers ───────────────────────────────────────────────────

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const STORAGE = 1 << 0;
        const VERTEX = 1 << 1;
        const INDEX = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: Cow<'static, str>,
    /// Size in bytes.
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDesc {
    #[must_use]
    pub fn storage(label: impl Into<Cow<'static, str>>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            usage: BufferUsage::STORAGE,
        }
    }
}

/// An HDR (RGBA16F) color target with an optional depth attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub label: Cow<'static, str>,
    pub width: u32,
    pub height: u32,
    pub depth: bool,
}

// ─── Passes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ViewRect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// `(x, y, width, height)` as floats.
    #[must_use]
    pub fn as_vec4(&self) -> Vec4 {
        Vec4::new(self.x as f32, self.y as f32, self.width as f32, self.height as f32)
    }
}

/// Clear performed when a pass begins.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ClearOp {
    #[default]
    None,
    /// Clears color to a packed `0xRRGGBBAA` value and depth to `depth`.
    ColorDepth { rgba: u32, depth: f32 },
}

impl ClearOp {
    /// Unpacks the color as linear `[r, g, b, a]` in `[0, 1]`.
    #[must_use]
    pub fn color(&self) -> Option<[f64; 4]> {
        match *self {
            Self::None => None,
            Self::ColorDepth { rgba, .. } => {
                let channel = |shift: u32| f64::from((rgba >> shift) & 0xff) / 255.0;
                Some([channel(24), channel(16), channel(8), channel(0)])
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub view: Mat4,
    pub proj: Mat4,
}

/// Everything a pass needs before its first command.
///
/// Configuring a pass marks it active for the frame, so a pass that only clears
/// still executes. Configuring the same id twice in a frame replaces the earlier
/// descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PassDescriptor {
    pub id: ViewId,
    pub name: Cow<'static, str>,
    pub rect: ViewRect,
    pub clear: ClearOp,
    /// `None` for compute-only passes.
    pub target: Option<FramebufferId>,
    pub transform: Option<ViewTransform>,
}

impl PassDescriptor {
    #[must_use]
    pub fn new(id: ViewId, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id,
            name: name.into(),
            rect: ViewRect::default(),
            clear: ClearOp::None,
            target: None,
            transform: None,
        }
    }

    #[must_use]
    pub fn with_rect(mut self, rect: ViewRect) -> Self {
        self.rect = rect;
        self
    }

    #[must_use]
    pub fn with_clear(mut self, clear: ClearOp) -> Self {
        self.clear = clear;
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: Option<FramebufferId>) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: ViewTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

/// A buffer bound to a storage slot with the access the caller intends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub slot: u32,
    pub buffer: BufferId,
    pub access: Access,
}

impl Binding {
    #[must_use]
    pub const fn new(slot: u32, buffer: BufferId, access: Access) -> Self {
        Self { slot, buffer, access }
    }
}

pub type Bindings = SmallVec<[Binding; 4]>;

/// Compute dispatch. `uniforms` are the raw bytes of the group 0 blocks.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch<'a> {
    pub program: ProgramId,
    pub bindings: &'a [Binding],
    pub uniforms: &'a [&'a [u8]],
    pub groups: [u32; 3],
}

/// Indexed draw with 32-bit indices.
#[derive(Debug, Clone, Copy)]
pub struct Draw<'a> {
    pub program: ProgramId,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub index_count: u32,
    pub bindings: &'a [Binding],
    pub uniforms: &'a [&'a [u8]],
}

/// Recording interface shared by all backends.
pub trait CommandStream {
    fn caps(&self) -> &Caps;

    /// Returns an invalid guard (and logs a warning) when the program cannot be
    /// built.
    fn create_program(&mut self, desc: &ProgramDesc) -> Owned<ProgramId>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Owned<BufferId>;

    /// Returns an invalid guard when the target cannot be created.
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Owned<FramebufferId>;

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    fn configure_pass(&mut self, pass: PassDescriptor);

    fn dispatch(&mut self, view: ViewId, dispatch: &Dispatch<'_>);

    fn submit(&mut self, view: ViewId, draw: &Draw<'_>);

    /// Executes every active pass in ascending id order, then destroys
    /// released objects. Recorded state does not carry over to the next frame.
    fn frame(&mut self);

    /// Destroys objects whose guards were dropped. Returns how many.
    fn collect_released(&mut self) -> usize;
}
