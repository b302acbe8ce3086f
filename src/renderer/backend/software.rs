//! Software Command Stream
//!
//! A CPU executor for the [`CommandStream`] contract. Compute programs run
//! registered Rust kernels (one call per work group) against CPU-side buffer
//! storage; draws are validated and recorded but not rasterized. After each
//! [`frame`](CommandStream::frame) the executed passes are available through
//! [`SoftwareBackend::last_frame`], which makes the backend the reference for
//! the orchestration tests.
//!
//! Buffer contents are stored as `u32` words, so every element type read or
//! written by a kernel must have a size that is a multiple of 4 bytes.

use std::collections::BTreeMap;

use bytemuck::Pod;
use glam::UVec3;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::{
    BackendKind, Binding, Bindings, BufferDesc, BufferId, BufferUsage, Caps, CapsFlags, ClearOp,
    CommandStream, Dispatch, Draw, FramebufferDesc, FramebufferId, Owned, PassDescriptor, ProgramDesc,
    ProgramId, ProgramStage, ReleaseRequest, Releaser, ViewId, ViewRect, ViewTransform,
};

// ─── Kernels ──────────────────────────────────────────────────────────────────

/// A CPU compute kernel, called once per work group.
pub type KernelFn = fn(&KernelContext<'_>, &mut KernelBuffers);

/// Work group coordinates and uniform blocks of a kernel call.
#[derive(Debug)]
pub struct KernelContext<'a> {
    pub workgroup_id: UVec3,
    pub num_workgroups: UVec3,
    uniforms: &'a [Vec<u8>],
}

impl KernelContext<'_> {
    /// Uniform block `index`, or `None` when missing or too short.
    #[must_use]
    pub fn uniform<T: Pod>(&self, index: usize) -> Option<T> {
        let bytes = self.uniforms.get(index)?;
        let size = std::mem::size_of::<T>();
        (bytes.len() >= size).then(|| bytemuck::pod_read_unaligned(&bytes[..size]))
    }
}

#[derive(Debug)]
struct BoundStorage {
    slot: u32,
    buffer: BufferId,
    writable: bool,
    words: Vec<u32>,
}

/// Storage buffers bound to a kernel call, addressed by slot.
#[derive(Debug, Default)]
pub struct KernelBuffers {
    bound: SmallVec<[BoundStorage; 4]>,
}

fn as_elements<T: Pod>(words: &[u32]) -> &[T] {
    let size = std::mem::size_of::<T>();
    let whole = words.len() * 4 / size * size / 4;
    bytemuck::cast_slice(&words[..whole])
}

fn as_elements_mut<T: Pod>(words: &mut [u32]) -> &mut [T] {
    let size = std::mem::size_of::<T>();
    let whole = words.len() * 4 / size * size / 4;
    bytemuck::cast_slice_mut(&mut words[..whole])
}

impl KernelBuffers {
    #[must_use]
    pub fn read<T: Pod>(&self, slot: u32) -> Option<&[T]> {
        self.bound.iter().find(|b| b.slot == slot).map(|b| as_elements(&b.words))
    }

    /// `None` unless the slot is bound writable.
    pub fn write<T: Pod>(&mut self, slot: u32) -> Option<&mut [T]> {
        self.bound
            .iter_mut()
            .find(|b| b.slot == slot && b.writable)
            .map(|b| as_elements_mut(&mut b.words))
    }

    /// Two distinct writable slots at once.
    pub fn write_pair<A: Pod, B: Pod>(&mut self, a: u32, b: u32) -> Option<(&mut [A], &mut [B])> {
        let mut first = None;
        let mut second = None;
        for bound in self.bound.iter_mut().filter(|s| s.writable) {
            if bound.slot == a && first.is_none() {
                first = Some(as_elements_mut::<A>(&mut bound.words));
            } else if bound.slot == b && second.is_none() {
                second = Some(as_elements_mut::<B>(&mut bound.words));
            }
        }
        Some((first?, second?))
    }
}

// ─── Frame records ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub program: ProgramId,
    pub label: String,
    pub groups: [u32; 3],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub label: String,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub index_count: u32,
    pub bindings: Bindings,
    /// Byte length of each uniform block.
    pub uniform_sizes: SmallVec<[usize; 4]>,
}

/// One executed pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    pub id: ViewId,
    pub name: String,
    pub rect: ViewRect,
    pub clear: ClearOp,
    pub target: Option<FramebufferId>,
    pub transform: Option<ViewTransform>,
    pub dispatches: Vec<DispatchRecord>,
    pub draws: Vec<DrawRecord>,
}

// ─── Backend ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SoftwareProgram {
    desc: ProgramDesc,
    label: String,
    kernel: Option<KernelFn>,
}

#[derive(Debug)]
struct SoftwareBuffer {
    usage: BufferUsage,
    size: u64,
    words: Vec<u32>,
}

#[derive(Debug)]
enum Command {
    Dispatch {
        program: ProgramId,
        bindings: Bindings,
        uniforms: Vec<Vec<u8>>,
        groups: [u32; 3],
    },
    Draw {
        program: ProgramId,
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        index_count: u32,
        bindings: Bindings,
        uniform_sizes: SmallVec<[usize; 4]>,
    },
}

#[derive(Debug, Default)]
struct RecordedPass {
    desc: Option<PassDescriptor>,
    commands: Vec<Command>,
}

/// CPU implementation of [`CommandStream`].
pub struct SoftwareBackend {
    caps: Caps,
    kernels: FxHashMap<&'static str, KernelFn>,
    programs: SlotMap<ProgramId, SoftwareProgram>,
    buffers: SlotMap<BufferId, SoftwareBuffer>,
    framebuffers: SlotMap<FramebufferId, FramebufferDesc>,
    passes: BTreeMap<ViewId, RecordedPass>,
    releaser: Releaser,
    released: flume::Receiver<ReleaseRequest>,
    last_frame: Vec<PassRecord>,
    frame_count: u64,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    /// A backend reporting every capability, with the cluster kernels
    /// registered.
    #[must_use]
    pub fn new() -> Self {
        Self::with_caps(Caps {
            supported: CapsFlags::all(),
            backend: BackendKind::Software,
        })
    }

    #[must_use]
    pub fn with_caps(caps: Caps) -> Self {
        let (releaser, released) = Releaser::channel();
        let mut backend = Self {
            caps,
            kernels: FxHashMap::default(),
            programs: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            passes: BTreeMap::new(),
            releaser,
            released,
            last_frame: Vec::new(),
            frame_count: 0,
        };
        for &(name, kernel) in crate::renderer::cluster::kernels::BUILTIN_KERNELS {
            backend.register_kernel(name, kernel);
        }
        backend
    }

    /// Makes `kernel` the implementation of compute shader `name`.
    pub fn register_kernel(&mut self, name: &'static str, kernel: KernelFn) {
        self.kernels.insert(name, kernel);
    }

    /// Passes executed by the most recent [`frame`](CommandStream::frame).
    #[must_use]
    pub fn last_frame(&self) -> &[PassRecord] {
        &self.last_frame
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Buffer contents as elements of `T`. Empty for unknown buffers.
    #[must_use]
    pub fn read_buffer<T: Pod>(&self, buffer: BufferId) -> Vec<T> {
        self.buffers
            .get(buffer)
            .map(|b| as_elements::<T>(&b.words).to_vec())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn program_label(&self, program: ProgramId) -> Option<&str> {
        self.programs.get(program).map(|p| p.label.as_str())
    }

    #[must_use]
    pub fn framebuffer(&self, framebuffer: FramebufferId) -> Option<&FramebufferDesc> {
        self.framebuffers.get(framebuffer)
    }

    /// Number of live `(programs, buffers, framebuffers)`.
    #[must_use]
    pub fn live_objects(&self) -> (usize, usize, usize) {
        (self.programs.len(), self.buffers.len(), self.framebuffers.len())
    }

    fn pass_mut(&mut self, view: ViewId) -> &mut RecordedPass {
        self.passes.entry(view).or_default()
    }

    /// Checks the program's declared slots against `bindings`.
    fn bindings_complete(&self, program: &SoftwareProgram, bindings: &[Binding]) -> bool {
        for slot in program.desc.storage {
            let Some(binding) = bindings.iter().find(|b| b.slot == slot.slot) else {
                warn!("{}: storage slot {} is not bound, command skipped", program.label, slot.slot);
                return false;
            };
            if !self.buffers.contains_key(binding.buffer) {
                warn!("{}: slot {} is bound to a dead buffer, command skipped", program.label, slot.slot);
                return false;
            }
            if slot.access.is_write() && !binding.access.is_write() {
                warn!(
                    "{}: slot {} needs write access but is bound read-only, command skipped",
                    program.label, slot.slot
                );
                return false;
            }
        }
        true
    }

    fn run_dispatch(
        &mut self,
        program_id: ProgramId,
        bindings: &[Binding],
        uniforms: &[Vec<u8>],
        groups: [u32; 3],
    ) -> Option<DispatchRecord> {
        let Some(program) = self.programs.get(program_id) else {
            warn!("Dispatch with an invalid program skipped");
            return None;
        };
        let Some(kernel) = program.kernel else {
            warn!("{} is not a compute program, dispatch skipped", program.label);
            return None;
        };
        if !self.bindings_complete(program, bindings) {
            return None;
        }
        let label = program.label.clone();

        let mut buffers = KernelBuffers::default();
        for slot in program.desc.storage {
            let Some(binding) = bindings.iter().find(|b| b.slot == slot.slot) else {
                continue;
            };
            if buffers.bound.iter().any(|b| b.buffer == binding.buffer) {
                warn!("{label}: buffer bound to more than one slot, slot {} left empty", slot.slot);
                continue;
            }
            let Some(storage) = self.buffers.get_mut(binding.buffer) else {
                continue;
            };
            buffers.bound.push(BoundStorage {
                slot: slot.slot,
                buffer: binding.buffer,
                writable: slot.access.is_write(),
                words: std::mem::take(&mut storage.words),
            });
        }

        let num_workgroups = UVec3::from_array(groups);
        for z in 0..groups[2] {
            for y in 0..groups[1] {
                for x in 0..groups[0] {
                    let ctx = KernelContext {
                        workgroup_id: UVec3::new(x, y, z),
                        num_workgroups,
                        uniforms,
                    };
                    kernel(&ctx, &mut buffers);
                }
            }
        }

        for bound in buffers.bound {
            if let Some(storage) = self.buffers.get_mut(bound.buffer) {
                storage.words = bound.words;
            }
        }

        Some(DispatchRecord {
            program: program_id,
            label,
            groups,
        })
    }

    fn run_draw(&self, command: &Command) -> Option<DrawRecord> {
        let Command::Draw {
            program: program_id,
            vertex_buffer,
            index_buffer,
            index_count,
            bindings,
            uniform_sizes,
        } = command
        else {
            return None;
        };
        let Some(program) = self.programs.get(*program_id) else {
            warn!("Draw with an invalid program skipped");
            return None;
        };
        if !matches!(program.desc.stage, ProgramStage::Graphics { .. }) {
            warn!("{} is not a graphics program, draw skipped", program.label);
            return None;
        }
        if !self.buffers.contains_key(*vertex_buffer) || !self.buffers.contains_key(*index_buffer) {
            warn!("{}: draw with dead geometry skipped", program.label);
            return None;
        }
        if !self.bindings_complete(program, bindings) {
            return None;
        }
        Some(DrawRecord {
            program: *program_id,
            label: program.label.clone(),
            vertex_buffer: *vertex_buffer,
            index_buffer: *index_buffer,
            index_count: *index_count,
            bindings: bindings.clone(),
            uniform_sizes: uniform_sizes.clone(),
        })
    }

    fn destroy(&mut self, request: ReleaseRequest) -> bool {
        match request {
            ReleaseRequest::Program(id) => self.programs.remove(id).is_some(),
            ReleaseRequest::Buffer(id) => self.buffers.remove(id).is_some(),
            ReleaseRequest::Framebuffer(id) => self.framebuffers.remove(id).is_some(),
        }
    }
}

impl CommandStream for SoftwareBackend {
    fn caps(&self) -> &Caps {
        &self.caps
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Owned<ProgramId> {
        let label = desc.label();
        let kernel = match &desc.stage {
            ProgramStage::Compute { shader } => {
                let Some(kernel) = self.kernels.get(shader).copied() else {
                    warn!("No software kernel registered for compute shader `{shader}`");
                    return Owned::invalid();
                };
                Some(kernel)
            }
            ProgramStage::Graphics { .. } => None,
        };
        debug!("Software program created: {label}");
        let id = self.programs.insert(SoftwareProgram {
            desc: desc.clone(),
            label,
            kernel,
        });
        self.releaser.own(id)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Owned<BufferId> {
        let words = vec![0u32; desc.size.div_ceil(4) as usize];
        let id = self.buffers.insert(SoftwareBuffer {
            usage: desc.usage,
            size: desc.size,
            words,
        });
        self.releaser.own(id)
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Owned<FramebufferId> {
        if desc.width == 0 || desc.height == 0 {
            warn!("Framebuffer `{}` has an empty extent {}x{}", desc.label, desc.width, desc.height);
            return Owned::invalid();
        }
        let id = self.framebuffers.insert(desc.clone());
        self.releaser.own(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let Some(storage) = self.buffers.get_mut(buffer) else {
            warn!("write_buffer on a dead buffer ignored");
            return;
        };
        let end = offset + data.len() as u64;
        if offset % 4 != 0 || data.len() % 4 != 0 || end > storage.size {
            warn!(
                "write_buffer out of range or unaligned ({offset}..{end} of {} bytes, usage {:?})",
                storage.size, storage.usage
            );
            return;
        }
        let first = (offset / 4) as usize;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut storage.words[first..first + data.len() / 4]);
        bytes.copy_from_slice(data);
    }

    fn configure_pass(&mut self, pass: PassDescriptor) {
        let id = pass.id;
        self.pass_mut(id).desc = Some(pass);
    }

    fn dispatch(&mut self, view: ViewId, dispatch: &Dispatch<'_>) {
        let command = Command::Dispatch {
            program: dispatch.program,
            bindings: Bindings::from_slice(dispatch.bindings),
            uniforms: dispatch.uniforms.iter().map(|u| u.to_vec()).collect(),
            groups: dispatch.groups,
        };
        self.pass_mut(view).commands.push(command);
    }

    fn submit(&mut self, view: ViewId, draw: &Draw<'_>) {
        let command = Command::Draw {
            program: draw.program,
            vertex_buffer: draw.vertex_buffer,
            index_buffer: draw.index_buffer,
            index_count: draw.index_count,
            bindings: Bindings::from_slice(draw.bindings),
            uniform_sizes: draw.uniforms.iter().map(|u| u.len()).collect(),
        };
        self.pass_mut(view).commands.push(command);
    }

    fn frame(&mut self) {
        let passes = std::mem::take(&mut self.passes);
        let mut records = Vec::with_capacity(passes.len());

        for (id, pass) in passes {
            let desc = pass.desc.unwrap_or_else(|| PassDescriptor::new(id, format!("view {id}")));
            let mut record = PassRecord {
                id,
                name: desc.name.into_owned(),
                rect: desc.rect,
                clear: desc.clear,
                target: desc.target,
                transform: desc.transform,
                dispatches: Vec::new(),
                draws: Vec::new(),
            };
            for command in pass.commands {
                match command {
                    Command::Dispatch {
                        program,
                        bindings,
                        uniforms,
                        groups,
                    } => {
                        if let Some(dispatch) = self.run_dispatch(program, &bindings, &uniforms, groups) {
                            record.dispatches.push(dispatch);
                        }
                    }
                    draw @ Command::Draw { .. } => {
                        if record.target.is_none() {
                            warn!("Pass `{}` has no render target, draw skipped", record.name);
                            continue;
                        }
                        if let Some(draw) = self.run_draw(&draw) {
                            record.draws.push(draw);
                        }
                    }
                }
            }
            records.push(record);
        }

        self.last_frame = records;
        self.frame_count += 1;
        self.collect_released();
    }

    fn collect_released(&mut self) -> usize {
        let requests: Vec<_> = self.released.try_iter().collect();
        requests.into_iter().filter(|&r| self.destroy(r)).count()
    }
}
