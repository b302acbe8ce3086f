//! wgpu Command Stream
//!
//! Records passes like every [`CommandStream`] and encodes them into a single
//! command buffer at [`frame`](CommandStream::frame):
//!
//! - Compute commands of a pass run in one compute pass.
//! - A pass with a render target becomes one render pass that applies the
//!   pass clear, then executes its draws.
//! - Buffer writes go through `Queue::write_buffer`, so they land before the
//!   frame's command buffer executes.
//!
//! Uniform blocks are copied into per-command uniform buffers; storage slots
//! map to bindings of group 1 (see the [module docs](super)).

pub mod shader_manager;

use std::collections::BTreeMap;

use log::{debug, info, warn};
use slotmap::SlotMap;
use wgpu::util::DeviceExt;

use super::{
    Access, BackendKind, Binding, Bindings, BufferDesc, BufferId, BufferUsage, Caps, CapsFlags,
    CommandStream, Dispatch, Draw, FramebufferDesc, FramebufferId, Owned, PassDescriptor, ProgramDesc,
    ProgramId, ProgramStage, ReleaseRequest, Releaser, ViewId,
};
use crate::errors::{ClusterError, Result};
use crate::scene::Vertex;
use shader_manager::ShaderManager;

pub const HDR_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Queries the capabilities the renderers check in `supported`.
#[must_use]
pub fn caps_from_adapter(adapter: &wgpu::Adapter) -> Caps {
    let downlevel = adapter.get_downlevel_capabilities();
    let mut supported = CapsFlags::FRAGMENT_DEPTH;
    if downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
        supported |= CapsFlags::COMPUTE;
    }
    if downlevel.flags.contains(wgpu::DownlevelFlags::FULL_DRAW_INDEX_UINT32) {
        supported |= CapsFlags::INDEX32;
    }
    let hdr = adapter.get_texture_format_features(HDR_TEXTURE_FORMAT);
    if hdr.allowed_usages.contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        && hdr.flags.contains(wgpu::TextureFormatFeatureFlags::MULTISAMPLE_X4)
    {
        supported |= CapsFlags::RGBA16F_MSAA_TARGET;
    }
    let backend = match adapter.get_info().backend {
        wgpu::Backend::Vulkan => BackendKind::Vulkan,
        wgpu::Backend::Metal => BackendKind::Metal,
        wgpu::Backend::Dx12 => BackendKind::Direct3D12,
        wgpu::Backend::Gl => BackendKind::OpenGl,
        wgpu::Backend::BrowserWebGpu => BackendKind::WebGpu,
        _ => BackendKind::Other,
    };
    Caps { supported, backend }
}

enum GpuPipeline {
    Compute(wgpu::ComputePipeline),
    Graphics(wgpu::RenderPipeline),
}

struct GpuProgram {
    label: String,
    pipeline: GpuPipeline,
    uniform_layout: wgpu::BindGroupLayout,
    storage_layout: wgpu::BindGroupLayout,
    desc: ProgramDesc,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

struct GpuFramebuffer {
    color_view: wgpu::TextureView,
    depth_view: Option<wgpu::TextureView>,
    _color: wgpu::Texture,
    _depth: Option<wgpu::Texture>,
}

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
        uniforms: Vec<Vec<u8>>,
    },
}

#[derive(Default)]
struct RecordedPass {
    desc: Option<PassDescriptor>,
    commands: Vec<Command>,
}

/// Bind groups (and the uniform buffers they reference) of one command.
struct PreparedCommand {
    program: ProgramId,
    uniform_group: wgpu::BindGroup,
    storage_group: wgpu::BindGroup,
    kind: PreparedKind,
}

enum PreparedKind {
    Dispatch([u32; 3]),
    Draw {
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        index_count: u32,
    },
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: Caps,
    shaders: ShaderManager,
    programs: SlotMap<ProgramId, GpuProgram>,
    buffers: SlotMap<BufferId, GpuBuffer>,
    framebuffers: SlotMap<FramebufferId, GpuFramebuffer>,
    passes: BTreeMap<ViewId, RecordedPass>,
    releaser: Releaser,
    released: flume::Receiver<ReleaseRequest>,
}

impl WgpuBackend {
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, caps: Caps) -> Self {
        let (releaser, released) = Releaser::channel();
        Self {
            device,
            queue,
            caps,
            shaders: ShaderManager::new(),
            programs: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            passes: BTreeMap::new(),
            releaser,
            released,
        }
    }

    /// Creates a device without a surface; frames render into offscreen
    /// framebuffers only.
    pub async fn new_headless(power_preference: wgpu::PowerPreference) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ClusterError::AdapterRequestFailed(e.to_string()))?;

        let info = adapter.get_info();
        info!("Using adapter {} ({:?})", info.name, info.backend);
        let caps = caps_from_adapter(&adapter);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Clustered Forward Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        Ok(Self::new(device, queue, caps))
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Color view of a framebuffer, for presenting or reading back.
    #[must_use]
    pub fn framebuffer_view(&self, framebuffer: FramebufferId) -> Option<&wgpu::TextureView> {
        self.framebuffers.get(framebuffer).map(|f| &f.color_view)
    }

    fn build_program(&mut self, desc: &ProgramDesc) -> Result<GpuProgram> {
        let label = desc.label();
        let stages = match desc.stage {
            ProgramStage::Compute { .. } => wgpu::ShaderStages::COMPUTE,
            ProgramStage::Graphics { .. } => wgpu::ShaderStages::VERTEX_FRAGMENT,
        };
        let storage_stages = match desc.stage {
            ProgramStage::Compute { .. } => wgpu::ShaderStages::COMPUTE,
            ProgramStage::Graphics { .. } => wgpu::ShaderStages::FRAGMENT,
        };

        let uniform_entries: Vec<_> = (0..desc.uniform_blocks)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: stages,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let storage_entries: Vec<_> = desc
            .storage
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.slot,
                visibility: storage_stages,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: !slot.access.is_write(),
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let uniform_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label} uniforms")),
            entries: &uniform_entries,
        });
        let storage_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label} storage")),
            entries: &storage_entries,
        });
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[Some(&uniform_layout), Some(&storage_layout)],
            immediate_size: 0,
        });

        let pipeline = match desc.stage {
            ProgramStage::Compute { shader } => {
                let hash = self.shaders.get_or_compile(&self.device, shader, &desc.defines)?;
                let module = self.shaders.module(hash);
                GpuPipeline::Compute(self.device.create_compute_pipeline(
                    &wgpu::ComputePipelineDescriptor {
                        label: Some(&label),
                        layout: Some(&layout),
                        module: module.ok_or_else(|| missing_module(shader))?,
                        entry_point: Some("main"),
                        compilation_options: Default::default(),
                        cache: None,
                    },
                ))
            }
            ProgramStage::Graphics { vertex, fragment } => {
                let vs_hash = self.shaders.get_or_compile(&self.device, vertex, &desc.defines)?;
                let fs_hash = self.shaders.get_or_compile(&self.device, fragment, &desc.defines)?;
                let vs_module = self.shaders.module(vs_hash).ok_or_else(|| missing_module(vertex))?;
                let fs_module = self.shaders.module(fs_hash).ok_or_else(|| missing_module(fragment))?;

                let attributes = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
                GpuPipeline::Graphics(self.device.create_render_pipeline(
                    &wgpu::RenderPipelineDescriptor {
                        label: Some(&label),
                        layout: Some(&layout),
                        vertex: wgpu::VertexState {
                            module: vs_module,
                            entry_point: Some("vs_main"),
                            buffers: &[wgpu::VertexBufferLayout {
                                array_stride: Vertex::STRIDE,
                                step_mode: wgpu::VertexStepMode::Vertex,
                                attributes: &attributes,
                            }],
                            compilation_options: Default::default(),
                        },
                        fragment: Some(wgpu::FragmentState {
                            module: fs_module,
                            entry_point: Some("fs_main"),
                            targets: &[Some(wgpu::ColorTargetState {
                                format: HDR_TEXTURE_FORMAT,
                                blend: None,
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                            compilation_options: Default::default(),
                        }),
                        primitive: surface_primitive_state(),
                        depth_stencil: Some(wgpu::DepthStencilState {
                            format: DEPTH_FORMAT,
                            depth_write_enabled: Some(true),
                            depth_compare: Some(wgpu::CompareFunction::Less),
                            stencil: wgpu::StencilState::default(),
                            bias: wgpu::DepthBiasState::default(),
                        }),
                        multisample: wgpu::MultisampleState::default(),
                        multiview_mask: None,
                        cache: None,
                    },
                ))
            }
        };

        Ok(GpuProgram {
            label,
            pipeline,
            uniform_layout,
            storage_layout,
            desc: desc.clone(),
        })
    }

    /// Creates the bind groups of one command, or `None` when a declared slot
    /// is unbound or bound with insufficient access.
    fn prepare(&self, program_id: ProgramId, bindings: &[Binding], uniforms: &[Vec<u8>]) -> Option<(wgpu::BindGroup, wgpu::BindGroup)> {
        let Some(program) = self.programs.get(program_id) else {
            warn!("Command with an invalid program skipped");
            return None;
        };
        if uniforms.len() < program.desc.uniform_blocks as usize {
            warn!(
                "{}: {} uniform blocks expected, {} given; command skipped",
                program.label,
                program.desc.uniform_blocks,
                uniforms.len()
            );
            return None;
        }

        let uniform_buffers: Vec<wgpu::Buffer> = uniforms
            .iter()
            .take(program.desc.uniform_blocks as usize)
            .map(|bytes| {
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("command uniforms"),
                    contents: bytes,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            })
            .collect();
        let uniform_entries: Vec<_> = uniform_buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let mut storage_entries = Vec::with_capacity(program.desc.storage.len());
        for slot in program.desc.storage {
            let Some(binding) = bindings.iter().find(|b| b.slot == slot.slot) else {
                warn!("{}: storage slot {} is not bound, command skipped", program.label, slot.slot);
                return None;
            };
            if slot.access.is_write() && binding.access == Access::Read {
                warn!("{}: slot {} is bound read-only, command skipped", program.label, slot.slot);
                return None;
            }
            let Some(buffer) = self.buffers.get(binding.buffer) else {
                warn!("{}: slot {} is bound to a dead buffer, command skipped", program.label, slot.slot);
                return None;
            };
            storage_entries.push(wgpu::BindGroupEntry {
                binding: slot.slot,
                resource: buffer.buffer.as_entire_binding(),
            });
        }

        let uniform_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} uniforms", program.label)),
            layout: &program.uniform_layout,
            entries: &uniform_entries,
        });
        let storage_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} storage", program.label)),
            layout: &program.storage_layout,
            entries: &storage_entries,
        });
        Some((uniform_group, storage_group))
    }

    fn prepare_pass(&self, pass: &RecordedPass) -> Vec<PreparedCommand> {
        pass.commands
            .iter()
            .filter_map(|command| match command {
                Command::Dispatch {
                    program,
                    bindings,
                    uniforms,
                    groups,
                } => {
                    let (uniform_group, storage_group) = self.prepare(*program, bindings, uniforms)?;
                    Some(PreparedCommand {
                        program: *program,
                        uniform_group,
                        storage_group,
                        kind: PreparedKind::Dispatch(*groups),
                    })
                }
                Command::Draw {
                    program,
                    vertex_buffer,
                    index_buffer,
                    index_count,
                    bindings,
                    uniforms,
                } => {
                    let (uniform_group, storage_group) = self.prepare(*program, bindings, uniforms)?;
                    Some(PreparedCommand {
                        program: *program,
                        uniform_group,
                        storage_group,
                        kind: PreparedKind::Draw {
                            vertex_buffer: *vertex_buffer,
                            index_buffer: *index_buffer,
                            index_count: *index_count,
                        },
                    })
                }
            })
            .collect()
    }

    fn encode_pass(&self, encoder: &mut wgpu::CommandEncoder, id: ViewId, pass: &RecordedPass) {
        let desc = pass
            .desc
            .clone()
            .unwrap_or_else(|| PassDescriptor::new(id, format!("view {id}")));
        let prepared = self.prepare_pass(pass);

        let dispatches: Vec<_> = prepared
            .iter()
            .filter(|c| matches!(c.kind, PreparedKind::Dispatch(_)))
            .collect();
        if !dispatches.is_empty() {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&desc.name),
                timestamp_writes: None,
            });
            for command in dispatches {
                let (Some(program), PreparedKind::Dispatch(groups)) = (self.programs.get(command.program), &command.kind)
                else {
                    continue;
                };
                let GpuPipeline::Compute(pipeline) = &program.pipeline else {
                    warn!("{} is not a compute program, dispatch skipped", program.label);
                    continue;
                };
                cpass.set_pipeline(pipeline);
                cpass.set_bind_group(0, &command.uniform_group, &[]);
                cpass.set_bind_group(1, &command.storage_group, &[]);
                cpass.dispatch_workgroups(groups[0], groups[1], groups[2]);
            }
        }

        let Some(target) = desc.target else {
            if prepared.iter().any(|c| matches!(c.kind, PreparedKind::Draw { .. })) {
                warn!("Pass `{}` has no render target, draws skipped", desc.name);
            }
            return;
        };
        let Some(framebuffer) = self.framebuffers.get(target) else {
            warn!("Pass `{}` targets a dead framebuffer", desc.name);
            return;
        };

        let load = desc.clear.color().map_or(wgpu::LoadOp::Load, |[r, g, b, a]| {
            wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })
        });
        let depth_load = match desc.clear {
            super::ClearOp::ColorDepth { depth, .. } => wgpu::LoadOp::Clear(depth),
            super::ClearOp::None => wgpu::LoadOp::Load,
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&desc.name),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &framebuffer.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: framebuffer.depth_view.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            ..Default::default()
        });
        if desc.rect.width > 0 && desc.rect.height > 0 {
            rpass.set_viewport(
                desc.rect.x as f32,
                desc.rect.y as f32,
                desc.rect.width as f32,
                desc.rect.height as f32,
                0.0,
                1.0,
            );
        }

        for command in &prepared {
            let PreparedKind::Draw {
                vertex_buffer,
                index_buffer,
                index_count,
            } = command.kind
            else {
                continue;
            };
            let Some(program) = self.programs.get(command.program) else {
                continue;
            };
            let GpuPipeline::Graphics(pipeline) = &program.pipeline else {
                warn!("{} is not a graphics program, draw skipped", program.label);
                continue;
            };
            let (Some(vertices), Some(indices)) = (self.buffers.get(vertex_buffer), self.buffers.get(index_buffer))
            else {
                warn!("{}: draw with dead geometry skipped", program.label);
                continue;
            };
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &command.uniform_group, &[]);
            rpass.set_bind_group(1, &command.storage_group, &[]);
            rpass.set_vertex_buffer(0, vertices.buffer.slice(..));
            rpass.set_index_buffer(indices.buffer.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..index_count, 0, 0..1);
        }
    }

    fn destroy(&mut self, request: ReleaseRequest) -> bool {
        match request {
            ReleaseRequest::Program(id) => self.programs.remove(id).is_some(),
            ReleaseRequest::Buffer(id) => self.buffers.remove(id).is_some_and(|b| {
                b.buffer.destroy();
                true
            }),
            ReleaseRequest::Framebuffer(id) => self.framebuffers.remove(id).is_some(),
        }
    }
}

/// Both faces of every triangle are rasterized.
fn surface_primitive_state() -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        cull_mode: None,
        ..Default::default()
    }
}

fn missing_module(name: &str) -> ClusterError {
    ClusterError::ShaderTemplate(minijinja::Error::new(
        minijinja::ErrorKind::TemplateNotFound,
        format!("shader module `{name}` missing from cache"),
    ))
}

impl CommandStream for WgpuBackend {
    fn caps(&self) -> &Caps {
        &self.caps
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Owned<ProgramId> {
        match self.build_program(desc) {
            Ok(program) => {
                debug!("Program created: {}", program.label);
                let id = self.programs.insert(program);
                self.releaser.own(id)
            }
            Err(e) => {
                warn!("Failed to create program {}: {e}", desc.label());
                Owned::invalid()
            }
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Owned<BufferId> {
        let mut usage = wgpu::BufferUsages::COPY_DST;
        if desc.usage.contains(BufferUsage::STORAGE) {
            usage |= wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
        }
        if desc.usage.contains(BufferUsage::VERTEX) {
            usage |= wgpu::BufferUsages::VERTEX;
        }
        if desc.usage.contains(BufferUsage::INDEX) {
            usage |= wgpu::BufferUsages::INDEX;
        }
        let size = desc.size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size,
            usage,
            mapped_at_creation: false,
        });
        let id = self.buffers.insert(GpuBuffer { buffer, size });
        self.releaser.own(id)
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Owned<FramebufferId> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > limit || desc.height > limit {
            warn!(
                "Framebuffer `{}` extent {}x{} outside 1..={limit}",
                desc.label, desc.width, desc.height
            );
            return Owned::invalid();
        }
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = |label: String, format: wgpu::TextureFormat| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        };
        let color = texture(format!("{} color", desc.label), HDR_TEXTURE_FORMAT);
        let depth = desc.depth.then(|| texture(format!("{} depth", desc.label), DEPTH_FORMAT));
        let framebuffer = GpuFramebuffer {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth
                .as_ref()
                .map(|d| d.create_view(&wgpu::TextureViewDescriptor::default())),
            _color: color,
            _depth: depth,
        };
        let id = self.framebuffers.insert(framebuffer);
        self.releaser.own(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let Some(target) = self.buffers.get(buffer) else {
            warn!("write_buffer on a dead buffer ignored");
            return;
        };
        let end = offset + data.len() as u64;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0
            || data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0
            || end > target.size
        {
            warn!("write_buffer out of range or unaligned ({offset}..{end} of {} bytes)", target.size);
            return;
        }
        self.queue.write_buffer(&target.buffer, offset, data);
    }

    fn configure_pass(&mut self, pass: PassDescriptor) {
        let id = pass.id;
        self.passes.entry(id).or_default().desc = Some(pass);
    }

    fn dispatch(&mut self, view: ViewId, dispatch: &Dispatch<'_>) {
        self.passes.entry(view).or_default().commands.push(Command::Dispatch {
            program: dispatch.program,
            bindings: Bindings::from_slice(dispatch.bindings),
            uniforms: dispatch.uniforms.iter().map(|u| u.to_vec()).collect(),
            groups: dispatch.groups,
        });
    }

    fn submit(&mut self, view: ViewId, draw: &Draw<'_>) {
        self.passes.entry(view).or_default().commands.push(Command::Draw {
            program: draw.program,
            vertex_buffer: draw.vertex_buffer,
            index_buffer: draw.index_buffer,
            index_count: draw.index_count,
            bindings: Bindings::from_slice(draw.bindings),
            uniforms: draw.uniforms.iter().map(|u| u.to_vec()).collect(),
        });
    }

    fn frame(&mut self) {
        let passes = std::mem::take(&mut self.passes);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clustered Frame Encoder"),
        });
        for (id, pass) in &passes {
            self.encode_pass(&mut encoder, *id, pass);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.collect_released();
    }

    fn collect_released(&mut self) -> usize {
        let requests: Vec<_> = self.released.try_iter().collect();
        requests.into_iter().filter(|&r| self.destroy(r)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaces_are_not_face_culled() {
        let state = surface_primitive_state();
        assert_eq!(state.cull_mode, None);
        assert_eq!(state.topology, wgpu::PrimitiveTopology::TriangleList);
    }
}
