//! Shared cube geometry, per-draw constants and the opaque cube pipeline.
//!
//! Every draw of a frame gets its own slot in one uniform buffer and is
//! selected with a dynamic offset, so all of an eye's draws can be recorded
//! into a single pass and flushed with one queue write.

use crate::renderer::CubeConstants;
use glam::Vec3;
use wgpu::util::DeviceExt;

pub const CUBE_INDEX_COUNT: u32 = 36;

/// Slots allocated up front; the buffer grows if a frame needs more.
const INITIAL_SLOTS: u64 = 8;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CubeVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// The cube spanning `[-1, 1]` on each axis: four vertices per face so each
/// face carries its own normal, two counter-clockwise triangles per face.
pub fn cube_geometry() -> (Vec<CubeVertex>, Vec<u16>) {
    // (normal, u, v) with u x v = normal.
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(CUBE_INDEX_COUNT as usize);
    for (normal, u, v) in faces {
        let base = vertices.len() as u16;
        for (s, t) in corners {
            vertices.push(CubeVertex {
                position: (normal + s * u + t * v).to_array(),
                normal: normal.to_array(),
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Lays `draws` out one per `stride` bytes, ready for a single buffer write.
pub fn pack_slots(draws: &[CubeConstants], stride: u64) -> Vec<u8> {
    let stride = stride as usize;
    let mut bytes = vec![0u8; stride * draws.len()];
    for (slot, constants) in bytes.chunks_exact_mut(stride).zip(draws) {
        let src = bytemuck::bytes_of(constants);
        slot[..src.len()].copy_from_slice(src);
    }
    bytes
}

pub struct CubePipeline {
    pipeline:       wgpu::RenderPipeline,
    layout:         wgpu::BindGroupLayout,
    vertex_buffer:  wgpu::Buffer,
    index_buffer:   wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    bind_group:     wgpu::BindGroup,
    stride:         u64,
    slots:          u64,
}

impl CubePipeline {
    pub fn new(
        device:    &wgpu::Device,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
    ) -> Self {
        let constants_size = std::mem::size_of::<CubeConstants>() as u64;
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = wgpu::util::align_to(constants_size, alignment);

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label:   Some("Cube Constants Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding:    0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty:                 wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size:   wgpu::BufferSize::new(constants_size),
                },
                count: None,
            }],
        });

        let (vertices, indices) = cube_geometry();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label:    Some("Cube VB"),
            contents: bytemuck::cast_slice(&vertices),
            usage:    wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label:    Some("Cube IB"),
            contents: bytemuck::cast_slice(&indices),
            usage:    wgpu::BufferUsages::INDEX,
        });

        let (uniform_buffer, bind_group) =
            Self::create_slots(device, &layout, stride, INITIAL_SLOTS);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label:  Some("shaders/cube.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/cube.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label:                Some("Cube Pipeline Layout"),
            bind_group_layouts:   &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label:  Some("Cube Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module:      &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<CubeVertex>() as u64,
                    step_mode:    wgpu::VertexStepMode::Vertex,
                    attributes:   &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module:      &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format:     color_fmt,
                    blend:      None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            // A Z-mirrored axis convention reverses winding, so no culling.
            primitive: wgpu::PrimitiveState {
                topology:  wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format:              depth_fmt,
                depth_write_enabled: true,
                depth_compare:       wgpu::CompareFunction::LessEqual,
                stencil:             wgpu::StencilState::default(),
                bias:                wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview:   None,
        });

        Self {
            pipeline,
            layout,
            vertex_buffer,
            index_buffer,
            uniform_buffer,
            bind_group,
            stride,
            slots: INITIAL_SLOTS,
        }
    }

    fn create_slots(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        slots:  u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label:              Some("Cube Constants UBO"),
            size:               stride * slots,
            usage:              wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label:   Some("Cube Constants Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding:  0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size:   wgpu::BufferSize::new(std::mem::size_of::<CubeConstants>() as u64),
                }),
            }],
        });
        (uniform_buffer, bind_group)
    }

    /// Writes one slot per draw, growing the buffer when needed.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, draws: &[CubeConstants]) {
        let needed = draws.len() as u64;
        if needed > self.slots {
            let slots = needed.next_power_of_two();
            log::debug!("Growing cube constant buffer to {} slots", slots);
            let (buffer, bind_group) = Self::create_slots(device, &self.layout, self.stride, slots);
            self.uniform_buffer = buffer;
            self.bind_group = bind_group;
            self.slots = slots;
        }
        if !draws.is_empty() {
            queue.write_buffer(&self.uniform_buffer, 0, &pack_slots(draws, self.stride));
        }
    }

    /// Records `count` cube draws reading slots `0..count`.
    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, count: usize) {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        rpass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        for slot in 0..count as u64 {
            let offset = (slot * self.stride) as wgpu::DynamicOffset;
            rpass.set_bind_group(0, &self.bind_group, &[offset]);
            rpass.draw_indexed(0..CUBE_INDEX_COUNT, 0, 0..1);
        }
    }
}
