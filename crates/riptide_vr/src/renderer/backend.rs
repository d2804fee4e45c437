//! [`RenderBackend`] on wgpu.
//!
//! Draws issued between `begin_eye` and `end_eye` are collected on the CPU;
//! `end_eye` uploads their constants in one write, records a single pass
//! (clear, then one indexed draw per cube) and submits it.

use super::{
    context::GfxContext,
    pipelines::{cube::CubePipeline, mirror::MirrorPipeline},
    targets::{EyeTargets, EYE_COLOR_FORMAT, EYE_DEPTH_FORMAT},
    CubeConstants, RenderBackend,
};
use crate::{
    error::BackendError,
    eye::Eye,
    runtime::{ColorSpace, CompositorTexture, NativeTextureHandle, RenderSize, TextureApi},
};
use std::sync::Arc;
use winit::window::Window;

/// OpenVR reads Vulkan images, so the device must be a Vulkan one.
#[cfg(feature = "openvr")]
const BACKENDS: wgpu::Backends = wgpu::Backends::VULKAN;
#[cfg(not(feature = "openvr"))]
const BACKENDS: wgpu::Backends = wgpu::Backends::PRIMARY;

/// An eye pass between `begin_eye` and `end_eye`.
#[derive(Debug)]
struct OpenPass {
    eye: Eye,
    clear: [f32; 4],
    draws: Vec<CubeConstants>,
}

/// Enforces the begin/draw/end protocol independently of the GPU.
#[derive(Debug, Default)]
struct PassState {
    open: Option<OpenPass>,
}

impl PassState {
    fn begin(&mut self, eye: Eye, clear: [f32; 4]) -> Result<(), BackendError> {
        if let Some(open) = &self.open {
            return Err(BackendError::EyeAlreadyOpen(open.eye));
        }
        self.open = Some(OpenPass {
            eye,
            clear,
            draws: Vec::with_capacity(2),
        });
        Ok(())
    }

    fn push(&mut self, constants: CubeConstants) -> Result<(), BackendError> {
        let open = self.open.as_mut().ok_or(BackendError::NoActiveEye)?;
        open.draws.push(constants);
        Ok(())
    }

    fn finish(&mut self) -> Result<OpenPass, BackendError> {
        self.open.take().ok_or(BackendError::NoActiveEye)
    }

    fn abandon(&mut self) {
        self.open = None;
    }
}

pub struct WgpuBackend {
    gfx: GfxContext,
    mirror: MirrorPipeline,
    targets: Option<EyeTargets>,
    mirror_binds: Option<[wgpu::BindGroup; 2]>,
    cube: Option<CubePipeline>,
    pass: PassState,
}

impl WgpuBackend {
    pub async fn new(window: Arc<Window>) -> Result<Self, BackendError> {
        let gfx = GfxContext::new(window, BACKENDS).await?;
        let mirror = MirrorPipeline::new(&gfx.device, gfx.config.format);
        Ok(Self {
            gfx,
            mirror,
            targets: None,
            mirror_binds: None,
            cube: None,
            pass: PassState::default(),
        })
    }

    pub fn gfx(&self) -> &GfxContext {
        &self.gfx
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        self.gfx.resize(new_size);
    }

    /// Blits `eye`'s latest image to the window. Does nothing before the eye
    /// targets exist.
    pub fn present_mirror(&mut self, eye: Eye) -> Result<(), wgpu::SurfaceError> {
        let Some(binds) = &self.mirror_binds else {
            return Ok(());
        };

        let frame = self.gfx.surface.get_current_texture()?;
        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mirror Encoder"),
            });
        self.mirror
            .draw(&mut encoder, &swap_view, &binds[eye.index()]);
        self.gfx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    #[cfg(not(feature = "openvr"))]
    fn export(&self, eye: Eye, targets: &EyeTargets) -> Result<CompositorTexture, BackendError> {
        Ok(CompositorTexture {
            handle: NativeTextureHandle::InProcess {
                eye,
                size: targets.size,
            },
            api: TextureApi::InProcess,
            color_space: ColorSpace::Gamma,
        })
    }

    /// Extracts the raw Vulkan objects behind `eye`'s color target.
    #[cfg(feature = "openvr")]
    fn export(&self, eye: Eye, targets: &EyeTargets) -> Result<CompositorTexture, BackendError> {
        use crate::runtime::VulkanImage;
        use ash::vk::Handle;
        use wgpu::hal::api::Vulkan;

        let mut device_handles = None;
        // SAFETY: the handles are only copied out; the device outlives every
        // submission because the session releases the runtime first.
        let _ = unsafe {
            self.gfx.device.as_hal::<Vulkan, _, _>(|device| {
                device_handles = device.map(|d| {
                    (
                        d.raw_device().handle().as_raw(),
                        d.raw_physical_device().as_raw(),
                        d.shared_instance().raw_instance().handle().as_raw(),
                        d.raw_queue().as_raw(),
                        d.queue_family_index(),
                    )
                });
            })
        };
        let (device, physical_device, instance, queue, queue_family_index) = device_handles
            .ok_or_else(|| {
                BackendError::Export(format!(
                    "device runs on {:?}, compositor needs Vulkan",
                    self.gfx.adapter_info.backend
                ))
            })?;

        let mut image = None;
        let _ = unsafe {
            targets
                .eye(eye)
                .color_tex
                .as_hal::<Vulkan, _, _>(|texture| {
                    image = texture.map(|t| t.raw_handle().as_raw());
                })
        };
        let image = image
            .ok_or_else(|| BackendError::Export("eye texture has no Vulkan image".into()))?;

        Ok(CompositorTexture {
            handle: NativeTextureHandle::Vulkan(VulkanImage {
                image,
                device,
                physical_device,
                instance,
                queue,
                queue_family_index,
                width: targets.size.width,
                height: targets.size.height,
                format: ash::vk::Format::R8G8B8A8_UNORM.as_raw() as u32,
                sample_count: 1,
            }),
            api: TextureApi::Vulkan,
            color_space: ColorSpace::Gamma,
        })
    }
}

impl RenderBackend for WgpuBackend {
    fn create_eye_targets(&mut self, size: RenderSize) -> Result<(), BackendError> {
        let targets = EyeTargets::new(&self.gfx.device, size);
        let binds =
            Eye::BOTH.map(|eye| self.mirror.bind(&self.gfx.device, &targets.eye(eye).color));
        self.mirror_binds = Some(binds);
        self.targets = Some(targets);
        Ok(())
    }

    fn create_cube_resources(&mut self) -> Result<(), BackendError> {
        self.cube = Some(CubePipeline::new(
            &self.gfx.device,
            EYE_COLOR_FORMAT,
            EYE_DEPTH_FORMAT,
        ));
        Ok(())
    }

    fn begin_eye(&mut self, eye: Eye, clear: [f32; 4]) -> Result<(), BackendError> {
        if self.targets.is_none() {
            return Err(BackendError::MissingResource("eye targets"));
        }
        self.pass.begin(eye, clear)
    }

    fn draw_cube(&mut self, constants: &CubeConstants) -> Result<(), BackendError> {
        if self.cube.is_none() {
            return Err(BackendError::MissingResource("cube resources"));
        }
        self.pass.push(*constants)
    }

    fn end_eye(&mut self) -> Result<(), BackendError> {
        let pass = self.pass.finish()?;
        let (Some(targets), Some(cube)) = (self.targets.as_ref(), self.cube.as_mut()) else {
            return Err(BackendError::MissingResource("eye targets"));
        };
        let target = targets.eye(pass.eye);

        cube.upload(&self.gfx.device, &self.gfx.queue, &pass.draws);

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Eye Encoder"),
            });
        {
            let [r, g, b, a] = pass.clear.map(f64::from);
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Eye Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            cube.draw(&mut rpass, pass.draws.len());
        }
        self.gfx.queue.submit(std::iter::once(encoder.finish()));
        log::trace!("{:?} eye: {} draws flushed", pass.eye, pass.draws.len());
        Ok(())
    }

    fn compositor_texture(&self, eye: Eye) -> Result<CompositorTexture, BackendError> {
        let targets = self
            .targets
            .as_ref()
            .ok_or(BackendError::MissingResource("eye targets"))?;
        self.export(eye, targets)
    }

    fn release(&mut self) {
        self.pass.abandon();
        self.cube = None;
        self.mirror_binds = None;
        if self.targets.take().is_some() {
            log::debug!("Released eye targets and cube resources");
        }
    }
}
