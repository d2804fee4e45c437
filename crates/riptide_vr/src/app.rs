use crate::{
    config::{Config, RuntimeKind},
    error::RuntimeError,
    eye::Eye,
    pose::TrackedPose,
    renderer::WgpuBackend,
    runtime::{
        CompositorTexture, ControllerRole, DeviceClass, RenderSize, SimulatedConfig,
        SimulatedRuntime, VrRuntime,
    },
    session::{Session, SessionState},
};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use vr_math::{HmdMatrix34, HmdMatrix44};
use winit::{event::WindowEvent, window::Window};

#[cfg(feature = "openvr")]
use crate::runtime::OpenVrRuntime;

/// The runtime picked on the command line.
pub enum AnyRuntime {
    Simulated(SimulatedRuntime),
    #[cfg(feature = "openvr")]
    OpenVr(OpenVrRuntime),
}

impl AnyRuntime {
    pub fn connect(kind: RuntimeKind, simulated: SimulatedConfig) -> Result<Self, RuntimeError> {
        match kind {
            RuntimeKind::Simulated => SimulatedRuntime::new(simulated).map(Self::Simulated),
            #[cfg(feature = "openvr")]
            RuntimeKind::Openvr => {
                let runtime = OpenVrRuntime::connect()?;
                log::debug!(
                    "Compositor wants Vulkan instance extensions: {:?}",
                    runtime.vulkan_instance_extensions_required()
                );
                Ok(Self::OpenVr(runtime))
            }
        }
    }

    fn inner(&self) -> &dyn VrRuntime {
        match self {
            Self::Simulated(r) => r,
            #[cfg(feature = "openvr")]
            Self::OpenVr(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn VrRuntime {
        match self {
            Self::Simulated(r) => r,
            #[cfg(feature = "openvr")]
            Self::OpenVr(r) => r,
        }
    }
}

impl VrRuntime for AnyRuntime {
    fn recommended_render_target_size(&self) -> RenderSize {
        self.inner().recommended_render_target_size()
    }

    fn wait_get_poses(&mut self) -> Result<Vec<TrackedPose>, RuntimeError> {
        self.inner_mut().wait_get_poses()
    }

    fn device_class(&self, device_index: u32) -> DeviceClass {
        self.inner().device_class(device_index)
    }

    fn controller_role(&self, device_index: u32) -> ControllerRole {
        self.inner().controller_role(device_index)
    }

    fn eye_to_head_transform(&self, eye: Eye) -> HmdMatrix34 {
        self.inner().eye_to_head_transform(eye)
    }

    fn projection_matrix(&self, eye: Eye, near: f32, far: f32) -> HmdMatrix44 {
        self.inner().projection_matrix(eye, near, far)
    }

    fn submit(&mut self, eye: Eye, texture: &CompositorTexture) -> Result<(), RuntimeError> {
        self.inner_mut().submit(eye, texture)
    }

    fn shutdown(&mut self) {
        self.inner_mut().shutdown()
    }
}

/// Window-side owner of the VR session.
pub struct App {
    pub session: Session<AnyRuntime, WgpuBackend>,
    mirror: Option<Eye>,
}

impl App {
    /// Brings up the GPU, connects the runtime and allocates the eye targets.
    pub async fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let simulated = config.simulated_config();
        simulated.validate()?;

        let backend = WgpuBackend::new(window)
            .await
            .context("Failed to create GPU context")?;
        let mut session = Session::new(backend, config.session_config());
        session
            .initialize(|| AnyRuntime::connect(config.runtime, simulated))
            .context("Failed to start VR session")?;

        Ok(Self {
            session,
            mirror: config.mirror.eye(),
        })
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::Resized(physical_size) = event {
            self.session.backend_mut().resize(*physical_size);
        }
    }

    /// Renders and submits one VR frame, then refreshes the desktop mirror.
    /// Returns an error only for failures the frame loop cannot recover from.
    pub fn frame(&mut self) -> Result<()> {
        if self.session.state() != SessionState::Running {
            return Ok(());
        }
        let stats = self.session.render_frame()?;
        log::trace!("{:?}", stats);

        let Some(eye) = self.mirror else {
            return Ok(());
        };
        let backend = self.session.backend_mut();
        match backend.present_mirror(eye) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = backend.gfx().size;
                backend.resize(size);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(anyhow!("GPU out of memory while presenting the mirror"));
            }
            Err(e) => log::warn!("Mirror present skipped: {:?}", e),
        }
        Ok(())
    }

    /// Stops the frame loop and releases the runtime and GPU resources.
    pub fn shutdown(&mut self) {
        self.session.request_shutdown();
        self.session.shutdown();
    }
}
