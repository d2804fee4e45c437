//! SteamVR through the `openvr` crate.

use super::{
    ColorSpace, CompositorTexture, ControllerRole, DeviceClass, NativeTextureHandle, RenderSize,
    VrRuntime,
};
use crate::{error::RuntimeError, eye::Eye, pose::TrackedPose};
use openvr::compositor::texture;
use vr_math::{HmdMatrix34, HmdMatrix44};

pub struct OpenVrRuntime {
    system: openvr::System,
    compositor: openvr::Compositor,
    // Declared last so the handles above are dropped before the context
    // shuts the runtime down.
    context: openvr::Context,
}

impl OpenVrRuntime {
    /// Initializes OpenVR as a scene application.
    pub fn connect() -> Result<Self, RuntimeError> {
        let context = unsafe { openvr::init(openvr::ApplicationType::Scene) }
            .map_err(|e| RuntimeError::Init(e.to_string()))?;
        let system = context
            .system()
            .map_err(|e| RuntimeError::Init(e.to_string()))?;
        let compositor = context
            .compositor()
            .map_err(|e| RuntimeError::Init(e.to_string()))?;

        log::info!("OpenVR initialized");
        Ok(Self {
            system,
            compositor,
            context,
        })
    }

    /// Vulkan instance extensions the compositor needs to read our images.
    pub fn vulkan_instance_extensions_required(&self) -> Vec<std::ffi::CString> {
        self.compositor.vulkan_instance_extensions_required()
    }
}

fn openvr_eye(eye: Eye) -> openvr::Eye {
    match eye {
        Eye::Left => openvr::Eye::Left,
        Eye::Right => openvr::Eye::Right,
    }
}

impl VrRuntime for OpenVrRuntime {
    fn recommended_render_target_size(&self) -> RenderSize {
        let (width, height) = self.system.recommended_render_target_size();
        RenderSize { width, height }
    }

    fn wait_get_poses(&mut self) -> Result<Vec<TrackedPose>, RuntimeError> {
        let poses = self
            .compositor
            .wait_get_poses()
            .map_err(|e| RuntimeError::Compositor(format!("{e:?}")))?;

        Ok(poses
            .render
            .iter()
            .enumerate()
            .map(|(index, pose)| TrackedPose {
                device_index: index as u32,
                valid: pose.pose_is_valid(),
                device_to_absolute: *pose.device_to_absolute_tracking(),
            })
            .collect())
    }

    fn device_class(&self, device_index: u32) -> DeviceClass {
        match self.system.tracked_device_class(device_index) {
            openvr::TrackedDeviceClass::HMD => DeviceClass::Hmd,
            openvr::TrackedDeviceClass::Controller => DeviceClass::Controller,
            openvr::TrackedDeviceClass::GenericTracker => DeviceClass::GenericTracker,
            openvr::TrackedDeviceClass::TrackingReference => DeviceClass::TrackingReference,
            _ => DeviceClass::Invalid,
        }
    }

    fn controller_role(&self, device_index: u32) -> ControllerRole {
        match self
            .system
            .get_controller_role_for_tracked_device_index(device_index)
        {
            Some(openvr::TrackedControllerRole::LeftHand) => ControllerRole::Left,
            Some(openvr::TrackedControllerRole::RightHand) => ControllerRole::Right,
            None => ControllerRole::Unknown,
        }
    }

    fn eye_to_head_transform(&self, eye: Eye) -> HmdMatrix34 {
        self.system.eye_to_head_transform(openvr_eye(eye))
    }

    fn projection_matrix(&self, eye: Eye, near: f32, far: f32) -> HmdMatrix44 {
        self.system.projection_matrix(openvr_eye(eye), near, far)
    }

    fn submit(&mut self, eye: Eye, tex: &CompositorTexture) -> Result<(), RuntimeError> {
        let NativeTextureHandle::Vulkan(image) = tex.handle else {
            return Err(RuntimeError::UnsupportedTexture(tex.api));
        };

        let handle = texture::Handle::Vulkan(texture::vulkan::Texture {
            image: image.image,
            device: image.device as usize as *mut openvr::VkDevice_T,
            physical_device: image.physical_device as usize as *mut openvr::VkPhysicalDevice_T,
            instance: image.instance as usize as *mut openvr::VkInstance_T,
            queue: image.queue as usize as *mut openvr::VkQueue_T,
            queue_family_index: image.queue_family_index,
            width: image.width,
            height: image.height,
            format: image.format,
            sample_count: image.sample_count,
        });
        let color_space = match tex.color_space {
            ColorSpace::Gamma => texture::ColorSpace::Gamma,
            ColorSpace::Linear => texture::ColorSpace::Linear,
        };

        // The image stays alive in the backend until the session releases it.
        unsafe {
            self.compositor.submit(
                openvr_eye(eye),
                &texture::Texture {
                    handle,
                    color_space,
                },
                None,
                None,
            )
        }
        .map_err(|e| RuntimeError::Compositor(format!("{e:?}")))
    }

    fn shutdown(&mut self) {
        // Guarded inside openvr; repeated calls are no-ops.
        unsafe { self.context.shutdown() };
    }
}
