//! The VR runtime seam: pose acquisition, HMD intrinsics and compositor
//! submission.
//!
//! - `simulated`: synthetic HMD and controllers, always available.
//! - `steamvr`: SteamVR through the `openvr` crate (gated behind `openvr` feature).

pub mod simulated;

#[cfg(feature = "openvr")]
pub mod steamvr;

pub use simulated::{SimulatedConfig, SimulatedRuntime};

#[cfg(feature = "openvr")]
pub use steamvr::OpenVrRuntime;

use crate::{error::RuntimeError, eye::Eye, pose::TrackedPose};
use vr_math::{HmdMatrix34, HmdMatrix44};

/// Upper bound on tracked devices per frame, matching OpenVR.
pub const MAX_TRACKED_DEVICES: usize = 64;

/// Device class as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Invalid,
    Hmd,
    Controller,
    GenericTracker,
    TrackingReference,
}

/// Hand assignment of a controller. `Unknown` is normal while tracking is
/// still being acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    Left,
    Right,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

/// Graphics API the native handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureApi {
    /// Handle only meaningful to the process that rendered it.
    InProcess,
    Vulkan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gamma,
    Linear,
}

/// Raw Vulkan objects the OpenVR compositor needs to read an eye image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanImage {
    pub image: u64,
    pub device: u64,
    pub physical_device: u64,
    pub instance: u64,
    pub queue: u64,
    pub queue_family_index: u32,
    pub width: u32,
    pub height: u32,
    /// `VkFormat` value.
    pub format: u32,
    pub sample_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeTextureHandle {
    InProcess { eye: Eye, size: RenderSize },
    Vulkan(VulkanImage),
}

/// One eye image in the form the compositor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositorTexture {
    pub handle: NativeTextureHandle,
    pub api: TextureApi,
    pub color_space: ColorSpace,
}

/// Capabilities the session needs from a head-mounted-display runtime.
pub trait VrRuntime {
    /// Per-eye render target size the runtime recommends.
    fn recommended_render_target_size(&self) -> RenderSize;

    /// Blocks until the compositor opens the next frame interval, then
    /// returns one pose per device slot. This is the only suspension point of
    /// the frame loop.
    fn wait_get_poses(&mut self) -> Result<Vec<TrackedPose>, RuntimeError>;

    fn device_class(&self, device_index: u32) -> DeviceClass;

    /// Only meaningful for controllers.
    fn controller_role(&self, device_index: u32) -> ControllerRole;

    /// Static offset of `eye` from the head pivot, runtime layout.
    fn eye_to_head_transform(&self, eye: Eye) -> HmdMatrix34;

    /// Projection for `eye` windowed to `near`/`far`, runtime layout.
    fn projection_matrix(&self, eye: Eye, near: f32, far: f32) -> HmdMatrix44;

    /// Hands a finished eye image to the compositor.
    fn submit(&mut self, eye: Eye, texture: &CompositorTexture) -> Result<(), RuntimeError>;

    /// Releases the runtime connection. Must tolerate repeated calls.
    fn shutdown(&mut self) {}
}
