//! Classifies raw tracked-device poses and resolves the head and controller
//! transforms for a frame.

use crate::runtime::{ControllerRole, DeviceClass, VrRuntime};
use glam::Mat4;
use vr_math::{convert_pose_matrix, AxisConvention, HmdMatrix34};

/// One device's pose sample for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPose {
    pub device_index: u32,
    /// When false the matrix carries no meaning and must not be read.
    pub valid: bool,
    pub device_to_absolute: HmdMatrix34,
}

impl TrackedPose {
    pub fn invalid(device_index: u32) -> Self {
        Self {
            device_index,
            valid: false,
            device_to_absolute: [[0.0; 4]; 3],
        }
    }
}

/// What a tracked device is for the purposes of rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Hmd,
    Controller(ControllerRole),
    Other,
}

impl DeviceRole {
    /// Queries the runtime once for the device's class and, for controllers,
    /// its hand.
    pub fn classify<R: VrRuntime + ?Sized>(runtime: &R, device_index: u32) -> Self {
        match runtime.device_class(device_index) {
            DeviceClass::Hmd => DeviceRole::Hmd,
            DeviceClass::Controller => {
                DeviceRole::Controller(runtime.controller_role(device_index))
            }
            DeviceClass::Invalid | DeviceClass::GenericTracker | DeviceClass::TrackingReference => {
                DeviceRole::Other
            }
        }
    }
}

/// The three transforms the renderer consumes for a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTransforms {
    pub head: Mat4,
    pub left_controller: Mat4,
    pub right_controller: Mat4,
}

impl Default for ResolvedTransforms {
    fn default() -> Self {
        Self {
            head: Mat4::IDENTITY,
            left_controller: Mat4::IDENTITY,
            right_controller: Mat4::IDENTITY,
        }
    }
}

/// What happens to a role that has no valid pose this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalePosePolicy {
    /// Fall back to identity.
    #[default]
    ResetToIdentity,
    /// Keep the last transform resolved for that role.
    HoldLast,
}

#[derive(Debug, Clone)]
pub struct PoseResolver {
    policy: StalePosePolicy,
    convention: AxisConvention,
    last: ResolvedTransforms,
    last_valid_count: usize,
}

impl PoseResolver {
    pub fn new(policy: StalePosePolicy, convention: AxisConvention) -> Self {
        Self {
            policy,
            convention,
            last: ResolvedTransforms::default(),
            last_valid_count: 0,
        }
    }

    /// Resolves this frame's head/left/right transforms.
    ///
    /// Invalid poses are skipped before the device is even classified. When a
    /// role sees several valid poses the last one wins; controllers beyond the
    /// two hand slots, and controllers whose hand is not yet known, are
    /// dropped for the frame.
    pub fn resolve_frame<R: VrRuntime + ?Sized>(
        &mut self,
        runtime: &R,
        poses: &[TrackedPose],
    ) -> ResolvedTransforms {
        let mut out = match self.policy {
            StalePosePolicy::ResetToIdentity => ResolvedTransforms::default(),
            StalePosePolicy::HoldLast => self.last,
        };
        let mut valid = 0;

        for pose in poses.iter().filter(|p| p.valid) {
            valid += 1;
            let slot = match DeviceRole::classify(runtime, pose.device_index) {
                DeviceRole::Hmd => &mut out.head,
                DeviceRole::Controller(ControllerRole::Left) => &mut out.left_controller,
                DeviceRole::Controller(ControllerRole::Right) => &mut out.right_controller,
                DeviceRole::Controller(ControllerRole::Unknown) => {
                    log::trace!("Controller {} has no hand yet", pose.device_index);
                    continue;
                }
                DeviceRole::Other => continue,
            };
            *slot = convert_pose_matrix(&pose.device_to_absolute, self.convention);
        }

        if valid == 0 && self.last_valid_count > 0 {
            log::debug!("Tracking lost: no valid poses this frame");
        }
        self.last_valid_count = valid;
        self.last = out;
        out
    }

    /// Number of valid poses seen in the most recent frame.
    pub fn valid_poses(&self) -> usize {
        self.last_valid_count
    }
}
