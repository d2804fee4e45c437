//! Synthetic headset for running the frame pipeline without VR hardware.
//!
//! Device layout: slot 0 is the HMD, 1 and 2 the left and right controllers,
//! 3 a base station. Every other slot reports an invalid pose.

use super::{
    ControllerRole, CompositorTexture, DeviceClass, RenderSize, VrRuntime, MAX_TRACKED_DEVICES,
};
use crate::{error::RuntimeError, eye::Eye, pose::TrackedPose};
use glam::{Mat4, Quat, Vec3};
use std::{
    thread,
    time::{Duration, Instant},
};
use vr_math::{
    pose_matrix_to_runtime, projection_from_tangents, AxisConvention, HmdMatrix34, HmdMatrix44,
};

const HMD_INDEX: u32 = 0;
const LEFT_INDEX: u32 = 1;
const RIGHT_INDEX: u32 = 2;
const BASE_STATION_INDEX: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedConfig {
    pub render_size: RenderSize,
    pub refresh_hz: f32,
    /// Inter-pupillary distance in meters.
    pub ipd_m: f32,
    /// Frames during which controllers report no hand, as while tracking is
    /// first acquired.
    pub warmup_frames: u64,
}

impl SimulatedConfig {
    /// Interval between pose waits. Rates so low or so odd that the period
    /// does not fit a `Duration` are rejected.
    pub fn frame_period(&self) -> Result<Duration, RuntimeError> {
        if !(self.refresh_hz > 0.0) {
            return Err(RuntimeError::Init(format!(
                "simulated refresh rate must be positive, got {}",
                self.refresh_hz
            )));
        }
        Duration::try_from_secs_f32(1.0 / self.refresh_hz).map_err(|e| {
            RuntimeError::Init(format!(
                "simulated refresh rate {} Hz gives no usable frame period: {e}",
                self.refresh_hz
            ))
        })
    }
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            render_size: RenderSize {
                width: 1512,
                height: 1680,
            },
            refresh_hz: 90.0,
            ipd_m: 0.064,
            warmup_frames: 45,
        }
    }
}

pub struct SimulatedRuntime {
    config: SimulatedConfig,
    frame_period: Duration,
    start: Instant,
    next_frame: Instant,
    frame: u64,
    submitted: [u64; 2],
    live: bool,
}

impl SimulatedRuntime {
    pub fn new(config: SimulatedConfig) -> Result<Self, RuntimeError> {
        let frame_period = config.frame_period()?;
        let now = Instant::now();
        log::info!(
            "Simulated HMD: {}x{} per eye at {} Hz",
            config.render_size.width,
            config.render_size.height,
            config.refresh_hz
        );

        Ok(Self {
            config,
            frame_period,
            start: now,
            next_frame: now,
            frame: 0,
            submitted: [0; 2],
            live: true,
        })
    }

    /// Frames handed out so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Images accepted per eye so far.
    pub fn submitted(&self, eye: Eye) -> u64 {
        self.submitted[eye.index()]
    }

    /// Sleeps until the next frame interval opens.
    fn pace(&mut self) {
        let now = Instant::now();
        if self.next_frame > now {
            thread::sleep(self.next_frame - now);
            self.next_frame += self.frame_period;
        } else {
            // Missed the interval; realign instead of bursting to catch up.
            self.next_frame = now + self.frame_period;
        }
    }

    fn head(t: f32) -> Mat4 {
        Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.25 * (0.3 * t).sin()),
            Vec3::new(0.05 * (0.5 * t).sin(), 1.7, 0.0),
        )
    }

    fn controller(t: f32, side: f32) -> Mat4 {
        let phase = t + side;
        Mat4::from_rotation_translation(
            Quat::from_rotation_x(-0.4) * Quat::from_rotation_z(0.3 * phase.sin()),
            Vec3::new(
                side * 0.25 + 0.08 * phase.cos(),
                1.2 + 0.08 * phase.sin(),
                -0.45,
            ),
        )
    }

    fn poses_at(&self, t: f32) -> Vec<TrackedPose> {
        let raw = |m: Mat4| pose_matrix_to_runtime(m, AxisConvention::RIGHT_HANDED);

        let mut poses: Vec<TrackedPose> = (0..MAX_TRACKED_DEVICES as u32)
            .map(TrackedPose::invalid)
            .collect();
        let tracked = [
            (HMD_INDEX, raw(Self::head(t))),
            (LEFT_INDEX, raw(Self::controller(t, -1.0))),
            (RIGHT_INDEX, raw(Self::controller(t, 1.0))),
            (
                BASE_STATION_INDEX,
                raw(Mat4::from_translation(Vec3::new(2.0, 2.5, 2.0))),
            ),
        ];
        for (index, m) in tracked {
            poses[index as usize] = TrackedPose {
                device_index: index,
                valid: true,
                device_to_absolute: m,
            };
        }
        poses
    }
}

impl VrRuntime for SimulatedRuntime {
    fn recommended_render_target_size(&self) -> RenderSize {
        self.config.render_size
    }

    fn wait_get_poses(&mut self) -> Result<Vec<TrackedPose>, RuntimeError> {
        if !self.live {
            return Err(RuntimeError::Compositor("runtime shut down".into()));
        }
        self.pace();
        self.frame += 1;
        let t = self.start.elapsed().as_secs_f32();
        Ok(self.poses_at(t))
    }

    fn device_class(&self, device_index: u32) -> DeviceClass {
        match device_index {
            HMD_INDEX => DeviceClass::Hmd,
            LEFT_INDEX | RIGHT_INDEX => DeviceClass::Controller,
            BASE_STATION_INDEX => DeviceClass::TrackingReference,
            _ => DeviceClass::Invalid,
        }
    }

    fn controller_role(&self, device_index: u32) -> ControllerRole {
        if self.frame <= self.config.warmup_frames {
            return ControllerRole::Unknown;
        }
        match device_index {
            LEFT_INDEX => ControllerRole::Left,
            RIGHT_INDEX => ControllerRole::Right,
            _ => ControllerRole::Unknown,
        }
    }

    fn eye_to_head_transform(&self, eye: Eye) -> HmdMatrix34 {
        let half = self.config.ipd_m / 2.0;
        let x = match eye {
            Eye::Left => -half,
            Eye::Right => half,
        };
        pose_matrix_to_runtime(
            Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
            AxisConvention::RIGHT_HANDED,
        )
    }

    fn projection_matrix(&self, eye: Eye, near: f32, far: f32) -> HmdMatrix44 {
        // Lenses are canted: each eye sees further toward its own side.
        let (left, right) = match eye {
            Eye::Left => (-1.39, 1.24),
            Eye::Right => (-1.24, 1.39),
        };
        projection_from_tangents(left, right, -1.47, 1.47, near, far)
    }

    fn submit(&mut self, eye: Eye, texture: &CompositorTexture) -> Result<(), RuntimeError> {
        if !self.live {
            return Err(RuntimeError::Compositor("runtime shut down".into()));
        }
        self.submitted[eye.index()] += 1;
        log::trace!("Simulated compositor took {:?} eye: {:?}", eye, texture.handle);
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.live {
            self.live = false;
            log::info!(
                "Simulated HMD shut down after {} frames ({} / {} eye images)",
                self.frame,
                self.submitted[0],
                self.submitted[1]
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pose::{PoseResolver, StalePosePolicy},
        runtime::{ColorSpace, NativeTextureHandle, TextureApi},
    };

    fn fast() -> SimulatedRuntime {
        SimulatedRuntime::new(SimulatedConfig {
            refresh_hz: 1000.0,
            warmup_frames: 1,
            ..SimulatedConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_non_positive_refresh_rate() {
        let config = SimulatedConfig {
            refresh_hz: 0.0,
            ..SimulatedConfig::default()
        };
        assert!(matches!(
            SimulatedRuntime::new(config),
            Err(RuntimeError::Init(_))
        ));
    }

    #[test]
    fn rejects_refresh_rate_without_representable_period() {
        let config = SimulatedConfig {
            refresh_hz: 1e-39,
            ..SimulatedConfig::default()
        };
        assert!(matches!(config.frame_period(), Err(RuntimeError::Init(_))));
        assert!(matches!(
            SimulatedRuntime::new(config),
            Err(RuntimeError::Init(_))
        ));
    }

    #[test]
    fn reports_full_device_array_with_four_tracked() {
        let mut runtime = fast();
        let poses = runtime.wait_get_poses().unwrap();
        assert_eq!(poses.len(), MAX_TRACKED_DEVICES);
        assert_eq!(poses.iter().filter(|p| p.valid).count(), 4);
        assert_eq!(runtime.device_class(BASE_STATION_INDEX), DeviceClass::TrackingReference);
        assert_eq!(runtime.device_class(10), DeviceClass::Invalid);
    }

    #[test]
    fn controller_hands_appear_after_warmup() {
        let mut runtime = fast();
        let mut resolver =
            PoseResolver::new(StalePosePolicy::ResetToIdentity, AxisConvention::RIGHT_HANDED);

        let poses = runtime.wait_get_poses().unwrap();
        let first = resolver.resolve_frame(&runtime, &poses);
        assert_eq!(first.left_controller, Mat4::IDENTITY);
        assert!((first.head.w_axis.y - 1.7).abs() < 1e-5);

        let poses = runtime.wait_get_poses().unwrap();
        let second = resolver.resolve_frame(&runtime, &poses);
        assert!(second.left_controller.w_axis.x < 0.0);
        assert!(second.right_controller.w_axis.x > 0.0);
    }

    #[test]
    fn pacing_blocks_for_roughly_one_period() {
        let mut runtime = SimulatedRuntime::new(SimulatedConfig {
            refresh_hz: 100.0,
            ..SimulatedConfig::default()
        })
        .unwrap();
        runtime.wait_get_poses().unwrap();
        let before = Instant::now();
        runtime.wait_get_poses().unwrap();
        runtime.wait_get_poses().unwrap();
        assert!(before.elapsed() >= Duration::from_millis(15));
        assert_eq!(runtime.frame(), 3);
    }

    #[test]
    fn eyes_are_offset_by_half_ipd() {
        let runtime = fast();
        let left = runtime.eye_to_head_transform(Eye::Left);
        let right = runtime.eye_to_head_transform(Eye::Right);
        assert!((left[0][3] + 0.032).abs() < 1e-6);
        assert!((right[0][3] - 0.032).abs() < 1e-6);
    }

    #[test]
    fn submissions_are_counted_until_shutdown() {
        let mut runtime = fast();
        let texture = CompositorTexture {
            handle: NativeTextureHandle::InProcess {
                eye: Eye::Left,
                size: runtime.recommended_render_target_size(),
            },
            api: TextureApi::InProcess,
            color_space: ColorSpace::Gamma,
        };
        runtime.submit(Eye::Left, &texture).unwrap();
        assert_eq!(runtime.submitted(Eye::Left), 1);
        assert_eq!(runtime.submitted(Eye::Right), 0);

        runtime.shutdown();
        runtime.shutdown();
        assert!(runtime.submit(Eye::Left, &texture).is_err());
        assert!(runtime.wait_get_poses().is_err());
    }
}
