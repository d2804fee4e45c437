use crate::{
    error::SessionError,
    eye::ClipPlanes,
    pose::StalePosePolicy,
    renderer::CubeStyle,
    runtime::{RenderSize, SimulatedConfig},
};
use clap::{Parser, ValueEnum};
use glam::Vec3;
use vr_math::AxisConvention;

/// `riptide_vr` - tracked controllers drawn as cubes, rendered per eye and
/// handed to a VR compositor.
///
/// Every option can also be set through the environment variable named in
/// its help text.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Which VR runtime to drive.
    #[arg(long, env = "RIPTIDE_RUNTIME", value_enum, default_value_t = RuntimeKind::default())]
    pub runtime: RuntimeKind,

    /// Near clip plane distance in meters.
    #[arg(long, env = "RIPTIDE_NEAR", default_value_t = 0.025)]
    pub near: f32,

    /// Far clip plane distance in meters.
    #[arg(long, env = "RIPTIDE_FAR", default_value_t = 1000.0)]
    pub far: f32,

    /// Mirror Z when converting runtime matrices (left-handed engines).
    #[arg(long, env = "RIPTIDE_FLIP_Z")]
    pub flip_z: bool,

    /// Uniform scale applied to the unit cube drawn at each controller.
    #[arg(long, env = "RIPTIDE_CUBE_SCALE", default_value_t = 0.1)]
    pub cube_scale: f32,

    /// Offset of the cube along the controller's local Z axis, in meters.
    #[arg(
        long,
        env = "RIPTIDE_CONTROLLER_OFFSET_Z",
        default_value_t = -0.1,
        allow_negative_numbers = true
    )]
    pub controller_offset_z: f32,

    /// What a controller without a valid pose falls back to.
    #[arg(long, env = "RIPTIDE_STALE_POSES", value_enum, default_value_t = StalePoses::Reset)]
    pub stale_poses: StalePoses,

    /// Clear both eyes to the same neutral color instead of a per-eye tint.
    #[arg(long, env = "RIPTIDE_NO_TINT")]
    pub no_tint: bool,

    /// Eye image shown in the desktop window.
    #[arg(long, env = "RIPTIDE_MIRROR", value_enum, default_value_t = MirrorEye::Left)]
    pub mirror: MirrorEye,

    /// Frame rate of the simulated headset.
    #[arg(long, env = "RIPTIDE_REFRESH_HZ", default_value_t = 90.0)]
    pub refresh_hz: f32,

    /// Desktop window width in logical pixels.
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Desktop window height in logical pixels.
    #[arg(long, default_value_t = 480)]
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuntimeKind {
    /// Synthetic headset and controllers, no hardware needed.
    Simulated,
    /// SteamVR through OpenVR.
    #[cfg(feature = "openvr")]
    Openvr,
}

impl Default for RuntimeKind {
    #[cfg(feature = "openvr")]
    fn default() -> Self {
        RuntimeKind::Openvr
    }

    #[cfg(not(feature = "openvr"))]
    fn default() -> Self {
        RuntimeKind::Simulated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StalePoses {
    /// Snap to the tracking origin.
    Reset,
    /// Keep the last known transform.
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MirrorEye {
    Left,
    Right,
    None,
}

impl MirrorEye {
    pub fn eye(self) -> Option<crate::eye::Eye> {
        match self {
            MirrorEye::Left => Some(crate::eye::Eye::Left),
            MirrorEye::Right => Some(crate::eye::Eye::Right),
            MirrorEye::None => None,
        }
    }
}

impl Config {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            clip: ClipPlanes {
                near: self.near,
                far: self.far,
            },
            convention: AxisConvention {
                flip_z: self.flip_z,
            },
            cube: CubeStyle {
                scale: Vec3::splat(self.cube_scale),
                offset: Vec3::new(0.0, 0.0, self.controller_offset_z),
                ..CubeStyle::default()
            },
            stale_poses: match self.stale_poses {
                StalePoses::Reset => StalePosePolicy::ResetToIdentity,
                StalePoses::Hold => StalePosePolicy::HoldLast,
            },
            tint_eyes: !self.no_tint,
        }
    }

    pub fn simulated_config(&self) -> SimulatedConfig {
        SimulatedConfig {
            refresh_hz: self.refresh_hz,
            ..SimulatedConfig::default()
        }
    }
}

/// Everything a session needs to know, independent of how it was configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub clip: ClipPlanes,
    pub convention: AxisConvention,
    pub cube: CubeStyle,
    pub stale_poses: StalePosePolicy,
    pub tint_eyes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clip: ClipPlanes::default(),
            convention: AxisConvention::RIGHT_HANDED,
            cube: CubeStyle::default(),
            stale_poses: StalePosePolicy::default(),
            tint_eyes: true,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        let ClipPlanes { near, far } = self.clip;
        if !(near > 0.0) {
            return Err(SessionError::Config(format!("near plane must be > 0, got {near}")));
        }
        if !(far > near) {
            return Err(SessionError::Config(format!(
                "far plane ({far}) must be beyond near plane ({near})"
            )));
        }
        if !self.cube.scale.cmpgt(Vec3::ZERO).all() {
            return Err(SessionError::Config(format!(
                "cube scale must be positive, got {}",
                self.cube.scale
            )));
        }
        Ok(())
    }
}

impl SimulatedConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        self.frame_period()
            .map_err(|e| SessionError::Config(e.to_string()))?;
        let RenderSize { width, height } = self.render_size;
        if width == 0 || height == 0 {
            return Err(SessionError::Config("render size must be non-zero".into()));
        }
        Ok(())
    }
}
