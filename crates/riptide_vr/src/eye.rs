//! Per-eye camera derivation from the head pose and the HMD's static eye data.

use crate::runtime::VrRuntime;
use glam::Mat4;
use vr_math::{convert_pose_matrix, convert_projection_matrix, AxisConvention};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Render and submission order.
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    /// Debug clear color that tells the two eye images apart at a glance.
    pub fn tint(self) -> [f32; 4] {
        match self {
            Eye::Left => [1.0, 0.17, 0.17, 1.0],
            Eye::Right => [0.17, 1.0, 0.17, 1.0],
        }
    }
}

/// Near/far distances handed to the runtime when it builds a projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlanes {
    pub near: f32,
    pub far: f32,
}

impl Default for ClipPlanes {
    fn default() -> Self {
        Self {
            near: 0.025,
            far: 1000.0,
        }
    }
}

/// Derives view and projection matrices for each eye.
///
/// The eye-to-head offsets are read once from the runtime at construction;
/// only a live runtime can produce one of these, so there is no "HMD not
/// ready" case to handle per frame.
#[derive(Debug, Clone)]
pub struct EyeTransformDeriver {
    eye_to_head: [Mat4; 2],
    clip: ClipPlanes,
    convention: AxisConvention,
}

impl EyeTransformDeriver {
    pub fn from_runtime<R: VrRuntime + ?Sized>(
        runtime: &R,
        clip: ClipPlanes,
        convention: AxisConvention,
    ) -> Self {
        let eye_to_head = Eye::BOTH.map(|eye| {
            convert_pose_matrix(&runtime.eye_to_head_transform(eye), convention)
        });
        log::debug!(
            "Eye offsets: left {:?}, right {:?}",
            eye_to_head[0].w_axis.truncate(),
            eye_to_head[1].w_axis.truncate()
        );

        Self {
            eye_to_head,
            clip,
            convention,
        }
    }

    #[inline]
    pub fn eye_to_head(&self, eye: Eye) -> Mat4 {
        self.eye_to_head[eye.index()]
    }

    /// World-to-eye matrix: `inverse(head * eye_to_head)`.
    ///
    /// The eye offset is composed into world space first and the result is
    /// inverted as a whole.
    pub fn view(&self, eye: Eye, head: Mat4) -> Mat4 {
        (head * self.eye_to_head(eye)).inverse()
    }

    /// The runtime's projection for `eye`, relaid out for the engine.
    ///
    /// Recomputed on every call; the value only changes if the HMD's lens
    /// parameters do.
    pub fn projection<R: VrRuntime + ?Sized>(&self, eye: Eye, runtime: &R) -> Mat4 {
        let raw = runtime.projection_matrix(eye, self.clip.near, self.clip.far);
        convert_projection_matrix(&raw, self.convention)
    }

    pub fn clip(&self) -> ClipPlanes {
        self.clip
    }

    pub fn convention(&self) -> AxisConvention {
        self.convention
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, ScriptedRuntime};
    use glam::{Mat3, Quat, Vec3, Vec4};
    use vr_math::pose_matrix_to_runtime;

    fn runtime_with_ipd(ipd: f32) -> ScriptedRuntime {
        let mut runtime = ScriptedRuntime::new(CallLog::default());
        runtime.eye_to_head = [
            pose_matrix_to_runtime(
                Mat4::from_translation(Vec3::new(-ipd / 2.0, 0.0, 0.0)),
                AxisConvention::RIGHT_HANDED,
            ),
            pose_matrix_to_runtime(
                Mat4::from_translation(Vec3::new(ipd / 2.0, 0.0, 0.0)),
                AxisConvention::RIGHT_HANDED,
            ),
        ];
        runtime
    }

    #[test]
    fn view_is_inverse_of_head_times_eye_offset() {
        let runtime = runtime_with_ipd(0.064);
        let deriver = EyeTransformDeriver::from_runtime(
            &runtime,
            ClipPlanes::default(),
            AxisConvention::RIGHT_HANDED,
        );

        let rotation = Quat::from_rotation_y(90f32.to_radians());
        let head = Mat4::from_rotation_translation(rotation, Vec3::new(1.0, 1.7, -0.5));
        let view = deriver.view(Eye::Left, head);

        // Closed form: eye world pose is R about the head, eye origin at
        // head_pos + R * (-0.032, 0, 0). Inverse of [R | t] is [R^T | -R^T t].
        let r = Mat3::from_quat(rotation);
        let t = Vec3::new(1.0, 1.7, -0.5) + r * Vec3::new(-0.032, 0.0, 0.0);
        let rt = r.transpose();
        let expected = Mat4::from_cols(
            rt.x_axis.extend(0.0),
            rt.y_axis.extend(0.0),
            rt.z_axis.extend(0.0),
            (-(rt * t)).extend(1.0),
        );
        assert!(view.abs_diff_eq(expected, 1e-5), "{view:?} != {expected:?}");

        // The eye sits at the camera origin.
        let eye_pos = view * t.extend(1.0);
        assert!(eye_pos.abs_diff_eq(Vec4::W, 1e-5));
    }

    #[test]
    fn inverting_parts_separately_in_the_wrong_order_differs() {
        let runtime = runtime_with_ipd(0.064);
        let deriver = EyeTransformDeriver::from_runtime(
            &runtime,
            ClipPlanes::default(),
            AxisConvention::RIGHT_HANDED,
        );
        let head = Mat4::from_rotation_translation(Quat::from_rotation_y(1.0), Vec3::Y);
        let wrong = head.inverse() * deriver.eye_to_head(Eye::Right).inverse();
        assert!(!deriver.view(Eye::Right, head).abs_diff_eq(wrong, 1e-4));
    }

    #[test]
    fn identity_head_puts_eyes_half_ipd_off_center() {
        let runtime = runtime_with_ipd(0.06);
        let deriver = EyeTransformDeriver::from_runtime(
            &runtime,
            ClipPlanes::default(),
            AxisConvention::RIGHT_HANDED,
        );
        let left = deriver.view(Eye::Left, Mat4::IDENTITY);
        let right = deriver.view(Eye::Right, Mat4::IDENTITY);
        assert!(left.w_axis.abs_diff_eq(Vec4::new(0.03, 0.0, 0.0, 1.0), 1e-6));
        assert!(right.w_axis.abs_diff_eq(Vec4::new(-0.03, 0.0, 0.0, 1.0), 1e-6));
    }

    #[test]
    fn projection_uses_configured_clip_planes() {
        let runtime = ScriptedRuntime::new(CallLog::default());
        let clip = ClipPlanes {
            near: 0.1,
            far: 50.0,
        };
        let deriver =
            EyeTransformDeriver::from_runtime(&runtime, clip, AxisConvention::RIGHT_HANDED);

        let p = deriver.projection(Eye::Left, &runtime);
        let near = p * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = p * Vec4::new(0.0, 0.0, -50.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-4);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);
        assert_eq!(deriver.clip(), clip);
    }
}
