//! Per-eye rendering and compositor submission, written against the
//! [`RenderBackend`] seam, plus the wgpu implementation of that seam.

pub mod backend;
pub mod context;
pub mod pipelines;
pub mod targets;

pub use self::backend::WgpuBackend;

use crate::{
    error::{BackendError, RuntimeError},
    eye::{Eye, EyeTransformDeriver},
    pose::ResolvedTransforms,
    runtime::{ColorSpace, CompositorTexture, RenderSize, VrRuntime},
};
use glam::{Mat4, Vec3, Vec4};

/// Uniform payload for one cube draw. Must match `CubeConstants` in
/// `shaders/cube.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CubeConstants {
    /// Model to clip space.
    pub model_view_proj: Mat4,
    /// Inverse-transpose of the model-view 3x3, for normals.
    pub normal_transform: Mat4,
    pub color: Vec4,
}

const _: [(); 144] = [(); core::mem::size_of::<CubeConstants>()];

/// Capabilities the session needs from the rendering library.
///
/// Draws are only legal between `begin_eye` and `end_eye`; `end_eye` is where
/// the eye's work is flushed to the GPU.
pub trait RenderBackend {
    /// Allocates the two color+depth eye targets. Called once per session.
    fn create_eye_targets(&mut self, size: RenderSize) -> Result<(), BackendError>;

    /// Creates the shared cube geometry, constant buffer and pipeline.
    fn create_cube_resources(&mut self) -> Result<(), BackendError>;

    /// Binds `eye`'s targets and clears color to `clear` and depth to 1.0.
    fn begin_eye(&mut self, eye: Eye, clear: [f32; 4]) -> Result<(), BackendError>;

    fn draw_cube(&mut self, constants: &CubeConstants) -> Result<(), BackendError>;

    fn end_eye(&mut self) -> Result<(), BackendError>;

    /// Native handle of `eye`'s color target for the compositor.
    fn compositor_texture(&self, eye: Eye) -> Result<CompositorTexture, BackendError>;

    /// Drops every GPU resource. Must tolerate repeated calls.
    fn release(&mut self);
}

/// How the controller markers look.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeStyle {
    /// Shrinks the unit cube to a hand-held marker.
    pub scale: Vec3,
    /// Nudge along the controller's local axes so the marker clears the grip.
    pub offset: Vec3,
    pub left_color: Vec4,
    pub right_color: Vec4,
}

impl Default for CubeStyle {
    fn default() -> Self {
        Self {
            scale: Vec3::splat(0.1),
            offset: Vec3::new(0.0, 0.0, -0.1),
            left_color: Vec4::new(0.2, 0.4, 1.0, 1.0),
            right_color: Vec4::new(1.0, 0.55, 0.1, 1.0),
        }
    }
}

impl CubeStyle {
    /// Controller-local marker transform: `offset * scale`.
    #[inline]
    pub fn marker_transform(&self) -> Mat4 {
        Mat4::from_translation(self.offset) * Mat4::from_scale(self.scale)
    }
}

/// Builds the constants for one cube.
///
/// Column-vector order: `projection * view * model`. The normal transform is
/// derived from model-view only; folding the projection in would skew the
/// lighting.
pub fn cube_constants(model: Mat4, view: Mat4, projection: Mat4, color: Vec4) -> CubeConstants {
    let model_view = view * model;
    CubeConstants {
        model_view_proj: projection * model_view,
        normal_transform: vr_math::normal_matrix(model_view),
        color,
    }
}

const UNTINTED_CLEAR: [f32; 4] = [0.05, 0.05, 0.07, 1.0];

/// Draws the controller markers into one eye.
#[derive(Debug, Clone)]
pub struct EyeRenderer {
    deriver: EyeTransformDeriver,
    style: CubeStyle,
    tint_eyes: bool,
}

impl EyeRenderer {
    pub fn new(deriver: EyeTransformDeriver, style: CubeStyle, tint_eyes: bool) -> Self {
        Self {
            deriver,
            style,
            tint_eyes,
        }
    }

    /// Renders one eye and returns the number of draws issued.
    ///
    /// One cube per controller slot; the head is never drawn. A slot without
    /// tracking still draws, at whatever transform the resolver fell back to.
    pub fn render_eye<R, B>(
        &self,
        eye: Eye,
        transforms: &ResolvedTransforms,
        runtime: &R,
        backend: &mut B,
    ) -> Result<usize, BackendError>
    where
        R: VrRuntime + ?Sized,
        B: RenderBackend + ?Sized,
    {
        let clear = if self.tint_eyes {
            eye.tint()
        } else {
            UNTINTED_CLEAR
        };
        backend.begin_eye(eye, clear)?;

        let view = self.deriver.view(eye, transforms.head);
        let projection = self.deriver.projection(eye, runtime);
        // Controllers arrive conjugated into engine space; the marker must be
        // too, or a mirrored Z would push it back into the grip.
        let marker = self
            .deriver
            .convention()
            .change_basis(self.style.marker_transform());

        let instances = [
            (transforms.left_controller, self.style.left_color),
            (transforms.right_controller, self.style.right_color),
        ];
        for (controller, color) in instances {
            let constants = cube_constants(controller * marker, view, projection, color);
            backend.draw_cube(&constants)?;
        }

        backend.end_eye()?;
        Ok(instances.len())
    }
}

/// Hands both eye images to the compositor, left then right.
///
/// Must run after both eyes of the same frame are rendered. A rejected
/// submission is logged and skipped; the runtime recovers on the next frame.
pub fn submit_frame<R, B>(runtime: &mut R, backend: &B) -> Result<usize, BackendError>
where
    R: VrRuntime + ?Sized,
    B: RenderBackend + ?Sized,
{
    let mut submitted = 0;
    for eye in Eye::BOTH {
        let mut texture = backend.compositor_texture(eye)?;
        texture.color_space = ColorSpace::Gamma;

        match runtime.submit(eye, &texture) {
            Ok(()) => submitted += 1,
            Err(err @ RuntimeError::UnsupportedTexture(_)) => {
                return Err(BackendError::Export(err.to_string()))
            }
            Err(err) => log::warn!("Compositor rejected {:?} eye: {}", eye, err),
        }
    }
    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        eye::ClipPlanes,
        testing::{Call, CallLog, RecordingBackend, ScriptedRuntime},
    };
    use glam::Quat;
    use vr_math::AxisConvention;

    fn renderer_for(runtime: &ScriptedRuntime) -> EyeRenderer {
        let deriver = EyeTransformDeriver::from_runtime(
            runtime,
            ClipPlanes::default(),
            AxisConvention::RIGHT_HANDED,
        );
        EyeRenderer::new(deriver, CubeStyle::default(), true)
    }

    #[test]
    fn normal_transform_ignores_projection() {
        let model = Mat4::from_scale_rotation_translation(
            Vec3::new(0.1, 0.3, 0.1),
            Quat::from_rotation_z(0.3),
            Vec3::new(0.2, 1.0, -0.3),
        );
        let view = Mat4::from_translation(Vec3::new(0.0, -1.7, 0.0));
        let projection = Mat4::perspective_rh(1.5, 0.9, 0.05, 100.0);

        let c = cube_constants(model, view, projection, Vec4::ONE);
        let expected = vr_math::normal_matrix(view * model);
        assert!(c.normal_transform.abs_diff_eq(expected, 1e-5));
        assert!(!c
            .normal_transform
            .abs_diff_eq(vr_math::normal_matrix(projection * view * model), 1e-3));
        assert!(c.model_view_proj.abs_diff_eq(projection * view * model, 1e-5));
    }

    #[test]
    fn marker_is_scaled_then_pushed_forward() {
        let style = CubeStyle::default();
        let m = style.marker_transform();
        // Cube corner (1,1,1) shrinks to 0.1 and shifts -0.1 along local Z.
        let corner = m.transform_point3(Vec3::ONE);
        assert!(corner.abs_diff_eq(Vec3::new(0.1, 0.1, 0.0), 1e-6));
    }

    #[test]
    fn eye_pass_clears_with_tint_and_draws_both_controllers() {
        let log = CallLog::default();
        let runtime = ScriptedRuntime::new(log.clone());
        let mut backend = RecordingBackend::new(log.clone());
        let renderer = renderer_for(&runtime);

        let draws = renderer
            .render_eye(Eye::Right, &ResolvedTransforms::default(), &runtime, &mut backend)
            .unwrap();

        assert_eq!(draws, 2);
        assert_eq!(backend.clears, vec![(Eye::Right, Eye::Right.tint())]);
        assert_eq!(
            log.calls(),
            vec![
                Call::BeginEye(Eye::Right),
                Call::Draw(Eye::Right),
                Call::Draw(Eye::Right),
                Call::EndEye(Eye::Right),
            ]
        );
    }

    #[test]
    fn untinted_eyes_share_a_clear_color() {
        let log = CallLog::default();
        let runtime = ScriptedRuntime::new(log.clone());
        let mut backend = RecordingBackend::new(log);
        let deriver = EyeTransformDeriver::from_runtime(
            &runtime,
            ClipPlanes::default(),
            AxisConvention::RIGHT_HANDED,
        );
        let renderer = EyeRenderer::new(deriver, CubeStyle::default(), false);

        for eye in Eye::BOTH {
            renderer
                .render_eye(eye, &ResolvedTransforms::default(), &runtime, &mut backend)
                .unwrap();
        }
        assert_eq!(backend.clears[0].1, backend.clears[1].1);
    }

    #[test]
    fn submission_tags_gamma_and_covers_both_eyes() {
        let log = CallLog::default();
        let mut runtime = ScriptedRuntime::new(log.clone());
        let backend = RecordingBackend::new(log.clone());

        assert_eq!(submit_frame(&mut runtime, &backend).unwrap(), 2);
        assert_eq!(log.calls(), vec![Call::Submit(Eye::Left), Call::Submit(Eye::Right)]);
        assert!(runtime
            .submitted
            .iter()
            .all(|(_, tex)| tex.color_space == ColorSpace::Gamma));
    }

    #[test]
    fn rejected_submission_is_absorbed() {
        let log = CallLog::default();
        let mut runtime = ScriptedRuntime::new(log.clone());
        runtime.reject_submit = true;
        let backend = RecordingBackend::new(log);

        assert_eq!(submit_frame(&mut runtime, &backend).unwrap(), 0);
    }
}
