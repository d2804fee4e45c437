//! Matrix conversions between the OpenVR runtime layout and glam.
//!
//! OpenVR hands out row-major matrices meant to multiply column vectors:
//!
//! - `HmdMatrix34`: a rigid device-to-tracking transform, three rows of
//!   `[r0, r1, r2, t]`. The implicit fourth row is `[0, 0, 0, 1]`.
//! - `HmdMatrix44`: a per-eye projection, already windowed to the near/far
//!   planes the caller asked for, with a `[0, 1]` clip depth range.
//!
//! Both are right-handed, Y-up, -Z-forward. glam stores column-major and also
//! multiplies column vectors, so a straight conversion is a relayout. Engines
//! that look down +Z need the Z axis mirrored, which [`AxisConvention`]
//! captures as a single switch.
//!
//! The projection is never re-derived from a field of view: the runtime's
//! matrix carries the asymmetric frustum of each lens.

use glam::{Mat3, Mat4, Vec4};

/// Row-major 3x4 pose matrix as produced by the runtime.
pub type HmdMatrix34 = [[f32; 4]; 3];

/// Row-major 4x4 projection matrix as produced by the runtime.
pub type HmdMatrix44 = [[f32; 4]; 4];

/// Mirror of the Z axis, `diag(1, 1, -1, 1)`. Its own inverse.
#[rustfmt::skip]
pub const Z_FLIP: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0,  0.0, 0.0,
    0.0, 1.0,  0.0, 0.0,
    0.0, 0.0, -1.0, 0.0,
    0.0, 0.0,  0.0, 1.0,
]);

/// Handedness of the rendering side of the conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisConvention {
    /// Mirror Z when crossing from runtime space into engine space.
    pub flip_z: bool,
}

impl AxisConvention {
    /// Right-handed engine space, identical to the runtime's (glam, wgpu).
    pub const RIGHT_HANDED: Self = Self { flip_z: false };
    /// Left-handed engine space looking down +Z.
    pub const LEFT_HANDED: Self = Self { flip_z: true };

    /// Re-expresses a rigid transform in the engine basis (`S * m * S`).
    ///
    /// Conjugating keeps the determinant positive, so rotations stay
    /// rotations; flipping a single row would turn them into reflections.
    #[inline]
    pub fn change_basis(self, m: Mat4) -> Mat4 {
        if self.flip_z {
            Z_FLIP * m * Z_FLIP
        } else {
            m
        }
    }

    /// Feeds engine-space camera coordinates to a runtime projection (`p * S`).
    #[inline]
    pub fn adapt_projection(self, p: Mat4) -> Mat4 {
        if self.flip_z {
            p * Z_FLIP
        } else {
            p
        }
    }
}

/// Converts a runtime pose matrix into an engine-space 4x4 transform.
pub fn convert_pose_matrix(m: &HmdMatrix34, convention: AxisConvention) -> Mat4 {
    let mat = Mat4::from_cols(
        Vec4::new(m[0][0], m[1][0], m[2][0], 0.0),
        Vec4::new(m[0][1], m[1][1], m[2][1], 0.0),
        Vec4::new(m[0][2], m[1][2], m[2][2], 0.0),
        Vec4::new(m[0][3], m[1][3], m[2][3], 1.0),
    );
    convention.change_basis(mat)
}

/// Inverse of [`convert_pose_matrix`]: back to the runtime's 3x4 layout.
///
/// The bottom row of `mat` is dropped, so only affine transforms survive the
/// trip unchanged.
pub fn pose_matrix_to_runtime(mat: Mat4, convention: AxisConvention) -> HmdMatrix34 {
    let m = convention.change_basis(mat);
    [m.row(0).to_array(), m.row(1).to_array(), m.row(2).to_array()]
}

/// Converts a runtime projection matrix into an engine-space projection.
///
/// Pure relayout (plus the optional Z mirror on the camera side); clip-space
/// depth stays in `[0, 1]`, which is what wgpu expects.
pub fn convert_projection_matrix(m: &HmdMatrix44, convention: AxisConvention) -> Mat4 {
    // from_cols_array_2d reads each inner array as a column, i.e. it
    // transposes a row-major input.
    let p = Mat4::from_cols_array_2d(m).transpose();
    convention.adapt_projection(p)
}

/// Inverse of [`convert_projection_matrix`].
pub fn projection_matrix_to_runtime(p: Mat4, convention: AxisConvention) -> HmdMatrix44 {
    let p = convention.adapt_projection(p);
    [
        p.row(0).to_array(),
        p.row(1).to_array(),
        p.row(2).to_array(),
        p.row(3).to_array(),
    ]
}

/// Builds a runtime-layout projection from raw frustum tangents.
///
/// Same construction OpenVR uses for `GetProjectionMatrix` from
/// `GetProjectionRaw`: `top` is the tangent toward -Y image rows and is
/// usually negative, `bottom` positive.
pub fn projection_from_tangents(
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
    near: f32,
    far: f32,
) -> HmdMatrix44 {
    let idx = 1.0 / (right - left);
    let idy = 1.0 / (bottom - top);
    let idz = 1.0 / (far - near);
    let sx = right + left;
    let sy = bottom + top;

    [
        [2.0 * idx, 0.0, sx * idx, 0.0],
        [0.0, 2.0 * idy, sy * idy, 0.0],
        [0.0, 0.0, -far * idz, -far * near * idz],
        [0.0, 0.0, -1.0, 0.0],
    ]
}

/// Matrix for transforming normals under `model_view`: the inverse-transpose
/// of its upper 3x3, padded back to 4x4.
///
/// Must be fed the model-view matrix, never one that includes the projection.
pub fn normal_matrix(model_view: Mat4) -> Mat4 {
    let upper = Mat3::from_mat4(model_view);
    Mat4::from_mat3(upper.inverse().transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    const EPS: f32 = 1e-5;

    #[rustfmt::skip]
    fn sample_pose() -> HmdMatrix34 {
        // 30 degrees about +Y, translated to (0.5, 1.6, -2.0).
        let (s, c) = 30f32.to_radians().sin_cos();
        [
            [  c, 0.0,   s,  0.5],
            [0.0, 1.0, 0.0,  1.6],
            [ -s, 0.0,   c, -2.0],
        ]
    }

    #[test]
    fn pose_translation_lands_in_last_column() {
        let m = convert_pose_matrix(&sample_pose(), AxisConvention::RIGHT_HANDED);
        assert!(m.w_axis.abs_diff_eq(Vec4::new(0.5, 1.6, -2.0, 1.0), EPS));

        let expected = Mat4::from_rotation_translation(
            Quat::from_rotation_y(30f32.to_radians()),
            Vec3::new(0.5, 1.6, -2.0),
        );
        assert!(m.abs_diff_eq(expected, EPS));
    }

    #[test]
    fn pose_round_trip_restores_runtime_values() {
        for convention in [AxisConvention::RIGHT_HANDED, AxisConvention::LEFT_HANDED] {
            let raw = sample_pose();
            let back = pose_matrix_to_runtime(convert_pose_matrix(&raw, convention), convention);
            for r in 0..3 {
                for c in 0..4 {
                    assert!((raw[r][c] - back[r][c]).abs() < EPS, "[{r}][{c}] {convention:?}");
                }
            }
        }
    }

    #[test]
    fn flipped_pose_mirrors_only_the_z_axis() {
        let raw = sample_pose();
        let rh = convert_pose_matrix(&raw, AxisConvention::RIGHT_HANDED);
        let lh = convert_pose_matrix(&raw, AxisConvention::LEFT_HANDED);

        // Position: z negated, x/y untouched.
        assert!(lh.w_axis.abs_diff_eq(rh.w_axis * Vec4::new(1.0, 1.0, -1.0, 1.0), EPS));
        // Still a proper rotation.
        assert!((Mat3::from_mat4(lh).determinant() - 1.0).abs() < EPS);
        // Reading a flipped pose back without the flip shows the mirrored row.
        let mirrored = pose_matrix_to_runtime(lh, AxisConvention::RIGHT_HANDED);
        assert!((mirrored[2][3] - 2.0).abs() < EPS);
    }

    #[test]
    fn projection_relayout_matches_glam_perspective() {
        let expected = Mat4::perspective_rh(90f32.to_radians(), 0.9, 0.1, 100.0);
        let raw = projection_matrix_to_runtime(expected, AxisConvention::RIGHT_HANDED);
        // Row-major storage: the -1 that produces w = -z sits at [3][2].
        assert_eq!(raw[3][2], -1.0);

        let p = convert_projection_matrix(&raw, AxisConvention::RIGHT_HANDED);
        assert!(p.abs_diff_eq(expected, EPS));
    }

    #[test]
    fn tangent_projection_maps_clip_planes_to_unit_depth() {
        let raw = projection_from_tangents(-1.4, 1.2, -1.3, 1.3, 0.1, 1000.0);
        let p = convert_projection_matrix(&raw, AxisConvention::RIGHT_HANDED);

        let near = p * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = p * Vec4::new(0.0, 0.0, -1000.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-4);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);

        // Asymmetric frustum: the optical axis is off-center in x.
        assert!((near.x / near.w).abs() > 1e-3);
    }

    #[test]
    fn flipped_projection_accepts_plus_z_camera_space() {
        let raw = projection_from_tangents(-1.0, 1.0, -1.0, 1.0, 0.1, 10.0);
        let lh = convert_projection_matrix(&raw, AxisConvention::LEFT_HANDED);
        let rh = convert_projection_matrix(&raw, AxisConvention::RIGHT_HANDED);

        let a = lh * Vec4::new(0.3, 0.2, 5.0, 1.0);
        let b = rh * Vec4::new(0.3, 0.2, -5.0, 1.0);
        assert!(a.abs_diff_eq(b, EPS));
    }

    #[test]
    fn normal_matrix_stays_perpendicular_under_non_uniform_scale() {
        let model_view = Mat4::from_scale_rotation_translation(
            Vec3::new(0.1, 0.4, 2.0),
            Quat::from_rotation_x(0.7),
            Vec3::new(1.0, -2.0, 3.0),
        );
        let n = normal_matrix(model_view);

        // A tangent of the +X face and that face's normal.
        let tangent = model_view.transform_vector3(Vec3::new(0.0, 1.0, 1.0));
        let normal = n.transform_vector3(Vec3::X);
        assert!(tangent.dot(normal).abs() < 1e-4);

        // Diagonal plane x = y: plain model-view skews its normal off the surface.
        let surface = model_view.transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        let good = n.transform_vector3(Vec3::new(1.0, -1.0, 0.0));
        let skewed = model_view.transform_vector3(Vec3::new(1.0, -1.0, 0.0));
        assert!(good.dot(surface).abs() < 1e-4);
        assert!(skewed.dot(surface).abs() > 1e-3);
    }
}
