use glam::{Mat4, Quat, Vec3};

use super::layout::IDENTITY_QUAT;

/// Derived gamepad fields.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DerivedPose {
    /// Pointing direction: `-Z` rotated by the orientation.
    pub direction: [f32; 3],
    /// Column-major `T * R` with unit scale.
    pub transform: [f32; 16],
}

/// Computes a gamepad's direction and transform from its pose.
///
/// Pure: identical inputs always produce bit-identical outputs.
pub fn derive_pose(position: [f32; 3], orientation: [f32; 4]) -> DerivedPose {
    let rotation = Quat::from_array(orientation);
    let direction = rotation * Vec3::NEG_Z;
    let transform =
        Mat4::from_scale_rotation_translation(Vec3::ONE, rotation, Vec3::from_array(position));

    DerivedPose {
        direction: direction.to_array(),
        transform: transform.to_cols_array(),
    }
}

/// Returns a unit quaternion; degenerate input collapses to identity.
pub fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let quat = Quat::from_array(q);
    let len_sq = quat.length_squared();
    if !len_sq.is_finite() || len_sq < 1e-12 {
        return IDENTITY_QUAT;
    }
    quat.normalize().to_array()
}
