use glam::{Quat, Vec3};

/// Rotate `spread` around `axis` by `angle` radians.
///
/// `axis` does not need to be normalized. At `angle == 0` (and every full turn)
/// the spread vector comes back unchanged.
pub fn orbit_position(angle: f32, axis: Vec3, spread: Vec3) -> Vec3 {
    Quat::from_axis_angle(axis.normalize(), angle) * spread
}

/// Linear interpolation between `a` and `b`.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}
