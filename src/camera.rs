use glam::{Mat3, Mat4, Quat, Vec3};

/// A fly camera driven by two accumulated angles.
///
/// `yaw` grows when turning right and `pitch` grows when looking up. At zero
/// the camera looks down +Z with +Y up. The orientation is rebuilt from the
/// two angles every time it is needed, so there is no drift.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub pitch: f32,
    pub yaw: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, -7.0),
            pitch: 0.0,
            yaw: 0.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(-self.yaw) * Quat::from_rotation_x(-self.pitch)
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::Y
    }

    /// The camera's local +X axis. With a right-handed view looking down +Z
    /// this points to the left of the screen.
    pub fn side(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), self.up())
    }

    /// Camera-to-world rotation: the inverse of the view matrix's 3×3 part.
    /// The shading pass uses it to turn view-space rays into world rays.
    pub fn inverse_rotation(&self) -> Mat3 {
        Mat3::from_mat4(self.view_matrix()).inverse()
    }
}

/// Perspective projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 60.0_f32.to_radians(),
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_looks_down_positive_z() {
        let camera = Camera::new();
        assert!(camera.forward().abs_diff_eq(Vec3::Z, 1e-6));
        assert!(camera.up().abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn positive_pitch_looks_up() {
        let camera = Camera {
            pitch: 0.3,
            ..Camera::new()
        };
        assert!(camera.forward().y > 0.0);
    }

    #[test]
    fn inverse_rotation_maps_view_forward_to_world_forward() {
        let camera = Camera {
            pitch: 0.2,
            yaw: -1.1,
            ..Camera::new()
        };
        // View space looks down -Z.
        let world = camera.inverse_rotation() * Vec3::NEG_Z;
        assert!(world.abs_diff_eq(camera.forward(), 1e-5));
    }
}
