//! The fixed demo scene: a spinning cube, four orbiting cubes and a ground
//! quad.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};

use crate::frame::FrameState;
use crate::math::orbit_position;

const ORBIT_AXIS: Vec3 = Vec3::new(-1.0, -1.0, 0.0);
const ORBIT_SPREAD: Vec3 = Vec3::new(0.0, 2.0, 0.0);
const ORBIT_CENTER: Vec3 = Vec3::new(-2.0, 0.0, 0.0);
const ORBITER_COUNT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshKind {
    Cube,
    Quad,
}

/// One indexed draw of the geometry pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub mesh: MeshKind,
    pub model: Mat4,
}

/// Lay out the scene for `state`, in draw order.
pub fn build(state: &FrameState) -> Vec<DrawItem> {
    let phase = state.phase();
    let mut draws = Vec::with_capacity(ORBITER_COUNT + 2);

    draws.push(DrawItem {
        mesh: MeshKind::Cube,
        model: Mat4::from_rotation_y(phase),
    });

    for i in 0..ORBITER_COUNT {
        let amount = phase + i as f32 * FRAC_PI_2;
        let position = orbit_position(amount, ORBIT_AXIS, ORBIT_SPREAD) + ORBIT_CENTER;
        draws.push(DrawItem {
            mesh: MeshKind::Cube,
            model: Mat4::from_translation(position) * Mat4::from_rotation_y(-amount),
        });
    }

    draws.push(DrawItem {
        mesh: MeshKind::Quad,
        model: Mat4::from_translation(Vec3::new(0.0, -3.0, 0.0))
            * Mat4::from_scale(Vec3::new(10.0, 1.0, 10.0)),
    });

    draws
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_draws_in_order() {
        let draws = build(&FrameState::default());
        let kinds: Vec<MeshKind> = draws.iter().map(|d| d.mesh).collect();
        assert_eq!(
            kinds,
            [
                MeshKind::Cube,
                MeshKind::Cube,
                MeshKind::Cube,
                MeshKind::Cube,
                MeshKind::Cube,
                MeshKind::Quad
            ]
        );
        assert_eq!(draws[0].model, Mat4::IDENTITY);
    }

    #[test]
    fn first_orbiter_starts_above_center() {
        let draws = build(&FrameState::default());
        let position = draws[1].model.w_axis.truncate();
        assert!(position.abs_diff_eq(Vec3::new(-2.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn orbiters_share_one_circle() {
        let state = FrameState {
            cube_rotation: 1.3,
            cube_speed: 0.7,
            ..FrameState::default()
        };
        let draws = build(&state);
        for draw in &draws[1..5] {
            let offset = draw.model.w_axis.truncate() - ORBIT_CENTER;
            assert!((offset.length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn ground_is_below_the_cubes() {
        let draws = build(&FrameState::default());
        let ground = draws[5].model;
        let corner = ground.transform_point3(Vec3::new(0.5, 0.0, 0.5));
        assert!(corner.abs_diff_eq(Vec3::new(5.0, -3.0, 5.0), 1e-5));
    }
}
