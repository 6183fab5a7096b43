//! Per-frame simulation state.
//!
//! Everything the frame loop mutates lives in one [`FrameState`] value.
//! [`FrameState::advance`] takes the previous state plus a snapshot of the
//! held keys and returns the next state, so the update can be exercised
//! without a window or a GPU.

use winit::keyboard::KeyCode;

use crate::camera::Camera;
use crate::input::Input;

/// Which controls are held during a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameInput {
    pub turn_left: bool,
    pub turn_right: bool,
    pub look_up: bool,
    pub look_down: bool,
    pub forward: bool,
    pub backward: bool,
    pub strafe_left: bool,
    pub strafe_right: bool,
    pub slower: bool,
    pub faster: bool,
}

impl FrameInput {
    /// Snapshot the default key bindings: arrows turn, WASD move, Q/E change
    /// the cube speed.
    pub fn from_keys(input: &Input) -> Self {
        Self {
            turn_left: input.key_down(KeyCode::ArrowLeft),
            turn_right: input.key_down(KeyCode::ArrowRight),
            look_up: input.key_down(KeyCode::ArrowUp),
            look_down: input.key_down(KeyCode::ArrowDown),
            forward: input.key_down(KeyCode::KeyW),
            backward: input.key_down(KeyCode::KeyS),
            strafe_left: input.key_down(KeyCode::KeyA),
            strafe_right: input.key_down(KeyCode::KeyD),
            slower: input.key_down(KeyCode::KeyQ),
            faster: input.key_down(KeyCode::KeyE),
        }
    }
}

/// Fixed per-frame increments. The demo is frame-locked: none of these are
/// scaled by dt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tuning {
    /// Radians added to pitch/yaw per frame while an arrow key is held.
    pub turn_step: f32,
    /// World units moved per frame while a movement key is held.
    pub move_step: f32,
    /// Cube speed change per frame while Q/E is held.
    pub speed_step: f32,
    /// Cube rotation added after every frame.
    pub rotation_step: f32,
    /// Upper bound on the magnitude of the cube speed.
    pub max_cube_speed: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            turn_step: 0.025,
            move_step: 0.1,
            speed_step: 0.01,
            rotation_step: 0.1,
            max_cube_speed: 10.0,
        }
    }
}

/// Camera and animation state carried from one frame to the next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameState {
    pub camera: Camera,
    /// Accumulated rotation, advanced by [`Tuning::rotation_step`] per frame.
    pub cube_rotation: f32,
    /// Multiplier applied to `cube_rotation` when the scene is laid out.
    pub cube_speed: f32,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            cube_rotation: 0.0,
            cube_speed: 1.0,
        }
    }
}

impl FrameState {
    /// Animation phase used to lay out the scene this frame.
    pub fn phase(&self) -> f32 {
        self.cube_rotation * self.cube_speed
    }

    /// Apply this frame's input to the camera and speed.
    ///
    /// The orientation is updated first so movement follows the new heading.
    pub fn steer(mut self, input: &FrameInput, tuning: &Tuning) -> Self {
        let turn = tuning.turn_step;
        if input.turn_left {
            self.camera.yaw -= turn;
        }
        if input.turn_right {
            self.camera.yaw += turn;
        }
        if input.look_up {
            self.camera.pitch += turn;
        }
        if input.look_down {
            self.camera.pitch -= turn;
        }

        let forward = self.camera.forward();
        let side = self.camera.side();
        let step = tuning.move_step;
        if input.forward {
            self.camera.position += forward * step;
        }
        if input.backward {
            self.camera.position -= forward * step;
        }
        if input.strafe_left {
            self.camera.position += side * step;
        }
        if input.strafe_right {
            self.camera.position -= side * step;
        }

        if input.slower {
            self.cube_speed -= tuning.speed_step;
        }
        if input.faster {
            self.cube_speed += tuning.speed_step;
        }
        // `f32::max`/`min` ignore a NaN bound, so a NaN limit leaves speed unbounded.
        let limit = tuning.max_cube_speed.abs();
        self.cube_speed = self.cube_speed.max(-limit).min(limit);

        self
    }

    /// Advance the animation after the frame has been drawn.
    pub fn animate(mut self, tuning: &Tuning) -> Self {
        self.cube_rotation += tuning.rotation_step;
        self
    }

    /// One full step: steer, then animate. Used when no draw happens in
    /// between, e.g. when the surface is unavailable.
    pub fn advance(self, input: &FrameInput, tuning: &Tuning) -> Self {
        self.steer(input, tuning).animate(tuning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn hold(input: FrameInput, frames: usize) -> FrameState {
        let tuning = Tuning::default();
        (0..frames).fold(FrameState::default(), |state, _| {
            state.advance(&input, &tuning)
        })
    }

    #[test]
    fn turning_right_accumulates_yaw() {
        let frames = 40;
        let state = hold(
            FrameInput {
                turn_right: true,
                ..Default::default()
            },
            frames,
        );

        let expected = frames as f32 * 0.025;
        assert!((state.camera.yaw - expected).abs() < 1e-4);

        // The view matrix's third row is -forward.
        let view = state.camera.view_matrix();
        let forward = -view.row(2).truncate();
        let expected_forward = Vec3::new(-expected.sin(), 0.0, expected.cos());
        assert!(forward.abs_diff_eq(expected_forward, 1e-4));

        // Right vector stays horizontal.
        let right = view.row(0).truncate();
        assert!(right.y.abs() < 1e-5);
        assert!((right.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn idle_frames_only_animate() {
        let state = hold(FrameInput::default(), 25);
        assert_eq!(state.camera, Camera::default());
        assert_eq!(state.cube_speed, 1.0);
        assert!((state.cube_rotation - 2.5).abs() < 1e-4);
    }

    #[test]
    fn forward_moves_along_heading() {
        let state = hold(
            FrameInput {
                forward: true,
                ..Default::default()
            },
            10,
        );
        let moved = state.camera.position - Camera::default().position;
        assert!(moved.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-4));
    }

    #[test]
    fn cube_speed_is_clamped() {
        let tuning = Tuning {
            max_cube_speed: 1.05,
            ..Tuning::default()
        };
        let input = FrameInput {
            faster: true,
            ..Default::default()
        };
        let state = (0..50).fold(FrameState::default(), |s, _| s.advance(&input, &tuning));
        assert_eq!(state.cube_speed, 1.05);
    }

    #[test]
    fn unbounded_speed_when_limit_is_infinite() {
        let tuning = Tuning {
            max_cube_speed: f32::INFINITY,
            ..Tuning::default()
        };
        let input = FrameInput {
            slower: true,
            ..Default::default()
        };
        let state = (0..500).fold(FrameState::default(), |s, _| s.advance(&input, &tuning));
        assert!((state.cube_speed - (1.0 - 5.0)).abs() < 1e-3);
    }

    #[test]
    fn odd_speed_limits_do_not_panic() {
        let input = FrameInput {
            faster: true,
            ..Default::default()
        };

        let negative = Tuning {
            max_cube_speed: -1.0,
            ..Tuning::default()
        };
        let state = (0..500).fold(FrameState::default(), |s, _| s.advance(&input, &negative));
        assert_eq!(state.cube_speed, 1.0);

        let nan = Tuning {
            max_cube_speed: f32::NAN,
            ..Tuning::default()
        };
        let state = FrameState::default().advance(&input, &nan);
        assert!((state.cube_speed - 1.01).abs() < 1e-6);
    }
}
