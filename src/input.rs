use std::collections::HashSet;

use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Tracks keyboard state across window events.
///
/// Key-down state persists until the key is released; pressed/released sets
/// only hold keys that changed since the last [`Input::begin_frame`].
#[derive(Debug, Default)]
pub struct Input {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call once per frame after the frame consumed the input.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
    }

    /// Process a window event and update input state.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if let PhysicalKey::Code(key) = event.physical_key {
                match event.state {
                    ElementState::Pressed => self.press(key),
                    ElementState::Released => self.release(key),
                }
            }
        }
    }

    pub(crate) fn press(&mut self, key: KeyCode) {
        if self.keys_down.insert(key) {
            self.keys_pressed.insert(key);
        }
    }

    pub(crate) fn release(&mut self, key: KeyCode) {
        if self.keys_down.remove(&key) {
            self.keys_released.insert(key);
        }
    }

    /// Drop all held keys, e.g. when the window loses focus.
    pub fn reset(&mut self) {
        let held: Vec<KeyCode> = self.keys_down.iter().copied().collect();
        for key in held {
            self.release(key);
        }
    }

    /// Returns true if the key is currently held down.
    pub fn key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// Returns true if the key was pressed this frame.
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Returns true if the key was released this frame.
    pub fn key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_edge_triggered() {
        let mut input = Input::new();
        input.press(KeyCode::KeyW);
        assert!(input.key_pressed(KeyCode::KeyW));
        assert!(input.key_down(KeyCode::KeyW));

        input.begin_frame();
        // Key repeat delivers another Pressed without a release.
        input.press(KeyCode::KeyW);
        assert!(!input.key_pressed(KeyCode::KeyW));
        assert!(input.key_down(KeyCode::KeyW));
    }

    #[test]
    fn reset_releases_everything() {
        let mut input = Input::new();
        input.press(KeyCode::ArrowLeft);
        input.press(KeyCode::KeyQ);
        input.begin_frame();

        input.reset();
        assert!(!input.key_down(KeyCode::ArrowLeft));
        assert!(input.key_released(KeyCode::ArrowLeft));
        assert!(input.key_released(KeyCode::KeyQ));
    }
}
