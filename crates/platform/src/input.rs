//! Keyboard state for camera movement.

use std::collections::HashSet;

use winit::event::{ElementState, KeyEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Keys currently held down, fed from winit keyboard events.
#[derive(Debug, Default)]
pub struct InputState {
    pressed: HashSet<KeyCode>,
    just_pressed: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear edge-triggered state. Call once per frame after input was consumed.
    pub fn end_frame(&mut self) {
        self.just_pressed.clear();
    }

    pub fn handle_key_event(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(code) = event.physical_key {
            match event.state {
                ElementState::Pressed => self.press(code),
                ElementState::Released => self.release(code),
            }
        }
    }

    pub fn press(&mut self, key: KeyCode) {
        if self.pressed.insert(key) {
            self.just_pressed.insert(key);
        }
    }

    pub fn release(&mut self, key: KeyCode) {
        self.pressed.remove(&key);
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    pub fn is_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&key)
    }

    /// `+1` while only `positive` is held, `-1` while only `negative` is held, else `0`.
    pub fn axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_pressed(positive) {
            value += 1.0;
        }
        if self.is_pressed(negative) {
            value -= 1.0;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_is_edge_triggered_once() {
        let mut input = InputState::new();
        input.press(KeyCode::KeyW);
        input.press(KeyCode::KeyW);
        assert!(input.is_just_pressed(KeyCode::KeyW));

        input.end_frame();
        assert!(input.is_pressed(KeyCode::KeyW));
        assert!(!input.is_just_pressed(KeyCode::KeyW));
    }

    #[test]
    fn test_axis_cancels_opposing_keys() {
        let mut input = InputState::new();
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 0.0);

        input.press(KeyCode::KeyW);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 1.0);

        input.press(KeyCode::KeyS);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 0.0);

        input.release(KeyCode::KeyW);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), -1.0);
    }
}
