/// Averaged frame timing over a fixed window of frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStats {
    /// Mean frame time in seconds.
    pub frame_time: f64,
    pub fps: f64,
}

impl FrameStats {
    /// Text shown in the window title.
    pub fn title(&self) -> String {
        format!(
            "frametime = {:.3}ms, fps = {:.1}",
            1000.0 * self.frame_time,
            self.fps
        )
    }
}

/// Accumulates frame deltas and reports their mean every `window` frames.
#[derive(Clone, Debug)]
pub struct FrameTimer {
    window: u32,
    accumulated: f64,
    frames: u32,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(10)
    }
}

impl FrameTimer {
    /// `window` is clamped to at least one frame.
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            accumulated: 0.0,
            frames: 0,
        }
    }

    /// Record one frame. Returns the average once the window is full and
    /// starts a new window.
    pub fn tick(&mut self, dt: f64) -> Option<FrameStats> {
        self.accumulated += dt;
        self.frames += 1;

        if self.frames < self.window {
            return None;
        }

        let frame_time = self.accumulated / f64::from(self.window);
        self.accumulated = 0.0;
        self.frames = 0;

        Some(FrameStats {
            frame_time,
            fps: if frame_time > 0.0 { 1.0 / frame_time } else { 0.0 },
        })
    }

    /// Sum of the deltas recorded in the current window.
    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    pub fn window(&self) -> u32 {
        self.window
    }
}
