//! Level meter — windowed RMS of the produced (left channel) samples.

/// Default window length, in samples.
pub const LEVEL_WINDOW: usize = 2048;

#[derive(Debug, Clone)]
pub struct LevelMeter {
    sum_squares: f64,
    count: usize,
    window: usize,
}

impl LevelMeter {
    pub fn new(window: usize) -> Self {
        LevelMeter {
            sum_squares: 0.0,
            count: 0,
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Samples accumulated in the current window.
    pub fn count(&self) -> usize {
        self.count
    }

    /// RMS of the current window; an empty window reads as silence.
    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_squares / self.count as f64).sqrt()
        }
    }

    /// Accumulate one sample. Returns the window's RMS when it fills up,
    /// after which a fresh window starts.
    #[inline]
    pub fn push(&mut self, sample: f32) -> Option<f64> {
        let s = f64::from(sample);
        self.sum_squares += s * s;
        self.count += 1;
        self.flush()
    }

    /// Report and restart the window if it is full.
    pub fn flush(&mut self) -> Option<f64> {
        if self.count < self.window {
            return None;
        }
        let rms = self.rms();
        self.clear();
        Some(rms)
    }

    /// Discard the current window without reporting it.
    pub fn clear(&mut self) {
        self.sum_squares = 0.0;
        self.count = 0;
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new(LEVEL_WINDOW)
    }
}
