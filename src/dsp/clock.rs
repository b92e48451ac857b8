//! Playback clock — sample-and-hold stepping from the emulated rate to the
//! device rate.

/// Fractional phase accumulator plus the emulated time counter.
///
/// Each native sample adds `ratio = target_rate / native_rate` to the phase.
/// Whenever the phase reaches 1 the whole part moves into `time` and the
/// caller re-evaluates the formula; otherwise the previous value is held.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackClock {
    phase: f64,
    time: u32,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Emulated time; wraps at 32 bits.
    pub fn time(&self) -> u32 {
        self.time
    }

    /// True at the very start of a session, before anything has played.
    pub fn at_origin(&self) -> bool {
        self.time == 0 && self.phase == 0.0
    }

    /// Restart the fractional phase, keeping the time counter.
    pub fn reset_phase(&mut self) {
        self.phase = 0.0;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance by one native sample. Returns the new emulated time when the
    /// formula must be evaluated again, `None` when the held value stands.
    #[inline]
    pub fn tick(&mut self, ratio: f64) -> Option<u32> {
        self.phase += ratio;
        if self.phase < 1.0 {
            return None;
        }
        let steps = self.phase.floor();
        self.phase -= steps;
        // f64 -> u64 saturates; truncating to u32 wraps like the counter
        self.time = self.time.wrapping_add(steps as u64 as u32);
        Some(self.time)
    }
}

/// Ratio of emulated to native sample rate.
pub fn rate_ratio(target_rate: f64, native_rate: f64) -> f64 {
    target_rate / native_rate
}
