//! Pauses between captures and key presses.

use std::time::Duration;

/// Blocks the scan loop for a while.
pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Every wait used by one scan, already divided by the speed factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timings {
    /// Before the first capture of a position (list scroll animation)
    pub settle: Duration,
    /// Around each key press of the redraw nudge
    pub nudge_pulse: Duration,
    /// After the nudge, before capturing again
    pub nudge_settle: Duration,
    /// Before and after each extra sample
    pub sample_interval: Duration,
    /// One countdown tick; not affected by speed
    pub countdown_tick: Duration,
}

impl Timings {
    /// Base timings at speed 1.0.
    pub const BASE: Timings = Timings {
        settle: Duration::from_millis(200),
        nudge_pulse: Duration::from_millis(175),
        nudge_settle: Duration::from_millis(400),
        sample_interval: Duration::from_millis(150),
        countdown_tick: Duration::from_secs(1),
    };

    /// Timings for `speed`; 2.0 halves every wait.
    pub fn for_speed(speed: f64) -> Self {
        let speed = if speed > 0.0 { speed } else { 1.0 };
        let scale = |d: Duration| d.div_f64(speed);
        Self {
            settle: scale(Self::BASE.settle),
            nudge_pulse: scale(Self::BASE.nudge_pulse),
            nudge_settle: scale(Self::BASE.nudge_settle),
            sample_interval: scale(Self::BASE.sample_interval),
            countdown_tick: Self::BASE.countdown_tick,
        }
    }

    /// No waiting at all.
    #[cfg(test)]
    pub fn zero() -> Self {
        Self {
            settle: Duration::ZERO,
            nudge_pulse: Duration::ZERO,
            nudge_settle: Duration::ZERO,
            sample_interval: Duration::ZERO,
            countdown_tick: Duration::ZERO,
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::BASE
    }
}
