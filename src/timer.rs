//! Session timer
//!
//! A meditation countdown that only runs while the drone is playing.

use std::time::Duration;

/// Preset durations offered in the UI
pub const PRESETS: [(&str, Duration); 3] = [
    ("5 min", Duration::from_secs(5 * 60)),
    ("10 min", Duration::from_secs(10 * 60)),
    ("15 min", Duration::from_secs(15 * 60)),
];

/// Shown once the countdown finishes; the app pauses the drone at that point
pub const COMPLETE_MESSAGE: &str = "Session complete. Namaste. The drone has been paused.";

/// Countdown that advances only while audio plays
#[derive(Clone, Debug, Default)]
pub struct SessionTimer {
    /// Selected duration, `None` when no timer is set
    duration: Option<Duration>,
    remaining: Duration,
    complete: bool,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a countdown of `duration`
    pub fn select(&mut self, duration: Duration) {
        self.duration = Some(duration);
        self.remaining = duration;
        self.complete = false;
    }

    /// Clear the timer
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance by `elapsed` if `is_playing`
    ///
    /// Returns `true` exactly once, on the tick that finishes the countdown.
    pub fn tick(&mut self, elapsed: Duration, is_playing: bool) -> bool {
        if !is_playing || !self.is_active() {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(elapsed);
        if self.remaining.is_zero() {
            self.complete = true;
            log::info!("Session timer complete");
            return true;
        }
        false
    }

    /// A countdown is selected and not yet finished
    pub fn is_active(&self) -> bool {
        self.duration.is_some() && !self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Fraction of the countdown elapsed (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        match self.duration {
            Some(total) if !total.is_zero() => {
                1.0 - self.remaining.as_secs_f32() / total.as_secs_f32()
            }
            _ => 0.0,
        }
    }

    /// Progress bar text
    pub fn status_text(&self, is_playing: bool) -> String {
        if self.is_complete() {
            COMPLETE_MESSAGE.to_string()
        } else if is_playing {
            self.format_remaining()
        } else {
            format!("{} (paused)", self.format_remaining())
        }
    }

    /// Remaining time as `m:ss`, rounding partial seconds up
    pub fn format_remaining(&self) -> String {
        let remaining = self.remaining();
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}
