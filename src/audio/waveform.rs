//! Oscillator waveforms
//!
//! Every voice in the drone is a sine. Tests also get a square wave, whose
//! first half-cycle is a constant full-scale level.

use std::f64::consts::TAU;

/// Oscillator waveform shapes
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub enum Waveform {
    /// Smooth sine wave
    #[default]
    Sine,
    /// Abrupt square wave
    #[cfg(test)]
    Square,
}

impl Waveform {
    /// Sample the waveform at phase (0.0 to 1.0)
    /// Returns value in range -1.0 to 1.0
    pub fn sample(&self, phase: f64) -> f32 {
        let value = match self {
            Waveform::Sine => (phase * TAU).sin(),

            #[cfg(test)]
            Waveform::Square => {
                if phase < 0.5 { 1.0 } else { -1.0 }
            }
        };
        value as f32
    }
}
