//! The drone voice set
//!
//! Three voices follow the raaga's base frequency (main, detune, fifth);
//! three tanpura-style drone voices stay fixed on C3 / G3 / C4 whatever the
//! raaga. Two slow sine LFOs add vibrato to the main voice and a swell to
//! the low drone.

use crate::audio::ParamKind;

/// How a voice picks its frequency
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Pitch {
    /// Multiple of the raaga's base frequency
    Ratio(f32),
    /// Fixed frequency in Hz
    Fixed(f32),
}

impl Pitch {
    /// Frequency in Hz for a given base frequency
    pub fn frequency(&self, base: f32) -> f32 {
        match *self {
            Pitch::Ratio(ratio) => base * ratio,
            Pitch::Fixed(hz) => hz,
        }
    }
}

/// The audible voices, in graph order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoiceRole {
    Main,
    Detune,
    Fifth,
    DroneSa,
    DronePa,
    DroneHighSa,
}

/// One audible voice
#[derive(Clone, Copy, Debug)]
pub struct VoiceSpec {
    pub role: VoiceRole,
    pub pitch: Pitch,
    /// Voice gain before the master
    pub level: f32,
}

/// A low-frequency oscillator wired into a voice parameter
#[derive(Clone, Copy, Debug)]
pub struct ModulatorSpec {
    /// LFO rate in Hz
    pub rate: f32,
    /// Peak deviation added to the target parameter
    pub depth: f32,
    pub target: VoiceRole,
    /// `Frequency` modulates the voice oscillator, `Gain` its voice gain
    pub param: ParamKind,
}

pub const VOICES: [VoiceSpec; 6] = [
    VoiceSpec { role: VoiceRole::Main, pitch: Pitch::Ratio(1.0), level: 1.0 },
    // ~5 cents sharp, beats against the main voice
    VoiceSpec { role: VoiceRole::Detune, pitch: Pitch::Ratio(1.003), level: 0.3 },
    VoiceSpec { role: VoiceRole::Fifth, pitch: Pitch::Ratio(1.5), level: 0.1 },
    VoiceSpec { role: VoiceRole::DroneSa, pitch: Pitch::Fixed(130.81), level: 0.12 },
    VoiceSpec { role: VoiceRole::DronePa, pitch: Pitch::Fixed(196.0), level: 0.08 },
    VoiceSpec { role: VoiceRole::DroneHighSa, pitch: Pitch::Fixed(261.63), level: 0.06 },
];

pub const MODULATORS: [ModulatorSpec; 2] = [
    // Vibrato: +/-1.5 Hz on the main voice
    ModulatorSpec { rate: 0.15, depth: 1.5, target: VoiceRole::Main, param: ParamKind::Frequency },
    // Swell: +/-0.03 on the low drone's gain
    ModulatorSpec { rate: 0.08, depth: 0.03, target: VoiceRole::DroneSa, param: ParamKind::Gain },
];

/// Every oscillator a session starts and stops
pub const GENERATOR_COUNT: usize = VOICES.len() + MODULATORS.len();

/// Master level at volume 1.0
pub const ATTENUATION: f32 = 0.35;

/// Linear fade-in from silence on start, seconds
pub const ATTACK: f64 = 2.0;

/// Time constant of the fade-out on pause, seconds
///
/// Three time constants fit in 0.15 s, leaving ~5% of the level.
pub const FADE_OUT_TIME_CONSTANT: f64 = 0.05;

/// Delay between pause and the oscillators stopping, seconds
pub const TEARDOWN: f64 = 0.3;

/// Silence between a retiring session's stop and the next session's start
pub const SWITCH_GAP: f64 = 0.05;

/// Settling window for volume changes, seconds
pub const VOLUME_SETTLE: f64 = 0.1;

/// Time constant that settles a volume change within `VOLUME_SETTLE`
pub const VOLUME_TIME_CONSTANT: f64 = VOLUME_SETTLE / 3.0;

/// Master gain target for a UI volume
pub fn master_level(volume: f32) -> f32 {
    volume * ATTENUATION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_frequencies_at_440() {
        let freqs: Vec<f32> = VOICES.iter().map(|v| v.pitch.frequency(440.0)).collect();
        assert_eq!(freqs[0], 440.0);
        assert!((freqs[1] - 441.32).abs() < 1e-3);
        assert_eq!(freqs[2], 660.0);
    }

    #[test]
    fn test_drone_ignores_base() {
        for base in [100.0, 261.63, 880.0] {
            let drones: Vec<f32> = VOICES[3..].iter().map(|v| v.pitch.frequency(base)).collect();
            assert_eq!(drones, vec![130.81, 196.0, 261.63]);
        }
    }

    #[test]
    fn test_modulators_target_existing_voices() {
        for m in MODULATORS {
            assert!(VOICES.iter().any(|v| v.role == m.target));
        }
        assert_eq!(GENERATOR_COUNT, 8);
    }

    #[test]
    fn test_fade_fits_in_teardown() {
        assert!(FADE_OUT_TIME_CONSTANT * 3.0 <= TEARDOWN / 2.0 + 1e-9);
        assert!((master_level(1.0) - 0.35).abs() < 1e-6);
    }
}
