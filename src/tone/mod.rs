//! Tone module - the synthesized raaga drone
//!
//! This module provides:
//! - The fixed voice/modulator table and timing constants
//! - `PlaybackSession`: one drone graph and its lifecycle
//! - `ToneEngine`: play / pause / volume / raaga switching

mod engine;
mod session;
mod voices;

pub use engine::{EngineStats, ToneEngine};
