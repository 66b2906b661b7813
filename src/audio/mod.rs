//! Audio module - the processing graph and its output
//!
//! This module provides:
//! - Automatable parameters with sample-accurate scheduling
//! - An oscillator/gain graph rendered sample by sample
//! - The audio context wrapping the graph and the cpal stream
//! - A monitor buffer for visualizing the output

mod buffer;
mod context;
mod graph;
mod param;
mod waveform;

// Re-export public types
pub use buffer::MonitorBuffer;
pub use context::{AudioContext, AudioError, AutoplayPolicy, Backend, ContextState};
#[allow(unused_imports)]
pub use graph::{Destination, Graph, GraphError, NodeId, OscillatorState, ParamKind};
pub use waveform::Waveform;
