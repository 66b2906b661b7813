//! Render module - UI components for visualization
//!
//! This module provides:
//! - Time-domain waveform scope for the drone output

mod scope;

pub use scope::Scope;
