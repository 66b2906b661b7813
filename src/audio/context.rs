//! Audio context - owns the graph and the output stream
//!
//! The context is the single real-time processing resource of the player.
//! The control thread schedules changes on the graph through `graph()`;
//! the cpal callback renders it. Time is counted in rendered frames, so it
//! stands still while the context is suspended.
//!
//! ## Autoplay gating
//!
//! Under `AutoplayPolicy::RequireGesture` a context refuses to `resume()`
//! until `grant_activation()` has been called from a user interaction.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::buffer::MonitorBuffer;
use super::graph::Graph;

/// How often to push samples to the monitor buffer
/// (every Nth sample to keep the scope cheap)
const MONITOR_DECIMATION: usize = 4;

/// Errors that can occur while opening or resuming a context
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No output device found")]
    NoDevice,

    #[error("Failed to get output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("Failed to build stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("Failed to start stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("Audio output is waiting for a user gesture")]
    NotAllowed,

    #[error("Audio context is closed")]
    Closed,
}

/// Whether audio may start without a user interaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutoplayPolicy {
    /// Output may start at any time
    Allowed,
    /// Output starts only after a user gesture has been recorded
    #[default]
    RequireGesture,
}

/// Lifecycle of a context
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    /// Created but not producing output; time does not advance
    Suspended,
    /// Rendering
    Running,
    /// Released for good
    Closed,
}

/// Where a context sends its output
#[derive(Clone)]
pub enum Backend {
    /// The default cpal output device
    Device {
        /// Optional tap of the rendered output for visualization
        monitor: Option<MonitorBuffer>,
    },
    /// No device; frames are rendered on demand with `AudioContext::render()`
    #[cfg(test)]
    Offline { sample_rate: f64 },
}

/// State shared with the render callback
struct Shared {
    graph: Mutex<Graph>,
    running: AtomicBool,
    monitor: Option<MonitorBuffer>,
}

impl Shared {
    /// Render mono frames into `out`
    ///
    /// Returns `false` (leaving `out` untouched) when the context is not
    /// running.
    fn render(&self, out: &mut [f32]) -> bool {
        if !self.running.load(Ordering::Relaxed) {
            return false;
        }

        // Never skip a block; the control thread only holds the lock
        // while scheduling
        let mut graph = match self.graph.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        graph.render(out);
        drop(graph);

        if let Some(monitor) = &self.monitor {
            monitor.push_samples(out.iter().step_by(MONITOR_DECIMATION).copied());
        }
        true
    }
}

/// Write one callback buffer for any sample format
fn write_output<T: Sample + FromSample<f32>>(
    data: &mut [T],
    channels: usize,
    shared: &Shared,
    scratch: &mut Vec<f32>,
) {
    let channels = channels.max(1);
    let frames = data.len() / channels;
    scratch.resize(frames, 0.0);

    if !shared.render(scratch) {
        // Suspended or closed
        for sample in data.iter_mut() {
            *sample = T::EQUILIBRIUM;
        }
        return;
    }

    // Same mono signal on every channel
    for (frame, &value) in data.chunks_mut(channels).zip(scratch.iter()) {
        for ch in frame.iter_mut() {
            *ch = T::from_sample(value);
        }
    }
}

/// Build an output stream for sample type `T`
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: &Arc<Shared>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let shared = Arc::clone(shared);
    let mut scratch = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            write_output(data, channels, &shared, &mut scratch);
        },
        |err| log::error!("Audio stream error: {}", err),
        None,
    )
}

/// The real-time processing context
pub struct AudioContext {
    shared: Arc<Shared>,
    /// The audio output stream (kept alive to continue playback)
    stream: Option<cpal::Stream>,
    state: ContextState,
    policy: AutoplayPolicy,
    activated: bool,
}

impl AudioContext {
    /// Open a context on the given backend, initially suspended
    pub fn open(backend: &Backend, policy: AutoplayPolicy) -> Result<Self, AudioError> {
        match backend {
            Backend::Device { monitor } => Self::open_device(monitor.clone(), policy),
            #[cfg(test)]
            Backend::Offline { sample_rate } => Ok(Self::with_stream(
                Graph::new(*sample_rate),
                None,
                None,
                policy,
            )),
        }
    }

    fn with_stream(
        graph: Graph,
        stream: Option<cpal::Stream>,
        monitor: Option<MonitorBuffer>,
        policy: AutoplayPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                graph: Mutex::new(graph),
                running: AtomicBool::new(false),
                monitor,
            }),
            stream,
            state: ContextState::Suspended,
            policy,
            activated: false,
        }
    }

    fn open_device(monitor: Option<MonitorBuffer>, policy: AutoplayPolicy) -> Result<Self, AudioError> {
        log::info!("Opening audio output...");

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", device_name);

        let config = device.default_output_config()?;
        log::info!("Audio config: {:?}", config);

        let sample_rate = config.sample_rate().0 as f64;
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();

        // The stream needs the shared state before it exists, so build the
        // context first and attach the stream afterwards
        let mut context = Self::with_stream(Graph::new(sample_rate), None, monitor, policy);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, &context.shared)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, &context.shared)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, &context.shared)?,
            format => return Err(AudioError::UnsupportedFormat(format)),
        };
        context.stream = Some(stream);

        log::info!("Audio context ready at {} Hz ({:?})", sample_rate, sample_format);
        Ok(context)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Record a user gesture for the autoplay gate
    pub fn grant_activation(&mut self) {
        self.activated = true;
    }

    /// Start (or continue) producing output
    pub fn resume(&mut self) -> Result<(), AudioError> {
        match self.state {
            ContextState::Closed => return Err(AudioError::Closed),
            ContextState::Running => return Ok(()),
            ContextState::Suspended => {}
        }

        if self.policy == AutoplayPolicy::RequireGesture && !self.activated {
            return Err(AudioError::NotAllowed);
        }

        if let Some(stream) = &self.stream {
            stream.play()?;
        }
        self.shared.running.store(true, Ordering::Relaxed);
        self.state = ContextState::Running;
        log::debug!("Audio context running");
        Ok(())
    }

    /// Release the output stream; the context cannot be resumed afterwards
    pub fn close(&mut self) {
        if self.state == ContextState::Closed {
            return;
        }
        self.shared.running.store(false, Ordering::Relaxed);
        self.stream = None;
        self.state = ContextState::Closed;
        log::info!("Audio context closed");
    }

    /// Lock the graph for scheduling
    ///
    /// The render callback waits for this lock, so keep the guard only for
    /// as long as it takes to schedule.
    pub fn graph(&self) -> MutexGuard<'_, Graph> {
        match self.shared.graph.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current context time in seconds
    #[cfg(test)]
    pub fn current_time(&self) -> f64 {
        self.graph().current_time()
    }

    /// Render `frames` mono frames without a device
    ///
    /// Returns silence (and leaves the clock alone) unless the context is
    /// running.
    #[cfg(test)]
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.shared.render(&mut out);
        out
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Destination, Waveform};

    fn offline(policy: AutoplayPolicy) -> AudioContext {
        AudioContext::open(&Backend::Offline { sample_rate: 1000.0 }, policy).unwrap()
    }

    #[test]
    fn test_starts_suspended_and_time_stands_still() {
        let ctx = offline(AutoplayPolicy::Allowed);
        assert_eq!(ctx.state(), ContextState::Suspended);

        ctx.render(100);
        assert_eq!(ctx.current_time(), 0.0);
    }

    #[test]
    fn test_gesture_gate() {
        let mut ctx = offline(AutoplayPolicy::RequireGesture);
        assert!(matches!(ctx.resume(), Err(AudioError::NotAllowed)));
        assert_eq!(ctx.state(), ContextState::Suspended);

        ctx.grant_activation();
        ctx.resume().unwrap();
        assert_eq!(ctx.state(), ContextState::Running);

        ctx.render(500);
        assert!((ctx.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_renders_graph_output() {
        let mut ctx = offline(AutoplayPolicy::Allowed);
        ctx.resume().unwrap();
        {
            let mut graph = ctx.graph();
            let osc = graph.add_oscillator(Waveform::Square, 1.0);
            graph.connect(osc, Destination::Output).unwrap();
            graph.start(osc, 0.0).unwrap();
        }
        let out = ctx.render(10);
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_close_is_final() {
        let mut ctx = offline(AutoplayPolicy::Allowed);
        ctx.resume().unwrap();
        ctx.close();
        ctx.close();
        assert_eq!(ctx.state(), ContextState::Closed);
        assert!(matches!(ctx.resume(), Err(AudioError::Closed)));

        // Closed contexts render nothing
        ctx.render(10);
        assert_eq!(ctx.current_time(), 0.0);
    }

    /// Running shared state with a full-scale square on the output
    fn square_shared(monitor: Option<MonitorBuffer>) -> Shared {
        let shared = Shared {
            graph: Mutex::new(Graph::new(1000.0)),
            running: AtomicBool::new(true),
            monitor,
        };
        {
            let mut graph = shared.graph.lock().unwrap();
            let osc = graph.add_oscillator(Waveform::Square, 1.0);
            graph.connect(osc, Destination::Output).unwrap();
            graph.start(osc, 0.0).unwrap();
        }
        shared
    }

    #[test]
    fn test_monitor_tap_receives_output() {
        let monitor = MonitorBuffer::new(8);
        let shared = square_shared(Some(monitor.clone()));
        let mut out = vec![0.0; 8];
        assert!(shared.render(&mut out));
        // 8 frames at decimation 4 leave two samples
        assert_eq!(monitor.recent(2), vec![1.0, 1.0]);
    }

    #[test]
    fn test_contended_graph_still_renders() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let shared = Arc::new(square_shared(None));
        let (locked_tx, locked_rx) = mpsc::channel();

        let holder = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let _graph = shared.graph.lock().unwrap();
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(20));
            })
        };
        locked_rx.recv().unwrap();

        // Waits for the control thread instead of writing silence
        let mut data = vec![0.0f32; 8];
        let mut scratch = Vec::new();
        write_output(&mut data, 2, &shared, &mut scratch);
        holder.join().unwrap();

        assert!(data.iter().all(|&s| s == 1.0));
        assert!((shared.graph.lock().unwrap().current_time() - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_write_output_channel_layouts() {
        let shared = square_shared(None);
        let mut scratch = Vec::new();

        let mut stereo = vec![0.0f32; 6];
        write_output(&mut stereo, 2, &shared, &mut scratch);
        assert_eq!(stereo, vec![1.0; 6]);

        // A zero channel count is treated as mono
        let mut mono = vec![0.0f32; 3];
        write_output(&mut mono, 0, &shared, &mut scratch);
        assert_eq!(mono, vec![1.0; 3]);

        // Not running: silence
        shared.running.store(false, Ordering::Relaxed);
        let mut silent = vec![1.0f32; 4];
        write_output(&mut silent, 2, &shared, &mut scratch);
        assert_eq!(silent, vec![0.0; 4]);
    }
}
