//! Tone engine - transport and lifecycle for the drone
//!
//! The engine owns the audio context (opened lazily on the first `play()`)
//! and at most one live `PlaybackSession`. Pausing moves the live session
//! to a retiring list where it fades out on its own schedule; `poll()`
//! releases retiring sessions once their generators have stopped.
//!
//! ## Session replacement
//!
//! A new session never starts before every retiring session has stopped:
//! its start time is derived from the latest tracked `stop_at` plus
//! `SWITCH_GAP`. Switching raagas while playing therefore always goes
//! fade-out, silence, fade-in, with no overlapping graphs.
//!
//! None of the operations block or fail loudly. Anything that keeps the
//! drone from starting leaves `is_playing()` false and is reported through
//! the log and `status`.

use crate::audio::{AudioContext, AudioError, AutoplayPolicy, Backend, ContextState, ParamKind};
use crate::raaga::RaagaDescriptor;

use super::session::{PlaybackSession, SessionState};
use super::voices::{master_level, VoiceRole, SWITCH_GAP};

/// Volume before the user touches the slider
pub const DEFAULT_VOLUME: f32 = 0.5;

/// Engine snapshot shown in the UI
#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    /// `None` until the first play
    pub context_state: Option<ContextState>,
    /// Context time in seconds
    pub time: f64,
    pub sample_rate: f64,
    pub nodes: usize,
    pub playing_oscillators: usize,
    pub retiring: usize,
    pub session_state: Option<SessionState>,
    /// Master gain right now
    pub level: Option<f32>,
    /// Main voice frequency including vibrato
    pub main_frequency: Option<f32>,
}

/// Drone player
pub struct ToneEngine {
    backend: Backend,
    policy: AutoplayPolicy,
    /// A user gesture has been seen
    activated: bool,

    /// Created on first play, closed on dispose
    context: Option<AudioContext>,
    /// The session currently sounding (or about to)
    session: Option<PlaybackSession>,
    /// Sessions fading out
    retiring: Vec<PlaybackSession>,

    current_raaga: Option<RaagaDescriptor>,
    volume: f32,
    /// Volume to restore when unmuting
    unmuted_volume: f32,
    is_playing: bool,

    /// Status message
    pub status: String,
}

impl ToneEngine {
    /// Create an engine; no audio resources are acquired until `play()`
    pub fn new(backend: Backend, policy: AutoplayPolicy) -> Self {
        Self {
            backend,
            policy,
            activated: false,
            context: None,
            session: None,
            retiring: Vec::new(),
            current_raaga: None,
            volume: DEFAULT_VOLUME,
            unmuted_volume: DEFAULT_VOLUME,
            is_playing: false,
            status: "Ready".to_string(),
        }
    }

    /// Check if the drone is playing (or about to start)
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// The selected raaga
    pub fn current_raaga(&self) -> Option<&RaagaDescriptor> {
        self.current_raaga.as_ref()
    }

    /// UI volume (0.0 to 1.0)
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Record a user interaction for the autoplay gate
    pub fn grant_user_activation(&mut self) {
        self.activated = true;
        if let Some(context) = self.context.as_mut() {
            context.grant_activation();
        }
    }

    /// Open the context if needed and make sure it is running
    fn ensure_context(&mut self) -> Result<(), AudioError> {
        let context = match self.context.take() {
            Some(context) if context.state() != ContextState::Closed => context,
            _ => AudioContext::open(&self.backend, self.policy)?,
        };
        let context = self.context.insert(context);
        if self.activated {
            context.grant_activation();
        }
        context.resume()
    }

    /// Select a raaga
    ///
    /// While playing, the current session fades out and a session for the
    /// new raaga starts once it has stopped.
    pub fn load_raaga(&mut self, raaga: RaagaDescriptor) {
        self.poll();
        log::info!("Loading {} ({} Hz)", raaga.name, raaga.base_frequency);

        let was_playing = self.session.is_some();
        self.current_raaga = Some(raaga);

        if was_playing {
            self.pause();
            self.play();
        } else {
            self.status = format!("Selected: {}", self.describe_current());
        }
    }

    /// Start the drone for the current raaga
    pub fn play(&mut self) {
        self.poll();

        let Some(raaga) = self.current_raaga.clone() else {
            log::debug!("play() with no raaga loaded");
            self.status = "Select a raaga first".to_string();
            return;
        };
        if self.session.is_some() {
            log::debug!("play() while already playing");
            return;
        }

        let volume = self.volume;
        let pending_stop = self
            .retiring
            .iter()
            .filter_map(PlaybackSession::stop_at)
            .reduce(f64::max);

        if let Err(e) = self.ensure_context() {
            log::warn!("Audio not started: {}", e);
            self.status = format!("Audio unavailable: {}", e);
            return;
        }
        let Some(context) = self.context.as_ref() else {
            return;
        };

        let started = {
            let mut graph = context.graph();
            let now = graph.current_time();
            let start_at = pending_stop.map_or(now, |stop| now.max(stop + SWITCH_GAP));

            PlaybackSession::launch(&mut graph, &raaga, volume, start_at)
        };

        match started {
            Ok(session) => {
                log::info!(
                    "Playing {} from {:.3}s at {:.0}% volume",
                    raaga.name,
                    session.start_at(),
                    volume * 100.0
                );
                self.session = Some(session);
                self.is_playing = true;
                self.status = format!("Playing: {}", self.describe_current());
            }
            Err(e) => {
                log::warn!("Failed to build drone graph: {}", e);
                self.status = format!("Audio error: {}", e);
            }
        }
    }

    /// Fade out and stop the drone
    ///
    /// `is_playing()` turns false immediately; the fade completes in the
    /// background. Calling this with nothing playing does nothing.
    pub fn pause(&mut self) {
        self.poll();
        self.is_playing = false;

        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Some(context) = &self.context {
            let mut graph = context.graph();
            let now = graph.current_time();
            let stop_at = session.fade_out(&mut graph, now);
            log::debug!("Session '{}' fading out, stops at {:.3}s", session.raaga_id(), stop_at);
        }
        self.retiring.push(session);
        self.status = "Paused".to_string();
    }

    /// Toggle playback state
    pub fn toggle_play_pause(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Set the UI volume
    ///
    /// Values are clamped to 0.0..=1.0; NaN and infinities are ignored. A
    /// live session glides to the new level instead of stepping.
    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_finite() {
            log::warn!("Ignoring non-finite volume {}", volume);
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;
        if volume > 0.0 {
            self.unmuted_volume = volume;
        }

        if let (Some(session), Some(context)) = (self.session.as_mut(), self.context.as_ref()) {
            let mut graph = context.graph();
            let now = graph.current_time();
            if let Err(e) = session.set_level(&mut graph, master_level(volume), now) {
                log::warn!("Failed to change volume: {}", e);
            }
        }
    }

    /// Mute, or restore the volume from before muting
    pub fn toggle_mute(&mut self) {
        if self.volume == 0.0 {
            self.set_volume(self.unmuted_volume);
        } else {
            self.set_volume(0.0);
        }
    }

    /// Release sessions whose fade-out has finished
    ///
    /// Call once per UI frame.
    pub fn poll(&mut self) {
        let Some(context) = &self.context else {
            self.retiring.clear();
            return;
        };
        if self.retiring.is_empty() {
            return;
        }

        let mut graph = context.graph();
        let now = graph.current_time();
        self.retiring.retain_mut(|session| {
            if session.is_finished(now) {
                session.release(&mut graph);
                false
            } else {
                true
            }
        });
    }

    /// Stop everything immediately and close the audio context
    ///
    /// Safe to call with nothing playing and safe to call twice. A later
    /// `play()` opens a fresh context.
    pub fn dispose(&mut self) {
        self.halt_all();
        let Some(mut context) = self.context.take() else {
            return;
        };
        context.close();
        self.status = "Stopped".to_string();
        log::info!("Tone engine disposed");
    }

    /// Silence and release every session, live or retiring
    ///
    /// Generators that already stopped on their own are skipped.
    fn halt_all(&mut self) {
        self.is_playing = false;
        let sessions: Vec<PlaybackSession> = self.session.take().into_iter().chain(self.retiring.drain(..)).collect();

        let Some(context) = &self.context else {
            return;
        };
        let mut graph = context.graph();
        let now = graph.current_time();
        for mut session in sessions {
            session.halt(&mut graph, now);
            session.release(&mut graph);
        }
    }

    /// Snapshot of the engine for the diagnostics panel
    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats {
            retiring: self.retiring.len(),
            ..EngineStats::default()
        };
        let Some(context) = &self.context else {
            return stats;
        };
        stats.context_state = Some(context.state());

        let graph = context.graph();
        let now = graph.current_time();
        stats.time = now;
        stats.sample_rate = graph.sample_rate();
        stats.nodes = graph.len();
        stats.playing_oscillators = graph.playing_oscillators();

        if let Some(session) = &self.session {
            stats.session_state = Some(session.state());
            stats.level = graph.param_value(session.master(), ParamKind::Gain, now).ok();
            stats.main_frequency = session
                .voice(VoiceRole::Main)
                .and_then(|voice| graph.param_value(voice.oscillator, ParamKind::Frequency, now).ok());
        }
        stats
    }

    fn describe_current(&self) -> String {
        match &self.current_raaga {
            Some(raaga) => format!("{} ({} Hz)", raaga.name, raaga.base_frequency),
            None => "None".to_string(),
        }
    }
}

impl Drop for ToneEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
