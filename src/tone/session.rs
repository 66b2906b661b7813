//! Playback session - one complete drone graph
//!
//! A session owns the nodes it adds to the graph and walks an explicit
//! state machine:
//!
//! ```text
//! Constructed --start()--> Started --fade_out()--> FadingOut --release()--> Stopped
//! ```
//!
//! All oscillator start/stop times are scheduled on the graph, so the audio
//! thread applies them on exact frames; the session only tracks when its
//! teardown completes.

use crate::audio::{Destination, Graph, GraphError, NodeId, ParamKind, Waveform};
use crate::raaga::RaagaDescriptor;

use super::voices::{
    master_level, VoiceRole, ATTACK, FADE_OUT_TIME_CONSTANT, MODULATORS, TEARDOWN, VOICES,
    VOLUME_TIME_CONSTANT,
};

/// Where a session is in its lifetime
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionState {
    /// Nodes exist, nothing scheduled to sound
    Constructed,
    /// Generators scheduled to start at `start_at`
    Started,
    /// Master fading; generators stop at `stop_at`
    FadingOut { stop_at: f64 },
    /// Nodes released from the graph
    Stopped,
}

/// An audible voice: oscillator into its own gain
#[derive(Clone, Copy, Debug)]
pub struct Voice {
    pub role: VoiceRole,
    pub oscillator: NodeId,
    pub gain: NodeId,
}

/// An LFO and the gain setting its depth
#[derive(Clone, Copy, Debug)]
struct Modulator {
    oscillator: NodeId,
    depth: NodeId,
}

/// The live node set for one raaga
#[derive(Debug)]
pub struct PlaybackSession {
    raaga_id: String,
    voices: Vec<Voice>,
    modulators: Vec<Modulator>,
    master: NodeId,
    start_at: f64,
    state: SessionState,
}

/// Stop an oscillator, tolerating ones that already stopped
fn stop_quietly(graph: &mut Graph, id: NodeId, when: f64) {
    match graph.stop(id, when) {
        Ok(()) => {}
        Err(GraphError::AlreadyStopped(_)) | Err(GraphError::NotStarted(_)) => {
            log::debug!("Oscillator {:?} already stopped", id);
        }
        Err(e) => log::warn!("Failed to stop oscillator: {}", e),
    }
}

impl PlaybackSession {
    /// Add the drone graph for `raaga` to `graph`
    ///
    /// The master gain sits at zero until `start_at` and then ramps linearly
    /// to the level for `volume` over `ATTACK` seconds. Nothing sounds until
    /// `start()` schedules the generators.
    pub fn build(
        graph: &mut Graph,
        raaga: &RaagaDescriptor,
        volume: f32,
        start_at: f64,
    ) -> Result<Self, GraphError> {
        let mut created = Vec::new();
        let result = Self::build_nodes(graph, raaga, volume, start_at, &mut created);
        if result.is_err() {
            // Leave nothing half-built behind
            for id in created {
                let _ = graph.remove(id);
            }
        }
        result
    }

    fn build_nodes(
        graph: &mut Graph,
        raaga: &RaagaDescriptor,
        volume: f32,
        start_at: f64,
        created: &mut Vec<NodeId>,
    ) -> Result<Self, GraphError> {
        let master = graph.add_gain(0.0);
        created.push(master);
        schedule_attack(graph, master, master_level(volume), start_at)?;
        graph.connect(master, Destination::Output)?;

        let mut voices = Vec::with_capacity(VOICES.len());
        for entry in VOICES {
            let oscillator = graph.add_oscillator(Waveform::Sine, entry.pitch.frequency(raaga.base_frequency));
            created.push(oscillator);
            let gain = graph.add_gain(entry.level);
            created.push(gain);

            graph.connect(oscillator, Destination::Node(gain))?;
            graph.connect(gain, Destination::Node(master))?;
            voices.push(Voice {
                role: entry.role,
                oscillator,
                gain,
            });
        }

        let mut modulators = Vec::with_capacity(MODULATORS.len());
        for entry in MODULATORS {
            let oscillator = graph.add_oscillator(Waveform::Sine, entry.rate);
            created.push(oscillator);
            let depth = graph.add_gain(entry.depth);
            created.push(depth);

            let voice = voices
                .iter()
                .find(|v| v.role == entry.target)
                .ok_or(GraphError::UnknownNode(oscillator))?;
            let target = match entry.param {
                ParamKind::Frequency => voice.oscillator,
                ParamKind::Gain => voice.gain,
            };

            graph.connect(oscillator, Destination::Node(depth))?;
            graph.connect(depth, Destination::Param(target, entry.param))?;
            modulators.push(Modulator { oscillator, depth });
        }

        log::debug!(
            "Built session for '{}': {} voices, {} modulators, start at {:.3}s",
            raaga.id,
            voices.len(),
            modulators.len(),
            start_at
        );

        Ok(Self {
            raaga_id: raaga.id.clone(),
            voices,
            modulators,
            master,
            start_at,
            state: SessionState::Constructed,
        })
    }

    /// Build and start in one step
    ///
    /// If scheduling fails the nodes are removed again.
    pub fn launch(
        graph: &mut Graph,
        raaga: &RaagaDescriptor,
        volume: f32,
        start_at: f64,
    ) -> Result<Self, GraphError> {
        let mut session = Self::build(graph, raaga, volume, start_at)?;
        if let Err(e) = session.start(graph) {
            session.release(graph);
            return Err(e);
        }
        Ok(session)
    }

    /// Schedule every generator to start at the session's start time
    pub fn start(&mut self, graph: &mut Graph) -> Result<(), GraphError> {
        if self.state != SessionState::Constructed {
            return Ok(());
        }
        for id in self.generators() {
            graph.start(id, self.start_at)?;
        }
        self.state = SessionState::Started;
        Ok(())
    }

    /// Retarget the master gain
    ///
    /// Before the session is audible the attack ramp is rescheduled to end
    /// on the new level; afterwards the level glides there from wherever it
    /// currently is.
    pub fn set_level(&mut self, graph: &mut Graph, level: f32, now: f64) -> Result<(), GraphError> {
        if !matches!(self.state, SessionState::Constructed | SessionState::Started) {
            return Ok(());
        }
        if now < self.start_at {
            return schedule_attack(graph, self.master, level, self.start_at);
        }
        let gain = graph.param_mut(self.master, ParamKind::Gain)?;
        gain.cancel_and_hold_at_time(now);
        gain.set_target_at_time(level, now, VOLUME_TIME_CONSTANT);
        Ok(())
    }

    /// Fade the master to silence and schedule the generators to stop
    ///
    /// Returns the time at which the last generator stops.
    pub fn fade_out(&mut self, graph: &mut Graph, now: f64) -> f64 {
        if let SessionState::FadingOut { stop_at } = self.state {
            return stop_at;
        }

        match graph.param_mut(self.master, ParamKind::Gain) {
            Ok(gain) => {
                gain.cancel_and_hold_at_time(now);
                gain.set_target_at_time(0.0, now, FADE_OUT_TIME_CONSTANT);
            }
            Err(e) => log::warn!("Failed to fade session '{}': {}", self.raaga_id, e),
        }

        let stop_at = now + TEARDOWN;
        for id in self.generators() {
            stop_quietly(graph, id, stop_at);
        }
        self.state = SessionState::FadingOut { stop_at };
        stop_at
    }

    /// Stop every generator right now, skipping the fade
    pub fn halt(&mut self, graph: &mut Graph, now: f64) {
        for id in self.generators() {
            stop_quietly(graph, id, now);
        }
        if self.state != SessionState::Stopped {
            self.state = SessionState::FadingOut { stop_at: now };
        }
    }

    /// Whether the teardown has completed by `now`
    pub fn is_finished(&self, now: f64) -> bool {
        match self.state {
            SessionState::FadingOut { stop_at } => now >= stop_at,
            SessionState::Stopped => true,
            _ => false,
        }
    }

    /// Remove every node this session added
    pub fn release(&mut self, graph: &mut Graph) {
        if self.state == SessionState::Stopped {
            return;
        }
        for id in self.nodes() {
            if let Err(e) = graph.remove(id) {
                log::debug!("Node already gone: {}", e);
            }
        }
        self.state = SessionState::Stopped;
        log::debug!("Released session for '{}'", self.raaga_id);
    }

    /// All oscillators: voices then modulators
    pub fn generators(&self) -> Vec<NodeId> {
        self.voices
            .iter()
            .map(|v| v.oscillator)
            .chain(self.modulators.iter().map(|m| m.oscillator))
            .collect()
    }

    fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = vec![self.master];
        for voice in &self.voices {
            nodes.push(voice.oscillator);
            nodes.push(voice.gain);
        }
        for modulator in &self.modulators {
            nodes.push(modulator.oscillator);
            nodes.push(modulator.depth);
        }
        nodes
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Scheduled teardown completion, once fading
    pub fn stop_at(&self) -> Option<f64> {
        match self.state {
            SessionState::FadingOut { stop_at } => Some(stop_at),
            _ => None,
        }
    }

    pub fn start_at(&self) -> f64 {
        self.start_at
    }

    pub fn raaga_id(&self) -> &str {
        &self.raaga_id
    }

    pub fn master(&self) -> NodeId {
        self.master
    }

    /// The voice playing `role`
    pub fn voice(&self, role: VoiceRole) -> Option<&Voice> {
        self.voices.iter().find(|v| v.role == role)
    }
}

/// Silence at `start_at`, then a linear ramp to `level` over `ATTACK`
fn schedule_attack(graph: &mut Graph, master: NodeId, level: f32, start_at: f64) -> Result<(), GraphError> {
    let gain = graph.param_mut(master, ParamKind::Gain)?;
    gain.cancel_and_hold_at_time(start_at);
    gain.set_value_at_time(0.0, start_at);
    gain.linear_ramp_to_value_at_time(level, start_at + ATTACK);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OscillatorState;
    use crate::tone::voices::GENERATOR_COUNT;

    const RATE: f64 = 1000.0;

    fn raaga(hz: f32) -> RaagaDescriptor {
        RaagaDescriptor::new("test", "Test", hz).unwrap()
    }

    fn advance(graph: &mut Graph, seconds: f64) {
        let mut out = vec![0.0; (seconds * RATE).round() as usize];
        graph.render(&mut out);
    }

    #[test]
    fn test_build_wires_all_nodes() {
        let mut graph = Graph::new(RATE);
        let session = PlaybackSession::build(&mut graph, &raaga(440.0), 0.5, 0.0).unwrap();

        // master + 6 voices * 2 + 2 modulators * 2
        assert_eq!(graph.len(), 1 + 12 + 4);
        assert_eq!(session.generators().len(), GENERATOR_COUNT);
        assert_eq!(session.state(), SessionState::Constructed);

        let main = session.voice(VoiceRole::Main).unwrap();
        assert_eq!(graph.param_value(main.oscillator, ParamKind::Frequency, 0.0).unwrap(), 440.0);
        let swell = session.voice(VoiceRole::DroneSa).unwrap();
        assert!((graph.param_value(swell.gain, ParamKind::Gain, 0.0).unwrap() - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_start_schedules_every_generator() {
        let mut graph = Graph::new(RATE);
        let mut session = PlaybackSession::build(&mut graph, &raaga(261.63), 1.0, 0.1).unwrap();
        session.start(&mut graph).unwrap();
        assert_eq!(session.state(), SessionState::Started);

        for id in session.generators() {
            assert_eq!(graph.oscillator_state(id).unwrap(), OscillatorState::Scheduled);
        }
        advance(&mut graph, 0.1);
        assert_eq!(graph.playing_oscillators(), GENERATOR_COUNT);
    }

    #[test]
    fn test_launch_builds_and_starts() {
        let mut graph = Graph::new(RATE);
        let session = PlaybackSession::launch(&mut graph, &raaga(440.0), 0.5, 0.0).unwrap();
        assert_eq!(session.state(), SessionState::Started);

        advance(&mut graph, 0.01);
        assert_eq!(graph.playing_oscillators(), GENERATOR_COUNT);
    }

    #[test]
    fn test_attack_ramp() {
        let mut graph = Graph::new(RATE);
        let session = PlaybackSession::build(&mut graph, &raaga(440.0), 0.8, 1.0).unwrap();
        let level = |t| graph.param_value(session.master(), ParamKind::Gain, t).unwrap();

        assert_eq!(level(0.5), 0.0);
        assert_eq!(level(1.0), 0.0);
        assert!((level(2.0) - 0.8 * 0.35 / 2.0).abs() < 1e-5);
        assert!((level(3.0) - 0.8 * 0.35).abs() < 1e-5);
    }

    #[test]
    fn test_fade_out_then_release() {
        let mut graph = Graph::new(RATE);
        let mut session = PlaybackSession::build(&mut graph, &raaga(440.0), 1.0, 0.0).unwrap();
        session.start(&mut graph).unwrap();
        advance(&mut graph, 2.5);

        let now = graph.current_time();
        let stop_at = session.fade_out(&mut graph, now);
        assert!((stop_at - (now + TEARDOWN)).abs() < 1e-9);
        assert!(!session.is_finished(now));

        // Mostly silent after 150 ms
        let level = graph.param_value(session.master(), ParamKind::Gain, now + 0.15).unwrap();
        assert!(level < 0.35 * 0.06);

        advance(&mut graph, TEARDOWN);
        assert!(session.is_finished(graph.current_time()));
        for id in session.generators() {
            assert_eq!(graph.oscillator_state(id).unwrap(), OscillatorState::Stopped);
        }

        session.release(&mut graph);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_fade_out_is_idempotent() {
        let mut graph = Graph::new(RATE);
        let mut session = PlaybackSession::build(&mut graph, &raaga(440.0), 1.0, 0.0).unwrap();
        session.start(&mut graph).unwrap();
        let first = session.fade_out(&mut graph, 0.0);
        advance(&mut graph, 0.1);
        assert_eq!(session.fade_out(&mut graph, 0.1), first);
    }

    #[test]
    fn test_level_change_before_start_reschedules_attack() {
        let mut graph = Graph::new(RATE);
        let mut session = PlaybackSession::build(&mut graph, &raaga(440.0), 1.0, 0.5).unwrap();
        session.set_level(&mut graph, 0.1, 0.0).unwrap();

        let level = graph.param_value(session.master(), ParamKind::Gain, 0.5 + ATTACK).unwrap();
        assert!((level - 0.1).abs() < 1e-6);
    }
}
