//! Audio graph - oscillator and gain nodes rendered sample by sample
//!
//! The graph is a generational arena of nodes. Connections run from a
//! source node to one of:
//! - another node's audio input
//! - one of another node's parameters (modulation, summed with the
//!   parameter's automation value)
//! - the graph output
//!
//! Rendering pulls every node connected to the output once per frame,
//! recursing through its inputs with per-frame memoization.
//!
//! ## Oscillator lifecycle
//!
//! An oscillator is silent until its scheduled start time and silent again
//! from its scheduled stop time on. Start and stop are applied on exact
//! frame boundaries by the renderer, never by the control thread.

use thiserror::Error;

use super::param::AudioParam;
use super::waveform::Waveform;

/// Errors reported by graph operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("Node {0:?} has no {1:?} parameter")]
    NoSuchParam(NodeId, ParamKind),

    #[error("Node {0:?} is not an oscillator")]
    NotAnOscillator(NodeId),

    #[error("Oscillator {0:?} was already started")]
    AlreadyStarted(NodeId),

    #[error("Oscillator {0:?} was never started")]
    NotStarted(NodeId),

    #[error("Oscillator {0:?} has already stopped")]
    AlreadyStopped(NodeId),
}

/// Handle to a node in the graph
///
/// The generation makes handles to removed nodes detectably stale even
/// after their slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Automatable parameters a node can expose
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Oscillator frequency in Hz
    Frequency,
    /// Gain multiplier
    Gain,
}

/// Where a connection delivers its signal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    /// The graph output (the speakers)
    Output,
    /// Another node's audio input
    Node(NodeId),
    /// One of another node's parameters
    Param(NodeId, ParamKind),
}

/// Where an oscillator is in its lifetime at a given time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OscillatorState {
    /// `start()` has not been called
    Unscheduled,
    /// Start time is in the future
    Scheduled,
    /// Producing output
    Playing,
    /// Stop time has passed
    Stopped,
}

/// A parameter plus the nodes modulating it
#[derive(Clone, Debug, Default)]
struct ParamSlot {
    param: AudioParam,
    inputs: Vec<NodeId>,
}

impl ParamSlot {
    fn new(value: f32) -> Self {
        Self {
            param: AudioParam::new(value),
            inputs: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Oscillator {
    waveform: Waveform,
    frequency: ParamSlot,
    /// Phase in cycles (0.0 to 1.0)
    phase: f64,
    start_at: Option<f64>,
    stop_at: Option<f64>,
}

impl Oscillator {
    fn state(&self, time: f64) -> OscillatorState {
        match (self.start_at, self.stop_at) {
            (None, _) => OscillatorState::Unscheduled,
            (Some(_), Some(stop)) if time >= stop => OscillatorState::Stopped,
            (Some(start), _) if time < start => OscillatorState::Scheduled,
            _ => OscillatorState::Playing,
        }
    }
}

#[derive(Debug)]
struct Gain {
    gain: ParamSlot,
}

#[derive(Debug)]
enum NodeKind {
    Oscillator(Oscillator),
    Gain(Gain),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    /// Nodes feeding this node's audio input
    inputs: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The audio processing graph
#[derive(Debug)]
pub struct Graph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Nodes connected to the output
    outputs: Vec<NodeId>,
    sample_rate: f64,
    /// Frames rendered so far
    frame: u64,
    /// Per-frame memo of node outputs, indexed like `slots`
    memo: Vec<Option<f32>>,
    /// Cycle guard for the pull recursion
    visiting: Vec<bool>,
}

impl Graph {
    /// Create an empty graph at the given sample rate
    pub fn new(sample_rate: f64) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            outputs: Vec::new(),
            sample_rate,
            frame: 0,
            memo: Vec::new(),
            visiting: Vec::new(),
        }
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current time in seconds (frames rendered / sample rate)
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let node = Node {
            kind,
            inputs: Vec::new(),
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            self.memo.push(None);
            self.visiting.push(false);
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Add an oscillator, unstarted
    pub fn add_oscillator(&mut self, waveform: Waveform, frequency: f32) -> NodeId {
        self.insert(NodeKind::Oscillator(Oscillator {
            waveform,
            frequency: ParamSlot::new(frequency),
            phase: 0.0,
            start_at: None,
            stop_at: None,
        }))
    }

    /// Add a gain node
    pub fn add_gain(&mut self, gain: f32) -> NodeId {
        self.insert(NodeKind::Gain(Gain {
            gain: ParamSlot::new(gain),
        }))
    }

    fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
            .ok_or(GraphError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(GraphError::UnknownNode(id))
    }

    fn oscillator_mut(&mut self, id: NodeId) -> Result<&mut Oscillator, GraphError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Oscillator(osc) => Ok(osc),
            NodeKind::Gain(_) => Err(GraphError::NotAnOscillator(id)),
        }
    }

    fn param_slot_mut(&mut self, id: NodeId, kind: ParamKind) -> Result<&mut ParamSlot, GraphError> {
        match (&mut self.node_mut(id)?.kind, kind) {
            (NodeKind::Oscillator(osc), ParamKind::Frequency) => Ok(&mut osc.frequency),
            (NodeKind::Gain(g), ParamKind::Gain) => Ok(&mut g.gain),
            _ => Err(GraphError::NoSuchParam(id, kind)),
        }
    }

    /// Whether `id` refers to a live node
    #[cfg(test)]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    /// Route `source` into `destination`
    pub fn connect(&mut self, source: NodeId, destination: Destination) -> Result<(), GraphError> {
        self.node(source)?;
        match destination {
            Destination::Output => self.outputs.push(source),
            Destination::Node(target) => self.node_mut(target)?.inputs.push(source),
            Destination::Param(target, kind) => self.param_slot_mut(target, kind)?.inputs.push(source),
        }
        Ok(())
    }

    /// Mutable access to a node parameter for scheduling automation
    pub fn param_mut(&mut self, id: NodeId, kind: ParamKind) -> Result<&mut AudioParam, GraphError> {
        Ok(&mut self.param_slot_mut(id, kind)?.param)
    }

    /// Automation value of a parameter at `time`, excluding modulation inputs
    pub fn param_value(&self, id: NodeId, kind: ParamKind, time: f64) -> Result<f32, GraphError> {
        match (&self.node(id)?.kind, kind) {
            (NodeKind::Oscillator(osc), ParamKind::Frequency) => Ok(osc.frequency.param.value_at(time)),
            (NodeKind::Gain(g), ParamKind::Gain) => Ok(g.gain.param.value_at(time)),
            _ => Err(GraphError::NoSuchParam(id, kind)),
        }
    }

    /// Schedule an oscillator to start at `when`
    pub fn start(&mut self, id: NodeId, when: f64) -> Result<(), GraphError> {
        let osc = self.oscillator_mut(id)?;
        if osc.start_at.is_some() {
            return Err(GraphError::AlreadyStarted(id));
        }
        osc.start_at = Some(when);
        Ok(())
    }

    /// Schedule an oscillator to stop at `when`
    ///
    /// A stop already scheduled earlier than `when` is kept.
    pub fn stop(&mut self, id: NodeId, when: f64) -> Result<(), GraphError> {
        let now = self.current_time();
        let osc = self.oscillator_mut(id)?;
        match osc.state(now) {
            OscillatorState::Unscheduled => Err(GraphError::NotStarted(id)),
            OscillatorState::Stopped => Err(GraphError::AlreadyStopped(id)),
            OscillatorState::Scheduled | OscillatorState::Playing => {
                let when = when.max(now);
                osc.stop_at = Some(osc.stop_at.map_or(when, |s| s.min(when)));
                Ok(())
            }
        }
    }

    /// Lifecycle state of an oscillator at the current time
    #[cfg(test)]
    pub fn oscillator_state(&self, id: NodeId) -> Result<OscillatorState, GraphError> {
        match &self.node(id)?.kind {
            NodeKind::Oscillator(osc) => Ok(osc.state(self.current_time())),
            NodeKind::Gain(_) => Err(GraphError::NotAnOscillator(id)),
        }
    }

    /// Number of oscillators producing output at the current time
    pub fn playing_oscillators(&self) -> usize {
        let now = self.current_time();
        self.slots
            .iter()
            .filter_map(|s| s.node.as_ref())
            .filter(|n| matches!(&n.kind, NodeKind::Oscillator(o) if o.state(now) == OscillatorState::Playing))
            .count()
    }

    /// Remove a node and every connection that mentions it
    pub fn remove(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.node(id)?;
        let slot = &mut self.slots[id.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        self.outputs.retain(|&n| n != id);
        for node in self.slots.iter_mut().filter_map(|s| s.node.as_mut()) {
            node.inputs.retain(|&n| n != id);
            match &mut node.kind {
                NodeKind::Oscillator(osc) => osc.frequency.inputs.retain(|&n| n != id),
                NodeKind::Gain(g) => g.gain.inputs.retain(|&n| n != id),
            }
        }
        Ok(())
    }

    /// Output of one node at the current frame
    fn pull(&mut self, id: NodeId, time: f64) -> f32 {
        let index = id.index as usize;
        if let Some(value) = self.memo.get(index).copied().flatten() {
            return value;
        }
        if self.node(id).is_err() || self.visiting[index] {
            return 0.0;
        }
        self.visiting[index] = true;

        let input = self.sum_inputs(index, time, false);
        let modulation = self.sum_inputs(index, time, true);

        let sample_rate = self.sample_rate;
        let value = match self.slots[index].node.as_mut().map(|n| &mut n.kind) {
            Some(NodeKind::Oscillator(osc)) => {
                if osc.state(time) == OscillatorState::Playing {
                    let out = osc.waveform.sample(osc.phase);
                    let freq = (osc.frequency.param.value_at(time) + modulation) as f64;
                    osc.phase = (osc.phase + freq / sample_rate).rem_euclid(1.0);
                    out
                } else {
                    0.0
                }
            }
            Some(NodeKind::Gain(g)) => input * (g.gain.param.value_at(time) + modulation),
            None => 0.0,
        };

        self.visiting[index] = false;
        self.memo[index] = Some(value);
        value
    }

    /// Sum the outputs of the nodes feeding a node's audio input or its parameter
    fn sum_inputs(&mut self, index: usize, time: f64, param: bool) -> f32 {
        let mut total = 0.0;
        let mut k = 0;
        loop {
            let source = self.slots[index].node.as_ref().and_then(|n| {
                let list = match (&n.kind, param) {
                    (_, false) => &n.inputs,
                    (NodeKind::Oscillator(osc), true) => &osc.frequency.inputs,
                    (NodeKind::Gain(g), true) => &g.gain.inputs,
                };
                list.get(k).copied()
            });
            let Some(source) = source else { break };
            total += self.pull(source, time);
            k += 1;
        }
        total
    }

    /// Render one mono frame and advance the clock
    pub fn next_sample(&mut self) -> f32 {
        let time = self.current_time();
        self.memo.iter_mut().for_each(|m| *m = None);

        let mut sample = 0.0;
        for k in 0..self.outputs.len() {
            let id = self.outputs[k];
            sample += self.pull(id, time);
        }

        self.frame += 1;
        sample
    }

    /// Render consecutive mono frames into `out`
    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
        self.compact();
    }

    /// Fold elapsed automation so parameter timelines stay short
    fn compact(&mut self) {
        let now = self.current_time();
        for node in self.slots.iter_mut().filter_map(|s| s.node.as_mut()) {
            match &mut node.kind {
                NodeKind::Oscillator(osc) => osc.frequency.param.compact(now),
                NodeKind::Gain(g) => g.gain.param.compact(now),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f64 = 1000.0;

    #[test]
    fn test_unstarted_oscillator_is_silent() {
        let mut graph = Graph::new(RATE);
        let osc = graph.add_oscillator(Waveform::Square, 10.0);
        graph.connect(osc, Destination::Output).unwrap();

        let mut out = vec![1.0; 16];
        graph.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(graph.oscillator_state(osc).unwrap(), OscillatorState::Unscheduled);
    }

    #[test]
    fn test_start_and_stop_are_frame_accurate() {
        let mut graph = Graph::new(RATE);
        let osc = graph.add_oscillator(Waveform::Square, 10.0);
        graph.connect(osc, Destination::Output).unwrap();
        graph.start(osc, 0.005).unwrap();
        graph.stop(osc, 0.010).unwrap();

        let mut out = vec![0.0; 20];
        graph.render(&mut out);
        assert!(out[..5].iter().all(|&s| s == 0.0));
        assert!(out[5..10].iter().all(|&s| s == 1.0));
        assert!(out[10..].iter().all(|&s| s == 0.0));
        assert_eq!(graph.oscillator_state(osc).unwrap(), OscillatorState::Stopped);
    }

    #[test]
    fn test_stop_errors() {
        let mut graph = Graph::new(RATE);
        let osc = graph.add_oscillator(Waveform::Sine, 10.0);
        assert_eq!(graph.stop(osc, 0.0), Err(GraphError::NotStarted(osc)));

        graph.start(osc, 0.0).unwrap();
        assert_eq!(graph.start(osc, 0.0), Err(GraphError::AlreadyStarted(osc)));
        graph.stop(osc, 0.0).unwrap();
        assert_eq!(graph.stop(osc, 0.0), Err(GraphError::AlreadyStopped(osc)));
    }

    #[test]
    fn test_later_stop_does_not_extend() {
        let mut graph = Graph::new(RATE);
        let osc = graph.add_oscillator(Waveform::Square, 10.0);
        graph.connect(osc, Destination::Output).unwrap();
        graph.start(osc, 0.0).unwrap();
        graph.stop(osc, 0.002).unwrap();
        graph.stop(osc, 0.5).unwrap();

        let mut out = vec![0.0; 4];
        graph.render(&mut out);
        assert_eq!(out, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_gain_scales_input() {
        let mut graph = Graph::new(RATE);
        let osc = graph.add_oscillator(Waveform::Square, 10.0);
        let gain = graph.add_gain(0.25);
        graph.connect(osc, Destination::Node(gain)).unwrap();
        graph.connect(gain, Destination::Output).unwrap();
        graph.start(osc, 0.0).unwrap();

        let mut out = vec![0.0; 4];
        graph.render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_param_modulation_is_summed() {
        let mut graph = Graph::new(RATE);
        // A constant "modulator": square at 0 Hz outputs 1.0 forever
        let lfo = graph.add_oscillator(Waveform::Square, 0.0);
        let depth = graph.add_gain(0.5);
        let carrier = graph.add_oscillator(Waveform::Square, 1.0);
        let vca = graph.add_gain(1.0);

        graph.connect(lfo, Destination::Node(depth)).unwrap();
        graph.connect(depth, Destination::Param(vca, ParamKind::Gain)).unwrap();
        graph.connect(carrier, Destination::Node(vca)).unwrap();
        graph.connect(vca, Destination::Output).unwrap();
        graph.start(lfo, 0.0).unwrap();
        graph.start(carrier, 0.0).unwrap();

        // Gain is 1.0 intrinsic + 0.5 modulation
        let s = graph.next_sample();
        assert!((s - 1.5).abs() < 1e-6);
        assert_eq!(graph.playing_oscillators(), 2);
    }

    #[test]
    fn test_remove_invalidates_handle() {
        let mut graph = Graph::new(RATE);
        let osc = graph.add_oscillator(Waveform::Sine, 10.0);
        graph.connect(osc, Destination::Output).unwrap();
        graph.remove(osc).unwrap();

        assert!(!graph.contains(osc));
        assert_eq!(graph.len(), 0);
        assert_eq!(graph.remove(osc), Err(GraphError::UnknownNode(osc)));

        // The slot is reused with a new generation
        let again = graph.add_gain(1.0);
        assert_ne!(again, osc);
        assert!(graph.contains(again));
        assert_eq!(graph.next_sample(), 0.0);
    }

    #[test]
    fn test_param_errors() {
        let mut graph = Graph::new(RATE);
        let gain = graph.add_gain(1.0);
        assert_eq!(
            graph.param_value(gain, ParamKind::Frequency, 0.0),
            Err(GraphError::NoSuchParam(gain, ParamKind::Frequency))
        );
        assert_eq!(graph.start(gain, 0.0), Err(GraphError::NotAnOscillator(gain)));
    }
}
