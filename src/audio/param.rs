//! Automatable parameters
//!
//! An `AudioParam` holds a timeline of scheduled changes that the render
//! thread evaluates sample by sample. The control side never writes a value
//! directly; it schedules events against the context clock and the renderer
//! applies them sample-accurately.
//!
//! ## Automation events
//!
//! - `SetValue`: jump to a value at a time
//! - `LinearRamp`: interpolate from the previous event to a value, ending at a time
//! - `SetTarget`: exponentially approach a target from a start time with a time constant
//!
//! Fully elapsed events are folded into a base value by `compact()` so the
//! timeline stays short for the audio thread.

use std::collections::VecDeque;

/// A single scheduled change
#[derive(Clone, Copy, Debug, PartialEq)]
enum Event {
    SetValue { time: f64, value: f32 },
    LinearRamp { time: f64, value: f32 },
    SetTarget { time: f64, target: f32, time_constant: f64 },
}

impl Event {
    fn time(&self) -> f64 {
        match *self {
            Event::SetValue { time, .. }
            | Event::LinearRamp { time, .. }
            | Event::SetTarget { time, .. } => time,
        }
    }
}

/// Value reached after approaching `target` from `from` for `elapsed` seconds
fn approach(from: f32, target: f32, elapsed: f64, time_constant: f64) -> f32 {
    if time_constant <= 0.0 {
        return target;
    }
    let remaining = (-elapsed.max(0.0) / time_constant).exp() as f32;
    target + (from - target) * remaining
}

/// A parameter driven by scheduled automation
#[derive(Clone, Debug)]
pub struct AudioParam {
    /// Time at which `base_value` became current
    base_time: f64,
    /// Value in effect before the first pending event
    base_value: f32,
    /// Pending events, sorted by time
    events: VecDeque<Event>,
}

impl AudioParam {
    /// Create a parameter holding a constant value
    pub fn new(value: f32) -> Self {
        Self {
            base_time: 0.0,
            base_value: value,
            events: VecDeque::new(),
        }
    }

    fn insert(&mut self, event: Event) {
        // Events at the same time keep insertion order
        let pos = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(pos, event);
    }

    /// Jump to `value` at `time`
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::SetValue { time, value });
    }

    /// Ramp linearly from the previous event so that `value` is reached at `time`
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::LinearRamp { time, value });
    }

    /// Starting at `time`, approach `target` exponentially
    ///
    /// After one `time_constant` the remaining distance is ~37%, after three
    /// it is ~5%.
    pub fn set_target_at_time(&mut self, target: f32, time: f64, time_constant: f64) {
        self.insert(Event::SetTarget {
            time,
            target,
            time_constant,
        });
    }

    /// Freeze the curve at its value at `time` and drop everything after it
    ///
    /// A ramp still in progress at `time` is cut short, so new automation
    /// continues from wherever the parameter actually is.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.value_at(time);
        self.events.retain(|e| e.time() < time);
        self.insert(Event::SetValue { time, value: held });
    }

    /// Evaluate the automation curve at `time`
    pub fn value_at(&self, time: f64) -> f32 {
        let mut prev_time = self.base_time;
        let mut prev_value = self.base_value;

        for (i, event) in self.events.iter().enumerate() {
            match *event {
                Event::SetValue { time: at, value } => {
                    if time < at {
                        return prev_value;
                    }
                    prev_time = at;
                    prev_value = value;
                }
                Event::LinearRamp { time: end, value } => {
                    if time < end {
                        let span = end - prev_time;
                        if span <= 0.0 {
                            return value;
                        }
                        let frac = ((time - prev_time) / span).clamp(0.0, 1.0) as f32;
                        return prev_value + (value - prev_value) * frac;
                    }
                    prev_time = end;
                    prev_value = value;
                }
                Event::SetTarget {
                    time: start,
                    target,
                    time_constant,
                } => {
                    if time < start {
                        return prev_value;
                    }
                    // A target approach runs until the next event begins
                    match self.events.get(i + 1).map(Event::time) {
                        Some(next) if time >= next => {
                            prev_value = approach(prev_value, target, next - start, time_constant);
                            prev_time = next;
                        }
                        _ => return approach(prev_value, target, time - start, time_constant),
                    }
                }
            }
        }

        prev_value
    }

    /// Fold events that are entirely in the past (relative to `time`) into
    /// the base value
    pub fn compact(&mut self, time: f64) {
        while let Some(&first) = self.events.front() {
            let next_time = self.events.get(1).map(Event::time);
            let (end, end_value) = match first {
                Event::SetValue { time: at, value } | Event::LinearRamp { time: at, value } => {
                    (at, value)
                }
                Event::SetTarget {
                    time: start,
                    target,
                    time_constant,
                } => match next_time {
                    Some(next) => (
                        next,
                        approach(self.base_value, target, next - start, time_constant),
                    ),
                    // The last target approach never finishes
                    None => break,
                },
            };
            if end > time {
                break;
            }
            self.base_time = end;
            self.base_value = end_value;
            self.events.pop_front();
        }
    }

    /// Number of events still pending
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.events.len()
    }
}

impl Default for AudioParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}
