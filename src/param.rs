//! Scheduled parameter automation.
//!
//! An [`AudioParam`] is a timeline of value changes against the context clock
//! (seconds). Callers never write samples, they schedule where a value should
//! be at a future time and the renderer evaluates the curve per frame.

use crate::error::{OutbreakAudioError, Result};

/// Shape of the curve that ends at an automation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Automation {
    /// Jump to the value at the event time
    SetValue,
    /// Straight line from the previous event
    LinearRamp,
    /// Constant-ratio curve from the previous event
    ExponentialRamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ParamEvent {
    kind: Automation,
    value: f32,
    time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    default_value: f32,
    events: Vec<ParamEvent>,
}

impl AudioParam {
    pub fn new(default_value: f32) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    pub fn default_value(&self) -> f32 {
        self.default_value
    }

    pub fn is_constant(&self) -> bool {
        self.events.is_empty()
    }

    /// Time of the last scheduled event, if any.
    pub fn end_time(&self) -> Option<f64> {
        self.events.last().map(|e| e.time)
    }

    /// Kind of the event that finishes at or after `time`, if any.
    pub fn automation_at(&self, time: f64) -> Option<Automation> {
        let idx = self.events.partition_point(|e| e.time < time);
        self.events.get(idx).map(|e| e.kind)
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) -> &mut Self {
        self.insert(ParamEvent {
            kind: Automation::SetValue,
            value,
            time,
        });
        self
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) -> &mut Self {
        self.insert(ParamEvent {
            kind: Automation::LinearRamp,
            value,
            time,
        });
        self
    }

    /// Schedule an exponential approach to `value`.
    ///
    /// Both the target and the value the ramp starts from must be non-zero and
    /// of the same sign; a ramp to exactly zero is rejected.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f32, time: f64) -> Result<&mut Self> {
        let from = self.value_before(time);
        if value == 0.0 || from == 0.0 || value.signum() != from.signum() {
            return Err(OutbreakAudioError::InvalidAutomation(format!(
                "exponential ramp from {} to {} at {:.3}s",
                from, value, time
            )));
        }
        self.insert(ParamEvent {
            kind: Automation::ExponentialRamp,
            value,
            time,
        });
        Ok(self)
    }

    /// Drop every event at or after `time` and pin the curve to the value it
    /// had at that instant.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) -> &mut Self {
        let held = self.value_at(time);
        self.events.retain(|e| e.time < time);
        self.set_value_at_time(held, time)
    }

    /// Evaluate the curve at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let idx = self.events.partition_point(|e| e.time <= time);
        let (from_value, from_time) = match idx.checked_sub(1) {
            Some(prev) => (self.events[prev].value, self.events[prev].time),
            None => (self.default_value, 0.0),
        };

        let Some(next) = self.events.get(idx) else {
            return from_value;
        };

        let span = next.time - from_time;
        if span <= 0.0 {
            return from_value;
        }
        let progress = ((time - from_time) / span).clamp(0.0, 1.0);

        match next.kind {
            Automation::SetValue => from_value,
            Automation::LinearRamp => {
                from_value + (next.value - from_value) * progress as f32
            }
            Automation::ExponentialRamp => {
                if from_value * next.value <= 0.0 {
                    return from_value;
                }
                let ratio = (next.value / from_value) as f64;
                (from_value as f64 * ratio.powf(progress)) as f32
            }
        }
    }

    fn value_before(&self, time: f64) -> f32 {
        let idx = self.events.partition_point(|e| e.time <= time);
        match idx.checked_sub(1) {
            Some(prev) => self.events[prev].value,
            None => self.default_value,
        }
    }

    fn insert(&mut self, event: ParamEvent) {
        let idx = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(idx, event);
    }
}
