//! Voices: ephemeral signal chains attached to the rendering context.
//!
//! A voice is `source -> [low-pass] -> gain envelope [x LFO] -> output`. Call sites
//! describe one with [`VoiceBuilder`] and get back a [`VoiceHandle`], which is a
//! snapshot of the schedule, not a reference to the live voice. The renderer owns
//! the voice and drops it once its stop time has passed.

use crate::context::RenderContext;
use crate::dsp::{LowpassFilter, NoiseBuffer, NoiseSource, Oscillator, Waveform};
use crate::error::{OutbreakAudioError, Result};
use crate::param::AudioParam;

/// Lightweight, copyable identifier of a scheduled voice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub(crate) u64);

impl VoiceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VoiceId({})", self.0)
    }
}

/// What produces the raw signal of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceKind {
    /// Periodic generator, self-releasing
    Tonal,
    /// White noise, self-releasing
    Noise,
    /// Long-lived periodic generator owned by the score
    Drone,
}

#[derive(Debug, Clone)]
enum VoiceSource {
    Periodic(Oscillator),
    Noise(NoiseSource),
}

impl VoiceSource {
    fn next_sample(&mut self) -> f64 {
        match self {
            Self::Periodic(osc) => osc.next_sample(),
            Self::Noise(noise) => noise.next_sample(),
        }
    }
}

/// Slow amplitude modulation: `gain * (1 + depth * lfo)`.
#[derive(Debug, Clone)]
struct GainModulation {
    lfo: Oscillator,
    depth: f32,
}

/// A voice as owned by the renderer.
#[derive(Debug)]
pub struct Voice {
    id: VoiceId,
    kind: VoiceKind,
    source: VoiceSource,
    filter: Option<(LowpassFilter, AudioParam)>,
    gain: AudioParam,
    modulation: Option<GainModulation>,
    start_time: f64,
    stop_time: f64,
    started: bool,
}

impl Voice {
    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn kind(&self) -> VoiceKind {
        self.kind
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn stop_time(&self) -> f64 {
        self.stop_time
    }

    /// Produce the voice's contribution at context time `time`.
    pub(crate) fn render_sample(&mut self, time: f64) -> f32 {
        if time < self.start_time || time >= self.stop_time {
            return 0.0;
        }

        let raw = self.source.next_sample();
        let filtered = match &mut self.filter {
            Some((filter, cutoff)) => {
                filter.set_cutoff(cutoff.value_at(time) as f64);
                filter.process(raw)
            }
            None => raw,
        };

        let mut gain = self.gain.value_at(time);
        if let Some(modulation) = &mut self.modulation {
            gain *= 1.0 + modulation.depth * modulation.lfo.next_sample() as f32;
        }

        filtered as f32 * gain
    }

    /// Returns true exactly once, the first time `time` reaches the start time.
    pub(crate) fn mark_started(&mut self, time: f64) -> bool {
        if !self.started && time >= self.start_time {
            self.started = true;
            return true;
        }
        false
    }

    pub(crate) fn has_started(&self) -> bool {
        self.started
    }

    pub(crate) fn is_expired(&self, time: f64) -> bool {
        time >= self.stop_time
    }

    /// Hold the current level at `now`, ramp linearly to silence, then stop.
    pub(crate) fn fade_out(&mut self, now: f64, fade: f64) {
        let end = now + fade.max(0.0);
        self.gain
            .cancel_and_hold_at_time(now)
            .linear_ramp_to_value_at_time(0.0, end);
        self.stop_time = self.stop_time.min(end);
    }

    pub(crate) fn release(&mut self, now: f64) {
        self.stop_time = self.stop_time.min(now);
    }
}

#[derive(Debug, Clone)]
enum SourceDesc {
    Periodic { waveform: Waveform, frequency: f32 },
    Noise(NoiseBuffer),
}

/// Describes the topology and schedule of one voice.
#[derive(Debug, Clone)]
pub struct VoiceBuilder {
    kind: VoiceKind,
    source: SourceDesc,
    cutoff: Option<AudioParam>,
    gain: AudioParam,
    modulation: Option<(f32, f32)>,
    start_time: f64,
    stop_time: f64,
}

impl VoiceBuilder {
    pub fn periodic(waveform: Waveform, frequency: f32) -> Self {
        Self::with_source(VoiceKind::Tonal, SourceDesc::Periodic { waveform, frequency })
    }

    pub fn noise(buffer: NoiseBuffer) -> Self {
        Self::with_source(VoiceKind::Noise, SourceDesc::Noise(buffer))
    }

    fn with_source(kind: VoiceKind, source: SourceDesc) -> Self {
        Self {
            kind,
            source,
            cutoff: None,
            gain: AudioParam::new(1.0),
            modulation: None,
            start_time: 0.0,
            stop_time: f64::INFINITY,
        }
    }

    pub fn kind(mut self, kind: VoiceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Route the source through a low-pass filter driven by `cutoff` (Hz).
    pub fn lowpass(mut self, cutoff: AudioParam) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn gain(mut self, gain: AudioParam) -> Self {
        self.gain = gain;
        self
    }

    /// Modulate the gain with a sine LFO at `rate_hz`.
    pub fn gain_lfo(mut self, rate_hz: f32, depth: f32) -> Self {
        self.modulation = Some((rate_hz, depth));
        self
    }

    pub fn start_at(mut self, time: f64) -> Self {
        self.start_time = time;
        self
    }

    pub fn stop_at(mut self, time: f64) -> Self {
        self.stop_time = time;
        self
    }

    /// Time at which the gain envelope stops changing.
    pub fn envelope_end(&self) -> f64 {
        self.gain
            .end_time()
            .map_or(self.start_time, |end| end.max(self.start_time))
    }

    /// Hand the voice to the renderer.
    ///
    /// Fails when the stop time does not come strictly after the envelope end,
    /// or when the context can no longer accept voices.
    pub fn schedule(self, ctx: &RenderContext) -> Result<VoiceHandle> {
        let envelope_end = self.envelope_end();
        if self.stop_time <= envelope_end {
            return Err(OutbreakAudioError::InvalidAutomation(format!(
                "voice stops at {:.3}s before its envelope ends at {:.3}s",
                self.stop_time, envelope_end
            )));
        }

        let id = ctx.allocate_voice_id()?;
        let sample_rate = ctx.sample_rate() as f64;

        let handle = VoiceHandle {
            id,
            kind: self.kind,
            start_time: self.start_time,
            envelope_end,
            stop_time: self.stop_time,
            gain: self.gain.clone(),
            cutoff: self.cutoff.clone(),
        };

        let source = match self.source {
            SourceDesc::Periodic { waveform, frequency } => {
                VoiceSource::Periodic(Oscillator::new(waveform, frequency as f64, sample_rate))
            }
            SourceDesc::Noise(buffer) => VoiceSource::Noise(NoiseSource::new(buffer)),
        };
        let filter = self.cutoff.map(|cutoff| {
            let initial = cutoff.value_at(self.start_time) as f64;
            (LowpassFilter::new(initial, sample_rate), cutoff)
        });
        let modulation = self.modulation.map(|(rate, depth)| GainModulation {
            lfo: Oscillator::new(Waveform::Sine, rate as f64, sample_rate),
            depth,
        });

        ctx.submit(Voice {
            id,
            kind: self.kind,
            source,
            filter,
            gain: self.gain,
            modulation,
            start_time: self.start_time,
            stop_time: self.stop_time,
            started: false,
        })?;

        log::debug!(
            "Scheduled {:?} voice {} [{:.3}s .. {:.3}s]",
            handle.kind,
            handle.id,
            handle.start_time,
            handle.stop_time
        );
        Ok(handle)
    }
}

/// Receipt for a scheduled voice.
#[derive(Debug, Clone)]
pub struct VoiceHandle {
    id: VoiceId,
    kind: VoiceKind,
    start_time: f64,
    envelope_end: f64,
    stop_time: f64,
    gain: AudioParam,
    cutoff: Option<AudioParam>,
}

impl VoiceHandle {
    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn kind(&self) -> VoiceKind {
        self.kind
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn envelope_end(&self) -> f64 {
        self.envelope_end
    }

    pub fn stop_time(&self) -> f64 {
        self.stop_time
    }

    /// Scheduled gain envelope (before LFO modulation).
    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }

    /// Scheduled filter cutoff, if the voice is filtered.
    pub fn cutoff(&self) -> Option<&AudioParam> {
        self.cutoff.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(builder: VoiceBuilder) -> Voice {
        let SourceDesc::Periodic { waveform, frequency } = builder.source else {
            panic!("periodic voice expected");
        };
        Voice {
            id: VoiceId(1),
            kind: builder.kind,
            source: VoiceSource::Periodic(Oscillator::new(waveform, frequency as f64, 1000.0)),
            filter: None,
            gain: builder.gain,
            modulation: None,
            start_time: builder.start_time,
            stop_time: builder.stop_time,
            started: false,
        }
    }

    #[test]
    fn silent_outside_its_window() {
        let mut v = voice(
            VoiceBuilder::periodic(Waveform::Triangle, 100.0)
                .start_at(1.0)
                .stop_at(2.0),
        );
        assert_eq!(v.render_sample(0.5), 0.0);
        // triangle starts at its trough
        assert_eq!(v.render_sample(1.0), -1.0);
        assert_eq!(v.render_sample(2.0), 0.0);
        assert!(v.is_expired(2.0));
    }

    #[test]
    fn mark_started_fires_once() {
        let mut v = voice(VoiceBuilder::periodic(Waveform::Sine, 100.0).start_at(0.5));
        assert!(!v.mark_started(0.4));
        assert!(v.mark_started(0.5));
        assert!(!v.mark_started(0.6));
        assert!(v.has_started());
    }

    #[test]
    fn fade_out_ramps_to_silence_then_stops() {
        let mut gain = AudioParam::new(0.0);
        gain.set_value_at_time(0.5, 0.0);
        let mut v = voice(VoiceBuilder::periodic(Waveform::Sine, 100.0).gain(gain));
        v.fade_out(2.0, 1.0);
        assert_eq!(v.stop_time(), 3.0);
        assert!((v.gain.value_at(2.5) - 0.25).abs() < 1e-6);
        assert!(v.is_expired(3.0));
    }

    #[test]
    fn fade_never_extends_lifetime() {
        let mut v = voice(
            VoiceBuilder::periodic(Waveform::Sine, 100.0)
                .start_at(0.0)
                .stop_at(1.2),
        );
        v.fade_out(1.0, 1.0);
        assert_eq!(v.stop_time(), 1.2);
        v.release(1.1);
        assert_eq!(v.stop_time(), 1.1);
    }

    #[test]
    fn envelope_end_follows_gain_automation() {
        let mut gain = AudioParam::new(0.0);
        gain.set_value_at_time(0.2, 1.0);
        gain.exponential_ramp_to_value_at_time(0.01, 1.5).unwrap();
        let builder = VoiceBuilder::periodic(Waveform::Sine, 440.0)
            .gain(gain)
            .start_at(1.0);
        assert_eq!(builder.envelope_end(), 1.5);
    }
}
