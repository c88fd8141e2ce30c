//! Configuration for the audio engine

use crate::dsp::oscillator::Waveform;
use crate::error::{OutbreakAudioError, Result};
use std::time::Duration;

/// Descriptor for the rendering context and the services built on it.
#[derive(Debug, Clone)]
pub struct AudioEngineDesc {
    /// Requested sample rate. A device that refuses it plays at its default.
    pub sample_rate: u32,
    /// Frames per device callback or offline block
    pub block_size: usize,
    /// Number of output channels (voices are mono and copied to every channel)
    pub channels: u16,
    /// Maximum number of concurrently active voices
    pub max_voices: usize,
    /// Minimum spacing between two realized weapon events
    pub weapon_rate_limit: Duration,
    /// Background score settings
    pub score: ScoreConfig,
}

impl Default for AudioEngineDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            channels: 2,
            max_voices: 64,
            weapon_rate_limit: Duration::from_millis(50),
            score: ScoreConfig::default(),
        }
    }
}

impl AudioEngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn max_voices(mut self, max: usize) -> Self {
        self.max_voices = max;
        self
    }

    pub fn weapon_rate_limit(mut self, limit: Duration) -> Self {
        self.weapon_rate_limit = limit;
        self
    }

    pub fn score(mut self, score: ScoreConfig) -> Self {
        self.score = score;
        self
    }

    /// Reject descriptors that cannot drive a context.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(OutbreakAudioError::Configuration(
                "sample rate must be non-zero".into(),
            ));
        }
        if self.channels == 0 {
            return Err(OutbreakAudioError::Configuration(
                "channel count must be non-zero".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(OutbreakAudioError::Configuration(
                "block size must be non-zero".into(),
            ));
        }
        if self.max_voices == 0 {
            return Err(OutbreakAudioError::Configuration(
                "max_voices must be non-zero".into(),
            ));
        }
        self.score.validate()
    }
}

/// Tonal voice parameters used by the sequencer for melodic notes and stingers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteVoice {
    pub waveform: Waveform,
    pub frequency: f32,
    pub duration: f64,
    pub amplitude: f32,
}

/// Settings for the background score: drone bed, step clock and stingers.
#[derive(Debug, Clone)]
pub struct ScoreConfig {
    /// One drone voice is created per frequency
    pub drone_frequencies: Vec<f32>,
    pub drone_cutoff_hz: f32,
    pub drone_level: f32,
    pub lfo_rate_hz: f32,
    /// Relative LFO swing around `drone_level` (1.0 swings between 0 and twice the level)
    pub lfo_depth: f32,
    pub step_period: Duration,
    /// Repeating pitch sequence; `None` steps are silent
    pub pattern: Vec<Option<f32>>,
    pub note_waveform: Waveform,
    pub note_duration: f64,
    pub note_amplitude: f32,
    pub stinger: NoteVoice,
    pub stinger_probability: f64,
    pub fade_out: Duration,
    /// Fixed RNG seed for reproducible stingers (None seeds from entropy)
    pub seed: Option<u64>,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            drone_frequencies: vec![55.0, 58.0],
            drone_cutoff_hz: 120.0,
            drone_level: 0.05,
            lfo_rate_hz: 0.1,
            lfo_depth: 1.0,
            step_period: Duration::from_millis(500),
            pattern: vec![
                Some(110.0),
                None,
                Some(110.0),
                None,
                Some(130.0),
                None,
                Some(103.0),
                None,
            ],
            note_waveform: Waveform::Triangle,
            note_duration: 0.3,
            note_amplitude: 0.05,
            stinger: NoteVoice {
                waveform: Waveform::Sine,
                frequency: 880.0,
                duration: 1.0,
                amplitude: 0.02,
            },
            stinger_probability: 0.1,
            fade_out: Duration::from_secs(1),
            seed: None,
        }
    }
}

impl ScoreConfig {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn stinger_probability(mut self, probability: f64) -> Self {
        self.stinger_probability = probability;
        self
    }

    pub fn step_period(mut self, period: Duration) -> Self {
        self.step_period = period;
        self
    }

    pub fn drone_count(&self) -> usize {
        self.drone_frequencies.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.drone_frequencies.is_empty() {
            return Err(OutbreakAudioError::Configuration(
                "score needs at least one drone".into(),
            ));
        }
        if self.pattern.is_empty() {
            return Err(OutbreakAudioError::Configuration(
                "score pattern is empty".into(),
            ));
        }
        if self.step_period.is_zero() {
            return Err(OutbreakAudioError::Configuration(
                "score step period must be non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.stinger_probability) {
            return Err(OutbreakAudioError::Configuration(format!(
                "stinger probability {} outside [0, 1]",
                self.stinger_probability
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_desc_is_valid() {
        let desc = AudioEngineDesc::default();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.weapon_rate_limit, Duration::from_millis(50));
        assert_eq!(desc.score.drone_count(), 2);
    }

    #[test]
    fn builder_setters_apply() {
        let desc = AudioEngineDesc::new()
            .sample_rate(44100)
            .channels(1)
            .max_voices(8)
            .weapon_rate_limit(Duration::from_millis(20));
        assert_eq!(desc.sample_rate, 44100);
        assert_eq!(desc.channels, 1);
        assert_eq!(desc.max_voices, 8);
        assert_eq!(desc.weapon_rate_limit, Duration::from_millis(20));
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let desc = AudioEngineDesc::new().sample_rate(0);
        assert!(matches!(
            desc.validate(),
            Err(OutbreakAudioError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_bad_stinger_probability() {
        let score = ScoreConfig::default().stinger_probability(1.5);
        assert!(score.validate().is_err());
    }

    #[test]
    fn rejects_empty_pattern() {
        let score = ScoreConfig {
            pattern: Vec::new(),
            ..Default::default()
        };
        assert!(score.validate().is_err());
    }
}
