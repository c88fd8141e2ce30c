//! Band-limited periodic generators.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Triangle => "triangle",
            Self::Square => "square",
            Self::Sawtooth => "sawtooth",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Waveform {
    type Err = crate::error::OutbreakAudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sine" => Ok(Self::Sine),
            "triangle" => Ok(Self::Triangle),
            "square" => Ok(Self::Square),
            "sawtooth" | "saw" => Ok(Self::Sawtooth),
            other => Err(crate::error::OutbreakAudioError::Configuration(format!(
                "unknown waveform '{}'",
                other
            ))),
        }
    }
}

/// A periodic generator with PolyBLEP anti-aliasing on the discontinuous shapes.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    frequency: f64,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        Self {
            waveform,
            frequency,
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    fn phase_inc(&self) -> f64 {
        self.frequency / self.sample_rate
    }

    /// Generate the next sample in [-1, 1] (PolyBLEP may overshoot slightly).
    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc();
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => 2.0 * self.phase - 1.0 - poly_blep(self.phase, inc),
            Waveform::Square => {
                let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
                value += poly_blep(self.phase, inc);
                value -= poly_blep((self.phase + 0.5) % 1.0, inc);
                value
            }
            // continuous, no correction needed
            Waveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Polynomial band-limited step correction around a wrap at phase 0.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_starts_at_zero() {
        let mut osc = Oscillator::new(Waveform::Sine, 440.0, 48000.0);
        assert!(osc.next_sample().abs() < 1e-10);
    }

    #[test]
    fn shapes_stay_in_range() {
        for waveform in [
            Waveform::Sine,
            Waveform::Triangle,
            Waveform::Square,
            Waveform::Sawtooth,
        ] {
            let mut osc = Oscillator::new(waveform, 440.0, 48000.0);
            for _ in 0..48000 {
                let s = osc.next_sample();
                assert!((-1.5..=1.5).contains(&s), "{waveform} out of range: {s}");
            }
        }
    }

    #[test]
    fn triangle_peaks_mid_cycle() {
        // 1 Hz at 4 samples per second: phases 0, .25, .5, .75
        let mut osc = Oscillator::new(Waveform::Triangle, 1.0, 4.0);
        let samples: Vec<f64> = (0..4).map(|_| osc.next_sample()).collect();
        assert_eq!(samples, vec![-1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn parses_waveform_names() {
        assert_eq!("saw".parse::<Waveform>().unwrap(), Waveform::Sawtooth);
        assert_eq!("triangle".parse::<Waveform>().unwrap(), Waveform::Triangle);
        assert!("organ".parse::<Waveform>().is_err());
    }
}
