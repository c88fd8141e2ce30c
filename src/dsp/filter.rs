//! Second-order low-pass filter with a movable cutoff.
//!
//! Coefficients follow the Audio EQ Cookbook low-pass, processed in Direct
//! Form II Transposed.

use std::f64::consts::PI;

const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;
/// Lowest cutoff accepted, keeps the coefficients stable near DC.
const MIN_CUTOFF_HZ: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct LowpassFilter {
    cutoff: f64,
    q: f64,
    sample_rate: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,
}

impl LowpassFilter {
    pub fn new(cutoff: f64, sample_rate: f64) -> Self {
        let mut filter = Self {
            cutoff: 0.0,
            q: BUTTERWORTH_Q,
            sample_rate,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        };
        filter.set_cutoff(cutoff);
        filter
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Move the cutoff, clamped below Nyquist. Coefficients are only
    /// recomputed when the value actually changes.
    pub fn set_cutoff(&mut self, cutoff: f64) {
        let nyquist = self.sample_rate / 2.0;
        let cutoff = cutoff.clamp(MIN_CUTOFF_HZ, nyquist * 0.999);
        if cutoff == self.cutoff {
            return;
        }
        self.cutoff = cutoff;
        self.update_coefficients();
    }

    fn update_coefficients(&mut self) {
        let w0 = 2.0 * PI * self.cutoff / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * self.q);

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let a0 = 1.0 + alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b0 / a0;
        self.a1 = (-2.0 * cos_w0) / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
