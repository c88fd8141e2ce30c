//! White-noise buffers for percussive voices.

use rand::Rng;
use std::sync::Arc;

/// Length of one noise buffer. Longer than any percussive voice.
pub const NOISE_BUFFER_SECONDS: f64 = 2.0;

/// A fixed-length block of uniform white noise in [-1, 1).
#[derive(Debug, Clone)]
pub struct NoiseBuffer {
    samples: Arc<[f32]>,
}

impl NoiseBuffer {
    /// Fill a buffer of `NOISE_BUFFER_SECONDS` with noise from `rng`.
    pub fn generate<R: Rng + ?Sized>(sample_rate: u32, rng: &mut R) -> Self {
        let len = (sample_rate as f64 * NOISE_BUFFER_SECONDS) as usize;
        let samples: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Self {
            samples: samples.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Plays a `NoiseBuffer` once; silence after the end.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    buffer: NoiseBuffer,
    position: usize,
}

impl NoiseSource {
    pub fn new(buffer: NoiseBuffer) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        match self.buffer.samples.get(self.position) {
            Some(&sample) => {
                self.position += 1;
                sample as f64
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn buffer_is_two_seconds_of_bounded_noise() {
        let mut rng = StdRng::seed_from_u64(7);
        let buffer = NoiseBuffer::generate(8000, &mut rng);
        assert_eq!(buffer.len(), 16000);
        assert!(buffer.samples().iter().all(|s| (-1.0..1.0).contains(s)));
        // not a constant signal
        let mean: f32 = buffer.samples().iter().sum::<f32>() / buffer.len() as f32;
        assert!(mean.abs() < 0.05, "noise should be roughly zero-mean, got {mean}");
    }

    #[test]
    fn source_goes_silent_after_buffer() {
        let mut rng = StdRng::seed_from_u64(1);
        let buffer = NoiseBuffer::generate(10, &mut rng);
        let mut source = NoiseSource::new(buffer.clone());
        for expected in buffer.samples() {
            assert_eq!(source.next_sample(), *expected as f64);
        }
        assert_eq!(source.next_sample(), 0.0);
    }
}
