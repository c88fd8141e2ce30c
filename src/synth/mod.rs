//! Fire-and-forget synthesizers.
//!
//! Each call builds one self-releasing voice: the gain decays exponentially
//! to a small floor and the voice stops [`RELEASE_TAIL`] seconds later, so
//! nothing has to come back and clean it up.

pub mod noise;
pub mod tone;

pub use noise::{NoiseTimbre, WeaponClass, play_explosion, play_gunshot, play_noise_burst};
pub use tone::play_tone;

use crate::error::{OutbreakAudioError, Result};
use crate::param::AudioParam;

/// Seconds between the end of the envelope and the voice being released.
pub const RELEASE_TAIL: f64 = 0.1;

/// Level the percussive and tonal envelopes decay to.
pub const ENVELOPE_FLOOR: f32 = 0.01;

/// Gain envelope: `peak` at `start`, exponential decay to `floor` at `start + duration`.
pub fn decay_envelope(peak: f32, start: f64, duration: f64, floor: f32) -> Result<AudioParam> {
    let mut gain = AudioParam::new(0.0);
    gain.set_value_at_time(peak, start)
        .exponential_ramp_to_value_at_time(floor, start + duration)?;
    Ok(gain)
}

pub(crate) fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(OutbreakAudioError::InvalidAutomation(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}
