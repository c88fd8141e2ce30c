//! Tonal voices for UI feedback, heal cues and score notes.

use super::{ENVELOPE_FLOOR, RELEASE_TAIL, check_positive, decay_envelope};
use crate::context::RenderContext;
use crate::dsp::Waveform;
use crate::error::{OutbreakAudioError, Result};
use crate::voice::{VoiceBuilder, VoiceHandle};

/// Play one periodic voice, `delay` seconds from now.
///
/// The gain starts at `peak` and decays to [`ENVELOPE_FLOOR`] over `duration`;
/// the voice is released [`RELEASE_TAIL`] seconds after that.
pub fn play_tone(
    ctx: &RenderContext,
    frequency: f32,
    waveform: Waveform,
    duration: f64,
    peak: f32,
    delay: f64,
) -> Result<VoiceHandle> {
    check_positive("frequency", frequency as f64)?;
    check_positive("duration", duration)?;
    check_positive("peak amplitude", peak as f64)?;
    if !(delay.is_finite() && delay >= 0.0) {
        return Err(OutbreakAudioError::InvalidAutomation(format!(
            "delay must be non-negative, got {}",
            delay
        )));
    }

    let start = ctx.current_time() + delay;
    let gain = decay_envelope(peak, start, duration, ENVELOPE_FLOOR)?;

    VoiceBuilder::periodic(waveform, frequency)
        .gain(gain)
        .start_at(start)
        .stop_at(start + duration + RELEASE_TAIL)
        .schedule(ctx)
}
