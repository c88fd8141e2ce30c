//! Percussive voices: white noise through a sweeping low-pass.

use super::{ENVELOPE_FLOOR, RELEASE_TAIL, check_positive, decay_envelope};
use crate::context::RenderContext;
use crate::dsp::NoiseBuffer;
use crate::error::Result;
use crate::param::AudioParam;
use crate::voice::{VoiceBuilder, VoiceHandle};

/// Cutoff a gunshot sweep ends on.
pub const CUTOFF_FLOOR_HZ: f32 = 100.0;

pub const EXPLOSION_DURATION: f64 = 1.5;
pub const EXPLOSION_CUTOFF_START_HZ: f32 = 300.0;
pub const EXPLOSION_CUTOFF_END_HZ: f32 = 10.0;
pub const EXPLOSION_PEAK: f32 = 0.8;
pub const EXPLOSION_FLOOR: f32 = 0.001;

/// Spectral shape of one noise burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseTimbre {
    pub duration: f64,
    pub cutoff_hz: f32,
    pub amplitude: f32,
}

impl NoiseTimbre {
    pub const fn new(duration: f64, cutoff_hz: f32, amplitude: f32) -> Self {
        Self {
            duration,
            cutoff_hz,
            amplitude,
        }
    }
}

/// Firearms with a fixed noise-burst timbre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeaponClass {
    Pistol,
    Shotgun,
    Sniper,
}

impl WeaponClass {
    pub const fn timbre(self) -> NoiseTimbre {
        match self {
            Self::Pistol => NoiseTimbre::new(0.1, 1000.0, 0.1),
            Self::Shotgun => NoiseTimbre::new(0.3, 500.0, 0.4),
            Self::Sniper => NoiseTimbre::new(0.2, 2000.0, 0.3),
        }
    }
}

/// Play a short burst whose cutoff falls exponentially from `cutoff_hz` to
/// [`CUTOFF_FLOOR_HZ`] while the gain decays from `peak`.
pub fn play_noise_burst(
    ctx: &RenderContext,
    duration: f64,
    cutoff_hz: f32,
    peak: f32,
) -> Result<VoiceHandle> {
    check_positive("duration", duration)?;
    check_positive("cutoff", cutoff_hz as f64)?;
    check_positive("peak amplitude", peak as f64)?;

    let start = ctx.current_time();
    let end = start + duration;

    let mut cutoff = AudioParam::new(cutoff_hz);
    cutoff
        .set_value_at_time(cutoff_hz, start)
        .exponential_ramp_to_value_at_time(CUTOFF_FLOOR_HZ, end)?;
    let gain = decay_envelope(peak, start, duration, ENVELOPE_FLOOR)?;

    schedule_noise(ctx, cutoff, gain, start, end)
}

/// Play one [`WeaponClass`] burst.
pub fn play_gunshot(ctx: &RenderContext, weapon: WeaponClass) -> Result<VoiceHandle> {
    let timbre = weapon.timbre();
    play_noise_burst(ctx, timbre.duration, timbre.cutoff_hz, timbre.amplitude)
}

/// Long low rumble: linear cutoff fall from 300 Hz to 10 Hz over 1.5 s with a
/// deeper gain floor than a gunshot.
pub fn play_explosion(ctx: &RenderContext) -> Result<VoiceHandle> {
    let start = ctx.current_time();
    let end = start + EXPLOSION_DURATION;

    let mut cutoff = AudioParam::new(EXPLOSION_CUTOFF_START_HZ);
    cutoff
        .set_value_at_time(EXPLOSION_CUTOFF_START_HZ, start)
        .linear_ramp_to_value_at_time(EXPLOSION_CUTOFF_END_HZ, end);
    let gain = decay_envelope(EXPLOSION_PEAK, start, EXPLOSION_DURATION, EXPLOSION_FLOOR)?;

    schedule_noise(ctx, cutoff, gain, start, end)
}

fn schedule_noise(
    ctx: &RenderContext,
    cutoff: AudioParam,
    gain: AudioParam,
    start: f64,
    envelope_end: f64,
) -> Result<VoiceHandle> {
    let buffer = NoiseBuffer::generate(ctx.sample_rate(), &mut rand::thread_rng());
    VoiceBuilder::noise(buffer)
        .lowpass(cutoff)
        .gain(gain)
        .start_at(start)
        .stop_at(envelope_end + RELEASE_TAIL)
        .schedule(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioEngineDesc;
    use crate::engine::OfflineDriver;
    use crate::param::Automation;
    use crate::voice::VoiceKind;

    fn offline() -> (RenderContext, OfflineDriver) {
        let driver = OfflineDriver::new();
        let desc = AudioEngineDesc::new().sample_rate(8000).block_size(80);
        let ctx = RenderContext::new(&desc, Box::new(driver.output())).unwrap();
        (ctx, driver)
    }

    #[test]
    fn burst_cutoff_sweeps_exponentially() {
        let (ctx, _driver) = offline();
        let handle = play_noise_burst(&ctx, 0.1, 1000.0, 0.1).unwrap();
        assert_eq!(handle.kind(), VoiceKind::Noise);

        let cutoff = handle.cutoff().unwrap();
        assert_eq!(cutoff.automation_at(0.05), Some(Automation::ExponentialRamp));
        // geometric mean of 1000 and 100
        assert!((cutoff.value_at(0.05) - 316.23).abs() < 0.5);
        assert!((cutoff.value_at(0.1) - CUTOFF_FLOOR_HZ).abs() < 1e-3);
        assert!(handle.stop_time() > handle.envelope_end());
    }

    #[test]
    fn explosion_cutoff_sweeps_linearly() {
        let (ctx, _driver) = offline();
        let handle = play_explosion(&ctx).unwrap();

        let cutoff = handle.cutoff().unwrap();
        assert_eq!(cutoff.automation_at(0.75), Some(Automation::LinearRamp));
        assert!((cutoff.value_at(0.0) - 300.0).abs() < 1e-3);
        assert!((cutoff.value_at(0.75) - 155.0).abs() < 1e-3);
        assert!((cutoff.value_at(1.5) - 10.0).abs() < 1e-3);

        assert!((handle.envelope_end() - EXPLOSION_DURATION).abs() < 1e-9);
        assert!((handle.gain().value_at(1.5) - EXPLOSION_FLOOR).abs() < 1e-6);
        assert!(handle.stop_time() > handle.envelope_end());
    }

    #[test]
    fn weapon_timbres_are_fixed() {
        assert_eq!(WeaponClass::Pistol.timbre(), NoiseTimbre::new(0.1, 1000.0, 0.1));
        assert_eq!(WeaponClass::Shotgun.timbre(), NoiseTimbre::new(0.3, 500.0, 0.4));
        assert_eq!(WeaponClass::Sniper.timbre(), NoiseTimbre::new(0.2, 2000.0, 0.3));
    }

    #[test]
    fn gunshot_uses_weapon_timbre() {
        let (ctx, _driver) = offline();
        let handle = play_gunshot(&ctx, WeaponClass::Shotgun).unwrap();
        assert!((handle.envelope_end() - 0.3).abs() < 1e-9);
        assert!((handle.gain().value_at(0.0) - 0.4).abs() < 1e-6);
        assert!((handle.cutoff().unwrap().value_at(0.0) - 500.0).abs() < 1e-3);
    }

    #[test]
    fn burst_renders_noise_then_releases() {
        let (ctx, driver) = offline();
        play_gunshot(&ctx, WeaponClass::Sniper).unwrap();
        let out = driver.render_frames(400);
        assert!(out.iter().any(|s| *s != 0.0));
        driver.render_frames(2000);
        assert_eq!(ctx.active_voices(), 0);
    }
}
