//! Sound event routing.
//!
//! Every [`SoundEvent`] maps to a fixed recipe of one or two synthesizer
//! calls. Weapon events pass through a [`RateLimiter`] first so a burst of
//! near-simultaneous shots cannot flood the renderer.

use crate::context::RenderContext;
use crate::dsp::Waveform::{self, Sawtooth, Sine, Square, Triangle};
use crate::error::{OutbreakAudioError, Result};
use crate::synth::{WeaponClass, play_explosion, play_gunshot, play_tone};
use crate::voice::VoiceHandle;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Discrete trigger emitted by gameplay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEvent {
    UiClick,
    UiSelect,
    UiError,
    DeployAction,
    WeaponPistol,
    WeaponShotgun,
    WeaponSniper,
    WeaponRocket,
    WeaponNet,
    HealStart,
    HealComplete,
}

impl SoundEvent {
    pub const ALL: [SoundEvent; 11] = [
        Self::UiClick,
        Self::UiSelect,
        Self::UiError,
        Self::DeployAction,
        Self::WeaponPistol,
        Self::WeaponShotgun,
        Self::WeaponSniper,
        Self::WeaponRocket,
        Self::WeaponNet,
        Self::HealStart,
        Self::HealComplete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UiClick => "UI_CLICK",
            Self::UiSelect => "UI_SELECT",
            Self::UiError => "UI_ERROR",
            Self::DeployAction => "DEPLOY_ACTION",
            Self::WeaponPistol => "WEAPON_PISTOL",
            Self::WeaponShotgun => "WEAPON_SHOTGUN",
            Self::WeaponSniper => "WEAPON_SNIPER",
            Self::WeaponRocket => "WEAPON_ROCKET",
            Self::WeaponNet => "WEAPON_NET",
            Self::HealStart => "HEAL_START",
            Self::HealComplete => "HEAL_COMPLETE",
        }
    }

    /// Weapon events are subject to rate limiting.
    pub fn is_weapon(self) -> bool {
        matches!(
            self,
            Self::WeaponPistol
                | Self::WeaponShotgun
                | Self::WeaponSniper
                | Self::WeaponRocket
                | Self::WeaponNet
        )
    }

    /// Synthesizer calls realized for this event.
    pub fn recipe(self) -> &'static [VoiceRecipe] {
        match self {
            Self::UiClick => UI_CLICK,
            Self::UiSelect => UI_SELECT,
            Self::UiError => UI_ERROR,
            Self::DeployAction => DEPLOY_ACTION,
            Self::WeaponPistol => WEAPON_PISTOL,
            Self::WeaponShotgun => WEAPON_SHOTGUN,
            Self::WeaponSniper => WEAPON_SNIPER,
            Self::WeaponRocket => WEAPON_ROCKET,
            Self::WeaponNet => WEAPON_NET,
            Self::HealStart => HEAL_START,
            Self::HealComplete => HEAL_COMPLETE,
        }
    }
}

impl fmt::Display for SoundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundEvent {
    type Err = OutbreakAudioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| OutbreakAudioError::Configuration(format!("unknown sound event '{}'", s)))
    }
}

/// One tonal layer of a recipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneLayer {
    pub frequency: f32,
    pub waveform: Waveform,
    pub duration: f64,
    pub amplitude: f32,
    pub delay: f64,
}

impl ToneLayer {
    pub const fn new(frequency: f32, waveform: Waveform, duration: f64, amplitude: f32) -> Self {
        Self {
            frequency,
            waveform,
            duration,
            amplitude,
            delay: 0.0,
        }
    }

    pub const fn delayed(self, delay: f64) -> Self {
        Self { delay, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceRecipe {
    Tone(ToneLayer),
    NoiseBurst(WeaponClass),
    Explosion,
}

impl VoiceRecipe {
    fn play(&self, ctx: &RenderContext) -> Result<VoiceHandle> {
        match *self {
            Self::Tone(tone) => play_tone(
                ctx,
                tone.frequency,
                tone.waveform,
                tone.duration,
                tone.amplitude,
                tone.delay,
            ),
            Self::NoiseBurst(weapon) => play_gunshot(ctx, weapon),
            Self::Explosion => play_explosion(ctx),
        }
    }
}

const UI_CLICK: &[VoiceRecipe] = &[VoiceRecipe::Tone(ToneLayer::new(800.0, Sine, 0.05, 0.1))];
const UI_SELECT: &[VoiceRecipe] = &[VoiceRecipe::Tone(ToneLayer::new(1200.0, Sine, 0.05, 0.1))];
const UI_ERROR: &[VoiceRecipe] = &[VoiceRecipe::Tone(ToneLayer::new(150.0, Sawtooth, 0.2, 0.2))];
const DEPLOY_ACTION: &[VoiceRecipe] = &[
    VoiceRecipe::Tone(ToneLayer::new(400.0, Square, 0.1, 0.3)),
    VoiceRecipe::Tone(ToneLayer::new(600.0, Square, 0.1, 0.3).delayed(0.1)),
];
const WEAPON_PISTOL: &[VoiceRecipe] = &[VoiceRecipe::NoiseBurst(WeaponClass::Pistol)];
const WEAPON_SHOTGUN: &[VoiceRecipe] = &[VoiceRecipe::NoiseBurst(WeaponClass::Shotgun)];
const WEAPON_SNIPER: &[VoiceRecipe] = &[
    VoiceRecipe::NoiseBurst(WeaponClass::Sniper),
    VoiceRecipe::Tone(ToneLayer::new(200.0, Sawtooth, 0.05, 0.5)),
];
const WEAPON_ROCKET: &[VoiceRecipe] = &[VoiceRecipe::Explosion];
const WEAPON_NET: &[VoiceRecipe] = &[
    VoiceRecipe::Tone(ToneLayer::new(600.0, Triangle, 0.05, 0.2)),
    VoiceRecipe::Tone(ToneLayer::new(300.0, Triangle, 0.1, 0.2).delayed(0.05)),
];
const HEAL_START: &[VoiceRecipe] = &[VoiceRecipe::Tone(ToneLayer::new(400.0, Sine, 0.5, 0.1))];
const HEAL_COMPLETE: &[VoiceRecipe] = &[
    VoiceRecipe::Tone(ToneLayer::new(800.0, Sine, 0.1, 0.2)),
    VoiceRecipe::Tone(ToneLayer::new(1200.0, Sine, 0.2, 0.2).delayed(0.1)),
];

/// Drops triggers that arrive less than `threshold` after the last admitted one.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    threshold: f64,
    last_trigger: Option<f64>,
}

impl RateLimiter {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold: threshold.as_secs_f64(),
            last_trigger: None,
        }
    }

    pub fn last_trigger(&self) -> Option<f64> {
        self.last_trigger
    }

    /// Admit a trigger at context time `now`, recording it; false means drop it.
    pub fn admit(&mut self, now: f64) -> bool {
        if let Some(last) = self.last_trigger {
            // tolerate float jitter at exactly the threshold
            if now - last < self.threshold - 1e-9 {
                return false;
            }
        }
        self.last_trigger = Some(now);
        true
    }
}

/// What a dispatch did.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Voices were scheduled
    Played(Vec<VoiceHandle>),
    /// Weapon event inside the rate-limit window
    RateLimited,
    Muted,
    /// `initialize` has not succeeded yet
    Uninitialized,
    /// No rendering context can exist
    Unavailable,
}

impl DispatchOutcome {
    pub fn is_played(&self) -> bool {
        matches!(self, Self::Played(_))
    }

    pub fn voices(&self) -> &[VoiceHandle] {
        match self {
            Self::Played(voices) => voices,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SoundRouter {
    limiter: RateLimiter,
}

impl SoundRouter {
    pub fn new(weapon_rate_limit: Duration) -> Self {
        Self {
            limiter: RateLimiter::new(weapon_rate_limit),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Realize `event` on `ctx`. Only weapon events consult the rate limiter.
    pub fn dispatch(&mut self, ctx: &RenderContext, event: SoundEvent) -> Result<DispatchOutcome> {
        if event.is_weapon() && !self.limiter.admit(ctx.current_time()) {
            log::debug!("{} dropped by rate limiter", event);
            return Ok(DispatchOutcome::RateLimited);
        }

        let voices = play_layers(ctx, event.recipe())?;
        log::debug!("{} dispatched ({} voices)", event, voices.len());
        Ok(DispatchOutcome::Played(voices))
    }
}

/// Schedule every layer. Layers already scheduled keep playing when a later
/// one fails, so they are reported; the error surfaces only if none played.
fn play_layers(ctx: &RenderContext, layers: &[VoiceRecipe]) -> Result<Vec<VoiceHandle>> {
    let mut voices = Vec::with_capacity(layers.len());
    for layer in layers {
        match layer.play(ctx) {
            Ok(voice) => voices.push(voice),
            Err(e) if voices.is_empty() => return Err(e),
            Err(e) => {
                log::warn!("Layer {:?} not played: {}", layer, e);
                break;
            }
        }
    }
    Ok(voices)
}
