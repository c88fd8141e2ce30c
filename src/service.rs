//! Process-wide audio facade.
//!
//! [`GameAudio`] owns the one rendering context, the mute flag, the event
//! router and the score sequencer. Every public operation first checks
//! whether the engine is initialized and unmuted and degrades to a no-op
//! otherwise; nothing here returns an error or panics.

use crate::config::AudioEngineDesc;
use crate::context::{ContextState, RenderContext};
use crate::dsp::Waveform;
use crate::engine::{AudioOutput, CpalOutput};
use crate::error::{OutbreakAudioError, Result};
use crate::events::AudioEvent;
use crate::router::{DispatchOutcome, SoundEvent, SoundRouter};
use crate::score::ScoreSequencer;
use crate::synth;
use crate::voice::VoiceHandle;
use parking_lot::Mutex;
use std::sync::OnceLock;

/// Builds the platform output the first time `initialize` runs.
pub type OutputFactory = dyn Fn(&AudioEngineDesc) -> Box<dyn AudioOutput> + Send + Sync;

enum ContextSlot {
    Uninitialized,
    Ready(RenderContext),
    /// Construction failed; never retried
    Unavailable,
}

struct EngineState {
    context: ContextSlot,
    muted: bool,
    router: SoundRouter,
    score: ScoreSequencer,
    /// Last score request from the host, honoured again on unmute
    score_requested: bool,
}

impl EngineState {
    /// The context if playback is allowed right now.
    fn gate(&self) -> std::result::Result<&RenderContext, DispatchOutcome> {
        match &self.context {
            ContextSlot::Uninitialized => Err(DispatchOutcome::Uninitialized),
            ContextSlot::Unavailable => Err(DispatchOutcome::Unavailable),
            ContextSlot::Ready(ctx) if ctx.is_closed() => Err(DispatchOutcome::Unavailable),
            ContextSlot::Ready(_) if self.muted => Err(DispatchOutcome::Muted),
            ContextSlot::Ready(ctx) => Ok(ctx),
        }
    }

    fn context(&self) -> Option<&RenderContext> {
        match &self.context {
            ContextSlot::Ready(ctx) => Some(ctx),
            _ => None,
        }
    }

    /// Start on behalf of the host. A start refused only because of the mute
    /// is remembered for unmute; any other refusal is forgotten.
    fn request_score(&mut self) -> bool {
        let gated = self.gate().err();
        self.score_requested = matches!(gated, None | Some(DispatchOutcome::Muted));
        self.start_score()
    }

    fn start_score(&mut self) -> bool {
        let ctx = match self.gate() {
            Ok(ctx) => ctx.clone(),
            Err(outcome) => {
                log::debug!("Score start ignored: {:?}", outcome);
                return false;
            }
        };
        match self.score.start(&ctx) {
            Ok(started) => started,
            Err(e) => {
                log::warn!("Score failed to start: {}", e);
                false
            }
        }
    }
}

pub struct GameAudio {
    desc: AudioEngineDesc,
    factory: Box<OutputFactory>,
    state: Mutex<EngineState>,
}

impl GameAudio {
    /// Engine that plays through the default output device.
    pub fn new(desc: AudioEngineDesc) -> Self {
        Self::with_output(desc, |_| Box::new(CpalOutput::new()))
    }

    /// Engine with a custom output, e.g. an [`OfflineOutput`](crate::OfflineOutput).
    pub fn with_output<F>(desc: AudioEngineDesc, factory: F) -> Self
    where
        F: Fn(&AudioEngineDesc) -> Box<dyn AudioOutput> + Send + Sync + 'static,
    {
        let state = EngineState {
            context: ContextSlot::Uninitialized,
            muted: false,
            router: SoundRouter::new(desc.weapon_rate_limit),
            score: ScoreSequencer::new(desc.score.clone()),
            score_requested: false,
        };
        Self {
            desc,
            factory: Box::new(factory),
            state: Mutex::new(state),
        }
    }

    /// The shared process-wide engine on the default device.
    pub fn global() -> &'static GameAudio {
        static GLOBAL: OnceLock<GameAudio> = OnceLock::new();
        GLOBAL.get_or_init(|| GameAudio::new(AudioEngineDesc::default()))
    }

    pub fn desc(&self) -> &AudioEngineDesc {
        &self.desc
    }

    /// Create the rendering context on first call; resume it afterwards.
    ///
    /// Call from a user-input handler. Returns whether a usable context exists.
    /// A context that failed to construct is never retried.
    pub fn initialize(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(state.context, ContextSlot::Uninitialized) {
            return match self.create_context() {
                Ok(ctx) => {
                    if state.muted {
                        if let Err(e) = ctx.suspend() {
                            log::warn!("Failed to suspend new context while muted: {}", e);
                        }
                    }
                    state.context = ContextSlot::Ready(ctx);
                    true
                }
                Err(e) => {
                    log::warn!("Audio unavailable, playback disabled: {}", e);
                    state.context = ContextSlot::Unavailable;
                    false
                }
            };
        }

        let Some(ctx) = state.context() else {
            return false;
        };
        if ctx.is_closed() {
            return false;
        }
        if !state.muted && ctx.state() == ContextState::Suspended {
            if let Err(e) = ctx.resume() {
                log::warn!("Failed to resume rendering context: {}", e);
            }
        }
        true
    }

    fn create_context(&self) -> Result<RenderContext> {
        let output = (self.factory)(&self.desc);
        RenderContext::new(&self.desc, output)
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state.lock().context, ContextSlot::Ready(_))
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    /// Stop the score and suspend output. Both happen before this returns.
    pub fn mute(&self) {
        let mut state = self.state.lock();
        if state.muted {
            return;
        }
        state.muted = true;
        state.score.stop();
        if let Some(ctx) = state.context() {
            if let Err(e) = ctx.suspend() {
                log::debug!("Suspend on mute skipped: {}", e);
            }
        }
        log::info!("Audio muted");
    }

    /// Resume output and restart the score if the host last asked for it.
    pub fn unmute(&self) {
        let mut state = self.state.lock();
        if !state.muted {
            return;
        }
        state.muted = false;
        if let Some(ctx) = state.context() {
            if let Err(e) = ctx.resume() {
                log::debug!("Resume on unmute skipped: {}", e);
            }
        }
        if state.score_requested {
            state.start_score();
        }
        log::info!("Audio unmuted");
    }

    /// Flip the mute flag; returns the new value.
    pub fn toggle_mute(&self) -> bool {
        if self.is_muted() {
            self.unmute();
            false
        } else {
            self.mute();
            true
        }
    }

    /// Route a gameplay trigger.
    pub fn dispatch(&self, event: SoundEvent) -> DispatchOutcome {
        let mut state = self.state.lock();
        let ctx = match state.gate() {
            Ok(ctx) => ctx.clone(),
            Err(outcome) => return outcome,
        };
        match state.router.dispatch(&ctx, event) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("{} not played: {}", event, e);
                DispatchOutcome::Unavailable
            }
        }
    }

    /// Play a single tone. `None` when gated or rejected.
    pub fn play_tone(
        &self,
        frequency: f32,
        waveform: Waveform,
        duration: f64,
        peak: f32,
        delay: f64,
    ) -> Option<VoiceHandle> {
        self.with_context(|ctx| synth::play_tone(ctx, frequency, waveform, duration, peak, delay))
    }

    pub fn play_noise_burst(&self, duration: f64, cutoff_hz: f32, peak: f32) -> Option<VoiceHandle> {
        self.with_context(|ctx| synth::play_noise_burst(ctx, duration, cutoff_hz, peak))
    }

    pub fn play_explosion(&self) -> Option<VoiceHandle> {
        self.with_context(synth::play_explosion)
    }

    fn with_context<F>(&self, play: F) -> Option<VoiceHandle>
    where
        F: FnOnce(&RenderContext) -> Result<VoiceHandle>,
    {
        let ctx = self.state.lock().gate().ok()?.clone();
        match play(&ctx) {
            Ok(handle) => Some(handle),
            Err(OutbreakAudioError::ContextClosed) => None,
            Err(e) => {
                log::warn!("Voice not scheduled: {}", e);
                None
            }
        }
    }

    /// Start the background score. No-op while muted or already playing.
    /// A start refused by the mute takes effect on the next unmute; before
    /// `initialize` it is simply ignored.
    pub fn start_score(&self) -> bool {
        self.state.lock().request_score()
    }

    /// Stop the background score, fading its drones out.
    pub fn stop_score(&self) -> bool {
        let mut state = self.state.lock();
        state.score_requested = false;
        state.score.stop()
    }

    pub fn is_score_playing(&self) -> bool {
        self.state.lock().score.is_playing()
    }

    /// Live drone voices: zero or the configured count.
    pub fn drone_count(&self) -> usize {
        self.state.lock().score.drone_count()
    }

    pub fn context_state(&self) -> Option<ContextState> {
        self.state.lock().context().map(RenderContext::state)
    }

    pub fn current_time(&self) -> Option<f64> {
        self.state.lock().context().map(RenderContext::current_time)
    }

    /// Handle to the rendering context, once initialized.
    pub fn context(&self) -> Option<RenderContext> {
        self.state.lock().context().cloned()
    }

    pub fn poll_events(&self) -> Vec<AudioEvent> {
        self.context().map(|ctx| ctx.poll_events()).unwrap_or_default()
    }

    /// Stop the score and close the context for good. Later calls are no-ops.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.score_requested = false;
        state.score.stop();
        if let Some(ctx) = state.context() {
            if let Err(e) = ctx.close() {
                log::warn!("Error while closing rendering context: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for GameAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GameAudio")
            .field("context", &state.context())
            .field("muted", &state.muted)
            .field("score_playing", &state.score.is_playing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OfflineDriver;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn offline_engine() -> (GameAudio, OfflineDriver) {
        let driver = OfflineDriver::new();
        let desc = AudioEngineDesc::new().sample_rate(8000).block_size(80);
        let factory_driver = driver.clone();
        let audio = GameAudio::with_output(desc, move |_| Box::new(factory_driver.output()));
        (audio, driver)
    }

    #[test]
    fn calls_before_initialize_are_no_ops() {
        let (audio, driver) = offline_engine();
        assert!(matches!(
            audio.dispatch(SoundEvent::UiClick),
            DispatchOutcome::Uninitialized
        ));
        assert!(audio.play_explosion().is_none());
        assert!(!audio.start_score());
        assert_eq!(audio.context_state(), None);
        assert!(!driver.is_started());
    }

    #[test]
    fn context_is_created_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let driver = OfflineDriver::new();
        let counter = created.clone();
        let audio = GameAudio::with_output(AudioEngineDesc::default(), move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            Box::new(driver.output())
        });
        assert!(audio.initialize());
        assert!(audio.initialize());
        audio.mute();
        audio.unmute();
        assert!(audio.initialize());
        assert_eq!(created.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unavailable_platform_degrades_to_silence() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let audio = GameAudio::with_output(AudioEngineDesc::default(), move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            Box::new(OfflineDriver::unavailable().output())
        });
        assert!(!audio.initialize());
        assert!(!audio.initialize());
        assert_eq!(created.load(Ordering::Relaxed), 1);
        assert!(matches!(
            audio.dispatch(SoundEvent::WeaponRocket),
            DispatchOutcome::Unavailable
        ));
        assert!(!audio.start_score());
        assert!(audio.play_tone(440.0, Waveform::Sine, 0.1, 0.1, 0.0).is_none());
        audio.mute();
        audio.unmute();
        audio.shutdown();
    }

    #[test]
    fn muted_dispatch_is_a_no_op() {
        let (audio, _driver) = offline_engine();
        audio.initialize();
        audio.mute();
        assert!(matches!(audio.dispatch(SoundEvent::UiClick), DispatchOutcome::Muted));
        assert_eq!(audio.context_state(), Some(ContextState::Suspended));
    }

    #[test]
    fn toggle_mute_flips() {
        let (audio, _driver) = offline_engine();
        audio.initialize();
        assert!(audio.toggle_mute());
        assert!(audio.is_muted());
        assert!(!audio.toggle_mute());
        assert_eq!(audio.context_state(), Some(ContextState::Running));
    }

    #[test]
    fn initialize_while_muted_stays_suspended() {
        let (audio, _driver) = offline_engine();
        audio.mute();
        assert!(audio.initialize());
        assert_eq!(audio.context_state(), Some(ContextState::Suspended));
        assert!(audio.initialize());
        assert_eq!(audio.context_state(), Some(ContextState::Suspended));
        audio.unmute();
        assert_eq!(audio.context_state(), Some(ContextState::Running));
    }

    #[test]
    fn initialize_resumes_externally_suspended_context() {
        let (audio, _driver) = offline_engine();
        audio.initialize();
        audio.context().unwrap().suspend().unwrap();
        assert!(audio.initialize());
        assert_eq!(audio.context_state(), Some(ContextState::Running));
    }

    #[test]
    fn unmute_honours_last_score_request() {
        let (audio, _driver) = offline_engine();
        audio.initialize();

        audio.mute();
        audio.unmute();
        assert!(!audio.is_score_playing());

        assert!(audio.start_score());
        audio.mute();
        assert!(!audio.is_score_playing());
        audio.unmute();
        assert!(audio.is_score_playing());

        audio.stop_score();
        audio.mute();
        audio.unmute();
        assert!(!audio.is_score_playing());
        audio.shutdown();
    }

    #[test]
    fn score_request_before_initialize_is_forgotten() {
        let (audio, _driver) = offline_engine();
        assert!(!audio.start_score());
        assert!(audio.initialize());
        assert!(!audio.is_score_playing());

        audio.mute();
        audio.unmute();
        assert!(!audio.is_score_playing());
        assert_eq!(audio.drone_count(), 0);
        audio.shutdown();
    }

    #[test]
    fn shutdown_is_final() {
        let (audio, driver) = offline_engine();
        audio.initialize();
        audio.start_score();
        audio.shutdown();
        audio.shutdown();

        assert!(driver.is_closed());
        assert!(!audio.is_score_playing());
        assert!(!audio.initialize());
        assert!(matches!(
            audio.dispatch(SoundEvent::UiSelect),
            DispatchOutcome::Unavailable
        ));
        assert!(!audio.start_score());
        assert_eq!(audio.context_state(), Some(ContextState::Closed));
    }
}
