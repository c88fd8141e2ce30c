//! Background score sequencer.
//!
//! Two states. While [`SequencerState::Playing`] the sequencer owns a full
//! set of drone voices and exactly one clock thread that walks the pitch
//! pattern; while stopped it owns nothing. Stopping cancels the clock before
//! the drones are faded, so no note can be scheduled after `stop` returns.

use crate::config::{NoteVoice, ScoreConfig};
use crate::context::{ContextState, RenderContext};
use crate::dsp::Waveform;
use crate::error::Result;
use crate::events::AudioEvent;
use crate::param::AudioParam;
use crate::synth::play_tone;
use crate::voice::{VoiceBuilder, VoiceHandle, VoiceId, VoiceKind};
use crossbeam_channel::{Sender, select};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::thread::{self, JoinHandle};

/// One clock step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleEntry {
    /// Context time the step fired at
    pub fire_time: f64,
    /// Pitch of the melodic note, `None` on a silent step
    pub note: Option<f32>,
    /// Whether a stinger is layered on this step
    pub stinger: bool,
}

/// Position in the repeating pattern plus the stinger dice.
#[derive(Debug)]
pub struct PatternCursor {
    pattern: Vec<Option<f32>>,
    step: usize,
    stinger_probability: f64,
    rng: StdRng,
}

impl PatternCursor {
    pub fn new(config: &ScoreConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            pattern: config.pattern.clone(),
            step: 0,
            stinger_probability: config.stinger_probability,
            rng,
        }
    }

    /// Steps taken so far.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn next_entry(&mut self, fire_time: f64) -> ScheduleEntry {
        let note = if self.pattern.is_empty() {
            None
        } else {
            self.pattern[self.step % self.pattern.len()]
        };
        let stinger = self.rng.gen_bool(self.stinger_probability.clamp(0.0, 1.0));
        self.step += 1;
        ScheduleEntry {
            fire_time,
            note,
            stinger,
        }
    }
}

/// A long-lived drone owned by the sequencer.
#[derive(Debug, Clone)]
pub struct DroneVoice {
    frequency: f32,
    handle: VoiceHandle,
}

impl DroneVoice {
    fn spawn(ctx: &RenderContext, config: &ScoreConfig, frequency: f32) -> Result<Self> {
        let now = ctx.current_time();
        let mut gain = AudioParam::new(0.0);
        gain.set_value_at_time(config.drone_level, now);

        let handle = VoiceBuilder::periodic(Waveform::Sawtooth, frequency)
            .kind(VoiceKind::Drone)
            .lowpass(AudioParam::new(config.drone_cutoff_hz))
            .gain(gain)
            .gain_lfo(config.lfo_rate_hz, config.lfo_depth)
            .start_at(now)
            .schedule(ctx)?;
        Ok(Self { frequency, handle })
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn id(&self) -> VoiceId {
        self.handle.id()
    }

    pub fn handle(&self) -> &VoiceHandle {
        &self.handle
    }
}

/// What one clock tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Tick {
    Fired(ScheduleEntry),
    /// Context suspended; the step is not consumed
    Skipped,
    Closed,
}

/// Plays pattern steps against a context. Owned by the clock thread.
struct StepPlayer {
    ctx: RenderContext,
    cursor: PatternCursor,
    note: NoteVoice,
    stinger: NoteVoice,
}

impl StepPlayer {
    fn new(ctx: RenderContext, config: &ScoreConfig) -> Self {
        Self {
            ctx,
            cursor: PatternCursor::new(config),
            // the frequency is taken from the pattern
            note: NoteVoice {
                waveform: config.note_waveform,
                frequency: 0.0,
                duration: config.note_duration,
                amplitude: config.note_amplitude,
            },
            stinger: config.stinger,
        }
    }

    fn tick(&mut self) -> Tick {
        match self.ctx.state() {
            ContextState::Closed => return Tick::Closed,
            ContextState::Suspended => return Tick::Skipped,
            ContextState::Running => {}
        }

        let entry = self.cursor.next_entry(self.ctx.current_time());
        if let Some(frequency) = entry.note {
            self.play(NoteVoice {
                frequency,
                ..self.note
            });
        }
        if entry.stinger {
            self.play(self.stinger);
        }
        Tick::Fired(entry)
    }

    fn play(&self, voice: NoteVoice) {
        if let Err(e) = play_tone(
            &self.ctx,
            voice.frequency,
            voice.waveform,
            voice.duration,
            voice.amplitude,
            0.0,
        ) {
            log::warn!("Score note at {} Hz not scheduled: {}", voice.frequency, e);
        }
    }
}

/// Handle to the recurring clock thread. Dropping it cancels the clock and
/// waits for the thread to exit.
pub struct ScoreClock {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ScoreClock {
    fn spawn(mut player: StepPlayer, period: std::time::Duration) -> Result<Self> {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
        let ticker = crossbeam_channel::tick(period);

        let thread = thread::Builder::new()
            .name("outbreak-score-clock".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(cancel_rx) -> _ => break,
                        recv(ticker) -> _ => match player.tick() {
                            Tick::Fired(entry) => log::trace!("Score step {:?}", entry),
                            Tick::Skipped => {}
                            Tick::Closed => break,
                        },
                    }
                }
                log::debug!("Score clock exited after {} steps", player.cursor.step());
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
            thread: Some(thread),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ScoreClock {
    fn drop(&mut self) {
        // disconnecting the cancel channel wakes the select
        drop(self.cancel.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for ScoreClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreClock")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[derive(Debug, Default)]
pub enum SequencerState {
    #[default]
    Stopped,
    Playing {
        ctx: RenderContext,
        drones: Vec<DroneVoice>,
        clock: ScoreClock,
    },
}

#[derive(Debug)]
pub struct ScoreSequencer {
    config: ScoreConfig,
    state: SequencerState,
}

impl ScoreSequencer {
    pub fn new(config: ScoreConfig) -> Self {
        Self {
            config,
            state: SequencerState::Stopped,
        }
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, SequencerState::Playing { .. })
    }

    /// Live drones: zero or the configured count.
    pub fn drone_count(&self) -> usize {
        match &self.state {
            SequencerState::Playing { drones, .. } => drones.len(),
            SequencerState::Stopped => 0,
        }
    }

    pub fn drone_ids(&self) -> Vec<VoiceId> {
        match &self.state {
            SequencerState::Playing { drones, .. } => drones.iter().map(DroneVoice::id).collect(),
            SequencerState::Stopped => Vec::new(),
        }
    }

    /// Create the drones and start the clock.
    ///
    /// Returns `Ok(false)` when already playing. On error nothing is left
    /// behind: drones created before the failure are released.
    pub fn start(&mut self, ctx: &RenderContext) -> Result<bool> {
        if self.is_playing() {
            return Ok(false);
        }

        let mut drones = Vec::with_capacity(self.config.drone_count());
        for &frequency in &self.config.drone_frequencies {
            match DroneVoice::spawn(ctx, &self.config, frequency) {
                Ok(drone) => drones.push(drone),
                Err(e) => {
                    release_drones(ctx, &drones);
                    return Err(e);
                }
            }
        }

        let player = StepPlayer::new(ctx.clone(), &self.config);
        let clock = match ScoreClock::spawn(player, self.config.step_period) {
            Ok(clock) => clock,
            Err(e) => {
                release_drones(ctx, &drones);
                return Err(e);
            }
        };

        log::info!(
            "Score started: {} drones, step every {:?}",
            drones.len(),
            self.config.step_period
        );
        ctx.emit(AudioEvent::ScoreStarted {
            drones: drones.len(),
        });
        self.state = SequencerState::Playing {
            ctx: ctx.clone(),
            drones,
            clock,
        };
        Ok(true)
    }

    /// Cancel the clock, then fade every drone to silence over the fade window.
    ///
    /// Returns false when already stopped. Drones that are already gone, or
    /// whose context was closed underneath them, are skipped silently.
    pub fn stop(&mut self) -> bool {
        let SequencerState::Playing { ctx, drones, clock } = std::mem::take(&mut self.state) else {
            return false;
        };
        drop(clock);

        let fade = self.config.fade_out.as_secs_f64();
        for drone in &drones {
            if let Err(e) = ctx.fade_out(drone.id(), fade) {
                log::debug!("Drone {} fade skipped: {}", drone.id(), e);
            }
        }

        log::info!("Score stopped, fading {} drones over {:.1}s", drones.len(), fade);
        ctx.emit(AudioEvent::ScoreStopped);
        true
    }
}

impl Drop for ScoreSequencer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn release_drones(ctx: &RenderContext, drones: &[DroneVoice]) {
    for drone in drones {
        let _ = ctx.release(drone.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioEngineDesc;
    use crate::engine::OfflineDriver;
    use std::time::Duration;

    fn offline() -> (RenderContext, OfflineDriver) {
        let driver = OfflineDriver::new();
        let desc = AudioEngineDesc::new().sample_rate(8000).block_size(80);
        let ctx = RenderContext::new(&desc, Box::new(driver.output())).unwrap();
        (ctx, driver)
    }

    #[test]
    fn cursor_walks_pattern_and_wraps() {
        let config = ScoreConfig::default().seed(1).stinger_probability(0.0);
        let mut cursor = PatternCursor::new(&config);
        let notes: Vec<_> = (0..10).map(|i| cursor.next_entry(i as f64).note).collect();
        assert_eq!(
            notes,
            vec![
                Some(110.0),
                None,
                Some(110.0),
                None,
                Some(130.0),
                None,
                Some(103.0),
                None,
                Some(110.0),
                None
            ]
        );
        assert_eq!(cursor.step(), 10);
    }

    #[test]
    fn stinger_probability_bounds() {
        let mut never = PatternCursor::new(&ScoreConfig::default().seed(3).stinger_probability(0.0));
        let mut always = PatternCursor::new(&ScoreConfig::default().seed(3).stinger_probability(1.0));
        for i in 0..50 {
            assert!(!never.next_entry(i as f64).stinger);
            assert!(always.next_entry(i as f64).stinger);
        }
    }

    #[test]
    fn seeded_cursors_agree() {
        let config = ScoreConfig::default().seed(42);
        let mut a = PatternCursor::new(&config);
        let mut b = PatternCursor::new(&config);
        for i in 0..100 {
            assert_eq!(a.next_entry(i as f64), b.next_entry(i as f64));
        }
    }

    #[test]
    fn stinger_rate_is_roughly_ten_percent() {
        let mut cursor = PatternCursor::new(&ScoreConfig::default().seed(9));
        let hits = (0..10_000).filter(|i| cursor.next_entry(*i as f64).stinger).count();
        assert!((800..1200).contains(&hits), "got {hits} stingers");
    }

    #[test]
    fn tick_skips_while_suspended() {
        let (ctx, _driver) = offline();
        let config = ScoreConfig::default().seed(1).stinger_probability(0.0);
        let mut player = StepPlayer::new(ctx.clone(), &config);

        let Tick::Fired(entry) = player.tick() else {
            panic!("running context should fire");
        };
        assert_eq!(entry.note, Some(110.0));

        ctx.suspend().unwrap();
        assert_eq!(player.tick(), Tick::Skipped);
        assert_eq!(player.cursor.step(), 1);

        ctx.resume().unwrap();
        let Tick::Fired(entry) = player.tick() else {
            panic!("resumed context should fire");
        };
        assert_eq!(entry.note, None);

        ctx.close().unwrap();
        assert_eq!(player.tick(), Tick::Closed);
    }

    #[test]
    fn start_creates_every_drone_once() {
        let (ctx, driver) = offline();
        let mut score = ScoreSequencer::new(ScoreConfig::default().seed(5));
        assert!(score.start(&ctx).unwrap());
        assert_eq!(score.drone_count(), 2);
        let ids = score.drone_ids();

        assert!(!score.start(&ctx).unwrap());
        assert_eq!(score.drone_ids(), ids);

        driver.render_frames(80);
        assert!(ctx.active_voices() >= 2);
        assert!(ctx.poll_events().contains(&AudioEvent::ScoreStarted { drones: 2 }));
        score.stop();
    }

    #[test]
    fn stop_fades_drones_out() {
        let (ctx, driver) = offline();
        let mut score = ScoreSequencer::new(ScoreConfig::default().seed(5));
        score.start(&ctx).unwrap();
        driver.render_frames(800);

        assert!(score.stop());
        assert!(!score.stop());
        assert_eq!(score.drone_count(), 0);

        // one-second fade, then every drone is gone
        driver.render_frames(8000 + 800);
        assert_eq!(ctx.active_voices(), 0);
        assert!(ctx.poll_events().contains(&AudioEvent::ScoreStopped));
    }

    #[test]
    fn stop_tolerates_closed_context() {
        let (ctx, _driver) = offline();
        let mut score = ScoreSequencer::new(ScoreConfig::default());
        score.start(&ctx).unwrap();
        ctx.close().unwrap();
        assert!(score.stop());
        assert!(!score.is_playing());
    }

    #[test]
    fn start_on_closed_context_leaves_nothing() {
        let (ctx, _driver) = offline();
        ctx.close().unwrap();
        let mut score = ScoreSequencer::new(ScoreConfig::default());
        assert!(score.start(&ctx).is_err());
        assert_eq!(score.drone_count(), 0);
        assert!(!score.is_playing());
    }

    #[test]
    fn clock_schedules_notes_until_stopped() {
        let (ctx, driver) = offline();
        let config = ScoreConfig::default()
            .seed(2)
            .stinger_probability(0.0)
            .step_period(Duration::from_millis(5));
        let mut score = ScoreSequencer::new(config);
        score.start(&ctx).unwrap();
        thread::sleep(Duration::from_millis(60));
        score.stop();

        driver.render_frames(8);
        // drones plus at least one pattern note
        assert!(ctx.active_voices() > 2);

        // nothing new is allocated once stop has returned
        let before = ctx.allocate_voice_id().unwrap();
        thread::sleep(Duration::from_millis(30));
        let after = ctx.allocate_voice_id().unwrap();
        assert_eq!(after.get(), before.get() + 1);
    }
}
