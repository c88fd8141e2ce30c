// Mixer module - renders every active voice into the output buffer.
// Runs inside the device callback; commands from the control thread are
// drained at the start of each block.

use crate::events::{AudioEvent, EventSink};
use crate::playback::RenderCommand;
use crate::voice::{Voice, VoiceId, VoiceKind};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Renderer {
    voices: Vec<Voice>,
    commands: Receiver<RenderCommand>,
    events: EventSink,
    /// Frames rendered since the context was created; the context clock
    frames: Arc<AtomicU64>,
    sample_rate: u32,
    max_voices: usize,
}

impl Renderer {
    pub(crate) fn new(
        commands: Receiver<RenderCommand>,
        events: EventSink,
        frames: Arc<AtomicU64>,
        sample_rate: u32,
        max_voices: usize,
    ) -> Self {
        Self {
            voices: Vec::with_capacity(max_voices),
            commands,
            events,
            frames,
            sample_rate,
            max_voices,
        }
    }

    pub(crate) fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn now(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    /// Mix one block into `buffer` (interleaved) and advance the clock.
    /// Returns the number of frames rendered.
    pub(crate) fn render(&mut self, buffer: &mut [f32], sample_rate: u32, channels: u16) -> usize {
        if sample_rate != 0 {
            self.sample_rate = sample_rate;
        }
        self.apply_commands();

        buffer.fill(0.0);
        let channels = channels.max(1) as usize;
        let frame_count = buffer.len() / channels;
        let first_frame = self.frames.load(Ordering::Acquire);
        let sample_rate = self.sample_rate as f64;

        for (frame_idx, frame) in buffer.chunks_exact_mut(channels).enumerate() {
            let time = (first_frame + frame_idx as u64) as f64 / sample_rate;
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut() {
                mix += voice.render_sample(time);
            }
            frame.fill(mix.clamp(-1.0, 1.0));
        }

        let end_frame = first_frame + frame_count as u64;
        self.frames.store(end_frame, Ordering::Release);
        self.retire(end_frame as f64 / sample_rate);

        frame_count
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                RenderCommand::Start(voice) => self.add_voice(*voice),
                RenderCommand::FadeOut { voice_id, fade } => {
                    let now = self.now();
                    match self.voice_mut(voice_id) {
                        Some(voice) => voice.fade_out(now, fade),
                        None => log::debug!("Fade for {} ignored, voice already gone", voice_id),
                    }
                }
                RenderCommand::Release(voice_id) => {
                    let now = self.now();
                    match self.voice_mut(voice_id) {
                        Some(voice) => voice.release(now),
                        None => {
                            log::debug!("Release for {} ignored, voice already gone", voice_id)
                        }
                    }
                }
                RenderCommand::ReleaseAll => {
                    let now = self.now();
                    for voice in self.voices.iter_mut() {
                        voice.release(now);
                    }
                }
            }
        }
    }

    /// Effect voices beyond `max_voices` are dropped. Drones are owned by the
    /// score sequencer and never count against the cap or get dropped.
    fn add_voice(&mut self, voice: Voice) {
        let capped = voice.kind() != VoiceKind::Drone;
        if capped && self.effect_voices() >= self.max_voices {
            log::warn!(
                "Voice limit ({}) reached, dropping {}",
                self.max_voices,
                voice.id()
            );
            self.events.emit(AudioEvent::VoiceDropped {
                voice_id: voice.id(),
                kind: voice.kind(),
            });
            return;
        }
        self.voices.push(voice);
    }

    fn effect_voices(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.kind() != VoiceKind::Drone)
            .count()
    }

    fn voice_mut(&mut self, voice_id: VoiceId) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|v| v.id() == voice_id)
    }

    /// Publish start notifications and drop voices whose stop time has passed.
    fn retire(&mut self, block_end: f64) {
        for voice in self.voices.iter_mut() {
            if voice.mark_started(block_end) {
                self.events.emit(AudioEvent::VoiceStarted {
                    voice_id: voice.id(),
                    kind: voice.kind(),
                });
            }
        }

        let events = &self.events;
        self.voices.retain(|voice| {
            if !voice.is_expired(block_end) {
                return true;
            }
            log::debug!("Voice {} finished at {:.3}s", voice.id(), block_end);
            if voice.has_started() {
                events.emit(AudioEvent::VoiceFinished {
                    voice_id: voice.id(),
                    kind: voice.kind(),
                });
            }
            false
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Sender, unbounded};

    // Voices are only constructible through VoiceBuilder::schedule, so these
    // tests drive the renderer through a live offline context.
    use crate::config::AudioEngineDesc;
    use crate::context::RenderContext;
    use crate::dsp::Waveform;
    use crate::engine::OfflineDriver;
    use crate::param::AudioParam;
    use crate::voice::VoiceBuilder;

    fn renderer(max_voices: usize) -> (Renderer, Sender<RenderCommand>, Receiver<AudioEvent>) {
        let (tx, rx) = unbounded();
        let (etx, erx) = unbounded();
        let renderer = Renderer::new(
            rx,
            EventSink::new(etx),
            Arc::new(AtomicU64::new(0)),
            1000,
            max_voices,
        );
        (renderer, tx, erx)
    }

    #[test]
    fn empty_mix_is_silent_and_advances_clock() {
        let (mut r, _tx, _events) = renderer(4);
        let mut buffer = vec![1.0f32; 200];
        assert_eq!(r.render(&mut buffer, 1000, 2), 100);
        assert!(buffer.iter().all(|s| *s == 0.0));
        assert!((r.now() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn unknown_voice_commands_are_ignored() {
        let (mut r, tx, _events) = renderer(4);
        tx.send(RenderCommand::FadeOut {
            voice_id: VoiceId(42),
            fade: 1.0,
        })
        .unwrap();
        tx.send(RenderCommand::Release(VoiceId(42))).unwrap();
        let mut buffer = vec![0.0f32; 16];
        r.render(&mut buffer, 1000, 1);
        assert_eq!(r.active_voices(), 0);
    }

    #[test]
    fn voices_copy_to_every_channel_and_expire() {
        let driver = OfflineDriver::new();
        let desc = AudioEngineDesc::new().sample_rate(1000).block_size(10);
        let ctx = RenderContext::new(&desc, Box::new(driver.output())).unwrap();

        let mut gain = AudioParam::new(0.0);
        gain.set_value_at_time(0.5, 0.0);
        VoiceBuilder::periodic(Waveform::Triangle, 10.0)
            .gain(gain)
            .stop_at(0.05)
            .schedule(&ctx)
            .unwrap();

        let out = driver.render_frames(100);
        // first frame: triangle trough at half gain, both channels
        assert_eq!(out[0], -0.5);
        assert_eq!(out[1], -0.5);
        // after 50 ms the voice has stopped
        assert!(out[120..].iter().all(|s| *s == 0.0));
        assert_eq!(ctx.active_voices(), 0);

        let events = ctx.poll_events();
        assert!(events.iter().any(|e| matches!(e, AudioEvent::VoiceStarted { .. })));
        assert!(events.iter().any(|e| matches!(e, AudioEvent::VoiceFinished { .. })));
    }

    #[test]
    fn voice_cap_drops_excess() {
        let driver = OfflineDriver::new();
        let desc = AudioEngineDesc::new().sample_rate(1000).max_voices(2);
        let ctx = RenderContext::new(&desc, Box::new(driver.output())).unwrap();
        for _ in 0..3 {
            VoiceBuilder::periodic(Waveform::Sine, 100.0)
                .stop_at(10.0)
                .schedule(&ctx)
                .unwrap();
        }
        driver.render_frames(10);
        assert_eq!(ctx.active_voices(), 2);
        assert!(
            ctx.poll_events()
                .iter()
                .any(|e| matches!(e, AudioEvent::VoiceDropped { .. }))
        );
    }

    #[test]
    fn drones_bypass_a_full_voice_cap() {
        let driver = OfflineDriver::new();
        let desc = AudioEngineDesc::new().sample_rate(1000).max_voices(1);
        let ctx = RenderContext::new(&desc, Box::new(driver.output())).unwrap();
        VoiceBuilder::periodic(Waveform::Sine, 100.0)
            .stop_at(10.0)
            .schedule(&ctx)
            .unwrap();
        driver.render_frames(10);
        for _ in 0..2 {
            VoiceBuilder::periodic(Waveform::Sawtooth, 55.0)
                .kind(VoiceKind::Drone)
                .stop_at(f64::INFINITY)
                .schedule(&ctx)
                .unwrap();
        }
        driver.render_frames(10);
        assert_eq!(ctx.active_voices(), 3);

        // drones do not use up effect slots either
        VoiceBuilder::periodic(Waveform::Sine, 100.0)
            .stop_at(10.0)
            .schedule(&ctx)
            .unwrap();
        driver.render_frames(10);
        assert_eq!(ctx.active_voices(), 3);
        assert!(
            !ctx.poll_events()
                .iter()
                .any(|e| matches!(e, AudioEvent::VoiceDropped { kind: VoiceKind::Drone, .. }))
        );
    }
}
