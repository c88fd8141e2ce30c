//! The rendering context: the single owner of the output stream and its clock.
//!
//! Everything audible is a voice attached to a [`RenderContext`]. The control
//! thread only schedules future changes against [`RenderContext::current_time`];
//! the output's real-time callback renders them.

use crate::config::AudioEngineDesc;
use crate::engine::{AudioFillCallback, AudioOutput, StreamErrorCallback};
use crate::error::{OutbreakAudioError, Result};
use crate::events::{AudioEvent, EventSink};
use crate::mixer::Renderer;
use crate::playback::RenderCommand;
use crate::voice::{Voice, VoiceId};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Maximum number of undrained events kept for `poll_events`.
const EVENT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Output is live and the clock advances
    Running,
    /// Output is silent and the clock is frozen
    Suspended,
    /// Torn down; no voice can be attached any more
    Closed,
}

/// Cheaply clonable handle to the rendering context.
#[derive(Clone)]
pub struct RenderContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    sample_rate: u32,
    channels: u16,
    state: Mutex<ContextState>,
    /// Read by the device callback; false renders silence without advancing the clock
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    next_voice_id: AtomicU64,
    commands: Sender<RenderCommand>,
    events: EventSink,
    event_receiver: Receiver<AudioEvent>,
    renderer: Arc<Mutex<Renderer>>,
    output: Mutex<Box<dyn AudioOutput>>,
}

impl RenderContext {
    /// Open `output` and start rendering into it.
    pub fn new(desc: &AudioEngineDesc, mut output: Box<dyn AudioOutput>) -> Result<Self> {
        desc.validate()?;

        let (command_sender, command_receiver) = crossbeam_channel::unbounded();
        let (event_sender, event_receiver) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
        let events = EventSink::new(event_sender);

        let frames = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let renderer = Arc::new(Mutex::new(Renderer::new(
            command_receiver,
            events.clone(),
            frames.clone(),
            desc.sample_rate,
            desc.max_voices,
        )));

        let fill: Arc<AudioFillCallback> = {
            let running = running.clone();
            let renderer = renderer.clone();
            Arc::new(move |buffer: &mut [f32], sample_rate: u32, channels: u16| {
                if !running.load(Ordering::Acquire) {
                    buffer.fill(0.0);
                    return 0;
                }
                match renderer.try_lock() {
                    Some(mut renderer) => renderer.render(buffer, sample_rate, channels),
                    None => {
                        buffer.fill(0.0);
                        0
                    }
                }
            })
        };
        let on_error: Arc<StreamErrorCallback> = {
            let events = events.clone();
            Arc::new(move |error: &str| {
                events.emit(AudioEvent::StreamError {
                    error: error.to_string(),
                })
            })
        };

        let info = output.start(desc, fill, on_error)?;
        log::info!(
            "Rendering context started: {} Hz, {} ch",
            info.sample_rate,
            info.channels
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                sample_rate: info.sample_rate,
                channels: info.channels,
                state: Mutex::new(ContextState::Running),
                running,
                frames,
                next_voice_id: AtomicU64::new(0),
                commands: command_sender,
                events,
                event_receiver,
                renderer,
                output: Mutex::new(output),
            }),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    /// Seconds of audio rendered since the context started.
    pub fn current_time(&self) -> f64 {
        self.inner.frames.load(Ordering::Acquire) as f64 / self.inner.sample_rate as f64
    }

    pub fn state(&self) -> ContextState {
        *self.inner.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ContextState::Closed
    }

    /// Voices currently in the mix (queued submissions are not counted).
    pub fn active_voices(&self) -> usize {
        self.inner.renderer.lock().active_voices()
    }

    pub fn suspend(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match *state {
            ContextState::Suspended => return Ok(()),
            ContextState::Closed => return Err(OutbreakAudioError::ContextClosed),
            ContextState::Running => {}
        }

        self.inner.running.store(false, Ordering::Release);
        if let Err(e) = self.inner.output.lock().suspend() {
            log::warn!("Output refused to suspend: {}", e);
        }
        *state = ContextState::Suspended;
        log::info!("Rendering context suspended at {:.3}s", self.current_time());
        self.inner.events.emit(AudioEvent::ContextSuspended);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match *state {
            ContextState::Running => return Ok(()),
            ContextState::Closed => return Err(OutbreakAudioError::ContextClosed),
            ContextState::Suspended => {}
        }

        if let Err(e) = self.inner.output.lock().resume() {
            log::warn!("Output refused to resume: {}", e);
        }
        self.inner.running.store(true, Ordering::Release);
        *state = ContextState::Running;
        log::info!("Rendering context resumed at {:.3}s", self.current_time());
        self.inner.events.emit(AudioEvent::ContextResumed);
        Ok(())
    }

    /// Tear the context down. Every voice is released with the output.
    pub fn close(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if *state == ContextState::Closed {
            return Ok(());
        }

        self.inner.running.store(false, Ordering::Release);
        let _ = self.inner.commands.send(RenderCommand::ReleaseAll);
        let result = self.inner.output.lock().close();
        *state = ContextState::Closed;
        log::info!("Rendering context closed");
        self.inner.events.emit(AudioEvent::ContextClosed);
        result
    }

    pub(crate) fn allocate_voice_id(&self) -> Result<VoiceId> {
        if self.is_closed() {
            return Err(OutbreakAudioError::ContextClosed);
        }
        Ok(VoiceId(
            self.inner.next_voice_id.fetch_add(1, Ordering::Relaxed),
        ))
    }

    pub(crate) fn submit(&self, voice: Voice) -> Result<()> {
        self.send(RenderCommand::Start(Box::new(voice)))
    }

    /// Ramp a voice to silence over `fade_seconds`, then release it.
    /// Voices that already finished are ignored by the renderer.
    pub fn fade_out(&self, voice_id: VoiceId, fade_seconds: f64) -> Result<()> {
        self.send(RenderCommand::FadeOut {
            voice_id,
            fade: fade_seconds,
        })
    }

    /// Stop a voice immediately.
    pub fn release(&self, voice_id: VoiceId) -> Result<()> {
        self.send(RenderCommand::Release(voice_id))
    }

    fn send(&self, command: RenderCommand) -> Result<()> {
        if self.is_closed() {
            return Err(OutbreakAudioError::ContextClosed);
        }
        self.inner
            .commands
            .send(command)
            .map_err(|_| OutbreakAudioError::ContextClosed)
    }

    pub(crate) fn emit(&self, event: AudioEvent) {
        self.inner.events.emit(event);
    }

    /// Drain pending notifications.
    pub fn poll_events(&self) -> Vec<AudioEvent> {
        self.inner.event_receiver.try_iter().collect()
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("sample_rate", &self.inner.sample_rate)
            .field("channels", &self.inner.channels)
            .field("state", &self.state())
            .field("current_time", &self.current_time())
            .finish()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let _ = self.output.get_mut().close();
    }
}
