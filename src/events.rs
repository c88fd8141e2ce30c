//! Notifications published by the rendering context, the renderer and the score.

use crate::voice::{VoiceId, VoiceKind};
use crossbeam_channel::{Sender, TrySendError};

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    VoiceStarted { voice_id: VoiceId, kind: VoiceKind },
    VoiceFinished { voice_id: VoiceId, kind: VoiceKind },
    /// A new voice was refused because `max_voices` were already active
    VoiceDropped { voice_id: VoiceId, kind: VoiceKind },
    ContextSuspended,
    ContextResumed,
    ContextClosed,
    ScoreStarted { drones: usize },
    ScoreStopped,
    StreamError { error: String },
}

impl AudioEvent {
    pub fn voice_id(&self) -> Option<VoiceId> {
        match self {
            Self::VoiceStarted { voice_id, .. }
            | Self::VoiceFinished { voice_id, .. }
            | Self::VoiceDropped { voice_id, .. } => Some(*voice_id),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::StreamError { .. } | Self::VoiceDropped { .. })
    }
}

/// Non-blocking publisher. Events are discarded while nobody drains the queue.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: Sender<AudioEvent>,
}

impl EventSink {
    pub(crate) fn new(sender: Sender<AudioEvent>) -> Self {
        Self { sender }
    }

    pub(crate) fn emit(&self, event: AudioEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::trace!("Event queue full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let sink = EventSink::new(tx);
        sink.emit(AudioEvent::ContextSuspended);
        sink.emit(AudioEvent::ContextResumed);
        let drained: Vec<_> = rx.try_iter().collect();
        assert_eq!(drained, vec![AudioEvent::ContextSuspended]);
    }

    #[test]
    fn voice_id_only_on_voice_events() {
        let id = VoiceId(3);
        let started = AudioEvent::VoiceStarted {
            voice_id: id,
            kind: VoiceKind::Tonal,
        };
        assert_eq!(started.voice_id(), Some(id));
        assert_eq!(AudioEvent::ScoreStopped.voice_id(), None);
        assert!(!started.is_error());
        assert!(AudioEvent::StreamError { error: "x".into() }.is_error());
    }
}
