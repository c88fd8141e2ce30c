//! Commands sent from the control thread to the renderer.

use crate::voice::{Voice, VoiceId};

/// Instructions for the renderer, applied at the start of the next block.
///
/// Commands addressing a voice that already finished are ignored.
#[derive(Debug)]
pub enum RenderCommand {
    /// Add a voice to the mix
    Start(Box<Voice>),
    /// Hold the current level, ramp linearly to silence over `fade` seconds, then release
    FadeOut { voice_id: VoiceId, fade: f64 },
    /// Stop a voice immediately
    Release(VoiceId),
    /// Stop every voice immediately
    ReleaseAll,
}
