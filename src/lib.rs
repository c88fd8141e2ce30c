//! Procedural audio for games: every effect and the background score are
//! synthesized from oscillators and noise, no recorded assets.
//!
//! ```no_run
//! use outbreak_audio::{AudioEngineDesc, GameAudio, SoundEvent};
//!
//! let audio = GameAudio::new(AudioEngineDesc::default());
//! // from the first click or key press
//! audio.initialize();
//! audio.start_score();
//! audio.dispatch(SoundEvent::WeaponSniper);
//! audio.toggle_mute();
//! ```

pub mod config;
pub mod context;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod events;
mod mixer;
pub mod param;
mod playback;
pub mod router;
pub mod score;
pub mod service;
pub mod synth;
pub mod voice;

pub use config::{AudioEngineDesc, NoteVoice, ScoreConfig};
pub use context::{ContextState, RenderContext};
pub use dsp::Waveform;
pub use engine::{
    AudioFillCallback, AudioOutput, CpalOutput, OfflineDriver, OfflineOutput, StreamInfo,
};
pub use error::{OutbreakAudioError, Result};
pub use events::AudioEvent;
pub use param::{AudioParam, Automation};
pub use router::{DispatchOutcome, RateLimiter, SoundEvent, SoundRouter};
pub use score::{DroneVoice, PatternCursor, ScheduleEntry, ScoreSequencer};
pub use service::GameAudio;
pub use synth::{NoiseTimbre, WeaponClass};
pub use voice::{VoiceBuilder, VoiceHandle, VoiceId, VoiceKind};
