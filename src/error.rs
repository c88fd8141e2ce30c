//! Error types for the audio engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutbreakAudioError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid automation: {0}")]
    InvalidAutomation(String),

    #[error("Rendering context is closed")]
    ContextClosed,

    #[error("Audio output unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, OutbreakAudioError>;
