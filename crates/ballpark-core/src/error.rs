//! Error types for ballpark-core.

use crate::voice::VoiceId;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while turning game state into music.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The sound engine is unavailable or the activation precondition is unmet.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A snapshot was malformed or incomplete.
    #[error("Data error: {0}")]
    Data(String),

    /// Invalid music configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single voice failed to configure, start or stop.
    #[error("Voice '{voice}' failed: {reason}")]
    Voice { voice: VoiceId, reason: String },

    /// The sound backend rejected an instruction.
    #[error("Sound engine error: {0}")]
    Sound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl EngineError {
    /// Wrap a backend failure for a specific voice.
    pub fn voice(voice: VoiceId, reason: impl Into<String>) -> Self {
        Self::Voice {
            voice,
            reason: reason.into(),
        }
    }
}
