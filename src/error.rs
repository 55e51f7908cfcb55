//! Error types for the Mitra voice pipeline

use thiserror::Error;

/// Result type alias for Mitra voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
///
/// None of these ever reach the caller of [`crate::Companion::speak`]; the
/// controller logs them and falls back to a silent or canned response.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech or tip request could not produce content
    ///
    /// Covers transport failures, upstream error responses and responses
    /// that carry no payload
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Audio payload violates the PCM16 framing rules
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// Output device or stream error
    #[error("playback failed: {0}")]
    PlaybackFailed(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
