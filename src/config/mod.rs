//! Configuration management for the Mitra voice pipeline

pub mod file;

use std::time::Duration;

use crate::companion::CompanionTimings;
use crate::voice::{SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use crate::{Error, Result};

use file::MitraConfigFile;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
const DEFAULT_TIP_MODEL: &str = "gemini-3-flash-preview";

/// Mitra voice configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Generative API configuration
    pub api: ApiConfig,

    /// Audio format of synthesized speech
    pub audio: AudioConfig,

    /// Companion state machine timings
    pub companion: CompanionTimings,
}

/// Generative API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API key (from `GEMINI_API_KEY` or `API_KEY`)
    pub api_key: Option<String>,

    /// API base URL
    pub base_url: String,

    /// Model for speech synthesis
    pub speech_model: String,

    /// Model for companion tips
    pub tip_model: String,

    /// Per-request timeout; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            tip_model: DEFAULT_TIP_MODEL.to_string(),
            request_timeout: None,
        }
    }
}

/// Audio format of the speech payload
///
/// The payload carries no header, so these must match what the provider sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Frames per second
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SPEECH_SAMPLE_RATE,
            channels: SPEECH_CHANNELS,
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the resolved configuration is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::from_sources(fc, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration from a parsed file and an environment lookup
    pub fn from_sources(fc: MitraConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api = ApiConfig {
            api_key: env("GEMINI_API_KEY")
                .or_else(|| env("API_KEY"))
                .or(fc.gemini.api_key)
                .filter(|k| !k.is_empty()),
            base_url: env("MITRA_API_BASE_URL")
                .or(fc.gemini.base_url)
                .unwrap_or(defaults.api.base_url),
            speech_model: env("MITRA_SPEECH_MODEL")
                .or(fc.gemini.speech_model)
                .unwrap_or(defaults.api.speech_model),
            tip_model: env("MITRA_TIP_MODEL")
                .or(fc.gemini.tip_model)
                .unwrap_or(defaults.api.tip_model),
            request_timeout: env("MITRA_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.gemini.request_timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };

        let audio = AudioConfig {
            sample_rate: fc.audio.sample_rate.unwrap_or(defaults.audio.sample_rate),
            channels: fc.audio.channels.unwrap_or(defaults.audio.channels),
        };

        let companion = CompanionTimings {
            cooldown: env("MITRA_COOLDOWN_MS")
                .and_then(|s| s.parse().ok())
                .or(fc.companion.cooldown_ms)
                .map_or(defaults.companion.cooldown, Duration::from_millis),
            message_linger: env("MITRA_MESSAGE_LINGER_MS")
                .and_then(|s| s.parse().ok())
                .or(fc.companion.message_linger_ms)
                .map_or(defaults.companion.message_linger, Duration::from_millis),
        };

        Self {
            api,
            audio,
            companion,
        }
    }

    /// Check the configuration for values the pipeline cannot work with
    ///
    /// # Errors
    ///
    /// Returns error if the sample rate or channel count is zero
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio sample rate must be non-zero".to_string()));
        }
        if self.audio.channels == 0 {
            return Err(Error::Config("audio channel count must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Whether network clients can be built
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api.api_key.is_some()
    }
}
