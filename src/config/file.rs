//! TOML configuration file loading
//!
//! Supports `~/.config/mitra/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MitraConfigFile {
    /// Generative API settings
    #[serde(default)]
    pub gemini: GeminiFileConfig,

    /// Audio output settings
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Companion timing settings
    #[serde(default)]
    pub companion: CompanionFileConfig,
}

/// Generative API configuration
#[derive(Debug, Default, Deserialize)]
pub struct GeminiFileConfig {
    pub api_key: Option<String>,

    /// Base URL (e.g. "https://generativelanguage.googleapis.com")
    pub base_url: Option<String>,

    /// Model used for speech synthesis
    pub speech_model: Option<String>,

    /// Model used for companion tips
    pub tip_model: Option<String>,

    /// Per-request timeout; unset means no timeout
    pub request_timeout_secs: Option<u64>,
}

/// Audio configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Companion timing configuration
#[derive(Debug, Default, Deserialize)]
pub struct CompanionFileConfig {
    /// Dwell after speaking before returning to idle
    pub cooldown_ms: Option<u64>,

    /// How long the message bubble stays after returning to idle
    pub message_linger_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `MitraConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MitraConfigFile {
    config_file_path().map_or_else(MitraConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from `path`
///
/// Returns `MitraConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_from(path: &Path) -> MitraConfigFile {
    if !path.exists() {
        return MitraConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                MitraConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MitraConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/mitra/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("mitra").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let fc: MitraConfigFile = toml::from_str(
            r#"
            [gemini]
            speech_model = "custom-tts"

            [companion]
            cooldown_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(fc.gemini.speech_model.as_deref(), Some("custom-tts"));
        assert_eq!(fc.companion.cooldown_ms, Some(250));
        assert!(fc.gemini.api_key.is_none());
        assert!(fc.audio.sample_rate.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let fc = load_from(Path::new("/nonexistent/mitra/config.toml"));
        assert!(fc.gemini.base_url.is_none());
    }
}
