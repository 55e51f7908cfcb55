//! Text-to-speech (TTS) requests

use async_trait::async_trait;

use crate::gemini::{FailureKind, GeminiClient, GenerateRequest};
use crate::language::Language;
use crate::voice::pcm::EncodedAudio;
use crate::{Error, Result};

/// One thing for the companion to say
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    /// Content to speak
    pub text: String,
    /// Language to speak it in
    pub language: Language,
    /// Free-form hint about where the request came from
    pub context_hint: String,
}

impl SpeechRequest {
    /// Create a request
    #[must_use]
    pub fn new(text: impl Into<String>, language: Language) -> Self {
        Self {
            text: text.into(),
            language,
            context_hint: String::new(),
        }
    }

    /// Attach a context hint
    #[must_use]
    pub fn with_context(mut self, hint: impl Into<String>) -> Self {
        self.context_hint = hint.into();
        self
    }

    /// Prompt sent to the provider
    #[must_use]
    pub fn prompt(&self) -> String {
        self.language.speech_prompt(&self.text)
    }

    /// Voice used for this request
    #[must_use]
    pub fn voice(&self) -> &'static str {
        self.language.voice()
    }
}

/// Source of synthesized speech
#[async_trait]
pub trait SpeechClient: Send + Sync {
    /// Request speech for `request`
    ///
    /// # Errors
    ///
    /// Returns `RequestFailed` for every failure, including an empty payload
    async fn request_speech(&self, request: &SpeechRequest) -> Result<EncodedAudio>;
}

/// Synthesizes speech through the generative API
pub struct GeminiSpeech {
    client: GeminiClient,
    model: String,
}

impl GeminiSpeech {
    /// Create a speech client using `model`
    #[must_use]
    pub const fn new(client: GeminiClient, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl SpeechClient for GeminiSpeech {
    async fn request_speech(&self, request: &SpeechRequest) -> Result<EncodedAudio> {
        if request.text.trim().is_empty() {
            return Err(Error::RequestFailed("nothing to say".to_string()));
        }

        tracing::debug!(
            language = %request.language,
            voice = request.voice(),
            chars = request.text.chars().count(),
            "requesting speech"
        );

        let body = GenerateRequest::speech(request.prompt(), request.voice());
        let response = self.client.generate(&self.model, &body).await?;

        let Some(data) = response.inline_audio() else {
            return Err(FailureKind::EmptyPayload.into_error(&self.model, "response carried no audio"));
        };

        let audio = EncodedAudio::from_base64(data);
        tracing::debug!(encoded_len = data.len(), "speech received");
        Ok(audio)
    }
}
