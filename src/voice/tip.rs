//! Short encouragement tips generated for the learner

use async_trait::async_trait;

use crate::gemini::{FailureKind, GeminiClient, GenerateRequest};
use crate::language::Language;
use crate::Result;

/// Context used when the caller gives none
pub const DEFAULT_TIP_CONTEXT: &str = "general learning";

/// Profile summary the tip is personalised with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Learner {
    /// Display name
    pub name: String,
    /// Current level
    pub level: u32,
}

impl Learner {
    #[must_use]
    pub fn new(name: impl Into<String>, level: u32) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }
}

/// Source of companion tips
#[async_trait]
pub trait TipSource: Send + Sync {
    /// Produce a short tip about `context` in `language`
    ///
    /// # Errors
    ///
    /// Returns `RequestFailed` if no tip could be produced
    async fn companion_tip(
        &self,
        learner: &Learner,
        language: Language,
        context: &str,
    ) -> Result<String>;
}

/// Build the tip prompt
#[must_use]
pub fn tip_prompt(learner: &Learner, language: Language, context: &str) -> String {
    let context = if context.trim().is_empty() {
        DEFAULT_TIP_CONTEXT
    } else {
        context.trim()
    };

    format!(
        "You are 'Mitra', a friendly AI companion for a rural Indian student named {} (Level {}). \
         Give a very short (max 15 words) encouragement or tip about {context}. \
         Reply in {}. Keep it fun and use simple words.",
        learner.name,
        learner.level,
        language.name()
    )
}

/// Generates tips through the generative API
pub struct GeminiTips {
    client: GeminiClient,
    model: String,
}

impl GeminiTips {
    /// Create a tip source using `model`
    #[must_use]
    pub const fn new(client: GeminiClient, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl TipSource for GeminiTips {
    async fn companion_tip(
        &self,
        learner: &Learner,
        language: Language,
        context: &str,
    ) -> Result<String> {
        let body = GenerateRequest::text(tip_prompt(learner, language, context));
        let response = self.client.generate(&self.model, &body).await?;

        response
            .text()
            .ok_or_else(|| FailureKind::EmptyPayload.into_error(&self.model, "response carried no text"))
    }
}
