//! Supported companion languages and their fixed per-language data
//!
//! Voice selection, fallback phrases and prompt wording all come from a single
//! immutable table keyed by [`Language`].

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Language the companion speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    /// English
    #[default]
    En,
    /// Hindi
    Hi,
    /// Tamil
    Ta,
}

/// Fixed data attached to a language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    /// Language this profile describes
    pub language: Language,
    /// Short code used on the wire and in config ("en", "hi", "ta")
    pub code: &'static str,
    /// English name, used inside provider prompts
    pub name: &'static str,
    /// Prebuilt synthesis voice
    pub voice: &'static str,
    /// Phrase spoken when content could not be fetched
    pub fallback_phrase: &'static str,
}

const PROFILES: [LanguageProfile; 3] = [
    LanguageProfile {
        language: Language::En,
        code: "en",
        name: "English",
        voice: "Puck",
        fallback_phrase: "Keep learning!",
    },
    LanguageProfile {
        language: Language::Hi,
        code: "hi",
        name: "Hindi",
        voice: "Kore",
        fallback_phrase: "खूब पढ़ते रहो!",
    },
    LanguageProfile {
        language: Language::Ta,
        code: "ta",
        name: "Tamil",
        voice: "Kore",
        fallback_phrase: "தொடர்ந்து படியுங்கள்!",
    },
];

impl Language {
    /// All supported languages
    pub const ALL: [Self; 3] = [Self::En, Self::Hi, Self::Ta];

    /// Look up the fixed profile for this language
    #[must_use]
    pub fn profile(self) -> &'static LanguageProfile {
        PROFILES
            .iter()
            .find(|p| p.language == self)
            .unwrap_or(&PROFILES[0])
    }

    /// Parse a language code, falling back to English when unrecognized
    #[must_use]
    pub fn from_code_or_default(code: &str) -> Self {
        code.parse().unwrap_or_else(|_| {
            tracing::debug!(code, "unrecognized language code, using english");
            Self::default()
        })
    }

    /// Short language code
    #[must_use]
    pub fn code(self) -> &'static str {
        self.profile().code
    }

    /// English display name
    #[must_use]
    pub fn name(self) -> &'static str {
        self.profile().name
    }

    /// Synthesis voice identifier
    #[must_use]
    pub fn voice(self) -> &'static str {
        self.profile().voice
    }

    /// Localized fallback phrase
    #[must_use]
    pub fn fallback_phrase(self) -> &'static str {
        self.profile().fallback_phrase
    }

    /// Wrap `text` in the instruction sent to the speech provider
    ///
    /// English text is sent verbatim. Other languages get an instruction to
    /// speak the same text in that language.
    #[must_use]
    pub fn speech_prompt(self, text: &str) -> String {
        match self {
            Self::En => text.to_string(),
            other => format!("Speak this in {}: {text}", other.name()),
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        PROFILES
            .iter()
            .find(|p| p.code.eq_ignore_ascii_case(needle) || p.name.eq_ignore_ascii_case(needle))
            .map(|p| p.language)
            .ok_or_else(|| Error::Config(format!("unsupported language: {s}")))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_table() {
        assert_eq!(Language::En.voice(), "Puck");
        assert_eq!(Language::Hi.voice(), "Kore");
        assert_eq!(Language::Ta.voice(), "Kore");
    }

    #[test]
    fn every_language_has_a_profile() {
        for lang in Language::ALL {
            assert_eq!(lang.profile().language, lang);
            assert!(!lang.fallback_phrase().is_empty());
        }
    }

    #[test]
    fn parse_codes_and_names() {
        assert_eq!("hi".parse::<Language>().unwrap(), Language::Hi);
        assert_eq!(" TA ".parse::<Language>().unwrap(), Language::Ta);
        assert_eq!("English".parse::<Language>().unwrap(), Language::En);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn unknown_code_defaults_to_english() {
        assert_eq!(Language::from_code_or_default("xx"), Language::En);
        assert_eq!(Language::from_code_or_default("hi"), Language::Hi);
    }

    #[test]
    fn english_prompt_is_verbatim() {
        assert_eq!(Language::En.speech_prompt("Well done!"), "Well done!");
    }

    #[test]
    fn other_languages_wrap_the_same_text() {
        assert_eq!(
            Language::Hi.speech_prompt("Well done!"),
            "Speak this in Hindi: Well done!"
        );
        assert_eq!(
            Language::Ta.speech_prompt("Well done!"),
            "Speak this in Tamil: Well done!"
        );
    }

    #[test]
    fn english_fallback_phrase() {
        assert_eq!(Language::En.fallback_phrase(), "Keep learning!");
    }
}
