//! Mitra Voice - spoken feedback for a learning companion avatar
//!
//! This library provides the voice-response pipeline behind the companion:
//! - Speech requests to the generative API (with per-language voices)
//! - PCM16 payload decoding
//! - Playback on the local output device
//! - A small state machine the UI observes to render the avatar
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 Companion (controller)            │
//! │   Idle → Requesting → Speaking → Cooldown → Idle  │
//! └───────┬───────────────┬───────────────┬──────────┘
//!         │               │               │
//! ┌───────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//! │ TipSource /  │ │ PCM decoder │ │  Playback   │
//! │ SpeechClient │ │  (pure fn)  │ │   (cpal)    │
//! └───────┬──────┘ └─────────────┘ └─────────────┘
//!         │
//! ┌───────▼──────────────────────────────────────────┐
//! │           Generative API (generateContent)        │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod companion;
pub mod config;
pub mod error;
pub mod gemini;
pub mod language;
pub mod voice;

pub use companion::{
    Companion, CompanionBuilder, CompanionEvent, CompanionSnapshot, CompanionState,
    CompanionTimings,
};
pub use config::Config;
pub use error::{Error, Result};
pub use language::Language;
