//! Observable companion state

use std::fmt;
use std::time::Duration;

use crate::language::Language;

/// Phase of the speak cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompanionState {
    /// Ready to accept a new request
    #[default]
    Idle,
    /// Waiting on the tip or speech provider
    Requesting,
    /// Audio is playing (or the fallback is being fetched)
    Speaking,
    /// Just finished talking
    Cooldown,
}

impl fmt::Display for CompanionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Speaking => "speaking",
            Self::Cooldown => "cooldown",
        };
        f.write_str(s)
    }
}

/// What the UI renders for the avatar
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompanionSnapshot {
    /// Current phase
    pub state: CompanionState,
    /// Text for the message bubble, if one is showing
    pub message: Option<String>,
}

impl CompanionSnapshot {
    /// Whether audio is being produced right now
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == CompanionState::Speaking
    }
}

/// Diagnostic event emitted by the controller
///
/// Purely informational; none of these change what `speak` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionEvent {
    /// A request started a new cycle
    Accepted { token: u64 },
    /// A request arrived while busy and was discarded
    Dropped { state: CompanionState },
    /// Tip or speech request failed
    RequestFailed { token: u64, reason: String },
    /// Switched to the localized fallback phrase
    FallbackUsed { token: u64, language: Language },
    /// Payload could not be decoded
    MalformedAudio { token: u64, reason: String },
    /// Output device or stream failed
    PlaybackFailed { token: u64, reason: String },
    /// Speaking phase ended; `audible` is false when nothing was played
    Finished { token: u64, audible: bool },
}

/// Timers driving the tail of a speak cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanionTimings {
    /// Dwell in `Cooldown` before returning to `Idle`
    pub cooldown: Duration,
    /// Time after reaching `Idle` before the message bubble clears
    pub message_linger: Duration,
}

impl Default for CompanionTimings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(1),
            message_linger: Duration::from_secs(5),
        }
    }
}
