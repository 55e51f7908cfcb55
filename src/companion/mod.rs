//! Companion controller
//!
//! Drives one avatar through `Idle -> Requesting -> Speaking -> Cooldown -> Idle`.
//! At most one cycle runs at a time; requests arriving while busy are dropped.
//! Every failure ends in a quiet cooldown instead of an error, and each cycle
//! carries a token so that completions from an abandoned cycle are ignored.

mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

pub use state::{CompanionEvent, CompanionSnapshot, CompanionState, CompanionTimings};

use crate::config::{AudioConfig, Config};
use crate::gemini::GeminiClient;
use crate::language::Language;
use crate::voice::{
    CpalPlayback, EncodedAudio, GeminiSpeech, GeminiTips, Learner, Playback, PlaybackHandle,
    PlaybackOutcome, SpeechClient, SpeechRequest, TipSource, decode,
};
use crate::{Error, Result};

/// Capacity of the diagnostic event channel
const EVENT_CAPACITY: usize = 64;

/// What a cycle should say
#[derive(Debug, Clone)]
enum Prompt {
    /// Speak the given text
    Text(SpeechRequest),
    /// Fetch a tip first, then speak it
    Tip {
        learner: Learner,
        language: Language,
        context: String,
    },
}

impl Prompt {
    const fn language(&self) -> Language {
        match self {
            Self::Text(req) => req.language,
            Self::Tip { language, .. } => *language,
        }
    }
}

/// Mutable controller state, only touched under the mutex
#[derive(Debug, Default)]
struct Machine {
    state: CompanionState,
    message: Option<String>,
    token: u64,
    playback: Option<PlaybackHandle>,
    message_clear: Option<JoinHandle<()>>,
}

struct Inner {
    speech: Arc<dyn SpeechClient>,
    playback: Arc<dyn Playback>,
    tips: Option<Arc<dyn TipSource>>,
    audio: AudioConfig,
    timings: CompanionTimings,
    runtime: Handle,
    machine: Mutex<Machine>,
    snapshot: watch::Sender<CompanionSnapshot>,
    events: broadcast::Sender<CompanionEvent>,
}

/// Voice companion for one avatar
///
/// Cheap to clone; clones drive the same avatar.
#[derive(Clone)]
pub struct Companion {
    inner: Arc<Inner>,
}

/// Builder for [`Companion`]
pub struct CompanionBuilder {
    speech: Arc<dyn SpeechClient>,
    playback: Arc<dyn Playback>,
    tips: Option<Arc<dyn TipSource>>,
    audio: AudioConfig,
    timings: CompanionTimings,
    runtime: Option<Handle>,
}

impl CompanionBuilder {
    /// Source of companion tips for [`Companion::encourage`]
    #[must_use]
    pub fn tips(mut self, tips: Arc<dyn TipSource>) -> Self {
        self.tips = Some(tips);
        self
    }

    /// Format of the speech payload
    #[must_use]
    pub const fn audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    /// Cooldown and message timers
    #[must_use]
    pub const fn timings(mut self, timings: CompanionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Runtime that runs speak cycles
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the companion
    ///
    /// # Errors
    ///
    /// Returns error if no runtime was given and none is current
    pub fn build(self) -> Result<Companion> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| {
                Error::Config(format!("companion needs a Tokio runtime: {e}"))
            })?,
        };

        let (snapshot, _) = watch::channel(CompanionSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Companion {
            inner: Arc::new(Inner {
                speech: self.speech,
                playback: self.playback,
                tips: self.tips,
                audio: self.audio,
                timings: self.timings,
                runtime,
                machine: Mutex::new(Machine::default()),
                snapshot,
                events,
            }),
        })
    }
}

impl Companion {
    /// Start building a companion around a speech client and playback
    #[must_use]
    pub fn builder(speech: Arc<dyn SpeechClient>, playback: Arc<dyn Playback>) -> CompanionBuilder {
        CompanionBuilder {
            speech,
            playback,
            tips: None,
            audio: AudioConfig::default(),
            timings: CompanionTimings::default(),
            runtime: None,
        }
    }

    /// Build a companion backed by the generative API and the default output device
    ///
    /// # Errors
    ///
    /// Returns error if the configuration has no API key or no runtime is current
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = GeminiClient::from_config(config)?;

        Self::builder(
            Arc::new(GeminiSpeech::new(client.clone(), config.api.speech_model.clone())),
            Arc::new(CpalPlayback::new()),
        )
        .tips(Arc::new(GeminiTips::new(client, config.api.tip_model.clone())))
        .audio(config.audio)
        .timings(config.companion)
        .build()
    }

    /// Say `text` in `language`
    ///
    /// Returns immediately. Returns false, and does nothing, if the companion
    /// is not idle.
    pub fn speak(&self, text: impl Into<String>, language: Language) -> bool {
        self.begin(Prompt::Text(SpeechRequest::new(text, language)))
    }

    /// Fetch an encouragement tip for `learner` about `context` and say it
    ///
    /// Same gating as [`Companion::speak`]. A failed tip falls back to the
    /// localized fallback phrase.
    pub fn encourage(&self, learner: Learner, language: Language, context: impl Into<String>) -> bool {
        self.begin(Prompt::Tip {
            learner,
            language,
            context: context.into(),
        })
    }

    /// Abandon the current cycle, e.g. when the avatar leaves the screen
    ///
    /// Stops playback, cancels pending timers and returns to `Idle` with no
    /// message. Work still in flight for the abandoned cycle is ignored.
    pub fn dismiss(&self) {
        let mut m = self.inner.lock();
        m.token += 1;
        if let Some(handle) = m.playback.take() {
            self.inner.playback.stop(&handle);
        }
        if let Some(task) = m.message_clear.take() {
            task.abort();
        }
        m.state = CompanionState::Idle;
        m.message = None;
        self.inner.publish(&m);
        tracing::debug!(token = m.token, "companion dismissed");
    }

    /// Current phase
    #[must_use]
    pub fn state(&self) -> CompanionState {
        self.inner.snapshot.borrow().state
    }

    /// Current state and message
    #[must_use]
    pub fn snapshot(&self) -> CompanionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Whether audio is being produced right now
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.inner.snapshot.borrow().is_speaking()
    }

    /// Watch state and message changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CompanionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Diagnostic events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<CompanionEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until the companion is idle
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel
        let _ = rx.wait_for(|s| s.state == CompanionState::Idle).await;
    }

    fn begin(&self, prompt: Prompt) -> bool {
        let token = {
            let mut m = self.inner.lock();
            if m.state != CompanionState::Idle {
                tracing::debug!(state = %m.state, "companion busy, dropping request");
                self.inner.emit(CompanionEvent::Dropped { state: m.state });
                return false;
            }

            m.token += 1;
            if let Some(task) = m.message_clear.take() {
                task.abort();
            }
            m.state = CompanionState::Requesting;
            self.inner.publish(&m);
            m.token
        };

        tracing::debug!(token, language = %prompt.language(), "speak cycle accepted");
        self.inner.emit(CompanionEvent::Accepted { token });

        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.run_cycle(token, prompt).await });
        true
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, m: &Machine) {
        self.snapshot.send_replace(CompanionSnapshot {
            state: m.state,
            message: m.message.clone(),
        });
    }

    fn emit(&self, event: CompanionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn run_cycle(self: Arc<Self>, token: u64, prompt: Prompt) {
        let language = prompt.language();

        let audible = match self.fetch(&prompt).await {
            Ok((text, audio)) => {
                if !self.enter_speaking(token, &text) {
                    return;
                }
                self.play(token, &audio).await
            }
            Err(e) => {
                self.emit(CompanionEvent::RequestFailed {
                    token,
                    reason: e.to_string(),
                });
                self.speak_fallback(token, language).await
            }
        };

        if let Some(audible) = audible {
            self.cool_down(token, audible).await;
        }
    }

    /// Produce the text and audio for a prompt
    async fn fetch(&self, prompt: &Prompt) -> Result<(String, EncodedAudio)> {
        let request = match prompt {
            Prompt::Text(request) => request.clone(),
            Prompt::Tip {
                learner,
                language,
                context,
            } => {
                let tips = self
                    .tips
                    .as_ref()
                    .ok_or_else(|| Error::RequestFailed("no tip source configured".to_string()))?;
                let tip = tips.companion_tip(learner, *language, context).await?;
                SpeechRequest::new(tip, *language).with_context(context.clone())
            }
        };

        let audio = self.synthesize(&request).await?;
        Ok((request.text, audio))
    }

    /// Request speech, treating blank input and empty payloads as failures
    async fn synthesize(&self, request: &SpeechRequest) -> Result<EncodedAudio> {
        if request.text.trim().is_empty() {
            return Err(Error::RequestFailed("nothing to say".to_string()));
        }

        let audio = self.speech.request_speech(request).await?;
        if audio.is_empty() {
            tracing::warn!("speech response carried an empty payload");
            return Err(Error::RequestFailed("empty audio payload".to_string()));
        }
        Ok(audio)
    }

    /// Say the localized fallback phrase; a second failure is swallowed
    async fn speak_fallback(&self, token: u64, language: Language) -> Option<bool> {
        let phrase = language.fallback_phrase();
        if !self.enter_speaking(token, phrase) {
            return None;
        }

        tracing::info!(token, %language, "using fallback phrase");
        self.emit(CompanionEvent::FallbackUsed { token, language });

        let request = SpeechRequest::new(phrase, language).with_context("fallback");
        match self.synthesize(&request).await {
            Ok(audio) => self.play(token, &audio).await,
            Err(e) => {
                tracing::warn!(token, error = %e, "fallback speech failed, staying silent");
                self.emit(CompanionEvent::RequestFailed {
                    token,
                    reason: e.to_string(),
                });
                Some(false)
            }
        }
    }

    /// Move to `Speaking` showing `message`; false if the cycle was abandoned
    fn enter_speaking(&self, token: u64, message: &str) -> bool {
        let mut m = self.lock();
        if m.token != token {
            return false;
        }
        m.state = CompanionState::Speaking;
        m.message = Some(message.to_string());
        self.publish(&m);
        true
    }

    /// Decode and play `audio`, waiting for it to end
    ///
    /// Returns whether anything was played, or `None` if the cycle was
    /// abandoned meanwhile.
    async fn play(&self, token: u64, audio: &EncodedAudio) -> Option<bool> {
        let buffer = match decode(audio, self.audio.sample_rate, self.audio.channels) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!(token, error = %e, "could not decode speech");
                self.emit(CompanionEvent::MalformedAudio {
                    token,
                    reason: e.to_string(),
                });
                return Some(false);
            }
        };

        tracing::debug!(
            token,
            frames = buffer.frames(),
            duration_ms = u64::try_from(buffer.duration().as_millis()).unwrap_or(u64::MAX),
            "starting playback"
        );

        // Opening the device can block for a while
        let playback = Arc::clone(&self.playback);
        let started = self
            .runtime
            .spawn_blocking(move || playback.play(buffer))
            .await
            .unwrap_or_else(|e| Err(Error::PlaybackFailed(format!("playback task failed: {e}"))));

        let handle = match started {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(token, error = %e, "could not start playback");
                self.emit(CompanionEvent::PlaybackFailed {
                    token,
                    reason: e.to_string(),
                });
                return Some(false);
            }
        };

        {
            let mut m = self.lock();
            if m.token != token {
                self.playback.stop(&handle);
                return None;
            }
            m.playback = Some(handle.clone());
        }

        let outcome = handle.finished().await;

        {
            let mut m = self.lock();
            if m.token != token {
                return None;
            }
            m.playback = None;
        }

        match outcome {
            PlaybackOutcome::Completed => Some(true),
            PlaybackOutcome::Stopped => Some(false),
            PlaybackOutcome::Failed(reason) => {
                tracing::warn!(token, %reason, "playback failed");
                self.emit(CompanionEvent::PlaybackFailed { token, reason });
                Some(false)
            }
        }
    }

    /// Dwell in `Cooldown`, return to `Idle`, then schedule the message clear
    async fn cool_down(self: &Arc<Self>, token: u64, audible: bool) {
        {
            let mut m = self.lock();
            if m.token != token {
                return;
            }
            m.state = CompanionState::Cooldown;
            self.publish(&m);
        }
        self.emit(CompanionEvent::Finished { token, audible });

        tokio::time::sleep(self.timings.cooldown).await;

        let mut m = self.lock();
        if m.token != token {
            return;
        }
        m.state = CompanionState::Idle;
        self.publish(&m);

        let weak = Arc::downgrade(self);
        let linger = self.timings.message_linger;
        m.message_clear = Some(
            self.runtime
                .spawn(async move { clear_message_after(weak, token, linger).await }),
        );
        tracing::debug!(token, "speak cycle complete");
    }
}

/// Clear the message bubble unless a newer cycle has started
async fn clear_message_after(inner: Weak<Inner>, token: u64, linger: std::time::Duration) {
    tokio::time::sleep(linger).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut m = inner.lock();
    if m.token != token {
        return;
    }
    m.message = None;
    m.message_clear = None;
    inner.publish(&m);
}

impl Drop for Inner {
    fn drop(&mut self) {
        let m = self.machine.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = m.message_clear.take() {
            task.abort();
        }
    }
}
