//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use mitra_voice::voice::{
    EncodedAudio, Learner, Playback, PlaybackCompletion, PlaybackHandle, PlaybackOutcome,
    SampleBuffer, SpeechClient, SpeechRequest, TipSource,
};
use mitra_voice::{
    Companion, CompanionEvent, CompanionState, CompanionTimings, Error, Language, Result,
};

/// Latency every fake request takes, so observers see `Requesting`
pub const FAKE_LATENCY: Duration = Duration::from_millis(10);

/// PCM16LE bytes for `samples`
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// A short valid mono payload of `samples` frames
pub fn speech_audio(samples: usize) -> EncodedAudio {
    let samples: Vec<i16> = (0..samples)
        .map(|i| i16::try_from(i * 100).unwrap_or(i16::MAX))
        .collect();
    EncodedAudio::from_pcm_bytes(&pcm_bytes(&samples))
}

/// Speech client answering from a script, recording every request
pub struct ScriptedSpeech {
    responses: Mutex<VecDeque<Result<EncodedAudio>>>,
    requests: Mutex<Vec<SpeechRequest>>,
}

impl ScriptedSpeech {
    pub fn new(responses: Vec<Result<EncodedAudio>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Fails every request
    pub fn always_failing() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.text).collect()
    }
}

#[async_trait]
impl SpeechClient for ScriptedSpeech {
    async fn request_speech(&self, request: &SpeechRequest) -> Result<EncodedAudio> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(FAKE_LATENCY).await;

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::RequestFailed("provider unavailable".to_string())))
    }
}

/// Playback that plays nothing
///
/// Buffers complete after their own duration unless `hold` is set, in which
/// case they stay in flight until `release_all`. `open_delay` blocks the
/// calling thread inside `play`, like a slow output device.
#[derive(Default)]
pub struct FakePlayback {
    played: Mutex<Vec<SampleBuffer>>,
    handles: Mutex<Vec<PlaybackHandle>>,
    pending: Mutex<Vec<PlaybackCompletion>>,
    fail: AtomicBool,
    hold: AtomicBool,
    open_delay: Mutex<Duration>,
    next_id: AtomicU64,
}

impl FakePlayback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let playback = Self::default();
        playback.fail.store(true, Ordering::SeqCst);
        Arc::new(playback)
    }

    pub fn holding() -> Arc<Self> {
        let playback = Self::default();
        playback.hold.store(true, Ordering::SeqCst);
        Arc::new(playback)
    }

    pub fn slow_to_open(delay: Duration) -> Arc<Self> {
        let playback = Self::default();
        *playback.open_delay.lock().unwrap() = delay;
        Arc::new(playback)
    }

    pub fn set_hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn played(&self) -> Vec<SampleBuffer> {
        self.played.lock().unwrap().clone()
    }

    pub fn handles(&self) -> Vec<PlaybackHandle> {
        self.handles.lock().unwrap().clone()
    }

    /// Complete every held playback
    pub fn release_all(&self) {
        for completion in self.pending.lock().unwrap().drain(..) {
            let outcome = if completion.is_stop_requested() {
                PlaybackOutcome::Stopped
            } else {
                PlaybackOutcome::Completed
            };
            completion.finish(outcome);
        }
    }
}

impl Playback for FakePlayback {
    fn play(&self, buffer: SampleBuffer) -> Result<PlaybackHandle> {
        let delay = *self.open_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::PlaybackFailed("no output device available".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (handle, completion) = PlaybackHandle::new(id);
        let duration = buffer.duration();
        self.played.lock().unwrap().push(buffer);
        self.handles.lock().unwrap().push(handle.clone());

        if self.hold.load(Ordering::SeqCst) {
            self.pending.lock().unwrap().push(completion);
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let outcome = if completion.is_stop_requested() {
                    PlaybackOutcome::Stopped
                } else {
                    PlaybackOutcome::Completed
                };
                completion.finish(outcome);
            });
        }

        Ok(handle)
    }
}

/// Tip source returning a fixed answer
pub struct FixedTips {
    tip: Option<String>,
    asked: Mutex<Vec<(Learner, Language, String)>>,
}

impl FixedTips {
    pub fn answering(tip: &str) -> Arc<Self> {
        Arc::new(Self {
            tip: Some(tip.to_string()),
            asked: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            tip: None,
            asked: Mutex::new(Vec::new()),
        })
    }

    pub fn asked(&self) -> Vec<(Learner, Language, String)> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl TipSource for FixedTips {
    async fn companion_tip(
        &self,
        learner: &Learner,
        language: Language,
        context: &str,
    ) -> Result<String> {
        self.asked
            .lock()
            .unwrap()
            .push((learner.clone(), language, context.to_string()));
        tokio::time::sleep(FAKE_LATENCY).await;

        self.tip
            .clone()
            .ok_or_else(|| Error::RequestFailed("tip service unavailable".to_string()))
    }
}

/// Companion over the given fakes with default timings
pub fn companion(speech: Arc<ScriptedSpeech>, playback: Arc<FakePlayback>) -> Companion {
    Companion::builder(speech, playback)
        .build()
        .expect("companion inside runtime")
}

/// Companion with short timers, for tests running in real time
pub fn quick_companion(speech: Arc<dyn SpeechClient>, playback: Arc<FakePlayback>) -> Companion {
    Companion::builder(speech, playback)
        .timings(CompanionTimings {
            cooldown: Duration::from_millis(10),
            message_linger: Duration::from_millis(10),
        })
        .build()
        .expect("companion inside runtime")
}

/// Record every distinct state the companion passes through
pub fn record_states(companion: &Companion) -> Arc<Mutex<Vec<CompanionState>>> {
    let mut rx = companion.subscribe();
    let log = Arc::new(Mutex::new(vec![rx.borrow().state]));
    let writer = Arc::clone(&log);

    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().state;
            let mut log = writer.lock().unwrap();
            if log.last() != Some(&state) {
                log.push(state);
            }
        }
    });

    log
}

/// Drain every event received so far
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<CompanionEvent>) -> Vec<CompanionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
