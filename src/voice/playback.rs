//! Audio playback to speakers

use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::watch;

use crate::voice::pcm::SampleBuffer;
use crate::{Error, Result};

/// How often the playback thread checks for completion or a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Grace period past the expected duration before giving up on the device
const COMPLETION_SLACK: Duration = Duration::from_millis(500);

/// Lets the device drain its last buffer before the stream is dropped
const DRAIN_DELAY: Duration = Duration::from_millis(100);

/// How a playback ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All frames were handed to the device
    Completed,
    /// Stopped before the end
    Stopped,
    /// Device or stream error
    Failed(String),
}

/// Handle to one in-flight playback
///
/// Cloning yields another view of the same playback.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    id: u64,
    stop: Arc<AtomicBool>,
    done: watch::Receiver<Option<PlaybackOutcome>>,
}

/// Producer side of a [`PlaybackHandle`], held by whoever drives the audio
#[derive(Debug)]
pub struct PlaybackCompletion {
    stop: Arc<AtomicBool>,
    done: watch::Sender<Option<PlaybackOutcome>>,
}

impl PlaybackHandle {
    /// Create a handle and its completion signal
    #[must_use]
    pub fn new(id: u64) -> (Self, PlaybackCompletion) {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = watch::channel(None);

        (
            Self {
                id,
                stop: Arc::clone(&stop),
                done: rx,
            },
            PlaybackCompletion { stop, done: tx },
        )
    }

    /// Playback identifier
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Ask the playback to stop; repeated calls are no-ops
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Outcome, if playback has ended
    #[must_use]
    pub fn outcome(&self) -> Option<PlaybackOutcome> {
        self.done.borrow().clone()
    }

    /// Whether playback has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait until playback ends
    ///
    /// A producer that disappears without reporting counts as a failure.
    pub async fn finished(&self) -> PlaybackOutcome {
        let mut rx = self.done.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or_else(|| PlaybackOutcome::Failed("no outcome".to_string())),
            Err(_) => PlaybackOutcome::Failed("playback abandoned".to_string()),
        }
    }
}

impl PlaybackCompletion {
    /// Whether the consumer asked playback to stop
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Report how playback ended
    pub fn finish(self, outcome: PlaybackOutcome) {
        self.done.send_replace(Some(outcome));
    }
}

/// Plays decoded audio
///
/// One playback at a time per caller; implementations do not serialize
/// concurrent `play` calls themselves.
pub trait Playback: Send + Sync {
    /// Start playing `buffer` and return without waiting for it to finish
    ///
    /// May block while the output device opens; async callers run it on a
    /// blocking thread.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackFailed` if no output stream could be opened
    fn play(&self, buffer: SampleBuffer) -> Result<PlaybackHandle>;

    /// Stop a playback; a no-op if it already ended
    fn stop(&self, handle: &PlaybackHandle) {
        if !handle.is_finished() {
            tracing::debug!(id = handle.id(), "stopping playback");
        }
        handle.request_stop();
    }
}

/// Plays audio on the default output device
///
/// Each playback opens its own stream on a dedicated thread and drops it when
/// the buffer runs out or a stop is requested, so no device stays open
/// between utterances.
#[derive(Debug, Default)]
pub struct CpalPlayback {
    next_id: AtomicU64,
}

impl CpalPlayback {
    /// Create a new audio playback instance
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Playback for CpalPlayback {
    fn play(&self, buffer: SampleBuffer) -> Result<PlaybackHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (handle, completion) = PlaybackHandle::new(id);

        if buffer.is_empty() {
            completion.finish(PlaybackOutcome::Completed);
            return Ok(handle);
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        std::thread::Builder::new()
            .name(format!("mitra-playback-{id}"))
            .spawn(move || run_playback(id, &buffer, completion, &ready_tx))
            .map_err(|e| Error::PlaybackFailed(format!("failed to spawn playback thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::PlaybackFailed(
                "playback thread exited before starting".to_string(),
            )),
        }
    }
}

/// State shared between a stream's callbacks and the thread driving it
#[derive(Debug, Default)]
struct StreamStatus {
    drained: AtomicBool,
    error: Mutex<Option<String>>,
}

impl StreamStatus {
    /// Record a stream error; the first one wins
    fn fail(&self, reason: String) {
        let mut error = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if error.is_none() {
            *error = Some(reason);
        }
    }

    fn is_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    /// How playback ended, or `None` while it is still running
    fn outcome(
        &self,
        stop_requested: bool,
        elapsed: Duration,
        timeout: Duration,
    ) -> Option<PlaybackOutcome> {
        if stop_requested {
            return Some(PlaybackOutcome::Stopped);
        }
        if let Some(reason) = self
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Some(PlaybackOutcome::Failed(reason));
        }
        if self.is_drained() || elapsed > timeout {
            return Some(PlaybackOutcome::Completed);
        }
        None
    }
}

/// Drive one stream to completion on the current thread
fn run_playback(
    id: u64,
    buffer: &SampleBuffer,
    completion: PlaybackCompletion,
    ready: &mpsc::SyncSender<Result<()>>,
) {
    let status = Arc::new(StreamStatus::default());
    let stream = match open_stream(buffer, &status, &completion.stop) {
        Ok(stream) => stream,
        Err(e) => {
            let message = e.to_string();
            let _ = ready.send(Err(e));
            completion.finish(PlaybackOutcome::Failed(message));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let start = Instant::now();
    let timeout = buffer.duration() + COMPLETION_SLACK;

    let outcome = loop {
        if let Some(outcome) =
            status.outcome(completion.is_stop_requested(), start.elapsed(), timeout)
        {
            break outcome;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    if outcome == PlaybackOutcome::Completed {
        if status.is_drained() {
            std::thread::sleep(DRAIN_DELAY);
        } else {
            tracing::warn!(id, "playback did not drain in time");
        }
    }

    drop(stream);
    tracing::debug!(id, frames = buffer.frames(), ?outcome, "playback complete");
    completion.finish(outcome);
}

/// Open and start an output stream for `buffer`
fn open_stream(
    buffer: &SampleBuffer,
    status: &Arc<StreamStatus>,
    stop: &Arc<AtomicBool>,
) -> Result<Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::PlaybackFailed("no output device available".to_string()))?;

    let sample_rate = SampleRate(buffer.sample_rate());
    let wanted_channels = buffer.channel_count();

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::PlaybackFailed(e.to_string()))?
        .find(|c| {
            c.channels() == wanted_channels
                && c.min_sample_rate() <= sample_rate
                && c.max_sample_rate() >= sample_rate
        })
        .or_else(|| {
            // Fallback: any channel layout at the right rate
            device.supported_output_configs().ok()?.find(|c| {
                c.min_sample_rate() <= sample_rate && c.max_sample_rate() >= sample_rate
            })
        })
        .ok_or_else(|| {
            Error::PlaybackFailed(format!(
                "no output config supports {} Hz",
                buffer.sample_rate()
            ))
        })?;

    let config: StreamConfig = supported_config.with_sample_rate(sample_rate).config();
    let device_channels = usize::from(config.channels).max(1);
    let source_channels = usize::from(wanted_channels).max(1);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = buffer.sample_rate(),
        device_channels,
        source_channels,
        "audio playback initialized"
    );

    let samples = buffer.clone();
    let frames = samples.frames();
    let position = AtomicUsize::new(0);
    let data_status = Arc::clone(status);
    let error_status = Arc::clone(status);
    let stop_cb = Arc::clone(stop);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let stopped = stop_cb.load(Ordering::Relaxed);
                for frame in data.chunks_mut(device_channels) {
                    let pos = position.load(Ordering::Relaxed);
                    if stopped || pos >= frames {
                        data_status.drained.store(true, Ordering::SeqCst);
                        frame.fill(0.0);
                        continue;
                    }

                    // Extra device channels repeat the last source channel
                    for (c, out) in frame.iter_mut().enumerate() {
                        *out = samples.sample(c.min(source_channels - 1), pos);
                    }
                    position.store(pos + 1, Ordering::Relaxed);
                }
            },
            move |err| {
                tracing::error!(error = %err, "audio playback error");
                error_status.fail(err.to_string());
            },
            None,
        )
        .map_err(|e| Error::PlaybackFailed(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::PlaybackFailed(e.to_string()))?;

    Ok(stream)
}
