//! Voice processing module
//!
//! Handles speech requests, PCM decoding and playback.

mod pcm;
mod playback;
mod tip;
mod tts;

pub use pcm::{
    EncodedAudio, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE, SampleBuffer, decode, decode_pcm16,
};
pub use playback::{CpalPlayback, Playback, PlaybackCompletion, PlaybackHandle, PlaybackOutcome};
pub use tip::{DEFAULT_TIP_CONTEXT, GeminiTips, Learner, TipSource, tip_prompt};
pub use tts::{GeminiSpeech, SpeechClient, SpeechRequest};
