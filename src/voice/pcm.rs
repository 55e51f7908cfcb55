//! PCM16LE payload decoding
//!
//! The speech provider returns headerless little-endian signed 16-bit PCM,
//! interleaved by channel and base64-encoded for transport. Sample rate and
//! channel count are not carried by the payload; callers supply them.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Sample rate of synthesized speech
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Channel count of synthesized speech
pub const SPEECH_CHANNELS: u16 = 1;

/// Bytes per PCM16 sample
const BYTES_PER_SAMPLE: usize = 2;

/// Divisor mapping i16 onto [-1.0, 1.0)
///
/// `i16::MIN` lands on exactly -1.0 while `i16::MAX` stays just under 1.0
const I16_SCALE: f32 = 32768.0;

/// Base64 text of a PCM16LE payload, as received from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio(String);

impl EncodedAudio {
    /// Wrap base64 text received from the provider
    #[must_use]
    pub fn from_base64(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    /// Encode raw PCM bytes for transport
    #[must_use]
    pub fn from_pcm_bytes(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    /// Base64 text
    #[must_use]
    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// Whether the payload carries no data at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Decoded, normalized audio split per channel
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Build a mono buffer
    #[must_use]
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Frames per second
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Number of frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Whether the buffer holds no frames
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Samples of one channel
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Sample at `frame` for `channel`, or silence past the end
    #[must_use]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.channels
            .get(channel)
            .and_then(|c| c.get(frame))
            .copied()
            .unwrap_or(0.0)
    }

    /// Playback length
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Largest absolute sample across all channels
    #[must_use]
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flatten()
            .fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}

/// Decode a base64 PCM16LE payload
///
/// # Errors
///
/// Returns `MalformedAudio` if the text is not valid base64 or the decoded
/// bytes do not divide into whole frames
pub fn decode(encoded: &EncodedAudio, sample_rate: u32, channel_count: u16) -> Result<SampleBuffer> {
    let bytes = STANDARD
        .decode(encoded.as_base64().trim())
        .map_err(|e| Error::MalformedAudio(format!("invalid base64: {e}")))?;

    decode_pcm16(&bytes, sample_rate, channel_count)
}

/// Decode raw interleaved PCM16LE bytes
///
/// # Errors
///
/// Returns `MalformedAudio` if `channel_count` is zero or the byte length is
/// not a multiple of `2 * channel_count`
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<SampleBuffer> {
    if channel_count == 0 {
        return Err(Error::MalformedAudio("channel count is zero".to_string()));
    }

    let channels = usize::from(channel_count);
    let frame_bytes = BYTES_PER_SAMPLE * channels;
    if bytes.len() % frame_bytes != 0 {
        return Err(Error::MalformedAudio(format!(
            "{} bytes is not a whole number of {channels}-channel PCM16 frames",
            bytes.len()
        )));
    }

    let frames = bytes.len() / frame_bytes;
    let mut out = vec![Vec::with_capacity(frames); channels];

    for frame in bytes.chunks_exact(frame_bytes) {
        for (c, sample) in frame.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
            let raw = i16::from_le_bytes([sample[0], sample[1]]);
            out[c].push(f32::from(raw) / I16_SCALE);
        }
    }

    tracing::trace!(frames, channels, sample_rate, "decoded pcm16 payload");

    Ok(SampleBuffer {
        sample_rate,
        channels: out,
    })
}
