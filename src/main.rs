use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mitra_voice::voice::{
    CpalPlayback, EncodedAudio, Learner, Playback, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE,
    SampleBuffer, decode,
};
use mitra_voice::{Companion, CompanionEvent, Config, Language};

/// Mitra - voice companion for learners
#[derive(Parser)]
#[command(name = "mitra", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Speak a piece of text
    Speak {
        /// Text to speak
        text: String,
        /// Language code (en, hi, ta)
        #[arg(short, long, default_value = "en", env = "MITRA_LANGUAGE")]
        language: String,
    },
    /// Fetch and speak an encouragement tip
    Encourage {
        /// Learner name
        #[arg(short, long, default_value = "friend")]
        name: String,
        /// Learner level
        #[arg(long, default_value = "1")]
        level: u32,
        /// What the learner is doing
        #[arg(short, long, default_value = "")]
        context: String,
        /// Language code (en, hi, ta)
        #[arg(short, long, default_value = "en", env = "MITRA_LANGUAGE")]
        language: String,
    },
    /// Decode a base64 PCM16 payload from a file
    Decode {
        /// File containing base64 text
        path: PathBuf,
        /// Payload sample rate
        #[arg(long, default_value_t = SPEECH_SAMPLE_RATE)]
        sample_rate: u32,
        /// Payload channel count
        #[arg(long, default_value_t = SPEECH_CHANNELS)]
        channels: u16,
        /// Play the decoded audio
        #[arg(long)]
        play: bool,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,mitra_voice=info",
        1 => "info,mitra_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Speak { text, language } => {
            let companion = Companion::from_config(&Config::load()?)?;
            let language = Language::from_code_or_default(&language);
            run_cycle(&companion, |c| c.speak(text, language)).await
        }
        Command::Encourage {
            name,
            level,
            context,
            language,
        } => {
            let companion = Companion::from_config(&Config::load()?)?;
            let language = Language::from_code_or_default(&language);
            let learner = Learner::new(name, level);
            run_cycle(&companion, |c| c.encourage(learner, language, context)).await
        }
        Command::Decode {
            path,
            sample_rate,
            channels,
            play,
        } => decode_file(&path, sample_rate, channels, play).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Start one cycle and wait for the companion to settle
async fn run_cycle(
    companion: &Companion,
    start: impl FnOnce(&Companion) -> bool,
) -> anyhow::Result<()> {
    let mut events = companion.events();

    if !start(companion) {
        anyhow::bail!("companion is busy");
    }
    companion.wait_idle().await;

    while let Ok(event) = events.try_recv() {
        match event {
            CompanionEvent::Finished { audible, .. } => {
                tracing::info!(audible, "finished speaking");
            }
            CompanionEvent::RequestFailed { reason, .. }
            | CompanionEvent::MalformedAudio { reason, .. }
            | CompanionEvent::PlaybackFailed { reason, .. } => {
                tracing::warn!(%reason, "companion reported a problem");
            }
            other => tracing::debug!(?other, "companion event"),
        }
    }

    if let Some(message) = companion.snapshot().message {
        println!("{message}");
    }
    Ok(())
}

async fn decode_file(
    path: &std::path::Path,
    sample_rate: u32,
    channels: u16,
    play: bool,
) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(path).await?;
    let buffer = decode(&EncodedAudio::from_base64(text), sample_rate, channels)?;

    println!(
        "{} frames, {} channel(s), {:.2}s at {} Hz, peak {:.3}",
        buffer.frames(),
        buffer.channel_count(),
        buffer.duration().as_secs_f64(),
        buffer.sample_rate(),
        buffer.peak()
    );

    if play {
        play_and_wait(buffer).await?;
    }
    Ok(())
}

async fn test_speaker() -> anyhow::Result<()> {
    tracing::info!("playing test tone (440Hz for 1 second)");

    let samples = sine_tone(440.0, Duration::from_secs(1), SPEECH_SAMPLE_RATE);
    play_and_wait(SampleBuffer::mono(SPEECH_SAMPLE_RATE, samples)).await?;

    tracing::info!("speaker test complete");
    Ok(())
}

async fn play_and_wait(buffer: SampleBuffer) -> anyhow::Result<()> {
    let playback = CpalPlayback::new();
    let handle = playback.play(buffer)?;
    let outcome = handle.finished().await;
    tracing::debug!(?outcome, "playback ended");
    Ok(())
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sine_tone(frequency: f32, duration: Duration, sample_rate: u32) -> Vec<f32> {
    let count = (duration.as_secs_f32() * sample_rate as f32) as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}
