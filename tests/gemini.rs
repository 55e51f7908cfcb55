//! Generative API client tests against a local stand-in server

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use mitra_voice::gemini::GeminiClient;
use mitra_voice::voice::{
    EncodedAudio, GeminiSpeech, GeminiTips, Learner, SpeechClient, SpeechRequest, TipSource,
};
use mitra_voice::{CompanionState, Error, Language};

mod common;

use common::{FakePlayback, pcm_bytes, quick_companion};

/// One request seen by the stand-in server
#[derive(Debug, Clone)]
struct Seen {
    model_action: String,
    api_key: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct ServerState {
    seen: Arc<Mutex<Vec<Seen>>>,
    status: StatusCode,
    reply: Value,
}

async fn generate(
    State(state): State<ServerState>,
    Path(model_action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.seen.lock().unwrap().push(Seen {
        model_action,
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    (state.status, Json(state.reply.clone()))
}

/// Serve `reply` with `status` for every request; returns base URL and request log
async fn spawn_server(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<Seen>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = ServerState {
        seen: Arc::clone(&seen),
        status,
        reply,
    };
    let router = Router::new()
        .route("/v1beta/models/{model_action}", post(generate))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}"), seen)
}

fn audio_reply(data: &str) -> Value {
    json!({
        "candidates": [{
            "content": {
                "parts": [{
                    "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": data }
                }]
            }
        }]
    })
}

fn text_reply(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

fn client(base_url: String) -> GeminiClient {
    GeminiClient::new(base_url, "test-key".to_string(), None).unwrap()
}

#[tokio::test]
async fn test_speech_request_wire_format() {
    let payload = EncodedAudio::from_pcm_bytes(&pcm_bytes(&[0, 1000, -1000]));
    let (base, seen) = spawn_server(StatusCode::OK, audio_reply(payload.as_base64())).await;
    let speech = GeminiSpeech::new(client(base), "tts-model".to_string());

    let audio = speech
        .request_speech(&SpeechRequest::new("Good morning", Language::Hi))
        .await
        .unwrap();
    assert_eq!(audio, payload);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].model_action, "tts-model:generateContent");
    assert_eq!(seen[0].api_key.as_deref(), Some("test-key"));
    assert_eq!(
        seen[0].body["contents"][0]["parts"][0]["text"],
        "Speak this in Hindi: Good morning"
    );
    assert_eq!(
        seen[0].body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
            ["voiceName"],
        "Kore"
    );
}

#[tokio::test]
async fn test_english_speech_uses_puck_and_verbatim_text() {
    let (base, seen) = spawn_server(StatusCode::OK, audio_reply("AAA=")).await;
    let speech = GeminiSpeech::new(client(base), "tts-model".to_string());

    speech
        .request_speech(&SpeechRequest::new("Good morning", Language::En))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].body["contents"][0]["parts"][0]["text"], "Good morning");
    assert_eq!(
        seen[0].body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
            ["voiceName"],
        "Puck"
    );
}

#[tokio::test]
async fn test_response_without_audio_is_request_failure() {
    let (base, _) = spawn_server(StatusCode::OK, text_reply("I cannot speak")).await;
    let speech = GeminiSpeech::new(client(base), "tts-model".to_string());

    let err = speech
        .request_speech(&SpeechRequest::new("hello", Language::En))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestFailed(_)));
}

#[tokio::test]
async fn test_upstream_error_is_request_failure() {
    let (base, _) = spawn_server(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": { "message": "overloaded" } }),
    )
    .await;
    let speech = GeminiSpeech::new(client(base), "tts-model".to_string());

    let err = speech
        .request_speech(&SpeechRequest::new("hello", Language::En))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestFailed(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_request_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let speech = GeminiSpeech::new(client(format!("http://{addr}")), "tts-model".to_string());
    let err = speech
        .request_speech(&SpeechRequest::new("hello", Language::En))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestFailed(_)));
}

#[tokio::test]
async fn test_tip_prompt_and_reply() {
    let (base, seen) = spawn_server(StatusCode::OK, text_reply("  Keep going, Meena!  ")).await;
    let tips = GeminiTips::new(client(base), "text-model".to_string());

    let tip = tips
        .companion_tip(&Learner::new("Meena", 2), Language::Hi, "spelling")
        .await
        .unwrap();
    assert_eq!(tip, "Keep going, Meena!");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].model_action, "text-model:generateContent");
    let prompt = seen[0].body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap();
    assert!(prompt.contains("named Meena (Level 2)"));
    assert!(prompt.contains("Reply in Hindi."));
    assert!(seen[0].body.get("generationConfig").is_none());
}

#[tokio::test]
async fn test_empty_tip_is_request_failure() {
    let (base, _) = spawn_server(StatusCode::OK, json!({ "candidates": [] })).await;
    let tips = GeminiTips::new(client(base), "text-model".to_string());

    let err = tips
        .companion_tip(&Learner::new("Meena", 2), Language::En, "")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestFailed(_)));
}

#[tokio::test]
async fn test_companion_end_to_end_over_http() {
    // 48 bytes = 24 mono samples
    let payload = EncodedAudio::from_pcm_bytes(&pcm_bytes(&[512; 24]));
    let (base, seen) = spawn_server(StatusCode::OK, audio_reply(payload.as_base64())).await;
    let playback = FakePlayback::new();
    let companion = quick_companion(
        Arc::new(GeminiSpeech::new(client(base), "tts-model".to_string())),
        playback.clone(),
    );

    assert!(companion.speak("नमस्ते", Language::Hi));
    companion.wait_idle().await;

    assert_eq!(companion.state(), CompanionState::Idle);
    assert_eq!(seen.lock().unwrap().len(), 1);

    let played = playback.played();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].frames(), 24);
    assert_eq!(played[0].channel(0).unwrap()[0], 512.0 / 32768.0);
}
