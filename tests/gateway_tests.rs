// Integration tests for the transcription, response and speech gateways
//
// Provider fakes replay scripted failures; backoff and timeouts run on a
// paused clock.

mod common;

use common::{FakeChat, FakeStt, FakeTts};
use serenity_pod::audio::AudioBlob;
use serenity_pod::emotion::{EmotionContext, Intensity};
use serenity_pod::error::{GatewayError, ProviderFailure};
use serenity_pod::gateway::{
    ChatRole, ChatTurn, PromptBuilder, ResponseGateway, SpeechGateway, TranscriptionGateway,
    EMPTY_TRANSCRIPT_FALLBACK,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn blob(bytes: usize) -> AudioBlob {
    AudioBlob {
        data: vec![0u8; bytes],
        mime_type: "audio/wav".to_string(),
        sample_rate: 48000,
        channels: 2,
        duration_ms: 1000,
    }
}

fn turns(n: usize) -> Vec<ChatTurn> {
    (0..n)
        .map(|i| ChatTurn {
            user: format!("user {}", i),
            assistant: format!("assistant {}", i),
        })
        .collect()
}

// ============================================================================
// Transcription
// ============================================================================

#[tokio::test]
async fn test_missing_or_tiny_audio_is_rejected() {
    let stt = Arc::new(FakeStt::new());
    let gateway = TranscriptionGateway::new(stt.clone());

    let err = gateway.transcribe(None).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidInput(_)));

    let err = gateway.transcribe(Some(&blob(100))).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidInput(_)));

    assert_eq!(stt.calls(), 0);
}

#[tokio::test]
async fn test_empty_transcript_falls_back() {
    let stt = Arc::new(FakeStt::scripted(vec![Ok("   ".to_string())]));
    let gateway = TranscriptionGateway::new(stt);

    let text = gateway.transcribe(Some(&blob(4096))).await.unwrap();
    assert_eq!(text, EMPTY_TRANSCRIPT_FALLBACK);
}

#[tokio::test]
async fn test_transcript_is_trimmed() {
    let stt = Arc::new(FakeStt::scripted(vec![Ok("  hello there \n".to_string())]));
    let gateway = TranscriptionGateway::new(stt);

    assert_eq!(gateway.transcribe(Some(&blob(4096))).await.unwrap(), "hello there");
}

#[tokio::test(start_paused = true)]
async fn test_two_server_errors_then_success() {
    let stt = Arc::new(FakeStt::scripted(vec![
        Err(ProviderFailure::http(500, "internal")),
        Err(ProviderFailure::http(500, "internal")),
        Ok("third time lucky".to_string()),
    ]));
    let gateway = TranscriptionGateway::new(stt.clone());

    let started = Instant::now();
    let text = gateway.transcribe(Some(&blob(4096))).await.unwrap();

    assert_eq!(text, "third time lucky");
    assert_eq!(stt.calls(), 3);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_connection_reset_is_retried_until_exhausted() {
    let stt = Arc::new(FakeStt::scripted(vec![
        Err(ProviderFailure::connection_reset("reset")),
        Err(ProviderFailure::connection_reset("reset")),
        Err(ProviderFailure::connection_reset("reset")),
        Ok("never reached".to_string()),
    ]));
    let gateway = TranscriptionGateway::new(stt.clone());

    let err = gateway.transcribe(Some(&blob(4096))).await.unwrap_err();
    assert!(matches!(err, GatewayError::RetryExhausted { attempts: 3, .. }));
    assert_eq!(stt.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_not_retried() {
    let stt = Arc::new(FakeStt::slow(Duration::from_secs(60)));
    let gateway = TranscriptionGateway::new(stt.clone());

    let started = Instant::now();
    let err = gateway.transcribe(Some(&blob(4096))).await.unwrap_err();

    assert_eq!(err, GatewayError::Timeout(Duration::from_secs(30)));
    assert_eq!(stt.calls(), 1);
    assert!(started.elapsed() < Duration::from_secs(31));
}

// ============================================================================
// Response generation
// ============================================================================

#[tokio::test]
async fn test_history_is_limited_to_last_ten_turns() {
    let chat = Arc::new(FakeChat::new());
    let gateway = ResponseGateway::new(chat.clone(), PromptBuilder::default());

    gateway.generate("how are you", None, &turns(12)).await.unwrap();

    let messages = chat.last_request();
    // system + 10 user/assistant pairs + current user text
    assert_eq!(messages.len(), 22);
    assert_eq!(messages[0].role, ChatRole::System);
    assert_eq!(messages[1].content, "user 2");
    assert_eq!(messages[21].content, "how are you");
}

#[tokio::test]
async fn test_emotion_guidance_layer() {
    let chat = Arc::new(FakeChat::new());
    let gateway = ResponseGateway::new(chat.clone(), PromptBuilder::new("Be kind."));

    let context = EmotionContext {
        dominant: "angry".to_string(),
        score: 0.35,
        intensity: Intensity::Low,
        ambivalent: true,
        secondary: Some("sad".to_string()),
    };
    gateway
        .generate("everything is annoying", Some(&context), &turns(1))
        .await
        .unwrap();

    let messages = chat.last_request();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0].content, "Be kind.");
    assert_eq!(messages[1].role, ChatRole::System);
    assert!(messages[1].content.contains("angry"));
    assert!(messages[1].content.contains("low intensity"));
    assert!(messages[1].content.contains("sad"));
}

#[tokio::test(start_paused = true)]
async fn test_bad_request_is_not_retried() {
    let chat = Arc::new(FakeChat::scripted(vec![Err(ProviderFailure::http(400, "bad request"))]));
    let gateway = ResponseGateway::new(chat.clone(), PromptBuilder::default());

    let err = gateway.generate("hello", None, &[]).await.unwrap_err();
    assert!(matches!(err, GatewayError::Provider(ProviderFailure { status: Some(400), .. })));
    assert_eq!(chat.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_is_retried() {
    let chat = Arc::new(FakeChat::scripted(vec![
        Err(ProviderFailure::http(429, "slow down")),
        Ok("ok now".to_string()),
    ]));
    let gateway = ResponseGateway::new(chat.clone(), PromptBuilder::default());

    assert_eq!(gateway.generate("hello", None, &[]).await.unwrap(), "ok now");
    assert_eq!(chat.calls(), 2);
}

// ============================================================================
// Speech synthesis
// ============================================================================

#[tokio::test]
async fn test_voice_follows_reply_content() {
    let tts = Arc::new(FakeTts::new());
    let gateway = SpeechGateway::new(tts.clone());

    let audio = gateway.synthesize("It's okay to feel anxious sometimes.").await.unwrap();
    assert_eq!(audio.voice, "nova");
    assert_eq!(audio.mime_type, "audio/mpeg");
    assert!(!audio.data.is_empty());

    let audio = gateway.synthesize("Tell me about your week.").await.unwrap();
    assert_eq!(audio.voice, "alloy");

    assert_eq!(*tts.voices.lock().unwrap(), vec!["nova".to_string(), "alloy".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_speech_server_error_exhausts_budget() {
    let tts = Arc::new(FakeTts::scripted(vec![
        Err(ProviderFailure::http(503, "unavailable")),
        Err(ProviderFailure::http(503, "unavailable")),
        Err(ProviderFailure::http(503, "unavailable")),
    ]));
    let gateway = SpeechGateway::new(tts.clone());

    let started = Instant::now();
    let err = gateway.synthesize("hello").await.unwrap_err();

    assert!(matches!(err, GatewayError::RetryExhausted { attempts: 3, .. }));
    assert_eq!(tts.calls(), 3);
    assert!(started.elapsed() >= Duration::from_secs(3));
}
