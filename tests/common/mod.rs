// Shared fakes for integration tests
//
// Each fake implements one capability trait, counts its calls, and replays a
// scripted sequence of results before falling back to a default.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use serenity_pod::audio::{AudioBackend, AudioBlob, AudioFrame, CaptureConstraints};
use serenity_pod::emotion::{ExpressionScore, FaceDetection, FaceDetector, FrameSource, VideoFrame};
use serenity_pod::error::{ProviderFailure, RemoteStoreError};
use serenity_pod::gateway::{ChatCompletion, ChatMessage, SpeechToText, TextToSpeech};
use serenity_pod::store::{RemoteDocument, RemoteQuery, RemoteStore};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Audio
// ============================================================================

/// `n` frames of 100ms stereo 48kHz audio
pub fn frames(n: usize) -> Vec<AudioFrame> {
    (0..n)
        .map(|i| AudioFrame {
            samples: (0..9600).map(|s| ((s % 200) as i16 - 100) * 100).collect(),
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: i as u64 * 100,
        })
        .collect()
}

/// Backend that queues a fixed set of frames every time it starts
pub struct ScriptedBackend {
    frames: Vec<AudioFrame>,
    fail: bool,
    sender: Option<mpsc::Sender<AudioFrame>>,
}

impl ScriptedBackend {
    pub fn with_frames(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            fail: false,
            sender: None,
        }
    }

    pub fn silent() -> Self {
        Self::with_frames(Vec::new())
    }

    pub fn unavailable() -> Self {
        Self {
            frames: Vec::new(),
            fail: true,
            sender: None,
        }
    }
}

#[async_trait]
impl AudioBackend for ScriptedBackend {
    async fn start(&mut self, _constraints: &CaptureConstraints) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.fail {
            anyhow::bail!("permission denied");
        }
        let (tx, rx) = mpsc::channel(self.frames.len() + 1);
        for frame in &self.frames {
            tx.try_send(frame.clone())?;
        }
        self.sender = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.sender = None;
        Ok(())
    }

    async fn release(&mut self) {
        self.sender = None;
    }

    fn is_capturing(&self) -> bool {
        self.sender.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Providers
// ============================================================================

pub struct FakeStt {
    pub calls: AtomicUsize,
    script: Mutex<VecDeque<Result<String, ProviderFailure>>>,
    delay: Option<Duration>,
}

impl FakeStt {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            delay: None,
        }
    }

    pub fn scripted(results: Vec<Result<String, ProviderFailure>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(&self, _audio: &AudioBlob, _language: &str) -> Result<String, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("I have been feeling low lately".to_string()))
    }
}

pub struct FakeChat {
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    script: Mutex<VecDeque<Result<String, ProviderFailure>>>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn scripted(results: Vec<Result<String, ProviderFailure>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Vec<ChatMessage> {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatCompletion for FakeChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("That sounds heavy. What has been weighing on you?".to_string()))
    }
}

pub struct FakeTts {
    pub calls: AtomicUsize,
    pub voices: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Result<Vec<u8>, ProviderFailure>>>,
    delay: Option<Duration>,
}

impl FakeTts {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            voices: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            delay: None,
        }
    }

    pub fn scripted(results: Vec<Result<Vec<u8>, ProviderFailure>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(&self, _text: &str, voice: &str) -> Result<Vec<u8>, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.voices.lock().unwrap().push(voice.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(vec![0xFF, 0xF3, 0x44, 0xC4]))
    }
}

// ============================================================================
// Remote store
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteMode {
    /// Keeps documents in memory
    Memory,
    /// Accepts writes, always answers queries with nothing
    Empty,
    /// Every call fails
    Failing,
    /// Every call hangs for this long before succeeding
    Slow(Duration),
}

pub struct FakeRemote {
    mode: RemoteMode,
    pub creates: AtomicUsize,
    pub queries: AtomicUsize,
    pub pings: AtomicUsize,
    pub documents: Mutex<Vec<RemoteDocument>>,
}

impl FakeRemote {
    pub fn new(mode: RemoteMode) -> Self {
        Self {
            mode,
            creates: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            documents: Mutex::new(Vec::new()),
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn ping(&self) -> Result<(), RemoteStoreError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            RemoteMode::Failing => Err(RemoteStoreError::Request("unreachable".to_string())),
            RemoteMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            RemoteMode::Memory | RemoteMode::Empty => Ok(()),
        }
    }

    async fn create(&self, _collection: &str, data: Value) -> Result<String, RemoteStoreError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            RemoteMode::Failing => Err(RemoteStoreError::Request("unreachable".to_string())),
            RemoteMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(format!("doc-{}", n))
            }
            RemoteMode::Memory | RemoteMode::Empty => {
                let id = format!("doc-{}", n);
                self.documents.lock().unwrap().push(RemoteDocument {
                    id: id.clone(),
                    data,
                });
                Ok(id)
            }
        }
    }

    async fn query(&self, query: &RemoteQuery) -> Result<Vec<RemoteDocument>, RemoteStoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            RemoteMode::Failing => Err(RemoteStoreError::Request("unreachable".to_string())),
            RemoteMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Vec::new())
            }
            RemoteMode::Empty => Ok(Vec::new()),
            RemoteMode::Memory => {
                let wanted = query.filters.first().map(|f| f.value.clone());
                let mut docs: Vec<RemoteDocument> = self
                    .documents
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|d| wanted.as_ref().map_or(true, |w| d.data.get("user_id") == Some(w)))
                    .cloned()
                    .collect();
                docs.sort_by_key(|d| std::cmp::Reverse(d.data["timestamp"].as_i64()));
                Ok(docs)
            }
        }
    }
}

// ============================================================================
// Emotion detection
// ============================================================================

pub fn face(scores: &[(&str, f32)]) -> FaceDetection {
    FaceDetection {
        expressions: scores
            .iter()
            .map(|(label, score)| ExpressionScore {
                label: label.to_string(),
                score: *score,
            })
            .collect(),
        bounding_box: None,
    }
}

/// Frame source that always has a frame
pub struct AlwaysFrame;

impl FrameSource for AlwaysFrame {
    fn current_frame(&self) -> Option<VideoFrame> {
        Some(VideoFrame {
            data: vec![0xFF, 0xD8],
            mime_type: "image/jpeg".to_string(),
            captured_at: tokio::time::Instant::now(),
        })
    }
}

/// Detector replaying scripted results, then reporting no faces
pub struct ScriptedDetector {
    pub calls: AtomicUsize,
    script: Mutex<VecDeque<Result<Vec<FaceDetection>, String>>>,
    fallback: Vec<FaceDetection>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Result<Vec<FaceDetection>, String>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
            fallback: Vec::new(),
        }
    }

    /// Always reports the same faces
    pub fn constant(faces: Vec<FaceDetection>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fallback: faces,
        }
    }

    pub fn push(&self, result: Result<Vec<FaceDetection>, String>) {
        self.script.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl FaceDetector for ScriptedDetector {
    async fn detect(&self, _frame: &VideoFrame) -> Result<Vec<FaceDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(faces)) => Ok(faces),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}
