use chrono::Utc;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::{SessionConfig, ANONYMOUS_USER};
use super::stats::{CompletedTurn, SessionEvent, SessionSnapshot, SessionStatus};
use crate::audio::AudioCapture;
use crate::emotion::{EmotionContext, EmotionSampler, EmotionSummary};
use crate::error::{SessionError, Stage};
use crate::gateway::{ChatTurn, Gateways};
use crate::store::{ConversationExchange, ConversationStore};

struct SessionState {
    status: SessionStatus,
    started_at: Option<chrono::DateTime<Utc>>,
    user_id: String,
    history: VecDeque<ChatTurn>,
}

/// Sequences capture, transcription, generation, synthesis and persistence
///
/// Status moves `idle → recording → transcribing → generating →
/// synthesizing → idle`. Any failure passes through `error` and lands back
/// on `idle`. `reset()` bumps an epoch; work started under an older epoch
/// finishes its network call and then drops the result.
pub struct SessionOrchestrator {
    config: SessionConfig,

    /// Held across the device's own awaits
    capture: tokio::sync::Mutex<AudioCapture>,

    sampler: Arc<EmotionSampler>,
    gateways: Arc<Gateways>,
    store: Arc<ConversationStore>,

    state: Mutex<SessionState>,
    epoch: AtomicU64,
    volume: Arc<AtomicU8>,
    events: broadcast::Sender<SessionEvent>,

    /// Outstanding fire-and-forget saves
    saves: Mutex<Vec<JoinHandle<bool>>>,
}

impl SessionOrchestrator {
    pub fn new(
        config: SessionConfig,
        mut capture: AudioCapture,
        sampler: Arc<EmotionSampler>,
        gateways: Arc<Gateways>,
        store: Arc<ConversationStore>,
    ) -> Self {
        let volume = Arc::new(AtomicU8::new(0));
        let level = Arc::clone(&volume);
        capture.on_volume(Arc::new(move |reading| level.store(reading, Ordering::Relaxed)));

        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            config,
            capture: tokio::sync::Mutex::new(capture),
            sampler,
            gateways,
            store,
            state: Mutex::new(SessionState {
                status: SessionStatus::Idle,
                started_at: None,
                user_id: ANONYMOUS_USER.to_string(),
                history: VecDeque::new(),
            }),
            epoch: AtomicU64::new(0),
            volume,
            events,
            saves: Mutex::new(Vec::new()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_status(&self, state: &mut SessionState, status: SessionStatus) {
        if state.status != status {
            debug!("Session {} → {}", state.status, status);
            state.status = status;
            self.emit(SessionEvent::Status { status });
        }
    }

    /// Move to `status` unless a reset happened since `epoch`
    fn advance(&self, epoch: u64, status: SessionStatus) -> Result<(), SessionError> {
        let mut state = self.lock_state();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return Err(SessionError::Cancelled);
        }
        self.set_status(&mut state, status);
        Ok(())
    }

    /// Report a failure and return to idle
    fn fail(&self, epoch: u64, err: SessionError) -> SessionError {
        let mut state = self.lock_state();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Dropping failure from a reset session: {}", err);
            return SessionError::Cancelled;
        }

        error!("Session failed: {}", err);
        self.set_status(&mut state, SessionStatus::Error);
        self.emit(SessionEvent::Error {
            stage: err.stage(),
            message: err.to_string(),
        });
        state.started_at = None;
        self.set_status(&mut state, SessionStatus::Idle);
        err
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_state().status
    }

    pub fn user_id(&self) -> String {
        self.lock_state().user_id.clone()
    }

    /// Attribute future saves to `user_id`, or to the anonymous user
    pub fn set_user(&self, user_id: Option<String>) {
        let user_id = user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());
        info!("Session user set to {}", user_id);
        self.lock_state().user_id = user_id;
    }

    /// Turns currently held for prompt context, oldest first
    pub fn history(&self) -> Vec<ChatTurn> {
        self.lock_state().history.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock_state();
        SessionSnapshot {
            status: state.status,
            user_id: state.user_id.clone(),
            volume: if state.status == SessionStatus::Recording {
                self.volume.load(Ordering::Relaxed)
            } else {
                0
            },
            face_present: !self.sampler.face_lost(),
            history_len: state.history.len(),
            recording_started_at: state.started_at,
        }
    }

    /// Start recording; ignored unless idle
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut capture = self.capture.lock().await;

        {
            let mut state = self.lock_state();
            if state.status != SessionStatus::Idle {
                warn!("Ignoring start while {}", state.status);
                return Ok(());
            }
            state.started_at = Some(Utc::now());
            self.set_status(&mut state, SessionStatus::Recording);
        }

        if let Err(e) = capture.start().await {
            let err = SessionError::from(e);
            let mut state = self.lock_state();
            error!("Could not start recording: {}", err);
            state.started_at = None;
            self.emit(SessionEvent::Error {
                stage: None,
                message: err.to_string(),
            });
            self.set_status(&mut state, SessionStatus::Idle);
            return Err(err);
        }

        info!("Recording started");
        Ok(())
    }

    /// Stop recording and run the reply pipeline to completion
    pub async fn stop(&self) -> Result<CompletedTurn, SessionError> {
        let epoch = {
            let mut state = self.lock_state();
            if state.status != SessionStatus::Recording {
                return Err(SessionError::InvalidState {
                    action: "stop recording",
                    status: state.status,
                });
            }
            self.set_status(&mut state, SessionStatus::Transcribing);
            self.epoch.load(Ordering::SeqCst)
        };

        let recorded = self.capture.lock().await.stop().await;
        self.volume.store(0, Ordering::Relaxed);

        let blob = match recorded {
            Ok(blob) => blob,
            Err(e) => return Err(self.fail(epoch, e.into())),
        };

        if self.epoch.load(Ordering::SeqCst) != epoch {
            return Err(SessionError::Cancelled);
        }

        let blob = match blob {
            Some(blob) if blob.len() >= self.config.min_recording_bytes => blob,
            Some(blob) => {
                warn!("Recording too small ({} bytes), skipping transcription", blob.len());
                return Err(self.fail(epoch, SessionError::EmptyRecording));
            }
            None => return Err(self.fail(epoch, SessionError::EmptyRecording)),
        };

        let transcript = match self.gateways.transcription.transcribe(Some(&blob)).await {
            Ok(text) => text,
            Err(source) => {
                return Err(self.fail(
                    epoch,
                    SessionError::Stage {
                        stage: Stage::Transcription,
                        source,
                    },
                ))
            }
        };

        self.advance(epoch, SessionStatus::Generating)?;
        self.emit(SessionEvent::Transcript {
            text: transcript.clone(),
        });

        let trend = self.sampler.trend();
        let emotion = match &trend {
            Some(trend) => Some(EmotionContext::from_trend(trend)),
            None => self.sampler.latest().map(|s| EmotionContext::from_sample(&s)),
        };
        let (history, user_id) = {
            let state = self.lock_state();
            (state.history.iter().cloned().collect::<Vec<_>>(), state.user_id.clone())
        };

        let response = match self
            .gateways
            .response
            .generate(&transcript, emotion.as_ref(), &history)
            .await
        {
            Ok(text) => text,
            Err(source) => {
                return Err(self.fail(
                    epoch,
                    SessionError::Stage {
                        stage: Stage::Generation,
                        source,
                    },
                ))
            }
        };

        self.advance(epoch, SessionStatus::Synthesizing)?;
        self.emit(SessionEvent::Response {
            text: response.clone(),
        });

        let speech = match self.gateways.speech.synthesize(&response).await {
            Ok(speech) => speech,
            Err(source) => {
                return Err(self.fail(
                    epoch,
                    SessionError::Stage {
                        stage: Stage::Synthesis,
                        source,
                    },
                ))
            }
        };

        let exchange = ConversationExchange::new(
            user_id,
            transcript.clone(),
            response.clone(),
            emotion
                .as_ref()
                .map(|e| e.dominant.clone())
                .unwrap_or_else(|| "neutral".to_string()),
            trend.as_ref().map(EmotionSummary::from_trend),
        );
        let exchange_id = exchange.id.clone();

        self.complete_turn(epoch, &transcript, &response)?;
        self.spawn_save(exchange);
        info!("Turn complete (voice '{}')", speech.voice);

        Ok(CompletedTurn {
            transcript,
            response,
            emotion,
            speech,
            exchange_id,
        })
    }

    /// Remember the turn and return to idle, unless a reset happened since
    /// `epoch`
    fn complete_turn(&self, epoch: u64, user: &str, assistant: &str) -> Result<(), SessionError> {
        let mut state = self.lock_state();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return Err(SessionError::Cancelled);
        }

        state.history.push_back(ChatTurn {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        while state.history.len() > self.config.history_window {
            state.history.pop_front();
        }

        state.started_at = None;
        self.set_status(&mut state, SessionStatus::Idle);
        Ok(())
    }

    fn spawn_save(&self, exchange: ConversationExchange) {
        let store = Arc::clone(&self.store);
        let handle = tokio::spawn(async move {
            let saved = store.save(&exchange).await;
            if !saved {
                error!("Exchange {} could not be stored anywhere", exchange.id);
            }
            saved
        });

        let mut saves = self.saves.lock().unwrap_or_else(|e| e.into_inner());
        saves.retain(|h| !h.is_finished());
        saves.push(handle);
    }

    /// Wait for outstanding saves
    pub async fn flush_saves(&self) {
        let pending: Vec<JoinHandle<bool>> = {
            let mut saves = self.saves.lock().unwrap_or_else(|e| e.into_inner());
            saves.drain(..).collect()
        };
        for result in join_all(pending).await {
            if let Err(e) = result {
                error!("Save task failed: {}", e);
            }
        }
    }

    /// Abandon whatever is in progress and return to idle
    ///
    /// Buffered audio is discarded. Persisted history is untouched.
    pub async fn reset(&self) {
        let mut capture = self.capture.lock().await;
        capture.cancel().await;
        self.volume.store(0, Ordering::Relaxed);

        let mut state = self.lock_state();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        state.started_at = None;
        info!("Session reset from {}", state.status);
        self.set_status(&mut state, SessionStatus::Idle);
        self.emit(SessionEvent::Reset);
    }

    /// Release the audio device and wait for pending saves
    pub async fn teardown(&self) {
        {
            let mut capture = self.capture.lock().await;
            capture.teardown().await;
        }
        {
            let mut state = self.lock_state();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.set_status(&mut state, SessionStatus::Idle);
        }
        self.flush_saves().await;
        info!("Session torn down");
    }
}
