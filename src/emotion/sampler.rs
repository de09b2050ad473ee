use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::detector::{FaceDetector, FrameSource};
use super::history::{EmotionHistory, EmotionTrend};
use super::sample::EmotionSample;
use crate::config::EmotionConfig;

/// Called with every new sample (at most once per tick)
pub type SampleObserver = Arc<dyn Fn(&EmotionSample) + Send + Sync>;

/// Called when face presence flips (`true` = face lost)
pub type PresenceObserver = Arc<dyn Fn(bool) + Send + Sync>;

/// Configuration for the emotion sampler
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Polling period
    pub interval: Duration,
    /// Continuous absence required before the face counts as lost
    pub face_absence: Duration,
    /// History window size
    pub history_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(300),
            face_absence: Duration::from_millis(3000),
            history_capacity: 20,
        }
    }
}

impl From<&EmotionConfig> for SamplerConfig {
    fn from(cfg: &EmotionConfig) -> Self {
        Self {
            interval: Duration::from_millis(cfg.sample_interval_ms),
            face_absence: Duration::from_millis(cfg.face_absence_ms),
            history_capacity: cfg.history_capacity,
        }
    }
}

/// Outcome of a single sampler tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Input source inactive, nothing polled
    Skipped,
    /// A face was found and a sample recorded
    Sampled(EmotionSample),
    /// No face in this frame
    NoFace { face_lost: bool },
    /// Detector failed; previous state kept
    DetectorError,
}

struct SamplerState {
    history: EmotionHistory,
    absent_since: Option<Instant>,
}

/// Polls a face detector and keeps a rolling emotion history
pub struct EmotionSampler {
    config: SamplerConfig,
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn FaceDetector>,
    state: Mutex<SamplerState>,
    face_lost: AtomicBool,
    sample_observer: Mutex<Option<SampleObserver>>,
    presence_observer: Mutex<Option<PresenceObserver>>,
}

impl EmotionSampler {
    pub fn new(
        config: SamplerConfig,
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn FaceDetector>,
    ) -> Self {
        let history = EmotionHistory::new(config.history_capacity);
        Self {
            config,
            source,
            detector,
            state: Mutex::new(SamplerState {
                history,
                absent_since: None,
            }),
            face_lost: AtomicBool::new(false),
            sample_observer: Mutex::new(None),
            presence_observer: Mutex::new(None),
        }
    }

    pub fn on_sample(&self, observer: SampleObserver) {
        if let Ok(mut slot) = self.sample_observer.lock() {
            *slot = Some(observer);
        }
    }

    pub fn on_presence_change(&self, observer: PresenceObserver) {
        if let Ok(mut slot) = self.presence_observer.lock() {
            *slot = Some(observer);
        }
    }

    /// Run one poll of the detector
    pub async fn tick(&self) -> TickOutcome {
        let Some(frame) = self.source.current_frame() else {
            return TickOutcome::Skipped;
        };

        let faces = match self.detector.detect(&frame).await {
            Ok(faces) => faces,
            Err(e) => {
                warn!("Emotion detection failed: {:#}", e);
                return TickOutcome::DetectorError;
            }
        };

        let now = Instant::now();

        let Some(first) = faces.first() else {
            let lost = {
                let mut state = self.lock_state();
                let since = *state.absent_since.get_or_insert(now);
                now.duration_since(since) >= self.config.face_absence
            };
            if lost {
                self.set_face_lost(true);
            }
            return TickOutcome::NoFace {
                face_lost: self.face_lost(),
            };
        };

        // A face is present even when it carries no scores
        self.lock_state().absent_since = None;
        self.set_face_lost(false);

        let Some(sample) = EmotionSample::from_detection(first, Utc::now()) else {
            debug!("Detected face carried no expression scores");
            return TickOutcome::NoFace { face_lost: false };
        };

        self.lock_state().history.push(sample.clone());

        debug!(
            "Emotion sample: {} ({:.2})",
            sample.primary_label, sample.primary_score
        );

        let observer = self.sample_observer.lock().ok().and_then(|o| o.clone());
        if let Some(observer) = observer {
            observer(&sample);
        }

        TickOutcome::Sampled(sample)
    }

    fn set_face_lost(&self, lost: bool) {
        let previous = self.face_lost.swap(lost, Ordering::SeqCst);
        if previous != lost {
            if lost {
                info!("Face lost");
            } else {
                info!("Face detected");
            }
            let observer = self.presence_observer.lock().ok().and_then(|o| o.clone());
            if let Some(observer) = observer {
                observer(lost);
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SamplerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the periodic sampling task
    ///
    /// Each tick awaits the detector before the next one starts, so detector
    /// calls never overlap.
    pub fn spawn(self: &Arc<Self>) -> SamplerHandle {
        let sampler = Arc::clone(self);
        let period = self.config.interval;

        let task = tokio::spawn(async move {
            info!("Emotion sampler started ({}ms period)", period.as_millis());
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                sampler.tick().await;
            }
        });

        SamplerHandle { task: Some(task) }
    }

    pub fn face_lost(&self) -> bool {
        self.face_lost.load(Ordering::SeqCst)
    }

    pub fn trend(&self) -> Option<EmotionTrend> {
        self.state.lock().ok()?.history.trend()
    }

    pub fn latest(&self) -> Option<EmotionSample> {
        self.state.lock().ok()?.history.latest().cloned()
    }

    /// Copy of the current window, oldest first
    pub fn history(&self) -> Vec<EmotionSample> {
        self.state
            .lock()
            .map(|state| state.history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Handle owning the periodic sampling task; stopping or dropping it ends
/// the task
pub struct SamplerHandle {
    task: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Emotion sampler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
