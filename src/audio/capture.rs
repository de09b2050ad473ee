use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioFrame, CaptureConstraints};
use super::codec::{AudioBlob, AudioCodec};
use super::meter::{VolumeMeter, FFT_SIZE};
use crate::config::AudioConfig;
use crate::error::CaptureError;

/// Called with the live volume level (0..=100)
pub type VolumeObserver = Arc<dyn Fn(u8) + Send + Sync>;

/// Configuration for microphone capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub constraints: CaptureConstraints,
    /// How often buffered audio is flushed into a chunk
    pub chunk_interval: Duration,
    /// Volume metering period
    pub meter_interval: Duration,
    /// Ordered codec preference for the finished blob
    pub preferred_codecs: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            chunk_interval: Duration::from_secs(1),
            meter_interval: Duration::from_millis(100),
            preferred_codecs: vec!["audio/wav".to_string()],
        }
    }
}

impl From<&AudioConfig> for CaptureConfig {
    fn from(cfg: &AudioConfig) -> Self {
        Self {
            constraints: CaptureConstraints {
                echo_cancellation: cfg.echo_cancellation,
                noise_suppression: cfg.noise_suppression,
                auto_gain_control: cfg.auto_gain_control,
                channels: cfg.channels,
                sample_rate: cfg.sample_rate,
            },
            chunk_interval: cfg.chunk_interval(),
            meter_interval: cfg.meter_interval(),
            preferred_codecs: cfg.preferred_codecs.clone(),
        }
    }
}

/// One flushed slice of the recording (little-endian i16 PCM)
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    /// Timestamp of the first frame in the chunk
    pub start_ms: u64,
}

#[derive(Debug, Default)]
struct CollectedAudio {
    chunks: Vec<AudioChunk>,
    sample_rate: u32,
    channels: u16,
}

struct ActiveRecording {
    stop_tx: oneshot::Sender<()>,
    collector: JoinHandle<CollectedAudio>,
    meter: JoinHandle<()>,
    started_at: Instant,
}

/// Records microphone audio into a chunk buffer and meters its volume
pub struct AudioCapture {
    config: CaptureConfig,
    backend: Box<dyn AudioBackend>,
    active: Option<ActiveRecording>,
    level: Arc<AtomicU8>,
    volume_observer: Option<VolumeObserver>,
}

impl AudioCapture {
    pub fn new(config: CaptureConfig, backend: Box<dyn AudioBackend>) -> Self {
        Self {
            config,
            backend,
            active: None,
            level: Arc::new(AtomicU8::new(0)),
            volume_observer: None,
        }
    }

    /// Register the observer invoked on every meter reading
    pub fn on_volume(&mut self, observer: VolumeObserver) {
        self.volume_observer = Some(observer);
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Most recent volume level (0 when idle)
    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Relaxed)
    }

    /// Acquire the microphone and start buffering
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.active.is_some() {
            warn!("Recording already in progress");
            return Ok(());
        }

        info!("Starting audio capture via {}", self.backend.name());

        let frames = self
            .backend
            .start(&self.config.constraints)
            .await
            .map_err(|e| CaptureError::Device(format!("{:#}", e)))?;

        let analyser = Arc::new(Mutex::new(VecDeque::with_capacity(FFT_SIZE)));
        let (stop_tx, stop_rx) = oneshot::channel();

        let collector = tokio::spawn(collect(
            frames,
            stop_rx,
            self.config.chunk_interval,
            Arc::clone(&analyser),
        ));

        let meter = tokio::spawn(meter(
            analyser,
            self.config.meter_interval,
            Arc::clone(&self.level),
            self.volume_observer.clone(),
        ));

        self.active = Some(ActiveRecording {
            stop_tx,
            collector,
            meter,
            started_at: Instant::now(),
        });

        Ok(())
    }

    /// Stop recording and return the encoded blob
    ///
    /// `Ok(None)` when nothing was captured. The meter and the capture
    /// stream are shut down before encoding, so they stop even when encoding
    /// fails.
    pub async fn stop(&mut self) -> Result<Option<AudioBlob>, CaptureError> {
        let Some(active) = self.active.take() else {
            warn!("No recording in progress");
            return Ok(None);
        };

        let elapsed = active.started_at.elapsed();
        let collected = self.shutdown(active).await;

        let collected = match collected {
            Some(collected) => collected,
            None => return Err(CaptureError::Encode("audio collector failed".to_string())),
        };

        if collected.chunks.is_empty() {
            info!("Recording stopped after {:?} with no audio", elapsed);
            return Ok(None);
        }

        let pcm: Vec<u8> = collected
            .chunks
            .iter()
            .flat_map(|c| c.data.iter().copied())
            .collect();

        let codec = AudioCodec::negotiate(&self.config.preferred_codecs);
        let data = codec.encode(&pcm, collected.sample_rate, collected.channels)?;

        let bytes_per_second =
            collected.sample_rate as u64 * collected.channels.max(1) as u64 * 2;
        let duration_ms = if bytes_per_second == 0 {
            0
        } else {
            pcm.len() as u64 * 1000 / bytes_per_second
        };

        info!(
            "Recording finalized: {} chunks, {} ms, {} bytes ({})",
            collected.chunks.len(),
            duration_ms,
            data.len(),
            codec.mime_type(collected.sample_rate, collected.channels)
        );

        Ok(Some(AudioBlob {
            data,
            mime_type: codec.mime_type(collected.sample_rate, collected.channels),
            sample_rate: collected.sample_rate,
            channels: collected.channels,
            duration_ms,
        }))
    }

    /// Stop recording and discard whatever was buffered
    pub async fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            self.shutdown(active).await;
            info!("Recording cancelled, buffer discarded");
        }
    }

    /// Release the device regardless of recording state
    pub async fn teardown(&mut self) {
        self.cancel().await;
        self.backend.release().await;
        info!("Audio device released ({})", self.backend.name());
    }

    async fn shutdown(&mut self, active: ActiveRecording) -> Option<CollectedAudio> {
        let _ = active.stop_tx.send(());

        active.meter.abort();
        self.level.store(0, Ordering::Relaxed);

        if let Err(e) = self.backend.stop().await {
            warn!("Failed to stop audio backend: {:#}", e);
        }

        match active.collector.await {
            Ok(collected) => Some(collected),
            Err(e) => {
                error!("Audio collector task failed: {}", e);
                None
            }
        }
    }
}

/// Accumulates frames between flushes
struct ChunkBuffer {
    collected: CollectedAudio,
    pending: Vec<u8>,
    pending_start: Option<u64>,
    analyser: Arc<Mutex<VecDeque<f32>>>,
}

impl ChunkBuffer {
    fn accept(&mut self, frame: AudioFrame) {
        self.collected.sample_rate = frame.sample_rate;
        self.collected.channels = frame.channels;
        self.pending_start.get_or_insert(frame.timestamp_ms);
        self.pending
            .extend(frame.samples.iter().flat_map(|s| s.to_le_bytes()));
        feed_analyser(&self.analyser, &frame);
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let chunk = AudioChunk {
            data: std::mem::take(&mut self.pending),
            start_ms: self.pending_start.take().unwrap_or(0),
        };
        debug!("Flushed audio chunk ({} bytes)", chunk.data.len());
        self.collected.chunks.push(chunk);
    }
}

/// Move frames into chunks, flushing every `chunk_interval`
async fn collect(
    mut frames: mpsc::Receiver<AudioFrame>,
    mut stop_rx: oneshot::Receiver<()>,
    chunk_interval: Duration,
    analyser: Arc<Mutex<VecDeque<f32>>>,
) -> CollectedAudio {
    let mut buffer = ChunkBuffer {
        collected: CollectedAudio::default(),
        pending: Vec::new(),
        pending_start: None,
        analyser,
    };

    let mut flush = tokio::time::interval_at(Instant::now() + chunk_interval, chunk_interval);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => buffer.accept(frame),
                None => {
                    debug!("Capture stream ended");
                    break;
                }
            },
            _ = flush.tick() => buffer.flush(),
            _ = &mut stop_rx => {
                // Frames already queued belong to this recording
                while let Ok(frame) = frames.try_recv() {
                    buffer.accept(frame);
                }
                break;
            }
        }
    }

    buffer.flush();
    buffer.collected
}

/// Keep the most recent FFT window of mono samples
fn feed_analyser(analyser: &Mutex<VecDeque<f32>>, frame: &AudioFrame) {
    let Ok(mut window) = analyser.lock() else {
        return;
    };
    let channels = frame.channels.max(1) as usize;
    for group in frame.samples.chunks(channels) {
        let sum: f32 = group.iter().map(|&s| s as f32 / i16::MAX as f32).sum();
        if window.len() == FFT_SIZE {
            window.pop_front();
        }
        window.push_back(sum / group.len() as f32);
    }
}

async fn meter(
    analyser: Arc<Mutex<VecDeque<f32>>>,
    period: Duration,
    level: Arc<AtomicU8>,
    observer: Option<VolumeObserver>,
) {
    let volume = VolumeMeter::new(FFT_SIZE);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let samples: Vec<f32> = match analyser.lock() {
            Ok(window) => window.iter().copied().collect(),
            Err(_) => continue,
        };
        let reading = volume.level(&samples);
        level.store(reading, Ordering::Relaxed);
        if let Some(observer) = &observer {
            observer(reading);
        }
    }
}
