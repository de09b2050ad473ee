use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::backend::{AudioBackend, AudioFrame, CaptureConstraints};

/// Frame length used when replaying a file
const FRAME_MS: u64 = 100;

/// A WAV recording decoded to interleaved 16-bit PCM
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Decode a 16-bit integer or 32-bit float WAV file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
        let spec = reader.spec();

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .into_samples::<i16>()
                .collect::<Result<_, _>>()
                .context("Failed to decode PCM samples")?,
            (SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<_, _>>()
                .context("Failed to decode float samples")?,
            (format, bits) => anyhow::bail!(
                "Unsupported WAV encoding in {}: {:?} {}-bit",
                path.display(),
                format,
                bits
            ),
        };

        let frames = samples.len() as f64 / spec.channels.max(1) as f64;
        let duration_seconds = frames / spec.sample_rate.max(1) as f64;

        info!(
            "Loaded {} ({:.1}s at {}Hz x{})",
            path.display(),
            duration_seconds,
            spec.sample_rate,
            spec.channels
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into fixed-duration frames (interleaved, whole sample frames)
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = (self.sample_rate as u64 * frame_ms / 1000) as usize * self.channels as usize;
        if per_frame == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Backend that replays a WAV file as if it were a live microphone
///
/// The file is read when capture starts, so a missing or unreadable file
/// behaves like an unavailable device.
pub struct FileBackend {
    path: String,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self, _constraints: &CaptureConstraints) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            anyhow::bail!("Already capturing");
        }

        let file = AudioFile::open(&self.path)?;
        let frames = file.frames(FRAME_MS);
        let (tx, rx) = mpsc::channel(64);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(FRAME_MS));
            for frame in frames {
                interval.tick().await;
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        self.task = Some(task);
        info!("File capture started: {}", self.path);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File capture stopped: {}", self.path);
        }
        Ok(())
    }

    async fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
