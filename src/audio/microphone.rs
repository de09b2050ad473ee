// Live microphone backend using cpal
//
// cpal streams are not Send, so each capture owns a dedicated thread that
// builds the stream, keeps it alive, and drops it when told to stop.

use anyhow::{anyhow, bail, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioFrame, CaptureConstraints};

pub struct CpalBackend {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            stop_tx: None,
            thread: None,
        }
    }

    fn build_stream(
        constraints: &CaptureConstraints,
        frame_tx: mpsc::Sender<AudioFrame>,
    ) -> Result<cpal::Stream> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        if constraints.echo_cancellation || constraints.noise_suppression || constraints.auto_gain_control {
            info!("Echo cancellation / noise suppression / auto gain are left to the OS input chain");
        }

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        if sample_rate != constraints.sample_rate || channels != constraints.channels {
            info!(
                "Device runs at {}Hz/{}ch (requested {}Hz/{}ch)",
                sample_rate, channels, constraints.sample_rate, constraints.channels
            );
        }

        let mut samples_sent: u64 = 0;
        let mut emit = move |samples: Vec<i16>| {
            let timestamp_ms =
                samples_sent * 1000 / (sample_rate as u64 * channels.max(1) as u64);
            samples_sent += samples.len() as u64;
            let frame = AudioFrame {
                samples,
                sample_rate,
                channels,
                timestamp_ms,
            };
            if let Err(e) = frame_tx.try_send(frame) {
                warn!("Dropping microphone frame: {}", e);
            }
        };

        let on_error = |err: cpal::StreamError| warn!("Audio stream error: {}", err);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    emit(
                        data.iter()
                            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect(),
                    )
                },
                on_error,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| emit(data.to_vec()),
                on_error,
                None,
            )?,
            other => bail!("Unsupported input sample format: {:?}", other),
        };

        stream.play()?;
        Ok(stream)
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AudioBackend for CpalBackend {
    async fn start(&mut self, constraints: &CaptureConstraints) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.thread.is_some() {
            bail!("Already capturing");
        }

        let (frame_tx, frame_rx) = mpsc::channel(256);
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let constraints = constraints.clone();

        let handle = thread::spawn(move || match Self::build_stream(&constraints, frame_tx) {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                // Keep the stream alive until stop (or the sender is dropped)
                let _ = stop_rx.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(format!("{:#}", e)));
            }
        });

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| anyhow!("Microphone setup task failed: {}", e))?
            .map_err(|_| anyhow!("Microphone thread exited during setup"))?;

        if let Err(e) = ready {
            let _ = handle.join();
            bail!(e);
        }

        self.stop_tx = Some(stop_tx);
        self.thread = Some(handle);
        info!("Microphone capture started");

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| anyhow!("Failed to join microphone thread: {}", e))?
                .map_err(|_| anyhow!("Microphone thread panicked"))?;
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    async fn release(&mut self) {
        if let Err(e) = self.stop().await {
            warn!("Failed to release microphone: {}", e);
        }
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}
