use anyhow::Result;
use tokio::sync::mpsc;

/// A block of interleaved 16-bit PCM delivered by a backend
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Offset from the start of capture
    pub timestamp_ms: u64,
}

/// Constraints requested when acquiring the microphone
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Requested channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Nominal sample rate in Hz
    pub sample_rate: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            channels: 2,         // Stereo
            sample_rate: 48000, // 48kHz nominal
        }
    }
}

/// A source of microphone-like audio
///
/// `CpalBackend` reads the default input device (`microphone` feature);
/// `FileBackend` replays a WAV file at real-time pace.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquire the device and start capturing
    ///
    /// Returns a channel receiver that will receive audio frames. An error
    /// here means the device is unavailable or permission was denied.
    async fn start(&mut self, constraints: &CaptureConstraints) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop the capture stream (the device may stay acquired)
    async fn stop(&mut self) -> Result<()>;

    /// Release the device entirely
    async fn release(&mut self);

    fn is_capturing(&self) -> bool;

    /// Short label for log lines
    fn name(&self) -> &str;
}

/// Where recorded audio comes from
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default microphone (requires the `microphone` feature)
    Microphone,
    /// WAV file input, streamed at real-time pace
    File(String),
}

pub struct AudioBackendFactory;

impl AudioBackendFactory {
    pub fn create(source: AudioSource) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    use super::microphone::CpalBackend;
                    Ok(Box::new(CpalBackend::new()))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    anyhow::bail!(
                        "Microphone capture requires building with the `microphone` feature"
                    )
                }
            }

            AudioSource::File(path) => {
                use super::file::FileBackend;
                Ok(Box::new(FileBackend::new(path)))
            }
        }
    }
}
