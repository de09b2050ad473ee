use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

use crate::error::CaptureError;

/// Container formats this crate can produce for a finished recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    /// RIFF/WAVE, 16-bit PCM
    Wav,
    /// Headerless little-endian 16-bit PCM
    Pcm16,
}

impl AudioCodec {
    /// Parse a mime type; `None` for formats we cannot encode
    pub fn from_mime(mime: &str) -> Option<Self> {
        let base = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match base.as_str() {
            "audio/wav" | "audio/wave" | "audio/x-wav" => Some(AudioCodec::Wav),
            "audio/l16" | "audio/pcm" => Some(AudioCodec::Pcm16),
            _ => None,
        }
    }

    /// First producible codec in preference order, WAV when none is
    pub fn negotiate(preferred: &[String]) -> Self {
        for mime in preferred {
            match Self::from_mime(mime) {
                Some(codec) => return codec,
                None => debug!("Codec {} not supported, trying next", mime),
            }
        }
        AudioCodec::Wav
    }

    pub fn mime_type(&self, sample_rate: u32, channels: u16) -> String {
        match self {
            AudioCodec::Wav => "audio/wav".to_string(),
            AudioCodec::Pcm16 => format!("audio/L16;rate={};channels={}", sample_rate, channels),
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            AudioCodec::Wav => "wav",
            AudioCodec::Pcm16 => "pcm",
        }
    }

    /// Encode little-endian i16 PCM bytes
    pub fn encode(&self, pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>, CaptureError> {
        match self {
            AudioCodec::Pcm16 => Ok(pcm.to_vec()),
            AudioCodec::Wav => {
                let spec = hound::WavSpec {
                    channels,
                    sample_rate,
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                };

                let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
                {
                    let mut writer = hound::WavWriter::new(&mut cursor, spec)
                        .map_err(|e| CaptureError::Encode(e.to_string()))?;
                    for pair in pcm.chunks_exact(2) {
                        writer
                            .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                            .map_err(|e| CaptureError::Encode(e.to_string()))?;
                    }
                    writer
                        .finalize()
                        .map_err(|e| CaptureError::Encode(e.to_string()))?;
                }
                Ok(cursor.into_inner())
            }
        }
    }
}

/// A finished recording, ready for transcription
#[derive(Debug, Clone, Serialize)]
pub struct AudioBlob {
    #[serde(skip)]
    pub data: Vec<u8>,
    pub mime_type: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u64,
}

impl AudioBlob {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File name with an extension matching the mime type
    pub fn file_name(&self) -> String {
        let ext = AudioCodec::from_mime(&self.mime_type)
            .map(|c| c.file_extension())
            .unwrap_or("bin");
        format!("audio.{}", ext)
    }
}
