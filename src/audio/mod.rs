pub mod backend;
pub mod capture;
pub mod codec;
pub mod file;
pub mod meter;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{AudioBackend, AudioBackendFactory, AudioFrame, AudioSource, CaptureConstraints};
pub use capture::{AudioCapture, AudioChunk, CaptureConfig, VolumeObserver};
pub use codec::{AudioBlob, AudioCodec};
pub use file::{AudioFile, FileBackend};
pub use meter::VolumeMeter;
