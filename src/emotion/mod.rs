//! Emotion sampling
//!
//! Polls a face/expression detector on a fixed period, keeps a bounded
//! rolling history of the top-scoring expression per frame, tracks whether
//! a face is present, and derives the trend and prompt context consumed by
//! the session orchestrator.

mod context;
mod detector;
mod history;
mod sample;
mod sampler;

pub use context::{EmotionContext, EmotionSummary, Intensity};
pub use detector::{FaceDetector, FrameSource, HttpFaceDetector, LatestFrame, VideoFrame};
pub use history::{EmotionHistory, EmotionTrend, MIN_TREND_SAMPLES};
pub use sample::{BoundingBox, EmotionSample, ExpressionScore, FaceDetection};
pub use sampler::{
    EmotionSampler, PresenceObserver, SampleObserver, SamplerConfig, SamplerHandle, TickOutcome,
};
