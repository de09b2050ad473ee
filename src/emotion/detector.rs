use anyhow::{Context, Result};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::sample::FaceDetection;

/// An encoded video frame (e.g. JPEG from a webcam)
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub captured_at: Instant,
}

/// Supplies the frame the detector should look at
///
/// Returning `None` means the input source is inactive and the sampler
/// skips the tick.
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Option<VideoFrame>;
}

/// Face / expression detection capability
#[async_trait::async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a frame; an empty list means no face was found
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<FaceDetection>>;
}

/// Holds the most recently uploaded frame
///
/// Frames older than `max_age` count as an inactive source.
pub struct LatestFrame {
    frame: Mutex<Option<VideoFrame>>,
    max_age: Duration,
}

impl LatestFrame {
    pub fn new(max_age: Duration) -> Self {
        Self {
            frame: Mutex::new(None),
            max_age,
        }
    }

    pub fn update(&self, data: Vec<u8>, mime_type: impl Into<String>) {
        let frame = VideoFrame {
            data,
            mime_type: mime_type.into(),
            captured_at: Instant::now(),
        };
        if let Ok(mut slot) = self.frame.lock() {
            *slot = Some(frame);
        }
    }
}

impl FrameSource for LatestFrame {
    fn current_frame(&self) -> Option<VideoFrame> {
        let slot = self.frame.lock().ok()?;
        slot.as_ref()
            .filter(|frame| frame.captured_at.elapsed() <= self.max_age)
            .cloned()
    }
}

/// Detector backed by an HTTP service that accepts an image body and
/// answers with a JSON list of faces
pub struct HttpFaceDetector {
    client: reqwest::Client,
    url: String,
}

impl HttpFaceDetector {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build detector HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl FaceDetector for HttpFaceDetector {
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<FaceDetection>> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, frame.mime_type.as_str())
            .body(frame.data.clone())
            .send()
            .await
            .context("Detector request failed")?
            .error_for_status()
            .context("Detector returned an error status")?;

        response
            .json::<Vec<FaceDetection>>()
            .await
            .context("Failed to parse detector response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_latest_frame_goes_stale() {
        let source = LatestFrame::new(Duration::from_secs(2));
        assert!(source.current_frame().is_none());

        source.update(vec![1, 2, 3], "image/jpeg");
        assert_eq!(source.current_frame().unwrap().data, vec![1, 2, 3]);

        tokio::time::advance(Duration::from_millis(2500)).await;
        assert!(source.current_frame().is_none());
    }
}
