use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Face bounding box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One expression score reported by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionScore {
    pub label: String,
    pub score: f32,
}

/// One detected face with its expression vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub expressions: Vec<ExpressionScore>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

impl FaceDetection {
    /// Highest-scoring expression; on equal scores the earlier entry wins
    pub fn top_expression(&self) -> Option<&ExpressionScore> {
        self.expressions.iter().fold(None, |best, candidate| match best {
            Some(current) if candidate.score <= current.score => Some(current),
            _ => Some(candidate),
        })
    }
}

/// A single emotion reading taken from one detector poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    pub timestamp: DateTime<Utc>,
    pub primary_label: String,
    pub primary_score: f32,
    /// Every label reported for the face, clamped to [0, 1]
    pub all_scores: BTreeMap<String, f32>,
    pub bounding_box: Option<BoundingBox>,
}

impl EmotionSample {
    /// Build a sample from the first face of a detection; `None` when the
    /// face carries no expressions
    pub fn from_detection(face: &FaceDetection, timestamp: DateTime<Utc>) -> Option<Self> {
        let top = face.top_expression()?;

        let all_scores = face
            .expressions
            .iter()
            .map(|e| (e.label.to_lowercase(), e.score.clamp(0.0, 1.0)))
            .collect();

        Some(Self {
            timestamp,
            primary_label: top.label.to_lowercase(),
            primary_score: top.score.clamp(0.0, 1.0),
            all_scores,
            bounding_box: face.bounding_box,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(scores: &[(&str, f32)]) -> FaceDetection {
        FaceDetection {
            expressions: scores
                .iter()
                .map(|(label, score)| ExpressionScore {
                    label: label.to_string(),
                    score: *score,
                })
                .collect(),
            bounding_box: None,
        }
    }

    #[test]
    fn test_top_expression_picks_highest() {
        let f = face(&[("neutral", 0.1), ("happy", 0.8), ("sad", 0.1)]);
        assert_eq!(f.top_expression().unwrap().label, "happy");
    }

    #[test]
    fn test_top_expression_tie_keeps_first() {
        let f = face(&[("sad", 0.5), ("angry", 0.5)]);
        assert_eq!(f.top_expression().unwrap().label, "sad");
    }

    #[test]
    fn test_sample_from_empty_face_is_none() {
        assert!(EmotionSample::from_detection(&face(&[]), Utc::now()).is_none());
    }

    #[test]
    fn test_sample_normalizes_labels_and_scores() {
        let sample =
            EmotionSample::from_detection(&face(&[("Happy", 1.3), ("sad", -0.2)]), Utc::now())
                .unwrap();
        assert_eq!(sample.primary_label, "happy");
        assert_eq!(sample.primary_score, 1.0);
        assert_eq!(sample.all_scores["sad"], 0.0);
    }
}
