use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::history::EmotionTrend;
use super::sample::EmotionSample;

/// Intensity tier of the dominant emotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Moderate,
    High,
}

impl Intensity {
    /// high > 0.7, low < 0.4, moderate otherwise
    pub fn from_score(score: f32) -> Self {
        if score > 0.7 {
            Intensity::High
        } else if score < 0.4 {
            Intensity::Low
        } else {
            Intensity::Moderate
        }
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Intensity::Low => "low",
            Intensity::Moderate => "moderate",
            Intensity::High => "high",
        })
    }
}

/// Emotional context handed to the response gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionContext {
    pub dominant: String,
    pub score: f32,
    pub intensity: Intensity,
    /// No single emotion clearly dominates
    pub ambivalent: bool,
    /// Runner-up label, if any
    pub secondary: Option<String>,
}

impl EmotionContext {
    /// Derive context from a label → score map and the chosen dominant label
    fn from_scores(dominant: &str, scores: &BTreeMap<String, f32>) -> Self {
        let score = scores.get(dominant).copied().unwrap_or(0.0);

        let mut ranked: Vec<(&String, f32)> = scores.iter().map(|(l, s)| (l, *s)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let top_score = ranked.first().map(|(_, s)| *s).unwrap_or(score);
        let second = ranked
            .iter()
            .find(|(label, _)| label.as_str() != dominant)
            .map(|(label, s)| ((*label).clone(), *s));

        let ambivalent =
            top_score < 0.5 || second.as_ref().map(|(_, s)| *s > 0.3).unwrap_or(false);

        Self {
            dominant: dominant.to_string(),
            score,
            intensity: Intensity::from_score(score),
            ambivalent,
            secondary: second.map(|(label, _)| label),
        }
    }

    pub fn from_trend(trend: &EmotionTrend) -> Self {
        Self::from_scores(&trend.dominant, &trend.mean_scores)
    }

    pub fn from_sample(sample: &EmotionSample) -> Self {
        Self::from_scores(&sample.primary_label, &sample.all_scores)
    }
}

/// Compact summary embedded in a persisted exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSummary {
    pub dominant: String,
    pub intensity: Intensity,
    pub ambivalent: bool,
    pub mean_scores: BTreeMap<String, f32>,
    pub sample_count: usize,
}

impl EmotionSummary {
    pub fn from_trend(trend: &EmotionTrend) -> Self {
        let context = EmotionContext::from_trend(trend);
        Self {
            dominant: trend.dominant.clone(),
            intensity: context.intensity,
            ambivalent: context.ambivalent,
            mean_scores: trend.mean_scores.clone(),
            sample_count: trend.sample_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
        pairs.iter().map(|(l, s)| (l.to_string(), *s)).collect()
    }

    #[test]
    fn test_intensity_thresholds() {
        assert_eq!(Intensity::from_score(0.71), Intensity::High);
        assert_eq!(Intensity::from_score(0.7), Intensity::Moderate);
        assert_eq!(Intensity::from_score(0.4), Intensity::Moderate);
        assert_eq!(Intensity::from_score(0.39), Intensity::Low);
    }

    #[test]
    fn test_clear_emotion_is_not_ambivalent() {
        let ctx = EmotionContext::from_scores("happy", &scores(&[("happy", 0.9), ("sad", 0.05)]));
        assert_eq!(ctx.intensity, Intensity::High);
        assert!(!ctx.ambivalent);
        assert_eq!(ctx.secondary.as_deref(), Some("sad"));
    }

    #[test]
    fn test_low_top_score_is_ambivalent() {
        let ctx = EmotionContext::from_scores("sad", &scores(&[("sad", 0.45), ("neutral", 0.2)]));
        assert!(ctx.ambivalent);
    }

    #[test]
    fn test_strong_second_label_is_ambivalent() {
        let ctx = EmotionContext::from_scores("angry", &scores(&[("angry", 0.6), ("sad", 0.35)]));
        assert_eq!(ctx.intensity, Intensity::Moderate);
        assert!(ctx.ambivalent);
    }
}
