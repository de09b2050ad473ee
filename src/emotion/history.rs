use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use super::sample::EmotionSample;

/// Minimum number of samples before a trend is reported
pub const MIN_TREND_SAMPLES: usize = 3;

/// Aggregate view over the history window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionTrend {
    /// Most frequent primary label across the window
    pub dominant: String,
    /// Mean score per label across every sample in the window
    pub mean_scores: BTreeMap<String, f32>,
    pub sample_count: usize,
}

impl EmotionTrend {
    /// Mean score of the dominant label
    pub fn dominant_score(&self) -> f32 {
        self.mean_scores.get(&self.dominant).copied().unwrap_or(0.0)
    }
}

/// Bounded FIFO window of emotion samples
#[derive(Debug, Clone)]
pub struct EmotionHistory {
    capacity: usize,
    samples: VecDeque<EmotionSample>,
}

impl EmotionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, sample: EmotionSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&EmotionSample> {
        self.samples.back()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &EmotionSample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn trend(&self) -> Option<EmotionTrend> {
        if self.samples.len() < MIN_TREND_SAMPLES {
            return None;
        }

        // Labels in order of first appearance so ties resolve left-to-right
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for sample in &self.samples {
            let label = sample.primary_label.as_str();
            let count = counts.entry(label).or_insert(0);
            if *count == 0 {
                order.push(label);
            }
            *count += 1;
        }

        let dominant = order
            .iter()
            .copied()
            .reduce(|best, label| if counts[label] > counts[best] { label } else { best })?
            .to_string();

        let mut sums: BTreeMap<String, f32> = BTreeMap::new();
        for sample in &self.samples {
            for (label, score) in &sample.all_scores {
                *sums.entry(label.clone()).or_insert(0.0) += score;
            }
        }
        let n = self.samples.len() as f32;
        let mean_scores = sums.into_iter().map(|(label, sum)| (label, sum / n)).collect();

        Some(EmotionTrend {
            dominant,
            mean_scores,
            sample_count: self.samples.len(),
        })
    }
}
