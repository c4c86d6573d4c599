//! Raw scores to bounded [0, 100] confidences, and the prediction ranking.
//!
//! Confidence is a min-max transform of the score set, not a probability.
//! When every score is equal the range is taken as 1 and every competitor
//! gets 100.

use serde::Serialize;

use crate::features::FeatureMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub competitor_id: String,
    pub team: String,
    pub score: f64,
    pub confidence: u8,
    pub features: FeatureMap,
}

/// Paired with input order.
pub fn normalize(scores: &[f64]) -> Vec<u8> {
    let Some(min) = scores.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = scores.iter().copied().fold(min, f64::max);
    let range = if max == min { 1.0 } else { max - min };
    scores
        .iter()
        .map(|s| {
            let c = if max == min {
                100.0
            } else {
                ((s - min) / range * 100.0).clamp(0.0, 100.0)
            };
            c.round() as u8
        })
        .collect()
}

/// Sorts by descending score, ties kept in insertion order, then attaches
/// confidences.
pub fn rank(mut candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let scores: Vec<f64> = candidates.iter().map(|c| c.score).collect();
    for (c, conf) in candidates.iter_mut().zip(normalize(&scores)) {
        c.confidence = conf;
    }
    candidates
}
