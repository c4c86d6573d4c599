use serde::{Deserialize, Serialize};

use crate::types::PerformanceMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    /// Seconds since the start of the lap
    pub t_s: f64,
    /// Speed in km/h
    pub speed_kph: f64,
}

/// Speed trace of one lap, kept in time order, used to derive car performance.
#[derive(Debug, Clone, Default)]
pub struct SpeedTrace {
    samples: Vec<SpeedSample>,
}

impl SpeedTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample; non-finite speeds are ignored.
    pub fn add_sample(&mut self, t_s: f64, speed_kph: f64) {
        if !t_s.is_finite() || !speed_kph.is_finite() {
            return;
        }
        let sample = SpeedSample { t_s, speed_kph };
        // samples usually arrive in order; keep the trace sorted either way
        let idx = self.samples.partition_point(|s| s.t_s <= t_s);
        self.samples.insert(idx, sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn top_speed(&self) -> Option<f64> {
        self.samples.iter().map(|s| s.speed_kph).reduce(f64::max)
    }

    /// Mean of the positive consecutive speed deltas; 0 when the car never gains speed.
    pub fn acceleration_score(&self) -> f64 {
        let gains: Vec<f64> = self
            .samples
            .windows(2)
            .map(|w| w[1].speed_kph - w[0].speed_kph)
            .filter(|d| *d > 0.0)
            .collect();
        if gains.is_empty() {
            0.0
        } else {
            gains.iter().sum::<f64>() / gains.len() as f64
        }
    }
}

/// Population standard deviation of valid lap durations; needs two laps.
pub fn lap_time_consistency(lap_durations_s: &[f64]) -> Option<f64> {
    let laps: Vec<f64> = lap_durations_s
        .iter()
        .cloned()
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();
    if laps.len() < 2 {
        return None;
    }
    let mean = laps.iter().sum::<f64>() / laps.len() as f64;
    let var = laps.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / laps.len() as f64;
    Some(var.sqrt())
}

/// `None` when the fastest-lap trace is empty.
pub fn summarize(fastest_lap: &SpeedTrace, lap_durations_s: &[f64]) -> Option<PerformanceMetrics> {
    Some(PerformanceMetrics {
        top_speed: fastest_lap.top_speed()?,
        acceleration_score: fastest_lap.acceleration_score(),
        tyre_consistency: lap_time_consistency(lap_durations_s),
    })
}
