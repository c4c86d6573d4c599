//! Feature maps to one scalar score per competitor.

use std::sync::Arc;

use crate::error::PredictError;
use crate::features::{summarize_vector, FeatureMap, FeatureSchema};
use crate::types::PredictionKind;

/// Most likely class and its probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassPrediction {
    pub class: usize,
    pub probability: f64,
}

/// A supervised model over a fixed, named feature vector.
pub trait Classifier: Send + Sync {
    /// Input ordering the model was trained with.
    fn feature_names(&self) -> &[String];
    fn predict(&self, x: &[f32]) -> Result<ClassPrediction, PredictError>;
}

#[derive(Clone)]
pub enum Strategy {
    Heuristic,
    Trained(Arc<dyn Classifier>),
}

fn feature(map: &FeatureMap, name: &str) -> f64 {
    map.get(name).unwrap_or(0.0)
}

/// points*0.4 + wins*10 + podiums*5 - dnfs*5 - avg_finish*2
pub fn race_heuristic(f: &FeatureMap) -> f64 {
    feature(f, "points_total") * 0.4 + feature(f, "wins") * 10.0 + feature(f, "podiums") * 5.0
        - feature(f, "dnfs") * 5.0
        - f.get("avg_finish").map_or(0.0, |a| a * 2.0)
}

/// points*0.2 + poles*15 + front_row_starts*8 + (20 - avg_grid)*2 - dnfs*3
pub fn qualifying_heuristic(f: &FeatureMap) -> f64 {
    feature(f, "points_total") * 0.2 + feature(f, "poles") * 15.0
        + feature(f, "front_row_starts") * 8.0
        + f.get("avg_grid").map_or(0.0, |g| (20.0 - g) * 2.0)
        - feature(f, "dnfs") * 3.0
}

pub struct ScoringEngine {
    kind: PredictionKind,
    strategy: Strategy,
    schema: FeatureSchema,
    log_features: bool,
}

impl ScoringEngine {
    pub fn heuristic(kind: PredictionKind, schema: FeatureSchema) -> Self {
        Self {
            kind,
            strategy: Strategy::Heuristic,
            schema,
            log_features: log_features_enabled(),
        }
    }

    /// Refuses a classifier whose input ordering differs from the schema.
    pub fn trained(
        kind: PredictionKind,
        classifier: Arc<dyn Classifier>,
        schema: FeatureSchema,
    ) -> Result<Self, PredictError> {
        schema.check_names(classifier.feature_names())?;
        Ok(Self {
            kind,
            strategy: Strategy::Trained(classifier),
            schema,
            log_features: log_features_enabled(),
        })
    }

    /// One finite score per competitor, in input order.
    pub fn score(&self, fused: &[(String, FeatureMap)]) -> Result<Vec<f64>, PredictError> {
        fused
            .iter()
            .map(|(id, features)| {
                if self.log_features {
                    let v = self.schema.vectorize(features);
                    tracing::info!("features {} {}", id, summarize_vector(&self.schema, &v));
                }
                let score = match &self.strategy {
                    Strategy::Heuristic => match self.kind {
                        PredictionKind::RaceWinner => race_heuristic(features),
                        PredictionKind::Pole => qualifying_heuristic(features),
                    },
                    Strategy::Trained(model) => self.predict_one(model.as_ref(), features)?,
                };
                if score.is_finite() {
                    Ok(score)
                } else {
                    Err(PredictError::Model(format!("non-finite score for {}", id)))
                }
            })
            .collect()
    }

    fn predict_one(&self, model: &dyn Classifier, features: &FeatureMap) -> Result<f64, PredictError> {
        let x = self.schema.vectorize(features);
        let expected = model.feature_names().len();
        if x.len() != expected {
            return Err(PredictError::ConfigurationMismatch {
                expected: format!("{} features", expected),
                actual: format!("{} features", x.len()),
            });
        }
        Ok(model.predict(&x)?.probability)
    }
}

fn log_features_enabled() -> bool {
    std::env::var("LOG_FEATURES").ok().as_deref() == Some("1")
}
