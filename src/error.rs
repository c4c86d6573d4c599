use thiserror::Error;

/// Failure of one external collaborator call.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the prediction engine.
///
/// Only `ConfigurationMismatch` and `Model` escape the public prediction
/// operations; the other variants are absorbed into degradation or an
/// "unable to predict" answer.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("source {collaborator} unavailable: {reason}")]
    SourceUnavailable { collaborator: String, reason: String },

    #[error("no completed sessions available")]
    NoData,

    #[error("feature configuration mismatch: expected {expected}, got {actual}")]
    ConfigurationMismatch { expected: String, actual: String },

    #[error("model error: {0}")]
    Model(String),
}

impl PredictError {
    pub fn unavailable(collaborator: &str, err: impl std::fmt::Display) -> Self {
        PredictError::SourceUnavailable {
            collaborator: collaborator.to_string(),
            reason: err.to_string(),
        }
    }

    /// True for errors that must abort the request instead of degrading.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PredictError::ConfigurationMismatch { .. } | PredictError::Model(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(PredictError::ConfigurationMismatch {
            expected: "a".into(),
            actual: "b".into()
        }
        .is_fatal());
        assert!(PredictError::Model("boom".into()).is_fatal());
        assert!(!PredictError::NoData.is_fatal());
        assert!(!PredictError::unavailable("weather", "timeout").is_fatal());
    }

    #[test]
    fn display_names_the_source() {
        let err = PredictError::unavailable("telemetry", "connection refused");
        assert_eq!(
            err.to_string(),
            "source telemetry unavailable: connection refused"
        );
    }
}
