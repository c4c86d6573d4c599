//! Race winner and pole predictions fused from recent results, car
//! telemetry, race-day weather and news sentiment.

pub mod cache;
pub mod championship;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod formatter;
pub mod last_race;
pub mod model;
pub mod recent;
pub mod retry;
pub mod scoring;
pub mod sources;
pub mod stats;
pub mod telemetry;
pub mod types;
pub mod weather;

pub use config::EngineConfig;
pub use engine::{EngineBuilder, PredictionEngine, ScoredRound};
pub use error::{PredictError, SourceError};
pub use types::{PredictionKind, PredictionResult};
