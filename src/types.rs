use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which timed unit of a round a result set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Qualifying,
    Race,
}

/// One competitor's outcome in one completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub competitor_id: String,
    pub competitor_name: String,
    pub team: String,
    pub car_number: Option<u32>,       // permanent or race number, used to join telemetry
    pub finish_position: Option<u32>,  // unset when not classified
    pub start_position: Option<u32>,   // unset for pit-lane starts
    pub points: f64,
    pub status: String,                // free text, "DNF" marks a retirement
}

impl ResultRecord {
    pub fn is_classified(&self) -> bool {
        self.finish_position.is_some()
    }

    pub fn is_dnf(&self) -> bool {
        self.status.contains("DNF")
    }
}

/// Where a round takes place; needed to ask for a weather forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitInfo {
    pub circuit_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Calendar entry for a round, without results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub event_name: String,
    pub round_number: u32,
    pub season_year: i32,
    pub date: NaiveDate,
    pub circuit: Option<CircuitInfo>,
}

/// A completed session with its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub event_name: String,
    pub round_number: u32,
    pub season_year: i32,
    pub date: NaiveDate,
    pub results: Vec<ResultRecord>,
}

/// Snapshot served by the recent-results cache. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultWindow {
    /// Chronological, most recent last.
    pub sessions: Vec<SessionRecord>,
    pub season_used: i32,
    pub using_fallback_season: bool,
    /// First round of the current season not yet run, if the calendar has one.
    pub upcoming: Option<SessionSummary>,
}

impl ResultWindow {
    pub fn empty(season_used: i32) -> Self {
        Self {
            sessions: Vec::new(),
            season_used,
            using_fallback_season: false,
            upcoming: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn latest(&self) -> Option<&SessionRecord> {
        self.sessions.last()
    }
}

/// Car performance figures derived from one session's telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub top_speed: f64,
    pub acceleration_score: f64,
    pub tyre_consistency: Option<f64>,
}

/// Race-wide aggregated weather, keyed by unprefixed feature name.
pub type WeatherFeatures = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

/// One article that mentioned the driver, with its polarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredArticle {
    pub title: String,
    pub source: String,
    pub published: Option<DateTime<Utc>>,
    pub sentiment: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverSentiment {
    pub average_sentiment: f64,
    pub sentiment_std: f64,      // sample deviation; 0 with a single article
    pub average_subjectivity: f64,
    pub distribution: SentimentDistribution,
    pub article_count: usize,
    // strongest first, at most ten each
    #[serde(default)]
    pub positive_articles: Vec<ScoredArticle>,
    #[serde(default)]
    pub neutral_articles: Vec<ScoredArticle>,
    #[serde(default)]
    pub negative_articles: Vec<ScoredArticle>,
}

/// Which outcome a prediction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    RaceWinner,
    Pole,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerUp {
    pub competitor_id: String,
    pub competitor_name: String,
    pub team: String,
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionMetadata {
    pub using_fallback_season: bool,
    pub season_used: i32,
    /// Advisory only; `confidence` is never rescaled by it.
    pub confidence_adjustment: f64,
    /// Optional sources that did not respond for this prediction.
    pub degraded_sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub kind: PredictionKind,
    pub winner_id: String,
    pub winner_name: String,
    pub confidence: u8,
    pub team: String,
    pub reasons: Vec<String>,
    pub other_predictions: Vec<RunnerUp>,
    pub metadata: PredictionMetadata,
}
