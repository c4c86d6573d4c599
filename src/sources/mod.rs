//! External collaborators consumed by the prediction engine.
//!
//! Each trait is the whole contract the core relies on; the HTTP-backed
//! implementations live in the submodules and can be swapped for in-memory
//! fakes in tests.

pub mod cached;
pub mod ergast;
pub mod news;
pub mod openf1;
pub mod openmeteo;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::SourceError;
use crate::types::{
    CircuitInfo, DriverSentiment, PerformanceMetrics, SessionKind, SessionRecord, SessionSummary,
    WeatherFeatures,
};

pub type SourceResult<T> = Result<T, SourceError>;

#[async_trait]
pub trait ScheduleProvider: Send + Sync {
    /// Every round of `season` in calendar order.
    async fn season_schedule(&self, season: i32) -> SourceResult<Vec<SessionSummary>>;

    /// Rounds of `season` dated strictly before `as_of`, in calendar order.
    async fn completed_sessions(
        &self,
        season: i32,
        as_of: NaiveDate,
    ) -> SourceResult<Vec<SessionSummary>> {
        let schedule = self.season_schedule(season).await?;
        Ok(schedule.into_iter().filter(|s| s.date < as_of).collect())
    }
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session_results(
        &self,
        season: i32,
        round: u32,
        kind: SessionKind,
    ) -> SourceResult<SessionRecord>;
}

/// Keys are competitor ids or car numbers rendered as strings.
#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// Metrics for the race of `season`/`round`, held on `date`.
    async fn performance_metrics(
        &self,
        season: i32,
        round: u32,
        date: NaiveDate,
    ) -> SourceResult<HashMap<String, PerformanceMetrics>>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Forecast for future dates, observed weather for past ones.
    async fn forecast_or_historical(
        &self,
        circuit: &CircuitInfo,
        date: NaiveDate,
    ) -> SourceResult<Option<WeatherFeatures>>;
}

#[async_trait]
pub trait SentimentProvider: Send + Sync {
    async fn driver_sentiment(&self, name: &str) -> SourceResult<Option<DriverSentiment>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverStanding {
    pub driver: String,
    pub team: String,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructorStanding {
    pub team: String,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standings {
    pub season: String,
    pub drivers: Vec<DriverStanding>,
    pub constructors: Vec<ConstructorStanding>,
    pub current_round: u32,
    pub total_rounds: u32,
}

#[async_trait]
pub trait StandingsProvider: Send + Sync {
    async fn current_standings(&self) -> SourceResult<Standings>;
}
