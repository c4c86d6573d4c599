//! Car performance from OpenF1 lap timing and car telemetry.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{SourceResult, TelemetryProvider};
use crate::error::SourceError;
use crate::retry::RetryPolicy;
use crate::telemetry::{summarize, SpeedTrace};
use crate::types::PerformanceMetrics;

const TRACE_FETCH_CONCURRENCY: usize = 4;

#[derive(Deserialize)]
struct SessionRow {
    session_key: u64,
    date_start: String,
}

#[derive(Deserialize, Clone)]
struct LapRow {
    driver_number: u32,
    lap_duration: Option<f64>,
    date_start: Option<String>,
}

#[derive(Deserialize)]
struct CarDataRow {
    date: String,
    speed: Option<f64>,
}

fn parse_ts(raw: &str) -> SourceResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .map_err(|e| SourceError::Decode(format!("bad timestamp {:?}: {}", raw, e)))
}

fn fmt_ts(ts: DateTime<FixedOffset>) -> String {
    ts.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Groups laps by car and picks each car's fastest timed lap.
fn fastest_laps(laps: &[LapRow]) -> BTreeMap<u32, (LapRow, Vec<f64>)> {
    let mut by_car: BTreeMap<u32, (LapRow, Vec<f64>)> = BTreeMap::new();
    for lap in laps {
        let Some(duration) = lap.lap_duration else {
            continue;
        };
        let entry = by_car
            .entry(lap.driver_number)
            .or_insert_with(|| (lap.clone(), Vec::new()));
        entry.1.push(duration);
        if entry.0.lap_duration.map_or(true, |best| duration < best) {
            entry.0 = lap.clone();
        }
    }
    by_car
}

/// The session starting within a day of `date` (local start times can cross
/// midnight UTC); the `round`-th session by start only when none is dated.
fn pick_race_session(mut sessions: Vec<SessionRow>, round: u32, date: NaiveDate) -> Option<u64> {
    let by_date = sessions.iter().find(|s| {
        parse_ts(&s.date_start)
            .map(|ts| (ts.with_timezone(&Utc).date_naive() - date).num_days().abs() <= 1)
            .unwrap_or(false)
    });
    if let Some(s) = by_date {
        return Some(s.session_key);
    }
    sessions.sort_by(|a, b| a.date_start.cmp(&b.date_start));
    let fallback = sessions.get(round.checked_sub(1)? as usize)?;
    tracing::warn!("no race session dated {}; using the {}th of the season", date, round);
    Some(fallback.session_key)
}

pub struct OpenF1Client {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenF1Client {
    pub fn new(base_url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> SourceResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path_and_query: &str) -> SourceResult<T> {
        let url = format!("{}/{}", self.base_url, path_and_query);
        tracing::debug!("GET {}", url);
        let resp = self.client.get(&url).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn race_session_key(&self, season: i32, round: u32, date: NaiveDate) -> SourceResult<u64> {
        let path = format!("sessions?year={}&session_name=Race", season);
        let sessions: Vec<SessionRow> = self.retry.run("telemetry sessions", || self.get(&path)).await?;
        pick_race_session(sessions, round, date)
            .ok_or_else(|| SourceError::NotFound(format!("race session {} round {}", season, round)))
    }

    async fn lap_trace(&self, session_key: u64, lap: &LapRow) -> SourceResult<SpeedTrace> {
        let (Some(start), Some(duration)) = (lap.date_start.as_deref(), lap.lap_duration) else {
            return Err(SourceError::NotFound("lap without start time".into()));
        };
        let start = parse_ts(start)?;
        let end = start + chrono::Duration::milliseconds((duration * 1000.0) as i64);
        let path = format!(
            "car_data?session_key={}&driver_number={}&date>={}&date<={}",
            session_key,
            lap.driver_number,
            fmt_ts(start),
            fmt_ts(end)
        );
        let rows: Vec<CarDataRow> = self.get(&path).await?;

        let mut trace = SpeedTrace::new();
        for row in rows {
            if let (Ok(ts), Some(speed)) = (parse_ts(&row.date), row.speed) {
                let t_s = (ts - start).num_milliseconds() as f64 / 1000.0;
                trace.add_sample(t_s, speed);
            }
        }
        Ok(trace)
    }
}

#[async_trait]
impl TelemetryProvider for OpenF1Client {
    async fn performance_metrics(
        &self,
        season: i32,
        round: u32,
        date: NaiveDate,
    ) -> SourceResult<HashMap<String, PerformanceMetrics>> {
        let session_key = self.race_session_key(season, round, date).await?;
        let laps: Vec<LapRow> = self.get(&format!("laps?session_key={}", session_key)).await?;
        let cars = fastest_laps(&laps);

        let metrics: Vec<(u32, Option<PerformanceMetrics>)> = stream::iter(cars)
            .map(|(car, (fastest, durations))| async move {
                match self.lap_trace(session_key, &fastest).await {
                    Ok(trace) => (car, summarize(&trace, &durations)),
                    Err(e) => {
                        tracing::warn!("no telemetry for car {} in {} round {}: {}", car, season, round, e);
                        (car, None)
                    }
                }
            })
            .buffer_unordered(TRACE_FETCH_CONCURRENCY)
            .collect()
            .await;

        Ok(metrics
            .into_iter()
            .filter_map(|(car, m)| m.map(|m| (car.to_string(), m)))
            .collect())
    }
}
