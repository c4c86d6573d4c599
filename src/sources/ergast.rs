//! Results, calendar and standings over the Ergast-compatible Jolpica API.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{
    ConstructorStanding, DriverStanding, ScheduleProvider, SessionProvider, SourceResult,
    Standings, StandingsProvider,
};
use crate::error::SourceError;
use crate::retry::RetryPolicy;
use crate::types::{CircuitInfo, ResultRecord, SessionKind, SessionRecord, SessionSummary};

const PAGE_LIMIT: u32 = 100;

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(rename = "MRData")]
    mr_data: T,
}

#[derive(Deserialize)]
struct RaceTableData {
    #[serde(rename = "RaceTable")]
    race_table: RaceTable,
    #[serde(default)]
    total: Option<String>,
}

#[derive(Deserialize)]
struct RaceTable {
    #[serde(rename = "Races", default)]
    races: Vec<Race>,
}

#[derive(Deserialize)]
struct Race {
    season: String,
    round: String,
    #[serde(rename = "raceName")]
    race_name: String,
    date: String,
    #[serde(rename = "Circuit")]
    circuit: Option<Circuit>,
    #[serde(rename = "Results", default)]
    results: Vec<RaceResult>,
    #[serde(rename = "QualifyingResults", default)]
    qualifying: Vec<QualifyingResult>,
}

#[derive(Deserialize)]
struct Circuit {
    #[serde(rename = "circuitId")]
    circuit_id: String,
    #[serde(rename = "circuitName")]
    circuit_name: String,
    #[serde(rename = "Location")]
    location: Location,
}

#[derive(Deserialize)]
struct Location {
    lat: String,
    long: String,
}

#[derive(Deserialize)]
struct Driver {
    #[serde(rename = "driverId")]
    driver_id: String,
    #[serde(rename = "givenName")]
    given_name: String,
    #[serde(rename = "familyName")]
    family_name: String,
}

impl Driver {
    fn full_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
    }
}

#[derive(Deserialize)]
struct Constructor {
    name: String,
}

#[derive(Deserialize)]
struct RaceResult {
    number: Option<String>,
    #[serde(rename = "positionText")]
    position_text: String,
    points: String,
    grid: Option<String>,
    status: String,
    #[serde(rename = "Driver")]
    driver: Driver,
    #[serde(rename = "Constructor")]
    constructor: Constructor,
}

#[derive(Deserialize)]
struct QualifyingResult {
    number: Option<String>,
    position: Option<String>,
    #[serde(rename = "Driver")]
    driver: Driver,
    #[serde(rename = "Constructor")]
    constructor: Constructor,
}

#[derive(Deserialize)]
struct StandingsData {
    #[serde(rename = "StandingsTable")]
    standings_table: StandingsTable,
}

#[derive(Deserialize)]
struct StandingsTable {
    season: String,
    #[serde(rename = "StandingsLists", default)]
    lists: Vec<StandingsList>,
}

#[derive(Deserialize)]
struct StandingsList {
    round: String,
    #[serde(rename = "DriverStandings", default)]
    drivers: Vec<DriverStandingRow>,
    #[serde(rename = "ConstructorStandings", default)]
    constructors: Vec<ConstructorStandingRow>,
}

#[derive(Deserialize)]
struct DriverStandingRow {
    points: String,
    #[serde(rename = "Driver")]
    driver: Driver,
    #[serde(rename = "Constructors", default)]
    constructors: Vec<Constructor>,
}

#[derive(Deserialize)]
struct ConstructorStandingRow {
    points: String,
    #[serde(rename = "Constructor")]
    constructor: Constructor,
}

fn parse_num<T: std::str::FromStr>(field: &str, raw: &str) -> SourceResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| SourceError::Decode(format!("bad {}: {:?}", field, raw)))
}

fn parse_date(raw: &str) -> SourceResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| SourceError::Decode(format!("bad date {:?}: {}", raw, e)))
}

fn summary_of(race: &Race) -> SourceResult<SessionSummary> {
    let circuit = race.circuit.as_ref().and_then(|c| {
        Some(CircuitInfo {
            circuit_id: c.circuit_id.clone(),
            name: c.circuit_name.clone(),
            latitude: c.location.lat.parse().ok()?,
            longitude: c.location.long.parse().ok()?,
        })
    });
    Ok(SessionSummary {
        event_name: race.race_name.clone(),
        round_number: parse_num("round", &race.round)?,
        season_year: parse_num("season", &race.season)?,
        date: parse_date(&race.date)?,
        circuit,
    })
}

/// Statuses that end a race without a retirement.
fn is_running_status(status: &str) -> bool {
    matches!(status, "Finished" | "Lapped" | "Disqualified" | "Withdrawn")
        || status.starts_with('+')
        || status.starts_with("Did not")
}

/// Maps one race classification row; retirements are tagged "DNF" whether or not
/// they were still classified.
fn race_record(r: &RaceResult) -> SourceResult<ResultRecord> {
    let finish_position = r.position_text.parse::<u32>().ok();
    let status = if r.position_text == "R" || !is_running_status(&r.status) {
        format!("DNF ({})", r.status)
    } else {
        r.status.clone()
    };
    Ok(ResultRecord {
        competitor_id: r.driver.driver_id.clone(),
        competitor_name: r.driver.full_name(),
        team: r.constructor.name.clone(),
        car_number: r.number.as_deref().and_then(|n| n.parse().ok()),
        finish_position,
        // grid 0 is a pit-lane start
        start_position: r
            .grid
            .as_deref()
            .and_then(|g| g.parse::<u32>().ok())
            .filter(|g| *g > 0),
        points: if finish_position.is_some() {
            parse_num("points", &r.points)?
        } else {
            0.0
        },
        status,
    })
}

fn qualifying_record(q: &QualifyingResult) -> ResultRecord {
    let position = q.position.as_deref().and_then(|p| p.parse().ok());
    ResultRecord {
        competitor_id: q.driver.driver_id.clone(),
        competitor_name: q.driver.full_name(),
        team: q.constructor.name.clone(),
        car_number: q.number.as_deref().and_then(|n| n.parse().ok()),
        finish_position: position,
        start_position: position,
        points: 0.0,
        status: "Qualified".to_string(),
    }
}

pub struct ErgastClient {
    client: reqwest::Client,
    base_url: String,
    standings_retry: RetryPolicy,
    results_retry: RetryPolicy,
}

impl ErgastClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        standings_retry: RetryPolicy,
        results_retry: RetryPolicy,
    ) -> SourceResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            standings_retry,
            results_retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json?limit={}", self.base_url, path, PAGE_LIMIT)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> SourceResult<T> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        let resp = self.client.get(&url).send().await?.error_for_status()?;
        let env: Envelope<T> = resp.json().await?;
        Ok(env.mr_data)
    }

    async fn races(&self, path: &str) -> SourceResult<Vec<Race>> {
        let path = path.to_string();
        let data: RaceTableData = self
            .results_retry
            .run(&format!("results {}", path), || self.get(&path))
            .await?;
        Ok(data.race_table.races)
    }

    async fn total_rounds(&self) -> SourceResult<u32> {
        let data: RaceTableData = self
            .standings_retry
            .run("season calendar", || self.get("current"))
            .await?;
        let total = data
            .total
            .ok_or_else(|| SourceError::Decode("calendar response without total".into()))?;
        parse_num("total", &total)
    }

    async fn standings_list(&self, path: &'static str) -> SourceResult<(String, StandingsList)> {
        let data: StandingsData = self.standings_retry.run(path, || self.get(path)).await?;
        let season = data.standings_table.season;
        let list = data
            .standings_table
            .lists
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(format!("no {} yet", path)))?;
        Ok((season, list))
    }
}

#[async_trait]
impl ScheduleProvider for ErgastClient {
    async fn season_schedule(&self, season: i32) -> SourceResult<Vec<SessionSummary>> {
        let races = self.races(&season.to_string()).await?;
        races
            .iter()
            .filter(|r| !r.race_name.contains("Testing"))
            .map(summary_of)
            .collect()
    }
}

#[async_trait]
impl SessionProvider for ErgastClient {
    async fn session_results(
        &self,
        season: i32,
        round: u32,
        kind: SessionKind,
    ) -> SourceResult<SessionRecord> {
        let endpoint = match kind {
            SessionKind::Race => "results",
            SessionKind::Qualifying => "qualifying",
        };
        let races = self
            .races(&format!("{}/{}/{}", season, round, endpoint))
            .await?;
        let race = races
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(format!("{} {} round {}", endpoint, season, round)))?;

        let results = match kind {
            SessionKind::Race => race
                .results
                .iter()
                .map(race_record)
                .collect::<SourceResult<Vec<_>>>()?,
            SessionKind::Qualifying => race.qualifying.iter().map(qualifying_record).collect(),
        };
        if results.is_empty() {
            return Err(SourceError::NotFound(format!(
                "empty {} for {} round {}",
                endpoint, season, round
            )));
        }

        Ok(SessionRecord {
            event_name: race.race_name,
            round_number: round,
            season_year: season,
            date: parse_date(&race.date)?,
            results,
        })
    }
}

#[async_trait]
impl StandingsProvider for ErgastClient {
    async fn current_standings(&self) -> SourceResult<Standings> {
        let (season, drivers) = self.standings_list("current/driverStandings").await?;
        let (_, constructors) = self.standings_list("current/constructorStandings").await?;
        let total_rounds = self.total_rounds().await?;

        let drivers_out = drivers
            .drivers
            .iter()
            .map(|d| {
                Ok(DriverStanding {
                    driver: d.driver.full_name(),
                    team: d
                        .constructors
                        .first()
                        .map(|c| c.name.clone())
                        .unwrap_or_default(),
                    points: parse_num("points", &d.points)?,
                })
            })
            .collect::<SourceResult<Vec<_>>>()?;
        let constructors_out = constructors
            .constructors
            .iter()
            .map(|c| {
                Ok(ConstructorStanding {
                    team: c.constructor.name.clone(),
                    points: parse_num("points", &c.points)?,
                })
            })
            .collect::<SourceResult<Vec<_>>>()?;

        Ok(Standings {
            season,
            drivers: drivers_out,
            constructors: constructors_out,
            current_round: parse_num("round", &drivers.round)?,
            total_rounds,
        })
    }
}
