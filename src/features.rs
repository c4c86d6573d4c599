//! Feature fusion: statistics, telemetry, weather and sentiment merged into
//! one feature map per competitor, plus the versioned schema that fixes the
//! vector layout a trained model consumes.
//!
//! Absent optional features are omitted from a [`FeatureMap`]; defaults are
//! only filled in by [`FeatureSchema::vectorize`]. Weather is race-wide and
//! broadcast to every competitor under the `weather_` prefix. Telemetry and
//! sentiment are per competitor and never zero-filled in the map.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::{fs, path::Path};

use crate::error::PredictError;
use crate::stats::{CompetitorStats, CompetitorTable};
use crate::types::{DriverSentiment, PerformanceMetrics, WeatherFeatures};
use crate::weather;

pub const SCHEMA_VERSION: u32 = 1;
pub const WEATHER_PREFIX: &str = "weather_";

/// Defaults for averages of a competitor with no data: back of the field.
const NO_POSITION: f64 = 20.0;

const STAT_FIELDS: &[(&str, f64)] = &[
    ("points_total", 0.0),
    ("wins", 0.0),
    ("podiums", 0.0),
    ("dnfs", 0.0),
    ("dnf_rate", 0.0),
    ("avg_grid", NO_POSITION),
    ("avg_finish", NO_POSITION),
    ("poles", 0.0),
    ("front_row_starts", 0.0),
    ("races", 0.0),
];

const TELEMETRY_FIELDS: &[&str] = &["top_speed", "acceleration_score", "tyre_consistency"];

const WEATHER_FIELDS: &[&str] = &[
    "mean_temp",
    "max_temp",
    "min_temp",
    "temp_range",
    "mean_humidity",
    "max_humidity",
    "mean_pressure",
    "pressure_change",
    "mean_wind_speed",
    "max_wind_speed",
    "wind_dir_sin",
    "wind_dir_cos",
    "total_rainfall",
    "max_rainfall",
    "rainy_condition",
    "wet_track",
    "weather_condition",
];

const SENTIMENT_FIELDS: &[&str] = &["sentiment_average", "sentiment_articles"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Stats,
    Telemetry,
    Weather,
    Sentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub group: FieldGroup,
    pub default: f64,
}

/// Ordered, named model inputs with explicit defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSchema {
    version: u32,
    fields: Vec<FieldSpec>,
}

impl FeatureSchema {
    /// The full layout; weather defaults are the neutral race day, or the
    /// standardized mean (0) when weather is scaled.
    pub fn standard(scaled_weather: bool) -> Self {
        let neutral = weather::default_features();
        let mut fields = Vec::new();
        for (name, default) in STAT_FIELDS {
            fields.push(FieldSpec {
                name: name.to_string(),
                group: FieldGroup::Stats,
                default: *default,
            });
        }
        for name in TELEMETRY_FIELDS {
            fields.push(FieldSpec {
                name: name.to_string(),
                group: FieldGroup::Telemetry,
                default: 0.0,
            });
        }
        for name in WEATHER_FIELDS {
            let default = if scaled_weather {
                0.0
            } else {
                neutral.get(*name).copied().unwrap_or(0.0)
            };
            fields.push(FieldSpec {
                name: format!("{}{}", WEATHER_PREFIX, name),
                group: FieldGroup::Weather,
                default,
            });
        }
        for name in SENTIMENT_FIELDS {
            fields.push(FieldSpec {
                name: name.to_string(),
                group: FieldGroup::Sentiment,
                default: 0.0,
            });
        }
        Self {
            version: SCHEMA_VERSION,
            fields,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fails unless `names` is exactly this schema's field list, in order.
    pub fn check_names(&self, names: &[String]) -> Result<(), PredictError> {
        let ours = self.names();
        if ours.len() == names.len() && ours.iter().zip(names).all(|(a, b)| *a == b.as_str()) {
            return Ok(());
        }
        let first_diff = ours
            .iter()
            .zip(names)
            .position(|(a, b)| *a != b.as_str())
            .unwrap_or(ours.len().min(names.len()));
        Err(PredictError::ConfigurationMismatch {
            expected: format!(
                "{} fields (schema v{}), first differing at index {}: {:?}",
                ours.len(),
                self.version,
                first_diff,
                ours.get(first_diff)
            ),
            actual: format!("{} fields: {:?}", names.len(), names.get(first_diff)),
        })
    }

    /// Values in schema order, defaults for absent fields.
    pub fn vectorize(&self, map: &FeatureMap) -> Vec<f32> {
        self.fields
            .iter()
            .map(|f| map.get(&f.name).unwrap_or(f.default) as f32)
            .collect()
    }
}

/// Named features of one competitor. Non-finite values are never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureMap(BTreeMap<String, f64>);

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        if value.is_finite() {
            self.0.insert(name.into(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-field mean and scale fitted on training data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherScaler {
    mean: HashMap<String, f64>,
    scale: HashMap<String, f64>,
}

impl WeatherScaler {
    pub fn new(mean: HashMap<String, f64>, scale: HashMap<String, f64>) -> Self {
        Self { mean, scale }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read weather scaler at {}", path.display()))?;
        serde_json::from_str(&txt).with_context(|| "failed to parse weather scaler")
    }

    /// Standardizes fields with stored statistics; other fields pass through.
    pub fn transform(&self, raw: &WeatherFeatures) -> WeatherFeatures {
        raw.iter()
            .map(|(k, v)| {
                let scaled = match self.mean.get(k) {
                    Some(m) => {
                        let s = self.scale.get(k).copied().unwrap_or(1.0);
                        let s = if s == 0.0 { 1.0 } else { s };
                        (v - m) / s
                    }
                    None => *v,
                };
                (k.clone(), scaled)
            })
            .collect()
    }
}

/// Optional per-request inputs; `None` means the source did not respond.
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionInputs<'a> {
    /// Keyed by competitor id or car number.
    pub telemetry: Option<&'a HashMap<String, PerformanceMetrics>>,
    pub weather: Option<&'a WeatherFeatures>,
    /// Keyed by competitor id.
    pub sentiment: Option<&'a HashMap<String, DriverSentiment>>,
}

pub struct FusionLayer {
    scaler: Option<WeatherScaler>,
    schema: FeatureSchema,
}

impl FusionLayer {
    pub fn new(scaler: Option<WeatherScaler>) -> Self {
        let schema = FeatureSchema::standard(scaler.is_some());
        Self { scaler, schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// One feature map per competitor, in the table's order.
    pub fn fuse(&self, stats: &CompetitorTable, inputs: FusionInputs<'_>) -> Vec<(String, FeatureMap)> {
        let weather = inputs.weather.map(|w| match &self.scaler {
            Some(s) => s.transform(w),
            None => w.clone(),
        });

        stats
            .iter()
            .map(|s| {
                let mut map = base_features(s);
                if let Some(m) = inputs.telemetry.and_then(|t| telemetry_for(t, s)) {
                    map.insert("top_speed", m.top_speed);
                    map.insert("acceleration_score", m.acceleration_score);
                    if let Some(c) = m.tyre_consistency {
                        map.insert("tyre_consistency", c);
                    }
                }
                if let Some(w) = &weather {
                    for (k, v) in w {
                        map.insert(format!("{}{}", WEATHER_PREFIX, k), *v);
                    }
                }
                if let Some(sent) = inputs.sentiment.and_then(|m| m.get(&s.competitor_id)) {
                    map.insert("sentiment_average", sent.average_sentiment);
                    map.insert("sentiment_articles", sent.article_count as f64);
                }
                (s.competitor_id.clone(), map)
            })
            .collect()
    }
}

/// Averages are omitted when the competitor has no data for them.
pub fn base_features(s: &CompetitorStats) -> FeatureMap {
    let mut map = FeatureMap::new();
    map.insert("points_total", s.points_total);
    map.insert("wins", s.wins as f64);
    map.insert("podiums", s.podiums as f64);
    map.insert("dnfs", s.dnfs as f64);
    map.insert("dnf_rate", s.dnf_rate());
    if let Some(g) = s.avg_grid() {
        map.insert("avg_grid", g);
    }
    if let Some(f) = s.avg_finish() {
        map.insert("avg_finish", f);
    }
    map.insert("poles", s.poles as f64);
    map.insert("front_row_starts", s.front_row_starts as f64);
    map.insert("races", s.races as f64);
    map
}

fn telemetry_for<'a>(
    telemetry: &'a HashMap<String, PerformanceMetrics>,
    s: &CompetitorStats,
) -> Option<&'a PerformanceMetrics> {
    telemetry.get(&s.competitor_id).or_else(|| {
        s.car_number
            .and_then(|n| telemetry.get(&n.to_string()))
    })
}

/// One-line digest of a vector for debug logging.
pub fn summarize_vector(schema: &FeatureSchema, v: &[f32]) -> String {
    let nz = v.iter().filter(|x| **x != 0.0).count();
    let sample: Vec<String> = schema
        .fields()
        .iter()
        .zip(v)
        .take(6)
        .map(|(f, x)| format!("{}={:.3}", f.name, x))
        .collect();
    format!("in_dim={} nonzero={} sample=[{}]", v.len(), nz, sample.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::aggregate;
    use crate::types::{ResultRecord, ResultWindow, SessionRecord, SentimentDistribution};
    use chrono::NaiveDate;

    fn table() -> CompetitorTable {
        let rec = |id: &str, car: u32, finish: u32| ResultRecord {
            competitor_id: id.into(),
            competitor_name: id.into(),
            team: "T".into(),
            car_number: Some(car),
            finish_position: Some(finish),
            start_position: Some(finish),
            points: 10.0,
            status: "Finished".into(),
        };
        aggregate(&ResultWindow {
            sessions: vec![SessionRecord {
                event_name: "GP".into(),
                round_number: 1,
                season_year: 2025,
                date: NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
                results: vec![rec("ver", 1, 1), rec("ham", 44, 2), rec("alo", 14, 3)],
            }],
            ..ResultWindow::empty(2025)
        })
    }

    fn metrics(top: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            top_speed: top,
            acceleration_score: 3.0,
            tyre_consistency: None,
        }
    }

    #[test]
    fn telemetry_joins_by_id_then_car_number() {
        let telemetry: HashMap<String, PerformanceMetrics> =
            [("ver".to_string(), metrics(330.0)), ("44".to_string(), metrics(325.0))]
                .into_iter()
                .collect();
        let fused = FusionLayer::new(None).fuse(
            &table(),
            FusionInputs {
                telemetry: Some(&telemetry),
                ..Default::default()
            },
        );
        assert_eq!(fused[0].1.get("top_speed"), Some(330.0));
        assert_eq!(fused[1].1.get("top_speed"), Some(325.0));
        // absent competitor gets no telemetry keys at all
        assert!(!fused[2].1.contains("top_speed"));
        assert!(!fused[2].1.contains("acceleration_score"));
        assert!(!fused[0].1.contains("tyre_consistency"));
    }

    #[test]
    fn weather_is_broadcast_with_prefix() {
        let weather: WeatherFeatures = [("mean_temp".to_string(), 28.0), ("wet_track".to_string(), 0.0)]
            .into_iter()
            .collect();
        let fused = FusionLayer::new(None).fuse(
            &table(),
            FusionInputs {
                weather: Some(&weather),
                ..Default::default()
            },
        );
        for (_, map) in &fused {
            assert_eq!(map.get("weather_mean_temp"), Some(28.0));
            assert_eq!(map.get("weather_wet_track"), Some(0.0));
        }
    }

    #[test]
    fn scaler_standardizes_weather() {
        let scaler = WeatherScaler::new(
            [("mean_temp".to_string(), 20.0), ("wet_track".to_string(), 0.5)].into(),
            [("mean_temp".to_string(), 4.0), ("wet_track".to_string(), 0.0)].into(),
        );
        let weather: WeatherFeatures = [
            ("mean_temp".to_string(), 28.0),
            ("wet_track".to_string(), 1.0),
            ("max_temp".to_string(), 30.0),
        ]
        .into_iter()
        .collect();
        let layer = FusionLayer::new(Some(scaler));
        let fused = layer.fuse(
            &table(),
            FusionInputs {
                weather: Some(&weather),
                ..Default::default()
            },
        );
        let map = &fused[0].1;
        assert_eq!(map.get("weather_mean_temp"), Some(2.0));
        // zero scale treated as one
        assert_eq!(map.get("weather_wet_track"), Some(0.5));
        assert_eq!(map.get("weather_max_temp"), Some(30.0));
        assert!(layer
            .schema()
            .fields()
            .iter()
            .filter(|f| f.group == FieldGroup::Weather)
            .all(|f| f.default == 0.0));
    }

    #[test]
    fn sentiment_is_per_competitor() {
        let sentiment: HashMap<String, DriverSentiment> = [(
            "ham".to_string(),
            DriverSentiment {
                average_sentiment: 0.4,
                distribution: SentimentDistribution {
                    positive: 1.0,
                    neutral: 0.0,
                    negative: 0.0,
                },
                article_count: 3,
                ..Default::default()
            },
        )]
        .into_iter()
        .collect();
        let fused = FusionLayer::new(None).fuse(
            &table(),
            FusionInputs {
                sentiment: Some(&sentiment),
                ..Default::default()
            },
        );
        assert!(!fused[0].1.contains("sentiment_average"));
        assert_eq!(fused[1].1.get("sentiment_articles"), Some(3.0));
    }

    #[test]
    fn vectorize_fills_defaults_in_schema_order() {
        let schema = FeatureSchema::standard(false);
        let mut map = FeatureMap::new();
        map.insert("wins", 2.0);
        map.insert("top_speed", f64::NAN);
        let v = schema.vectorize(&map);
        assert_eq!(v.len(), schema.len());
        let names = schema.names();
        let at = |n: &str| v[names.iter().position(|x| *x == n).unwrap()];
        assert_eq!(at("wins"), 2.0);
        assert_eq!(at("avg_finish"), 20.0);
        assert_eq!(at("top_speed"), 0.0);
        assert_eq!(at("weather_mean_temp"), 22.0);
        assert_eq!(at("weather_wind_dir_cos"), 1.0);
    }

    #[test]
    fn schema_check_rejects_reordering() {
        let schema = FeatureSchema::standard(false);
        let mut names: Vec<String> = schema.names().iter().map(|s| s.to_string()).collect();
        assert!(schema.check_names(&names).is_ok());

        names.swap(0, 1);
        assert!(matches!(
            schema.check_names(&names),
            Err(PredictError::ConfigurationMismatch { .. })
        ));
        names.swap(0, 1);
        names.pop();
        assert!(schema.check_names(&names).is_err());
    }
}
