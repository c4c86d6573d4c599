use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

use crate::retry::RetryPolicy;

/// RSS/Atom feeds read for driver sentiment when none are configured.
pub const DEFAULT_NEWS_FEEDS: &[&str] = &[
    "https://www.formula1.com/content/fom-website/en/latest/all.xml",
    "https://www.autosport.com/rss/f1/news/",
    "https://www.motorsport.com/rss/f1/news/",
    "https://www.bbc.co.uk/sport/formula1/rss.xml",
    "https://www.theguardian.com/sport/formulaone/rss",
    "https://www.racefans.net/feed/",
    "https://www.crash.net/rss/f1",
    "https://www.gpblog.com/en/rss",
    "https://racingnews365.com/feed/news.xml",
    "https://f1i.com/feed",
    "https://www.thecheckeredflag.co.uk/feed/",
    "https://wtf1.com/feed",
    "https://feeds.feedburner.com/totalf1-recent",
    "https://www.newsonf1.com/feed",
    "https://www.grandprix.com/rss.xml",
];

/// How one prediction kind turns features into scores.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScoringMode {
    #[default]
    Heuristic,
    Trained { model_path: String, meta_path: String },
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Single attempt, fail fast.
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::once()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub results_base_url: String,
    pub weather_forecast_url: String,
    pub weather_archive_url: String,
    pub telemetry_base_url: Option<String>,
    pub news_feeds: Vec<String>,
    pub http_timeout_secs: u64,
    pub standings_retry: RetryConfig,
    pub results_retry: RetryConfig,
    pub weather_retry: RetryConfig,
    pub telemetry_retry: RetryConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            results_base_url: "https://api.jolpi.ca/ergast/f1".to_string(),
            weather_forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            weather_archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            telemetry_base_url: None,
            news_feeds: DEFAULT_NEWS_FEEDS.iter().map(|u| u.to_string()).collect(),
            http_timeout_secs: 10,
            standings_retry: RetryConfig {
                max_attempts: 5,
                base_delay_ms: 200,
                max_delay_ms: 3_200,
            },
            results_retry: RetryConfig::once(),
            weather_retry: RetryConfig::once(),
            telemetry_retry: RetryConfig::once(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub port: u16,
    pub window_size: usize,
    pub cache_ttl_secs: u64,
    pub max_concurrent_loads: usize,
    pub fallback_confidence_adjustment: f64,
    pub race_scoring: ScoringMode,
    pub qualifying_scoring: ScoringMode,
    pub weather_scaler_path: Option<String>,
    pub sentiment_ttl_secs: u64,
    pub sources: SourceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            window_size: 5,
            cache_ttl_secs: 3_600,
            max_concurrent_loads: 4,
            fallback_confidence_adjustment: 0.7,
            race_scoring: ScoringMode::Heuristic,
            qualifying_scoring: ScoringMode::Heuristic,
            weather_scaler_path: None,
            sentiment_ttl_secs: 3_600,
            sources: SourceConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("config file not found at {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid config JSON in {}", path.display()))
    }

    /// File named by `PODIUM_CONFIG` (or defaults), then `PORT`, `MODEL_PATH`
    /// and `META_PATH` from the environment.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var("PODIUM_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };

        if let Some(port) = std::env::var("PORT").ok().and_then(|s| s.parse().ok()) {
            cfg.port = port;
        }
        if let (Ok(model_path), Ok(meta_path)) =
            (std::env::var("MODEL_PATH"), std::env::var("META_PATH"))
        {
            cfg.race_scoring = ScoringMode::Trained {
                model_path,
                meta_path,
            };
        }
        Ok(cfg)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sentiment_ttl(&self) -> Duration {
        Duration::from_secs(self.sentiment_ttl_secs)
    }
}
