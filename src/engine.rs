//! The prediction pipeline: recent results, aggregation, fusion, scoring,
//! confidence and formatting, with optional sources degrading gracefully.

use anyhow::Context;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::championship::{self, ChampionshipOutlook};
use crate::confidence::{rank, ScoredCandidate};
use crate::config::{EngineConfig, ScoringMode};
use crate::error::PredictError;
use crate::features::{FeatureSchema, FusionInputs, FusionLayer, WeatherScaler};
use crate::formatter::{format, metadata};
use crate::last_race::{self, LastRaceSummary};
use crate::recent::{Clock, RecentResultsCache};
use crate::scoring::{Classifier, ScoringEngine};
use crate::sources::cached::CachedTelemetry;
use crate::sources::ergast::ErgastClient;
use crate::sources::news::{ArticleFeed, ArticleSentiment, RssFeed, VaderScorer};
use crate::sources::openf1::OpenF1Client;
use crate::sources::openmeteo::OpenMeteoClient;
use crate::sources::{
    ScheduleProvider, SentimentProvider, SessionProvider, StandingsProvider, TelemetryProvider,
    WeatherProvider,
};
use crate::stats::{aggregate, CompetitorTable};
use crate::types::{
    DriverSentiment, PerformanceMetrics, PredictionKind, PredictionResult, ResultWindow,
    WeatherFeatures,
};

pub struct PredictionEngine {
    results: RecentResultsCache,
    fusion: FusionLayer,
    race: ScoringEngine,
    qualifying: ScoringEngine,
    telemetry: Option<Arc<dyn TelemetryProvider>>,
    weather: Option<Arc<dyn WeatherProvider>>,
    sentiment: Option<Arc<dyn SentimentProvider>>,
    standings: Option<Arc<dyn StandingsProvider>>,
    fallback_adjustment: f64,
}

pub struct EngineBuilder {
    schedule: Arc<dyn ScheduleProvider>,
    sessions: Arc<dyn SessionProvider>,
    telemetry: Option<Arc<dyn TelemetryProvider>>,
    weather: Option<Arc<dyn WeatherProvider>>,
    sentiment: Option<Arc<dyn SentimentProvider>>,
    standings: Option<Arc<dyn StandingsProvider>>,
    window_size: usize,
    cache_ttl: Duration,
    max_concurrent_loads: usize,
    clock: Option<Clock>,
    fallback_adjustment: f64,
    scaler: Option<WeatherScaler>,
    race_classifier: Option<Arc<dyn Classifier>>,
    qualifying_classifier: Option<Arc<dyn Classifier>>,
}

impl EngineBuilder {
    pub fn telemetry(mut self, p: Arc<dyn TelemetryProvider>) -> Self {
        self.telemetry = Some(p);
        self
    }

    pub fn weather(mut self, p: Arc<dyn WeatherProvider>) -> Self {
        self.weather = Some(p);
        self
    }

    pub fn sentiment(mut self, p: Arc<dyn SentimentProvider>) -> Self {
        self.sentiment = Some(p);
        self
    }

    pub fn standings(mut self, p: Arc<dyn StandingsProvider>) -> Self {
        self.standings = Some(p);
        self
    }

    pub fn window_size(mut self, n: usize) -> Self {
        self.window_size = n;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn max_concurrent_loads(mut self, n: usize) -> Self {
        self.max_concurrent_loads = n;
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn fallback_adjustment(mut self, f: f64) -> Self {
        self.fallback_adjustment = f;
        self
    }

    pub fn weather_scaler(mut self, s: WeatherScaler) -> Self {
        self.scaler = Some(s);
        self
    }

    pub fn race_classifier(mut self, c: Arc<dyn Classifier>) -> Self {
        self.race_classifier = Some(c);
        self
    }

    pub fn qualifying_classifier(mut self, c: Arc<dyn Classifier>) -> Self {
        self.qualifying_classifier = Some(c);
        self
    }

    /// Fails with `ConfigurationMismatch` if a classifier was trained on a
    /// different feature layout.
    pub fn build(self) -> Result<PredictionEngine, PredictError> {
        let fusion = FusionLayer::new(self.scaler);
        let schema = fusion.schema().clone();
        let scorer = |kind, classifier: Option<Arc<dyn Classifier>>| match classifier {
            Some(c) => ScoringEngine::trained(kind, c, schema.clone()),
            None => Ok(ScoringEngine::heuristic(kind, schema.clone())),
        };
        let race = scorer(PredictionKind::RaceWinner, self.race_classifier)?;
        let qualifying = scorer(PredictionKind::Pole, self.qualifying_classifier)?;

        let mut results =
            RecentResultsCache::new(self.schedule, self.sessions, self.window_size, self.cache_ttl)
                .with_max_concurrent_loads(self.max_concurrent_loads);
        if let Some(clock) = self.clock {
            results = results.with_clock(clock);
        }

        Ok(PredictionEngine {
            results,
            fusion,
            race,
            qualifying,
            telemetry: self.telemetry,
            weather: self.weather,
            sentiment: self.sentiment,
            standings: self.standings,
            fallback_adjustment: self.fallback_adjustment,
        })
    }
}

/// Ranked candidates for one prediction kind with the inputs they came from.
pub struct ScoredRound {
    pub window: Arc<ResultWindow>,
    pub stats: CompetitorTable,
    /// Descending score, confidences attached.
    pub ranked: Vec<ScoredCandidate>,
    /// Optional sources that failed for this request.
    pub degraded: Vec<String>,
}

/// Outcome of one optional source: `Err` marks it degraded.
type Optional<T> = Result<Option<T>, PredictError>;

impl PredictionEngine {
    pub fn builder(
        schedule: Arc<dyn ScheduleProvider>,
        sessions: Arc<dyn SessionProvider>,
    ) -> EngineBuilder {
        let defaults = EngineConfig::default();
        EngineBuilder {
            schedule,
            sessions,
            telemetry: None,
            weather: None,
            sentiment: None,
            standings: None,
            window_size: defaults.window_size,
            cache_ttl: defaults.cache_ttl(),
            max_concurrent_loads: defaults.max_concurrent_loads,
            clock: None,
            fallback_adjustment: defaults.fallback_confidence_adjustment,
            scaler: None,
            race_classifier: None,
            qualifying_classifier: None,
        }
    }

    /// Wires the HTTP-backed collaborators and scoring models described by `cfg`.
    pub fn from_config(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let src = &cfg.sources;
        let timeout = Duration::from_secs(src.http_timeout_secs);

        let ergast = Arc::new(ErgastClient::new(
            &src.results_base_url,
            timeout,
            src.standings_retry.policy(),
            src.results_retry.policy(),
        )?);
        let weather = Arc::new(OpenMeteoClient::new(
            &src.weather_forecast_url,
            &src.weather_archive_url,
            timeout,
            src.weather_retry.policy(),
        )?);

        let mut builder = PredictionEngine::builder(ergast.clone(), ergast.clone())
            .standings(ergast)
            .weather(weather)
            .window_size(cfg.window_size)
            .cache_ttl(cfg.cache_ttl())
            .max_concurrent_loads(cfg.max_concurrent_loads)
            .fallback_adjustment(cfg.fallback_confidence_adjustment);

        if let Some(url) = &src.telemetry_base_url {
            let client = OpenF1Client::new(url, timeout, src.telemetry_retry.policy())?;
            builder = builder.telemetry(Arc::new(CachedTelemetry::new(
                Arc::new(client),
                cfg.cache_ttl(),
            )));
        }
        if !src.news_feeds.is_empty() {
            let feeds = src
                .news_feeds
                .iter()
                .map(|url| Ok(Arc::new(RssFeed::new(url, timeout)?) as Arc<dyn ArticleFeed>))
                .collect::<anyhow::Result<Vec<_>>>()?;
            builder = builder.sentiment(Arc::new(ArticleSentiment::new(
                feeds,
                Box::new(VaderScorer::default()),
                cfg.sentiment_ttl(),
            )));
        }

        let scaled = cfg.weather_scaler_path.is_some();
        if let Some(path) = &cfg.weather_scaler_path {
            builder = builder.weather_scaler(WeatherScaler::load(path)?);
        }
        let schema = FeatureSchema::standard(scaled);
        if let Some(c) = load_classifier(&cfg.race_scoring, &schema)? {
            builder = builder.race_classifier(c);
        }
        if let Some(c) = load_classifier(&cfg.qualifying_scoring, &schema)? {
            builder = builder.qualifying_classifier(c);
        }

        builder.build().context("scoring model does not match the feature schema")
    }

    pub fn results(&self) -> &RecentResultsCache {
        &self.results
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.fusion.schema()
    }

    /// `Ok(None)` when no prediction is possible.
    pub async fn predict_race(&self) -> Result<Option<PredictionResult>, PredictError> {
        self.predict(PredictionKind::RaceWinner).await
    }

    /// `Ok(None)` when no prediction is possible.
    pub async fn predict_qualifying(&self) -> Result<Option<PredictionResult>, PredictError> {
        self.predict(PredictionKind::Pole).await
    }

    async fn window(&self) -> Result<Option<Arc<ResultWindow>>, PredictError> {
        match self.results.window().await {
            Ok(w) if w.is_empty() => {
                tracing::info!("no completed sessions in {} or the season before", w.season_used);
                Ok(None)
            }
            Ok(w) => Ok(Some(w)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!("recent results unavailable: {}", e);
                Ok(None)
            }
        }
    }

    /// The full ranking behind a prediction, before formatting.
    pub async fn scored_candidates(&self, kind: PredictionKind) -> Result<Option<ScoredRound>, PredictError> {
        let Some(window) = self.window().await? else {
            return Ok(None);
        };
        let stats = aggregate(&window);

        let (telemetry, weather, sentiment) = tokio::join!(
            self.fetch_telemetry(&window),
            self.fetch_weather(&window),
            self.fetch_sentiment(&stats),
        );
        let mut degraded = Vec::new();
        let telemetry = absorb("telemetry", telemetry, &mut degraded);
        let weather = absorb("weather", weather, &mut degraded);
        let sentiment = absorb("sentiment", sentiment, &mut degraded);

        let fused = self.fusion.fuse(
            &stats,
            FusionInputs {
                telemetry: telemetry.as_ref(),
                weather: weather.as_ref(),
                sentiment: sentiment.as_ref(),
            },
        );

        let scorer = match kind {
            PredictionKind::RaceWinner => &self.race,
            PredictionKind::Pole => &self.qualifying,
        };
        let scores = scorer.score(&fused)?;

        let candidates = fused
            .into_iter()
            .zip(scores)
            .map(|((id, features), score)| ScoredCandidate {
                team: stats.get(&id).map(|s| s.team.clone()).unwrap_or_default(),
                competitor_id: id,
                score,
                confidence: 0,
                features,
            })
            .collect();

        Ok(Some(ScoredRound {
            ranked: rank(candidates),
            window,
            stats,
            degraded,
        }))
    }

    async fn predict(&self, kind: PredictionKind) -> Result<Option<PredictionResult>, PredictError> {
        let Some(round) = self.scored_candidates(kind).await? else {
            return Ok(None);
        };
        let window = &round.window;
        let result = format(
            kind,
            &round.ranked,
            &round.stats,
            metadata(window, self.fallback_adjustment, round.degraded.clone()),
        );
        if let Some(p) = &result {
            tracing::info!(
                "{:?} prediction: {} ({}%) from {} sessions of {}{}",
                kind,
                p.winner_id,
                p.confidence,
                window.sessions.len(),
                window.season_used,
                if window.using_fallback_season { ", fallback season" } else { "" }
            );
        }
        Ok(result)
    }

    /// Most recent race of the current window.
    async fn fetch_telemetry(&self, window: &ResultWindow) -> Optional<HashMap<String, PerformanceMetrics>> {
        let (Some(provider), Some(latest)) = (&self.telemetry, window.latest()) else {
            return Ok(None);
        };
        provider
            .performance_metrics(latest.season_year, latest.round_number, latest.date)
            .await
            .map(Some)
            .map_err(|e| PredictError::unavailable("telemetry", e))
    }

    /// Forecast for the next round on the calendar, if there is one.
    async fn fetch_weather(&self, window: &ResultWindow) -> Optional<WeatherFeatures> {
        let Some(provider) = &self.weather else {
            return Ok(None);
        };
        let Some((circuit, date)) = window
            .upcoming
            .as_ref()
            .and_then(|s| s.circuit.as_ref().map(|c| (c, s.date)))
        else {
            return Ok(None);
        };
        provider
            .forecast_or_historical(circuit, date)
            .await
            .map_err(|e| PredictError::unavailable("weather", e))
    }

    /// Partial answers are kept; the source is degraded only when every
    /// answer was a failure.
    async fn fetch_sentiment(&self, stats: &CompetitorTable) -> Optional<HashMap<String, DriverSentiment>> {
        let Some(provider) = &self.sentiment else {
            return Ok(None);
        };
        let lookups = join_all(stats.iter().map(|s| async move {
            (
                s.competitor_id.clone(),
                provider.driver_sentiment(&s.competitor_name).await,
            )
        }))
        .await;

        let mut found = HashMap::new();
        let mut failure = None;
        for (id, result) in lookups {
            match result {
                Ok(Some(sent)) => {
                    found.insert(id, sent);
                }
                Ok(None) => {}
                Err(e) => failure = Some(e),
            }
        }
        match failure {
            Some(e) if found.is_empty() => Err(PredictError::unavailable("sentiment", e)),
            Some(e) => {
                tracing::warn!("sentiment partially unavailable: {}", e);
                Ok(Some(found))
            }
            None => Ok(Some(found)),
        }
    }

    pub async fn last_race(&self) -> Result<Option<LastRaceSummary>, PredictError> {
        Ok(self
            .window()
            .await?
            .and_then(|w| w.latest().map(last_race::summarize)))
    }

    /// `no_data` when the standings source is missing or keeps failing.
    pub async fn championship(&self) -> ChampionshipOutlook {
        let Some(provider) = &self.standings else {
            return ChampionshipOutlook::no_data();
        };
        match provider.current_standings().await {
            Ok(s) => championship::outlook(&s),
            Err(e) => {
                tracing::warn!("standings unavailable: {}", e);
                ChampionshipOutlook::no_data()
            }
        }
    }

    pub async fn driver_sentiment(&self, name: &str) -> Result<Option<DriverSentiment>, PredictError> {
        let Some(provider) = &self.sentiment else {
            return Err(PredictError::unavailable("sentiment", "no news feeds configured"));
        };
        provider
            .driver_sentiment(name)
            .await
            .map_err(|e| PredictError::unavailable("sentiment", e))
    }
}

fn absorb<T>(name: &str, fetched: Optional<T>, degraded: &mut Vec<String>) -> Option<T> {
    match fetched {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("{} degraded: {}", name, e);
            degraded.push(name.to_string());
            None
        }
    }
}

#[cfg(feature = "torch")]
fn load_classifier(mode: &ScoringMode, schema: &FeatureSchema) -> anyhow::Result<Option<Arc<dyn Classifier>>> {
    match mode {
        ScoringMode::Heuristic => Ok(None),
        ScoringMode::Trained { model_path, meta_path } => {
            let model = crate::model::TorchClassifier::load(model_path, meta_path, schema)?;
            Ok(Some(Arc::new(model)))
        }
    }
}

#[cfg(not(feature = "torch"))]
fn load_classifier(mode: &ScoringMode, schema: &FeatureSchema) -> anyhow::Result<Option<Arc<dyn Classifier>>> {
    match mode {
        ScoringMode::Heuristic => Ok(None),
        ScoringMode::Trained { meta_path, .. } => {
            // still validate the layout so a bad deployment is caught early
            crate::model::ModelMeta::load(meta_path)?.check(schema)?;
            anyhow::bail!("trained scoring needs a build with the `torch` feature")
        }
    }
}
