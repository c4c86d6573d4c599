use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use podium::championship::ChampionshipOutlook;
use podium::last_race::LastRaceSummary;
use podium::types::DriverSentiment;
use podium::{EngineConfig, PredictError, PredictionEngine, PredictionResult};

type ApiError = (StatusCode, Json<Value>);

// ---------- Server state ----------

#[derive(Clone)]
struct AppState {
    engine: Arc<PredictionEngine>,
}

// ---------- Error mapping ----------

fn unavailable(what: &str) -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": format!("{} unavailable", what) })),
    )
}

fn internal(e: PredictError) -> ApiError {
    tracing::error!("request aborted: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

fn answer<T>(what: &str, r: Result<Option<T>, PredictError>) -> Result<Json<T>, ApiError> {
    match r {
        Ok(Some(v)) => Ok(Json(v)),
        Ok(None) => Err(unavailable(what)),
        Err(e) => Err(internal(e)),
    }
}

// ---------- Handlers ----------

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn race(State(state): State<AppState>) -> Result<Json<PredictionResult>, ApiError> {
    answer("race prediction", state.engine.predict_race().await)
}

async fn qualifying(State(state): State<AppState>) -> Result<Json<PredictionResult>, ApiError> {
    answer("qualifying prediction", state.engine.predict_qualifying().await)
}

async fn both(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (race, quali) = tokio::join!(
        state.engine.predict_race(),
        state.engine.predict_qualifying()
    );
    let race = race.map_err(internal)?;
    let quali = quali.map_err(internal)?;
    if race.is_none() && quali.is_none() {
        return Err(unavailable("prediction"));
    }
    Ok(Json(json!({ "race": race, "qualifying": quali })))
}

async fn last_race(State(state): State<AppState>) -> Result<Json<LastRaceSummary>, ApiError> {
    answer("last race", state.engine.last_race().await)
}

async fn championship(State(state): State<AppState>) -> Json<ChampionshipOutlook> {
    Json(state.engine.championship().await)
}

async fn sentiment(
    State(state): State<AppState>,
    Path(driver): Path<String>,
) -> Result<Json<DriverSentiment>, ApiError> {
    match state.engine.driver_sentiment(&driver).await {
        Ok(Some(s)) => Ok(Json(s)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no articles mention {}", driver) })),
        )),
        Err(e) => {
            tracing::warn!("{}", e);
            Err(unavailable("sentiment"))
        }
    }
}

fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/api/prediction", get(both))
        .route("/api/prediction/race", get(race))
        .route("/api/prediction/qualifying", get(qualifying))
        .route("/api/last-race", get(last_race))
        .route("/api/championship", get(championship))
        .route("/api/driver-sentiment/:driver", get(sentiment))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = EngineConfig::from_env()?;
    let engine = PredictionEngine::from_config(&cfg)?;
    tracing::info!(
        "engine ready; window={} ttl={}s schema v{} [{} fields]",
        cfg.window_size,
        cfg.cache_ttl_secs,
        engine.schema().version(),
        engine.schema().len()
    );

    let app = router(AppState {
        engine: Arc::new(engine),
    });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use podium::sources::{ScheduleProvider, SentimentProvider, SessionProvider, SourceResult};
    use podium::types::{SessionKind, SessionRecord, SessionSummary};
    use podium::SourceError;

    struct EmptyCalendar;

    #[async_trait]
    impl ScheduleProvider for EmptyCalendar {
        async fn season_schedule(&self, _season: i32) -> SourceResult<Vec<SessionSummary>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl SessionProvider for EmptyCalendar {
        async fn session_results(
            &self,
            season: i32,
            round: u32,
            _kind: SessionKind,
        ) -> SourceResult<SessionRecord> {
            Err(SourceError::NotFound(format!("{} round {}", season, round)))
        }
    }

    struct OnlyVerstappen;

    #[async_trait]
    impl SentimentProvider for OnlyVerstappen {
        async fn driver_sentiment(&self, name: &str) -> SourceResult<Option<DriverSentiment>> {
            Ok((name == "Max Verstappen").then(|| DriverSentiment {
                average_sentiment: 0.3,
                article_count: 2,
                ..Default::default()
            }))
        }
    }

    async fn serve() -> String {
        let calendar = Arc::new(EmptyCalendar);
        let engine = PredictionEngine::builder(calendar.clone(), calendar)
            .clock(Arc::new(|| NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()))
            .sentiment(Arc::new(OnlyVerstappen))
            .build()
            .unwrap();
        let app = router(AppState {
            engine: Arc::new(engine),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn driver_sentiment_route() {
        let base = serve().await;

        let resp = reqwest::get(format!("{}/api/driver-sentiment/Max%20Verstappen", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["article_count"], 2);

        let missing = reqwest::get(format!("{}/api/driver-sentiment/Lando%20Norris", base))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let old = reqwest::get(format!("{}/api/sentiment/Max%20Verstappen", base))
            .await
            .unwrap();
        assert_eq!(old.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn prediction_without_sessions_is_unavailable() {
        let base = serve().await;
        let resp = reqwest::get(format!("{}/api/prediction/race", base)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
