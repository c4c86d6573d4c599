//! Per-round memo of telemetry metrics.
//!
//! Reducing a race's telemetry means one request per car, so the result of
//! each (season, round) is kept in its own [`TtlCache`] and shared by every
//! prediction that asks for it.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{SourceResult, TelemetryProvider};
use crate::cache::TtlCache;
use crate::types::PerformanceMetrics;

type Metrics = HashMap<String, PerformanceMetrics>;

pub struct CachedTelemetry {
    inner: Arc<dyn TelemetryProvider>,
    ttl: Duration,
    rounds: Mutex<HashMap<(i32, u32), Arc<TtlCache<Metrics>>>>,
}

impl CachedTelemetry {
    pub fn new(inner: Arc<dyn TelemetryProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            rounds: Mutex::new(HashMap::new()),
        }
    }

    fn round_cache(&self, season: i32, round: u32) -> Arc<TtlCache<Metrics>> {
        self.rounds
            .lock()
            .entry((season, round))
            .or_insert_with(|| Arc::new(TtlCache::new(self.ttl)))
            .clone()
    }
}

#[async_trait]
impl TelemetryProvider for CachedTelemetry {
    async fn performance_metrics(
        &self,
        season: i32,
        round: u32,
        date: NaiveDate,
    ) -> SourceResult<Metrics> {
        let cache = self.round_cache(season, round);
        let what = format!("telemetry {} round {}", season, round);
        let metrics = cache
            .get_or_refresh(&what, || self.inner.performance_metrics(season, round, date))
            .await?;
        Ok(metrics.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTelemetry {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TelemetryProvider for CountingTelemetry {
        async fn performance_metrics(
            &self,
            _season: i32,
            round: u32,
            _date: NaiveDate,
        ) -> SourceResult<Metrics> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SourceError::Other("openf1 down".into()));
            }
            Ok([(
                round.to_string(),
                PerformanceMetrics {
                    top_speed: 330.0,
                    acceleration_score: 1.5,
                    tyre_consistency: None,
                },
            )]
            .into_iter()
            .collect())
        }
    }

    fn race_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 7).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn one_fetch_per_round_within_ttl() {
        let inner = Arc::new(CountingTelemetry {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cached = CachedTelemetry::new(inner.clone(), Duration::from_secs(3_600));

        for _ in 0..3 {
            let m = cached.performance_metrics(2025, 16, race_day()).await.unwrap();
            assert!(m.contains_key("16"));
        }
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.performance_metrics(2025, 15, race_day()).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(3_601)).await;
        cached.performance_metrics(2025, 16, race_day()).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrent_requests_share_the_fetch() {
        let inner = Arc::new(CountingTelemetry {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cached = CachedTelemetry::new(inner.clone(), Duration::from_secs(3_600));
        let (a, b) = tokio::join!(
            cached.performance_metrics(2025, 16, race_day()),
            cached.performance_metrics(2025, 16, race_day())
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_without_snapshot_propagates() {
        let inner = Arc::new(CountingTelemetry {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cached = CachedTelemetry::new(inner, Duration::from_secs(60));
        assert!(cached.performance_metrics(2025, 16, race_day()).await.is_err());
    }
}
