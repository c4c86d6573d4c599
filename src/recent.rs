//! Time-windowed cache of the most recent completed race sessions.
//!
//! The window holds the last `window_size` completed rounds of the current
//! season. Before the first round of a season has run, the entire previous
//! season is served instead and the window is flagged as a fallback.

use chrono::{Datelike, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::error::PredictError;
use crate::sources::{ScheduleProvider, SessionProvider};
use crate::types::{ResultWindow, SessionKind, SessionRecord, SessionSummary};

/// Today's date; injectable so season boundaries can be tested.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub struct RecentResultsCache {
    schedule: Arc<dyn ScheduleProvider>,
    sessions: Arc<dyn SessionProvider>,
    window_size: usize,
    max_concurrent_loads: usize,
    clock: Clock,
    snapshot: TtlCache<ResultWindow>,
}

impl RecentResultsCache {
    pub fn new(
        schedule: Arc<dyn ScheduleProvider>,
        sessions: Arc<dyn SessionProvider>,
        window_size: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            schedule,
            sessions,
            window_size: window_size.max(1),
            max_concurrent_loads: 4,
            clock: Arc::new(|| Utc::now().date_naive()),
            snapshot: TtlCache::new(ttl),
        }
    }

    pub fn with_max_concurrent_loads(mut self, n: usize) -> Self {
        self.max_concurrent_loads = n.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The cached window, refreshed when older than the time-to-live.
    ///
    /// Errors only when the very first refresh fails; afterwards a failed
    /// refresh keeps serving the previous window.
    pub async fn window(&self) -> Result<Arc<ResultWindow>, PredictError> {
        self.snapshot
            .get_or_refresh("recent results", || self.load())
            .await
    }

    /// At most `limit` most recent sessions of the current season, `limit`
    /// clamped to the window size. A fallback window is returned whole.
    pub async fn recent_sessions(&self, limit: usize) -> Result<ResultWindow, PredictError> {
        let window = self.window().await?;
        let mut out = (*window).clone();
        if !out.using_fallback_season {
            let keep = limit.min(self.window_size);
            let skip = out.sessions.len().saturating_sub(keep);
            out.sessions.drain(..skip);
        }
        Ok(out)
    }

    async fn load(&self) -> Result<ResultWindow, PredictError> {
        let today = (self.clock)();
        let season = today.year();

        let schedule = self
            .schedule
            .season_schedule(season)
            .await
            .map_err(|e| PredictError::unavailable("schedule", e))?;
        let upcoming = schedule.iter().find(|s| s.date >= today).cloned();
        let completed: Vec<SessionSummary> =
            schedule.into_iter().filter(|s| s.date < today).collect();

        if !completed.is_empty() {
            let start = completed.len().saturating_sub(self.window_size);
            let sessions = self.load_sessions(&completed[start..]).await?;
            tracing::info!(
                "loaded {} of the last {} completed rounds of {}",
                sessions.len(),
                completed.len() - start,
                season
            );
            return Ok(ResultWindow {
                sessions,
                season_used: season,
                using_fallback_season: false,
                upcoming,
            });
        }

        let previous = season - 1;
        let completed = self
            .schedule
            .completed_sessions(previous, today)
            .await
            .map_err(|e| PredictError::unavailable("schedule", e))?;
        if completed.is_empty() {
            tracing::warn!("no completed rounds in {} or {}", season, previous);
            return Ok(ResultWindow {
                upcoming,
                ..ResultWindow::empty(season)
            });
        }

        let sessions = self.load_sessions(&completed).await?;
        tracing::info!(
            "no completed rounds in {}, using fallback season {} ({} sessions)",
            season,
            previous,
            sessions.len()
        );
        Ok(ResultWindow {
            sessions,
            season_used: previous,
            using_fallback_season: true,
            upcoming,
        })
    }

    /// Loads rounds concurrently; failed rounds are dropped, the rest are put
    /// back in chronological order. Fails only if every round failed.
    async fn load_sessions(
        &self,
        rounds: &[SessionSummary],
    ) -> Result<Vec<SessionRecord>, PredictError> {
        let loads: Vec<_> = rounds
            .iter()
            .map(|s| async move {
                match self
                    .sessions
                    .session_results(s.season_year, s.round_number, SessionKind::Race)
                    .await
                {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(
                            "dropping {} round {} from window: {}",
                            s.season_year,
                            s.round_number,
                            e
                        );
                        None
                    }
                }
            })
            .collect();
        let mut loaded: Vec<SessionRecord> = stream::iter(loads)
            .buffer_unordered(self.max_concurrent_loads)
            .filter_map(|r| async move { r })
            .collect()
            .await;

        if loaded.is_empty() && !rounds.is_empty() {
            return Err(PredictError::unavailable(
                "results",
                format!("all {} session loads failed", rounds.len()),
            ));
        }
        loaded.sort_by_key(|s| (s.season_year, s.round_number));
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::sources::SourceResult;
    use crate::types::ResultRecord;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[derive(Default)]
    struct FakeCalendar {
        seasons: HashMap<i32, Vec<SessionSummary>>,
        fail_rounds: HashSet<(i32, u32)>,
        down: AtomicBool,
        schedule_calls: AtomicUsize,
        loads: Mutex<Vec<(i32, u32)>>,
    }

    impl FakeCalendar {
        fn season(mut self, year: i32, dates: &[NaiveDate]) -> Self {
            let rounds = dates
                .iter()
                .enumerate()
                .map(|(i, d)| SessionSummary {
                    event_name: format!("Round {}", i + 1),
                    round_number: i as u32 + 1,
                    season_year: year,
                    date: *d,
                    circuit: None,
                })
                .collect();
            self.seasons.insert(year, rounds);
            self
        }
    }

    #[async_trait]
    impl ScheduleProvider for FakeCalendar {
        async fn season_schedule(&self, season: i32) -> SourceResult<Vec<SessionSummary>> {
            self.schedule_calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(SourceError::Other("calendar down".into()));
            }
            Ok(self.seasons.get(&season).cloned().unwrap_or_default())
        }
    }

    #[async_trait]
    impl SessionProvider for FakeCalendar {
        async fn session_results(
            &self,
            season: i32,
            round: u32,
            _kind: SessionKind,
        ) -> SourceResult<SessionRecord> {
            self.loads.lock().push((season, round));
            // earlier rounds finish last
            tokio::time::sleep(Duration::from_millis(100 - round as u64)).await;
            if self.fail_rounds.contains(&(season, round)) {
                return Err(SourceError::NotFound(format!("round {}", round)));
            }
            let summary = &self.seasons[&season][round as usize - 1];
            Ok(SessionRecord {
                event_name: summary.event_name.clone(),
                round_number: round,
                season_year: season,
                date: summary.date,
                results: vec![ResultRecord {
                    competitor_id: "ver".into(),
                    competitor_name: "Max Verstappen".into(),
                    team: "Red Bull".into(),
                    car_number: Some(1),
                    finish_position: Some(1),
                    start_position: Some(1),
                    points: 25.0,
                    status: "Finished".into(),
                }],
            })
        }
    }

    fn cache(cal: Arc<FakeCalendar>, today: NaiveDate) -> RecentResultsCache {
        RecentResultsCache::new(cal.clone(), cal, 3, Duration::from_secs(3_600))
            .with_clock(Arc::new(move || today))
    }

    fn rounds(w: &ResultWindow) -> Vec<u32> {
        w.sessions.iter().map(|s| s.round_number).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_last_rounds_in_calendar_order() {
        let cal = Arc::new(FakeCalendar::default().season(
            2025,
            &[
                date(2025, 3, 2),
                date(2025, 3, 16),
                date(2025, 3, 30),
                date(2025, 4, 13),
                date(2025, 4, 27),
                date(2025, 5, 11),
            ],
        ));
        let w = cache(cal, date(2025, 5, 1)).window().await.unwrap();
        assert_eq!(rounds(&w), vec![3, 4, 5]);
        assert!(!w.using_fallback_season);
        assert_eq!(w.season_used, 2025);
        assert_eq!(w.upcoming.as_ref().map(|s| s.round_number), Some(6));
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_whole_previous_season() {
        let cal = Arc::new(
            FakeCalendar::default()
                .season(2025, &[date(2025, 3, 2)])
                .season(
                    2024,
                    &[
                        date(2024, 3, 2),
                        date(2024, 3, 9),
                        date(2024, 3, 24),
                        date(2024, 4, 7),
                        date(2024, 12, 8),
                    ],
                ),
        );
        let c = cache(cal, date(2025, 1, 15));
        let w = c.recent_sessions(2).await.unwrap();
        assert!(w.using_fallback_season);
        assert_eq!(w.season_used, 2024);
        assert_eq!(rounds(&w), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_is_clamped_to_window_size() {
        let cal = Arc::new(FakeCalendar::default().season(
            2025,
            &[
                date(2025, 3, 2),
                date(2025, 3, 16),
                date(2025, 3, 30),
                date(2025, 4, 13),
            ],
        ));
        let c = cache(cal, date(2025, 6, 1));
        assert_eq!(rounds(&c.recent_sessions(2).await.unwrap()), vec![3, 4]);
        assert_eq!(rounds(&c.recent_sessions(10).await.unwrap()), vec![2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_when_no_season_has_run() {
        let cal = Arc::new(FakeCalendar::default().season(2025, &[date(2025, 3, 2)]));
        let w = cache(cal, date(2025, 1, 15)).window().await.unwrap();
        assert!(w.is_empty());
        assert!(!w.using_fallback_season);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rounds_are_dropped() {
        let mut cal = FakeCalendar::default().season(
            2025,
            &[date(2025, 3, 2), date(2025, 3, 16), date(2025, 3, 30)],
        );
        cal.fail_rounds.insert((2025, 2));
        let w = cache(Arc::new(cal), date(2025, 6, 1)).window().await.unwrap();
        assert_eq!(rounds(&w), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_window_until_expiry() {
        let cal = Arc::new(FakeCalendar::default().season(2025, &[date(2025, 3, 2)]));
        let c = cache(cal.clone(), date(2025, 6, 1));
        c.window().await.unwrap();
        c.window().await.unwrap();
        assert_eq!(cal.schedule_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cal.loads.lock().len(), 1);

        tokio::time::advance(Duration::from_secs(3_601)).await;
        c.window().await.unwrap();
        assert_eq!(cal.schedule_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_serves_previous_window() {
        let cal = Arc::new(FakeCalendar::default().season(2025, &[date(2025, 3, 2)]));
        let c = cache(cal.clone(), date(2025, 6, 1));
        let first = c.window().await.unwrap();

        cal.down.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(3_601)).await;
        let second = c.window().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn first_refresh_failure_is_an_error() {
        let cal = Arc::new(FakeCalendar::default());
        cal.down.store(true, Ordering::SeqCst);
        let err = cache(cal, date(2025, 6, 1)).window().await.unwrap_err();
        assert!(matches!(err, PredictError::SourceUnavailable { .. }));
    }
}
