//! Time-to-live snapshot cache with a single-flight refresh guard.
//!
//! Readers either see the previous complete snapshot or the new complete
//! snapshot: the value is swapped behind an `Arc` only after a refresh
//! succeeds. Concurrent callers that find the snapshot stale queue on one
//! async mutex, so at most one refresh runs at a time and the callers behind
//! it reuse its result.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Stamped<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

pub struct TtlCache<T> {
    ttl: Duration,
    slot: RwLock<Option<Stamped<T>>>,
    refresh: Mutex<()>,
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// The current snapshot if it is younger than the time-to-live.
    pub fn fresh(&self) -> Option<Arc<T>> {
        let slot = self.slot.read();
        slot.as_ref()
            .filter(|s| s.fetched_at.elapsed() < self.ttl)
            .map(|s| s.value.clone())
    }

    /// The current snapshot regardless of age.
    pub fn last(&self) -> Option<Arc<T>> {
        self.slot.read().as_ref().map(|s| s.value.clone())
    }

    fn store(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        *self.slot.write() = Some(Stamped {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        value
    }

    /// Serves the fresh snapshot, or runs `load` under the refresh guard.
    ///
    /// On failure the previous snapshot (however old) is served; the error is
    /// returned only when there has never been a successful load.
    pub async fn get_or_refresh<E, F, Fut>(&self, what: &str, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if let Some(v) = self.fresh() {
            return Ok(v);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited for the guard.
        if let Some(v) = self.fresh() {
            return Ok(v);
        }

        match load().await {
            Ok(value) => Ok(self.store(value)),
            Err(e) => match self.last() {
                Some(stale) => {
                    tracing::warn!("{} refresh failed, serving previous snapshot: {}", what, e);
                    Ok(stale)
                }
                None => {
                    tracing::error!("{} refresh failed with no previous snapshot: {}", what, e);
                    Err(e)
                }
            },
        }
    }
}
