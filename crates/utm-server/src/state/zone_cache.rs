//! Time-bounded cache of the active restricted-zone list.
//!
//! Readers get the cached snapshot while it is fresh. An expired snapshot triggers exactly
//! one refresh shared by all concurrent readers. A failed refresh keeps serving the previous
//! snapshot and backs off before trying the store again.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use utm_core::models::RestrictedZone;
use utm_core::UtmError;

use crate::backoff::Backoff;
use crate::persistence::{zones, Database};
use crate::state::single_flight::SingleFlight;

pub type ZoneList = Arc<Vec<RestrictedZone>>;

/// The durable store the cache refreshes from.
pub trait ZoneSource: Send + Sync + 'static {
    fn load(&self) -> impl Future<Output = Result<Vec<RestrictedZone>, UtmError>> + Send;
}

impl ZoneSource for Database {
    fn load(&self) -> impl Future<Output = Result<Vec<RestrictedZone>, UtmError>> + Send {
        let pool = self.pool().clone();
        async move {
            zones::load_active_zones(&pool)
                .await
                .map_err(|e| UtmError::StoreUnavailable(e.to_string()))
        }
    }
}

#[derive(Clone)]
struct Snapshot {
    zones: ZoneList,
    fetched_at: DateTime<Utc>,
    generation: u64,
}

struct Inner<S> {
    source: S,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    backoff: Mutex<Backoff>,
    generation: AtomicU64,
}

impl<S: ZoneSource> Inner<S> {
    async fn refresh(&self, generation: u64, now: DateTime<Utc>) -> Result<ZoneList, UtmError> {
        match self.source.load().await {
            Ok(loaded) => {
                let zones: ZoneList = Arc::new(loaded);
                debug!(zones = zones.len(), generation, "Zone cache refreshed");
                let mut snapshot = self.snapshot.write();
                // A refresh started before a later invalidation must not overwrite newer data
                if snapshot.as_ref().map_or(true, |s| s.generation <= generation) {
                    *snapshot = Some(Snapshot {
                        zones: zones.clone(),
                        fetched_at: now,
                        generation,
                    });
                }
                drop(snapshot);
                self.backoff.lock().reset();
                Ok(zones)
            }
            Err(err) => {
                let delay = self.backoff.lock().fail(now);
                let stale_since = self.snapshot.read().as_ref().map(|s| s.fetched_at);
                warn!(
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    stale_since = ?stale_since,
                    "Zone refresh failed"
                );
                Err(err)
            }
        }
    }
}

pub struct ZoneCache<S: ZoneSource> {
    inner: Arc<Inner<S>>,
    refresh: SingleFlight<Result<ZoneList, UtmError>>,
}

impl<S: ZoneSource> ZoneCache<S> {
    pub fn new(source: S, ttl: std::time::Duration, retry_max: std::time::Duration) -> Self {
        let retry_base = std::time::Duration::from_secs(1).min(retry_max);
        Self {
            inner: Arc::new(Inner {
                source,
                ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(5)),
                snapshot: RwLock::new(None),
                backoff: Mutex::new(Backoff::new(retry_base, retry_max)),
                generation: AtomicU64::new(0),
            }),
            refresh: SingleFlight::new(),
        }
    }

    /// Active zones as of `now`, refreshing at most once per TTL.
    ///
    /// Fails with `StoreUnavailable` only when the store is down and nothing has ever been
    /// loaded.
    pub async fn active_zones(&self, now: DateTime<Utc>) -> Result<ZoneList, UtmError> {
        let stale = {
            let snapshot = self.inner.snapshot.read();
            match snapshot.as_ref() {
                Some(s) if self.is_fresh(s, now) => return Ok(s.zones.clone()),
                Some(s) => Some(s.zones.clone()),
                None => None,
            }
        };

        if !self.inner.backoff.lock().ready(now) {
            return stale.ok_or_else(|| {
                UtmError::StoreUnavailable("zone store unavailable, retry pending".to_string())
            });
        }

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let inner = self.inner.clone();
        match self
            .refresh
            .run(generation, move || async move { inner.refresh(generation, now).await })
            .await
        {
            Ok(zones) => Ok(zones),
            Err(err) => match stale {
                Some(zones) => Ok(zones),
                None => Err(err),
            },
        }
    }

    /// Force the next read to go to the store, e.g. after an administrative change.
    pub fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.backoff.lock().reset();
    }

    fn is_fresh(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
        snapshot.generation == self.inner.generation.load(Ordering::SeqCst)
            && now - snapshot.fetched_at < self.inner.ttl
    }
}
