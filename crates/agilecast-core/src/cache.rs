//! Time-boxed cache of daily rate sets on top of a [`KeyValueStore`].
//!
//! Entries are keyed by `{namespace}_{region}_{YYYY-MM-DD}` and stamped with
//! their creation time. Normal reads honour the TTL; the offline fallback
//! ignores it. Anything older than the sweep age is removed on every write.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Date, Duration};

use crate::clock::Clock;
use crate::config::AgileConfig;
use crate::error::{CacheError, StoreError};
use crate::store::KeyValueStore;
use crate::{DailyRateSet, Region, UtcDateTime};

/// Serialized form of one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedRates {
    region: Region,
    date: String,
    created_at: UtcDateTime,
    rates: DailyRateSet,
}

/// Result of a non-evicting cache probe.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Present and within TTL.
    Fresh(DailyRateSet),
    /// Present but older than TTL.
    Stale(DailyRateSet),
    Missing,
}

impl CacheLookup {
    /// The cached rates regardless of age.
    pub fn into_any(self) -> Option<DailyRateSet> {
        match self {
            Self::Fresh(rates) | Self::Stale(rates) => Some(rates),
            Self::Missing => None,
        }
    }
}

/// Storage usage of the rate cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    /// Newest `created_at` across entries.
    pub last_updated: Option<UtcDateTime>,
}

/// TTL cache of [`DailyRateSet`]s keyed by region and calendar date.
#[derive(Clone)]
pub struct RateCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    namespace: String,
    ttl: Duration,
    sweep_age: Duration,
}

impl RateCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: &AgileConfig) -> Self {
        Self {
            store,
            clock,
            namespace: config.cache_namespace.clone(),
            ttl: config.cache_ttl(),
            sweep_age: config.sweep_age(),
        }
    }

    /// Store key of `(region, date)`; any instant of the day maps to the same key.
    pub fn key(&self, region: Region, date: Date) -> String {
        format!("{}_{}_{}", self.namespace, region.code(), date)
    }

    fn prefix(&self) -> String {
        format!("{}_", self.namespace)
    }

    /// Probe an entry without evicting it.
    pub fn lookup(&self, region: Region, date: Date) -> CacheLookup {
        let key = self.key(region, date);
        let Some(entry) = self.read_entry(&key) else {
            return CacheLookup::Missing;
        };

        let age = entry.created_at.duration_until(self.clock.now());
        if age <= self.ttl {
            CacheLookup::Fresh(entry.rates)
        } else {
            CacheLookup::Stale(entry.rates)
        }
    }

    /// Cached rates within TTL; a stale entry is removed and reported absent.
    pub fn get(&self, region: Region, date: Date) -> Option<DailyRateSet> {
        match self.lookup(region, date) {
            CacheLookup::Fresh(rates) => {
                tracing::debug!(region = %region, %date, "rate cache hit");
                Some(rates)
            }
            CacheLookup::Stale(_) => {
                tracing::debug!(region = %region, %date, "rate cache entry expired");
                let key = self.key(region, date);
                if let Err(error) = self.store.remove(&key) {
                    tracing::warn!(%key, %error, "failed to evict expired rate cache entry");
                }
                None
            }
            CacheLookup::Missing => {
                tracing::debug!(region = %region, %date, "rate cache miss");
                None
            }
        }
    }

    /// Store or overwrite an entry stamped with the current time.
    ///
    /// A full store triggers one sweep and one retry; a second failure is returned.
    pub fn put(&self, region: Region, date: Date, rates: &DailyRateSet) -> Result<(), CacheError> {
        let key = self.key(region, date);
        let value = serde_json::to_string(&CachedRates {
            region,
            date: date.to_string(),
            created_at: self.clock.now(),
            rates: rates.clone(),
        })?;

        match self.store.set(&key, &value) {
            Ok(()) => {}
            Err(StoreError::QuotaExceeded { .. }) => {
                tracing::warn!(%key, "rate cache store is full; sweeping before retry");
                self.sweep()?;
                self.store.set(&key, &value)?;
            }
            Err(error) => return Err(error.into()),
        }
        tracing::debug!(%key, slots = rates.len(), "cached unit rates");

        if let Err(error) = self.sweep() {
            tracing::warn!(%error, "rate cache sweep failed");
        }
        Ok(())
    }

    /// Drop every rate entry of this namespace.
    pub fn invalidate_all(&self) -> Result<usize, CacheError> {
        let keys = self.store.keys(&self.prefix())?;
        for key in &keys {
            self.store.remove(key)?;
        }
        tracing::info!(removed = keys.len(), "invalidated rate cache");
        Ok(keys.len())
    }

    /// Offline fallback: today's entry, else yesterday's, regardless of TTL.
    pub fn find_any_recent(&self, region: Region) -> Option<DailyRateSet> {
        let today = self.clock.now().date();
        let candidates = [Some(today), today.previous_day()];

        candidates
            .into_iter()
            .flatten()
            .find_map(|date| self.lookup(region, date).into_any())
    }

    /// Remove entries older than the sweep age, and any that no longer parse.
    pub fn sweep(&self) -> Result<usize, CacheError> {
        let cutoff = self.clock.now().minus(self.sweep_age);
        let mut removed = 0;

        for key in self.store.keys(&self.prefix())? {
            let expired = match self.store.get(&key)? {
                Some(raw) => match serde_json::from_str::<CachedRates>(&raw) {
                    Ok(entry) => entry.created_at < cutoff,
                    Err(_) => true,
                },
                None => false,
            };

            if expired {
                self.store.remove(&key)?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "swept old rate cache entries");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats {
            entries: 0,
            total_bytes: 0,
            last_updated: None,
        };

        for key in self.store.keys(&self.prefix())? {
            let Some(raw) = self.store.get(&key)? else {
                continue;
            };
            stats.entries += 1;
            stats.total_bytes += key.len() + raw.len();
            if let Ok(entry) = serde_json::from_str::<CachedRates>(&raw) {
                stats.last_updated = stats.last_updated.max(Some(entry.created_at));
            }
        }

        Ok(stats)
    }

    fn read_entry(&self, key: &str) -> Option<CachedRates> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::warn!(%key, %error, "failed to read rate cache entry");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(%key, %error, "discarding unreadable rate cache entry");
                let _ = self.store.remove(key);
                None
            }
        }
    }
}
