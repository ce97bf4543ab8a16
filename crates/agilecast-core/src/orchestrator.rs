//! Acquisition policy: cache, then network (today, then yesterday), then the
//! stale offline fallback, then failure.
//!
//! Concurrent loads for the same `(region, today)` key share one acquisition.
//! A forced refresh only joins another forced refresh; a plain load joins
//! either kind.
//! Each acquisition runs in its own task, so a caller that stops waiting does
//! not abort a fetch that is still retrying; its result is cached either way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use time::Date;
use tokio::sync::watch;

use crate::cache::{CacheLookup, RateCache};
use crate::clock::Clock;
use crate::error::{AcquisitionError, FetchError};
use crate::repository::RateRepository;
use crate::{DailyRateSet, Region, ValidationError};

/// A single load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub region: Region,
    /// Skip the fresh-cache shortcut and go to the network.
    pub force_refresh: bool,
}

impl LoadRequest {
    pub const fn new(region: Region, force_refresh: bool) -> Self {
        Self {
            region,
            force_refresh,
        }
    }

    /// Build a request from a raw region code, rejecting unknown regions
    /// before any cache or network access.
    pub fn parse(region: &str, force_refresh: bool) -> Result<Self, ValidationError> {
        Ok(Self::new(Region::parse(region)?, force_refresh))
    }
}

/// Where the returned rates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Cache,
    Network,
    /// Today was not published yet; yesterday's rates were fetched instead.
    PreviousDay,
    /// Network unavailable or failing; served from cache ignoring TTL.
    OfflineFallback,
}

/// Successful terminal state of an acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRates {
    pub region: Region,
    pub rates: DailyRateSet,
    pub is_stale: bool,
    pub source: RateSource,
}

impl LoadedRates {
    /// Calendar date of the first slot.
    pub fn date(&self) -> Option<Date> {
        self.rates.slots().first().map(|slot| slot.valid_from.date())
    }
}

pub type LoadOutcome = Result<LoadedRates, AcquisitionError>;

/// Connectivity flag shared with whatever observes the network.
#[derive(Debug)]
pub struct NetworkStatus {
    online: AtomicBool,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record connectivity, returning the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Cache key plus whether the acquisition skips the fresh-cache shortcut.
type InFlightKey = (String, bool);
type InFlightMap = HashMap<InFlightKey, watch::Receiver<Option<LoadOutcome>>>;

/// Composes repository and cache into the single acquisition policy.
pub struct AcquisitionOrchestrator {
    repository: RateRepository,
    cache: RateCache,
    clock: Arc<dyn Clock>,
    network: Arc<NetworkStatus>,
    in_flight: Mutex<InFlightMap>,
}

impl AcquisitionOrchestrator {
    pub fn new(
        repository: RateRepository,
        cache: RateCache,
        clock: Arc<dyn Clock>,
        network: Arc<NetworkStatus>,
    ) -> Self {
        Self {
            repository,
            cache,
            clock,
            network,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    pub fn network(&self) -> &Arc<NetworkStatus> {
        &self.network
    }

    /// Number of acquisitions currently running.
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    /// Load rates for `request`, joining an identical acquisition if one is running.
    pub async fn load(self: &Arc<Self>, request: LoadRequest) -> LoadOutcome {
        let mut receiver = self.join_or_start(request);
        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| (*outcome).clone());

        outcome.unwrap_or(Err(AcquisitionError::NoDataAvailable { last_failure: None }))
    }

    fn join_or_start(self: &Arc<Self>, request: LoadRequest) -> watch::Receiver<Option<LoadOutcome>> {
        let today = self.clock.now().date();
        let key = self.cache.key(request.region, today);

        let joinable: &[bool] = if request.force_refresh {
            &[true]
        } else {
            &[false, true]
        };

        let mut in_flight = self.lock_in_flight();
        for &forced in joinable {
            if let Some(receiver) = in_flight.get(&(key.clone(), forced)) {
                tracing::debug!(%key, forced, "joining in-flight rate load");
                return receiver.clone();
            }
        }

        let entry_key = (key, request.force_refresh);
        let (sender, receiver) = watch::channel(None);
        in_flight.insert(entry_key.clone(), receiver.clone());
        drop(in_flight);

        let entry = InFlightEntry {
            orchestrator: Arc::clone(self),
            key: entry_key,
        };
        tokio::spawn(async move {
            let outcome = entry.orchestrator.acquire(request).await;
            drop(entry);
            let _ = sender.send(Some(outcome));
        });

        receiver
    }

    async fn acquire(&self, request: LoadRequest) -> LoadOutcome {
        let region = request.region;
        let today = self.clock.now().date();

        if !request.force_refresh {
            if let CacheLookup::Fresh(rates) = self.cache.lookup(region, today) {
                tracing::info!(region = %region, %today, "serving unit rates from cache");
                return Ok(LoadedRates {
                    region,
                    rates,
                    is_stale: false,
                    source: RateSource::Cache,
                });
            }
        }

        let mut last_failure = None;
        if self.network.is_online() {
            match self.fetch_from_network(region, today).await {
                Ok(Some(loaded)) => return Ok(loaded),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(region = %region, %error, "network acquisition failed");
                    last_failure = Some(error);
                }
            }
        } else {
            tracing::info!(region = %region, "offline; skipping network fetch");
        }

        if let Some(rates) = self.cache.find_any_recent(region) {
            tracing::info!(region = %region, slots = rates.len(), "using offline fallback rates");
            return Ok(LoadedRates {
                region,
                rates,
                is_stale: true,
                source: RateSource::OfflineFallback,
            });
        }

        tracing::warn!(region = %region, "no pricing data available");
        Err(AcquisitionError::NoDataAvailable { last_failure })
    }

    /// Today's rates, or yesterday's when today is not yet published.
    ///
    /// `Ok(None)` means both days came back empty.
    async fn fetch_from_network(
        &self,
        region: Region,
        today: Date,
    ) -> Result<Option<LoadedRates>, FetchError> {
        let rates = self.repository.fetch_day(region, today).await?;
        if !rates.is_empty() {
            self.store(region, today, &rates);
            return Ok(Some(LoadedRates {
                region,
                rates,
                is_stale: false,
                source: RateSource::Network,
            }));
        }

        let Some(yesterday) = today.previous_day() else {
            return Ok(None);
        };
        tracing::info!(region = %region, %today, "no rates published yet; trying previous day");

        let rates = self.repository.fetch_day(region, yesterday).await?;
        if rates.is_empty() {
            tracing::warn!(region = %region, "upstream returned no rates for today or yesterday");
            return Ok(None);
        }

        self.store(region, yesterday, &rates);
        Ok(Some(LoadedRates {
            region,
            rates,
            is_stale: true,
            source: RateSource::PreviousDay,
        }))
    }

    fn store(&self, region: Region, date: Date, rates: &DailyRateSet) {
        if let Err(error) = self.cache.put(region, date, rates) {
            tracing::warn!(region = %region, %date, %error, "failed to cache unit rates");
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, InFlightMap> {
        self.in_flight
            .lock()
            .expect("in-flight load map lock is not poisoned")
    }
}

/// Removes its key from the in-flight map when the acquisition ends, even by panic.
struct InFlightEntry {
    orchestrator: Arc<AcquisitionOrchestrator>,
    key: InFlightKey,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.orchestrator.in_flight.lock() {
            in_flight.remove(&self.key);
        }
    }
}
