//! Inbound API for a user interface.
//!
//! The session holds the explicit user context (region, load duration,
//! connectivity) and turns every load into a [`Dashboard`] or an error whose
//! message tells the user what to do next. It never exposes the cache or the
//! repository.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::analyzer::{self, AnalysisResult, CurrentSlotStatus, DelayRecommendation};
use crate::cache::RateCache;
use crate::clock::Clock;
use crate::config::AgileConfig;
use crate::error::SessionError;
use crate::http_client::HttpClient;
use crate::orchestrator::{AcquisitionOrchestrator, LoadRequest, NetworkStatus, RateSource};
use crate::repository::RateRepository;
use crate::store::KeyValueStore;
use crate::{DailyRateSet, DevicePreset, LoadDuration, Region, UtcDateTime};

/// Store key of the persisted region preference; outside the rates namespace.
pub const REGION_PREFERENCE_KEY: &str = "agilecast_region";

/// Everything a front end renders after a successful load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub region: Region,
    pub region_name: &'static str,
    pub analysis: AnalysisResult,
    pub current: CurrentSlotStatus,
    pub recommendation: DelayRecommendation,
    pub duration: LoadDuration,
    /// Rates are older than today's fresh data (previous day or offline fallback).
    pub is_stale: bool,
    pub source: RateSource,
    pub loaded_at: UtcDateTime,
}

#[derive(Debug)]
struct Latest {
    sequence: u64,
    rates: DailyRateSet,
    dashboard: Dashboard,
}

#[derive(Debug)]
struct SessionState {
    region: Region,
    duration: LoadDuration,
    latest: Option<Latest>,
}

/// User-facing session over the acquisition pipeline.
pub struct AgileSession {
    orchestrator: Arc<AcquisitionOrchestrator>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    sequence: AtomicU64,
    refresh_period: Duration,
}

impl AgileSession {
    /// Wire a session from configuration and its collaborators.
    pub fn new(
        config: &AgileConfig,
        http_client: Arc<dyn HttpClient>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let repository = RateRepository::new(http_client, config);
        let cache = RateCache::new(Arc::clone(&store), Arc::clone(&clock), config);
        let orchestrator = AcquisitionOrchestrator::new(
            repository,
            cache,
            Arc::clone(&clock),
            Arc::new(NetworkStatus::default()),
        );
        Self::from_parts(Arc::new(orchestrator), store, clock, config)
    }

    /// Build a session around an existing orchestrator.
    ///
    /// The persisted region preference wins over `config.default_region`.
    pub fn from_parts(
        orchestrator: Arc<AcquisitionOrchestrator>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &AgileConfig,
    ) -> Arc<Self> {
        let default_region = config.default_region;
        let region = match store.get(REGION_PREFERENCE_KEY) {
            Ok(Some(code)) => Region::parse(&code).unwrap_or_else(|error| {
                tracing::warn!(%error, "ignoring invalid stored region preference");
                default_region
            }),
            Ok(None) => default_region,
            Err(error) => {
                tracing::warn!(%error, "failed to read region preference");
                default_region
            }
        };

        Arc::new(Self {
            orchestrator,
            store,
            clock,
            state: Mutex::new(SessionState {
                region,
                duration: LoadDuration::default(),
                latest: None,
            }),
            sequence: AtomicU64::new(0),
            refresh_period: config.auto_refresh_period(),
        })
    }

    pub fn region(&self) -> Region {
        self.lock_state().region
    }

    pub fn duration(&self) -> LoadDuration {
        self.lock_state().duration
    }

    pub fn is_online(&self) -> bool {
        self.orchestrator.network().is_online()
    }

    /// The most recently completed dashboard.
    pub fn latest(&self) -> Option<Dashboard> {
        self.lock_state()
            .latest
            .as_ref()
            .map(|latest| latest.dashboard.clone())
    }

    /// Load rates for the selected region and analyze them.
    pub async fn load_data(&self, force_refresh: bool) -> Result<Dashboard, SessionError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let (region, duration) = {
            let state = self.lock_state();
            (state.region, state.duration)
        };

        let loaded = self
            .orchestrator
            .load(LoadRequest::new(region, force_refresh))
            .await?;
        let dashboard = self.build_dashboard(&loaded.rates, region, duration, loaded.is_stale, loaded.source)?;

        let mut state = self.lock_state();
        let superseded = state
            .latest
            .as_ref()
            .is_some_and(|latest| latest.sequence > sequence);
        if state.region == region && !superseded {
            state.latest = Some(Latest {
                sequence,
                rates: loaded.rates,
                dashboard: dashboard.clone(),
            });
        } else {
            tracing::debug!(sequence, "discarding superseded load result");
        }

        Ok(dashboard)
    }

    /// Switch region: persist it, drop cached rates of the old region, reload.
    pub async fn select_region(&self, code: &str) -> Result<Dashboard, SessionError> {
        let region = Region::parse(code)?;
        self.store.set(REGION_PREFERENCE_KEY, region.code())?;
        self.orchestrator.cache().invalidate_all()?;
        {
            let mut state = self.lock_state();
            state.region = region;
            state.latest = None;
        }
        tracing::info!(region = %region, name = region.name(), "region changed");

        self.load_data(true).await
    }

    /// Change the load duration and recompute the recommendation.
    pub async fn select_duration(&self, hours: f64) -> Result<DelayRecommendation, SessionError> {
        let duration = LoadDuration::hours(hours)?;
        let now = self.clock.now();

        let recomputed = {
            let mut state = self.lock_state();
            state.duration = duration;
            match state.latest.as_mut() {
                Some(latest) => {
                    let recommendation =
                        analyzer::delay_recommendation(latest.rates.slots(), now, duration)?;
                    latest.dashboard.duration = duration;
                    latest.dashboard.recommendation = recommendation.clone();
                    Some(recommendation)
                }
                None => None,
            }
        };

        match recomputed {
            Some(recommendation) => Ok(recommendation),
            None => Ok(self.load_data(false).await?.recommendation),
        }
    }

    pub async fn select_device(&self, preset: DevicePreset) -> Result<DelayRecommendation, SessionError> {
        self.select_duration(preset.duration().as_hours()).await
    }

    /// Record connectivity; coming back online triggers a reload.
    pub async fn set_online(&self, online: bool) -> Option<Result<Dashboard, SessionError>> {
        let was_online = self.orchestrator.network().set_online(online);
        if online && !was_online {
            tracing::info!("back online; reloading rates");
            return Some(self.load_data(false).await);
        }
        None
    }

    pub fn refresh_period(&self) -> Duration {
        self.refresh_period
    }

    /// Reload every configured refresh period while online; failures are
    /// logged, not fatal.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let period = self.refresh_period;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                if !session.is_online() {
                    continue;
                }
                if let Err(error) = session.load_data(false).await {
                    tracing::warn!(%error, "scheduled rate refresh failed");
                }
            }
        })
    }

    fn build_dashboard(
        &self,
        rates: &DailyRateSet,
        region: Region,
        duration: LoadDuration,
        is_stale: bool,
        source: RateSource,
    ) -> Result<Dashboard, SessionError> {
        let now = self.clock.now();
        let slots = rates.slots();

        Ok(Dashboard {
            region,
            region_name: region.name(),
            analysis: analyzer::analyze(slots)?,
            current: analyzer::current_slot_status(slots, now)?,
            recommendation: analyzer::delay_recommendation(slots, now, duration)?,
            duration,
            is_stale,
            source,
            loaded_at: now,
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock is not poisoned")
    }
}
