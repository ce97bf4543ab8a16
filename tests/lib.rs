//! Shared fixtures for the agilecast behaviour suites.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use time::Duration;

pub use agilecast_core::{
    AcquisitionOrchestrator, AgileConfig, AgileSession, Clock, DailyRateSet, HttpClient,
    HttpError, HttpRequest, HttpResponse, KeyValueStore, ManualClock, MemoryStore,
    NetworkStatus, PriceSlot, RateCache, RateRepository, Region, UtcDateTime,
};
pub use std::sync::Arc;

pub fn ts(value: &str) -> UtcDateTime {
    UtcDateTime::parse(value).expect("valid fixture timestamp")
}

/// Consecutive half-hour slots from midnight of `date` (`YYYY-MM-DD`).
pub fn day_slots(date: &str, prices: &[f64]) -> Vec<PriceSlot> {
    let midnight = ts(&format!("{date}T00:00:00Z"));
    prices
        .iter()
        .enumerate()
        .map(|(index, price)| {
            let from = midnight.plus(Duration::minutes(30 * index as i64));
            let to = from.plus(Duration::minutes(30));
            PriceSlot::new(from, to, *price).expect("valid fixture slot")
        })
        .collect()
}

/// 48 prices in `[10, 40]`: ascending through the morning, scattered after.
pub fn scenario_a_prices() -> Vec<f64> {
    let mut prices: Vec<f64> = (0..24).map(|i| 10.0 + f64::from(i)).collect();
    prices.extend([
        40.0, 15.0, 35.0, 25.0, 18.0, 31.0, 12.0, 22.0, 38.0, 11.0, 27.0, 16.0, 33.0, 20.0, 14.0,
        29.0, 36.0, 13.0, 24.0, 30.0, 17.0, 21.0, 26.0, 19.0,
    ]);
    prices
}

/// Test double for the tariff API.
///
/// Answers from a table of published `(region, date)` days; anything else is
/// an empty page, as upstream does before publication.
pub struct FakeTariffApi {
    published: Mutex<HashMap<(String, String), Vec<f64>>>,
    requests: Mutex<Vec<HttpRequest>>,
    failing: AtomicBool,
    latency: Mutex<StdDuration>,
}

impl FakeTariffApi {
    pub fn new(latency: StdDuration) -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            latency: Mutex::new(latency),
        })
    }

    pub fn publish(&self, region: Region, date: &str, prices: &[f64]) {
        self.published
            .lock()
            .expect("fixture lock")
            .insert((region.code().to_owned(), date.to_owned()), prices.to_vec());
    }

    /// Every request fails at the transport level while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Latency applied to requests issued from now on.
    pub fn set_latency(&self, latency: StdDuration) {
        *self.latency.lock().expect("fixture lock") = latency;
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("fixture lock").len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("fixture lock").clone()
    }

    fn respond(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HttpError::new("connection refused"));
        }

        let region = request
            .url
            .split('/')
            .find_map(|segment| segment.starts_with("E-1R-").then(|| segment.rsplit('-').next()))
            .flatten()
            .unwrap_or_default()
            .to_owned();
        let date = request
            .query
            .iter()
            .find(|(name, _)| name == "period_from")
            .map(|(_, value)| value[..10].to_owned())
            .unwrap_or_default();

        let prices = self
            .published
            .lock()
            .expect("fixture lock")
            .get(&(region, date.clone()))
            .cloned()
            .unwrap_or_default();

        // Upstream pages are newest first.
        let results: Vec<_> = day_slots(&date, &prices)
            .into_iter()
            .rev()
            .map(|slot| {
                serde_json::json!({
                    "value_exc_vat": slot.value_inc_vat / 1.05,
                    "value_inc_vat": slot.value_inc_vat,
                    "valid_from": slot.valid_from.format_rfc3339(),
                    "valid_to": slot.valid_to.format_rfc3339(),
                    "payment_method": null,
                })
            })
            .collect();

        Ok(HttpResponse::ok_json(
            serde_json::json!({ "count": results.len(), "next": null, "previous": null, "results": results })
                .to_string(),
        ))
    }
}

impl HttpClient for FakeTariffApi {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let latency = *self.latency.lock().expect("fixture lock");
        Box::pin(async move {
            self.requests
                .lock()
                .expect("fixture lock")
                .push(request.clone());
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.respond(&request)
        })
    }
}

/// Defaults with a short retry unit so paused-clock tests stay quick to read.
pub fn test_config() -> AgileConfig {
    AgileConfig {
        retry_base_delay_ms: 10,
        ..AgileConfig::default()
    }
}

/// Fully wired acquisition stack over in-memory fakes.
pub struct Harness {
    pub api: Arc<FakeTariffApi>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub network: Arc<NetworkStatus>,
    pub orchestrator: Arc<AcquisitionOrchestrator>,
}

impl Harness {
    pub fn new(now: &str) -> Self {
        Self::with_store(now, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(now: &str, store: Arc<MemoryStore>) -> Self {
        let config = test_config();
        let api = FakeTariffApi::new(StdDuration::from_millis(50));
        let clock = Arc::new(ManualClock::new(ts(now)));
        let network = Arc::new(NetworkStatus::default());

        let repository = RateRepository::new(api.clone(), &config);
        let cache = RateCache::new(store.clone(), clock.clone(), &config);
        let orchestrator = Arc::new(AcquisitionOrchestrator::new(
            repository,
            cache,
            clock.clone(),
            network.clone(),
        ));

        Self {
            api,
            clock,
            store,
            network,
            orchestrator,
        }
    }
}
