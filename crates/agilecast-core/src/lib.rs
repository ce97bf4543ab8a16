//! Core contracts for agilecast.
//!
//! This crate contains:
//! - Canonical tariff domain models and validation
//! - The retrying rate repository over an injectable HTTP client
//! - The namespaced rate cache with TTL, sweep and offline fallback
//! - Pure price analysis (categories, statistics, rankings, delay advice)
//! - The acquisition orchestrator and the user-facing session
//!
//! ```text
//!   AgileSession ──► AcquisitionOrchestrator ──► RateCache ──► KeyValueStore
//!        │                      │
//!        ▼                      ▼
//!     analyzer            RateRepository ──► HttpClient
//! ```

pub mod analyzer;
pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod orchestrator;
pub mod repository;
pub mod retry;
pub mod session;
pub mod store;

pub use analyzer::{
    AnalysisResult, AnnotatedSlot, CurrentSlot, CurrentSlotStatus, DelayAdvice,
    DelayRecommendation, PriceCategory, RateStatistics,
};
pub use cache::{CacheLookup, CacheStats, RateCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AgileConfig;
pub use domain::{DailyRateSet, DevicePreset, LoadDuration, PriceSlot, Region, UtcDateTime, SLOTS_PER_DAY};
pub use error::{
    AcquisitionError, AnalysisError, CacheError, ConfigError, FetchError, SessionError,
    StoreError, ValidationError,
};
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use orchestrator::{
    AcquisitionOrchestrator, LoadOutcome, LoadRequest, LoadedRates, NetworkStatus, RateSource,
};
pub use repository::RateRepository;
pub use retry::{Backoff, RetryConfig};
pub use session::{AgileSession, Dashboard, REGION_PREFERENCE_KEY};
pub use store::{KeyValueStore, MemoryStore};
