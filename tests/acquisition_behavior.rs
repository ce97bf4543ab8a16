//! Behaviour tests for rate acquisition.
//!
//! These tests verify HOW rates reach the user: from the cache, from the
//! network, from the previous day, from a stale fallback, or not at all.

use std::time::Duration as StdDuration;

use agilecast_core::{
    AcquisitionError, FetchError, LoadRequest, RateRepository, RateSource, Region,
};
use agilecast_tests::{scenario_a_prices, test_config, ts, Harness};
use time::Duration;

const NOW: &str = "2024-03-10T09:15:00Z";
const TODAY: &str = "2024-03-10";
const YESTERDAY: &str = "2024-03-09";

// =============================================================================
// Happy path and cache reuse
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_today_is_published_rates_come_from_the_network_then_the_cache() {
    // Given: today's 48 rates are published for region C
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &scenario_a_prices());

    // When: rates are loaded twice
    let first = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("network load");
    let second = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("cached load");

    // Then: only the first load hit the network and both agree
    assert_eq!(first.source, RateSource::Network);
    assert_eq!(second.source, RateSource::Cache);
    assert!(!second.is_stale);
    assert_eq!(first.rates, second.rates);
    assert!(first.rates.is_complete());
    assert_eq!(harness.api.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn upstream_order_is_normalized_to_chronological() {
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &scenario_a_prices());

    let loaded = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("network load");

    let slots = loaded.rates.slots();
    assert!(slots.windows(2).all(|pair| pair[0].valid_from < pair[1].valid_from));
    assert_eq!(slots[0].valid_from, ts("2024-03-10T00:00:00Z"));
}

#[tokio::test(start_paused = true)]
async fn force_refresh_skips_a_fresh_cache_entry() {
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &[20.0, 21.0]);

    harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("network load");
    let refreshed = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, true))
        .await
        .expect("forced load");

    assert_eq!(refreshed.source, RateSource::Network);
    assert_eq!(harness.api.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn an_entry_older_than_an_hour_is_refetched() {
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &[20.0, 21.0]);
    harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("network load");

    harness.clock.advance(Duration::minutes(61));
    let reloaded = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("reload");

    assert_eq!(reloaded.source, RateSource::Network);
    assert_eq!(harness.api.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn an_entry_exactly_one_hour_old_is_still_fresh() {
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &[20.0, 21.0]);
    harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("network load");

    harness.clock.advance(Duration::hours(1));
    let reloaded = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("reload");

    assert_eq!(reloaded.source, RateSource::Cache);
}

// =============================================================================
// Fallbacks
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_today_is_unpublished_yesterday_is_served_as_stale() {
    let harness = Harness::new("2024-03-10T00:20:00Z");
    harness.api.publish(Region::C, YESTERDAY, &[18.0, 19.0]);

    let loaded = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("previous day");

    assert_eq!(loaded.source, RateSource::PreviousDay);
    assert!(loaded.is_stale);
    assert_eq!(loaded.date().map(|date| date.to_string()).as_deref(), Some(YESTERDAY));

    let requested_days: Vec<String> = harness
        .api
        .requests()
        .iter()
        .map(|request| request.query[0].1[..10].to_owned())
        .collect();
    assert_eq!(requested_days, vec![TODAY, YESTERDAY]);
}

#[tokio::test(start_paused = true)]
async fn when_the_network_fails_three_times_the_reason_is_kept() {
    // Given: every request is refused
    let harness = Harness::new(NOW);
    harness.api.set_failing(true);
    let repository = RateRepository::new(harness.api.clone(), &test_config());

    // When: the repository fetches today
    let error = repository
        .fetch_day(Region::C, ts(NOW).date())
        .await
        .expect_err("every attempt fails");

    // Then: three attempts were made and the transport reason survives
    let FetchError::RetriesExhausted { attempts, last } = &error else {
        panic!("unexpected error: {error:?}");
    };
    assert_eq!(*attempts, 3);
    assert_eq!(**last, FetchError::Network(String::from("connection refused")));
    assert!(error.to_string().contains("connection refused"));
    assert_eq!(harness.api.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn failing_network_with_empty_cache_ends_in_no_data() {
    let harness = Harness::new(NOW);
    harness.api.set_failing(true);

    let error = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect_err("nothing to serve");

    let AcquisitionError::NoDataAvailable { last_failure } = &error;
    assert!(matches!(
        last_failure,
        Some(FetchError::RetriesExhausted { attempts: 3, .. })
    ));
    assert!(error.to_string().contains("check your internet connection"));
}

#[tokio::test(start_paused = true)]
async fn failing_network_falls_back_to_an_expired_entry() {
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &[20.0, 21.0]);
    let fresh = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("network load");

    harness.clock.advance(Duration::hours(3));
    harness.api.set_failing(true);
    let fallback = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("stale fallback");

    assert_eq!(fallback.source, RateSource::OfflineFallback);
    assert!(fallback.is_stale);
    assert_eq!(fallback.rates, fresh.rates);
}

#[tokio::test(start_paused = true)]
async fn offline_loads_never_touch_the_network() {
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &[20.0, 21.0]);
    harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("network load");

    harness.network.set_online(false);
    harness.clock.advance(Duration::hours(2));
    let offline = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, true))
        .await
        .expect("offline fallback");

    assert_eq!(offline.source, RateSource::OfflineFallback);
    assert_eq!(harness.api.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn yesterdays_entry_is_the_offline_fallback_after_midnight() {
    let harness = Harness::new("2024-03-09T22:00:00Z");
    harness.api.publish(Region::C, YESTERDAY, &[18.0, 19.0]);
    harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("network load");

    harness.clock.set(ts("2024-03-10T06:00:00Z"));
    harness.network.set_online(false);
    let offline = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("offline fallback");

    assert_eq!(offline.source, RateSource::OfflineFallback);
    assert_eq!(offline.date().map(|date| date.to_string()).as_deref(), Some(YESTERDAY));
}

// =============================================================================
// Coalescing and isolation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_loads_for_one_region_share_a_single_fetch() {
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &scenario_a_prices());
    let request = LoadRequest::new(Region::C, true);

    let results = load_concurrently(&harness, request, 5).await;

    assert_eq!(harness.api.request_count(), 1);
    let first = results[0].clone().expect("shared result");
    for result in results {
        assert_eq!(result.expect("shared result"), first);
    }
    assert_eq!(harness.orchestrator.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_refresh_pressed_during_a_plain_load_still_reaches_the_network() {
    // Given: fresh rates are cached
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &[20.0, 21.0]);
    harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("network load");

    // When: a plain reload and a forced refresh overlap
    let (plain, forced) = tokio::join!(
        harness.orchestrator.load(LoadRequest::new(Region::C, false)),
        harness.orchestrator.load(LoadRequest::new(Region::C, true)),
    );

    // Then: only the forced refresh fetched again
    assert_eq!(plain.expect("plain load").source, RateSource::Cache);
    assert_eq!(forced.expect("forced load").source, RateSource::Network);
    assert_eq!(harness.api.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn different_regions_do_not_share_fetches_or_cache_entries() {
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &[20.0, 21.0]);
    harness.api.publish(Region::P, TODAY, &[5.0, 6.0]);

    let (london, scotland) = tokio::join!(
        harness.orchestrator.load(LoadRequest::new(Region::C, false)),
        harness.orchestrator.load(LoadRequest::new(Region::P, false)),
    );

    let london = london.expect("region C");
    let scotland = scotland.expect("region P");
    assert_eq!(london.rates.slots()[0].value_inc_vat, 20.0);
    assert_eq!(scotland.rates.slots()[0].value_inc_vat, 5.0);
    assert_eq!(harness.api.request_count(), 2);

    let cache = harness.orchestrator.cache();
    let today = ts(NOW).date();
    assert_ne!(cache.key(Region::C, today), cache.key(Region::P, today));
    assert_eq!(cache.get(Region::P, today), Some(scotland.rates));
}

#[tokio::test(start_paused = true)]
async fn a_caller_that_gives_up_does_not_cancel_the_fetch() {
    let harness = Harness::new(NOW);
    harness.api.publish(Region::C, TODAY, &[20.0, 21.0]);

    let gave_up = tokio::time::timeout(
        StdDuration::from_millis(5),
        harness.orchestrator.load(LoadRequest::new(Region::C, false)),
    )
    .await;
    assert!(gave_up.is_err());

    tokio::time::sleep(StdDuration::from_millis(100)).await;
    let later = harness
        .orchestrator
        .load(LoadRequest::new(Region::C, false))
        .await
        .expect("cached load");

    assert_eq!(later.source, RateSource::Cache);
    assert_eq!(harness.api.request_count(), 1);
}

#[test]
fn unknown_region_codes_are_rejected_before_loading() {
    for code in ["", "I", "O", "Q", "ZZ"] {
        assert!(LoadRequest::parse(code, false).is_err(), "{code:?} accepted");
    }
    assert_eq!(
        LoadRequest::parse(" m ", true).expect("valid").region,
        Region::M
    );
}

async fn load_concurrently(
    harness: &Harness,
    request: LoadRequest,
    count: usize,
) -> Vec<agilecast_core::LoadOutcome> {
    let mut handles = Vec::with_capacity(count);
    for _ in 0..count {
        let orchestrator = harness.orchestrator.clone();
        handles.push(tokio::spawn(async move { orchestrator.load(request).await }));
    }

    let mut results = Vec::with_capacity(count);
    for handle in handles {
        results.push(handle.await.expect("load task"));
    }
    results
}
