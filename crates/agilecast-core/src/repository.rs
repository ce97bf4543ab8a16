//! Network access to a day's published unit rates.
//!
//! The repository owns the retry loop and nothing else: it never reads or
//! writes the cache and never decides whether cached data is fresh enough.

use std::sync::Arc;

use serde::Deserialize;
use time::Date;

use crate::config::AgileConfig;
use crate::error::FetchError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::retry::RetryConfig;
use crate::{DailyRateSet, PriceSlot, Region, UtcDateTime, SLOTS_PER_DAY};

/// Fetches half-hourly unit rates for one region and UTC calendar day.
#[derive(Clone)]
pub struct RateRepository {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    product_code: String,
    request_timeout_ms: u64,
    retry: RetryConfig,
}

impl RateRepository {
    pub fn new(http_client: Arc<dyn HttpClient>, config: &AgileConfig) -> Self {
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            product_code: config.product_code.clone(),
            request_timeout_ms: config.request_timeout_ms,
            retry: config.retry_config(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Tariff code of the single-register electricity tariff for `region`.
    pub fn tariff_code(&self, region: Region) -> String {
        format!("E-1R-{}-{}", self.product_code, region.code())
    }

    /// Request covering `[00:00:00.000, 23:59:59.999]` UTC of `date`.
    pub fn build_request(&self, region: Region, date: Date) -> HttpRequest {
        let url = format!(
            "{}/products/{}/electricity-tariffs/{}/standard-unit-rates/",
            self.base_url,
            self.product_code,
            self.tariff_code(region)
        );

        HttpRequest::get(url)
            .with_query("period_from", UtcDateTime::start_of_day(date).format_rfc3339())
            .with_query("period_to", UtcDateTime::end_of_day(date).format_rfc3339())
            .with_query("page_size", SLOTS_PER_DAY.to_string())
            .with_header("accept", "application/json")
            .with_timeout_ms(self.request_timeout_ms)
    }

    /// Fetch a day's slots, retrying transient failures with linear backoff.
    ///
    /// An unpublished day yields an empty set, not an error.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Format`] as soon as a body cannot be parsed
    /// - [`FetchError::Upstream`] for a non-transient status
    /// - [`FetchError::RetriesExhausted`] once every attempt failed transiently
    pub async fn fetch_day(&self, region: Region, date: Date) -> Result<DailyRateSet, FetchError> {
        let request = self.build_request(region, date);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            tracing::debug!(
                url = %request.full_url(),
                attempt,
                max_attempts,
                "requesting unit rates"
            );

            let failure = match self.attempt(request.clone()).await {
                Ok(rates) => {
                    tracing::info!(
                        region = %region,
                        %date,
                        slots = rates.len(),
                        attempt,
                        "fetched unit rates"
                    );
                    return Ok(rates);
                }
                Err(failure) => failure,
            };

            tracing::warn!(
                region = %region,
                %date,
                attempt,
                transient = failure.transient,
                error = %failure.error,
                "rate request attempt failed"
            );

            if !failure.transient {
                return Err(failure.error);
            }

            if attempt >= max_attempts {
                return Err(FetchError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(failure.error),
                });
            }

            let delay = self.retry.delay_after_attempt(attempt);
            tracing::debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, request: HttpRequest) -> Result<DailyRateSet, AttemptFailure> {
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| AttemptFailure {
                transient: error.retryable(),
                error: FetchError::Network(error.message().to_owned()),
            })?;

        if !response.is_success() {
            return Err(AttemptFailure {
                transient: self.retry.should_retry_status(response.status),
                error: FetchError::Upstream {
                    status: response.status,
                    body: response.body,
                },
            });
        }

        parse_rates(&response).map_err(|error| AttemptFailure {
            transient: false,
            error,
        })
    }
}

struct AttemptFailure {
    error: FetchError,
    transient: bool,
}

#[derive(Deserialize)]
struct RatesPage {
    results: Vec<PriceSlot>,
}

fn parse_rates(response: &HttpResponse) -> Result<DailyRateSet, FetchError> {
    let page: RatesPage = serde_json::from_str(&response.body)
        .map_err(|error| FetchError::Format(error.to_string()))?;
    Ok(DailyRateSet::new(page.results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpError;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedHttpClient {
        responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttpClient {
        fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().expect("request store should not be poisoned").len()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self
                .responses
                .lock()
                .expect("response script should not be poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(HttpError::new("script exhausted")));
            Box::pin(async move { response })
        }
    }

    fn repository(client: Arc<ScriptedHttpClient>) -> RateRepository {
        RateRepository::new(client, &AgileConfig::default())
            .with_retry(RetryConfig::linear(Duration::from_secs(1), 3))
    }

    fn date() -> Date {
        UtcDateTime::parse("2024-01-15T09:00:00Z").expect("valid").date()
    }

    const TWO_SLOTS: &str = r#"{"count": 2, "next": null, "results": [
        {"value_exc_vat": 20.0, "value_inc_vat": 21.0,
         "valid_from": "2024-01-15T00:30:00Z", "valid_to": "2024-01-15T01:00:00Z"},
        {"value_exc_vat": 19.0, "value_inc_vat": 19.95,
         "valid_from": "2024-01-15T00:00:00Z", "valid_to": "2024-01-15T00:30:00Z"}
    ]}"#;

    #[test]
    fn request_targets_whole_utc_day_for_region() {
        let client = Arc::new(ScriptedHttpClient::new(Vec::new()));
        let request = repository(client).build_request(Region::C, date());

        assert_eq!(
            request.url,
            "https://api.octopus.energy/v1/products/AGILE-24-10-01/electricity-tariffs/E-1R-AGILE-24-10-01-C/standard-unit-rates/"
        );
        assert_eq!(
            request.query,
            vec![
                (String::from("period_from"), String::from("2024-01-15T00:00:00Z")),
                (String::from("period_to"), String::from("2024-01-15T23:59:59.999Z")),
                (String::from("page_size"), String::from("48")),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn parses_and_orders_slots() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(TWO_SLOTS))]));

        let rates = repository(client.clone())
            .fetch_day(Region::C, date())
            .await
            .expect("fetch should succeed");

        assert_eq!(rates.len(), 2);
        assert_eq!(rates.slots()[0].value_inc_vat, 19.95);
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unpublished_day_returns_empty_set() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(
            r#"{"count": 0, "results": []}"#,
        ))]));

        let rates = repository(client)
            .fetch_day(Region::C, date())
            .await
            .expect("empty day is not an error");
        assert!(rates.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_with_linear_backoff() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Err(HttpError::new("connection reset")),
            Ok(HttpResponse::with_status(503, "maintenance")),
            Ok(HttpResponse::ok_json(TWO_SLOTS)),
        ]));
        let started = tokio::time::Instant::now();

        let rates = repository(client.clone())
            .fetch_day(Region::C, date())
            .await
            .expect("third attempt succeeds");

        assert_eq!(rates.len(), 2);
        assert_eq!(client.request_count(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_reports_count_and_last_reason() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Err(HttpError::new("dns failure")),
            Err(HttpError::new("dns failure")),
            Err(HttpError::new("connection refused")),
        ]));

        let error = repository(client.clone())
            .fetch_day(Region::C, date())
            .await
            .expect_err("all attempts fail");

        assert_eq!(client.request_count(), 3);
        match error {
            FetchError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(*last, FetchError::Network(String::from("connection refused")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_fails_without_retry() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Ok(HttpResponse::ok_json(r#"{"detail": "oops"}"#)),
            Ok(HttpResponse::ok_json(TWO_SLOTS)),
        ]));

        let error = repository(client.clone())
            .fetch_day(Region::C, date())
            .await
            .expect_err("format errors are final");

        assert!(matches!(error, FetchError::Format(_)));
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_status_fails_without_retry() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse::with_status(
            404,
            "Not found.",
        ))]));

        let error = repository(client.clone())
            .fetch_day(Region::C, date())
            .await
            .expect_err("404 is final");

        assert_eq!(
            error,
            FetchError::Upstream {
                status: 404,
                body: String::from("Not found."),
            }
        );
        assert_eq!(client.request_count(), 1);
    }
}
