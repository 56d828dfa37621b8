//! DistributorClient: outbound search by keyword and by MPN,
//! rate-limit aware with bounded retry, delegating to `DistributorCache`.

use crate::cache::DistributorCache;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::errors::DistributorError;
use crate::rate_limiter::{OutboundThrottle, RetrySchedule, SharedThrottle};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Parts extracted from a cached or freshly-fetched raw response body.
fn parts_from_body(body: &str) -> Vec<WirePart> {
    serde_json::from_str::<SearchResponse>(body)
        .ok()
        .and_then(|r| r.search_results)
        .and_then(|r| r.parts)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartRecord {
    pub distributor_part_number: String,
    pub manufacturer_part_number: String,
    pub manufacturer_name: Option<String>,
    pub description: Option<String>,
    pub datasheet_url: Option<String>,
    pub price: Option<Decimal>,
    pub availability: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchByKeywordRequest<'a> {
    #[serde(rename = "SearchByKeywordRequest")]
    inner: SearchByKeywordRequestInner<'a>,
}

#[derive(Debug, Serialize)]
struct SearchByKeywordRequestInner<'a> {
    keyword: &'a str,
    records: u32,
    #[serde(rename = "startingRecord")]
    starting_record: u32,
    #[serde(rename = "searchOptions")]
    search_options: Option<String>,
    #[serde(rename = "searchWithYourSignUpLanguage")]
    search_with_your_sign_up_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "SearchResults")]
    search_results: Option<SearchResults>,
    #[serde(rename = "Errors")]
    errors: Option<Vec<WireError>>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(rename = "Parts")]
    parts: Option<Vec<WirePart>>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    #[serde(rename = "MouserPartNumber")]
    mouser_part_number: Option<String>,
    #[serde(rename = "ManufacturerPartNumber")]
    manufacturer_part_number: Option<String>,
    #[serde(rename = "Manufacturer")]
    manufacturer: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "DataSheetUrl")]
    datasheet_url: Option<String>,
    #[serde(rename = "PriceBreaks", default)]
    price_breaks: Vec<WirePriceBreak>,
    #[serde(rename = "AvailabilityInStock")]
    availability_in_stock: Option<String>,
    #[serde(rename = "LeadTime")]
    lead_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePriceBreak {
    #[serde(rename = "Quantity")]
    quantity: i64,
    #[serde(rename = "Price")]
    price: String,
}

/// Parses a single wire-format part into the canonical field set
/// (the normalization table).
fn normalize(part: WirePart) -> Option<PartRecord> {
    let distributor_part_number = part.mouser_part_number?;
    let manufacturer_part_number = part.manufacturer_part_number.unwrap_or_default();

    let price = part
        .price_breaks
        .iter()
        .min_by_key(|b| b.quantity)
        .and_then(|b| {
            let stripped: String = b
                .price
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            Decimal::from_str(&stripped).ok()
        });

    let in_stock = part
        .availability_in_stock
        .as_deref()
        .map(|s| s.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
        .and_then(|digits| digits.parse::<i64>().ok())
        .unwrap_or(0);

    let availability = if in_stock > 0 {
        Some("In Stock".to_string())
    } else if let Some(lead_time) = part.lead_time.filter(|s| !s.is_empty()) {
        Some(format!("Lead Time: {lead_time}"))
    } else {
        Some("Unknown".to_string())
    };

    Some(PartRecord {
        distributor_part_number,
        manufacturer_part_number,
        manufacturer_name: part.manufacturer,
        description: part.description,
        datasheet_url: part.datasheet_url,
        price,
        availability,
    })
}

#[derive(Clone)]
pub struct DistributorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    cache: DistributorCache,
    throttle: SharedThrottle,
    retry: RetrySchedule,
    circuit: Arc<CircuitBreaker>,
}

impl DistributorClient {
    pub fn new(
        base_url: String,
        api_key: String,
        cache: DistributorCache,
        request_delay: Duration,
        retry_delay: Duration,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("distributor http client"),
            base_url,
            api_key,
            cache,
            throttle: Arc::new(OutboundThrottle::new(request_delay)),
            retry: RetrySchedule::new(max_retries, retry_delay),
            circuit: Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig::default())),
        }
    }

    /// Top `records` keyword search results. Cache-first; writes back to the
    /// cache on a successful remote call.
    pub async fn search_by_keyword(
        &self,
        keyword: &str,
        records: u32,
    ) -> Result<Vec<PartRecord>, DistributorError> {
        if let Some(cached) = self.cache.get_keyword(keyword).await {
            let parts = parts_from_body(&cached);
            return Ok(parts.into_iter().filter_map(normalize).take(records as usize).collect());
        }

        let body = SearchByKeywordRequest {
            inner: SearchByKeywordRequestInner {
                keyword,
                records,
                starting_record: 0,
                search_options: None,
                search_with_your_sign_up_language: None,
            },
        };

        let (raw, parsed) = self.request("/search/keyword", &body).await?;
        self.cache.put_keyword(keyword, raw).await;
        let parts = parsed.search_results.and_then(|r| r.parts).unwrap_or_default();

        Ok(parts.into_iter().filter_map(normalize).take(records as usize).collect())
    }

    /// Expects at most one canonical result.
    pub async fn search_by_mpn(&self, mpn: &str) -> Result<Option<PartRecord>, DistributorError> {
        if let Some(cached) = self.cache.get_mpn(mpn).await {
            let parts = parts_from_body(&cached);
            return Ok(parts.into_iter().next().and_then(normalize));
        }

        let body = SearchByKeywordRequest {
            inner: SearchByKeywordRequestInner {
                keyword: mpn,
                records: 1,
                starting_record: 0,
                search_options: None,
                search_with_your_sign_up_language: None,
            },
        };

        let (raw, parsed) = self.request("/search/keyword", &body).await?;
        self.cache.put_mpn(mpn, raw).await;
        let parts = parsed.search_results.and_then(|r| r.parts).unwrap_or_default();

        Ok(parts.into_iter().next().and_then(normalize))
    }

    /// Waits `request_delay` before the first attempt and before every
    /// retry; retries up to
    /// `max_retries` on transport errors or HTTP 429; any other non-2xx
    /// fails immediately; an application-level `Errors` block is a
    /// non-retriable failure. Returns the raw body alongside the parsed
    /// response so callers can cache the opaque payload verbatim.
    async fn request(
        &self,
        path: &str,
        body: &SearchByKeywordRequest<'_>,
    ) -> Result<(String, SearchResponse), DistributorError> {
        let url = format!("{}{}?apiKey={}", self.base_url, path, self.api_key);
        let mut attempts = 0u32;
        let mut last_error = String::new();

        loop {
            self.throttle.wait_turn().await;

            let outcome = self
                .circuit
                .call_async(|| async { self.http.post(&url).json(body).send().await })
                .await;

            let response = match outcome {
                Ok(resp) => resp,
                Err(CircuitBreakerError::CircuitOpen) => {
                    return Err(DistributorError::Exhausted(
                        "distributor circuit breaker is open".to_string(),
                    ));
                }
                Err(CircuitBreakerError::ServiceFailure(msg)) => {
                    attempts += 1;
                    last_error = msg;
                    if attempts >= self.retry.max_retries {
                        return Err(DistributorError::Exhausted(last_error));
                    }
                    warn!(attempt = attempts, error = %last_error, "distributor request failed, retrying");
                    self.retry.delay_before_retry().await;
                    continue;
                }
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                attempts += 1;
                last_error = "429 Too Many Requests".to_string();
                if attempts >= self.retry.max_retries {
                    return Err(DistributorError::Exhausted(last_error));
                }
                warn!(attempt = attempts, "distributor rate limited, retrying");
                self.retry.delay_before_retry().await;
                continue;
            }

            if !response.status().is_success() {
                return Err(DistributorError::NonRetriable(response.status().as_u16()));
            }

            let raw = response
                .text()
                .await
                .map_err(|e| DistributorError::Exhausted(e.to_string()))?;

            let parsed: SearchResponse = serde_json::from_str(&raw)
                .map_err(|e| DistributorError::Exhausted(e.to_string()))?;

            if let Some(errors) = &parsed.errors {
                if !errors.is_empty() {
                    let message = errors
                        .iter()
                        .filter_map(|e| e.message.clone())
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(DistributorError::ApiError(message));
                }
            }

            debug!(path, attempts, "distributor request succeeded");
            return Ok((raw, parsed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(mouser_pn: &str, mpn: &str, stock: &str, qty: i64, price: &str) -> WirePart {
        WirePart {
            mouser_part_number: Some(mouser_pn.to_string()),
            manufacturer_part_number: Some(mpn.to_string()),
            manufacturer: Some("Yageo".to_string()),
            description: Some("10k resistor".to_string()),
            datasheet_url: None,
            price_breaks: vec![WirePriceBreak { quantity: qty, price: price.to_string() }],
            availability_in_stock: Some(stock.to_string()),
            lead_time: None,
        }
    }

    #[test]
    fn normalize_picks_lowest_quantity_price_break_and_strips_currency() {
        let mut p = part("71-RC0805-1", "RC0805FR-0710KL", "1000", 1, "$0.10");
        p.price_breaks.push(WirePriceBreak { quantity: 100, price: "$0.05".into() });
        let record = normalize(p).unwrap();
        assert_eq!(record.price, Some(Decimal::from_str("0.10").unwrap()));
    }

    #[test]
    fn normalize_reports_in_stock_when_stock_positive() {
        let record = normalize(part("71-RC0805-1", "MPN", "500", 1, "$0.01")).unwrap();
        assert_eq!(record.availability.as_deref(), Some("In Stock"));
    }

    #[test]
    fn normalize_reports_lead_time_when_out_of_stock() {
        let mut p = part("71-RC0805-1", "MPN", "0", 1, "$0.01");
        p.lead_time = Some("8 Weeks".to_string());
        let record = normalize(p).unwrap();
        assert_eq!(record.availability.as_deref(), Some("Lead Time: 8 Weeks"));
    }

    #[test]
    fn normalize_reports_unknown_when_neither_is_present() {
        let record = normalize(part("71-RC0805-1", "MPN", "0", 1, "$0.01")).unwrap();
        assert_eq!(record.availability.as_deref(), Some("Unknown"));
    }

    #[test]
    fn normalize_drops_parts_without_a_distributor_part_number() {
        let mut p = part("unused", "MPN", "0", 1, "$0.01");
        p.mouser_part_number = None;
        assert!(normalize(p).is_none());
    }
}
