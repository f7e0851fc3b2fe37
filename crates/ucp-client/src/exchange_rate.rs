//! # Exchange Rate Service
//!
//! Daily FX rates from the Korea Eximbank open API, cached in a single file
//! slot that holds the most recently fetched day.
//!
//! The API publishes nothing on weekends and holidays, so when the requested
//! date has no data the service walks back one calendar day at a time, up to
//! the lookback limit. Any other failure stops the walk. If nothing is found
//! the cached slot is served regardless of its date, marked stale.

use crate::config::UcpConfig;
use crate::http::{build_client, ensure_success, transport_error};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use ucp_core::fx::{format_date, korea_today};
use ucp_core::{
    CacheStore, CustomsCategory, CustomsEstimate, FxMeta, FxRateTable, QuoteLabel, RateQuote,
    UcpError, UcpResult,
};

/// Cache key of the single rate slot
pub const RATES_CACHE_KEY: &str = "exchange_rates";

/// A provider of daily rate tables
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Short identifier reported in [`FxMeta::source`]
    fn name(&self) -> &str;

    /// Rates published for `date`. Must return [`UcpError::NoRateData`] when
    /// the source simply has nothing for that day.
    async fn fetch_rates(&self, date: NaiveDate) -> UcpResult<FxRateTable>;
}

/// Korea Eximbank `exchangeJSON` endpoint (`data=AP01`)
pub struct KoreaEximSource {
    client: Client,
    api_url: String,
    auth_key: String,
    timeout: Duration,
}

impl KoreaEximSource {
    pub const NAME: &'static str = "koreaexim";

    pub fn new(api_url: impl Into<String>, auth_key: impl Into<String>, timeout: Duration) -> UcpResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_url: api_url.into(),
            auth_key: auth_key.into(),
            timeout,
        })
    }

    pub fn from_config(config: &UcpConfig) -> UcpResult<Self> {
        let key = config.require_exim_key()?;
        Self::new(config.exim_api_url.clone(), key, config.fx_timeout())
    }
}

#[async_trait]
impl RateSource for KoreaEximSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_rates(&self, date: NaiveDate) -> UcpResult<FxRateTable> {
        let search_date = format_date(date);
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("authkey", self.auth_key.as_str()),
                ("searchdate", search_date.as_str()),
                ("data", "AP01"),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let body = ensure_success(response)?
            .text()
            .await
            .map_err(transport_error)?;
        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| UcpError::RateSource(format!("invalid JSON: {}", e)))?;

        let Value::Array(rows) = payload else {
            return Err(UcpError::RateSource("unexpected response format".to_string()));
        };

        // An error comes back as a single row carrying only `result`
        if let Some(first) = rows.first() {
            let has_unit = first.get("cur_unit").is_some() || first.get("CUR_UNIT").is_some();
            if let (Some(result), false) = (first.get("result"), has_unit) {
                return Err(UcpError::RateSource(format!("API error result: {}", result)));
            }
        }

        let table = FxRateTable::from_rows(&rows);
        if table.is_empty() {
            return Err(UcpError::NoRateData { date: search_date });
        }
        Ok(table.with_base_default())
    }
}

/// Contents of the cache slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSlot {
    /// `YYYYMMDD` the rates were published for
    pub date: String,
    pub rates: FxRateTable,
}

/// Rate table (if any could be found) and how it was obtained
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRates {
    pub rates: Option<FxRateTable>,
    pub meta: FxMeta,
}

impl DailyRates {
    pub fn label(&self) -> QuoteLabel {
        QuoteLabel::from_meta(&self.meta)
    }
}

pub struct ExchangeRateService<S> {
    source: S,
    cache: CacheStore,
    lookback_days: u32,
}

impl ExchangeRateService<KoreaEximSource> {
    /// Service backed by the Korea Eximbank API; requires an API key
    pub fn from_config(config: &UcpConfig) -> UcpResult<Self> {
        Ok(Self::new(
            KoreaEximSource::from_config(config)?,
            config.cache_store(),
            config.fx_lookback_days,
        ))
    }
}

impl<S: RateSource> ExchangeRateService<S> {
    pub fn new(source: S, cache: CacheStore, lookback_days: u32) -> Self {
        Self {
            source,
            cache,
            lookback_days,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Rates for `requested` (default: today in KST) with the configured lookback
    pub async fn daily_rates(&self, requested: Option<NaiveDate>) -> DailyRates {
        self.get_daily_rates(requested, self.lookback_days).await
    }

    /// Rates for `requested`, walking back up to `lookback_days` days past
    /// dates with no published data. Never fails; problems land in `meta.error`.
    #[instrument(skip(self))]
    pub async fn get_daily_rates(&self, requested: Option<NaiveDate>, lookback_days: u32) -> DailyRates {
        let requested = requested.unwrap_or_else(korea_today);
        let requested_str = format_date(requested);
        let mut meta = FxMeta::new(requested, self.source.name());

        let cached = self
            .cache
            .get::<RateSlot>(RATES_CACHE_KEY)
            .map(|entry| entry.payload)
            .filter(|slot| !slot.rates.is_empty());

        if let Some(slot) = cached.as_ref().filter(|slot| slot.date == requested_str) {
            debug!(date = %requested_str, "Exchange rates served from cache");
            meta.cached = true;
            return DailyRates {
                rates: Some(slot.rates.clone()),
                meta,
            };
        }

        let mut last_error: Option<String> = None;

        for offset in 0..=lookback_days {
            let Some(candidate) = requested.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };
            let candidate_str = format_date(candidate);

            if let Some(slot) = cached.as_ref().filter(|slot| slot.date == candidate_str) {
                debug!(date = %candidate_str, "Exchange rates for earlier date served from cache");
                meta.cached = true;
                meta.resolve_to(&candidate_str);
                return DailyRates {
                    rates: Some(slot.rates.clone()),
                    meta,
                };
            }

            match self.source.fetch_rates(candidate).await {
                Ok(rates) => {
                    let slot = RateSlot {
                        date: candidate_str.clone(),
                        rates,
                    };
                    if let Err(e) = self.cache.put(RATES_CACHE_KEY, &slot, self.source.name()) {
                        warn!("Failed to cache exchange rates for {}: {}", candidate_str, e);
                    }
                    info!("Fetched {} exchange rates for {}", slot.rates.len(), candidate_str);
                    meta.resolve_to(&candidate_str);
                    return DailyRates {
                        rates: Some(slot.rates),
                        meta,
                    };
                }
                Err(e) => {
                    let keep_walking = e.is_no_rate_data();
                    debug!(date = %candidate_str, "Exchange rate fetch failed: {}", e);
                    last_error = Some(e.to_string());
                    if !keep_walking {
                        warn!("Exchange rate lookup aborted at {}: {}", candidate_str, e);
                        break;
                    }
                }
            }
        }

        meta.error = last_error;

        match cached {
            Some(slot) => {
                warn!(date = %slot.date, "Serving stale exchange rates");
                meta.cached = true;
                meta.stale = true;
                meta.resolve_to(&slot.date);
                DailyRates {
                    rates: Some(slot.rates),
                    meta,
                }
            }
            None => DailyRates { rates: None, meta },
        }
    }

    /// Units of `to` per one `from`, labelled with the freshness of the data
    pub async fn quote(&self, from: &str, to: &str, date: Option<NaiveDate>) -> UcpResult<RateQuote> {
        let daily = self.daily_rates(date).await;
        let label = daily.label();

        let Some(rates) = daily.rates else {
            return Err(UcpError::RateSource(
                daily
                    .meta
                    .error
                    .unwrap_or_else(|| "no exchange rates available".to_string()),
            ));
        };

        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();
        let rate = rates.compute_rate(&from, &to).ok_or_else(|| {
            UcpError::Validation(format!("no rate available for {} to {}", from, to))
        })?;

        Ok(RateQuote {
            rate,
            from,
            to,
            date: daily.meta.resolved_date,
            label,
        })
    }

    /// Duty and VAT for a USD purchase. Without an explicit `usd_krw` rate
    /// the daily USD to KRW quote is used.
    #[instrument(skip(self))]
    pub async fn customs_estimate(
        &self,
        price_usd: f64,
        shipping_usd: f64,
        category: CustomsCategory,
        usd_krw: Option<f64>,
        date: Option<NaiveDate>,
    ) -> UcpResult<CustomsEstimate> {
        let rate = match usd_krw {
            Some(rate) => rate,
            None => self.quote("USD", "KRW", date).await?.rate,
        };
        CustomsEstimate::calculate(price_usd, shipping_usd, category, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use temp_dir::TempDir;
    use ucp_core::fx::parse_date;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Serves fixed tables per date and counts probes
    #[derive(Default)]
    struct FakeSource {
        tables: HashMap<String, FxRateTable>,
        unreachable: bool,
        calls: AtomicU32,
    }

    impl FakeSource {
        fn with_table(mut self, date: &str, table: FxRateTable) -> Self {
            self.tables.insert(date.to_string(), table);
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch_rates(&self, date: NaiveDate) -> UcpResult<FxRateTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unreachable {
                return Err(UcpError::transport("connection refused"));
            }
            let key = format_date(date);
            self.tables
                .get(&key)
                .cloned()
                .ok_or(UcpError::NoRateData { date: key })
        }
    }

    fn table(usd: f64) -> FxRateTable {
        [("USD".to_string(), usd), ("JPY".to_string(), 9.0), ("KRW".to_string(), 1.0)]
            .into_iter()
            .collect()
    }

    fn date(text: &str) -> NaiveDate {
        parse_date(text).unwrap()
    }

    fn service(dir: &TempDir, source: FakeSource) -> ExchangeRateService<FakeSource> {
        ExchangeRateService::new(source, CacheStore::new(dir.path()), 7)
    }

    fn seed(service: &ExchangeRateService<FakeSource>, day: &str, rates: FxRateTable) {
        let slot = RateSlot {
            date: day.to_string(),
            rates,
        };
        service.cache.put(RATES_CACHE_KEY, &slot, "seed").unwrap();
    }

    #[tokio::test]
    async fn test_exact_cache_hit_skips_network() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, FakeSource::default());
        seed(&service, "20250106", table(1400.0));

        let daily = service.get_daily_rates(Some(date("20250106")), 7).await;

        assert_eq!(service.source().calls(), 0);
        assert!(daily.meta.cached);
        assert!(!daily.meta.stale);
        assert_eq!(daily.rates.unwrap().get("USD"), Some(1400.0));
        assert_eq!(daily.meta.lookback_days, None);
    }

    #[tokio::test]
    async fn test_walks_back_over_weekend() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource::default().with_table("20250103", table(1470.0));
        let service = service(&dir, source);

        // 2025-01-05 is a Sunday
        let daily = service.get_daily_rates(Some(date("20250105")), 7).await;

        assert_eq!(service.source().calls(), 3);
        assert_eq!(daily.meta.requested_date, "20250105");
        assert_eq!(daily.meta.resolved_date, "20250103");
        assert_eq!(daily.meta.lookback_days, Some(2));
        assert!(!daily.meta.cached);
        assert_eq!(daily.label(), QuoteLabel::LatestBusinessDay("20250103".to_string()));

        // The slot now holds the resolved day
        let slot = service.cache.get::<RateSlot>(RATES_CACHE_KEY).unwrap();
        assert_eq!(slot.payload.date, "20250103");
        assert_eq!(slot.source, "fake");
    }

    #[tokio::test]
    async fn test_lookback_probes_are_bounded_then_stale() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, FakeSource::default());
        seed(&service, "20241220", table(1450.0));

        let daily = service.get_daily_rates(Some(date("20250105")), 3).await;

        assert_eq!(service.source().calls(), 4);
        assert!(daily.meta.cached);
        assert!(daily.meta.stale);
        assert_eq!(daily.meta.resolved_date, "20241220");
        assert_eq!(daily.meta.lookback_days, Some(16));
        assert!(daily.meta.error.as_deref().unwrap().contains("No rate data"));
        assert_eq!(daily.rates.unwrap().get("USD"), Some(1450.0));
    }

    #[tokio::test]
    async fn test_transport_failure_stops_walk() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            unreachable: true,
            ..Default::default()
        };
        let service = service(&dir, source);

        let daily = service.get_daily_rates(Some(date("20250105")), 7).await;

        assert_eq!(service.source().calls(), 1);
        assert!(daily.rates.is_none());
        assert!(daily.meta.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_walk_uses_cache_for_earlier_date() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, FakeSource::default());
        seed(&service, "20250103", table(1465.0));

        let daily = service.get_daily_rates(Some(date("20250105")), 7).await;

        // 05 and 04 probed, 03 served from the slot
        assert_eq!(service.source().calls(), 2);
        assert!(daily.meta.cached);
        assert!(!daily.meta.stale);
        assert_eq!(daily.meta.lookback_days, Some(2));
    }

    #[tokio::test]
    async fn test_quote() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource::default().with_table("20250106", table(1350.0));
        let service = service(&dir, source);
        let day = Some(date("20250106"));

        let quote = service.quote("usd", "krw", day).await.unwrap();
        assert_eq!(quote.rate, 1350.0);
        assert_eq!(quote.from, "USD");
        assert_eq!(quote.formatted(), "1,350.0");
        assert_eq!(quote.label, QuoteLabel::Live);

        let quote = service.quote("USD", "JPY", day).await.unwrap();
        assert_eq!(quote.formatted(), "150.00");
        assert_eq!(quote.label, QuoteLabel::Cached);

        let err = service.quote("USD", "CHF", day).await.unwrap_err();
        assert!(matches!(err, UcpError::Validation(_)));
    }

    #[tokio::test]
    async fn test_customs_estimate_uses_daily_quote() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource::default().with_table("20250106", table(1000.0));
        let service = service(&dir, source);
        let day = Some(date("20250106"));

        let estimate = service
            .customs_estimate(190.0, 15.0, CustomsCategory::General, None, day)
            .await
            .unwrap();
        assert_eq!(estimate.exchange_rate, 1000.0);
        assert!(!estimate.duty_free);
        assert!((estimate.duty_krw - 16_400.0).abs() < 1e-6);

        let estimate = service
            .customs_estimate(190.0, 15.0, CustomsCategory::Footwear, Some(1000.0), day)
            .await
            .unwrap();
        assert!(!estimate.duty_free);
        assert_eq!(service.source().calls(), 1);

        let estimate = service
            .customs_estimate(190.0, 10.0, CustomsCategory::Footwear, None, day)
            .await
            .unwrap();
        assert!(estimate.duty_free);
    }

    #[tokio::test]
    async fn test_customs_estimate_without_rates() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            unreachable: true,
            ..FakeSource::default()
        };
        let err = service(&dir, source)
            .customs_estimate(100.0, 0.0, CustomsCategory::General, None, Some(date("20250106")))
            .await
            .unwrap_err();
        assert!(matches!(err, UcpError::RateSource(_)));
    }

    fn exim(server: &MockServer) -> KoreaEximSource {
        KoreaEximSource::new(format!("{}/exchangeJSON", server.uri()), "test-key", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_exim_source_parses_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exchangeJSON"))
            .and(query_param("authkey", "test-key"))
            .and(query_param("searchdate", "20250106"))
            .and(query_param("data", "AP01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"result": 1, "cur_unit": "USD", "deal_bas_r": "1,470.5"},
                {"result": 1, "cur_unit": "JPY(100)", "deal_bas_r": "935"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let rates = exim(&server).fetch_rates(date("20250106")).await.unwrap();
        assert_eq!(rates.get("USD"), Some(1470.5));
        assert_eq!(rates.get("JPY"), Some(9.35));
        assert_eq!(rates.get("KRW"), Some(1.0));
    }

    #[tokio::test]
    async fn test_exim_source_error_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("searchdate", "20250104"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("searchdate", "20250105"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"result": 4}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("searchdate", "20250106"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": 3})))
            .mount(&server)
            .await;

        let source = exim(&server);
        let empty = source.fetch_rates(date("20250104")).await.unwrap_err();
        assert!(empty.is_no_rate_data());

        let api_error = source.fetch_rates(date("20250105")).await.unwrap_err();
        assert!(matches!(api_error, UcpError::RateSource(ref m) if m.contains("4")));

        let not_array = source.fetch_rates(date("20250106")).await.unwrap_err();
        assert!(matches!(not_array, UcpError::RateSource(_)));
    }
}
