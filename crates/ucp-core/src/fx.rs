//! # Exchange Rate Tables
//!
//! Daily FX rates quoted against a common base currency (KRW = 1.0).
//! Source rows may quote per 100 units, e.g. `"JPY(100)"`; stored rates are
//! always per single unit.

use crate::error::{UcpError, UcpResult};
use chrono::{FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const BASE_CURRENCY: &str = "KRW";

/// Wire and cache format for dates: `YYYYMMDD`
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Currency code → rate per single unit, relative to KRW
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FxRateTable(BTreeMap<String, f64>);

impl FxRateTable {
    /// Build a table from raw source rows (`cur_unit`, `deal_bas_r`).
    /// Rows without a usable rate or multiplier are dropped.
    pub fn from_rows(rows: &[Value]) -> Self {
        let mut rates = BTreeMap::new();
        for row in rows {
            let cur_unit = field(row, "cur_unit").and_then(Value::as_str);
            let Some(cur_unit) = cur_unit else {
                continue;
            };
            let Some(raw_rate) = field(row, "deal_bas_r").and_then(parse_rate_value) else {
                continue;
            };
            let (code, unit) = normalize_currency_unit(cur_unit);
            if code.is_empty() || unit <= 0.0 {
                continue;
            }
            let rate = raw_rate / unit;
            if rate > 0.0 {
                rates.insert(code, rate);
            }
        }
        Self(rates)
    }

    /// Insert the base currency if the source left it out
    pub fn with_base_default(mut self) -> Self {
        self.0.entry(BASE_CURRENCY.to_string()).or_insert(1.0);
        self
    }

    pub fn insert(&mut self, code: impl Into<String>, rate: f64) {
        self.0.insert(code.into().trim().to_uppercase(), rate);
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.0.get(&code.trim().to_uppercase()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Units of `to` per one unit of `from`.
    /// Identical codes give 1.0; a missing or non-positive side gives `None`.
    pub fn compute_rate(&self, from: &str, to: &str) -> Option<f64> {
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();
        if from == to {
            return Some(1.0);
        }
        let from_rate = self.0.get(&from).copied()?;
        let to_rate = self.0.get(&to).copied()?;
        if from_rate <= 0.0 || to_rate <= 0.0 {
            return None;
        }
        Some(from_rate / to_rate)
    }
}

impl FromIterator<(String, f64)> for FxRateTable {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut table = Self::default();
        for (code, rate) in iter {
            table.insert(code, rate);
        }
        table
    }
}

// The rate API has been seen answering with upper-case keys
fn field<'a>(row: &'a Value, name: &str) -> Option<&'a Value> {
    row.get(name)
        .or_else(|| row.get(name.to_uppercase().as_str()))
        .filter(|v| !v.is_null())
}

/// Parse `"1,350.5"` style values; empty or `"0"` yields `None`
pub fn parse_rate_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let text = s.trim();
            if text.is_empty() || text == "0" {
                return None;
            }
            text.replace(',', "").parse().ok()
        }
        _ => None,
    }
}

/// Split `"JPY(100)"` into `("JPY", 100.0)`; no multiplier means 1.0
pub fn normalize_currency_unit(cur_unit: &str) -> (String, f64) {
    let base = cur_unit.trim();
    if let (Some(start), true) = (base.find('('), base.ends_with(')')) {
        let unit_text = base[start + 1..base.len() - 1].trim().replace(',', "");
        let unit = unit_text.parse().unwrap_or(1.0);
        return (base[..start].trim().to_uppercase(), unit);
    }
    (base.to_uppercase(), 1.0)
}

/// Today's date in Korea Standard Time, the calendar the rate source publishes in
pub fn korea_today() -> NaiveDate {
    match FixedOffset::east_opt(KST_OFFSET_SECS) {
        Some(kst) => Utc::now().with_timezone(&kst).date_naive(),
        None => Utc::now().date_naive(),
    }
}

const KST_OFFSET_SECS: i32 = 9 * 3600;

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Metadata reported with every rate lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FxMeta {
    pub requested_date: String,
    /// Date of the data actually returned
    pub resolved_date: String,
    pub cached: bool,
    pub stale: bool,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Calendar days between requested and resolved date, when they differ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback_days: Option<i64>,
}

impl FxMeta {
    pub fn new(requested_date: NaiveDate, source: impl Into<String>) -> Self {
        let requested = format_date(requested_date);
        Self {
            requested_date: requested.clone(),
            resolved_date: requested,
            source: source.into(),
            ..Default::default()
        }
    }

    /// Record the date the data came from and the gap to the requested date
    pub fn resolve_to(&mut self, date: &str) {
        self.resolved_date = date.to_string();
        self.lookback_days = match (parse_date(&self.requested_date), parse_date(date)) {
            (Some(requested), Some(resolved)) if requested != resolved => {
                Some((requested - resolved).num_days())
            }
            _ => None,
        };
    }
}

/// How fresh a quoted rate is, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "date", rename_all = "snake_case")]
pub enum QuoteLabel {
    Live,
    Cached,
    /// Most recent business day before the requested date
    LatestBusinessDay(String),
    /// Old cache served because the source was unavailable
    Stale(String),
}

impl QuoteLabel {
    pub fn from_meta(meta: &FxMeta) -> Self {
        if meta.stale {
            QuoteLabel::Stale(meta.resolved_date.clone())
        } else if meta.requested_date != meta.resolved_date {
            QuoteLabel::LatestBusinessDay(meta.resolved_date.clone())
        } else if meta.cached {
            QuoteLabel::Cached
        } else {
            QuoteLabel::Live
        }
    }
}

impl std::fmt::Display for QuoteLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteLabel::Live => write!(f, "daily rate"),
            QuoteLabel::Cached => write!(f, "daily rate (cached)"),
            QuoteLabel::LatestBusinessDay(date) => write!(f, "daily rate (latest business day {})", date),
            QuoteLabel::Stale(date) => write!(f, "daily rate (stale cache {})", date),
        }
    }
}

/// A computed conversion rate with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub rate: f64,
    pub from: String,
    pub to: String,
    pub date: String,
    pub label: QuoteLabel,
}

impl RateQuote {
    /// Rate rendered with precision suited to the target currency
    pub fn formatted(&self) -> String {
        format_rate(self.rate, &self.to)
    }
}

/// KRW gets one decimal, large rates two, everything else four
pub fn format_rate(rate: f64, currency: &str) -> String {
    if currency.trim().eq_ignore_ascii_case(BASE_CURRENCY) {
        format_grouped(rate, 1)
    } else if rate >= 100.0 {
        format_grouped(rate, 2)
    } else {
        format_grouped(rate, 4)
    }
}

/// `value` with `decimals` places and comma-separated thousands, e.g. `1,350.50`
pub fn format_grouped(value: f64, decimals: usize) -> String {
    let digits = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (digits.as_str(), None),
    };

    let mut out = String::with_capacity(digits.len() + int_part.len() / 3 + 1);
    if value.is_sign_negative() && digits.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        out.push('-');
    }
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if let Some(frac_part) = frac_part {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// Korean customs classes. Footwear and apparel have a higher duty-free
/// limit and a higher duty rate than everything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomsCategory {
    Footwear,
    Apparel,
    #[default]
    General,
}

impl CustomsCategory {
    /// Any name other than footwear or apparel is general goods
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "footwear" => CustomsCategory::Footwear,
            "apparel" => CustomsCategory::Apparel,
            _ => CustomsCategory::General,
        }
    }

    pub fn duty_free_limit_usd(self) -> f64 {
        match self {
            CustomsCategory::Footwear | CustomsCategory::Apparel => 200.0,
            CustomsCategory::General => 150.0,
        }
    }

    pub fn duty_rate(self) -> f64 {
        match self {
            CustomsCategory::Footwear | CustomsCategory::Apparel => 0.13,
            CustomsCategory::General => 0.08,
        }
    }
}

/// VAT charged on goods value plus duty
pub const VAT_RATE: f64 = 0.10;

/// Import duty and VAT estimate for a USD purchase, in KRW
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomsEstimate {
    pub category: CustomsCategory,
    /// KRW per USD used for the conversion
    pub exchange_rate: f64,
    pub total_usd: f64,
    pub total_krw: f64,
    pub duty_free_limit_krw: f64,
    pub duty_free: bool,
    pub duty_krw: f64,
    pub vat_krw: f64,
}

impl CustomsEstimate {
    /// Goods plus shipping, converted at `exchange_rate`. At or under the
    /// duty-free limit nothing is owed; above it duty is charged on the
    /// converted total and VAT on total plus duty.
    pub fn calculate(
        price_usd: f64,
        shipping_usd: f64,
        category: CustomsCategory,
        exchange_rate: f64,
    ) -> UcpResult<Self> {
        if !exchange_rate.is_finite() || exchange_rate <= 0.0 {
            return Err(UcpError::Validation(format!(
                "exchange rate must be positive, got {}",
                exchange_rate
            )));
        }
        for (name, amount) in [("price", price_usd), ("shipping", shipping_usd)] {
            if !amount.is_finite() || amount < 0.0 {
                return Err(UcpError::Validation(format!(
                    "{} must be a non-negative amount, got {}",
                    name, amount
                )));
            }
        }

        let total_usd = price_usd + shipping_usd;
        let total_krw = total_usd * exchange_rate;
        let duty_free_limit_krw = category.duty_free_limit_usd() * exchange_rate;
        let duty_free = total_krw <= duty_free_limit_krw;

        let (duty_krw, vat_krw) = if duty_free {
            (0.0, 0.0)
        } else {
            let duty = total_krw * category.duty_rate();
            (duty, (total_krw + duty) * VAT_RATE)
        };

        Ok(Self {
            category,
            exchange_rate,
            total_usd,
            total_krw,
            duty_free_limit_krw,
            duty_free,
            duty_krw,
            vat_krw,
        })
    }

    pub fn total_tax_krw(&self) -> f64 {
        self.duty_krw + self.vat_krw
    }
}

impl fmt::Display for CustomsEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rate: 1 USD = {} KRW", format_grouped(self.exchange_rate, 2))?;
        writeln!(
            f,
            "Total: ${:.2} (KRW {})",
            self.total_usd,
            format_grouped(self.total_krw, 0)
        )?;
        if self.duty_free {
            write!(f, "Duty-free")
        } else {
            write!(
                f,
                "Duty: KRW {}, VAT: KRW {}",
                format_grouped(self.duty_krw, 0),
                format_grouped(self.vat_krw, 0)
            )
        }
    }
}
