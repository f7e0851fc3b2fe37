//! # Checkout Types
//!
//! Line items, checkout payloads and the cart-permalink fallback result.
//!
//! All amounts are integer minor units (cents). Line items usually arrive as
//! JSON produced by an agent, so ids, prices and quantities are coerced
//! leniently on the way in rather than rejected.

use crate::error::{UcpError, UcpResult};
use crate::manifest::strip_scheme;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Protocol version sent when the manifest does not advertise one
pub const DEFAULT_PROTOCOL_VERSION: &str = "2026-01-11";

/// Capability name for the shopping checkout service
pub const CHECKOUT_CAPABILITY: &str = "dev.ucp.shopping.checkout";

/// The purchasable item behind a line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Variant id, either numeric or a `gid://` style URI
    #[serde(default, deserialize_with = "coerce::string_id")]
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// Unit price in minor units
    #[serde(default, deserialize_with = "coerce::minor_units")]
    pub price: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Store-specific fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One `{type, amount}` entry of a totals array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Total {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, deserialize_with = "coerce::minor_units")]
    pub amount: u64,
}

impl Total {
    pub fn subtotal(amount: u64) -> Self {
        Self {
            kind: "subtotal".to_string(),
            amount,
        }
    }

    pub fn total(amount: u64) -> Self {
        Self {
            kind: "total".to_string(),
            amount,
        }
    }
}

/// A line item in a checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "coerce::string_id")]
    pub id: String,

    pub item: Item,

    #[serde(default = "default_quantity", deserialize_with = "coerce::quantity")]
    pub quantity: u32,

    #[serde(default)]
    pub totals: Vec<Total>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_quantity() -> u32 {
    1
}

impl LineItem {
    /// Create a line item for a variant with a single subtotal entry
    pub fn new(
        variant_id: impl Into<String>,
        title: impl Into<String>,
        price: u64,
        quantity: u32,
    ) -> Self {
        let variant_id = variant_id.into();
        let mut line_item = Self {
            id: format!("li-{}", variant_id),
            item: Item {
                id: variant_id,
                title: title.into(),
                price,
                image_url: None,
                extra: Map::new(),
            },
            quantity: quantity.max(1),
            totals: Vec::new(),
            extra: Map::new(),
        };
        line_item.totals = vec![Total::subtotal(line_item.subtotal())];
        line_item
    }

    /// Builder: set image URL
    pub fn with_image_url(mut self, url: Option<String>) -> Self {
        self.item.image_url = url;
        self
    }

    /// Quantity used for pricing; zero is treated as one
    pub fn effective_quantity(&self) -> u32 {
        self.quantity.max(1)
    }

    /// Unit price times effective quantity
    pub fn subtotal(&self) -> u64 {
        self.item
            .price
            .saturating_mul(u64::from(self.effective_quantity()))
    }

    /// Token used in a cart permalink: `<variantId>:<quantity>`
    pub fn cart_token(&self) -> Option<String> {
        cart_variant_id(&self.item.id).map(|id| format!("{}:{}", id, self.effective_quantity()))
    }
}

/// Reduce a variant id such as `gid://shopify/ProductVariant/111` to `111`
pub fn cart_variant_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let id = match trimmed.rsplit_once('/') {
        Some((_, tail)) => tail.trim(),
        None => trimmed,
    };
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Parse agent-supplied line items: either a single object or an array
pub fn parse_line_items(json: &str) -> UcpResult<Vec<LineItem>> {
    let parsed: Value = serde_json::from_str(json)
        .map_err(|e| UcpError::Validation(format!("line items are not valid JSON: {}", e)))?;

    let items = match parsed {
        Value::Object(_) => vec![parsed],
        Value::Array(items) => items,
        _ => {
            return Err(UcpError::Validation(
                "line items must be a JSON object or array".to_string(),
            ))
        }
    };

    items
        .into_iter()
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|e| UcpError::Validation(format!("invalid line item: {}", e)))
        })
        .collect()
}

/// Checkout lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// Created locally, not yet accepted by the store
    #[default]
    Incomplete,
    ReadyForComplete,
    CompleteInProgress,
    Completed,
    Canceled,
    /// Cart permalink issued instead of a protocol checkout
    Fallback,
}

/// Protocol header carried in every checkout payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    pub version: String,
    pub capabilities: Vec<Value>,
}

impl ProtocolInfo {
    /// Use the advertised version and capabilities, defaulting whatever is missing
    pub fn new(version: Option<&str>, capabilities: Vec<Value>) -> Self {
        let version = version
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_PROTOCOL_VERSION)
            .to_string();
        let capabilities = if capabilities.is_empty() {
            vec![serde_json::json!({
                "name": CHECKOUT_CAPABILITY,
                "version": version,
            })]
        } else {
            capabilities
        };
        Self {
            version,
            capabilities,
        }
    }
}

impl Default for ProtocolInfo {
    fn default() -> Self {
        Self::new(None, Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentSection {
    #[serde(default)]
    pub handlers: Vec<Value>,
}

/// Body of a `create_checkout` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutPayload {
    #[serde(rename = "ucp")]
    pub protocol: ProtocolInfo,

    /// Fresh v4 UUID per payload unless supplied
    pub id: String,

    pub line_items: Vec<LineItem>,

    pub status: CheckoutStatus,

    pub currency: String,

    pub totals: Vec<Total>,

    #[serde(default)]
    pub links: Vec<Value>,

    #[serde(default)]
    pub payment: PaymentSection,
}

impl CheckoutPayload {
    /// Normalize line items and compute totals
    pub fn build(line_items: &[LineItem], currency: impl Into<String>) -> Self {
        let mut total_amount: u64 = 0;
        let normalized = line_items
            .iter()
            .map(|item| {
                let subtotal = item.subtotal();
                total_amount = total_amount.saturating_add(subtotal);
                let mut normalized = item.clone();
                normalized.quantity = item.effective_quantity();
                if normalized.totals.is_empty() {
                    normalized.totals = vec![Total::subtotal(subtotal)];
                }
                normalized
            })
            .collect();

        Self {
            protocol: ProtocolInfo::default(),
            id: Uuid::new_v4().to_string(),
            line_items: normalized,
            status: CheckoutStatus::Incomplete,
            currency: currency.into(),
            totals: vec![Total::subtotal(total_amount), Total::total(total_amount)],
            links: Vec::new(),
            payment: PaymentSection::default(),
        }
    }

    /// Builder: set protocol version and capabilities
    pub fn with_protocol(mut self, protocol: ProtocolInfo) -> Self {
        self.protocol = protocol;
        self
    }

    /// Builder: reuse a caller-supplied checkout id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Amount of the `total` entry
    pub fn total(&self) -> u64 {
        self.totals
            .iter()
            .find(|t| t.kind == "total")
            .map(|t| t.amount)
            .unwrap_or(0)
    }
}

/// Build a checkout payload with optional protocol overrides
pub fn build_payload(
    line_items: &[LineItem],
    currency: &str,
    version: Option<&str>,
    capabilities: Option<Vec<Value>>,
) -> CheckoutPayload {
    CheckoutPayload::build(line_items, currency)
        .with_protocol(ProtocolInfo::new(version, capabilities.unwrap_or_default()))
}

/// Synthetic result returned when the store rejects the checkout API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackCheckout {
    /// `fallback-<uuid>`
    pub id: String,

    /// Cart permalink on the storefront
    pub url: String,

    pub currency: String,

    pub totals: Vec<Total>,

    pub status: CheckoutStatus,

    pub line_items: Vec<LineItem>,
}

impl FallbackCheckout {
    /// Build a cart permalink for the given items.
    /// Returns `None` when no item yields a usable variant id.
    pub fn from_line_items(store_url: &str, line_items: &[LineItem], currency: &str) -> Option<Self> {
        let mut tokens = Vec::with_capacity(line_items.len());
        let mut estimate: u64 = 0;

        for item in line_items {
            if let Some(token) = item.cart_token() {
                tokens.push(token);
                estimate = estimate.saturating_add(item.subtotal());
            }
        }

        if tokens.is_empty() {
            return None;
        }

        Some(Self {
            id: format!("fallback-{}", Uuid::new_v4()),
            url: format!("{}/cart/{}", https_base_url(store_url), tokens.join(",")),
            currency: currency.to_string(),
            totals: vec![Total::subtotal(estimate), Total::total(estimate)],
            status: CheckoutStatus::Fallback,
            line_items: line_items.to_vec(),
        })
    }

    pub fn total(&self) -> u64 {
        self.totals
            .iter()
            .find(|t| t.kind == "total")
            .map(|t| t.amount)
            .unwrap_or(0)
    }
}

/// Store base URL with trailing slashes removed and the scheme forced to https
pub fn https_base_url(store_url: &str) -> String {
    let base = store_url.trim().trim_end_matches('/');
    let rest = strip_scheme(base, "http://")
        .or_else(|| strip_scheme(base, "https://"))
        .unwrap_or(base);
    format!("https://{}", rest)
}

/// Payment submitted by the wallet UI for a checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSubmission {
    pub store_url: String,
    pub checkout_id: String,
    /// Forwarded unmodified as the `payment` parameter of `complete_checkout`
    pub payment_token: Map<String, Value>,
}

/// Lenient deserializers for agent- and storefront-supplied JSON
pub mod coerce {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string_id<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Invalid or negative amounts become zero
    pub fn minor_units<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
                .unwrap_or(0),
            Value::String(s) => s.trim().parse::<i64>().map(|v| v.max(0) as u64).unwrap_or(0),
            _ => 0,
        })
    }

    /// Unparsable quantities become one, negative ones zero
    pub fn quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parsed = match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        Ok(match parsed {
            Some(v) => v.clamp(0, i64::from(u32::MAX)) as u32,
            None => 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str, price: u64, quantity: u32) -> LineItem {
        LineItem::new(id, "Test", price, quantity)
    }

    #[test]
    fn test_payload_totals() {
        let items = vec![item("111", 1500, 2), item("222", 2500, 1), item("333", 700, 0)];
        let payload = build_payload(&items, "USD", None, None);

        let expected = 1500 * 2 + 2500 + 700;
        assert_eq!(payload.totals.len(), 2);
        assert_eq!(payload.totals[0], Total::subtotal(expected));
        assert_eq!(payload.totals[1], Total::total(expected));
        assert_eq!(payload.total(), expected);
        assert_eq!(payload.line_items[2].quantity, 1);
    }

    #[test]
    fn test_payload_defaults() {
        let payload = build_payload(&[item("1", 100, 1)], "USD", None, None);

        assert_eq!(payload.protocol.version, DEFAULT_PROTOCOL_VERSION);
        assert_eq!(payload.protocol.capabilities.len(), 1);
        assert_eq!(payload.protocol.capabilities[0]["name"], CHECKOUT_CAPABILITY);
        assert_eq!(payload.status, CheckoutStatus::Incomplete);
        assert!(Uuid::parse_str(&payload.id).is_ok());

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["ucp"]["version"], DEFAULT_PROTOCOL_VERSION);
        assert_eq!(value["status"], "incomplete");
        assert_eq!(value["payment"], json!({"handlers": []}));
    }

    #[test]
    fn test_payload_ids_are_fresh() {
        let items = [item("1", 100, 1)];
        let a = build_payload(&items, "USD", None, None);
        let b = build_payload(&items, "USD", None, None);
        assert_ne!(a.id, b.id);

        let fixed = CheckoutPayload::build(&items, "USD").with_id("chk_1");
        assert_eq!(fixed.id, "chk_1");
    }

    #[test]
    fn test_payload_advertised_protocol() {
        let caps = vec![json!({"name": "dev.ucp.shopping.checkout", "version": "2025-10-01"})];
        let payload = build_payload(&[item("1", 1, 1)], "EUR", Some("2025-10-01"), Some(caps.clone()));
        assert_eq!(payload.protocol.version, "2025-10-01");
        assert_eq!(payload.protocol.capabilities, caps);

        // Empty capability list falls back to the default entry at the given version
        let payload = build_payload(&[item("1", 1, 1)], "EUR", Some("2025-10-01"), Some(vec![]));
        assert_eq!(payload.protocol.capabilities[0]["version"], "2025-10-01");
    }

    #[test]
    fn test_lenient_line_item_parsing() {
        let items = parse_line_items(
            r#"[
                {"id": "li-1", "item": {"id": 111, "price": "1999"}, "quantity": "2", "sku": "A"},
                {"item": {"id": "222", "price": -5}},
                {"item": {"id": "333", "price": "abc"}, "quantity": 3}
            ]"#,
        )
        .unwrap();

        assert_eq!(items[0].item.id, "111");
        assert_eq!(items[0].item.price, 1999);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].extra.get("sku"), Some(&json!("A")));
        assert_eq!(items[1].item.price, 0);
        assert_eq!(items[1].quantity, 1);
        assert_eq!(items[2].item.price, 0);
        assert_eq!(items[2].subtotal(), 0);
    }

    #[test]
    fn test_parse_single_object_and_rejects() {
        let items = parse_line_items(r#"{"item": {"id": "9", "price": 10}}"#).unwrap();
        assert_eq!(items.len(), 1);

        assert!(matches!(parse_line_items("42"), Err(UcpError::Validation(_))));
        assert!(matches!(parse_line_items("{nope"), Err(UcpError::Validation(_))));
    }

    #[test]
    fn test_cart_variant_id() {
        assert_eq!(
            cart_variant_id("gid://shopify/ProductVariant/4567").as_deref(),
            Some("4567")
        );
        assert_eq!(cart_variant_id("111").as_deref(), Some("111"));
        assert_eq!(cart_variant_id(""), None);
        assert_eq!(cart_variant_id("gid://shopify/ProductVariant/"), None);
    }

    #[test]
    fn test_fallback_checkout() {
        let items = vec![item("111", 1000, 2), item("gid://shopify/ProductVariant/222", 500, 1)];
        let fallback = FallbackCheckout::from_line_items("http://shop.example.com/", &items, "USD").unwrap();

        assert_eq!(fallback.url, "https://shop.example.com/cart/111:2,222:1");
        assert!(fallback.id.starts_with("fallback-"));
        assert_eq!(fallback.status, CheckoutStatus::Fallback);
        assert_eq!(fallback.total(), 2500);
        assert_eq!(fallback.totals[0].amount, 2500);
        assert_eq!(fallback.line_items, items);
    }

    #[test]
    fn test_fallback_without_tokens() {
        let items = vec![item("", 1000, 1)];
        assert!(FallbackCheckout::from_line_items("https://shop.example.com", &items, "USD").is_none());
    }

    #[test]
    fn test_https_base_url() {
        assert_eq!(https_base_url("http://a.com/"), "https://a.com");
        assert_eq!(https_base_url("https://a.com"), "https://a.com");
        assert_eq!(https_base_url("a.com"), "https://a.com");
        assert_eq!(https_base_url("HTTP://Shop.example.com/"), "https://Shop.example.com");
        assert_eq!(https_base_url("HTTPS://a.com"), "https://a.com");
    }
}
