//! # Storefront Client
//!
//! Product lookups against a store's public `/products/{handle}.js` endpoint.
//!
//! Storefronts sitting behind bot protection sometimes reject a plain client
//! and sometimes reject a browser-looking one, so the first attempt goes out
//! with a browser user agent and follows redirects, and later attempts use a
//! bare client that does neither.

use crate::config::UcpConfig;
use crate::http::{build_plain_client, transport_error, with_retry};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use ucp_core::checkout::coerce;
use ucp_core::{LineItem, RetryPolicy, UcpError, UcpResult};

/// Product document served by `/products/{handle}.js`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StorefrontProduct {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub variants: Vec<StorefrontVariant>,

    #[serde(default)]
    pub featured_image: Option<Value>,

    #[serde(default)]
    pub images: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StorefrontVariant {
    #[serde(default, deserialize_with = "coerce::string_id")]
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    /// Minor units, as the storefront reports them
    #[serde(default, deserialize_with = "coerce::minor_units")]
    pub price: u64,

    #[serde(default)]
    pub available: bool,
}

impl StorefrontProduct {
    /// Variant matching `variant_id`, else the first available one, else the first one
    pub fn select_variant(&self, variant_id: Option<&str>) -> Option<&StorefrontVariant> {
        let wanted = variant_id.map(str::trim).filter(|id| !id.is_empty());
        if let Some(wanted) = wanted {
            if let Some(variant) = self.variants.iter().find(|v| v.id == wanted) {
                return Some(variant);
            }
        }
        self.variants
            .iter()
            .find(|v| v.available)
            .or_else(|| self.variants.first())
    }

    /// `featured_image` if set, else the first of `images`, made absolute
    pub fn image_url(&self) -> Option<String> {
        self.featured_image
            .as_ref()
            .and_then(image_src)
            .or_else(|| self.images.first().and_then(image_src))
            .and_then(normalize_image_url)
    }

    pub fn to_line_item(&self, variant: &StorefrontVariant, quantity: u32) -> LineItem {
        let title = self.title.as_deref().unwrap_or("Item");
        let variant_title = variant.title.as_deref().unwrap_or("");
        let combined = format!("{} - {}", title, variant_title);
        let combined = combined.trim_matches(|c: char| c == ' ' || c == '-');

        LineItem::new(variant.id.clone(), combined, variant.price, quantity)
            .with_image_url(self.image_url())
    }
}

// Image entries are plain URLs, or objects carrying `src`
fn image_src(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("src").and_then(Value::as_str),
        _ => None,
    }
}

/// Protocol-relative `//cdn…` URLs become `https:`; empty yields `None`
pub fn normalize_image_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        None
    } else if url.starts_with("//") {
        Some(format!("https:{}", url))
    } else {
        Some(url.to_string())
    }
}

pub struct StorefrontClient {
    browser: Client,
    plain: Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl StorefrontClient {
    pub fn new(config: &UcpConfig) -> UcpResult<Self> {
        let timeout = config.product_timeout();

        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| UcpError::Configuration(format!("invalid user agent: {}", e)))?;
        headers.insert(USER_AGENT, agent);

        let browser = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| UcpError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            browser,
            plain: build_plain_client(timeout)?,
            timeout,
            retry: config.product_retry.clone(),
        })
    }

    pub fn product_url(store_url: &str, handle: &str) -> String {
        format!(
            "{}/products/{}.js",
            store_url.trim().trim_end_matches('/'),
            handle.trim()
        )
    }

    /// Fetch a product; only an HTTP 200 with a parsable body counts
    #[instrument(skip(self))]
    pub async fn fetch_product(&self, store_url: &str, handle: &str) -> UcpResult<StorefrontProduct> {
        let url = Self::product_url(store_url, handle);
        let url = url.as_str();

        with_retry(&self.retry, "product lookup", move |attempt| async move {
            let client = if attempt == 1 { &self.browser } else { &self.plain };
            debug!("Product lookup attempt {} for {}", attempt, url);

            let response = client
                .get(url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            if status != StatusCode::OK {
                warn!("Product lookup attempt {} got {} from {}", attempt, status, url);
                return Err(UcpError::http_status(status.as_u16(), url));
            }

            let body = response.text().await.map_err(transport_error)?;
            serde_json::from_str(&body)
                .map_err(|e| UcpError::transport(format!("unparsable product JSON from {}: {}", url, e)))
        })
        .await
    }
}
