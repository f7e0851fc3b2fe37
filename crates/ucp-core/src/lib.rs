//! # ucp-core
//!
//! Core types for the ucp-cart storefront integration layer.
//!
//! This crate provides:
//! - `UcpError` and the remote-error classifier for typed error handling
//! - `LineItem`, `CheckoutPayload` and `FallbackCheckout` for the checkout flow
//! - `Manifest` and `Schema` for UCP discovery documents
//! - `AuthConfig` for JSON-RPC auth headers
//! - `FxRateTable` and `FxMeta` for daily exchange rates
//! - `RetryPolicy` shared by the HTTP fetchers
//! - `CacheStore`, a file-backed cache with atomic replace
//!
//! Nothing here performs network I/O; see `ucp-client` for that.
//!
//! ## Example
//!
//! ```rust
//! use ucp_core::{build_payload, LineItem};
//!
//! let items = vec![LineItem::new("111", "Carry-On", 27500, 2)];
//! let payload = build_payload(&items, "USD", None, None);
//!
//! assert_eq!(payload.total(), 55000);
//! ```

pub mod auth;
pub mod cache;
pub mod checkout;
pub mod error;
pub mod fx;
pub mod manifest;
pub mod retry;
pub mod schema;

// Re-exports for convenience
pub use auth::{AuthConfig, AuthHeader};
pub use cache::{CacheEntry, CacheStore};
pub use checkout::{
    build_payload, cart_variant_id, https_base_url, parse_line_items, CheckoutPayload,
    CheckoutStatus, FallbackCheckout, Item, LineItem, PaymentSubmission, ProtocolInfo, Total,
    CHECKOUT_CAPABILITY, DEFAULT_PROTOCOL_VERSION,
};
pub use error::{ErrorKind, JsonRpcError, RemoteErrorKind, UcpError, UcpResult};
pub use fx::{
    format_grouped, format_rate, CustomsCategory, CustomsEstimate, FxMeta, FxRateTable, QuoteLabel,
    RateQuote, VAT_RATE,
};
pub use manifest::{upgrade_to_https, Manifest, ManifestMeta, ShoppingService};
pub use retry::{RetryOn, RetryPolicy};
pub use schema::{sibling_schema_url, Schema, SchemaMeta};
