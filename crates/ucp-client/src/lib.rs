//! # ucp-client
//!
//! Network-facing components of ucp-cart-rs.
//!
//! This crate provides:
//!
//! 1. **ManifestResolver** - `/.well-known/ucp` discovery
//!    - Per-host file cache with stale fallback
//!    - `http://` endpoints upgraded to `https://`
//!
//! 2. **SchemaClient** - OpenRPC method catalog
//!    - One retry against `mcp.openrpc.json` on 404
//!
//! 3. **CheckoutOrchestrator** - checkout lifecycle over JSON-RPC
//!    - Cart-permalink fallback when the store rejects the agent
//!    - Fresh idempotency keys for cancel/complete
//!    - Line items from storefront product handles
//!
//! 4. **ExchangeRateService** - daily Korea Eximbank rates
//!    - Single-slot cache, weekend/holiday lookback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ucp_client::{CheckoutOrchestrator, CheckoutOutcome, UcpConfig};
//! use ucp_core::LineItem;
//!
//! let config = UcpConfig::load()?;
//! let checkout = CheckoutOrchestrator::new(&config)?;
//!
//! let items = vec![LineItem::new("111", "Carry-On", 27500, 1)];
//! match checkout.create_checkout("https://shop.example.com", &items, "USD", None).await? {
//!     CheckoutOutcome::Confirmed(result) => println!("{}", result),
//!     CheckoutOutcome::Fallback(cart) => println!("Continue at {}", cart.url),
//! }
//! ```

pub mod capabilities;
pub mod checkout;
pub mod config;
pub mod exchange_rate;
pub mod http;
pub mod jsonrpc;
pub mod manifest;
pub mod schema;
pub mod storefront;

// Re-exports
pub use capabilities::{CapabilityInspector, CapabilityReport};
pub use checkout::{AttemptState, CheckoutOrchestrator, CheckoutOutcome};
pub use config::{CachePolicy, UcpConfig};
pub use exchange_rate::{DailyRates, ExchangeRateService, KoreaEximSource, RateSlot, RateSource};
pub use jsonrpc::{JsonRpcClient, RpcOutcome};
pub use manifest::{EndpointResolver, ManifestResolver};
pub use schema::SchemaClient;
pub use storefront::{StorefrontClient, StorefrontProduct, StorefrontVariant};
