//! # Checkout Orchestrator
//!
//! Drives the checkout lifecycle against a store's UCP JSON-RPC endpoint:
//! resolve the endpoint, build the payload, call, then classify the outcome.
//!
//! ## Attempt states
//!
//! ```text
//! Building ──► Submitted ──┬──► Confirmed   (result returned unchanged)
//!                          ├──► Fallback    (cart permalink issued)
//!                          └──► Failed      (error surfaced)
//! ```
//!
//! The fallback decision uses only the error from the single failed
//! `create_checkout` call; it performs no further network I/O.

use crate::config::UcpConfig;
use crate::jsonrpc::{JsonRpcClient, RpcOutcome};
use crate::manifest::{EndpointResolver, ManifestResolver};
use crate::storefront::StorefrontClient;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use ucp_core::{
    build_payload, AuthConfig, FallbackCheckout, LineItem, ManifestMeta, PaymentSubmission,
    UcpError, UcpResult,
};
use uuid::Uuid;

const ENDPOINT_NOT_FOUND: &str = "UCP MCP endpoint not found";

/// Per-attempt lifecycle, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Building,
    Submitted,
    Confirmed,
    Fallback,
    Failed,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Building => "building",
            AttemptState::Submitted => "submitted",
            AttemptState::Confirmed => "confirmed",
            AttemptState::Fallback => "fallback",
            AttemptState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of `create_checkout`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CheckoutOutcome {
    /// The store's result, unchanged
    Confirmed(Value),
    /// Cart permalink issued because the store rejected the checkout API
    Fallback(FallbackCheckout),
}

impl CheckoutOutcome {
    pub fn state(&self) -> AttemptState {
        match self {
            CheckoutOutcome::Confirmed(_) => AttemptState::Confirmed,
            CheckoutOutcome::Fallback(_) => AttemptState::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, CheckoutOutcome::Fallback(_))
    }

    pub fn to_value(&self) -> UcpResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

pub struct CheckoutOrchestrator {
    resolver: Arc<dyn EndpointResolver>,
    rpc: JsonRpcClient,
    storefront: StorefrontClient,
    auth: AuthConfig,
    protocol_version: String,
}

impl CheckoutOrchestrator {
    pub fn new(config: &UcpConfig) -> UcpResult<Self> {
        let resolver = Arc::new(ManifestResolver::new(config)?);
        Self::with_resolver(resolver, config)
    }

    /// Use a custom endpoint resolver
    pub fn with_resolver(resolver: Arc<dyn EndpointResolver>, config: &UcpConfig) -> UcpResult<Self> {
        Ok(Self {
            resolver,
            rpc: JsonRpcClient::new(config.rpc_timeout())?,
            storefront: StorefrontClient::new(config)?,
            auth: config.auth(),
            protocol_version: config.protocol_version.clone(),
        })
    }

    /// Create a checkout, falling back to a cart permalink when the store
    /// rejects the agent with a recognised signature
    #[instrument(skip(self, line_items, auth_token), fields(items = line_items.len()))]
    pub async fn create_checkout(
        &self,
        store_url: &str,
        line_items: &[LineItem],
        currency: &str,
        auth_token: Option<&str>,
    ) -> UcpResult<CheckoutOutcome> {
        if line_items.is_empty() {
            return Err(UcpError::Validation("at least one line item is required".to_string()));
        }
        if currency.trim().is_empty() {
            return Err(UcpError::Validation("currency is required".to_string()));
        }

        let (endpoint, meta) = self.endpoint(store_url).await?;

        debug!(state = %AttemptState::Building, "Building checkout payload");
        let version = meta.ucp_version.as_deref().unwrap_or(&self.protocol_version);
        let payload = build_payload(line_items, currency.trim(), Some(version), Some(meta.capabilities));
        let params = json!({ "checkout": payload });

        debug!(state = %AttemptState::Submitted, checkout_id = %payload.id, "Submitting create_checkout");
        let header = self.auth.header_for(auth_token);
        let outcome = self
            .rpc
            .call(&endpoint, "create_checkout", &params, header.as_ref())
            .await?;

        match outcome {
            RpcOutcome::Success { .. } => {
                info!(state = %AttemptState::Confirmed, "Checkout created at {}", endpoint);
                Ok(CheckoutOutcome::Confirmed(outcome.into_result()?))
            }
            RpcOutcome::Failure { error, .. } => {
                let kind = error.classify();
                if !kind.triggers_cart_fallback() {
                    error!(state = %AttemptState::Failed, "create_checkout rejected: {}", error);
                    return Err(UcpError::Application(error));
                }

                warn!(?kind, "create_checkout rejected ({}), building cart permalink", error);
                match FallbackCheckout::from_line_items(store_url, line_items, currency.trim()) {
                    Some(fallback) => {
                        info!(state = %AttemptState::Fallback, url = %fallback.url, "Cart permalink issued");
                        Ok(CheckoutOutcome::Fallback(fallback))
                    }
                    None => {
                        error!(state = %AttemptState::Failed, "No cart tokens derivable from line items");
                        Err(UcpError::FallbackExhausted(error))
                    }
                }
            }
        }
    }

    /// Look up a product by handle, then create a checkout for it
    pub async fn create_checkout_from_handle(
        &self,
        store_url: &str,
        handle: &str,
        quantity: u32,
        currency: &str,
        variant_id: Option<&str>,
        auth_token: Option<&str>,
    ) -> UcpResult<CheckoutOutcome> {
        let line_item = self
            .build_line_item_from_handle(handle, store_url, quantity, variant_id)
            .await?;
        self.create_checkout(store_url, &[line_item], currency, auth_token)
            .await
    }

    #[instrument(skip(self, auth_token))]
    pub async fn get_checkout(
        &self,
        store_url: &str,
        checkout_id: &str,
        auth_token: Option<&str>,
    ) -> UcpResult<Value> {
        let checkout_id = require_id(checkout_id)?;
        self.invoke(store_url, "get_checkout", json!({ "id": checkout_id }), auth_token)
            .await
    }

    #[instrument(skip(self, checkout, auth_token))]
    pub async fn update_checkout(
        &self,
        store_url: &str,
        checkout_id: &str,
        checkout: &Value,
        auth_token: Option<&str>,
    ) -> UcpResult<Value> {
        let checkout_id = require_id(checkout_id)?;
        if !checkout.is_object() {
            return Err(UcpError::Validation(
                "checkout update must be a JSON object".to_string(),
            ));
        }
        let params = json!({ "id": checkout_id, "checkout": checkout });
        self.invoke(store_url, "update_checkout", params, auth_token)
            .await
    }

    /// Cancel with a fresh idempotency key
    #[instrument(skip(self, auth_token))]
    pub async fn cancel_checkout(
        &self,
        store_url: &str,
        checkout_id: &str,
        auth_token: Option<&str>,
    ) -> UcpResult<Value> {
        let checkout_id = require_id(checkout_id)?;
        let params = json!({
            "id": checkout_id,
            "idempotency_key": Uuid::new_v4().to_string(),
        });
        self.invoke(store_url, "cancel_checkout", params, auth_token)
            .await
    }

    /// Complete with a fresh idempotency key; `payment` is sent only when given
    #[instrument(skip(self, payment, auth_token))]
    pub async fn complete_checkout(
        &self,
        store_url: &str,
        checkout_id: &str,
        payment: Option<&Value>,
        auth_token: Option<&str>,
    ) -> UcpResult<Value> {
        let checkout_id = require_id(checkout_id)?;

        let mut params = Map::new();
        params.insert("id".to_string(), Value::String(checkout_id.to_string()));
        params.insert(
            "idempotency_key".to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
        if let Some(payment) = payment {
            if !payment.is_object() {
                return Err(UcpError::Validation("payment must be a JSON object".to_string()));
            }
            params.insert("payment".to_string(), payment.clone());
        }

        self.invoke(store_url, "complete_checkout", Value::Object(params), auth_token)
            .await
    }

    /// Complete a checkout with a payment submitted by the wallet UI
    pub async fn complete_submission(
        &self,
        submission: &PaymentSubmission,
        auth_token: Option<&str>,
    ) -> UcpResult<Value> {
        let payment = Value::Object(submission.payment_token.clone());
        self.complete_checkout(
            &submission.store_url,
            &submission.checkout_id,
            Some(&payment),
            auth_token,
        )
        .await
    }

    /// Build a line item from a storefront product handle.
    ///
    /// When the storefront cannot be reached but `variant_id` is known, a
    /// zero-priced placeholder is returned so checkout creation can still
    /// run and reach the cart-permalink path.
    #[instrument(skip(self))]
    pub async fn build_line_item_from_handle(
        &self,
        handle: &str,
        store_url: &str,
        quantity: u32,
        variant_id: Option<&str>,
    ) -> UcpResult<LineItem> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(UcpError::Validation("product handle is required".to_string()));
        }
        let variant_id = variant_id.map(str::trim).filter(|id| !id.is_empty());

        let product = match self.storefront.fetch_product(store_url, handle).await {
            Ok(product) => product,
            Err(e) => {
                let url = StorefrontClient::product_url(store_url, handle);
                return match variant_id {
                    Some(variant_id) => {
                        warn!("Product lookup failed for {} ({}), using placeholder item", handle, e);
                        Ok(LineItem::new(variant_id, format!("Item ({})", handle), 0, quantity))
                    }
                    None => {
                        error!("Product lookup failed for {}: {}", url, e);
                        Err(UcpError::ProductLookup {
                            handle: handle.to_string(),
                            url,
                        })
                    }
                };
            }
        };

        let variant = product
            .select_variant(variant_id)
            .ok_or_else(|| UcpError::NoVariant {
                handle: handle.to_string(),
            })?;

        Ok(product.to_line_item(variant, quantity))
    }

    async fn endpoint(&self, store_url: &str) -> UcpResult<(String, ManifestMeta)> {
        let (endpoint, meta) = self.resolver.resolve_endpoint(store_url).await;
        match endpoint {
            Some(endpoint) => Ok((endpoint, meta)),
            None => Err(UcpError::Resolution(meta.error_or(ENDPOINT_NOT_FOUND))),
        }
    }

    /// Resolve, call, surface
    async fn invoke(
        &self,
        store_url: &str,
        method: &str,
        params: Value,
        auth_token: Option<&str>,
    ) -> UcpResult<Value> {
        let (endpoint, _) = self.endpoint(store_url).await?;
        let header = self.auth.header_for(auth_token);
        let outcome = self.rpc.call(&endpoint, method, &params, header.as_ref()).await?;
        if let RpcOutcome::Failure { error, .. } = &outcome {
            warn!("{} rejected by {}: {}", method, endpoint, error);
        }
        outcome.into_result()
    }
}

fn require_id(checkout_id: &str) -> UcpResult<&str> {
    let id = checkout_id.trim();
    if id.is_empty() {
        Err(UcpError::Validation("checkout id is required".to_string()))
    } else {
        Ok(id)
    }
}
