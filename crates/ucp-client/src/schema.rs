//! # Schema Client
//!
//! Fetches and caches the OpenRPC method catalog a store publishes for its
//! checkout service. Some stores publish the file as `mcp.openrpc.json`
//! while advertising `openrpc.json`, so a 404 gets exactly one retry
//! against that sibling URL.

use crate::config::{CachePolicy, UcpConfig};
use crate::http::{build_client, ensure_success, transport_error, with_retry};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use ucp_core::{
    sibling_schema_url, CacheStore, RetryPolicy, Schema, SchemaMeta, UcpError, UcpResult,
};

const CACHE_PREFIX: &str = "ucp_schema_";

pub struct SchemaClient {
    client: Client,
    cache: CacheStore,
    timeout: Duration,
    policy: CachePolicy,
    retry: RetryPolicy,
}

impl SchemaClient {
    pub fn new(config: &UcpConfig) -> UcpResult<Self> {
        let client = build_client(config.schema_timeout())?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &UcpConfig) -> Self {
        Self {
            client,
            cache: config.cache_store(),
            timeout: config.schema_timeout(),
            policy: config.cache_policy,
            retry: config.schema_retry.clone(),
        }
    }

    pub fn cache_key(schema_url: &str) -> String {
        format!("{}{}", CACHE_PREFIX, schema_url.trim())
    }

    /// Schema for `schema_url`, from cache or network, with stale fallback
    #[instrument(skip(self))]
    pub async fn fetch(&self, schema_url: &str) -> (Option<Schema>, SchemaMeta) {
        let key = Self::cache_key(schema_url);
        let mut meta = SchemaMeta::new(schema_url);

        let cached = self
            .cache
            .get::<Schema>(&key)
            .and_then(|entry| Schema::from_value(entry.payload.0));

        if self.policy == CachePolicy::PreferCache {
            if let Some(schema) = cached {
                debug!(key = %key, "Schema served from cache");
                meta.cached = true;
                return (Some(schema), meta);
            }
        }

        match self.fetch_with_sibling(schema_url).await {
            Ok((schema, loaded_from)) => {
                if let Err(e) = self.cache.put(&key, &schema, &loaded_from) {
                    warn!("Failed to cache schema for {}: {}", schema_url, e);
                }
                info!("Fetched UCP schema from {}", loaded_from);
                meta.url = loaded_from;
                return (Some(schema), meta);
            }
            Err(e) => {
                warn!("UCP schema fetch failed for {}: {}", schema_url, e);
                meta.error = Some(e.to_string());
            }
        }

        match cached {
            Some(schema) => {
                meta.cached = true;
                meta.stale = true;
                (Some(schema), meta)
            }
            None => (None, meta),
        }
    }

    /// Declared method names, in order
    pub fn list_methods(schema: &Schema) -> Vec<String> {
        schema.method_names()
    }

    pub fn supports_catalog(schema: &Schema) -> bool {
        schema.supports_catalog()
    }

    async fn fetch_with_sibling(&self, schema_url: &str) -> UcpResult<(Schema, String)> {
        if let Some(schema) = self.attempt(schema_url).await? {
            return Ok((schema, schema_url.to_string()));
        }

        if let Some(sibling) = sibling_schema_url(schema_url) {
            debug!("Schema 404 at {}, trying {}", schema_url, sibling);
            if let Some(schema) = self.attempt(&sibling).await? {
                return Ok((schema, sibling));
            }
        }

        Err(UcpError::Resolution(format!("schema not found at {}", schema_url)))
    }

    /// One logical fetch. `Ok(None)` means the URL answered 404.
    async fn attempt(&self, url: &str) -> UcpResult<Option<Schema>> {
        with_retry(&self.retry, "schema fetch", move |_| async move {
            let response = self
                .client
                .get(url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(transport_error)?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            let body = ensure_success(response)?.text().await.map_err(transport_error)?;
            let value = serde_json::from_str(&body)
                .map_err(|e| UcpError::Serialization(format!("invalid schema JSON from {}: {}", url, e)))?;

            Schema::from_value(value)
                .map(Some)
                .ok_or_else(|| UcpError::Resolution("unexpected schema format".to_string()))
        })
        .await
    }
}
