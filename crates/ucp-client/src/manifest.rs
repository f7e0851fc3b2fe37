//! # Manifest Resolver
//!
//! Discovers a store's UCP manifest at `{store}/.well-known/ucp`, caches it
//! per host, and extracts the shopping checkout JSON-RPC endpoint.
//!
//! Endpoints advertised over plain `http://` are upgraded to `https://`
//! before being handed out.

use crate::config::{CachePolicy, UcpConfig};
use crate::http::{build_client, get_json, with_retry};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use ucp_core::{
    upgrade_to_https, CacheStore, Manifest, ManifestMeta, RetryPolicy, UcpError, UcpResult,
};

const CACHE_PREFIX: &str = "ucp_manifest_";
const CACHE_SOURCE: &str = "well-known";

/// Anything that can map a store URL to its checkout JSON-RPC endpoint.
///
/// The orchestrator depends on this rather than on [`ManifestResolver`]
/// directly.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Endpoint (if discoverable) plus resolution metadata
    async fn resolve_endpoint(&self, store_url: &str) -> (Option<String>, ManifestMeta);
}

pub struct ManifestResolver {
    client: Client,
    cache: CacheStore,
    manifest_path: String,
    timeout: Duration,
    policy: CachePolicy,
    retry: RetryPolicy,
}

impl ManifestResolver {
    pub fn new(config: &UcpConfig) -> UcpResult<Self> {
        let client = build_client(config.manifest_timeout())?;
        Ok(Self::with_client(client, config))
    }

    /// Share an existing HTTP client
    pub fn with_client(client: Client, config: &UcpConfig) -> Self {
        Self {
            client,
            cache: config.cache_store(),
            manifest_path: config.manifest_path.clone(),
            timeout: config.manifest_timeout(),
            policy: config.cache_policy,
            retry: config.manifest_retry.clone(),
        }
    }

    pub fn manifest_url(&self, store_url: &str) -> String {
        format!("{}{}", store_url.trim().trim_end_matches('/'), self.manifest_path)
    }

    /// Cache key for a store: derived from its host (and port)
    pub fn cache_key(store_url: &str) -> String {
        let host = url::Url::parse(store_url.trim())
            .ok()
            .and_then(|u| {
                u.host_str().map(|h| match u.port() {
                    Some(port) => format!("{}:{}", h, port),
                    None => h.to_string(),
                })
            })
            .unwrap_or_else(|| store_url.trim().to_string());
        format!("{}{}", CACHE_PREFIX, host)
    }

    /// Manifest for a store, honouring the configured cache policy
    pub async fn fetch_manifest(&self, store_url: &str) -> (Option<Manifest>, ManifestMeta) {
        self.load(store_url, self.policy).await
    }

    /// Always go to the network; fall back to a stale cached copy on failure
    pub async fn refresh_manifest(&self, store_url: &str) -> (Option<Manifest>, ManifestMeta) {
        self.load(store_url, CachePolicy::NetworkFirst).await
    }

    /// Endpoint for a store, honouring the configured cache policy
    #[instrument(skip(self))]
    pub async fn resolve(&self, store_url: &str) -> (Option<String>, ManifestMeta) {
        let (manifest, meta) = self.fetch_manifest(store_url).await;
        extract_endpoint(manifest, meta)
    }

    /// Endpoint from a freshly fetched manifest
    #[instrument(skip(self))]
    pub async fn refresh(&self, store_url: &str) -> (Option<String>, ManifestMeta) {
        let (manifest, meta) = self.refresh_manifest(store_url).await;
        extract_endpoint(manifest, meta)
    }

    async fn load(&self, store_url: &str, policy: CachePolicy) -> (Option<Manifest>, ManifestMeta) {
        let url = self.manifest_url(store_url);
        let key = Self::cache_key(store_url);
        let mut meta = ManifestMeta::new(url.clone());

        let cached = self
            .cache
            .get::<Manifest>(&key)
            .and_then(|entry| Manifest::from_value(entry.payload.0));

        if policy == CachePolicy::PreferCache {
            if let Some(manifest) = cached {
                debug!(key = %key, "Manifest served from cache");
                meta.cached = true;
                return (Some(manifest), meta);
            }
        }

        match self.fetch(&url).await {
            Ok(manifest) => {
                if let Err(e) = self.cache.put(&key, &manifest, CACHE_SOURCE) {
                    warn!("Failed to cache manifest for {}: {}", key, e);
                }
                info!("Fetched UCP manifest from {}", url);
                return (Some(manifest), meta);
            }
            Err(e) => {
                warn!("UCP manifest fetch failed for {}: {}", url, e);
                meta.error = Some(e.to_string());
            }
        }

        match cached {
            Some(manifest) => {
                meta.cached = true;
                meta.stale = true;
                (Some(manifest), meta)
            }
            None => (None, meta),
        }
    }

    async fn fetch(&self, url: &str) -> UcpResult<Manifest> {
        with_retry(&self.retry, "manifest fetch", move |_| async move {
            let body = get_json(&self.client, url, self.timeout).await?;
            Manifest::from_value(body)
                .ok_or_else(|| UcpError::Resolution("unexpected manifest format".to_string()))
        })
        .await
    }
}

#[async_trait]
impl EndpointResolver for ManifestResolver {
    async fn resolve_endpoint(&self, store_url: &str) -> (Option<String>, ManifestMeta) {
        self.resolve(store_url).await
    }
}

/// Fill version/capabilities into `meta` and pull out the upgraded endpoint
fn extract_endpoint(manifest: Option<Manifest>, mut meta: ManifestMeta) -> (Option<String>, ManifestMeta) {
    let Some(manifest) = manifest else {
        return (None, meta);
    };

    meta.ucp_version = manifest.version();
    meta.capabilities = manifest.capabilities();

    match manifest.shopping_service() {
        Some(service) => {
            meta.schema_url = service.schema_url;
            (Some(upgrade_to_https(&service.endpoint)), meta)
        }
        None => {
            meta.error = Some("UCP MCP endpoint not found".to_string());
            (None, meta)
        }
    }
}
