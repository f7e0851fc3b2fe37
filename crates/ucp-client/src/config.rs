//! # UCP Client Configuration
//!
//! Explicit configuration injected into every component at construction.
//! Values come from defaults, then an optional TOML file, then the
//! environment (a `.env` file is honoured).

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use ucp_core::{AuthConfig, CacheStore, RetryPolicy, UcpError, UcpResult, DEFAULT_PROTOCOL_VERSION};

/// Config files probed by [`UcpConfig::load`], first match wins
pub const CONFIG_PATHS: [&str; 3] = ["config/ucp.toml", "../config/ucp.toml", "../../config/ucp.toml"];

pub const DEFAULT_EXIM_API_URL: &str =
    "https://oapi.koreaexim.go.kr/site/program/financial/exchangeJSON";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Whether a cached manifest/schema is served before trying the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Serve a cached copy without network I/O; fetch only on a miss
    #[default]
    PreferCache,
    /// Always fetch; fall back to the cached copy (marked stale) on failure
    NetworkFirst,
}

impl FromStr for CachePolicy {
    type Err = UcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefer-cache" | "prefer_cache" | "cache" => Ok(CachePolicy::PreferCache),
            "network-first" | "network_first" | "network" => Ok(CachePolicy::NetworkFirst),
            other => Err(UcpError::Configuration(format!(
                "unknown cache policy '{}', expected prefer-cache or network-first",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UcpConfig {
    /// Default token for JSON-RPC calls
    pub auth_token: Option<String>,
    pub auth_header: String,
    /// Empty string sends the raw token
    pub auth_scheme: String,

    /// Korea Eximbank API key
    pub exim_auth_key: Option<String>,
    pub exim_api_url: String,
    pub fx_lookback_days: u32,

    pub manifest_path: String,
    pub cache_dir: PathBuf,
    pub cache_policy: CachePolicy,

    pub manifest_timeout_secs: u64,
    pub schema_timeout_secs: u64,
    pub rpc_timeout_secs: u64,
    pub product_timeout_secs: u64,
    pub fx_timeout_secs: u64,

    /// Protocol version used when a manifest advertises none
    pub protocol_version: String,
    /// Browser user agent for the first storefront lookup attempt
    pub user_agent: String,

    pub manifest_retry: RetryPolicy,
    pub schema_retry: RetryPolicy,
    pub product_retry: RetryPolicy,
}

impl Default for UcpConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            auth_header: ucp_core::auth::DEFAULT_AUTH_HEADER.to_string(),
            auth_scheme: ucp_core::auth::DEFAULT_AUTH_SCHEME.to_string(),
            exim_auth_key: None,
            exim_api_url: DEFAULT_EXIM_API_URL.to_string(),
            fx_lookback_days: 7,
            manifest_path: "/.well-known/ucp".to_string(),
            cache_dir: PathBuf::from(".cache"),
            cache_policy: CachePolicy::PreferCache,
            manifest_timeout_secs: 10,
            schema_timeout_secs: 10,
            rpc_timeout_secs: 15,
            product_timeout_secs: 10,
            fx_timeout_secs: 10,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            manifest_retry: RetryPolicy::none(),
            schema_retry: RetryPolicy::none(),
            product_retry: RetryPolicy::storefront(),
        }
    }
}

impl UcpConfig {
    /// Load defaults, then the first config file found, then the environment
    pub fn load() -> UcpResult<Self> {
        let mut config = Self::default();
        for path in CONFIG_PATHS {
            if Path::new(path).exists() {
                config = Self::from_toml_file(path)?;
                tracing::info!("Loaded UCP config from {}", path);
                break;
            }
        }
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables only
    pub fn from_env() -> UcpResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> UcpResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| UcpError::Configuration(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| UcpError::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> UcpResult<Self> {
        toml::from_str(content).map_err(|e| UcpError::Configuration(e.to_string()))
    }

    /// Overlay environment variables.
    ///
    /// Recognised vars:
    /// - `UCP_AUTH_TOKEN`, `UCP_AUTH_HEADER`, `UCP_AUTH_SCHEME`
    /// - `EXIM_AUTH_KEY` (or `KOREAEXIM_AUTH_KEY`, `EXCHANGE_RATE_API_KEY`)
    /// - `UCP_CACHE_DIR`, `UCP_CACHE_POLICY`
    pub fn apply_env(&mut self) -> UcpResult<()> {
        dotenvy::dotenv().ok(); // Load .env file if present

        if let Some(token) = non_empty_var("UCP_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Some(header) = non_empty_var("UCP_AUTH_HEADER") {
            self.auth_header = header;
        }
        // An explicitly empty scheme is meaningful, so read it raw
        if let Ok(scheme) = env::var("UCP_AUTH_SCHEME") {
            self.auth_scheme = scheme;
        }

        let exim_key = ["EXIM_AUTH_KEY", "KOREAEXIM_AUTH_KEY", "EXCHANGE_RATE_API_KEY"]
            .into_iter()
            .find_map(non_empty_var);
        if exim_key.is_some() {
            self.exim_auth_key = exim_key;
        }

        if let Some(dir) = non_empty_var("UCP_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(policy) = non_empty_var("UCP_CACHE_POLICY") {
            self.cache_policy = policy.parse()?;
        }
        Ok(())
    }

    /// Auth header rules for JSON-RPC calls
    pub fn auth(&self) -> AuthConfig {
        let scheme = Some(self.auth_scheme.clone()).filter(|s| !s.is_empty());
        AuthConfig::new(self.auth_token.clone())
            .with_header(self.auth_header.clone())
            .with_scheme(scheme)
    }

    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(self.cache_dir.clone())
    }

    /// Korea Eximbank key, required by the exchange-rate service
    pub fn require_exim_key(&self) -> UcpResult<&str> {
        self.exim_auth_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| UcpError::Configuration("EXIM_AUTH_KEY not set".to_string()))
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    pub fn schema_timeout(&self) -> Duration {
        Duration::from_secs(self.schema_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn product_timeout(&self) -> Duration {
        Duration::from_secs(self.product_timeout_secs)
    }

    pub fn fx_timeout(&self) -> Duration {
        Duration::from_secs(self.fx_timeout_secs)
    }

    /// Builder: set cache directory
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Builder: set cache policy
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Builder: set default auth token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Builder: set custom rate API URL (for testing)
    pub fn with_exim_api_url(mut self, url: impl Into<String>) -> Self {
        self.exim_api_url = url.into();
        self
    }

    /// Builder: set rate API key
    pub fn with_exim_auth_key(mut self, key: impl Into<String>) -> Self {
        self.exim_auth_key = Some(key.into());
        self
    }

    /// Builder: set storefront retry policy
    pub fn with_product_retry(mut self, policy: RetryPolicy) -> Self {
        self.product_retry = policy;
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UcpConfig::default();
        assert_eq!(config.manifest_path, "/.well-known/ucp");
        assert_eq!(config.rpc_timeout(), Duration::from_secs(15));
        assert_eq!(config.fx_lookback_days, 7);
        assert_eq!(config.cache_policy, CachePolicy::PreferCache);
        assert_eq!(config.product_retry.attempts(), 2);
        assert_eq!(config.manifest_retry.attempts(), 1);
    }

    #[test]
    fn test_auth_from_config() {
        let config = UcpConfig::default().with_auth_token("tok");
        let header = config.auth().header_for(None).unwrap();
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Bearer tok");

        let mut raw = UcpConfig::default().with_auth_token("tok");
        raw.auth_scheme = String::new();
        assert_eq!(raw.auth().header_for(None).unwrap().value, "tok");
    }

    #[test]
    fn test_toml_overrides() {
        let config = UcpConfig::from_toml_str(
            r#"
            cache_dir = "/var/cache/ucp"
            cache_policy = "network-first"
            rpc_timeout_secs = 30
            fx_lookback_days = 3

            [product_retry]
            max_attempts = 3
            backoff = [250, 500]
            "#,
        )
        .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/ucp"));
        assert_eq!(config.cache_policy, CachePolicy::NetworkFirst);
        assert_eq!(config.rpc_timeout(), Duration::from_secs(30));
        assert_eq!(config.fx_lookback_days, 3);
        assert_eq!(config.product_retry.attempts(), 3);
        assert_eq!(config.product_retry.delay_before(3), Duration::from_millis(500));
        // Untouched fields keep their defaults
        assert_eq!(config.manifest_path, "/.well-known/ucp");
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            UcpConfig::from_toml_str("cache_policy = 5"),
            Err(UcpError::Configuration(_))
        ));
    }

    #[test]
    fn test_cache_policy_parse() {
        assert_eq!("network-first".parse::<CachePolicy>().unwrap(), CachePolicy::NetworkFirst);
        assert_eq!("Prefer-Cache".parse::<CachePolicy>().unwrap(), CachePolicy::PreferCache);
        assert!("sometimes".parse::<CachePolicy>().is_err());
    }

    #[test]
    fn test_require_exim_key() {
        assert!(UcpConfig::default().require_exim_key().is_err());
        let config = UcpConfig::default().with_exim_auth_key("abc");
        assert_eq!(config.require_exim_key().unwrap(), "abc");
    }
}
