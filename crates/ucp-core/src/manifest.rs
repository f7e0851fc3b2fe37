//! # UCP Manifest
//!
//! Shape of the `/.well-known/ucp` discovery document and the metadata
//! reported alongside every resolution attempt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Service names under which stores publish the shopping service
pub const SHOPPING_SERVICE_ALIASES: [&str; 2] = ["dev.ucp.shopping", "ucp.shopping"];

/// Checkout service endpoints extracted from a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingService {
    pub endpoint: String,
    pub schema_url: Option<String>,
}

/// A store's discovery manifest, kept as raw JSON so unknown fields survive caching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(pub Value);

impl Manifest {
    /// Accept only JSON objects
    pub fn from_value(value: Value) -> Option<Self> {
        if value.is_object() {
            Some(Self(value))
        } else {
            None
        }
    }

    fn ucp(&self) -> Option<&Value> {
        self.0.get("ucp")
    }

    pub fn version(&self) -> Option<String> {
        self.ucp()
            .and_then(|u| u.get("version"))
            .and_then(Value::as_str)
            .map(String::from)
    }

    /// Advertised capabilities; empty when absent or malformed
    pub fn capabilities(&self) -> Vec<Value> {
        self.ucp()
            .and_then(|u| u.get("capabilities"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Look up the JSON-RPC (MCP) endpoint of the shopping service
    pub fn shopping_service(&self) -> Option<ShoppingService> {
        let services = self.ucp()?.get("services")?;
        let shopping = SHOPPING_SERVICE_ALIASES
            .iter()
            .find_map(|name| services.get(*name).filter(|s| s.is_object()))?;
        let mcp = shopping.get("mcp").filter(|m| m.is_object())?;

        let endpoint = mcp
            .get("endpoint")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())?;

        Some(ShoppingService {
            endpoint: endpoint.to_string(),
            schema_url: mcp.get("schema").and_then(Value::as_str).map(String::from),
        })
    }
}

/// Rewrite a plaintext `http://` URL to `https://`. Schemes match in any case.
pub fn upgrade_to_https(url: &str) -> String {
    match strip_scheme(url, "http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

/// `url` after a leading `scheme`, compared ASCII case-insensitively
pub(crate) fn strip_scheme<'a>(url: &'a str, scheme: &str) -> Option<&'a str> {
    url.get(..scheme.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
        .and_then(|_| url.get(scheme.len()..))
}

/// Metadata reported with every manifest resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMeta {
    /// Manifest URL attempted
    pub url: String,
    pub cached: bool,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ucp_version: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<Value>,
}

impl ManifestMeta {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Error message for callers that abort on a missing endpoint
    pub fn error_or(&self, fallback: &str) -> String {
        self.error.clone().unwrap_or_else(|| fallback.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(service: &str) -> Manifest {
        Manifest::from_value(json!({
            "ucp": {
                "version": "2026-01-11",
                "capabilities": [{"name": "dev.ucp.shopping.checkout", "version": "2026-01-11"}],
                "services": {
                    service: {
                        "mcp": {
                            "endpoint": "http://shop.example.com/api/ucp/mcp",
                            "schema": "https://ucp.dev/services/shopping/openrpc.json"
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_shopping_service_aliases() {
        for alias in SHOPPING_SERVICE_ALIASES {
            let service = manifest(alias).shopping_service().unwrap();
            assert_eq!(service.endpoint, "http://shop.example.com/api/ucp/mcp");
            assert_eq!(
                service.schema_url.as_deref(),
                Some("https://ucp.dev/services/shopping/openrpc.json")
            );
        }
        assert!(manifest("dev.ucp.other").shopping_service().is_none());
    }

    #[test]
    fn test_version_and_capabilities() {
        let m = manifest("dev.ucp.shopping");
        assert_eq!(m.version().as_deref(), Some("2026-01-11"));
        assert_eq!(m.capabilities().len(), 1);

        let bare = Manifest::from_value(json!({"ucp": {}})).unwrap();
        assert!(bare.version().is_none());
        assert!(bare.capabilities().is_empty());
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(Manifest::from_value(json!([1, 2])).is_none());
        assert!(Manifest::from_value(json!("x")).is_none());
    }

    #[test]
    fn test_missing_mcp_shape() {
        let m = Manifest::from_value(json!({"ucp": {"services": {"dev.ucp.shopping": {"rest": {}}}}})).unwrap();
        assert!(m.shopping_service().is_none());

        let m = Manifest::from_value(json!({"ucp": {"services": {"dev.ucp.shopping": "nope"}}})).unwrap();
        assert!(m.shopping_service().is_none());
    }

    #[test]
    fn test_upgrade_to_https() {
        assert_eq!(upgrade_to_https("http://a.com/mcp"), "https://a.com/mcp");
        assert_eq!(upgrade_to_https("https://a.com/mcp"), "https://a.com/mcp");
        assert_eq!(upgrade_to_https("HTTP://shop/mcp"), "https://shop/mcp");
        assert_eq!(upgrade_to_https("Http://shop/mcp"), "https://shop/mcp");
        assert_eq!(upgrade_to_https("HTTPS://shop/mcp"), "HTTPS://shop/mcp");
    }
}
