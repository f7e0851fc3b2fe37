//! # Checkout Service Schema
//!
//! OpenRPC-style method catalog a store publishes for its checkout dialect.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method-name fragments that indicate product listing support
pub const CATALOG_KEYWORDS: [&str; 7] = [
    "catalog",
    "product",
    "search",
    "list",
    "browse",
    "collection",
    "item",
];

const SCHEMA_FILENAME: &str = "openrpc.json";
const MCP_SCHEMA_FILENAME: &str = "mcp.openrpc.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(pub Value);

impl Schema {
    pub fn from_value(value: Value) -> Option<Self> {
        if value.is_object() {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Declared method names in order; malformed entries are skipped
    pub fn method_names(&self) -> Vec<String> {
        self.0
            .get("methods")
            .and_then(Value::as_array)
            .map(|methods| {
                methods
                    .iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True if any method looks like a catalog/listing operation
    pub fn supports_catalog(&self) -> bool {
        self.method_names().iter().any(|name| {
            let name = name.to_lowercase();
            CATALOG_KEYWORDS.iter().any(|kw| name.contains(kw))
        })
    }
}

/// Metadata reported with every schema fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMeta {
    /// URL the schema was finally loaded from
    pub url: String,
    pub cached: bool,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SchemaMeta {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Sibling URL tried when the published schema URL answers 404:
/// the trailing `openrpc.json` becomes `mcp.openrpc.json`.
pub fn sibling_schema_url(schema_url: &str) -> Option<String> {
    if schema_url.ends_with(MCP_SCHEMA_FILENAME) {
        return None;
    }
    schema_url
        .strip_suffix(SCHEMA_FILENAME)
        .map(|prefix| format!("{}{}", prefix, MCP_SCHEMA_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_names_skip_malformed() {
        let schema = Schema::from_value(json!({
            "methods": [
                {"name": "create_checkout"},
                "bogus",
                {"summary": "no name"},
                {"name": ""},
                {"name": 7},
                {"name": "get_checkout"}
            ]
        }))
        .unwrap();
        assert_eq!(schema.method_names(), vec!["create_checkout", "get_checkout"]);
    }

    #[test]
    fn test_supports_catalog() {
        let checkout_only = Schema(json!({"methods": [{"name": "create_checkout"}, {"name": "complete_checkout"}]}));
        assert!(!checkout_only.supports_catalog());

        let with_search = Schema(json!({"methods": [{"name": "create_checkout"}, {"name": "SearchProducts"}]}));
        assert!(with_search.supports_catalog());

        assert!(!Schema(json!({})).supports_catalog());
    }

    #[test]
    fn test_sibling_schema_url() {
        assert_eq!(
            sibling_schema_url("https://ucp.dev/services/shopping/openrpc.json").as_deref(),
            Some("https://ucp.dev/services/shopping/mcp.openrpc.json")
        );
        assert_eq!(
            sibling_schema_url("https://ucp.dev/shopping.openrpc.json").as_deref(),
            Some("https://ucp.dev/shopping.mcp.openrpc.json")
        );
        assert!(sibling_schema_url("https://ucp.dev/services/shopping/mcp.openrpc.json").is_none());
        assert!(sibling_schema_url("https://ucp.dev/schema.json").is_none());
    }
}
