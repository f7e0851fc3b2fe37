//! Capability inspection: what a store's checkout service can do, from its
//! manifest and the OpenRPC schema the manifest points at.

use crate::config::UcpConfig;
use crate::manifest::ManifestResolver;
use crate::schema::SchemaClient;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::instrument;
use ucp_core::{ManifestMeta, SchemaMeta, UcpError, UcpResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityReport {
    pub endpoint: String,
    pub schema_url: String,
    pub methods: Vec<String>,
    pub supports_catalog: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ucp_version: Option<String>,
    pub capabilities: Vec<Value>,
    pub manifest: ManifestMeta,
    pub schema: SchemaMeta,
}

impl fmt::Display for CapabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "UCP MCP Endpoint: {}", self.endpoint)?;
        if self.methods.is_empty() {
            writeln!(f, "Methods: None")?;
        } else {
            writeln!(f, "Methods: {}", self.methods.join(", "))?;
        }
        write!(
            f,
            "Catalog/List Support: {}",
            if self.supports_catalog { "yes" } else { "no" }
        )
    }
}

pub struct CapabilityInspector {
    manifests: ManifestResolver,
    schemas: SchemaClient,
}

impl CapabilityInspector {
    pub fn new(config: &UcpConfig) -> UcpResult<Self> {
        Ok(Self {
            manifests: ManifestResolver::new(config)?,
            schemas: SchemaClient::new(config)?,
        })
    }

    pub fn from_parts(manifests: ManifestResolver, schemas: SchemaClient) -> Self {
        Self { manifests, schemas }
    }

    /// Endpoint, schema location, declared methods and catalog support.
    /// Each error names the piece that could not be found.
    #[instrument(skip(self))]
    pub async fn inspect(&self, store_url: &str) -> UcpResult<CapabilityReport> {
        let (endpoint, manifest_meta) = self.manifests.resolve(store_url).await;

        let Some(endpoint) = endpoint else {
            return Err(UcpError::Resolution(format!(
                "UCP shopping endpoint unavailable: {}",
                manifest_meta.error_or("manifest not found")
            )));
        };
        let Some(schema_url) = manifest_meta.schema_url.clone() else {
            return Err(UcpError::Resolution(
                "manifest does not advertise a UCP MCP schema".to_string(),
            ));
        };

        let (schema, schema_meta) = self.schemas.fetch(&schema_url).await;
        let Some(schema) = schema else {
            return Err(UcpError::Resolution(format!(
                "UCP MCP schema unavailable: {}",
                schema_meta.error.as_deref().unwrap_or("unknown")
            )));
        };

        Ok(CapabilityReport {
            endpoint,
            schema_url: schema_meta.url.clone(),
            methods: SchemaClient::list_methods(&schema),
            supports_catalog: SchemaClient::supports_catalog(&schema),
            ucp_version: manifest_meta.ucp_version.clone(),
            capabilities: manifest_meta.capabilities.clone(),
            manifest: manifest_meta,
            schema: schema_meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use temp_dir::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn inspector(dir: &TempDir) -> CapabilityInspector {
        let config = UcpConfig::default().with_cache_dir(dir.path());
        CapabilityInspector::new(&config).unwrap()
    }

    async fn mount_manifest(server: &MockServer, schema: Option<String>) {
        let mut mcp = json!({"endpoint": "http://shop.example.com/api/mcp"});
        if let Some(schema) = schema {
            mcp["schema"] = Value::String(schema);
        }
        Mock::given(method("GET"))
            .and(path("/.well-known/ucp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ucp": {"version": "2026-01-11", "services": {"ucp.shopping": {"mcp": mcp}}}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_inspect_reports_methods() {
        let server = MockServer::start().await;
        mount_manifest(&server, Some(format!("{}/openrpc.json", server.uri()))).await;
        Mock::given(method("GET"))
            .and(path("/openrpc.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "methods": [{"name": "create_checkout"}, {"bad": true}, {"name": "complete_checkout"}]
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let report = inspector(&dir).inspect(&server.uri()).await.unwrap();

        assert_eq!(report.endpoint, "https://shop.example.com/api/mcp");
        assert_eq!(report.methods, vec!["create_checkout", "complete_checkout"]);
        assert!(!report.supports_catalog);
        assert_eq!(report.ucp_version.as_deref(), Some("2026-01-11"));
        assert_eq!(
            report.to_string(),
            "UCP MCP Endpoint: https://shop.example.com/api/mcp\n\
             Methods: create_checkout, complete_checkout\n\
             Catalog/List Support: no"
        );
    }

    #[tokio::test]
    async fn test_inspect_names_missing_schema() {
        let server = MockServer::start().await;
        mount_manifest(&server, None).await;

        let dir = TempDir::new().unwrap();
        let err = inspector(&dir).inspect(&server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("schema"));
    }

    #[tokio::test]
    async fn test_inspect_names_missing_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = inspector(&dir).inspect(&server.uri()).await.unwrap_err();
        assert!(matches!(err, UcpError::Resolution(_)));
        assert!(err.to_string().contains("404"));
    }
}
