//! # JSON-RPC Client
//!
//! JSON-RPC 2.0 over HTTP POST. Only transport failures are errors here; a
//! well-formed `error` envelope from the store comes back as
//! [`RpcOutcome::Failure`] for the caller to classify.

use crate::http::{build_client, transport_error};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, instrument};
use ucp_core::{AuthHeader, JsonRpcError, UcpError, UcpResult};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: &'a Value,
}

/// Parsed response of a JSON-RPC call
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    Success { result: Value, raw: Value },
    Failure { error: JsonRpcError, raw: Value },
}

impl RpcOutcome {
    /// Interpret a response body. `None` if it is not a JSON-RPC envelope.
    fn from_body(raw: Value) -> Option<Self> {
        let obj = raw.as_object()?;
        if let Some(err) = obj.get("error").filter(|e| !e.is_null()) {
            return Some(RpcOutcome::Failure {
                error: JsonRpcError::from_value(err),
                raw: raw.clone(),
            });
        }
        if !obj.contains_key("result") && !obj.contains_key("jsonrpc") {
            return None;
        }
        let result = obj.get("result").cloned().unwrap_or(Value::Null);
        Some(RpcOutcome::Success { result, raw })
    }

    pub fn raw(&self) -> &Value {
        match self {
            RpcOutcome::Success { raw, .. } | RpcOutcome::Failure { raw, .. } => raw,
        }
    }

    /// The result (or the whole envelope when `result` is null);
    /// remote errors become [`UcpError::Application`].
    pub fn into_result(self) -> UcpResult<Value> {
        match self {
            RpcOutcome::Success { result, raw } => {
                if result.is_null() {
                    Ok(raw)
                } else {
                    Ok(result)
                }
            }
            RpcOutcome::Failure { error, .. } => Err(UcpError::Application(error)),
        }
    }
}

#[derive(Clone)]
pub struct JsonRpcClient {
    client: Client,
    timeout: Duration,
}

impl JsonRpcClient {
    pub fn new(timeout: Duration) -> UcpResult<Self> {
        Ok(Self::with_client(build_client(timeout)?, timeout))
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// POST `{jsonrpc:"2.0", id, method, params}` to `endpoint`
    #[instrument(skip(self, params, auth), fields(endpoint = %endpoint))]
    pub async fn call(
        &self,
        endpoint: &str,
        method: &str,
        params: &Value,
        auth: Option<&AuthHeader>,
    ) -> UcpResult<RpcOutcome> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Uuid::new_v4().to_string(),
            method,
            params,
        };

        debug!("JSON-RPC call {} id={}", method, request.id);

        let mut builder = self.client.post(endpoint).timeout(self.timeout).json(&request);
        if let Some(header) = auth {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        let parsed = serde_json::from_str::<Value>(&body).ok();
        let outcome = parsed.clone().and_then(RpcOutcome::from_body);

        match (outcome, parsed) {
            (Some(outcome), _) => Ok(outcome),
            (None, _) if !status.is_success() => {
                error!("JSON-RPC {} failed: status={}, body={}", method, status, body);
                Err(UcpError::http_status(status.as_u16(), endpoint))
            }
            // Bare object from a 2xx reply: no result, caller renders the body
            (None, Some(raw)) if raw.is_object() => Ok(RpcOutcome::Success {
                result: Value::Null,
                raw,
            }),
            (None, _) => Err(UcpError::transport(format!(
                "{} returned a body that is not a JSON-RPC response",
                endpoint
            ))),
        }
    }
}
