//! Shared HTTP plumbing: client construction, error mapping and the retry
//! loop that executes a [`RetryPolicy`].

use reqwest::{redirect, Client, Response};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use ucp_core::{RetryPolicy, UcpError, UcpResult};

/// Client with a default timeout; redirects follow reqwest's default policy
pub fn build_client(timeout: Duration) -> UcpResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| UcpError::Configuration(format!("failed to create HTTP client: {}", e)))
}

/// Client that never follows redirects and sends no custom headers
pub fn build_plain_client(timeout: Duration) -> UcpResult<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .build()
        .map_err(|e| UcpError::Configuration(format!("failed to create HTTP client: {}", e)))
}

/// Map a reqwest failure to a transport error; timeouts are not special
pub fn transport_error(err: reqwest::Error) -> UcpError {
    let message = if err.is_timeout() {
        format!("request timed out: {}", err)
    } else {
        err.to_string()
    };
    UcpError::Transport {
        message,
        status: err.status().map(|s| s.as_u16()),
    }
}

/// Turn a non-success response into a transport error carrying its status
pub fn ensure_success(response: Response) -> UcpResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(UcpError::http_status(status.as_u16(), response.url().as_str()))
    }
}

/// GET `url` and parse the body as JSON
pub async fn get_json(client: &Client, url: &str, timeout: Duration) -> UcpResult<Value> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(transport_error)?;
    let response = ensure_success(response)?;
    let body = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&body)
        .map_err(|e| UcpError::Serialization(format!("invalid JSON from {}: {}", url, e)))
}

/// Run `op` until it succeeds or the policy says stop.
/// `op` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> UcpResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = UcpResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if policy.should_retry(attempt, &err) => {
                attempt += 1;
                let delay = policy.delay_before(attempt);
                warn!(
                    "{} attempt {} failed: {}; retrying in {:?}",
                    label,
                    attempt - 1,
                    err,
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use ucp_core::RetryOn;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_with_retry_stops_on_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result = with_retry(&policy, "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(UcpError::http_status(503, "u"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result: UcpResult<()> = with_retry(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(UcpError::transport("refused")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_skips_non_transport() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result: UcpResult<()> = with_retry(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(UcpError::Validation("bad".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_json_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let err = get_json(&client, &format!("{}/missing", server.uri()), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_and_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let timeout = Duration::from_millis(100);
        let client = build_client(timeout).unwrap();
        let url = format!("{}/slow", server.uri());
        let policy = RetryPolicy::fixed(2, Duration::ZERO).with_retry_on(RetryOn::ServerErrors);

        let (client, url) = (&client, url.as_str());
        let err = with_retry(&policy, "slow", move |_| get_json(client, url, timeout))
            .await
            .unwrap_err();

        assert!(matches!(err, UcpError::Transport { status: None, .. }));
        assert!(err.to_string().contains("timed out"));
        assert!(err.is_retryable());
    }
}
