//! # Auth Headers
//!
//! Header construction for authenticated JSON-RPC calls to a store.

use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTH_HEADER: &str = "Authorization";
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

/// A single header to attach to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub name: String,
    pub value: String,
}

/// Default credentials used when a call does not supply its own token
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token used when the caller passes none
    #[serde(default)]
    pub default_token: Option<String>,

    /// Header name, `Authorization` unless a store wants something else
    #[serde(default = "default_header")]
    pub header: String,

    /// Scheme prefix, only applied to the `Authorization` header
    #[serde(default)]
    pub scheme: Option<String>,
}

fn default_header() -> String {
    DEFAULT_AUTH_HEADER.to_string()
}

impl AuthConfig {
    pub fn new(default_token: Option<String>) -> Self {
        Self {
            default_token,
            header: DEFAULT_AUTH_HEADER.to_string(),
            scheme: Some(DEFAULT_AUTH_SCHEME.to_string()),
        }
    }

    /// Builder: custom header name
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Builder: custom scheme, `None` sends the raw token
    pub fn with_scheme(mut self, scheme: Option<String>) -> Self {
        self.scheme = scheme;
        self
    }

    /// Header for an explicit token, or the configured default.
    /// Returns `None` when no token is resolvable.
    pub fn header_for(&self, token: Option<&str>) -> Option<AuthHeader> {
        let token = token
            .filter(|t| !t.is_empty())
            .or(self.default_token.as_deref().filter(|t| !t.is_empty()))?;

        let name = if self.header.trim().is_empty() {
            DEFAULT_AUTH_HEADER.to_string()
        } else {
            self.header.clone()
        };

        let scheme = self.scheme.as_deref().filter(|s| !s.is_empty());
        let value = match scheme {
            Some(scheme) if name.eq_ignore_ascii_case(DEFAULT_AUTH_HEADER) => {
                format!("{} {}", scheme, token)
            }
            _ => token.to_string(),
        };

        Some(AuthHeader { name, value })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("default_token", &self.default_token.as_ref().map(|_| "***"))
            .field("header", &self.header)
            .field("scheme", &self.scheme)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_header() {
        let auth = AuthConfig::new(Some("tok".into()));
        let header = auth.header_for(None).unwrap();
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Bearer tok");
    }

    #[test]
    fn test_explicit_token_wins() {
        let auth = AuthConfig::new(Some("default".into()));
        assert_eq!(auth.header_for(Some("call")).unwrap().value, "Bearer call");
    }

    #[test]
    fn test_custom_header_uses_raw_token() {
        let auth = AuthConfig::new(Some("tok".into())).with_header("X-Shop-Token");
        let header = auth.header_for(None).unwrap();
        assert_eq!(header.name, "X-Shop-Token");
        assert_eq!(header.value, "tok");
    }

    #[test]
    fn test_no_scheme_uses_raw_token() {
        let auth = AuthConfig::new(Some("tok".into())).with_scheme(None);
        assert_eq!(auth.header_for(None).unwrap().value, "tok");
    }

    #[test]
    fn test_no_token_no_header() {
        assert!(AuthConfig::default().header_for(None).is_none());
        assert!(AuthConfig::default().header_for(Some("")).is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let auth = AuthConfig::new(Some("secret".into()));
        assert!(!format!("{:?}", auth).contains("secret"));
    }
}
