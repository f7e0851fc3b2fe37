//! # Retry Policy
//!
//! Attempt count, backoff schedule and retryable-failure predicate shared by
//! the manifest, schema and storefront fetchers. The policy only decides;
//! the HTTP layer does the sleeping.

use crate::error::UcpError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which failures are worth another attempt
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "on", content = "statuses")]
pub enum RetryOn {
    /// Any transport failure, including every non-success status
    #[default]
    AnyFailure,
    /// Connection errors and 5xx responses
    ServerErrors,
    /// Connection errors and the listed statuses
    Statuses(Vec<u16>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first; zero behaves like one
    pub max_attempts: u32,

    /// Delay before attempt n+1 is `backoff[n-1]`; the last entry repeats
    #[serde(default, with = "millis")]
    pub backoff: Vec<Duration>,

    #[serde(default)]
    pub retry_on: RetryOn,
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Vec::new(),
            retry_on: RetryOn::AnyFailure,
        }
    }

    /// `max_attempts` attempts separated by a fixed delay
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: vec![delay],
            retry_on: RetryOn::AnyFailure,
        }
    }

    /// Storefront product lookups: two attempts, one second apart
    pub fn storefront() -> Self {
        Self::fixed(2, Duration::from_secs(1))
    }

    /// Builder: restrict which failures are retried
    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait before the given 1-based attempt
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let idx = (attempt as usize - 2).min(self.backoff.len() - 1);
        self.backoff[idx]
    }

    /// Whether `error` from the given 1-based attempt warrants another one
    pub fn should_retry(&self, attempt: u32, error: &UcpError) -> bool {
        if attempt >= self.attempts() || !error.is_retryable() {
            return false;
        }
        match (&self.retry_on, error.status()) {
            (RetryOn::AnyFailure, _) => true,
            (_, None) => true,
            (RetryOn::ServerErrors, Some(status)) => status >= 500,
            (RetryOn::Statuses(statuses), Some(status)) => statuses.contains(&status),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
        let millis: Vec<u64> = value.iter().map(|d| d.as_millis() as u64).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Duration>, D::Error> {
        let millis = Vec::<u64>::deserialize(deserializer)?;
        Ok(millis.into_iter().map(Duration::from_millis).collect())
    }
}
