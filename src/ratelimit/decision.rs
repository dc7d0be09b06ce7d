//! The outcome of one rate limit evaluation.

use serde::{Deserialize, Serialize};

use super::rules::Rule;

/// Explanation attached to decisions produced after an internal failure.
pub const FAIL_OPEN_EXPLANATION: &str = "rate limiter error, allowing request";

/// Result of checking one request against a tenant's rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_epoch_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Decision {
    /// Allowed with no figures; used when no rule applied.
    pub fn unrestricted() -> Self {
        Self {
            allowed: true,
            ..Default::default()
        }
    }

    /// Allowed because evaluation failed.
    pub fn fail_open() -> Self {
        Self {
            allowed: true,
            explanation: Some(FAIL_OPEN_EXPLANATION.to_string()),
            ..Default::default()
        }
    }

    /// Allowed, reporting the headroom of the given rule.
    pub fn within(rule: &Rule, count: u64, reset_epoch_seconds: u64) -> Self {
        Self {
            allowed: true,
            limit: Some(rule.limit()),
            remaining: Some(rule.limit().saturating_sub(count)),
            reset_epoch_seconds: Some(reset_epoch_seconds),
            explanation: None,
        }
    }

    /// Denied by the given rule.
    pub fn exceeded(rule: &Rule, reset_epoch_seconds: u64) -> Self {
        Self {
            allowed: false,
            limit: Some(rule.limit()),
            remaining: Some(0),
            reset_epoch_seconds: Some(reset_epoch_seconds),
            explanation: Some(format!(
                "Rate limit exceeded for {} rule: {} requests per {} seconds",
                rule.kind(),
                rule.limit(),
                rule.window_secs()
            )),
        }
    }

    /// Conventional rate limit response headers for this decision.
    ///
    /// Empty when no rule applied.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(limit) = self.limit {
            headers.push(("X-RateLimit-Limit", limit.to_string()));
        }
        if let Some(remaining) = self.remaining {
            headers.push(("X-RateLimit-Remaining", remaining.to_string()));
        }
        if let Some(reset) = self.reset_epoch_seconds {
            headers.push(("X-RateLimit-Reset", reset.to_string()));
        }
        headers
    }
}
