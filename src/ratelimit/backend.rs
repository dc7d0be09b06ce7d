//! Decision API exposed to the request-facing layer.

use async_trait::async_trait;

use super::decision::Decision;

/// Trait for rate limit decision providers.
///
/// The request-facing layer depends on this trait rather than on
/// [`super::RateLimiter`] directly, so it can be driven by a stub in its own
/// tests. Implementations never fail; internal errors must be folded into a
/// [`Decision`].
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Decide whether one request from `source_address`, optionally aimed at
    /// `target`, may proceed for `tenant_id`.
    async fn check_rate_limit(
        &self,
        tenant_id: &str,
        source_address: &str,
        target: Option<&str>,
    ) -> Decision;
}
