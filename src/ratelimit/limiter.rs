//! Core rate limiter implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, trace, warn};

use super::backend::RateLimitBackend;
use super::cache::RuleCache;
use super::clock::Clock;
use super::counter::CounterStore;
use super::decision::Decision;
use super::key::{CounterKey, GENERAL_SCOPE};
use super::pattern::PatternMatcher;
use super::rules::{Rule, RuleKind};
use super::window::FixedWindow;
use crate::error::Result;

/// The decision engine that checks requests against a tenant's rules.
///
/// Rules come from a [`RuleCache`]; counts are kept in a [`CounterStore`].
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    rules: Arc<RuleCache>,
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    patterns: PatternMatcher,
}

impl RateLimiter {
    /// Create a rate limiter from its collaborators.
    pub fn new(rules: Arc<RuleCache>, counters: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules,
            counters,
            clock,
            patterns: PatternMatcher::new(),
        }
    }

    /// The rule cache used by this limiter.
    pub fn rule_cache(&self) -> &Arc<RuleCache> {
        &self.rules
    }

    /// Check the rate limit for one request.
    ///
    /// Rules are evaluated tenant-wide first, then per source address, then
    /// per target pattern. The first rule whose count exceeds its limit denies
    /// the request. If every applicable rule passes, the decision carries the
    /// figures of the last rule evaluated.
    ///
    /// This never fails: any error while loading rules or counting is logged
    /// and the request is allowed.
    #[instrument(skip(self, source_address), fields(source = %source_address))]
    pub async fn check_rate_limit(
        &self,
        tenant_id: &str,
        source_address: &str,
        target: Option<&str>,
    ) -> Decision {
        match self.evaluate(tenant_id, source_address, target).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Rate limit evaluation failed, allowing request"
                );
                Decision::fail_open()
            }
        }
    }

    async fn evaluate(
        &self,
        tenant_id: &str,
        source_address: &str,
        target: Option<&str>,
    ) -> Result<Decision> {
        let rules = self.rules.rules_for(tenant_id).await?;
        if rules.is_empty() {
            return Ok(Decision::unrestricted());
        }

        let now = self.clock.now_secs();
        let mut last_checked: Option<Decision> = None;

        for kind in RuleKind::EVALUATION_ORDER {
            for rule in rules.iter().filter(|r| r.kind() == kind) {
                let Some(scope) = self.scope_for(rule, source_address, target) else {
                    continue;
                };

                let window = FixedWindow::new(rule.window_secs());
                let index = window.index(now);
                let key = CounterKey::new(tenant_id, kind, scope, index);

                let count = self
                    .counters
                    .increment_and_get_count(&key.to_store_key(), rule.window_secs())
                    .await?;
                let reset = window.reset(index);

                trace!(
                    key = %key,
                    count = count,
                    limit = rule.limit(),
                    "Checked rule"
                );

                if count > rule.limit() {
                    debug!(
                        key = %key,
                        rule_id = %rule.id(),
                        count = count,
                        limit = rule.limit(),
                        "Rate limit exceeded"
                    );
                    return Ok(Decision::exceeded(rule, reset));
                }

                last_checked = Some(Decision::within(rule, count, reset));
            }
        }

        Ok(last_checked.unwrap_or_else(Decision::unrestricted))
    }

    /// The scope a rule counts against for this request, or `None` if the
    /// rule does not apply to it.
    fn scope_for<'a>(
        &self,
        rule: &Rule,
        source_address: &'a str,
        target: Option<&'a str>,
    ) -> Option<&'a str> {
        match rule.kind() {
            RuleKind::TenantWide => Some(GENERAL_SCOPE),
            RuleKind::BySource => Some(source_address),
            RuleKind::ByTargetPattern => {
                let target = target?;
                let pattern = rule.pattern()?;
                self.patterns.matches(pattern, target).then_some(target)
            }
        }
    }
}

#[async_trait]
impl RateLimitBackend for RateLimiter {
    async fn check_rate_limit(
        &self,
        tenant_id: &str,
        source_address: &str,
        target: Option<&str>,
    ) -> Decision {
        RateLimiter::check_rate_limit(self, tenant_id, source_address, target).await
    }
}
