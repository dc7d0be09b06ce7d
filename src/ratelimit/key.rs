//! Counter key generation.

use std::fmt;

use super::rules::RuleKind;

/// Prefix shared by every counter key.
pub const KEY_PREFIX: &str = "rate_limit";

/// Scope identifier used by tenant-wide rules.
pub const GENERAL_SCOPE: &str = "general";

/// A key that uniquely identifies one window counter.
///
/// Rendered as `rate_limit:{tenant}:{kind}:{scope}:{window}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The tenant owning the rule
    pub tenant_id: String,
    /// The kind of rule being counted
    pub kind: RuleKind,
    /// Sentinel, source address, or target identifier
    pub scope: String,
    /// Fixed window index
    pub window: u64,
}

impl CounterKey {
    /// Create a new counter key.
    pub fn new(tenant_id: &str, kind: RuleKind, scope: &str, window: u64) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            kind,
            scope: scope.to_string(),
            window,
        }
    }

    /// Render the key as stored in the counter store.
    pub fn to_store_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            KEY_PREFIX, self.tenant_id, self.kind, self.scope, self.window
        )
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}
