//! Rate limiting logic and state management.

mod backend;
mod cache;
mod clock;
mod counter;
mod decision;
mod key;
mod limiter;
mod pattern;
mod redis;
mod rules;
mod window;

pub use backend::RateLimitBackend;
pub use cache::{RuleCache, DEFAULT_RULE_CACHE_TTL_SECS};
pub use clock::{Clock, MockClock, SystemClock};
pub use counter::{CounterStore, MemoryCounterStore};
pub use decision::{Decision, FAIL_OPEN_EXPLANATION};
pub use key::{CounterKey, GENERAL_SCOPE, KEY_PREFIX};
pub use limiter::RateLimiter;
pub use pattern::{compile_pattern, PatternMatcher, WILDCARD};
pub use self::redis::RedisCounterStore;
pub use rules::{
    FileRuleStore, MemoryRuleStore, Rule, RuleConfig, RuleKind, RuleStore, RulesDocument,
    Tenant, TenantConfig,
};
pub use window::FixedWindow;
