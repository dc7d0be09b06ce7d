//! Tenants, rate limit rules, and the stores that hold them.
//!
//! Rules are loaded per tenant through the [`RuleStore`] trait. Two stores are
//! provided: [`MemoryRuleStore`], which accepts registrations at runtime, and
//! [`FileRuleStore`], which reads a YAML document of tenants and their rules.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LimiterError, Result};

/// The scope a rule counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    /// One counter for all of a tenant's traffic.
    #[serde(rename = "general", alias = "tenant_wide")]
    TenantWide,
    /// One counter per source address.
    #[serde(rename = "ip", alias = "by_source")]
    BySource,
    /// One counter per target identifier matching the rule's pattern.
    #[serde(rename = "api", alias = "by_target_pattern")]
    ByTargetPattern,
}

impl RuleKind {
    /// Kinds in the order the evaluator checks them.
    pub const EVALUATION_ORDER: [RuleKind; 3] = [
        RuleKind::TenantWide,
        RuleKind::BySource,
        RuleKind::ByTargetPattern,
    ];

    /// Name used in counter keys and explanations.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::TenantWide => "general",
            RuleKind::BySource => "ip",
            RuleKind::ByTargetPattern => "api",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant owning zero or more rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a tenant, rejecting an empty identifier.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(LimiterError::Validation(
                "tenant id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id,
            name: name.into(),
            created_at: Utc::now(),
        })
    }
}

/// A validated rate limit rule belonging to one tenant.
///
/// Fields are private so every rule goes through [`Rule::new`], which enforces
/// `limit > 0`, `window_secs > 0`, and a pattern present exactly when the kind
/// is [`RuleKind::ByTargetPattern`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    id: Uuid,
    tenant_id: String,
    kind: RuleKind,
    limit: u64,
    window_secs: u64,
    pattern: Option<String>,
    created_at: DateTime<Utc>,
}

impl Rule {
    /// Create a new rule with a fresh identifier.
    pub fn new(
        tenant_id: impl Into<String>,
        kind: RuleKind,
        limit: u64,
        window_secs: u64,
        pattern: Option<String>,
    ) -> Result<Self> {
        Self::with_id(Uuid::new_v4(), tenant_id, kind, limit, window_secs, pattern)
    }

    /// Create a rule with a known identifier.
    pub fn with_id(
        id: Uuid,
        tenant_id: impl Into<String>,
        kind: RuleKind,
        limit: u64,
        window_secs: u64,
        pattern: Option<String>,
    ) -> Result<Self> {
        let tenant_id = tenant_id.into();

        if limit == 0 {
            return Err(LimiterError::Validation(format!(
                "rule for tenant {}: limit must be positive",
                tenant_id
            )));
        }
        if window_secs == 0 {
            return Err(LimiterError::Validation(format!(
                "rule for tenant {}: window must be positive",
                tenant_id
            )));
        }

        let pattern = pattern.filter(|p| !p.is_empty());
        match (kind, &pattern) {
            (RuleKind::ByTargetPattern, None) => {
                return Err(LimiterError::Validation(format!(
                    "rule for tenant {}: {} rules require a pattern",
                    tenant_id, kind
                )));
            }
            (RuleKind::TenantWide | RuleKind::BySource, Some(_)) => {
                return Err(LimiterError::Validation(format!(
                    "rule for tenant {}: {} rules must not have a pattern",
                    tenant_id, kind
                )));
            }
            _ => {}
        }

        if let Some(ref p) = pattern {
            super::pattern::compile_pattern(p)?;
        }

        Ok(Self {
            id,
            tenant_id,
            kind,
            limit,
            window_secs,
            pattern,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// Maximum requests allowed per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Target pattern; present only for [`RuleKind::ByTargetPattern`].
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Source of per-tenant rule sets.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Fetch the ordered rules for a tenant.
    ///
    /// An unknown tenant yields an empty collection, never an error. Transport
    /// failures surface as [`LimiterError::StoreUnavailable`].
    async fn fetch_rules(&self, tenant_id: &str) -> Result<Vec<Rule>>;
}

/// In-process rule store accepting tenant registrations and rule creation.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    tenants: DashMap<String, Tenant>,
    rules: DashMap<String, Vec<Rule>>,
}

impl MemoryRuleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tenant. Registering an existing id is rejected.
    pub fn register_tenant(&self, id: &str, name: &str) -> Result<Tenant> {
        let tenant = Tenant::new(id, name)?;

        match self.tenants.entry(tenant.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(LimiterError::Validation(format!(
                "tenant {} already registered",
                tenant.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tenant.clone());
                info!(tenant_id = %tenant.id, "Registered tenant");
                Ok(tenant)
            }
        }
    }

    /// Look up a registered tenant.
    pub fn tenant(&self, id: &str) -> Option<Tenant> {
        self.tenants.get(id).map(|t| t.clone())
    }

    /// Append a rule to its tenant's rule set. The tenant must be registered.
    pub fn add_rule(&self, rule: Rule) -> Result<()> {
        if !self.tenants.contains_key(rule.tenant_id()) {
            return Err(LimiterError::Validation(format!(
                "unknown tenant {}",
                rule.tenant_id()
            )));
        }

        debug!(
            tenant_id = %rule.tenant_id(),
            rule_id = %rule.id(),
            kind = %rule.kind(),
            limit = rule.limit(),
            window_secs = rule.window_secs(),
            "Adding rule"
        );
        self.rules
            .entry(rule.tenant_id().to_string())
            .or_default()
            .push(rule);
        Ok(())
    }

    /// Load every tenant and rule from a parsed rules document.
    pub fn from_document(document: RulesDocument) -> Result<Self> {
        let store = Self::new();
        for tenant in document.tenants {
            let name = tenant.name.clone().unwrap_or_else(|| tenant.id.clone());
            store.register_tenant(&tenant.id, &name)?;
            for rule in tenant.into_rules()? {
                store.add_rule(rule)?;
            }
        }
        Ok(store)
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn fetch_rules(&self, tenant_id: &str) -> Result<Vec<Rule>> {
        Ok(self
            .rules
            .get(tenant_id)
            .map(|rules| rules.clone())
            .unwrap_or_default())
    }
}

/// A YAML document declaring tenants and their rules.
///
/// ```yaml
/// tenants:
///   - id: acme
///     name: Acme Corp
///     rules:
///       - kind: general
///         limit: 1000
///         window_secs: 60
///       - kind: api
///         limit: 10
///         window_secs: 60
///         pattern: "/api/users/*"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesDocument {
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

/// A tenant entry in a rules document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// A rule entry in a rules document, validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub kind: RuleKind,
    pub limit: u64,
    pub window_secs: u64,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl TenantConfig {
    /// Convert this tenant's rule entries into validated rules, in order.
    pub fn into_rules(self) -> Result<Vec<Rule>> {
        let tenant_id = self.id;
        self.rules
            .into_iter()
            .map(|r| {
                Rule::with_id(
                    r.id.unwrap_or_else(Uuid::new_v4),
                    tenant_id.clone(),
                    r.kind,
                    r.limit,
                    r.window_secs,
                    r.pattern,
                )
            })
            .collect()
    }
}

impl RulesDocument {
    /// Parse a rules document from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse rules document: {}", e)))
    }

    /// Validate every rule and group them by tenant, preserving declaration order.
    pub fn into_rule_sets(self) -> Result<HashMap<String, Vec<Rule>>> {
        let mut sets: HashMap<String, Vec<Rule>> = HashMap::new();
        for tenant in self.tenants {
            let id = tenant.id.clone();
            let rules = tenant.into_rules()?;
            sets.entry(id).or_default().extend(rules);
        }
        Ok(sets)
    }
}

/// Rule store backed by a YAML rules document on disk.
///
/// The file is re-read on every fetch, so edits take effect once the rule
/// cache entry for a tenant expires. Failure to read the file is reported as
/// [`LimiterError::StoreUnavailable`].
#[derive(Debug, Clone)]
pub struct FileRuleStore {
    path: PathBuf,
}

impl FileRuleStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn fetch_rules(&self, tenant_id: &str) -> Result<Vec<Rule>> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            LimiterError::StoreUnavailable(format!(
                "reading rules from {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let mut sets = RulesDocument::from_yaml(&contents)?.into_rule_sets()?;
        Ok(sets.remove(tenant_id).unwrap_or_default())
    }
}
