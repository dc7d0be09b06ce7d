use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tenant_limiter::config::{CounterBackend, LimiterConfig};
use tenant_limiter::ratelimit::{
    Clock, CounterStore, FileRuleStore, MemoryCounterStore, RateLimitBackend, RateLimiter,
    RedisCounterStore, RuleCache, RuleStore, SystemClock,
};

/// Evaluate per-tenant rate limits from the command line.
#[derive(Debug, Parser)]
#[command(name = "tenant-limiter", version, about)]
struct Cli {
    /// Path to the limiter configuration file
    #[arg(short, long, env = "TENANT_LIMITER_CONFIG")]
    config: Option<String>,

    /// Override the rules document path from the configuration
    #[arg(short, long)]
    rules: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check one or more requests and print each decision as JSON
    Check {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: Option<String>,
        /// Number of consecutive requests to check
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Print the rules configured for a tenant as JSON
    Rules {
        #[arg(long)]
        tenant: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Tenant Limiter {}", env!("CARGO_PKG_VERSION"));

    let mut config = LimiterConfig::load(cli.config.as_deref())?;
    if let Some(rules) = cli.rules {
        config.rate_limiting.rules_path = Some(rules);
    }

    let rules_path = config
        .rate_limiting
        .rules_path
        .clone()
        .context("no rules document configured (use --rules or rate_limiting.rules_path)")?;
    let rule_store: Arc<dyn RuleStore> = Arc::new(FileRuleStore::new(&rules_path));
    info!(rules_path = %rules_path, "Rule store configured");

    match cli.command {
        Command::Rules { tenant } => {
            let rules = rule_store.fetch_rules(&tenant).await?;
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        Command::Check {
            tenant,
            source,
            target,
            count,
        } => {
            let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
            let counters = counter_store(&config, clock.clone()).await?;
            let cache = Arc::new(RuleCache::with_ttl(
                rule_store,
                clock.clone(),
                config.rate_limiting.rule_cache_ttl_secs,
            ));
            let limiter = RateLimiter::new(cache, counters, clock);

            run_checks(&limiter, &tenant, &source, target.as_deref(), count).await?;
        }
    }

    Ok(())
}

async fn counter_store(
    config: &LimiterConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn CounterStore>> {
    let store: Arc<dyn CounterStore> = match config.counter_store.backend {
        CounterBackend::Memory => Arc::new(MemoryCounterStore::new(clock)),
        CounterBackend::Redis => Arc::new(
            RedisCounterStore::connect(&config.counter_store)
                .await
                .context("connecting to Redis counter store")?,
        ),
    };
    info!(backend = ?config.counter_store.backend, "Counter store initialized");
    Ok(store)
}

async fn run_checks<B: RateLimitBackend>(
    backend: &B,
    tenant: &str,
    source: &str,
    target: Option<&str>,
    count: u32,
) -> anyhow::Result<()> {
    for _ in 0..count.max(1) {
        let decision = backend.check_rate_limit(tenant, source, target).await;
        println!("{}", serde_json::to_string(&decision)?);
    }
    Ok(())
}
