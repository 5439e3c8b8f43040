use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber;

use turnstile::config::TurnstileConfig;
use turnstile::engine::{CounterStore, MemoryCounterStore, RedisCounterStore};
use turnstile::feature::{RateLimitFeature, RequestContext, Session};
use turnstile::settings::{ConfigSettings, SettingsStore, StaticSettings};

/// Run admission checks against a configured operation and print each verdict.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a YAML configuration file (also read as the limit settings
    /// source). Defaults apply when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Operation name to evaluate
    #[arg(long)]
    operation: String,

    /// Authenticated user id; omit to evaluate as an unauthenticated caller
    #[arg(long)]
    user: Option<String>,

    /// Number of evaluations to run
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Use an in-process counter store instead of Redis
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting Turnstile admission check");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let (config, settings): (TurnstileConfig, Arc<dyn SettingsStore>) = match &args.config {
        Some(path) => (
            TurnstileConfig::from_file(path)?,
            Arc::new(ConfigSettings::from_file(path)?),
        ),
        None => (TurnstileConfig::default(), Arc::new(StaticSettings::new())),
    };

    let store: Arc<dyn CounterStore> = if args.memory {
        info!("Using in-process counter store");
        Arc::new(MemoryCounterStore::new())
    } else {
        info!(url = %config.store.url, "Connecting to counter store");
        Arc::new(RedisCounterStore::connect(&config.store.url, settings.clone()).await?)
    };

    let feature = RateLimitFeature::new(config, settings, store);

    let request = RequestContext {
        operation_name: args.operation.clone(),
        session: args.user.as_ref().map(|user_id| Session {
            user_id: user_id.clone(),
            authenticated: true,
        }),
        correlation_id: None,
    };

    for attempt in 1..=args.count {
        let admission = feature.process(&request).await?;

        println!(
            "#{attempt}: {}",
            if admission.allowed() { "allow" } else { "deny" }
        );
        for header in &admission.headers {
            println!("  {}: {}", header.name, header.value);
        }
        if let Some(decision) = &admission.decision {
            println!("  -> {} {}", decision.status_code, decision.description);
        }
    }

    Ok(())
}
