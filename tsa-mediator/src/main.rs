//! Operator entrypoint for the timestamp authority mediator.
//!
//! Wires the six core components together and exposes a small CLI
//! (`policy show|set`, `health`, `issue`) rather than a REST surface — the
//! REST/HTTP layer is an explicit non-goal of this crate. Each invocation
//! is a short-lived process: tenant policy is round-tripped through a JSON
//! file (see [`config::PolicyStore`]) since the in-memory `PolicyManager`
//! does not persist across runs, and `health`/`issue` perform their own
//! live provider round trips rather than reading a background probe loop's
//! state.

mod cli;
mod collaborators;
mod config;
mod sig_down;

use std::collections::BTreeMap;
use std::process;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use tsa_core::adapter::{HttpProviderAdapter, ProviderAdapter};
use tsa_core::failover::FailoverController;
use tsa_core::health::HealthMonitor;
use tsa_core::orchestrator::RequestOrchestrator;
use tsa_core::policy::PolicyManager;

use crate::config::{CliArgs, Command, Config};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli_args = CliArgs::parse();
    let config = Config::load(&cli_args.config)?;

    let client = reqwest::Client::builder().build()?;
    let adapters: BTreeMap<String, Arc<dyn ProviderAdapter>> = config
        .providers
        .iter()
        .map(|p| {
            let adapter: Arc<dyn ProviderAdapter> = Arc::new(HttpProviderAdapter::new(p.id.clone(), p.endpoint.clone(), client.clone()));
            (p.id.clone(), adapter)
        })
        .collect();

    let health = Arc::new(HealthMonitor::new(config.probe_interval()));
    let failover = Arc::new(FailoverController::new(
        adapters.clone(),
        Arc::clone(&health),
        config.hedge_delay(),
        config.attempt_timeout(),
    ));

    let policy_manager = Arc::new(PolicyManager::new(config.provider_ids()));
    let store = config::load_policy_store(&config.policy_store_path)?;
    for (tenant_id, policy) in &store {
        if let Err(errors) = policy_manager.save(tenant_id, policy.clone()) {
            tracing::warn!(tenant_id, ?errors, "persisted policy failed re-validation on load");
        }
    }

    let validator = Arc::new(collaborators::default_validator(vec![]));
    let orchestrator = Arc::new(RequestOrchestrator::new(
        Arc::clone(&policy_manager),
        Arc::clone(&failover),
        Arc::clone(&validator),
        config.overall_deadline(),
    ));

    match cli_args.command {
        Command::PolicyShow { tenant } => cli::policy_show(&policy_manager, &tenant),
        Command::PolicySet { tenant, file } => cli::policy_set(&policy_manager, &config.policy_store_path, &tenant, &file),
        Command::Health => cli::health(&adapters, &health, config.attempt_timeout()).await,
        Command::Issue { tenant, digest_hex } => cli::issue(&orchestrator, &tenant, &digest_hex).await,
        Command::Watch => cli::watch(&adapters, &health, config.attempt_timeout()).await,
    }
}
