//! Operator binary configuration.
//!
//! Follows the workspace's usual pattern: a JSON file overlaid on
//! environment-variable/hardcoded defaults via serde, resolved once at
//! startup. Unlike the core crates (which are pure in-memory state), this
//! binary also owns the one bit of genuine persistence the mediator needs
//! across separate CLI invocations: tenant policies are round-tripped
//! through `policy_store_path` as JSON, since `tsa_core::policy::PolicyManager`
//! itself never touches disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use tsa_types::policy::TenantPolicy;

/// CLI arguments shared by every subcommand.
#[derive(Parser, Debug)]
#[command(name = "tsa-mediator")]
#[command(about = "Multi-provider RFC 3161/5816 timestamp authority mediator")]
pub struct CliArgs {
    /// Path to the JSON configuration file. Missing is not an error —
    /// every field has an environment/hardcoded fallback.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Print the resolved tenant policy, or the lazily-materialized default.
    PolicyShow {
        #[arg(long)]
        tenant: String,
    },
    /// Replace a tenant's policy with the one read from `--file` (JSON
    /// `TenantPolicy`), persisting the full accepted/rejected outcome to
    /// `policy_store_path`.
    PolicySet {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the current health snapshot for every configured provider.
    Health,
    /// Issue one timestamp for `tenant` over a hex-encoded SHA-256 digest.
    Issue {
        #[arg(long)]
        tenant: String,
        /// Hex-encoded message digest, already hashed by the caller.
        #[arg(long)]
        digest_hex: String,
    },
    /// Run the health monitor's synthetic probe scheduler (§4.2) until
    /// SIGINT/SIGTERM, printing each provider's status on every transition.
    Watch,
}

/// One provider's adapter wiring: its ID (must match the names used in
/// tenant `routing_priority`/trust anchors) and RFC 3161 HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub endpoint: String,
}

/// Resolved mediator configuration (§1 "hedge delay, per-attempt timeout,
/// overall deadline, probe interval, and policy-store path").
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_hedge_delay_ms")]
    pub hedge_delay_ms: u64,
    #[serde(default = "config_defaults::default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "config_defaults::default_overall_deadline_ms")]
    pub overall_deadline_ms: u64,
    #[serde(default = "config_defaults::default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "config_defaults::default_policy_store_path")]
    pub policy_store_path: PathBuf,
    #[serde(default = "config_defaults::default_providers")]
    pub providers: Vec<ProviderConfig>,
}

pub mod config_defaults {
    use super::ProviderConfig;
    use std::env;
    use std::path::PathBuf;

    pub const DEFAULT_HEDGE_DELAY_MS: u64 = 300;
    pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 5_000;
    pub const DEFAULT_OVERALL_DEADLINE_MS: u64 = 10_000;
    pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 10;
    pub const DEFAULT_POLICY_STORE_PATH: &str = "tsa-policies.json";

    fn env_u64(name: &str, default: u64) -> u64 {
        env::var(name).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
    }

    pub fn default_hedge_delay_ms() -> u64 {
        env_u64("TSA_HEDGE_DELAY_MS", DEFAULT_HEDGE_DELAY_MS)
    }

    pub fn default_attempt_timeout_ms() -> u64 {
        env_u64("TSA_ATTEMPT_TIMEOUT_MS", DEFAULT_ATTEMPT_TIMEOUT_MS)
    }

    pub fn default_overall_deadline_ms() -> u64 {
        env_u64("TSA_OVERALL_DEADLINE_MS", DEFAULT_OVERALL_DEADLINE_MS)
    }

    pub fn default_probe_interval_secs() -> u64 {
        env_u64("TSA_PROBE_INTERVAL_SECS", DEFAULT_PROBE_INTERVAL_SECS)
    }

    pub fn default_policy_store_path() -> PathBuf {
        env::var("TSA_POLICY_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_POLICY_STORE_PATH))
    }

    /// The three providers named in the shipped default tenant policy
    /// (`tsa_core::policy::default_policy`), pointed at their real public
    /// RFC 3161 endpoints. Overridable via the config file for staging/test
    /// providers.
    pub fn default_providers() -> Vec<ProviderConfig> {
        vec![
            ProviderConfig {
                id: "digicert".to_string(),
                endpoint: "http://timestamp.digicert.com".to_string(),
            },
            ProviderConfig {
                id: "globalsign".to_string(),
                endpoint: "http://timestamp.globalsign.com/tsa/r6advanced1".to_string(),
            },
            ProviderConfig {
                id: "sectigo".to_string(),
                endpoint: "http://timestamp.sectigo.com".to_string(),
            },
        ]
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    /// Loads configuration from `--config` (or `$CONFIG`), defaulting every
    /// field via environment variable then hardcoded constant when the file
    /// is absent or omits a field. A missing file is not an error — an
    /// empty JSON object resolves to an all-defaults `Config`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => "{}".to_string(),
            Err(e) => return Err(ConfigError::FileRead(path.to_path_buf(), e)),
        };
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn hedge_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.hedge_delay_ms)
    }

    pub fn attempt_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn overall_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.overall_deadline_ms)
    }

    pub fn probe_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.probe_interval_secs)
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id.clone()).collect()
    }
}

/// The on-disk shape of the policy store: every tenant's current policy,
/// keyed by tenant ID. History and audit log are intentionally not
/// persisted here — they exist to explain a single process's lifetime of
/// decisions, not to be replayed across runs.
pub type PolicyStore = BTreeMap<String, TenantPolicy>;

pub fn load_policy_store(path: &Path) -> Result<PolicyStore, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PolicyStore::new()),
        Err(e) => Err(ConfigError::FileRead(path.to_path_buf(), e)),
    }
}

pub fn save_policy_store(path: &Path, store: &PolicyStore) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(store)?;
    fs::write(path, content).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))
}
