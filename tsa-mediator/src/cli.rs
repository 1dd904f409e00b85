//! Operator CLI subcommand bodies.
//!
//! `main` does argument parsing and wiring; each function here does exactly
//! one subcommand's work and returns a boxed error `main` can print and turn
//! into a process exit code. Nothing here touches tenant routing or
//! validation logic directly — it only calls through the public C1-C6 APIs
//! in `tsa-core`, the way any other embedder of this crate would.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio_util::sync::CancellationToken;

use tsa_core::adapter::{AdapterRequest, ProviderAdapter};
use tsa_core::health::HealthMonitor;
use tsa_core::orchestrator::IssueRequest;
use tsa_core::policy::PolicyManager;
use tsa_types::imprint::{HashAlgorithm, MessageImprint};
use tsa_types::nonce::Nonce;
use tsa_types::policy::TenantPolicy;

use crate::collaborators::Orchestrator;
use crate::config;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// `policy show --tenant <id>`: prints the resolved policy record (or the
/// lazily-materialized default, if the tenant has never been saved) as JSON.
pub fn policy_show(policy_manager: &PolicyManager, tenant: &str) -> CliResult {
    let record = policy_manager.load(tenant)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// `policy set --tenant <id> --file <path>`: validates and stores the
/// `TenantPolicy` read from `file`, persisting the outcome to
/// `policy_store_path` alongside every other tenant already on disk.
pub fn policy_set(policy_manager: &PolicyManager, policy_store_path: &Path, tenant: &str, file: &PathBuf) -> CliResult {
    let raw = std::fs::read_to_string(file)?;
    let policy: TenantPolicy = serde_json::from_str(&raw)?;

    let record = policy_manager.save(tenant, policy).map_err(|errors| {
        for error in &errors {
            eprintln!("{} [{:?}] {}: {}", error.field, error.severity, error.code, error.message);
        }
        format!("policy for {tenant:?} failed validation with {} field error(s)", errors.len())
    })?;

    let mut store = config::load_policy_store(policy_store_path)?;
    store.insert(tenant.to_string(), record.policy.clone());
    config::save_policy_store(policy_store_path, &store)?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// A fixed, non-secret imprint used only to exercise a provider's liveness —
/// equivalent to the synthetic probes §4.2 schedules automatically, run here
/// on demand instead of on a background timer (this binary is a short-lived
/// CLI, not a daemon; see the module doc in `main.rs`).
fn probe_imprint() -> MessageImprint {
    MessageImprint::new(HashAlgorithm::Sha256, vec![0u8; 32]).expect("fixed 32-byte SHA-256 imprint is well-formed")
}

/// `health`: probes every configured provider once and prints its resulting
/// tri-state status and latency percentiles, ordered the way
/// `HealthMonitor::healthy_sorted` orders routing candidates.
pub async fn health(adapters: &BTreeMap<String, Arc<dyn ProviderAdapter>>, health: &Arc<HealthMonitor>, attempt_timeout: Duration) -> CliResult {
    let imprint = probe_imprint();
    for (provider_id, adapter) in adapters {
        let request = AdapterRequest {
            imprint: &imprint,
            req_policy: None,
            nonce: None,
        };
        let outcome = adapter.send_request(request, attempt_timeout, CancellationToken::new()).await;
        health.record_probe(provider_id, outcome.success, outcome.latency_ms, outcome.error_class());
    }

    for snapshot in health.healthy_sorted() {
        println!(
            "{:<16} {:?}  p50={:>7.1}ms p95={:>7.1}ms p99={:>7.1}ms success_rate={:>5.1}% consecutive_failures={}",
            snapshot.provider_id,
            snapshot.status,
            snapshot.latency.p50_ms,
            snapshot.latency.p95_ms,
            snapshot.latency.p99_ms,
            snapshot.success_rate * 100.0,
            snapshot.consecutive_failures,
        );
    }
    Ok(())
}

/// `issue --tenant <id> --digest-hex <hex>`: issues one timestamp over an
/// already-hashed message digest, routed and validated through the full
/// C4→C3→C1→C2→C5 pipeline (§2 data flow).
pub async fn issue(orchestrator: &Arc<Orchestrator>, tenant: &str, digest_hex: &str) -> CliResult {
    let digest = hex::decode(digest_hex)?;
    let algorithm = match digest.len() {
        32 => HashAlgorithm::Sha256,
        48 => HashAlgorithm::Sha384,
        64 => HashAlgorithm::Sha512,
        other => return Err(format!("digest is {other} bytes; expected 32 (SHA-256), 48 (SHA-384), or 64 (SHA-512)").into()),
    };
    let imprint = MessageImprint::new(algorithm, digest)?;

    let mut nonce_bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_be_bytes(&nonce_bytes).expect("8 bytes is within the 256-bit nonce bound");

    let mut request_id_bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut request_id_bytes);
    let request_id = hex::encode(request_id_bytes);

    let result = orchestrator
        .issue(&request_id, tenant, IssueRequest { imprint, nonce: Some(nonce), req_policy: None })
        .await?;

    println!("provider_id:        {}", result.provider_id);
    println!("tsa_id:             {}", result.tsa_id);
    println!("policy_oid:         {}", result.policy_oid);
    println!("policy_fingerprint: {}", result.policy_fingerprint);
    println!("gen_time:           {}", result.gen_time);
    Ok(())
}

fn print_health_snapshots(health: &HealthMonitor) {
    for snapshot in health.healthy_sorted() {
        println!(
            "{:<16} {:?}  p50={:>7.1}ms p95={:>7.1}ms p99={:>7.1}ms success_rate={:>5.1}% consecutive_failures={}",
            snapshot.provider_id,
            snapshot.status,
            snapshot.latency.p50_ms,
            snapshot.latency.p95_ms,
            snapshot.latency.p99_ms,
            snapshot.success_rate * 100.0,
            snapshot.consecutive_failures,
        );
    }
}

/// `watch`: runs the health monitor's synthetic probe scheduler (§4.2 "Every
/// 10s a probe is scheduled per provider") until SIGINT/SIGTERM, then tears
/// every probe loop down and prints a final snapshot — §9's "acquire all,
/// then release all in reverse" applied to the probe scheduler specifically.
pub async fn watch(adapters: &BTreeMap<String, Arc<dyn ProviderAdapter>>, health: &Arc<HealthMonitor>, attempt_timeout: Duration) -> CliResult {
    let sig_down = crate::sig_down::SigDown::try_new()?;
    let shutdown = sig_down.cancellation_token();

    let mut handles = Vec::with_capacity(adapters.len());
    for (provider_id, adapter) in adapters {
        let adapter = Arc::clone(adapter);
        let imprint = probe_imprint();
        let handle = health.spawn_probe_loop(provider_id.clone(), shutdown.clone(), move || {
            let adapter = Arc::clone(&adapter);
            let imprint = imprint.clone();
            async move {
                let request = AdapterRequest {
                    imprint: &imprint,
                    req_policy: None,
                    nonce: None,
                };
                let outcome = adapter.send_request(request, attempt_timeout, CancellationToken::new()).await;
                (outcome.success, outcome.latency_ms, outcome.error_class())
            }
        });
        handles.push(handle);
    }

    println!(
        "watching {} provider(s) every {:?}; press Ctrl-C to stop",
        adapters.len(),
        health.probe_interval()
    );
    shutdown.cancelled().await;
    for handle in handles {
        let _ = handle.await;
    }

    println!("final health snapshot:");
    print_health_snapshots(health);
    Ok(())
}
