//! Policy manager (C4) — §4.4.
//!
//! Loads, validates, versions, fingerprints, and audits each tenant's
//! declarative trust/routing policy. Reads take a consistent snapshot
//! (`PolicyRecord` is cloned out of the `DashMap`); writes are serialized
//! per-tenant by `DashMap`'s per-shard locking, matching the discipline §5
//! lays out for the policy cache.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::instrument;

use tsa_types::error::{CoreError, FieldErrorSeverity, PolicyFieldError};
use tsa_types::gen_time::GenTime;
use tsa_types::oid::{default_accepted_policy_oids, Oid, TIMESTAMPING_EKU};
use tsa_types::policy::{
    AuditAction, AuditEntry, PolicyRecord, Sla, TenantPolicy, MAX_ANCHOR_NAME_LEN,
    MAX_AUDIT_LOG, MAX_PEM_BYTES, MAX_POLICY_HISTORY, MAX_POLICY_OIDS, MAX_ROUTING_PRIORITY,
    MAX_TRUST_ANCHORS, TENANT_ID_MAX_LEN, TENANT_ID_MIN_LEN,
};
use tsa_types::trust_anchor::TrustAnchor;

/// A syntactically valid but non-operational placeholder for the bundled
/// DigiCert TSA root (§6 "Default policy"). Operators must replace this
/// with the actual root before trusting any token in production — the
/// chain validator collaborator will reject everything against it anyway
/// (see `tsa-mediator`'s fail-closed collaborator stand-ins).
const PLACEHOLDER_DIGICERT_ROOT_PEM: &str = "-----BEGIN CERTIFICATE-----\n\
MIIBAzCBqgIUAAAAAAAAAAAAAAAAAAAAAAAAAAAwCgYIKoZIzj0EAwIwETEPMA0G\n\
A1UEAwwGUExBQ0VIMB4XDTAwMDEwMTAwMDAwMFoXDTQwMDEwMTAwMDAwMFowETEP\n\
MA0GA1UEAwwGUExBQ0VIMFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEPLACEHOL\n\
DERPLACEHOLDERHOLDERPLACEHOLDERHOLDERPLACEHOLDERHOLDERPLACEHOLDE\n\
TAKoZIzj0EAwIDSQAwRgIhAA==\n\
-----END CERTIFICATE-----";

/// Rejects a tenant ID against §3's pattern without pulling in `regex` just
/// for this one check (tenant IDs are a tiny, fixed character class).
fn is_valid_tenant_id(tenant_id: &str) -> bool {
    tenant_id.len() >= TENANT_ID_MIN_LEN
        && tenant_id.len() <= TENANT_ID_MAX_LEN
        && !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn field_error(field: &str, code: &str, message: impl Into<String>) -> PolicyFieldError {
    PolicyFieldError {
        field: field.to_string(),
        code: code.to_string(),
        severity: FieldErrorSeverity::Error,
        message: message.into(),
    }
}

fn field_warning(field: &str, code: &str, message: impl Into<String>) -> PolicyFieldError {
    PolicyFieldError {
        field: field.to_string(),
        code: code.to_string(),
        severity: FieldErrorSeverity::Warning,
        message: message.into(),
    }
}

/// Runs every validation rule in §4.4 over a candidate policy, returning the
/// full set of field errors and warnings (not just the first). Callers that
/// only care whether the policy is *accepted* should filter on
/// `severity == FieldErrorSeverity::Error`.
pub fn validate_policy(policy: &TenantPolicy, known_provider_ids: &[String]) -> Vec<PolicyFieldError> {
    let mut errors = Vec::new();

    if !is_valid_tenant_id(&policy.tenant_id) {
        errors.push(field_error(
            "tenant_id",
            "invalid_tenant_id",
            format!(
                "tenant_id must be {TENANT_ID_MIN_LEN}-{TENANT_ID_MAX_LEN} chars matching [A-Za-z0-9_-]+, got {:?}",
                policy.tenant_id
            ),
        ));
    }

    if policy.accepted_trust_anchors.is_empty() {
        errors.push(field_error(
            "accepted_trust_anchors",
            "empty_trust_anchors",
            "at least one trust anchor is required",
        ));
    }
    if policy.accepted_trust_anchors.len() > MAX_TRUST_ANCHORS {
        errors.push(field_error(
            "accepted_trust_anchors",
            "too_many_trust_anchors",
            format!(
                "at most {MAX_TRUST_ANCHORS} trust anchors allowed, got {}",
                policy.accepted_trust_anchors.len()
            ),
        ));
    }
    for (i, anchor) in policy.accepted_trust_anchors.iter().enumerate() {
        if anchor.name.is_empty() || anchor.name.len() > MAX_ANCHOR_NAME_LEN {
            errors.push(field_error(
                &format!("accepted_trust_anchors[{i}].name"),
                "invalid_anchor_name",
                format!("name must be 1-{MAX_ANCHOR_NAME_LEN} chars"),
            ));
        }
        let pem = &anchor.pem_certificate;
        if pem.len() > MAX_PEM_BYTES || !pem.contains("BEGIN CERTIFICATE") || !pem.contains("END CERTIFICATE") {
            errors.push(field_error(
                &format!("accepted_trust_anchors[{i}].pem_certificate"),
                "invalid_pem",
                format!("PEM must be <= {MAX_PEM_BYTES} bytes and contain BEGIN/END CERTIFICATE markers"),
            ));
        }
        if anchor.required_eku().as_str() != TIMESTAMPING_EKU {
            errors.push(field_error(
                &format!("accepted_trust_anchors[{i}].required_eku"),
                "wrong_required_eku",
                format!("required_eku must be the timestamping EKU ({TIMESTAMPING_EKU})"),
            ));
        }
    }

    if policy.accepted_policy_oids.is_empty() {
        errors.push(field_error(
            "accepted_policy_oids",
            "empty_policy_oids",
            "at least one accepted policy OID is required",
        ));
    }
    if policy.accepted_policy_oids.len() > MAX_POLICY_OIDS {
        errors.push(field_error(
            "accepted_policy_oids",
            "too_many_policy_oids",
            format!(
                "at most {MAX_POLICY_OIDS} accepted policy OIDs allowed, got {}",
                policy.accepted_policy_oids.len()
            ),
        ));
    }

    if policy.routing_priority.is_empty() {
        errors.push(field_error(
            "routing_priority",
            "empty_routing_priority",
            "at least one provider in routing_priority is required",
        ));
    }
    if policy.routing_priority.len() > MAX_ROUTING_PRIORITY {
        errors.push(field_error(
            "routing_priority",
            "too_many_routing_priority_entries",
            format!(
                "at most {MAX_ROUTING_PRIORITY} routing_priority entries allowed, got {}",
                policy.routing_priority.len()
            ),
        ));
    }
    for (i, provider_id) in policy.routing_priority.iter().enumerate() {
        if !known_provider_ids.iter().any(|known| known == provider_id) {
            errors.push(field_error(
                &format!("routing_priority[{i}]"),
                "unknown_provider_id",
                format!("{provider_id:?} is not a known provider ID"),
            ));
        }
    }
    let mut seen = HashSet::new();
    for provider_id in &policy.routing_priority {
        if !seen.insert(provider_id) {
            errors.push(field_warning(
                "routing_priority",
                "duplicate_provider_id",
                format!("{provider_id:?} appears more than once in routing_priority"),
            ));
        }
    }

    if policy.sla.p95_latency_ms == 0 {
        errors.push(field_error(
            "sla.p95_latency_ms",
            "invalid_p95_latency",
            "p95_latency_ms must be greater than 0",
        ));
    } else if policy.sla.p95_latency_ms < 100 {
        errors.push(field_warning(
            "sla.p95_latency_ms",
            "low_p95_latency",
            "p95_latency_ms below 100ms is unusually strict for an external TSA",
        ));
    }
    if !(0.0..=100.0).contains(&policy.sla.monthly_error_budget_pct) {
        errors.push(field_error(
            "sla.monthly_error_budget_pct",
            "invalid_error_budget",
            "monthly_error_budget_pct must be within [0, 100]",
        ));
    } else if policy.sla.monthly_error_budget_pct > 5.0 {
        errors.push(field_warning(
            "sla.monthly_error_budget_pct",
            "high_error_budget",
            "monthly_error_budget_pct above 5% is unusually lax",
        ));
    }

    errors
}

/// A deterministic, cryptographic fingerprint over the stable fields §4.4
/// names: `(tenant_id, accepted_policy_oids, routing_priority,
/// sla.p95_latency_ms, accepted_trust_anchors[].name)`. Sorting the OID and
/// anchor-name lists before hashing means two policies with the same
/// *content* fingerprint identically regardless of input order (§8 "stable
/// across serialization of equal content").
///
/// §9 Open Questions flags that the source used a non-cryptographic hash
/// here and that this should be replaced with a cryptographic one; SHA-256
/// is that replacement.
pub fn fingerprint(policy: &TenantPolicy) -> String {
    let mut oids: Vec<&str> = policy.accepted_policy_oids.iter().map(Oid::as_str).collect();
    oids.sort_unstable();
    let mut anchor_names: Vec<&str> = policy.accepted_trust_anchors.iter().map(|a| a.name.as_str()).collect();
    anchor_names.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(policy.tenant_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(oids.join(",").as_bytes());
    hasher.update(b"\0");
    hasher.update(policy.routing_priority.join(",").as_bytes());
    hasher.update(b"\0");
    hasher.update(policy.sla.p95_latency_ms.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(anchor_names.join(",").as_bytes());

    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Builds the default policy materialized on a tenant's first lookup (§6
/// "Default policy").
fn default_policy(tenant_id: &str) -> TenantPolicy {
    let anchor = TrustAnchor::new(
        "digicert".to_string(),
        PLACEHOLDER_DIGICERT_ROOT_PEM.to_string(),
        Oid::new(TIMESTAMPING_EKU).expect("timestamping EKU OID is well-formed"),
    )
    .expect("placeholder anchor carries the timestamping EKU by construction");

    TenantPolicy {
        tenant_id: tenant_id.to_string(),
        accepted_trust_anchors: vec![anchor],
        accepted_policy_oids: default_accepted_policy_oids(),
        routing_priority: vec!["digicert".to_string(), "globalsign".to_string(), "sectigo".to_string()],
        sla: Sla {
            p95_latency_ms: 900,
            monthly_error_budget_pct: 1.0,
        },
    }
}

/// The policy manager (C4). Owns the current record per tenant, a bounded
/// history per tenant (§5 cap [`MAX_POLICY_HISTORY`]), and one global
/// bounded audit log (§5 cap [`MAX_AUDIT_LOG`]).
pub struct PolicyManager {
    known_provider_ids: Vec<String>,
    records: DashMap<String, PolicyRecord>,
    history: DashMap<String, VecDeque<PolicyRecord>>,
    audit_log: Mutex<VecDeque<AuditEntry>>,
}

impl PolicyManager {
    pub fn new(known_provider_ids: Vec<String>) -> Self {
        Self {
            known_provider_ids,
            records: DashMap::new(),
            history: DashMap::new(),
            audit_log: Mutex::new(VecDeque::new()),
        }
    }

    /// Loads the current policy record for `tenant_id`, lazily materializing
    /// the default policy on first access (§4.4 "Load"). Every read
    /// recomputes the fingerprint and compares it against the stored one
    /// (§4.4 "a failed integrity check evicts the cached copy and triggers
    /// reload"); a mismatch evicts and falls through to re-materialization.
    #[instrument(skip(self))]
    pub fn load(&self, tenant_id: &str) -> Result<PolicyRecord, CoreError> {
        if let Some(record) = self.records.get(tenant_id) {
            if fingerprint(&record.policy) == record.fingerprint {
                return Ok(record.clone());
            }
            drop(record);
            self.records.remove(tenant_id);
        }

        let policy = default_policy(tenant_id);
        let now = GenTime::now();
        let record = PolicyRecord {
            fingerprint: fingerprint(&policy),
            policy,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(tenant_id.to_string(), record.clone());
        Ok(record)
    }

    /// Validates and stores a new policy for `tenant_id` (§4.4 "Save"). On
    /// success the prior record (if any) is pushed into bounded history, the
    /// new record is stored with an incremented version and a fresh
    /// fingerprint, and a `created`/`updated` audit entry is appended. On
    /// failure, an audit entry is appended and no state changes.
    #[instrument(skip(self, policy))]
    pub fn save(&self, tenant_id: &str, mut policy: TenantPolicy) -> Result<PolicyRecord, Vec<PolicyFieldError>> {
        policy.tenant_id = tenant_id.to_string();
        let field_results = validate_policy(&policy, &self.known_provider_ids);
        let hard_errors: Vec<_> = field_results
            .iter()
            .filter(|e| e.severity == FieldErrorSeverity::Error)
            .cloned()
            .collect();
        if !hard_errors.is_empty() {
            self.audit(
                tenant_id,
                AuditAction::PolicyValidationFailed,
                format!("{} field error(s)", hard_errors.len()),
            );
            return Err(field_results);
        }

        let now = GenTime::now();
        let (version, created_at, action) = match self.records.get(tenant_id) {
            Some(prior) => {
                let mut hist = self.history.entry(tenant_id.to_string()).or_default();
                hist.push_back(prior.clone());
                while hist.len() > MAX_POLICY_HISTORY {
                    hist.pop_front();
                }
                (prior.version + 1, prior.created_at, AuditAction::Updated)
            }
            None => (1, now, AuditAction::Created),
        };

        let fp = fingerprint(&policy);
        let record = PolicyRecord {
            policy,
            version,
            fingerprint: fp.clone(),
            created_at,
            updated_at: now,
        };
        self.records.insert(tenant_id.to_string(), record.clone());
        self.audit(tenant_id, action, format!("version {version}, fingerprint {fp}"));
        Ok(record)
    }

    pub fn delete(&self, tenant_id: &str) {
        self.records.remove(tenant_id);
        self.history.remove(tenant_id);
    }

    pub fn get_history(&self, tenant_id: &str) -> Vec<PolicyRecord> {
        self.history.get(tenant_id).map(|h| h.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn get_audit_log(&self) -> Vec<AuditEntry> {
        self.audit_log_guard().iter().cloned().collect()
    }

    /// The current record plus bounded history for a tenant, for operator
    /// tooling / backup (§6 outward interfaces names `export` without
    /// detailing it; this is the natural reading given `get_history`).
    pub fn export(&self, tenant_id: &str) -> Option<(PolicyRecord, Vec<PolicyRecord>)> {
        let current = self.records.get(tenant_id)?.clone();
        Some((current, self.get_history(tenant_id)))
    }

    /// `accepts(tenant, provider_id, policy_oid)` (§4.4 "Acceptance
    /// queries"): true iff `provider_id` is in the tenant's routing priority
    /// AND `policy_oid` is in its accepted set. A missing/invalid tenant
    /// policy accepts nothing.
    pub fn accepts(&self, tenant_id: &str, provider_id: &str, policy_oid: &Oid) -> bool {
        let Ok(record) = self.load(tenant_id) else {
            return false;
        };
        record.policy.routing_priority.iter().any(|p| p == provider_id)
            && record.policy.accepted_policy_oids.contains(policy_oid)
    }

    fn audit_log_guard(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEntry>> {
        self.audit_log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn audit(&self, tenant_id: &str, action: AuditAction, details: String) {
        let mut log = self.audit_log_guard();
        log.push_back(AuditEntry {
            tenant_id: tenant_id.to_string(),
            action,
            timestamp: GenTime::now(),
            details,
        });
        while log.len() > MAX_AUDIT_LOG {
            log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known_providers() -> Vec<String> {
        vec!["digicert".into(), "globalsign".into(), "sectigo".into()]
    }

    #[test]
    fn load_lazily_materializes_default_policy() {
        let manager = PolicyManager::new(known_providers());
        let record = manager.load("acme-corp").unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.policy.routing_priority, vec!["digicert", "globalsign", "sectigo"]);
        assert_eq!(record.fingerprint, fingerprint(&record.policy));
    }

    #[test]
    fn save_rejects_unknown_provider_in_routing_priority() {
        let manager = PolicyManager::new(known_providers());
        let mut policy = default_policy("acme-corp");
        policy.routing_priority = vec!["not-a-real-provider".to_string()];
        let errors = manager.save("acme-corp", policy).unwrap_err();
        assert!(errors.iter().any(|e| e.code == "unknown_provider_id" && e.severity == FieldErrorSeverity::Error));
    }

    #[test]
    fn save_failure_appends_audit_entry_without_changing_state() {
        let manager = PolicyManager::new(known_providers());
        let before = manager.load("acme-corp").unwrap();
        let mut bad = default_policy("acme-corp");
        bad.accepted_trust_anchors.clear();
        assert!(manager.save("acme-corp", bad).is_err());
        let after = manager.load("acme-corp").unwrap();
        assert_eq!(before.fingerprint, after.fingerprint);
        assert!(manager
            .get_audit_log()
            .iter()
            .any(|e| e.action == AuditAction::PolicyValidationFailed));
    }

    #[test]
    fn duplicate_routing_priority_is_a_warning_not_an_error() {
        let manager = PolicyManager::new(known_providers());
        let mut policy = default_policy("acme-corp");
        policy.routing_priority = vec!["digicert".to_string(), "digicert".to_string()];
        let record = manager.save("acme-corp", policy).expect("warnings do not block save");
        assert_eq!(record.policy.routing_priority, vec!["digicert", "digicert"]);
    }

    #[test]
    fn save_increments_version_and_accretes_bounded_history() {
        let manager = PolicyManager::new(known_providers());
        for i in 0..15u64 {
            let mut policy = default_policy("acme-corp");
            policy.sla.p95_latency_ms = 900 + i;
            manager.save("acme-corp", policy).unwrap();
        }
        let current = manager.load("acme-corp").unwrap();
        assert_eq!(current.version, 15);
        assert_eq!(manager.get_history("acme-corp").len(), MAX_POLICY_HISTORY);
    }

    #[test]
    fn fingerprint_is_stable_for_reordered_equal_content() {
        let mut a = default_policy("acme-corp");
        let mut b = default_policy("acme-corp");
        a.accepted_policy_oids.reverse();
        b.accepted_policy_oids.rotate_left(1);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_for_differing_content() {
        let a = default_policy("acme-corp");
        let mut b = default_policy("acme-corp");
        b.sla.p95_latency_ms = 1234;
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn accepts_requires_both_provider_and_oid_membership() {
        let manager = PolicyManager::new(known_providers());
        let oid = Oid::new("2.16.840.1.114412.7.1").unwrap();
        let other_oid = Oid::new("1.2.3.4.5").unwrap();
        assert!(manager.accepts("acme-corp", "digicert", &oid));
        assert!(!manager.accepts("acme-corp", "unknown-provider", &oid));
        assert!(!manager.accepts("acme-corp", "digicert", &other_oid));
    }

    #[test]
    fn twenty_one_trust_anchors_is_rejected_twenty_is_accepted() {
        let manager = PolicyManager::new(known_providers());
        let mut policy = default_policy("acme-corp");
        let template = policy.accepted_trust_anchors[0].clone();
        policy.accepted_trust_anchors = (0..20)
            .map(|i| TrustAnchor::new(format!("anchor-{i}"), template.pem_certificate.clone(), template.required_eku().clone()).unwrap())
            .collect();
        assert!(manager.save("acme-corp", policy.clone()).is_ok());

        policy.accepted_trust_anchors.push(
            TrustAnchor::new("anchor-20".into(), template.pem_certificate.clone(), template.required_eku().clone()).unwrap(),
        );
        let errors = manager.save("acme-corp", policy).unwrap_err();
        assert!(errors.iter().any(|e| e.code == "too_many_trust_anchors"));
    }
}
