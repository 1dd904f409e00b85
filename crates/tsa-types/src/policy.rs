//! The per-tenant policy data model (§3 `TenantPolicy`, `PolicyRecord`).
//!
//! This module only carries data and the resource caps from §5; the
//! validation rule engine, fingerprinting, and audit bookkeeping that
//! operate on these types live in `tsa-core::policy` (C4), since they need
//! the provider registry and a cryptographic hash this crate doesn't have.

use serde::{Deserialize, Serialize};

use crate::gen_time::GenTime;
use crate::oid::Oid;
use crate::trust_anchor::TrustAnchor;

/// Resource caps from §5, enforced by `tsa-core::policy`'s validator.
pub const MAX_TRUST_ANCHORS: usize = 20;
pub const MAX_POLICY_OIDS: usize = 50;
pub const MAX_ROUTING_PRIORITY: usize = 10;
pub const MAX_POLICY_HISTORY: usize = 10;
pub const MAX_AUDIT_LOG: usize = 1000;
pub const MAX_ANCHOR_NAME_LEN: usize = 200;
pub const MAX_PEM_BYTES: usize = 10 * 1024;
pub const TENANT_ID_MIN_LEN: usize = 3;
pub const TENANT_ID_MAX_LEN: usize = 64;

/// Service-level expectations a tenant holds its routed providers to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sla {
    pub p95_latency_ms: u64,
    pub monthly_error_budget_pct: f64,
}

/// A tenant's declarative trust and routing policy (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantPolicy {
    pub tenant_id: String,
    pub accepted_trust_anchors: Vec<TrustAnchor>,
    pub accepted_policy_oids: Vec<Oid>,
    /// Provider IDs in preferred order.
    pub routing_priority: Vec<String>,
    pub sla: Sla,
}

/// A stored, versioned, fingerprinted policy (§3 `PolicyRecord`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub policy: TenantPolicy,
    pub version: u64,
    pub fingerprint: String,
    pub created_at: GenTime,
    pub updated_at: GenTime,
}

/// What happened to a tenant's policy, for the audit log (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    PolicyValidationFailed,
}

/// A single audit log entry. The log itself (bounded FIFO, global cap
/// [`MAX_AUDIT_LOG`]) is owned by `tsa-core::policy::PolicyManager`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub tenant_id: String,
    pub action: AuditAction,
    pub timestamp: GenTime,
    pub details: String,
}
