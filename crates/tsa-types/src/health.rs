//! Provider health data shared between the health monitor (`tsa-core::health`,
//! C2) and anything that reads health state — the failover controller (C3),
//! the operator CLI, and tests. §3 `ProviderHealth`, §4.2.

use serde::{Deserialize, Serialize};

use crate::error_class::ErrorClass;
use crate::gen_time::GenTime;

/// Ring buffer capacity for recent-latency tracking (§4.2: "last 100
/// completed attempts").
pub const LATENCY_WINDOW: usize = 100;

/// Synthetic probe interval in seconds (§4.2).
pub const PROBE_INTERVAL_SECS: u64 = 10;

/// Consecutive-success threshold to promote yellow/red back to green (§4.2
/// flap-dampening rule).
pub const RECOVERY_STREAK: u32 = 3;

/// Occurrences of a single critical error class within the latency window
/// that force a red classification (§4.2).
pub const CRITICAL_CLASS_RED_THRESHOLD: u32 = 3;

/// A provider's tri-state classification (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    /// Healthy: eligible for primary routing.
    Green,
    /// Degraded: excluded from routing (§4.3 routes only from the green set)
    /// but not yet red; three more consecutive failures forces red.
    Yellow,
    /// Unhealthy: excluded from routing entirely.
    Red,
}

impl ProviderStatus {
    pub fn is_routable(self) -> bool {
        !matches!(self, ProviderStatus::Red)
    }
}

/// Latency percentiles computed over the last [`LATENCY_WINDOW`] completed
/// attempts (§3, §4.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// A point-in-time snapshot of one provider's health state, as returned by
/// `tsa-core::health::HealthMonitor::get_health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthSnapshot {
    pub provider_id: String,
    pub status: ProviderStatus,
    pub latency: LatencyPercentiles,
    /// Successes divided by attempts over the tracked window, `[0.0, 1.0]`.
    pub success_rate: f64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    /// Count of each error class observed within the tracked window.
    pub error_class_counts: Vec<(ErrorClass, u32)>,
    pub last_probe_at: Option<GenTime>,
}

/// A structured SLO breach, returned by `slo_compliance` instead of a bare
/// bool so callers (and the operator CLI) can report *which* metric failed
/// and by how much.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloViolation {
    pub provider_id: String,
    pub metric: SloMetric,
    pub threshold: f64,
    pub observed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SloMetric {
    P95LatencyMs,
    MonthlyErrorBudgetPct,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_routability() {
        assert!(ProviderStatus::Green.is_routable());
        assert!(ProviderStatus::Yellow.is_routable());
        assert!(!ProviderStatus::Red.is_routable());
    }
}
