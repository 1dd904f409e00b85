//! Health monitor (C2) — §4.2.
//!
//! Tracks a bounded ring of recent latencies and live counters per provider,
//! recomputing percentiles, success rate, and tri-state status after every
//! recorded outcome. Reads take a consistent snapshot (§5 "atomic
//! publication of each recomputed state object"); writers are serialized
//! per-provider by `DashMap`'s per-shard locking.

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use tsa_types::error_class::ErrorClass;
use tsa_types::gen_time::GenTime;
use tsa_types::health::{
    LatencyPercentiles, ProviderHealthSnapshot, ProviderStatus, SloMetric, SloViolation,
    CRITICAL_CLASS_RED_THRESHOLD, LATENCY_WINDOW, RECOVERY_STREAK,
};
use tsa_types::policy::Sla;

/// Window size over which `success_rate` is computed (§4.2 "most recent 20
/// samples").
const SUCCESS_RATE_WINDOW: usize = 20;

#[derive(Debug, Clone)]
struct ProviderState {
    latencies: VecDeque<f64>,
    /// One entry per recorded attempt, in lockstep with `latencies` (same
    /// 100-sample ring, §3 "backed by a bounded ring of the last 100
    /// latency samples") — `Some(class)` for a classified failure, `None`
    /// for a success or an unclassified failure. Counts are recomputed
    /// from this ring rather than accumulated, so an old failure ages out
    /// instead of pinning the provider red forever.
    error_classes: VecDeque<Option<ErrorClass>>,
    consecutive_successes: u32,
    consecutive_failures: u32,
    status: ProviderStatus,
    last_probe_at: Option<GenTime>,
    /// Attempt outcomes (success/failure) over the same window as
    /// `latencies`, oldest first — needed to compute `success_rate` over
    /// the last 20 *attempts* independent of the 100-sample latency ring.
    outcomes: VecDeque<bool>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            error_classes: VecDeque::with_capacity(LATENCY_WINDOW),
            consecutive_successes: 0,
            consecutive_failures: 0,
            status: ProviderStatus::Green,
            last_probe_at: None,
            outcomes: VecDeque::with_capacity(SUCCESS_RATE_WINDOW),
        }
    }
}

impl ProviderState {
    fn percentile(&self, pct: f64) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.latencies.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f64 - 1.0) * pct).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    /// `(recent - consecutive_failures) / recent` over the last 20
    /// attempts (§4.2), clamped at 0 — the current failure streak is what
    /// depresses the rate, not a plain hit count, so a provider mid
    /// recovery-streak (successes right after a run of failures) is not
    /// held at a stale low rate once its streak has reset.
    fn success_rate(&self) -> f64 {
        let recent = self.outcomes.len() as f64;
        if recent == 0.0 {
            return 1.0;
        }
        ((recent - self.consecutive_failures as f64) / recent).max(0.0)
    }

    /// Tally of each error class within the current window, recomputed
    /// fresh each time so evicted samples stop counting.
    fn error_class_counts(&self) -> Vec<(ErrorClass, u32)> {
        let mut counts: Vec<(ErrorClass, u32)> = Vec::new();
        for class in self.error_classes.iter().flatten() {
            if let Some(entry) = counts.iter_mut().find(|(c, _)| c == class) {
                entry.1 += 1;
            } else {
                counts.push((*class, 1));
            }
        }
        counts
    }

    /// Re-evaluates status per the ordered table in §4.2. Rules are checked
    /// in order and the first match wins; "otherwise" leaves status
    /// unchanged, which is why this returns early rather than falling
    /// through to a default.
    fn reclassify(&mut self) {
        let p95 = self.percentile(0.95);
        let success_rate = self.success_rate();
        let critical_class_hits = self
            .error_class_counts()
            .iter()
            .filter(|(c, _)| c.is_critical())
            .map(|(_, n)| *n)
            .max()
            .unwrap_or(0);

        if self.consecutive_failures >= 3 {
            self.status = ProviderStatus::Red;
        } else if p95 > 2000.0 {
            self.status = ProviderStatus::Red;
        } else if success_rate < 0.90 {
            self.status = ProviderStatus::Red;
        } else if critical_class_hits >= CRITICAL_CLASS_RED_THRESHOLD {
            self.status = ProviderStatus::Red;
        } else if self.consecutive_failures > 0 {
            self.status = ProviderStatus::Yellow;
        } else if p95 > 1000.0 {
            self.status = ProviderStatus::Yellow;
        } else if success_rate < 0.95 {
            self.status = ProviderStatus::Yellow;
        } else if self.consecutive_successes >= RECOVERY_STREAK {
            self.status = ProviderStatus::Green;
        }
        // otherwise: status unchanged.
    }

    fn snapshot(&self, provider_id: &str) -> ProviderHealthSnapshot {
        ProviderHealthSnapshot {
            provider_id: provider_id.to_string(),
            status: self.status,
            latency: LatencyPercentiles {
                p50_ms: self.percentile(0.50),
                p95_ms: self.percentile(0.95),
                p99_ms: self.percentile(0.99),
            },
            success_rate: self.success_rate(),
            consecutive_successes: self.consecutive_successes,
            consecutive_failures: self.consecutive_failures,
            error_class_counts: self.error_class_counts(),
            last_probe_at: self.last_probe_at,
        }
    }
}

/// The health monitor (C2). Owns one [`ProviderState`] per provider ID,
/// created lazily on first `record`/`get_health` call.
pub struct HealthMonitor {
    providers: DashMap<String, ProviderState>,
    probe_interval: Duration,
}

impl HealthMonitor {
    pub fn new(probe_interval: Duration) -> Self {
        Self {
            providers: DashMap::new(),
            probe_interval,
        }
    }

    /// Records one adapter outcome (§4.2). `latency_ms` is always recorded,
    /// win or lose (§5 "Latencies recorded for losing attempts are still
    /// valid observations").
    #[instrument(skip(self), fields(provider_id))]
    pub fn record(&self, provider_id: &str, success: bool, latency_ms: f64, error_class: Option<ErrorClass>) {
        let mut state = self.providers.entry(provider_id.to_string()).or_default();

        if state.latencies.len() == LATENCY_WINDOW {
            state.latencies.pop_front();
        }
        state.latencies.push_back(latency_ms);

        if state.error_classes.len() == LATENCY_WINDOW {
            state.error_classes.pop_front();
        }
        state.error_classes.push_back(if success { None } else { error_class });

        if state.outcomes.len() == SUCCESS_RATE_WINDOW {
            state.outcomes.pop_front();
        }
        state.outcomes.push_back(success);

        if success {
            state.consecutive_successes += 1;
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
            state.consecutive_successes = 0;
        }

        state.reclassify();
    }

    /// Feeds a synthetic probe's outcome through the same `record` path and
    /// stamps `last_probe_at` (§4.2).
    pub fn record_probe(&self, provider_id: &str, success: bool, latency_ms: f64, error_class: Option<ErrorClass>) {
        self.record(provider_id, success, latency_ms, error_class);
        if let Some(mut state) = self.providers.get_mut(provider_id) {
            state.last_probe_at = Some(GenTime::now());
        }
    }

    pub fn get_health(&self, provider_id: &str) -> Option<ProviderHealthSnapshot> {
        self.providers.get(provider_id).map(|s| s.snapshot(provider_id))
    }

    pub fn is_healthy(&self, provider_id: &str) -> bool {
        self.providers
            .get(provider_id)
            .map(|s| s.status == ProviderStatus::Green)
            .unwrap_or(false)
    }

    /// All known providers' snapshots ordered `(status, p95 asc, success_rate desc)`
    /// (§4.2 `healthy_sorted`). Named to match the public query even though
    /// it does not itself filter out red providers — callers needing only
    /// the routable set should filter on `status.is_routable()`.
    pub fn healthy_sorted(&self) -> Vec<ProviderHealthSnapshot> {
        let mut snapshots: Vec<ProviderHealthSnapshot> = self
            .providers
            .iter()
            .map(|entry| entry.value().snapshot(entry.key()))
            .collect();
        snapshots.sort_by(|a, b| {
            let status_rank = |s: ProviderStatus| match s {
                ProviderStatus::Green => 0,
                ProviderStatus::Yellow => 1,
                ProviderStatus::Red => 2,
            };
            status_rank(a.status)
                .cmp(&status_rank(b.status))
                .then(a.latency.p95_ms.partial_cmp(&b.latency.p95_ms).unwrap())
                .then(b.success_rate.partial_cmp(&a.success_rate).unwrap())
        });
        snapshots
    }

    /// Structured SLO violations for one provider against a tenant's SLA
    /// (§4.2 `slo_compliance`).
    pub fn slo_compliance(&self, provider_id: &str, sla: &Sla) -> Vec<SloViolation> {
        let Some(snapshot) = self.get_health(provider_id) else {
            return Vec::new();
        };
        let mut violations = Vec::new();
        if snapshot.latency.p95_ms > sla.p95_latency_ms as f64 {
            violations.push(SloViolation {
                provider_id: provider_id.to_string(),
                metric: SloMetric::P95LatencyMs,
                threshold: sla.p95_latency_ms as f64,
                observed: snapshot.latency.p95_ms,
            });
        }
        let error_pct = (1.0 - snapshot.success_rate) * 100.0;
        if error_pct > sla.monthly_error_budget_pct {
            violations.push(SloViolation {
                provider_id: provider_id.to_string(),
                metric: SloMetric::MonthlyErrorBudgetPct,
                threshold: sla.monthly_error_budget_pct,
                observed: error_pct,
            });
        }
        violations
    }

    pub fn probe_interval(&self) -> Duration {
        self.probe_interval
    }

    /// Spawns one cooperative probe loop per provider, rescheduling only
    /// after the previous probe completes (§4.2 "a slow probe never
    /// stacks"). Each loop exits promptly when `shutdown` is cancelled.
    pub fn spawn_probe_loop<F, Fut>(
        self: &std::sync::Arc<Self>,
        provider_id: String,
        shutdown: CancellationToken,
        probe_fn: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = (bool, f64, Option<ErrorClass>)> + Send,
    {
        let monitor = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(monitor.probe_interval) => {
                        let (success, latency_ms, error_class) = probe_fn().await;
                        monitor.record_probe(&provider_id, success, latency_ms, error_class);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_failures_go_red() {
        let monitor = HealthMonitor::new(Duration::from_secs(10));
        for _ in 0..3 {
            monitor.record("digicert", false, 50.0, Some(ErrorClass::Timeout));
        }
        assert!(!monitor.is_healthy("digicert"));
        assert_eq!(
            monitor.get_health("digicert").unwrap().status,
            ProviderStatus::Red
        );
    }

    #[test]
    fn three_consecutive_successes_recover_to_green_from_red() {
        let monitor = HealthMonitor::new(Duration::from_secs(10));
        for _ in 0..3 {
            monitor.record("digicert", false, 50.0, Some(ErrorClass::Timeout));
        }
        assert!(!monitor.is_healthy("digicert"));
        for _ in 0..3 {
            monitor.record("digicert", true, 50.0, None);
        }
        assert!(monitor.is_healthy("digicert"));
    }

    #[test]
    fn two_consecutive_successes_do_not_yet_recover() {
        let monitor = HealthMonitor::new(Duration::from_secs(10));
        for _ in 0..3 {
            monitor.record("digicert", false, 50.0, Some(ErrorClass::Timeout));
        }
        for _ in 0..2 {
            monitor.record("digicert", true, 50.0, None);
        }
        assert!(!monitor.is_healthy("digicert"));
    }

    #[test]
    fn high_p95_latency_forces_red() {
        let monitor = HealthMonitor::new(Duration::from_secs(10));
        for _ in 0..10 {
            monitor.record("digicert", true, 3000.0, None);
        }
        assert_eq!(
            monitor.get_health("digicert").unwrap().status,
            ProviderStatus::Red
        );
    }

    #[test]
    fn three_critical_error_class_occurrences_force_red_even_with_interleaved_successes() {
        let monitor = HealthMonitor::new(Duration::from_secs(10));
        monitor.record("digicert", false, 50.0, Some(ErrorClass::SystemFailure));
        monitor.record("digicert", true, 50.0, None);
        monitor.record("digicert", false, 50.0, Some(ErrorClass::SystemFailure));
        monitor.record("digicert", true, 50.0, None);
        monitor.record("digicert", false, 50.0, Some(ErrorClass::SystemFailure));
        assert_eq!(
            monitor.get_health("digicert").unwrap().status,
            ProviderStatus::Red
        );
    }

    #[test]
    fn healthy_sorted_orders_green_before_yellow_before_red() {
        let monitor = HealthMonitor::new(Duration::from_secs(10));
        monitor.record("red", false, 50.0, Some(ErrorClass::Timeout));
        monitor.record("red", false, 50.0, Some(ErrorClass::Timeout));
        monitor.record("red", false, 50.0, Some(ErrorClass::Timeout));
        monitor.record("green", true, 10.0, None);
        let sorted = monitor.healthy_sorted();
        assert_eq!(sorted[0].provider_id, "green");
        assert_eq!(sorted[1].provider_id, "red");
    }

    #[test]
    fn slo_compliance_reports_latency_violation() {
        let monitor = HealthMonitor::new(Duration::from_secs(10));
        for _ in 0..5 {
            monitor.record("digicert", true, 1500.0, None);
        }
        let sla = Sla {
            p95_latency_ms: 900,
            monthly_error_budget_pct: 1.0,
        };
        let violations = monitor.slo_compliance("digicert", &sla);
        assert!(violations.iter().any(|v| v.metric == SloMetric::P95LatencyMs));
    }
}
