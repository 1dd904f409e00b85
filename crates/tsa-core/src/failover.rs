//! Failover controller (C3) — §4.3.
//!
//! Turns a tenant's `routing_priority` plus live health into a routing
//! decision, then executes it: issue the primary immediately, hedge up to
//! two secondaries after a configurable delay, and return the first
//! success. Every attempt — winner and losers alike — is recorded back to
//! [`crate::health::HealthMonitor`]; losing attempts are cancelled promptly
//! once a winner is known rather than left to run to completion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use tsa_types::error::{sanitize_detail, CoreError};
use tsa_types::error_class::ErrorClass;
use tsa_types::imprint::MessageImprint;
use tsa_types::nonce::Nonce;
use tsa_types::oid::Oid;

use crate::adapter::{AdapterOutcome, AdapterRequest, ProviderAdapter};
use crate::health::HealthMonitor;

/// The routing decision for one call (§4.3 "Routing"), before any request is
/// issued. Exposed on its own so callers (and tests) can inspect the
/// decision without triggering network I/O.
#[derive(Debug, Clone, Default)]
pub struct RoutingDecision {
    pub primary: Option<String>,
    pub secondary_preferred: Vec<String>,
    pub secondary_extra: Vec<String>,
    pub reason: Option<String>,
}

/// The failover controller (C3). Holds one adapter per known provider and a
/// shared reference to the health monitor that both informs routing and
/// receives every attempt's outcome.
pub struct FailoverController {
    adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
    health: Arc<HealthMonitor>,
    hedge_delay: Duration,
    attempt_timeout: Duration,
    /// Keyed `"{request_id}:{provider_id}"`; entries are removed on
    /// completion or cancellation (§5 "active-attempts registry").
    active_attempts: DashMap<String, CancellationToken>,
}

impl FailoverController {
    pub fn new(
        adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
        health: Arc<HealthMonitor>,
        hedge_delay: Duration,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            adapters,
            health,
            hedge_delay,
            attempt_timeout,
            active_attempts: DashMap::new(),
        }
    }

    /// Walks `preferred_order`, classifying providers against the health
    /// monitor's notion of healthy (`status == Green`) (§4.3 "Routing"). The
    /// first healthy preferred provider is primary; the rest of the healthy
    /// preferred providers follow in order as `secondary_preferred`; any
    /// other known healthy provider not named in `preferred_order` is
    /// appended (in a fixed, deterministic order) as `secondary_extra`.
    pub fn route(&self, preferred_order: &[String]) -> RoutingDecision {
        let mut primary = None;
        let mut secondary_preferred = Vec::new();
        for provider_id in preferred_order {
            if self.health.is_healthy(provider_id) {
                if primary.is_none() {
                    primary = Some(provider_id.clone());
                } else {
                    secondary_preferred.push(provider_id.clone());
                }
            }
        }

        let secondary_extra: Vec<String> = self
            .adapters
            .keys()
            .filter(|id| !preferred_order.contains(id) && self.health.is_healthy(id))
            .cloned()
            .collect();

        let reason = if primary.is_none() {
            Some("all providers unhealthy".to_string())
        } else {
            None
        };

        RoutingDecision {
            primary,
            secondary_preferred,
            secondary_extra,
            reason,
        }
    }

    /// Cancels every attempt currently registered for `request_id` (used by
    /// the orchestrator when an overall deadline fires).
    pub fn cancel_call(&self, request_id: &str) {
        let prefix = format!("{request_id}:");
        let keys: Vec<String> = self
            .active_attempts
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(&prefix))
            .collect();
        for key in keys {
            if let Some((_, token)) = self.active_attempts.remove(&key) {
                token.cancel();
            }
        }
    }

    /// Records a post-hoc outcome against a provider that already answered
    /// (e.g. a token that passed transport but failed validation at C5).
    pub fn record_outcome(&self, provider_id: &str, success: bool, latency_ms: f64, error_class: Option<ErrorClass>) {
        self.health.record(provider_id, success, latency_ms, error_class);
    }

    fn spawn_attempt(
        &self,
        request_id: &str,
        provider_id: &str,
        imprint: &MessageImprint,
        req_policy: Option<&Oid>,
        nonce: Option<&Nonce>,
        join_set: &mut JoinSet<(String, AdapterOutcome)>,
        tokens: &mut Vec<(String, CancellationToken)>,
    ) {
        let Some(adapter) = self.adapters.get(provider_id).cloned() else {
            return;
        };
        let token = CancellationToken::new();
        let key = format!("{request_id}:{provider_id}");
        self.active_attempts.insert(key.clone(), token.clone());
        tokens.push((key, token.clone()));

        let provider_id = provider_id.to_string();
        let imprint = imprint.clone();
        let req_policy = req_policy.cloned();
        let nonce = nonce.cloned();
        let timeout = self.attempt_timeout;

        join_set.spawn(async move {
            let request = AdapterRequest {
                imprint: &imprint,
                req_policy: req_policy.as_ref(),
                nonce: nonce.as_ref(),
            };
            let outcome = adapter.send_request(request, timeout, token).await;
            (provider_id, outcome)
        });
    }

    /// Executes one call: issue the primary, hedge up to two secondaries
    /// after `hedge_delay` if no winner has appeared by then, and return the
    /// first successful `(provider_id, outcome)`. Every attempt's outcome —
    /// winner or loser — is recorded to the health monitor as it completes.
    /// An optional `deadline` bounds the whole call; on expiry every
    /// outstanding attempt is aborted and `CoreError::DeadlineExceeded` is
    /// returned.
    ///
    /// No internal retries: each provider gets at most one attempt per call
    /// (§4.3 "no internal retries — retrying is the caller's decision").
    #[instrument(skip(self, imprint, req_policy, nonce))]
    pub async fn execute(
        &self,
        request_id: &str,
        preferred_order: &[String],
        imprint: &MessageImprint,
        req_policy: Option<&Oid>,
        nonce: Option<&Nonce>,
        deadline: Option<Duration>,
    ) -> Result<(String, AdapterOutcome), CoreError> {
        let run = self.execute_inner(request_id, preferred_order, imprint, req_policy, nonce);
        match deadline {
            Some(d) => match tokio::time::timeout(d, run).await {
                Ok(result) => result,
                Err(_) => {
                    self.cancel_call(request_id);
                    Err(CoreError::DeadlineExceeded)
                }
            },
            None => run.await,
        }
    }

    async fn execute_inner(
        &self,
        request_id: &str,
        preferred_order: &[String],
        imprint: &MessageImprint,
        req_policy: Option<&Oid>,
        nonce: Option<&Nonce>,
    ) -> Result<(String, AdapterOutcome), CoreError> {
        let decision = self.route(preferred_order);
        let Some(primary_id) = decision.primary.clone() else {
            return Err(CoreError::NoHealthyProvider);
        };

        let mut secondaries = decision.secondary_preferred;
        secondaries.extend(decision.secondary_extra);
        secondaries.truncate(2);

        let mut join_set: JoinSet<(String, AdapterOutcome)> = JoinSet::new();
        let mut tokens: Vec<(String, CancellationToken)> = Vec::new();

        self.spawn_attempt(request_id, &primary_id, imprint, req_policy, nonce, &mut join_set, &mut tokens);

        let hedge_sleep = tokio::time::sleep(self.hedge_delay);
        tokio::pin!(hedge_sleep);
        let mut hedged = false;
        let mut primary_error: Option<String> = None;

        loop {
            tokio::select! {
                biased;
                _ = &mut hedge_sleep, if !hedged => {
                    hedged = true;
                    for secondary_id in secondaries.clone() {
                        self.spawn_attempt(request_id, &secondary_id, imprint, req_policy, nonce, &mut join_set, &mut tokens);
                    }
                }
                joined = join_set.join_next(), if !join_set.is_empty() => {
                    let Some(joined) = joined else { continue };
                    let (provider_id, outcome) = match joined {
                        Ok(pair) => pair,
                        Err(_) => continue,
                    };

                    if outcome.success {
                        self.health.record(&provider_id, true, outcome.latency_ms, None);
                        for (key, token) in tokens.drain(..) {
                            token.cancel();
                            self.active_attempts.remove(&key);
                        }
                        join_set.abort_all();
                        return Ok((provider_id, outcome));
                    }

                    self.health.record(&provider_id, false, outcome.latency_ms, outcome.error_class());
                    if provider_id == primary_id {
                        primary_error = outcome.error.clone();
                    }
                    if let Some(pos) = tokens.iter().position(|(key, _)| key == &format!("{request_id}:{provider_id}")) {
                        let (key, _) = tokens.remove(pos);
                        self.active_attempts.remove(&key);
                    }

                    if join_set.is_empty() && hedged {
                        break;
                    }
                }
                else => break,
            }
        }

        let detail = primary_error.unwrap_or_else(|| "connectionFailure: all attempts failed".to_string());
        Err(CoreError::ProviderTransport(sanitize_detail(&detail)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsa_types::imprint::HashAlgorithm;

    fn monitor() -> Arc<HealthMonitor> {
        Arc::new(HealthMonitor::new(Duration::from_secs(10)))
    }

    fn controller(adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>, health: Arc<HealthMonitor>) -> FailoverController {
        FailoverController::new(adapters, health, Duration::from_millis(300), Duration::from_secs(5))
    }

    #[test]
    fn routes_to_first_healthy_preferred_provider() {
        let health = monitor();
        health.record("digicert", true, 10.0, None);
        health.record("digicert", true, 10.0, None);
        health.record("digicert", true, 10.0, None);
        health.record("globalsign", true, 10.0, None);
        health.record("globalsign", true, 10.0, None);
        health.record("globalsign", true, 10.0, None);

        let ctrl = controller(BTreeMap::new(), health);
        let decision = ctrl.route(&["digicert".to_string(), "globalsign".to_string()]);
        assert_eq!(decision.primary.as_deref(), Some("digicert"));
        assert_eq!(decision.secondary_preferred, vec!["globalsign".to_string()]);
    }

    #[test]
    fn skips_unhealthy_preferred_provider_for_primary() {
        let health = monitor();
        health.record("digicert", false, 10.0, Some(ErrorClass::Timeout));
        health.record("digicert", false, 10.0, Some(ErrorClass::Timeout));
        health.record("digicert", false, 10.0, Some(ErrorClass::Timeout));
        health.record("globalsign", true, 10.0, None);
        health.record("globalsign", true, 10.0, None);
        health.record("globalsign", true, 10.0, None);

        let ctrl = controller(BTreeMap::new(), health);
        let decision = ctrl.route(&["digicert".to_string(), "globalsign".to_string()]);
        assert_eq!(decision.primary.as_deref(), Some("globalsign"));
    }

    #[test]
    fn no_healthy_provider_carries_a_reason() {
        let ctrl = controller(BTreeMap::new(), monitor());
        let decision = ctrl.route(&["digicert".to_string()]);
        assert!(decision.primary.is_none());
        assert!(decision.reason.is_some());
    }

    #[test]
    fn unknown_provider_not_in_preferred_order_becomes_secondary_extra() {
        let health = monitor();
        for id in ["digicert", "sectigo"] {
            health.record(id, true, 10.0, None);
            health.record(id, true, 10.0, None);
            health.record(id, true, 10.0, None);
        }
        let ctrl = controller(BTreeMap::new(), health);
        let decision = ctrl.route(&["digicert".to_string()]);
        assert_eq!(decision.primary.as_deref(), Some("digicert"));
        assert_eq!(decision.secondary_extra, vec!["sectigo".to_string()]);
    }

    struct StubAdapter {
        id: String,
        success: bool,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for StubAdapter {
        fn provider_id(&self) -> &str {
            &self.id
        }

        async fn send_request(&self, _request: AdapterRequest<'_>, _timeout: Duration, cancel: CancellationToken) -> AdapterOutcome {
            tokio::select! {
                _ = cancel.cancelled() => AdapterOutcome { success: false, token: None, error: Some("connectionFailure: cancelled".to_string()), latency_ms: 0.0 },
                _ = tokio::time::sleep(self.delay) => {
                    if self.success {
                        AdapterOutcome { success: true, token: None, error: None, latency_ms: self.delay.as_secs_f64() * 1000.0 }
                    } else {
                        AdapterOutcome { success: false, token: None, error: Some("systemFailure: stub failure".to_string()), latency_ms: self.delay.as_secs_f64() * 1000.0 }
                    }
                }
            }
        }
    }

    fn imprint() -> MessageImprint {
        MessageImprint::new(HashAlgorithm::Sha256, vec![1u8; 32]).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn failed_primary_still_triggers_hedge_at_delay() {
        let health = monitor();
        health.record("digicert", true, 10.0, None);
        health.record("digicert", true, 10.0, None);
        health.record("digicert", true, 10.0, None);
        health.record("globalsign", true, 10.0, None);
        health.record("globalsign", true, 10.0, None);
        health.record("globalsign", true, 10.0, None);

        let mut adapters: BTreeMap<String, Arc<dyn ProviderAdapter>> = BTreeMap::new();
        adapters.insert(
            "digicert".to_string(),
            Arc::new(StubAdapter { id: "digicert".to_string(), success: false, delay: Duration::from_millis(50) }),
        );
        adapters.insert(
            "globalsign".to_string(),
            Arc::new(StubAdapter { id: "globalsign".to_string(), success: true, delay: Duration::from_millis(80) }),
        );

        let ctrl = controller(adapters, health);
        let imprint = imprint();
        let (provider_id, outcome) = ctrl
            .execute("req-1", &["digicert".to_string(), "globalsign".to_string()], &imprint, None, None, None)
            .await
            .expect("globalsign should win after hedge");
        assert_eq!(provider_id, "globalsign");
        assert!(outcome.success);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded_cancels_in_flight_attempts() {
        let health = monitor();
        health.record("digicert", true, 10.0, None);
        health.record("digicert", true, 10.0, None);
        health.record("digicert", true, 10.0, None);

        let mut adapters: BTreeMap<String, Arc<dyn ProviderAdapter>> = BTreeMap::new();
        adapters.insert(
            "digicert".to_string(),
            Arc::new(StubAdapter { id: "digicert".to_string(), success: true, delay: Duration::from_secs(30) }),
        );

        let ctrl = controller(adapters, health);
        let imprint = imprint();
        let result = ctrl
            .execute("req-2", &["digicert".to_string()], &imprint, None, None, Some(Duration::from_millis(500)))
            .await;
        assert!(matches!(result, Err(CoreError::DeadlineExceeded)));
        assert!(ctrl.active_attempts.is_empty());
    }
}
