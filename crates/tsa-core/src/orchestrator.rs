//! Request orchestrator (C6) — §4.6.
//!
//! The single entry point tying policy (C4), failover (C3), and validation
//! (C5) together into one `issue` call. Mirrors the five-step algorithm in
//! §4.6 exactly: load policy, check the caller's requested policy OID is
//! accepted, route and execute through the failover controller, validate the
//! winning token, and on a validation failure record that failure against
//! the provider that produced it before returning the reason.

use std::sync::Arc;
use std::time::Duration;

use tsa_types::error::{CoreError, ValidationReason};
use tsa_types::error_class::ErrorClass;
use tsa_types::gen_time::GenTime;
use tsa_types::imprint::MessageImprint;
use tsa_types::nonce::Nonce;
use tsa_types::oid::Oid;
use tsa_types::token::TimeStampToken;

use crate::collaborators::{ChainValidator, CmsVerifier, Hasher};
use crate::failover::FailoverController;
use crate::policy::PolicyManager;
use crate::validator::TokenValidator;

/// One timestamp request, independent of tenant policy (§3 `TimeStampRequest`).
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub imprint: MessageImprint,
    pub nonce: Option<Nonce>,
    pub req_policy: Option<Oid>,
}

/// What a caller gets back from a successful `issue` call (§4.6 "returns").
#[derive(Debug, Clone)]
pub struct IssueSuccess {
    pub token: TimeStampToken,
    pub gen_time: GenTime,
    pub policy_oid: Oid,
    pub tsa_id: String,
    pub provider_id: String,
    pub policy_fingerprint: String,
}

/// The request orchestrator (C6), generic over the same collaborators C5
/// is generic over so the whole engine shares one concrete wiring.
pub struct RequestOrchestrator<H, C, V> {
    policy_manager: Arc<PolicyManager>,
    failover: Arc<FailoverController>,
    validator: Arc<TokenValidator<H, C, V>>,
    overall_deadline: Duration,
}

impl<H, C, V> RequestOrchestrator<H, C, V>
where
    H: Hasher,
    C: ChainValidator,
    V: CmsVerifier,
{
    pub fn new(
        policy_manager: Arc<PolicyManager>,
        failover: Arc<FailoverController>,
        validator: Arc<TokenValidator<H, C, V>>,
        overall_deadline: Duration,
    ) -> Self {
        Self {
            policy_manager,
            failover,
            validator,
            overall_deadline,
        }
    }

    /// Issues one timestamp for `tenant_id` (§4.6). `request_id` identifies
    /// this call for cancellation bookkeeping in the failover controller and
    /// should be unique per call (a random/opaque string is sufficient).
    #[tracing::instrument(skip(self, request), fields(tenant_id = tenant_id))]
    pub async fn issue(&self, request_id: &str, tenant_id: &str, request: IssueRequest) -> Result<IssueSuccess, CoreError> {
        // 1. Load tenant policy.
        let record = self.policy_manager.load(tenant_id)?;
        let policy = &record.policy;

        // 2. Requested policy OID, if any, must be in the accepted set.
        if let Some(ref requested) = request.req_policy {
            if !policy.accepted_policy_oids.contains(requested) {
                return Err(CoreError::PolicyNotAccepted);
            }
        }

        // 3. Route and execute through the failover controller, bounded by
        // the overall deadline.
        let (provider_id, outcome) = self
            .failover
            .execute(
                request_id,
                &policy.routing_priority,
                &request.imprint,
                request.req_policy.as_ref(),
                request.nonce.as_ref(),
                Some(self.overall_deadline),
            )
            .await?;

        let token = outcome
            .token
            .expect("an AdapterOutcome with success=true always carries a token");

        // 4. Validate the winning token against the tenant's trust anchors.
        match self
            .validator
            .validate(&token, &request.imprint, &policy.accepted_trust_anchors, request.nonce.as_ref())
        {
            Ok(validated) => Ok(IssueSuccess {
                token,
                gen_time: validated.gen_time,
                policy_oid: validated.policy_oid,
                tsa_id: validated.tsa_id,
                provider_id,
                policy_fingerprint: record.fingerprint,
            }),
            Err(reason) => {
                let class = match reason {
                    ValidationReason::NonceMismatch => ErrorClass::NonceMismatch,
                    _ => ErrorClass::PolicyError,
                };
                self.failover.record_outcome(&provider_id, false, outcome.latency_ms, Some(class));
                Err(CoreError::ValidationFailed(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use tsa_types::imprint::HashAlgorithm;
    use tsa_types::policy::{PolicyRecord, TenantPolicy};
    use tsa_types::trust_anchor::TrustAnchor;

    use crate::adapter::{AdapterOutcome, AdapterRequest, ProviderAdapter};
    use crate::health::HealthMonitor;

    const FIXED_CERT_HASH: [u8; 32] = [7u8; 32];

    struct AlwaysGrantChainValidator;
    impl ChainValidator for AlwaysGrantChainValidator {
        fn validate_chain(&self, _signer_cert_der: &[u8], _cert_chain_der: &[Vec<u8>], _trust_anchor: &TrustAnchor) -> bool {
            true
        }
    }

    struct AlwaysGrantCmsVerifier;
    impl CmsVerifier for AlwaysGrantCmsVerifier {
        fn verify(&self, _signed_info_der: &[u8], _signature_bytes: &[u8], _signer_public_key_der: &[u8]) -> bool {
            true
        }
    }

    struct FixedHasher;
    impl Hasher for FixedHasher {
        fn digest(&self, _algorithm: HashAlgorithm, _bytes: &[u8]) -> Vec<u8> {
            FIXED_CERT_HASH.to_vec()
        }
    }

    struct StubAdapter {
        id: String,
    }

    fn sample_token(imprint: &MessageImprint) -> TimeStampToken {
        use tsa_types::token::{Accuracy, EssCertId, TstInfo};
        TimeStampToken {
            tst_info: TstInfo {
                version: 1,
                policy: Oid::new("2.16.840.1.114412.7.1").unwrap(),
                message_imprint: imprint.clone(),
                serial_number: 1,
                gen_time: GenTime::now(),
                accuracy: Some(Accuracy { seconds: 1, millis: 0, micros: 0 }),
                nonce: None,
                extensions: vec![],
            },
            signer_certificate_der: vec![1],
            cert_chain_der: vec![],
            signature_bytes: vec![1],
            signed_info_der: vec![1],
            signer_public_key_der: vec![1],
            signer_eku: tsa_types::token::SignerEkuInfo {
                key_purposes: vec![Oid::new(tsa_types::oid::TIMESTAMPING_EKU).unwrap()],
                critical: true,
            },
            ess_cert_id: Some(EssCertId {
                hash_algorithm: HashAlgorithm::Sha256,
                cert_hash: FIXED_CERT_HASH.to_vec(),
            }),
        }
    }

    #[async_trait]
    impl ProviderAdapter for StubAdapter {
        fn provider_id(&self) -> &str {
            &self.id
        }

        async fn send_request(&self, request: AdapterRequest<'_>, _timeout: std::time::Duration, _cancel: CancellationToken) -> AdapterOutcome {
            AdapterOutcome {
                success: true,
                token: Some(sample_token(request.imprint)),
                error: None,
                latency_ms: 5.0,
            }
        }
    }

    fn tenant_policy_record() -> PolicyRecord {
        let anchor = TrustAnchor::new(
            "digicert".to_string(),
            "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----".to_string(),
            Oid::new(tsa_types::oid::TIMESTAMPING_EKU).unwrap(),
        )
        .unwrap();
        let policy = TenantPolicy {
            tenant_id: "acme-corp".to_string(),
            accepted_trust_anchors: vec![anchor],
            accepted_policy_oids: tsa_types::oid::default_accepted_policy_oids(),
            routing_priority: vec!["digicert".to_string()],
            sla: tsa_types::policy::Sla { p95_latency_ms: 900, monthly_error_budget_pct: 1.0 },
        };
        let now = GenTime::now();
        PolicyRecord {
            fingerprint: crate::policy::fingerprint(&policy),
            policy,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn issue_succeeds_end_to_end() {
        let policy_manager = Arc::new(PolicyManager::new(vec!["digicert".to_string()]));
        let record = tenant_policy_record();
        policy_manager.save("acme-corp", record.policy.clone()).unwrap();

        let health = Arc::new(HealthMonitor::new(std::time::Duration::from_secs(10)));
        health.record("digicert", true, 10.0, None);
        health.record("digicert", true, 10.0, None);
        health.record("digicert", true, 10.0, None);

        let mut adapters: BTreeMap<String, Arc<dyn ProviderAdapter>> = BTreeMap::new();
        adapters.insert("digicert".to_string(), Arc::new(StubAdapter { id: "digicert".to_string() }));
        let failover = Arc::new(FailoverController::new(
            adapters,
            Arc::clone(&health),
            std::time::Duration::from_millis(300),
            std::time::Duration::from_secs(5),
        ));

        let validator = Arc::new(TokenValidator::new(
            FixedHasher,
            AlwaysGrantChainValidator,
            AlwaysGrantCmsVerifier,
            vec![],
        ));

        let orchestrator = RequestOrchestrator::new(policy_manager, failover, validator, std::time::Duration::from_secs(5));

        let imprint = MessageImprint::new(HashAlgorithm::Sha256, vec![9u8; 32]).unwrap();
        let result = orchestrator
            .issue("req-1", "acme-corp", IssueRequest { imprint, nonce: None, req_policy: None })
            .await
            .expect("issue should succeed");
        assert_eq!(result.provider_id, "digicert");
        assert_eq!(result.tsa_id, "digicert");
    }

    #[tokio::test]
    async fn issue_rejects_disallowed_req_policy_before_contacting_a_provider() {
        let policy_manager = Arc::new(PolicyManager::new(vec!["digicert".to_string()]));
        let record = tenant_policy_record();
        policy_manager.save("acme-corp", record.policy).unwrap();

        let health = Arc::new(HealthMonitor::new(std::time::Duration::from_secs(10)));
        let adapters: BTreeMap<String, Arc<dyn ProviderAdapter>> = BTreeMap::new();
        let failover = Arc::new(FailoverController::new(
            adapters,
            health,
            std::time::Duration::from_millis(300),
            std::time::Duration::from_secs(5),
        ));
        let validator = Arc::new(TokenValidator::new(FixedHasher, AlwaysGrantChainValidator, AlwaysGrantCmsVerifier, vec![]));
        let orchestrator = RequestOrchestrator::new(policy_manager, failover, validator, std::time::Duration::from_secs(5));

        let imprint = MessageImprint::new(HashAlgorithm::Sha256, vec![9u8; 32]).unwrap();
        let result = orchestrator
            .issue(
                "req-2",
                "acme-corp",
                IssueRequest { imprint, nonce: None, req_policy: Some(Oid::new("9.9.9.9").unwrap()) },
            )
            .await;
        assert!(matches!(result, Err(CoreError::PolicyNotAccepted)));
    }
}
