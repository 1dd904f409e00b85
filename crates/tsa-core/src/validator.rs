//! Token validator (C5) — §4.5.
//!
//! Runs the fixed, ordered sequence of RFC 3161/5816 checks over an
//! already-decoded [`TimeStampToken`] and returns either the fields a caller
//! needs (`gen_time`, `accuracy`, `policy_oid`, `tsa_id`, `serial_number`) or
//! the first [`ValidationReason`] that failed. Checks run in order and stop
//! at the first failure — later checks never run once an earlier one fails,
//! so a slow or expensive collaborator call (chain validation, CMS
//! verification) only happens once the cheaper checks have passed.

use tsa_types::error::ValidationReason;
use tsa_types::gen_time::GenTime;
use tsa_types::imprint::MessageImprint;
use tsa_types::nonce::Nonce;
use tsa_types::oid::{Oid, TIMESTAMPING_EKU};
use tsa_types::token::{Accuracy, TimeStampToken};
use tsa_types::trust_anchor::TrustAnchor;

use crate::collaborators::{ChainValidator, CmsVerifier, Hasher};

/// The fields a caller needs out of a successfully validated token.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedToken {
    pub gen_time: GenTime,
    pub accuracy: Option<Accuracy>,
    pub policy_oid: Oid,
    /// Name of the trust anchor the signer chained to (§9 resolves the
    /// ambiguity over where `tsa_id` comes from: it identifies *which*
    /// configured anchor vouched for the signer, not the provider that
    /// served the HTTP response — that's `provider_id`, tracked separately
    /// by the orchestrator).
    pub tsa_id: String,
    pub serial_number: u64,
}

pub type VerificationResult = Result<ValidatedToken, ValidationReason>;

/// Constant-time byte equality, used for the ESSCertIDv2 hash comparison
/// (§4.5 "Constant-time comparisons").
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub struct TokenValidator<H, C, V> {
    hasher: H,
    chain_validator: C,
    cms_verifier: V,
    known_extension_oids: Vec<Oid>,
}

impl<H, C, V> TokenValidator<H, C, V>
where
    H: Hasher,
    C: ChainValidator,
    V: CmsVerifier,
{
    pub fn new(hasher: H, chain_validator: C, cms_verifier: V, known_extension_oids: Vec<Oid>) -> Self {
        Self {
            hasher,
            chain_validator,
            cms_verifier,
            known_extension_oids,
        }
    }

    #[tracing::instrument(skip_all, fields(serial_number = token.tst_info.serial_number))]
    pub fn validate(
        &self,
        token: &TimeStampToken,
        expected_imprint: &MessageImprint,
        trust_anchors: &[TrustAnchor],
        expected_nonce: Option<&Nonce>,
    ) -> VerificationResult {
        // 1. Inputs present and well-typed.
        if trust_anchors.is_empty()
            || token.signer_certificate_der.is_empty()
            || token.signed_info_der.is_empty()
            || token.signature_bytes.is_empty()
            || token.signer_public_key_der.is_empty()
        {
            return Err(ValidationReason::InvalidInput);
        }

        let tst = &token.tst_info;

        // 2. Version.
        if tst.version != 1 {
            return Err(ValidationReason::InvalidVersion);
        }

        // 3. Policy OID well-formed (already enforced by `Oid`'s own
        // constructor, but re-validate in case of a defaulted/empty value).
        if tst.policy.as_str().is_empty() {
            return Err(ValidationReason::InvalidPolicyOid);
        }

        // 4. Message imprint match (constant-time via `MessageImprint::eq`).
        if &tst.message_imprint != expected_imprint {
            return Err(ValidationReason::ImprintMismatch);
        }

        // 5. Serial number positive.
        if tst.serial_number == 0 {
            return Err(ValidationReason::InvalidSerial);
        }

        // 6. GenTime bounds.
        if !tst.gen_time.in_bounds_relative_to(GenTime::now()) {
            return Err(ValidationReason::InvalidGenTime);
        }

        // 7. Accuracy bounds.
        if let Some(accuracy) = tst.accuracy {
            if accuracy.total_micros() > 60_000_000 {
                return Err(ValidationReason::InvalidAccuracy);
            }
        }

        // 8. Nonce echo.
        if let Some(expected) = expected_nonce {
            match &tst.nonce {
                Some(actual) if actual == expected => {}
                _ => return Err(ValidationReason::NonceMismatch),
            }
        }

        // 9. Extensions allow-list.
        for ext in &tst.extensions {
            if !self.known_extension_oids.contains(ext) {
                return Err(ValidationReason::UnknownExtensions);
            }
        }

        // 10. Signer certificate has the timestamping EKU, marked critical.
        let has_timestamping_eku = token
            .signer_eku
            .key_purposes
            .iter()
            .any(|oid| oid.as_str() == TIMESTAMPING_EKU);
        if !token.signer_eku.critical || !has_timestamping_eku {
            return Err(ValidationReason::MissingOrNoncriticalTimestampingEku);
        }

        // 11. Chain to a configured trust anchor.
        let matched_anchor = trust_anchors.iter().find(|anchor| {
            self.chain_validator
                .validate_chain(&token.signer_certificate_der, &token.cert_chain_der, anchor)
        });
        let matched_anchor = match matched_anchor {
            Some(anchor) => anchor,
            None => return Err(ValidationReason::UntrustedChain),
        };

        // 12. CMS signature over TSTInfo.
        if !self.cms_verifier.verify(
            &token.signed_info_der,
            &token.signature_bytes,
            &token.signer_public_key_der,
        ) {
            return Err(ValidationReason::BadSignature);
        }

        // 13. ESSCertIDv2 binding.
        let ess = token.ess_cert_id.as_ref().ok_or(ValidationReason::EssCertIdMismatch)?;
        let computed = self.hasher.digest(ess.hash_algorithm, &token.signer_certificate_der);
        if !ct_eq(&computed, &ess.cert_hash) {
            return Err(ValidationReason::EssCertIdMismatch);
        }

        Ok(ValidatedToken {
            gen_time: tst.gen_time,
            accuracy: tst.accuracy,
            policy_oid: tst.policy.clone(),
            tsa_id: matched_anchor.name.clone(),
            serial_number: tst.serial_number,
        })
    }
}
