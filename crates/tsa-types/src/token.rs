//! Domain types for a decoded timestamp token and its signed payload.
//!
//! These are the *already-decoded* counterparts to the ASN.1 structures in
//! [`crate::wire`]. Decoding DER into these shapes (and extracting the
//! signer certificate's EKU set, critical flag, and the CMS `SignedAttributes`
//! bytes the signature actually covers) is the provider adapter's job;
//! nothing downstream of the adapter touches raw DER again. Per spec.md §1
//! Non-goals, the mediator never parses an X.509 chain or verifies a CMS
//! signature itself — those byte blobs are opaque payloads handed to the
//! external collaborators in `tsa-core::collaborators`.

use serde::{Deserialize, Serialize};

use crate::gen_time::GenTime;
use crate::imprint::{HashAlgorithm, MessageImprint};
use crate::nonce::Nonce;
use crate::oid::Oid;

/// `Accuracy`: sub-second precision claimed for `gen_time` (§3, §4.5 check 7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accuracy {
    pub seconds: u64,
    pub millis: u64,
    pub micros: u64,
}

impl Accuracy {
    /// Total accuracy expressed in microseconds. Saturates rather than
    /// overflows; the 60s cap (§8 boundary: 60,000,000 accepted,
    /// 60,000,001 rejected) is enforced by the validator, not here.
    pub fn total_micros(&self) -> u64 {
        self.seconds
            .saturating_mul(1_000_000)
            .saturating_add(self.millis.saturating_mul(1_000))
            .saturating_add(self.micros)
    }
}

/// The signed payload carried inside a timestamp token (§3 `TSTInfo`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TstInfo {
    pub version: u64,
    pub policy: Oid,
    pub message_imprint: MessageImprint,
    /// Positive, `<= 2^64 - 1` (§3); representable directly as `u64`.
    pub serial_number: u64,
    pub gen_time: GenTime,
    pub accuracy: Option<Accuracy>,
    pub nonce: Option<Nonce>,
    /// Extension OIDs present on the token. The validator checks each
    /// against a fixed allow-list (§4.5 check 9); this type just carries
    /// what was present.
    pub extensions: Vec<Oid>,
}

/// The signer certificate's extracted Extended Key Usage set and whether
/// that extension was marked critical — read off the DER by the adapter so
/// the validator never has to parse a certificate itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerEkuInfo {
    pub key_purposes: Vec<Oid>,
    pub critical: bool,
}

/// The signing-certificate hash attribute (RFC 5816 ESSCertIDv2) as
/// extracted from the CMS `SignedAttributes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EssCertId {
    pub hash_algorithm: HashAlgorithm,
    pub cert_hash: Vec<u8>,
}

/// A decoded timestamp token, owned for the duration of a single
/// verification call and never persisted by this crate (§3 lifecycle
/// summary: "Tokens and requests: per-call, never escape the orchestrator
/// except as a success return").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeStampToken {
    pub tst_info: TstInfo,
    /// DER-encoded signer certificate, opaque to this crate.
    pub signer_certificate_der: Vec<u8>,
    /// DER-encoded intermediate chain, signer-to-anchor order, opaque.
    pub cert_chain_der: Vec<Vec<u8>>,
    /// The CMS signature bytes over `signed_info_der`.
    pub signature_bytes: Vec<u8>,
    /// The encoded `SignedAttributes` (or, absent signed attributes, the
    /// encoded `TSTInfo`) that the signature actually covers — handed
    /// verbatim to the CMS verifier collaborator.
    pub signed_info_der: Vec<u8>,
    /// The signer's public key material, handed verbatim to the CMS
    /// verifier collaborator.
    pub signer_public_key_der: Vec<u8>,
    pub signer_eku: SignerEkuInfo,
    pub ess_cert_id: Option<EssCertId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_total_micros_sums_components() {
        let a = Accuracy {
            seconds: 1,
            millis: 2,
            micros: 3,
        };
        assert_eq!(a.total_micros(), 1_000_000 + 2_000 + 3);
    }

    #[test]
    fn accuracy_boundary_exactly_sixty_seconds() {
        let exactly = Accuracy {
            seconds: 60,
            millis: 0,
            micros: 0,
        };
        assert_eq!(exactly.total_micros(), 60_000_000);
        let one_over = Accuracy {
            seconds: 0,
            millis: 0,
            micros: 60_000_001,
        };
        assert_eq!(one_over.total_micros(), 60_000_001);
    }
}
