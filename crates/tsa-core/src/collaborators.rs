//! External collaborator traits (§6 "Inward interfaces").
//!
//! The validator (`crate::validator`) does not itself parse X.509 chains or
//! verify CMS signatures — it consumes the results of these three
//! synchronous, boolean/byte-contract collaborators. This crate ships a real
//! [`Hasher`] (SHA-2 is ordinary, uncontroversial library code), but
//! deliberately does **not** ship a [`ChainValidator`] or [`CmsVerifier`]
//! implementation: a placeholder that always returns `true` would silently
//! defeat the entire validator. Callers must wire in a real X.509 path
//! validator (signature chaining, validity periods, basic constraints, key
//! usage, revocation) and a real CMS signature verifier.

use tsa_types::imprint::HashAlgorithm;
use tsa_types::trust_anchor::TrustAnchor;

/// Full X.509 certificate path validation against a single trust anchor
/// (§6.1). Implementations must check signature chaining, validity period,
/// basic constraints, key usage, name constraints, and revocation status.
pub trait ChainValidator: Send + Sync {
    /// `cert_chain` runs signer-to-anchor (excluding the anchor itself).
    /// Returns `true` iff `signer_cert` chains validly to `trust_anchor`.
    fn validate_chain(
        &self,
        signer_cert_der: &[u8],
        cert_chain_der: &[Vec<u8>],
        trust_anchor: &TrustAnchor,
    ) -> bool;
}

/// CMS signature verification over the encoded `TSTInfo` (or its
/// `SignedAttributes`) (§6.2).
pub trait CmsVerifier: Send + Sync {
    fn verify(&self, signed_info_der: &[u8], signature_bytes: &[u8], signer_public_key_der: &[u8]) -> bool;
}

/// Digest computation keyed by algorithm OID, used by the ESSCertIDv2 check
/// (§6.3, §4.5 check 13).
pub trait Hasher: Send + Sync {
    fn digest(&self, algorithm: HashAlgorithm, bytes: &[u8]) -> Vec<u8>;
}

/// The crate's one concrete collaborator: a real SHA-2 family hasher. Unlike
/// chain validation and CMS verification, there is no meaningful "external
/// policy decision" in computing a digest, so shipping this implementation
/// does not risk silently disabling a security check.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha2Hasher;

impl Hasher for Sha2Hasher {
    fn digest(&self, algorithm: HashAlgorithm, bytes: &[u8]) -> Vec<u8> {
        use sha2::{Digest, Sha256, Sha384, Sha512};
        match algorithm {
            HashAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(bytes).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha2_hasher_produces_correct_length_digests() {
        let hasher = Sha2Hasher;
        assert_eq!(hasher.digest(HashAlgorithm::Sha256, b"hello").len(), 32);
        assert_eq!(hasher.digest(HashAlgorithm::Sha384, b"hello").len(), 48);
        assert_eq!(hasher.digest(HashAlgorithm::Sha512, b"hello").len(), 64);
    }

    #[test]
    fn sha2_hasher_is_deterministic() {
        let hasher = Sha2Hasher;
        let a = hasher.digest(HashAlgorithm::Sha256, b"content");
        let b = hasher.digest(HashAlgorithm::Sha256, b"content");
        assert_eq!(a, b);
    }
}
