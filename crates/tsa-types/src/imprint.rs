//! [`MessageImprint`]: the hash-algorithm-OID + hashed-message pair that
//! identifies the content being timestamped (§3, glossary).

use serde::{Deserialize, Serialize};

use crate::oid::{MalformedOid, Oid, OID_SHA256, OID_SHA384, OID_SHA512};

/// A SHA-2 family digest algorithm. SHA-1 is not representable here —
/// RFC 5816 restricts ESSCertIDv2 (and, by this mediator's policy, message
/// imprints) to SHA-2, per spec.md §9 Open Questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn oid(self) -> Oid {
        let s = match self {
            HashAlgorithm::Sha256 => OID_SHA256,
            HashAlgorithm::Sha384 => OID_SHA384,
            HashAlgorithm::Sha512 => OID_SHA512,
        };
        Oid::new(s).expect("builtin hash algorithm OIDs are well-formed")
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Maps an OID (typically decoded off the wire) to a supported
    /// algorithm. Returns `None` for anything outside the SHA-2 family,
    /// including SHA-1 — callers should treat that as `badAlg`.
    pub fn from_oid(oid: &Oid) -> Option<Self> {
        match oid.as_str() {
            OID_SHA256 => Some(HashAlgorithm::Sha256),
            OID_SHA384 => Some(HashAlgorithm::Sha384),
            OID_SHA512 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// A hash-algorithm OID paired with the hashed message bytes.
///
/// Invariant (enforced at construction): `hashed_message.len()` equals the
/// algorithm's digest length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageImprint {
    pub hash_algorithm: HashAlgorithm,
    hashed_message: Vec<u8>,
}

/// The hashed message length didn't match what the declared algorithm
/// produces, or the declared algorithm OID isn't a supported SHA-2 variant.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MessageImprintError {
    #[error("hashed message is {actual} bytes, expected {expected} for {algorithm:?}")]
    WrongDigestLength {
        algorithm: HashAlgorithm,
        expected: usize,
        actual: usize,
    },
    #[error("unsupported hash algorithm OID: {0}")]
    UnsupportedAlgorithm(Oid),
    #[error(transparent)]
    MalformedOid(#[from] MalformedOid),
}

impl MessageImprint {
    pub fn new(hash_algorithm: HashAlgorithm, hashed_message: Vec<u8>) -> Result<Self, MessageImprintError> {
        let expected = hash_algorithm.digest_len();
        if hashed_message.len() != expected {
            return Err(MessageImprintError::WrongDigestLength {
                algorithm: hash_algorithm,
                expected,
                actual: hashed_message.len(),
            });
        }
        Ok(Self {
            hash_algorithm,
            hashed_message,
        })
    }

    /// Builds from a raw OID string and bytes, rejecting unsupported
    /// algorithms (including SHA-1) before length is even checked.
    pub fn from_oid_str(oid: &str, hashed_message: Vec<u8>) -> Result<Self, MessageImprintError> {
        let oid = Oid::new(oid)?;
        let algorithm =
            HashAlgorithm::from_oid(&oid).ok_or(MessageImprintError::UnsupportedAlgorithm(oid))?;
        Self::new(algorithm, hashed_message)
    }

    pub fn hashed_message(&self) -> &[u8] {
        &self.hashed_message
    }
}

/// Constant-time with respect to both content and the two operands'
/// lengths: the comparison always walks `max(len_a, len_b)` bytes and never
/// short-circuits on a length mismatch before that walk completes, and the
/// hash algorithm is compared without branching on the digest bytes.
impl PartialEq for MessageImprint {
    fn eq(&self, other: &Self) -> bool {
        let alg_eq = self.hash_algorithm == other.hash_algorithm;
        let a = &self.hashed_message;
        let b = &other.hashed_message;
        let max_len = a.len().max(b.len());
        let mut diff: u8 = ((a.len() != b.len()) as u8) << 7;
        for i in 0..max_len {
            let av = a.get(i).copied().unwrap_or(0);
            let bv = b.get(i).copied().unwrap_or(0);
            diff |= av ^ bv;
        }
        alg_eq && diff == 0
    }
}
impl Eq for MessageImprint {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_digest_length() {
        let err = MessageImprint::new(HashAlgorithm::Sha256, vec![0u8; 10]).unwrap_err();
        assert!(matches!(err, MessageImprintError::WrongDigestLength { .. }));
    }

    #[test]
    fn rejects_sha1_oid() {
        let err = MessageImprint::from_oid_str("1.3.14.3.2.26", vec![0u8; 20]).unwrap_err();
        assert!(matches!(err, MessageImprintError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn equality_ignores_nothing_but_content_and_algorithm() {
        let a = MessageImprint::new(HashAlgorithm::Sha256, vec![1; 32]).unwrap();
        let b = MessageImprint::new(HashAlgorithm::Sha256, vec![1; 32]).unwrap();
        let c = MessageImprint::new(HashAlgorithm::Sha256, vec![2; 32]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
