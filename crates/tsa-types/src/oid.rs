//! Object identifier validation and the OIDs the mediator cares about.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// `[0-9]+(\.[0-9]+)+`, no leading/trailing/double dots, 3–100 chars.
static OID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)+$").expect("static OID regex is valid"));

/// A well-formed, validated dotted-decimal object identifier.
///
/// Construction always validates; there is no way to hold an `Oid` that
/// doesn't satisfy the glossary's well-formedness rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

/// An OID string failed the well-formedness check (length 3–100,
/// `[0-9]+(\.[0-9]+)+`, no leading/trailing/double dots).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("malformed OID: {0:?}")]
pub struct MalformedOid(pub String);

impl Oid {
    pub fn new(value: impl Into<String>) -> Result<Self, MalformedOid> {
        let value = value.into();
        if value.len() < 3 || value.len() > 100 || !OID_PATTERN.is_match(&value) {
            return Err(MalformedOid(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Oid {
    type Error = MalformedOid;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Oid::new(value)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The timestamping Extended Key Usage OID (RFC 3161 §2.3). A TSA signer
/// certificate must carry this EKU, marked critical.
pub const TIMESTAMPING_EKU: &str = "1.3.6.1.5.5.7.3.8";

/// SHA-2 family digest algorithm OIDs accepted for message imprints and
/// ESSCertIDv2 hashing. SHA-1 is deliberately absent: RFC 5816 restricts
/// ESSCertIDv2 to SHA-2, and this mediator rejects SHA-1 imprints outright.
pub const OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";
pub const OID_SHA384: &str = "2.16.840.1.101.3.4.2.2";
pub const OID_SHA512: &str = "2.16.840.1.101.3.4.2.3";

/// The well-known SHA-1 digest OID, still seen in older TSA responses; kept
/// only so the rejection path has a name to test against, never accepted by
/// [`crate::imprint::HashAlgorithm`].
pub const OID_SHA1: &str = "1.3.14.3.2.26";

/// The default policy's accepted policy OIDs (§6 "Default policy").
pub fn default_accepted_policy_oids() -> Vec<Oid> {
    [
        "2.16.840.1.114412.7.1",
        "1.3.6.1.4.1.4146.2.3",
        "1.3.6.1.4.1.6449.2.7.1",
    ]
    .into_iter()
    .map(|s| Oid::new(s).expect("default policy OIDs are well-formed by construction"))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_oids() {
        assert!(Oid::new("1.2.840.113549.1.1.1").is_ok());
        assert!(Oid::new("2.16.840.1.114412.7.1").is_ok());
    }

    #[test]
    fn rejects_malformed_oids() {
        assert!(Oid::new("1..2").is_err(), "double dot");
        assert!(Oid::new(".1.2").is_err(), "leading dot");
        assert!(Oid::new("1.2.").is_err(), "trailing dot");
        assert!(Oid::new("abc").is_err(), "non-numeric");
        assert!(Oid::new("1").is_err(), "too short, no dot");
        assert!(Oid::new(&"1.".repeat(60)).is_err(), "too long");
    }

    #[test]
    fn default_policy_oids_are_valid_and_stable() {
        let oids = default_accepted_policy_oids();
        assert_eq!(oids.len(), 3);
        assert!(oids.iter().any(|o| o.as_str() == "2.16.840.1.114412.7.1"));
    }
}
