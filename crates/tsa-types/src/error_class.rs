//! The fixed error-classification vocabulary that is the entire contract
//! between the provider adapter (C1) and the health monitor (C2) — §4.1:
//! "This fixed vocabulary is the sole interface contract between adapter
//! and C2's error classifier."

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed classes an adapter failure (or a validator-detected
/// defect fed back into health, §4.6 step 4) must map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    TimeNotAvailable,
    SystemFailure,
    BadAlg,
    ConnectionFailure,
    Timeout,
    Http4xx,
    Http5xx,
    /// A `validation_failed(reason)` surfaced from C5 back into health,
    /// e.g. `imprint_mismatch`, `untrusted_chain` (§4.6 step 4 "class
    /// policyError").
    PolicyError,
    /// Nonce echo failure (§8 scenario 2 "class Nonce…").
    NonceMismatch,
}

impl ErrorClass {
    /// Whether this class counts toward the "≥3 occurrences of a critical
    /// error class" red-classification rule (§4.2).
    pub fn is_critical(self) -> bool {
        matches!(self, ErrorClass::TimeNotAvailable | ErrorClass::SystemFailure)
    }

    /// Classifies a raw adapter-supplied error string by the fixed
    /// substrings §4.1 mandates the adapter use. Order matters only in
    /// that `timeNotAvailable`/`systemFailure` (critical classes) are
    /// checked before the more generic transport classes.
    pub fn classify(raw: &str) -> Option<Self> {
        let hay = raw;
        if hay.contains("timeNotAvailable") {
            Some(ErrorClass::TimeNotAvailable)
        } else if hay.contains("systemFailure") {
            Some(ErrorClass::SystemFailure)
        } else if hay.contains("badAlg") {
            Some(ErrorClass::BadAlg)
        } else if hay.contains("connectionFailure") {
            Some(ErrorClass::ConnectionFailure)
        } else if hay.contains("timeout") {
            Some(ErrorClass::Timeout)
        } else if hay.contains("HTTP 4") {
            Some(ErrorClass::Http4xx)
        } else if hay.contains("HTTP 5") {
            Some(ErrorClass::Http5xx)
        } else if hay.starts_with("Policy") {
            Some(ErrorClass::PolicyError)
        } else if hay.starts_with("Nonce") {
            Some(ErrorClass::NonceMismatch)
        } else {
            None
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::TimeNotAvailable => "timeNotAvailable",
            ErrorClass::SystemFailure => "systemFailure",
            ErrorClass::BadAlg => "badAlg",
            ErrorClass::ConnectionFailure => "connectionFailure",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Http4xx => "HTTP 4xx",
            ErrorClass::Http5xx => "HTTP 5xx",
            ErrorClass::PolicyError => "Policy error",
            ErrorClass::NonceMismatch => "Nonce mismatch",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_critical_classes() {
        assert_eq!(
            ErrorClass::classify("TSA responded: timeNotAvailable"),
            Some(ErrorClass::TimeNotAvailable)
        );
        assert!(ErrorClass::TimeNotAvailable.is_critical());
        assert!(ErrorClass::SystemFailure.is_critical());
        assert!(!ErrorClass::Timeout.is_critical());
    }

    #[test]
    fn classifies_transport_classes() {
        assert_eq!(ErrorClass::classify("request timeout"), Some(ErrorClass::Timeout));
        assert_eq!(
            ErrorClass::classify("responded HTTP 503"),
            None,
            "raw transport strings must spell out the fixed vocabulary substrings"
        );
        assert_eq!(
            ErrorClass::classify("responded HTTP 5xx"),
            Some(ErrorClass::Http5xx)
        );
    }

    #[test]
    fn unrecognized_strings_classify_to_none() {
        assert_eq!(ErrorClass::classify("some unrelated error"), None);
    }
}
