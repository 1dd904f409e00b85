//! The closed error vocabularies that cross every public boundary of the
//! mediator (§7). Keeping these as closed enums (rather than opaque strings)
//! lets callers match on outcome without parsing prose, and keeps transport
//! adapters from leaking provider-specific detail into caller-facing errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a timestamp token failed validation (§4.5). Exactly one of these is
/// ever reported per failed validation — checks run in a fixed order and
/// stop at the first failure (§4.5 "13-step order").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    InvalidInput,
    InvalidVersion,
    InvalidPolicyOid,
    ImprintMismatch,
    InvalidSerial,
    InvalidGenTime,
    InvalidAccuracy,
    NonceMismatch,
    UnknownExtensions,
    MissingOrNoncriticalTimestampingEku,
    UntrustedChain,
    BadSignature,
    EssCertIdMismatch,
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationReason::InvalidInput => "invalid_input",
            ValidationReason::InvalidVersion => "invalid_version",
            ValidationReason::InvalidPolicyOid => "invalid_policy_oid",
            ValidationReason::ImprintMismatch => "imprint_mismatch",
            ValidationReason::InvalidSerial => "invalid_serial",
            ValidationReason::InvalidGenTime => "invalid_gen_time",
            ValidationReason::InvalidAccuracy => "invalid_accuracy",
            ValidationReason::NonceMismatch => "nonce_mismatch",
            ValidationReason::UnknownExtensions => "unknown_extensions",
            ValidationReason::MissingOrNoncriticalTimestampingEku => {
                "missing_or_noncritical_timestamping_eku"
            }
            ValidationReason::UntrustedChain => "untrusted_chain",
            ValidationReason::BadSignature => "bad_signature",
            ValidationReason::EssCertIdMismatch => "ess_cert_id_mismatch",
        };
        f.write_str(s)
    }
}

/// Severity of a single policy field validation failure (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorSeverity {
    /// The policy is rejected outright.
    Error,
    /// The policy is accepted but the field is flagged (e.g. an SLA that
    /// exceeds what any configured provider can plausibly meet).
    Warning,
}

/// A single field-level policy validation failure, produced by
/// `tsa-core::policy`'s rule engine (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFieldError {
    /// Dotted path to the offending field, e.g. `accepted_trust_anchors[2].name`.
    pub field: String,
    /// Stable machine-readable code, e.g. `too_many_trust_anchors`.
    pub code: String,
    pub severity: FieldErrorSeverity,
    pub message: String,
}

/// The closed set of ways a mediator request can fail (§7). Every variant's
/// message is built from sanitized detail only — see [`sanitize_detail`].
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("policy unavailable for tenant")]
    PolicyUnavailable,

    #[error("no configured provider is accepted under tenant policy")]
    PolicyNotAccepted,

    #[error("no healthy provider available")]
    NoHealthyProvider,

    #[error("provider transport error: {0}")]
    ProviderTransport(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("validation failed: {0}")]
    ValidationFailed(ValidationReason),

    #[error("policy validation failed ({} field error(s))", .0.len())]
    PolicyValidationFailed(Vec<PolicyFieldError>),
}

/// Sanitizes untrusted detail text before it is embedded in a [`CoreError`]:
/// strips control characters and truncates to 200 bytes (§7), so that a
/// provider's raw response body can never smuggle terminal escape sequences
/// or blow out log lines.
pub fn sanitize_detail(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|c| !c.is_control()).collect();
    if stripped.len() <= 200 {
        stripped
    } else {
        let mut truncated = String::with_capacity(200);
        for c in stripped.chars() {
            if truncated.len() + c.len_utf8() > 200 {
                break;
            }
            truncated.push(c);
        }
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_control_characters() {
        let raw = "line one\x1b[31mred\x1b[0m\nline two";
        let clean = sanitize_detail(raw);
        assert!(!clean.contains('\x1b'));
        assert!(!clean.contains('\n'));
    }

    #[test]
    fn sanitize_truncates_to_200_bytes() {
        let raw = "a".repeat(500);
        let clean = sanitize_detail(&raw);
        assert_eq!(clean.len(), 200);
    }

    #[test]
    fn sanitize_truncates_on_char_boundary() {
        let raw = "é".repeat(150); // 2 bytes each, 300 bytes total
        let clean = sanitize_detail(&raw);
        assert!(clean.len() <= 200);
        assert!(clean.is_char_boundary(clean.len()));
    }

    #[test]
    fn validation_reason_display_is_snake_case() {
        assert_eq!(ValidationReason::ImprintMismatch.to_string(), "imprint_mismatch");
        assert_eq!(
            ValidationReason::MissingOrNoncriticalTimestampingEku.to_string(),
            "missing_or_noncritical_timestamping_eku"
        );
    }
}
