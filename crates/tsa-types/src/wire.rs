//! RFC 3161 / RFC 5816 ASN.1 DER wire types.
//!
//! These mirror the ASN.1 modules in RFC 3161 §2.4 exactly (field names,
//! optionality, tagging), following the `rasn`/`rasn-cms` `tsp` module's
//! approach of deriving `AsnType`/`Encode`/`Decode` rather than hand-rolling
//! byte layout. This is the one place in the mediator that talks DER; every
//! other component operates on the plain Rust types derived from these
//! (see [`crate::token`], [`crate::imprint`]).
//!
//! Per spec.md §1 Non-goals, this crate does not verify CMS signatures or
//! X.509 chains — [`TimeStampToken`] here is a `ContentInfo` envelope only;
//! extracting and verifying the `SignedData` inside it is the provider
//! adapter's (decode) and the external collaborators' (crypto) job.

use rasn::types::{Integer, ObjectIdentifier, OctetString, Utf8String};
use rasn::{AsnType, Decode, Encode};
use rasn_pkix::{AlgorithmIdentifier, Extensions};

/// `TimeStampReq ::= SEQUENCE { version, messageImprint, reqPolicy OPTIONAL,
/// nonce OPTIONAL, certReq DEFAULT FALSE, extensions [0] OPTIONAL }`
#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct TimeStampReq {
    pub version: Integer,
    pub message_imprint: AsnMessageImprint,
    pub req_policy: Option<ObjectIdentifier>,
    pub nonce: Option<Integer>,
    #[rasn(default = "default_false")]
    pub cert_req: bool,
    #[rasn(tag(0))]
    pub extensions: Option<Extensions>,
}

fn default_false() -> bool {
    false
}

/// `MessageImprint ::= SEQUENCE { hashAlgorithm AlgorithmIdentifier,
/// hashedMessage OCTET STRING }`
///
/// Named `AsnMessageImprint` to avoid colliding with the validated domain
/// type in [`crate::imprint::MessageImprint`], which this converts to/from.
#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct AsnMessageImprint {
    pub hash_algorithm: AlgorithmIdentifier,
    pub hashed_message: OctetString,
}

/// `TimeStampResp ::= SEQUENCE { status PKIStatusInfo, timeStampToken
/// TimeStampToken OPTIONAL }`
#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct TimeStampResp {
    pub status: PkiStatusInfo,
    pub time_stamp_token: Option<TimeStampToken>,
}

/// `PKIStatusInfo ::= SEQUENCE { status PKIStatus, statusString PKIFreeText
/// OPTIONAL, failInfo PKIFailureInfo OPTIONAL }`
#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct PkiStatusInfo {
    pub status: PkiStatus,
    pub status_string: Option<Vec<Utf8String>>,
    pub fail_info: Option<rasn::types::BitString>,
}

/// `PKIStatus ::= INTEGER { granted(0), grantedWithMods(1), rejection(2),
/// waiting(3), revocationWarning(4), revocationNotification(5) }`
#[derive(AsnType, Clone, Copy, Debug, Decode, Encode, PartialEq, Eq)]
#[rasn(enumerated)]
pub enum PkiStatus {
    Granted = 0,
    GrantedWithMods = 1,
    Rejection = 2,
    Waiting = 3,
    RevocationWarning = 4,
    RevocationNotification = 5,
}

/// `TimeStampToken ::= ContentInfo`, specialized to `content: SignedData`
/// rather than CMS's generic `ContentInfo<content ANY>` — a timestamp
/// token's content type is always `id-signedData`, so decoding straight into
/// [`rasn_cms::SignedData`] avoids an extra indirection through `Any`.
#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct TimeStampToken {
    pub content_type: ObjectIdentifier,
    #[rasn(tag(explicit(0)))]
    pub content: rasn_cms::SignedData,
}

/// `TSTInfo ::= SEQUENCE { version, policy, messageImprint, serialNumber,
/// genTime, accuracy OPTIONAL, ordering DEFAULT FALSE, nonce OPTIONAL,
/// tsa [0] OPTIONAL, extensions [1] OPTIONAL }`
#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct TstInfo {
    pub version: Integer,
    pub policy: ObjectIdentifier,
    pub message_imprint: AsnMessageImprint,
    pub serial_number: Integer,
    pub gen_time: rasn::types::GeneralizedTime,
    pub accuracy: Option<Accuracy>,
    #[rasn(default = "default_false")]
    pub ordering: bool,
    pub nonce: Option<Integer>,
    #[rasn(tag(explicit(0)))]
    pub tsa: Option<rasn_pkix::GeneralName>,
    #[rasn(tag(1))]
    pub extensions: Option<Extensions>,
}

/// `Accuracy ::= SEQUENCE { seconds INTEGER OPTIONAL, millis [0] INTEGER
/// (1..999) OPTIONAL, micros [1] INTEGER (1..999) OPTIONAL }`
#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct Accuracy {
    pub seconds: Option<Integer>,
    #[rasn(tag(0))]
    pub millis: Option<Integer>,
    #[rasn(tag(1))]
    pub micros: Option<Integer>,
}

/// ESSCertIDv2 attribute (RFC 5816 / RFC 5035), binding the CMS signature to
/// the signer certificate by a SHA-2 hash.
///
/// `ESSCertIDv2 ::= SEQUENCE { hashAlgorithm AlgorithmIdentifier DEFAULT
/// {algorithm id-sha256}, certHash OCTET STRING, issuerSerial
/// IssuerSerial OPTIONAL }`
#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct EssCertIdV2 {
    pub hash_algorithm: Option<AlgorithmIdentifier>,
    pub cert_hash: OctetString,
    pub issuer_serial: Option<IssuerSerial>,
}

#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct IssuerSerial {
    pub issuer: Vec<rasn_pkix::GeneralName>,
    pub serial_number: Integer,
}

/// The `id-aa-signingCertificateV2` CMS signed attribute value (RFC 5816),
/// carrying one or more [`EssCertIdV2`] entries. This crate only ever looks
/// at `certs[0]`, which must bind the immediate signer certificate.
///
/// `SigningCertificateV2 ::= SEQUENCE { certs SEQUENCE OF ESSCertIDv2,
/// policies SEQUENCE OF PolicyInformation OPTIONAL }`
#[derive(AsnType, Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub struct SigningCertificateV2 {
    pub certs: Vec<EssCertIdV2>,
    pub policies: Option<Vec<rasn_pkix::PolicyInformation>>,
}

/// OID of the `id-aa-signingCertificateV2` attribute (RFC 5816 §3).
pub const SIGNING_CERTIFICATE_V2_OID: &[u32] = &[1, 2, 840, 113549, 1, 9, 16, 2, 47];

/// OID of the `id-ce-extKeyUsage` certificate extension (RFC 5280 §4.2.1.12).
pub const EXT_KEY_USAGE_OID: &[u32] = &[2, 5, 29, 37];

/// OID of the CMS `id-signedData` content type.
pub const SIGNED_DATA_OID: &[u32] = &[1, 2, 840, 113549, 1, 7, 2];

/// OID of the RFC 3161 `id-ct-TSTInfo` encapsulated content type.
pub const TST_INFO_CONTENT_TYPE_OID: &[u32] = &[1, 2, 840, 113549, 1, 9, 16, 1, 4];

#[cfg(test)]
mod tests {
    use super::*;
    use rasn::der;

    fn sha256_alg() -> AlgorithmIdentifier {
        AlgorithmIdentifier {
            algorithm: ObjectIdentifier::new(vec![2, 16, 840, 1, 101, 3, 4, 2, 1]).unwrap(),
            parameters: None,
        }
    }

    #[test]
    fn time_stamp_req_round_trips_through_der() {
        let req = TimeStampReq {
            version: Integer::from(1),
            message_imprint: AsnMessageImprint {
                hash_algorithm: sha256_alg(),
                hashed_message: OctetString::from(vec![7u8; 32]),
            },
            req_policy: None,
            nonce: Some(Integer::from(424242)),
            cert_req: true,
            extensions: None,
        };
        let encoded = der::encode(&req).expect("encodes");
        let decoded: TimeStampReq = der::decode(&encoded).expect("decodes");
        assert_eq!(req, decoded);
    }

    #[test]
    fn accuracy_round_trips_with_optional_fields_absent() {
        let accuracy = Accuracy {
            seconds: Some(Integer::from(1)),
            millis: None,
            micros: None,
        };
        let encoded = der::encode(&accuracy).expect("encodes");
        let decoded: Accuracy = der::decode(&encoded).expect("decodes");
        assert_eq!(accuracy, decoded);
    }
}
