//! Provider adapter (C1) — §4.1.
//!
//! Encodes a `TimeStampReq`, dispatches over HTTP(S) as
//! `application/timestamp-query`, decodes the `TimeStampResp`, and surfaces
//! `(success, response, error)` plus elapsed latency. Never throws: every
//! failure, including cancellation, comes back as `success=false` with a
//! classified error string drawn from the fixed vocabulary in
//! `tsa_types::error_class` (§4.1 "sole interface contract between adapter
//! and C2's error classifier").
//!
//! DER decoding of the response — unwrapping the CMS envelope into the
//! plain [`TimeStampToken`] the validator (C5) operates on — lives here too:
//! per `tsa_types::token`, "nothing downstream of the adapter touches raw
//! DER again."

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rasn::der;
use rasn::types::Integer;
use rasn_cms::{Attribute, SignedData, SignerIdentifier};
use rasn_pkix::Certificate;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use tsa_types::error_class::ErrorClass;
use tsa_types::gen_time::GenTime;
use tsa_types::imprint::{HashAlgorithm, MessageImprint};
use tsa_types::nonce::Nonce;
use tsa_types::oid::Oid;
use tsa_types::token::{Accuracy, EssCertId, SignerEkuInfo, TimeStampToken, TstInfo};
use tsa_types::wire;

/// OID of the `id-ce-extKeyUsage` certificate extension (RFC 5280 §4.2.1.12).
const EXT_KEY_USAGE_OID: &[u32] = wire::EXT_KEY_USAGE_OID;
/// OID of the `id-aa-signingCertificateV2` CMS signed attribute (RFC 5816 §3).
const SIGNING_CERTIFICATE_V2_OID: &[u32] = wire::SIGNING_CERTIFICATE_V2_OID;

/// Result of one adapter call (§4.1 contract).
#[derive(Debug, Clone)]
pub struct AdapterOutcome {
    pub success: bool,
    pub token: Option<TimeStampToken>,
    /// Present iff `!success`; always drawn from the fixed vocabulary (§4.1).
    pub error: Option<String>,
    pub latency_ms: f64,
}

impl AdapterOutcome {
    fn failure(error: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            success: false,
            token: None,
            error: Some(error.into()),
            latency_ms,
        }
    }

    /// The [`ErrorClass`] this outcome should be recorded against in C2, if
    /// any classifiable error string is present.
    pub fn error_class(&self) -> Option<ErrorClass> {
        self.error.as_deref().and_then(ErrorClass::classify)
    }
}

/// Everything needed to issue one provider request, independent of which
/// provider serves it (§3 `TimeStampRequest`).
#[derive(Debug, Clone)]
pub struct AdapterRequest<'a> {
    pub imprint: &'a MessageImprint,
    pub req_policy: Option<&'a Oid>,
    pub nonce: Option<&'a Nonce>,
}

/// The capability every provider adapter implements (§9 "Provider adapters
/// share one capability set"). No inheritance hierarchy — callers hold a
/// `dyn ProviderAdapter` per provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Sends one request, honoring `timeout` and `cancel`. Never returns
    /// `Err` — all failure modes map to `AdapterOutcome { success: false, .. }`
    /// (§4.1 "never throws to the caller").
    async fn send_request(&self, request: AdapterRequest<'_>, timeout: Duration, cancel: CancellationToken) -> AdapterOutcome;
}

/// An RFC 3161-over-HTTP provider adapter backed by `reqwest`.
pub struct HttpProviderAdapter {
    provider_id: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpProviderAdapter {
    pub fn new(provider_id: impl Into<String>, endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            provider_id: provider_id.into(),
            endpoint: endpoint.into(),
            client,
        }
    }

    fn build_request_der(&self, request: &AdapterRequest<'_>) -> Result<Vec<u8>, String> {
        let hash_alg_oid = request.imprint.hash_algorithm.oid();
        let oid_arcs: Vec<u32> = hash_alg_oid
            .as_str()
            .split('.')
            .map(|s| s.parse().map_err(|_| "badAlg: malformed algorithm OID".to_string()))
            .collect::<Result<_, _>>()?;

        let wire_req = wire::TimeStampReq {
            version: Integer::from(1),
            message_imprint: wire::AsnMessageImprint {
                hash_algorithm: rasn_pkix::AlgorithmIdentifier {
                    algorithm: rasn::types::ObjectIdentifier::new(oid_arcs)
                        .ok_or_else(|| "badAlg: malformed algorithm OID".to_string())?,
                    parameters: None,
                },
                hashed_message: rasn::types::OctetString::from(request.imprint.hashed_message().to_vec()),
            },
            req_policy: match request.req_policy {
                Some(oid) => Some(oid_to_asn(oid)?),
                None => None,
            },
            nonce: request.nonce.map(|n| Integer::from_bytes_be(rasn::types::SignedType::Positive, n.as_be_bytes())),
            cert_req: true,
            extensions: None,
        };

        der::encode(&wire_req).map_err(|e| format!("systemFailure: request encoding failed: {e}"))
    }

    async fn do_send(&self, body: Vec<u8>, timeout: Duration, cancel: CancellationToken) -> Result<Vec<u8>, String> {
        let send_fut = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/timestamp-query")
            .body(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err("timeout".to_string()),
            result = tokio::time::timeout(timeout, send_fut) => match result {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => return Err(format!("connectionFailure: {e}")),
                Err(_) => return Err("timeout".to_string()),
            },
        };

        let status = response.status();
        if status.is_client_error() {
            return Err(format!("HTTP 4xx: {status}"));
        }
        if status.is_server_error() {
            return Err(format!("HTTP 5xx: {status}"));
        }

        let body_fut = response.bytes();
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err("timeout".to_string()),
            result = tokio::time::timeout(timeout, body_fut) => match result {
                Ok(Ok(b)) => b,
                Ok(Err(e)) => return Err(format!("connectionFailure: {e}")),
                Err(_) => return Err("timeout".to_string()),
            },
        };
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    #[instrument(skip_all, fields(provider_id = %self.provider_id))]
    async fn send_request(&self, request: AdapterRequest<'_>, timeout: Duration, cancel: CancellationToken) -> AdapterOutcome {
        let start = Instant::now();

        let body = match self.build_request_der(&request) {
            Ok(b) => b,
            Err(e) => return AdapterOutcome::failure(e, start.elapsed().as_secs_f64() * 1000.0),
        };

        let response_bytes = match self.do_send(body, timeout, cancel).await {
            Ok(b) => b,
            Err(e) => return AdapterOutcome::failure(e, start.elapsed().as_secs_f64() * 1000.0),
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let resp: wire::TimeStampResp = match der::decode(&response_bytes) {
            Ok(r) => r,
            Err(e) => return AdapterOutcome::failure(format!("systemFailure: response decoding failed: {e}"), latency_ms),
        };

        match resp.status.status {
            wire::PkiStatus::Granted | wire::PkiStatus::GrantedWithMods => {}
            wire::PkiStatus::Rejection => {
                return AdapterOutcome::failure("systemFailure: TSA rejected request", latency_ms);
            }
            wire::PkiStatus::Waiting => {
                return AdapterOutcome::failure("timeNotAvailable: TSA is waiting", latency_ms);
            }
            wire::PkiStatus::RevocationWarning | wire::PkiStatus::RevocationNotification => {
                return AdapterOutcome::failure("systemFailure: TSA revocation notice", latency_ms);
            }
        }

        let Some(token_asn) = resp.time_stamp_token else {
            return AdapterOutcome::failure("systemFailure: granted response carried no token", latency_ms);
        };

        match decode_token(&token_asn.content) {
            Ok(token) => AdapterOutcome {
                success: true,
                token: Some(token),
                error: None,
                latency_ms,
            },
            Err(e) => AdapterOutcome::failure(e, latency_ms),
        }
    }
}

fn oid_to_asn(oid: &Oid) -> Result<rasn::types::ObjectIdentifier, String> {
    let arcs: Vec<u32> = oid
        .as_str()
        .split('.')
        .map(|s| s.parse().map_err(|_| "systemFailure: malformed policy OID".to_string()))
        .collect::<Result<_, _>>()?;
    rasn::types::ObjectIdentifier::new(arcs).ok_or_else(|| "systemFailure: malformed policy OID".to_string())
}

/// Decodes the CMS `SignedData` envelope (already unwrapped from
/// `ContentInfo`) into the domain [`TimeStampToken`] the validator consumes.
/// This is the one place the adapter has to reach into certificate and
/// attribute internals — chain validation and signature cryptography remain
/// the external collaborators' job (§6, §1 Non-goals).
fn decode_token(signed_data: &SignedData) -> Result<TimeStampToken, String> {
    let tst_info_der = signed_data
        .encap_content_info
        .content
        .as_ref()
        .ok_or_else(|| "systemFailure: missing encapsulated TSTInfo".to_string())?;
    let tst_info_asn: wire::TstInfo =
        der::decode(tst_info_der).map_err(|e| format!("systemFailure: malformed TSTInfo: {e}"))?;

    let tst_info = convert_tst_info(&tst_info_asn)?;

    let signer_info = signed_data
        .signer_infos
        .iter()
        .next()
        .ok_or_else(|| "systemFailure: no signer info in token".to_string())?;

    let certs = signed_data
        .certificates
        .as_ref()
        .ok_or_else(|| "systemFailure: no certificates in token".to_string())?;
    let mut cert_ders: Vec<(Vec<u8>, Certificate)> = Vec::new();
    for choice in certs.iter() {
        if let rasn_cms::CertificateChoices::Certificate(cert) = choice {
            let der = der::encode(cert.as_ref()).map_err(|e| format!("systemFailure: re-encoding certificate failed: {e}"))?;
            cert_ders.push((der, (**cert).clone()));
        }
    }
    if cert_ders.is_empty() {
        return Err("systemFailure: token carried no X.509 certificates".to_string());
    }

    let signer_index = match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(ias) => cert_ders
            .iter()
            .position(|(_, c)| c.tbs_certificate.serial_number == ias.serial_number)
            .unwrap_or(0),
        SignerIdentifier::SubjectKeyIdentifier(_) => 0,
    };
    let (signer_certificate_der, signer_cert) = cert_ders.remove(signer_index);
    let cert_chain_der: Vec<Vec<u8>> = cert_ders.into_iter().map(|(der, _)| der).collect();

    let signer_public_key_der = der::encode(&signer_cert.tbs_certificate.subject_public_key_info)
        .map_err(|e| format!("systemFailure: re-encoding public key failed: {e}"))?;

    let signer_eku = extract_eku(&signer_cert)?;
    let ess_cert_id = extract_ess_cert_id(signer_info.signed_attrs.as_ref());

    // The signature covers the DER encoding of `signed_attrs` as a SET OF
    // (re-tagged from the `[0] IMPLICIT` form the wire uses), or — absent
    // signed attributes — the encapsulated TSTInfo bytes directly (RFC 5652
    // §5.4).
    let signed_info_der = match &signer_info.signed_attrs {
        Some(attrs) => der::encode(attrs).map_err(|e| format!("systemFailure: re-encoding signed attributes failed: {e}"))?,
        None => tst_info_der.to_vec(),
    };

    Ok(TimeStampToken {
        tst_info,
        signer_certificate_der,
        cert_chain_der,
        signature_bytes: signer_info.signature.to_vec(),
        signed_info_der,
        signer_public_key_der,
        signer_eku,
        ess_cert_id,
    })
}

fn convert_tst_info(asn: &wire::TstInfo) -> Result<TstInfo, String> {
    let policy = Oid::new(asn.policy.to_string()).map_err(|_| "systemFailure: malformed policy OID in token".to_string())?;

    let hash_alg_oid = Oid::new(asn.message_imprint.hash_algorithm.algorithm.to_string())
        .map_err(|_| "badAlg: malformed imprint algorithm OID".to_string())?;
    let hash_algorithm =
        HashAlgorithm::from_oid(&hash_alg_oid).ok_or_else(|| "badAlg: unsupported imprint hash algorithm".to_string())?;
    let message_imprint = MessageImprint::new(hash_algorithm, asn.message_imprint.hashed_message.to_vec())
        .map_err(|e| format!("badAlg: {e}"))?;

    let serial_number: u64 = (&asn.serial_number)
        .try_into()
        .map_err(|_| "systemFailure: serial number out of range".to_string())?;

    let gen_time = GenTime::from_secs(asn.gen_time.timestamp() as u64);

    let accuracy = asn.accuracy.as_ref().map(|a| Accuracy {
        seconds: a.seconds.as_ref().map(|i| i.try_into().unwrap_or(0)).unwrap_or(0),
        millis: a.millis.as_ref().map(|i| i.try_into().unwrap_or(0)).unwrap_or(0),
        micros: a.micros.as_ref().map(|i| i.try_into().unwrap_or(0)).unwrap_or(0),
    });

    let nonce = match &asn.nonce {
        Some(n) => Some(Nonce::from_be_bytes(&n.to_signed_bytes_be()).map_err(|_| "Nonce: provider returned an oversized nonce".to_string())?),
        None => None,
    };

    let extensions = match &asn.extensions {
        Some(exts) => exts
            .iter()
            .map(|e| Oid::new(e.extn_id.to_string()).map_err(|_| "systemFailure: malformed extension OID".to_string()))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(TstInfo {
        version: (&asn.version).try_into().map_err(|_| "systemFailure: malformed version".to_string())?,
        policy,
        message_imprint,
        serial_number,
        gen_time,
        accuracy,
        nonce,
        extensions,
    })
}

fn extract_eku(cert: &Certificate) -> Result<SignerEkuInfo, String> {
    let extensions = cert
        .tbs_certificate
        .extensions
        .as_ref()
        .ok_or_else(|| "missing_or_noncritical_timestamping_eku: certificate carries no extensions".to_string())?;

    let target = rasn::types::ObjectIdentifier::new(EXT_KEY_USAGE_OID.to_vec())
        .expect("extKeyUsage OID is well-formed by construction");

    let Some(ext) = extensions.iter().find(|e| e.extn_id == target) else {
        return Ok(SignerEkuInfo {
            key_purposes: Vec::new(),
            critical: false,
        });
    };

    let key_purposes_asn: rasn_pkix::ExtKeyUsageSyntax =
        der::decode(&ext.extn_value).map_err(|e| format!("systemFailure: malformed extKeyUsage extension: {e}"))?;
    let key_purposes = key_purposes_asn
        .into_iter()
        .filter_map(|oid| Oid::new(oid.to_string()).ok())
        .collect();

    Ok(SignerEkuInfo {
        key_purposes,
        critical: ext.critical,
    })
}

fn extract_ess_cert_id(signed_attrs: Option<&rasn_cms::SignedAttributes>) -> Option<EssCertId> {
    let attrs = signed_attrs?;
    let target = rasn::types::ObjectIdentifier::new(SIGNING_CERTIFICATE_V2_OID.to_vec())
        .expect("signingCertificateV2 OID is well-formed by construction");
    let attr = find_attribute(attrs, &target)?;
    let value_der = attr.values.iter().next()?;
    let value_bytes: Vec<u8> = der::encode(value_der).ok()?;
    let signing_cert: wire::SigningCertificateV2 = der::decode(&value_bytes).ok()?;
    let first = signing_cert.certs.into_iter().next()?;
    let hash_algorithm = match first.hash_algorithm {
        Some(alg) => {
            let oid = Oid::new(alg.algorithm.to_string()).ok()?;
            HashAlgorithm::from_oid(&oid)?
        }
        // Default per RFC 5816 §3 when the field is absent.
        None => HashAlgorithm::Sha256,
    };
    Some(EssCertId {
        hash_algorithm,
        cert_hash: first.cert_hash.to_vec(),
    })
}

fn find_attribute<'a>(attrs: &'a rasn_cms::SignedAttributes, oid: &rasn::types::ObjectIdentifier) -> Option<&'a Attribute> {
    attrs.iter().find(|a| &a.r#type == oid)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverAdapter;

    #[async_trait]
    impl ProviderAdapter for NeverAdapter {
        fn provider_id(&self) -> &str {
            "never"
        }

        async fn send_request(&self, _request: AdapterRequest<'_>, _timeout: Duration, cancel: CancellationToken) -> AdapterOutcome {
            cancel.cancelled().await;
            AdapterOutcome::failure("timeout", 0.0)
        }
    }

    #[tokio::test]
    async fn cancellation_yields_timeout_classified_failure() {
        let cancel = CancellationToken::new();
        let imprint = MessageImprint::new(HashAlgorithm::Sha256, vec![0u8; 32]).unwrap();
        let adapter = NeverAdapter;
        let cancel_clone = cancel.clone();
        cancel.cancel();
        let outcome = adapter
            .send_request(
                AdapterRequest {
                    imprint: &imprint,
                    req_policy: None,
                    nonce: None,
                },
                Duration::from_secs(1),
                cancel_clone,
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_class(), Some(ErrorClass::Timeout));
    }

    #[test]
    fn build_request_der_encodes_without_panic() {
        let client = reqwest::Client::new();
        let adapter = HttpProviderAdapter::new("digicert", "https://example.invalid/tsa", client);
        let imprint = MessageImprint::new(HashAlgorithm::Sha256, vec![1u8; 32]).unwrap();
        let nonce = Nonce::from_be_bytes(&[9, 9]).unwrap();
        let req = AdapterRequest {
            imprint: &imprint,
            req_policy: None,
            nonce: Some(&nonce),
        };
        let der = adapter.build_request_der(&req).expect("encodes");
        assert!(!der.is_empty());
    }
}
