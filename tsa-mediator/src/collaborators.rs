//! Binary-local collaborator wiring.
//!
//! `tsa-core` deliberately ships no [`tsa_core::collaborators::ChainValidator`]
//! or [`tsa_core::collaborators::CmsVerifier`] — a stub that always returns
//! `true` would silently defeat the validator. This binary cannot responsibly
//! ship one either, so it wires in collaborators that fail closed: every
//! chain/signature check reports untrusted/unverified rather than granting
//! trust it cannot actually establish. `issue` therefore demonstrates the
//! full routing, hedging, and policy pipeline end to end, but every call
//! ends in `ValidationFailed` until an operator replaces these with a real
//! X.509 path validator and CMS signature verifier.

use tsa_core::collaborators::{ChainValidator, CmsVerifier, Sha2Hasher};
use tsa_types::trust_anchor::TrustAnchor;

pub struct UnverifiedChainValidator;

impl ChainValidator for UnverifiedChainValidator {
    fn validate_chain(&self, _signer_cert_der: &[u8], _cert_chain_der: &[Vec<u8>], _trust_anchor: &TrustAnchor) -> bool {
        false
    }
}

pub struct UnverifiedCmsVerifier;

impl CmsVerifier for UnverifiedCmsVerifier {
    fn verify(&self, _signed_info_der: &[u8], _signature_bytes: &[u8], _signer_public_key_der: &[u8]) -> bool {
        false
    }
}

pub type Validator = tsa_core::validator::TokenValidator<Sha2Hasher, UnverifiedChainValidator, UnverifiedCmsVerifier>;

pub fn default_validator(known_extension_oids: Vec<tsa_types::oid::Oid>) -> Validator {
    tsa_core::validator::TokenValidator::new(Sha2Hasher, UnverifiedChainValidator, UnverifiedCmsVerifier, known_extension_oids)
}

/// The concrete orchestrator type this binary wires up, named so `cli.rs`
/// doesn't have to spell out the three collaborator type parameters itself.
pub type Orchestrator = tsa_core::orchestrator::RequestOrchestrator<Sha2Hasher, UnverifiedChainValidator, UnverifiedCmsVerifier>;
