//! [`TrustAnchor`]: a trusted root or intermediate certificate a signer's
//! chain is validated against (§3, glossary).

use serde::{Deserialize, Serialize};

use crate::oid::{Oid, TIMESTAMPING_EKU};

/// A configured trust anchor. Invariant: `required_eku` must equal the
/// timestamping EKU OID (`1.3.6.1.5.5.7.3.8`) — enforced at construction,
/// not just documented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    pub name: String,
    pub pem_certificate: String,
    required_eku: Oid,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("required_eku must be the timestamping EKU ({TIMESTAMPING_EKU}), got {0}")]
pub struct WrongRequiredEku(pub Oid);

impl TrustAnchor {
    pub fn new(name: String, pem_certificate: String, required_eku: Oid) -> Result<Self, WrongRequiredEku> {
        if required_eku.as_str() != TIMESTAMPING_EKU {
            return Err(WrongRequiredEku(required_eku));
        }
        Ok(Self {
            name,
            pem_certificate,
            required_eku,
        })
    }

    pub fn required_eku(&self) -> &Oid {
        &self.required_eku
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_timestamping_eku() {
        let wrong = Oid::new("1.2.3.4").unwrap();
        let err = TrustAnchor::new("root".into(), "-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----".into(), wrong).unwrap_err();
        assert_eq!(err.0.as_str(), "1.2.3.4");
    }

    #[test]
    fn accepts_timestamping_eku() {
        let eku = Oid::new(TIMESTAMPING_EKU).unwrap();
        assert!(TrustAnchor::new("root".into(), "pem".into(), eku).is_ok());
    }
}
