//! Nonce values: non-negative big integers bounded to 256 bits, compared in
//! constant time with respect to value (§3 `TimeStampRequest.nonce`, §4.5
//! check 8 "Nonce echo").

use serde::{Deserialize, Serialize};

/// A non-negative integer in `[0, 2^256)`, stored as a big-endian byte
/// vector with no leading zero bytes (canonical form) so two nonces with
/// equal numeric value always have equal byte representations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nonce(Vec<u8>);

/// A candidate nonce exceeded 256 bits or was otherwise malformed.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NonceError {
    #[error("nonce exceeds 256 bits ({0} significant bytes)")]
    TooLarge(usize),
}

impl Nonce {
    pub const MAX_BYTES: usize = 32;

    /// Builds a canonical nonce from a big-endian byte slice, stripping
    /// leading zero bytes. Rejects values needing more than 256 bits.
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self, NonceError> {
        let trimmed: &[u8] = {
            let first_nonzero = bytes.iter().position(|&b| b != 0);
            match first_nonzero {
                Some(idx) => &bytes[idx..],
                None => &[],
            }
        };
        if trimmed.len() > Self::MAX_BYTES {
            return Err(NonceError::TooLarge(trimmed.len()));
        }
        Ok(Self(trimmed.to_vec()))
    }

    /// Generates a random nonce of exactly `bits` bits (64–256 per §6 "Provider
    /// wire format"), using the supplied random byte source. The high bit of
    /// the first byte is forced set so the nonce is exactly `bits` bits wide,
    /// not merely bounded by it.
    pub fn from_random_bytes(bits: u16, mut random_bytes: impl FnMut(&mut [u8])) -> Self {
        let byte_len = (bits as usize).div_ceil(8).max(1);
        let mut buf = vec![0u8; byte_len];
        random_bytes(&mut buf);
        buf[0] |= 0x80;
        Self::from_be_bytes(&buf).expect("bounded by construction to <= 32 bytes when bits<=256")
    }

    pub fn as_be_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Constant-time equality: always walks the longer operand's full length,
/// so neither early-exit timing nor length itself leaks which bytes (if
/// any) differ. Values are compared numerically (leading zeros already
/// stripped by construction), so this also serves as numeric equality.
impl PartialEq for Nonce {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (&self.0, &other.0);
        let max_len = a.len().max(b.len());
        let mut diff: u8 = ((a.len() != b.len()) as u8) << 7;
        for i in 0..max_len {
            let av = a.len().checked_sub(max_len - i).map(|idx| a[idx]).unwrap_or(0);
            let bv = b.len().checked_sub(max_len - i).map(|idx| b[idx]).unwrap_or(0);
            diff |= av ^ bv;
        }
        diff == 0
    }
}
impl Eq for Nonce {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_zero_bytes() {
        let n = Nonce::from_be_bytes(&[0, 0, 1, 2]).unwrap();
        assert_eq!(n.as_be_bytes(), &[1, 2]);
    }

    #[test]
    fn rejects_over_256_bits() {
        let bytes = vec![1u8; 33];
        assert!(matches!(
            Nonce::from_be_bytes(&bytes),
            Err(NonceError::TooLarge(33))
        ));
    }

    #[test]
    fn equality_is_numeric_not_representational() {
        let a = Nonce::from_be_bytes(&[0, 0, 0, 5]).unwrap();
        let b = Nonce::from_be_bytes(&[5]).unwrap();
        assert_eq!(a, b);
        let c = Nonce::from_be_bytes(&[6]).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn random_nonce_has_requested_bit_width() {
        let n = Nonce::from_random_bytes(64, |buf| buf.fill(0xFF));
        assert_eq!(n.as_be_bytes().len(), 8);
        assert_eq!(n.as_be_bytes()[0] & 0x80, 0x80);
    }
}
