//! HMAC-SHA1 envelope tags, rendered as lowercase hex.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::{CryptoError, keys::SigningKey};

type HmacSha1 = Hmac<Sha1>;

fn keyed(key: &SigningKey) -> HmacSha1 {
    // HMAC accepts keys of any length
    let Ok(mac) = HmacSha1::new_from_slice(key.as_bytes()) else {
        unreachable!("HMAC-SHA1 accepts any key length");
    };
    mac
}

/// Compute the hex tag of `data`.
pub fn tag(key: &SigningKey, data: &[u8]) -> String {
    let mut mac = keyed(key);
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex tag in constant time.
///
/// # Errors
///
/// - `MalformedMac` if `expected_hex` is not hex
/// - `MacMismatch` if the tag does not match
pub fn verify(key: &SigningKey, data: &[u8], expected_hex: &str) -> Result<(), CryptoError> {
    let expected = hex::decode(expected_hex).map_err(|_| CryptoError::MalformedMac)?;
    let mut mac = keyed(key);
    mac.update(data);
    mac.verify_slice(&expected).map_err(|_| CryptoError::MacMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2202_vector() {
        // RFC 2202 test case 2 uses a 4-byte key; HMAC zero-pads to the block
        // size, so a 16-byte key padded with zeros gives the same result.
        let mut raw = [0u8; 16];
        raw[..4].copy_from_slice(b"Jefe");
        let key = SigningKey::from_bytes(raw);
        assert_eq!(
            tag(&key, b"what do ya want for nothing?"),
            "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
    }

    #[test]
    fn tag_verifies() {
        let key = SigningKey::from_bytes([7; 16]);
        let t = tag(&key, b"ciphertext");
        assert_eq!(t.len(), 40);
        assert!(verify(&key, b"ciphertext", &t).is_ok());
    }

    #[test]
    fn wrong_key_or_data_fails() {
        let key = SigningKey::from_bytes([7; 16]);
        let other = SigningKey::from_bytes([8; 16]);
        let t = tag(&key, b"ciphertext");
        assert_eq!(verify(&other, b"ciphertext", &t), Err(CryptoError::MacMismatch));
        assert_eq!(verify(&key, b"ciphertexT", &t), Err(CryptoError::MacMismatch));
    }

    #[test]
    fn non_hex_tag_is_malformed() {
        let key = SigningKey::from_bytes([7; 16]);
        assert_eq!(verify(&key, b"x", "zz"), Err(CryptoError::MalformedMac));
    }
}
