//! Property-based tests for the symmetric envelope pipeline
//!
//! Covers round-trip secrecy (same key and IV recovers the plaintext, a
//! different key never does) and tamper detection (any flipped ciphertext bit
//! breaks the HMAC).

use proptest::prelude::*;
use sharevault_crypto::{SessionKey, SigningKey, cipher, mac};

proptest! {
    #[test]
    fn same_key_and_iv_round_trips(
        key in any::<[u8; 16]>(),
        iv in any::<[u8; 16]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let key = SessionKey::from_bytes(key);
        let ciphertext = cipher::encrypt(&key, &iv, &plaintext);
        prop_assert_eq!(cipher::decrypt(&key, &iv, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn different_key_never_recovers_plaintext(
        key in any::<[u8; 16]>(),
        other in any::<[u8; 16]>(),
        iv in any::<[u8; 16]>(),
        plaintext in prop::collection::vec(any::<u8>(), 1..512),
    ) {
        prop_assume!(key != other);
        let ciphertext = cipher::encrypt(&SessionKey::from_bytes(key), &iv, &plaintext);

        match cipher::decrypt(&SessionKey::from_bytes(other), &iv, &ciphertext) {
            Ok(garbage) => prop_assert_ne!(garbage, plaintext),
            Err(_) => {},
        }
    }

    #[test]
    fn flipped_bit_fails_hmac(
        key in any::<[u8; 16]>(),
        data in prop::collection::vec(any::<u8>(), 1..1024),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let key = SigningKey::from_bytes(key);
        let tag = mac::tag(&key, &data);

        let mut tampered = data.clone();
        let i = position.index(tampered.len());
        tampered[i] ^= 1 << bit;

        prop_assert!(mac::verify(&key, &tampered, &tag).is_err());
    }
}
