//! AES-128-CBC envelope encryption.
//!
//! Pure functions: the IV is generated by the caller and sent alongside the
//! ciphertext. PKCS#7 padding is byte-compatible with PKCS#5 for a 16-byte
//! block.

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::{CryptoError, keys::SessionKey};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES block and IV length.
pub const BLOCK_LEN: usize = 16;

/// Encrypt `plaintext` under `key` and `iv`.
///
/// Output length is `plaintext.len()` rounded up to the next block, plus one
/// full block when already aligned.
pub fn encrypt(key: &SessionKey, iv: &[u8; BLOCK_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes128CbcEnc::new(key.as_bytes().into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt `ciphertext` under `key` and `iv`.
///
/// # Errors
///
/// - `Decryption` if the length is not a block multiple or the padding is
///   invalid, which is what a wrong key or IV usually produces
pub fn decrypt(
    key: &SessionKey,
    iv: &[u8; BLOCK_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    Aes128CbcDec::new(key.as_bytes().into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decryption)
}
