//! Long-term RSA identities.
//!
//! Each server owns one [`IdentityKeyPair`]. Its public half
//! ([`PublicIdentity`]) is used by peers for two things:
//!
//! - key transport: the initiator seals the `CONNECT` envelope with RSA
//!   PKCS#1 v1.5 so only the responder can read the session keys
//! - token verification: tokens carry a SHA256withRSA (PKCS#1 v1.5)
//!   signature over their canonical string
//!
//! Keys persist as PKCS#8 (private) and SPKI (public) PEM. The SPKI DER form
//! is what travels on the wire and what TOFU fingerprints are computed over.

use std::fmt;

use rand::{CryptoRng, RngCore};
use rsa::{
    Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    signature::{SignatureEncoding, Signer, Verifier},
};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::CryptoError;

/// Modulus size for freshly generated server identities.
pub const DEFAULT_RSA_BITS: usize = 4096;

/// Prefix of rendered key fingerprints.
pub const FINGERPRINT_PREFIX: &str = "SHA256:";

/// Public half of a server identity.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicIdentity {
    key: RsaPublicKey,
}

impl PublicIdentity {
    /// Decode from SPKI DER.
    ///
    /// # Errors
    ///
    /// - `KeyEncoding` if the bytes are not an RSA SPKI structure
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_der(der)
            .map(|key| Self { key })
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
    }

    /// Decode from SPKI PEM.
    ///
    /// # Errors
    ///
    /// - `KeyEncoding` on malformed PEM
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_pem(pem)
            .map(|key| Self { key })
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
    }

    /// SPKI DER encoding.
    ///
    /// # Errors
    ///
    /// - `KeyEncoding` if encoding fails
    pub fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.key
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
    }

    /// SPKI PEM encoding.
    ///
    /// # Errors
    ///
    /// - `KeyEncoding` if encoding fails
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
    }

    /// `SHA256:<hex>` fingerprint of the SPKI DER encoding.
    ///
    /// # Errors
    ///
    /// - `KeyEncoding` if encoding fails
    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        Ok(fingerprint(&self.to_der()?))
    }

    /// Encrypt a short message so only the private key holder can read it.
    ///
    /// # Errors
    ///
    /// - `Rsa` if `plaintext` is longer than the modulus allows
    pub fn seal<R>(&self, rng: &mut R, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>
    where
        R: RngCore + CryptoRng,
    {
        self.key
            .encrypt(rng, Pkcs1v15Encrypt, plaintext)
            .map_err(|e| CryptoError::Rsa(e.to_string()))
    }

    /// Verify a SHA256withRSA signature over `message`.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the signature is malformed or does not verify
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let signature =
            Signature::try_from(signature).map_err(|_| CryptoError::InvalidSignature)?;
        VerifyingKey::<Sha256>::new(self.key.clone())
            .verify(message, &signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for PublicIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fingerprint() {
            Ok(fp) => f.debug_tuple("PublicIdentity").field(&fp).finish(),
            Err(_) => f.write_str("PublicIdentity(<unencodable>)"),
        }
    }
}

/// A server's RSA key pair.
#[derive(Clone)]
pub struct IdentityKeyPair {
    private: RsaPrivateKey,
    public: PublicIdentity,
}

impl IdentityKeyPair {
    /// Generate a fresh key pair.
    ///
    /// # Errors
    ///
    /// - `Rsa` if key generation fails (e.g. an unsupported modulus size)
    pub fn generate<R>(rng: &mut R, bits: usize) -> Result<Self, CryptoError>
    where
        R: RngCore + CryptoRng,
    {
        let private =
            RsaPrivateKey::new(rng, bits).map_err(|e| CryptoError::Rsa(e.to_string()))?;
        Ok(Self::from_private(private))
    }

    /// Decode a PKCS#8 PEM private key.
    ///
    /// # Errors
    ///
    /// - `KeyEncoding` on malformed PEM
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(Self::from_private(private))
    }

    fn from_private(private: RsaPrivateKey) -> Self {
        let public = PublicIdentity { key: private.to_public_key() };
        Self { private, public }
    }

    /// PKCS#8 PEM encoding of the private key. Zeroized on drop.
    ///
    /// # Errors
    ///
    /// - `KeyEncoding` if encoding fails
    pub fn to_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
    }

    /// Public half.
    pub fn public(&self) -> &PublicIdentity {
        &self.public
    }

    /// Decrypt a message produced by [`PublicIdentity::seal`].
    ///
    /// # Errors
    ///
    /// - `Rsa` if the ciphertext was not sealed for this key
    pub fn open(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.private
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| CryptoError::Rsa(e.to_string()))
    }

    /// SHA256withRSA signature over `message`.
    ///
    /// # Errors
    ///
    /// - `Rsa` if signing fails
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        SigningKey::<Sha256>::new(self.private.clone())
            .try_sign(message)
            .map(|sig| sig.to_vec())
            .map_err(|e| CryptoError::Rsa(e.to_string()))
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// `SHA256:<hex>` fingerprint of an encoded public key.
pub fn fingerprint(encoded_key: &[u8]) -> String {
    let digest = Sha256::digest(encoded_key);
    format!("{FINGERPRINT_PREFIX}{}", hex::encode(digest))
}
