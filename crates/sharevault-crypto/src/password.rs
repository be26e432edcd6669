//! Salted password hashing.
//!
//! `digest = SHA-256(salt || password)`. Comparison is constant time.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of a per-user salt.
pub const SALT_LEN: usize = 16;

/// Length of a password digest.
pub const DIGEST_LEN: usize = 32;

/// Stored password verifier. The password itself is never kept.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash {
    salt: [u8; SALT_LEN],
    digest: [u8; DIGEST_LEN],
}

impl PasswordHash {
    /// Hash `password` with a caller-supplied random salt.
    pub fn new(password: &str, salt: [u8; SALT_LEN]) -> Self {
        Self { salt, digest: Self::compute(&salt, password) }
    }

    /// Rebuild from stored parts.
    pub fn from_parts(salt: [u8; SALT_LEN], digest: [u8; DIGEST_LEN]) -> Self {
        Self { salt, digest }
    }

    /// Per-user salt.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Salted digest.
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// True if `password` hashes to the stored digest.
    pub fn verify(&self, password: &str) -> bool {
        Self::compute(&self.salt, password).ct_eq(&self.digest).into()
    }

    fn compute(salt: &[u8; SALT_LEN], password: &str) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let hash = PasswordHash::new("hunter2", [4; SALT_LEN]);
        assert!(hash.verify("hunter2"));
        assert!(!hash.verify("hunter3"));
        assert!(!hash.verify(""));
    }

    #[test]
    fn salt_changes_digest() {
        let a = PasswordHash::new("pw", [1; SALT_LEN]);
        let b = PasswordHash::new("pw", [2; SALT_LEN]);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn from_parts_restores_verifier() {
        let hash = PasswordHash::new("pw", [9; SALT_LEN]);
        let restored = PasswordHash::from_parts(*hash.salt(), *hash.digest());
        assert!(restored.verify("pw"));
    }
}
