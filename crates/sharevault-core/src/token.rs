//! Token signing and offline verification.
//!
//! The group server signs the canonical string of a token's claims with its
//! RSA identity. File servers hold only the group server's public key and
//! verify tokens without contacting it.
//!
//! Tokens are point-in-time snapshots with no expiry: removing a user from a
//! group does not invalidate tokens issued before the removal.

use sharevault_crypto::{CryptoError, IdentityKeyPair, PublicIdentity};
use sharevault_proto::{Endpoint, Token, TokenClaims};
use thiserror::Error;

/// Why a token was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenRejection {
    /// Empty fields, a reserved `|` in any field, or no signature
    #[error("token is malformed")]
    Malformed,

    /// Issued by a different group server
    #[error("token issued by {actual:?}, expected {expected:?}")]
    WrongIssuer {
        /// Issuer this verifier trusts
        expected: String,
        /// Issuer named by the token
        actual: String,
    },

    /// Signature does not cover these claims
    #[error("token signature is invalid")]
    BadSignature,

    /// Token was issued for a different file server
    #[error("token is bound to {actual}, not {expected}")]
    WrongEndpoint {
        /// This server's advertised endpoint
        expected: Endpoint,
        /// Endpoint named by the token
        actual: Endpoint,
    },
}

/// Sign `claims` with the group server's identity.
///
/// # Errors
///
/// - `Rsa` if signing fails
pub fn sign_token(identity: &IdentityKeyPair, claims: TokenClaims) -> Result<Token, CryptoError> {
    let signature = identity.sign(claims.canonical_string().as_bytes())?;
    Ok(Token::new(claims, signature))
}

/// Verifies tokens from one issuer.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    issuer: String,
    key: PublicIdentity,
}

impl TokenVerifier {
    /// Trust tokens named `issuer` and signed by `key`.
    pub fn new(issuer: impl Into<String>, key: PublicIdentity) -> Self {
        Self { issuer: issuer.into(), key }
    }

    /// Check structure, issuer and signature.
    ///
    /// # Errors
    ///
    /// - `Malformed`, `WrongIssuer` or `BadSignature`
    pub fn verify(&self, token: &Token) -> Result<(), TokenRejection> {
        if !token.is_well_formed() {
            return Err(TokenRejection::Malformed);
        }
        if token.issuer() != self.issuer {
            return Err(TokenRejection::WrongIssuer {
                expected: self.issuer.clone(),
                actual: token.issuer().to_string(),
            });
        }
        self.key
            .verify(token.claims().canonical_string().as_bytes(), token.signature())
            .map_err(|_| TokenRejection::BadSignature)
    }

    /// [`Self::verify`], plus check that the token names `endpoint`.
    ///
    /// # Errors
    ///
    /// - any [`Self::verify`] error, or `WrongEndpoint`
    pub fn verify_for(&self, token: &Token, endpoint: &Endpoint) -> Result<(), TokenRejection> {
        self.verify(token)?;
        if token.endpoint() != endpoint {
            return Err(TokenRejection::WrongEndpoint {
                expected: endpoint.clone(),
                actual: token.endpoint().clone(),
            });
        }
        Ok(())
    }
}
