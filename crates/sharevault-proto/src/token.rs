//! Capability token data and its canonical signing string.
//!
//! A token asserts who the user is, which groups they belonged to when it was
//! issued, and which file server it is meant for. Signing and verification
//! live in `sharevault-core`; this module only defines the bytes that get
//! signed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between fields of the canonical string.
pub const TOKEN_DELIMITER: &str = "||";

/// Character no signed field may contain. Refusing it anywhere, not just as a
/// doubled pair, keeps a field from absorbing half of a neighbouring
/// delimiter, so every canonical string splits back into exactly one claim set.
pub const RESERVED_CHAR: char = '|';

/// Network endpoint of a file server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host or IP address as the client typed it
    pub ip: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The signed statement inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Name of the issuing group server
    pub issuer: String,
    /// Username the token was issued to
    pub subject: String,
    /// Group memberships at issuance time, in the order the directory lists
    /// them. A snapshot: later membership changes do not alter it.
    pub groups: Vec<String>,
    /// File server the token is bound to
    pub endpoint: Endpoint,
}

impl TokenClaims {
    /// Deterministic string covered by the signature:
    /// `issuer||subject||group1||...||groupN||ip||port`.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.issuer);
        out.push_str(TOKEN_DELIMITER);
        out.push_str(&self.subject);
        out.push_str(TOKEN_DELIMITER);
        for group in &self.groups {
            out.push_str(group);
            out.push_str(TOKEN_DELIMITER);
        }
        out.push_str(&self.endpoint.ip);
        out.push_str(TOKEN_DELIMITER);
        out.push_str(&self.endpoint.port.to_string());
        out
    }

    /// Structural check run before any signature verification.
    ///
    /// Issuer, subject, groups and endpoint host must all be valid names.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        [&self.issuer, &self.subject, &self.endpoint.ip]
            .into_iter()
            .chain(&self.groups)
            .all(|field| is_valid_name(field))
    }

    /// True if the token lists `group`.
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Signed capability. Immutable once constructed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    claims: TokenClaims,
    #[serde(with = "serde_bytes")]
    signature: Vec<u8>,
}

impl Token {
    /// Attach a detached signature to claims.
    #[must_use]
    pub fn new(claims: TokenClaims, signature: Vec<u8>) -> Self {
        Self { claims, signature }
    }

    /// Signed statement.
    #[must_use]
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// Detached signature over [`TokenClaims::canonical_string`].
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Issuing server name.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.claims.issuer
    }

    /// Username.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.subject
    }

    /// Group snapshot.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.claims.groups
    }

    /// Bound file server.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.claims.endpoint
    }

    /// Claims are well formed and a signature is present.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.signature.is_empty() && self.claims.is_well_formed()
    }

    /// Split into claims and signature.
    #[must_use]
    pub fn into_parts(self) -> (TokenClaims, Vec<u8>) {
        (self.claims, self.signature)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("claims", &self.claims)
            .field("signature_len", &self.signature.len())
            .finish()
    }
}

/// True if `name` can appear in a token: a username, group name, server name
/// or endpoint host. Non-empty and free of [`RESERVED_CHAR`].
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(RESERVED_CHAR)
}
