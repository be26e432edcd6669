//! Group server requests.

use std::fmt;

use crate::{Endpoint, Token};

/// Ask the group server for a token bound to a file server.
#[derive(Clone, PartialEq, Eq)]
pub struct GetToken {
    /// Account name
    pub username: String,
    /// Plaintext password, only ever sent inside the encrypted channel
    pub password: String,
    /// File server the token will be presented to
    pub endpoint: Endpoint,
}

impl fmt::Debug for GetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetToken")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Admin request to create an account.
#[derive(Clone, PartialEq, Eq)]
pub struct CreateUser {
    /// New account name
    pub username: String,
    /// Initial password
    pub password: String,
    /// Caller token
    pub token: Token,
}

impl fmt::Debug for CreateUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("token", &self.token)
            .finish()
    }
}

/// Admin request to delete an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteUser {
    /// Account to delete
    pub username: String,
    /// Caller token
    pub token: Token,
}

/// Request naming a single group (create, delete, list members).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRequest {
    /// Target group
    pub group: String,
    /// Caller token
    pub token: Token,
}

/// Request naming a user within a group (membership and ownership changes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRequest {
    /// Target user
    pub username: String,
    /// Target group
    pub group: String,
    /// Caller token
    pub token: Token,
}

/// Which version of a group key to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyIndex {
    /// Most recent key (`-1` on the wire)
    Latest,
    /// Specific version, oldest first
    At(usize),
}

impl KeyIndex {
    /// Wire integer for this index.
    #[must_use]
    pub fn to_wire(self) -> i64 {
        match self {
            Self::Latest => -1,
            Self::At(i) => i64::try_from(i).unwrap_or(i64::MAX),
        }
    }

    /// Parse a wire integer. Negative values other than `-1` are rejected.
    #[must_use]
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Self::Latest),
            v => usize::try_from(v).ok().map(Self::At),
        }
    }
}

/// Fetch a group's symmetric key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetKey {
    /// Group whose key is requested
    pub group: String,
    /// Requested version
    pub index: KeyIndex,
    /// Caller token
    pub token: Token,
}

/// Group key returned by `GETKEY`.
#[derive(Clone, PartialEq, Eq)]
pub struct GroupKeyReply {
    /// AES-128 group key
    pub key: [u8; 16],
    /// Resolved version index of `key`
    pub version: u64,
}

impl fmt::Debug for GroupKeyReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupKeyReply").field("version", &self.version).finish_non_exhaustive()
    }
}
