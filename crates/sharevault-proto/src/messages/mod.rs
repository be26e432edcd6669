//! Typed protocol messages.
//!
//! The wire form is a string-tagged [`Envelope`] with positional values. This
//! module is the only place that knows the position and type of each value:
//! everything above it works with [`Message`] variants and named fields.
//!
//! # Invariants
//!
//! - Every tag maps to exactly one variant, except `DOWNLOADF` and `OK`,
//!   which are distinguished by arity.
//! - [`Message::from_envelope`] checks exact arity and value types, so a
//!   decoded message is always fully populated.
//! - The trailing sequence number is not part of a message; it is stripped by
//!   the channel before decoding.

pub mod file;
pub mod group;
pub mod handshake;

use crate::{
    Endpoint, ResponseTag, Token,
    envelope::{Envelope, Value},
    errors::{ProtocolError, Result},
};

pub use file::{CHUNK_SIZE, Chunk, FileRequest, Upload};
pub use group::{
    CreateUser, DeleteUser, GetKey, GetToken, GroupKeyReply, GroupRequest, KeyIndex,
    MembershipRequest,
};
pub use handshake::{Connect, KeyOffer, SYMMETRIC_KEY_LEN};

/// Every message exchanged between clients and servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // Handshake
    /// File server public key offer (`KEY`)
    Key(KeyOffer),
    /// Session key transport (`CONNECT`)
    Connect(Connect),
    /// Handshake reply carrying `challenge + 1` (`SUCCESS_CONNECT`)
    ConnectAccepted {
        /// Incremented challenge
        challenge_response: i64,
    },

    // Group server requests
    /// Issue a token (`GET`)
    GetToken(GetToken),
    /// Create an account (`CUSER`)
    CreateUser(CreateUser),
    /// Delete an account (`DUSER`)
    DeleteUser(DeleteUser),
    /// Create a group (`CGROUP`)
    CreateGroup(GroupRequest),
    /// Delete a group (`DGROUP`)
    DeleteGroup(GroupRequest),
    /// List members of a group (`LMEMBERS`)
    ListMembers(GroupRequest),
    /// Add a member (`AUSERTOGROUP`)
    AddUserToGroup(MembershipRequest),
    /// Remove a member (`RUSERFROMGROUP`)
    RemoveUserFromGroup(MembershipRequest),
    /// Add an owner (`AOWNERTOGROUP`)
    AddOwner(MembershipRequest),
    /// Remove an owner (`ROWNERFROMGROUP`)
    RemoveOwner(MembershipRequest),
    /// Fetch a group key (`GETKEY`)
    GetKey(GetKey),

    // File server requests
    /// List readable files (`LFILES`)
    ListFiles {
        /// Caller token
        token: Token,
    },
    /// Start an upload (`UPLOADF`)
    Upload(Upload),
    /// Start a download (`DOWNLOADF` with path and token)
    Download(FileRequest),
    /// Acknowledge a download chunk (`DOWNLOADF` with no payload)
    NextChunk,
    /// Delete a file (`DELETEF`)
    DeleteFile(FileRequest),

    // Transfer control
    /// File content block (`CHUNK`)
    Chunk(Chunk),
    /// Ready for the next chunk (`READY`)
    Ready,
    /// Transfer finished (`EOF`)
    Eof,
    /// Plain acknowledgement (`OK`)
    Ok,
    /// Reply to `LFILES` (`OK` with a path list)
    FileList(Vec<String>),

    /// Orderly end of session (`DISCONNECT`)
    Disconnect,

    // Replies with payloads
    /// Issued token (`SUCCESS_GET`)
    TokenIssued(Token),
    /// Group member names (`SUCCESS_LIST_MEMBERS`)
    Members(Vec<String>),
    /// Group key (`SUCCESS_GET_KEY`)
    GroupKey(GroupKeyReply),

    /// Any payload-less response tag
    Status(ResponseTag),
}

impl Message {
    /// Wire tag for this message.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Key(_) => "KEY",
            Self::Connect(_) => "CONNECT",
            Self::ConnectAccepted { .. } => ResponseTag::SuccessConnect.as_str(),
            Self::GetToken(_) => "GET",
            Self::CreateUser(_) => "CUSER",
            Self::DeleteUser(_) => "DUSER",
            Self::CreateGroup(_) => "CGROUP",
            Self::DeleteGroup(_) => "DGROUP",
            Self::ListMembers(_) => "LMEMBERS",
            Self::AddUserToGroup(_) => "AUSERTOGROUP",
            Self::RemoveUserFromGroup(_) => "RUSERFROMGROUP",
            Self::AddOwner(_) => "AOWNERTOGROUP",
            Self::RemoveOwner(_) => "ROWNERFROMGROUP",
            Self::GetKey(_) => "GETKEY",
            Self::ListFiles { .. } => "LFILES",
            Self::Upload(_) => "UPLOADF",
            Self::Download(_) | Self::NextChunk => "DOWNLOADF",
            Self::DeleteFile(_) => "DELETEF",
            Self::Chunk(_) => "CHUNK",
            Self::Ready => "READY",
            Self::Eof => "EOF",
            Self::Ok | Self::FileList(_) => "OK",
            Self::Disconnect => "DISCONNECT",
            Self::TokenIssued(_) => ResponseTag::SuccessGet.as_str(),
            Self::Members(_) => ResponseTag::SuccessListMembers.as_str(),
            Self::GroupKey(_) => ResponseTag::SuccessGetKey.as_str(),
            Self::Status(tag) => tag.as_str(),
        }
    }

    /// Flatten into a positional envelope.
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        let tag = self.tag();
        let payload = match self {
            Self::Key(offer) => vec![Value::Bytes(offer.public_key)],
            Self::Connect(c) => vec![
                Value::Int(c.challenge),
                Value::Bytes(c.session_key.to_vec()),
                Value::Bytes(c.signing_key.to_vec()),
            ],
            Self::ConnectAccepted { challenge_response } => vec![Value::Int(challenge_response)],
            Self::GetToken(req) => vec![
                Value::Str(req.username),
                Value::Str(req.password),
                Value::Str(req.endpoint.ip),
                Value::Int(i64::from(req.endpoint.port)),
            ],
            Self::CreateUser(req) => {
                vec![Value::Str(req.username), Value::Str(req.password), Value::Token(req.token)]
            },
            Self::DeleteUser(req) => vec![Value::Str(req.username), Value::Token(req.token)],
            Self::CreateGroup(req) | Self::DeleteGroup(req) | Self::ListMembers(req) => {
                vec![Value::Str(req.group), Value::Token(req.token)]
            },
            Self::AddUserToGroup(req)
            | Self::RemoveUserFromGroup(req)
            | Self::AddOwner(req)
            | Self::RemoveOwner(req) => {
                vec![Value::Str(req.username), Value::Str(req.group), Value::Token(req.token)]
            },
            Self::GetKey(req) => vec![
                Value::Str(req.group),
                Value::Int(req.index.to_wire()),
                Value::Token(req.token),
            ],
            Self::ListFiles { token } => vec![Value::Token(token)],
            Self::Upload(req) => {
                vec![Value::Str(req.path), Value::Str(req.group), Value::Token(req.token)]
            },
            Self::Download(req) | Self::DeleteFile(req) => {
                vec![Value::Str(req.path), Value::Token(req.token)]
            },
            Self::Chunk(chunk) => {
                let len = i64::try_from(chunk.data.len()).unwrap_or(i64::MAX);
                vec![Value::Bytes(chunk.data), Value::Int(len)]
            },
            Self::FileList(paths) => vec![Value::List(paths)],
            Self::TokenIssued(token) => vec![Value::Token(token)],
            Self::Members(names) => vec![Value::List(names)],
            Self::GroupKey(reply) => vec![
                Value::Bytes(reply.key.to_vec()),
                Value::Int(i64::try_from(reply.version).unwrap_or(i64::MAX)),
            ],
            Self::NextChunk
            | Self::Ready
            | Self::Eof
            | Self::Ok
            | Self::Disconnect
            | Self::Status(_) => Vec::new(),
        };
        Envelope::with_payload(tag, payload)
    }

    /// Decode a positional envelope, checking arity and value types.
    ///
    /// # Errors
    ///
    /// - `UnknownTag` if the tag is outside the protocol vocabulary
    /// - `InvalidArity` if the payload length does not match the tag
    /// - `InvalidValue` if a value has the wrong type or range
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        let (tag, payload) = envelope.into_parts();
        let mut f = Fields::new(&tag, payload);

        let message = match tag.as_str() {
            "KEY" => {
                f.arity(1)?;
                Self::Key(KeyOffer { public_key: f.bytes()? })
            },
            "CONNECT" => {
                f.arity(3)?;
                Self::Connect(Connect {
                    challenge: f.int()?,
                    session_key: f.key()?,
                    signing_key: f.key()?,
                })
            },
            "SUCCESS_CONNECT" => {
                f.arity(1)?;
                Self::ConnectAccepted { challenge_response: f.int()? }
            },
            "GET" => {
                f.arity(4)?;
                let username = f.string()?;
                let password = f.string()?;
                let ip = f.string()?;
                let port = f.port()?;
                Self::GetToken(GetToken { username, password, endpoint: Endpoint::new(ip, port) })
            },
            "CUSER" => {
                f.arity(3)?;
                Self::CreateUser(CreateUser {
                    username: f.string()?,
                    password: f.string()?,
                    token: f.token()?,
                })
            },
            "DUSER" => {
                f.arity(2)?;
                Self::DeleteUser(DeleteUser { username: f.string()?, token: f.token()? })
            },
            "CGROUP" => Self::CreateGroup(f.group_request()?),
            "DGROUP" => Self::DeleteGroup(f.group_request()?),
            "LMEMBERS" => Self::ListMembers(f.group_request()?),
            "AUSERTOGROUP" => Self::AddUserToGroup(f.membership_request()?),
            "RUSERFROMGROUP" => Self::RemoveUserFromGroup(f.membership_request()?),
            "AOWNERTOGROUP" => Self::AddOwner(f.membership_request()?),
            "ROWNERFROMGROUP" => Self::RemoveOwner(f.membership_request()?),
            "GETKEY" => {
                f.arity(3)?;
                Self::GetKey(GetKey { group: f.string()?, index: f.key_index()?, token: f.token()? })
            },
            "LFILES" => {
                f.arity(1)?;
                Self::ListFiles { token: f.token()? }
            },
            "UPLOADF" => {
                f.arity(3)?;
                Self::Upload(Upload { path: f.string()?, group: f.string()?, token: f.token()? })
            },
            "DOWNLOADF" if f.len() == 0 => Self::NextChunk,
            "DOWNLOADF" => {
                f.arity(2)?;
                Self::Download(FileRequest { path: f.string()?, token: f.token()? })
            },
            "DELETEF" => {
                f.arity(2)?;
                Self::DeleteFile(FileRequest { path: f.string()?, token: f.token()? })
            },
            "CHUNK" => {
                f.arity(2)?;
                Self::Chunk(f.chunk()?)
            },
            "READY" => f.empty(Self::Ready)?,
            "EOF" => f.empty(Self::Eof)?,
            "OK" if f.len() == 0 => Self::Ok,
            "OK" => {
                f.arity(1)?;
                Self::FileList(f.list()?)
            },
            "DISCONNECT" => f.empty(Self::Disconnect)?,
            "SUCCESS_GET" => {
                f.arity(1)?;
                Self::TokenIssued(f.token()?)
            },
            "SUCCESS_LIST_MEMBERS" => {
                f.arity(1)?;
                Self::Members(f.list()?)
            },
            "SUCCESS_GET_KEY" => {
                f.arity(2)?;
                let key = f.key()?;
                let version = f.unsigned()?;
                Self::GroupKey(GroupKeyReply { key, version })
            },
            other => match ResponseTag::from_tag(other) {
                Some(status) => f.empty(Self::Status(status))?,
                None => return Err(ProtocolError::UnknownTag(other.to_string())),
            },
        };

        Ok(message)
    }

    /// Status tag if this is a payload-less response.
    #[must_use]
    pub fn status(&self) -> Option<ResponseTag> {
        match self {
            Self::Status(tag) => Some(*tag),
            _ => None,
        }
    }
}

impl From<ResponseTag> for Message {
    fn from(tag: ResponseTag) -> Self {
        Self::Status(tag)
    }
}

/// Positional reader over an envelope payload.
struct Fields<'a> {
    tag: &'a str,
    values: std::vec::IntoIter<Value>,
    index: usize,
}

impl<'a> Fields<'a> {
    fn new(tag: &'a str, payload: Vec<Value>) -> Self {
        Self { tag, values: payload.into_iter(), index: 0 }
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn arity(&self, expected: usize) -> Result<()> {
        let actual = self.values.len();
        if actual == expected {
            Ok(())
        } else {
            Err(ProtocolError::InvalidArity { tag: self.tag.to_string(), expected, actual })
        }
    }

    fn empty(&self, message: Message) -> Result<Message> {
        self.arity(0)?;
        Ok(message)
    }

    fn invalid(&self, expected: &'static str) -> ProtocolError {
        ProtocolError::InvalidValue { tag: self.tag.to_string(), index: self.index, expected }
    }

    fn next(&mut self, expected: &'static str) -> Result<Value> {
        let value = self.values.next().ok_or_else(|| self.invalid(expected))?;
        self.index += 1;
        Ok(value)
    }

    fn int(&mut self) -> Result<i64> {
        match self.next("int")? {
            Value::Int(n) => Ok(n),
            _ => Err(self.previous("int")),
        }
    }

    fn unsigned(&mut self) -> Result<u64> {
        let n = self.int()?;
        u64::try_from(n).map_err(|_| self.previous("non-negative int"))
    }

    fn port(&mut self) -> Result<u16> {
        let n = self.int()?;
        u16::try_from(n).map_err(|_| self.previous("port number"))
    }

    fn key_index(&mut self) -> Result<KeyIndex> {
        let n = self.int()?;
        KeyIndex::from_wire(n).ok_or_else(|| self.previous("key index >= -1"))
    }

    fn string(&mut self) -> Result<String> {
        match self.next("string")? {
            Value::Str(s) => Ok(s),
            _ => Err(self.previous("string")),
        }
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        match self.next("bytes")? {
            Value::Bytes(b) => Ok(b),
            _ => Err(self.previous("bytes")),
        }
    }

    fn key(&mut self) -> Result<[u8; SYMMETRIC_KEY_LEN]> {
        let bytes = self.bytes()?;
        <[u8; SYMMETRIC_KEY_LEN]>::try_from(bytes.as_slice())
            .map_err(|_| self.previous("16-byte key"))
    }

    fn list(&mut self) -> Result<Vec<String>> {
        match self.next("list")? {
            Value::List(l) => Ok(l),
            _ => Err(self.previous("list")),
        }
    }

    fn token(&mut self) -> Result<Token> {
        match self.next("token")? {
            Value::Token(t) => Ok(t),
            _ => Err(self.previous("token")),
        }
    }

    fn chunk(&mut self) -> Result<Chunk> {
        let mut data = self.bytes()?;
        let len = self.unsigned()?;
        let len = usize::try_from(len).map_err(|_| self.previous("chunk length"))?;
        if len > data.len() {
            return Err(self.previous("chunk length within data"));
        }
        data.truncate(len);
        Ok(Chunk { data })
    }

    fn group_request(&mut self) -> Result<GroupRequest> {
        self.arity(2)?;
        Ok(GroupRequest { group: self.string()?, token: self.token()? })
    }

    fn membership_request(&mut self) -> Result<MembershipRequest> {
        self.arity(3)?;
        Ok(MembershipRequest { username: self.string()?, group: self.string()?, token: self.token()? })
    }

    /// Error pointing at the value just consumed.
    fn previous(&self, expected: &'static str) -> ProtocolError {
        ProtocolError::InvalidValue {
            tag: self.tag.to_string(),
            index: self.index.saturating_sub(1),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenClaims;

    fn token() -> Token {
        Token::new(
            TokenClaims {
                issuer: "ALPHA".to_string(),
                subject: "alice".to_string(),
                groups: vec!["eng".to_string()],
                endpoint: Endpoint::new("127.0.0.1", 4321),
            },
            vec![7; 32],
        )
    }

    fn round_trip(message: Message) {
        let envelope = message.clone().into_envelope();
        assert_eq!(envelope.tag(), message.tag());
        assert_eq!(Message::from_envelope(envelope).unwrap(), message);
    }

    #[test]
    fn request_variants_round_trip() {
        round_trip(Message::Connect(Connect {
            challenge: 42,
            session_key: [1; 16],
            signing_key: [2; 16],
        }));
        round_trip(Message::GetToken(GetToken {
            username: "alice".into(),
            password: "pw".into(),
            endpoint: Endpoint::new("10.0.0.1", 4321),
        }));
        round_trip(Message::AddOwner(MembershipRequest {
            username: "bob".into(),
            group: "eng".into(),
            token: token(),
        }));
        round_trip(Message::GetKey(GetKey {
            group: "eng".into(),
            index: KeyIndex::Latest,
            token: token(),
        }));
        round_trip(Message::Download(FileRequest { path: "a.txt".into(), token: token() }));
        round_trip(Message::NextChunk);
        round_trip(Message::FileList(vec!["a.txt".into()]));
        round_trip(Message::Ok);
        round_trip(Message::Status(ResponseTag::FailNoOwner));
    }

    #[test]
    fn arity_is_exact() {
        let mut env = Message::DeleteGroup(GroupRequest { group: "eng".into(), token: token() })
            .into_envelope();
        env.push(Value::Int(9));
        assert_eq!(
            Message::from_envelope(env),
            Err(ProtocolError::InvalidArity { tag: "DGROUP".into(), expected: 2, actual: 3 })
        );
    }

    #[test]
    fn wrong_type_reports_position() {
        let env = Envelope::with_payload(
            "CGROUP",
            vec![Value::Str("eng".into()), Value::Str("not a token".into())],
        );
        assert_eq!(
            Message::from_envelope(env),
            Err(ProtocolError::InvalidValue { tag: "CGROUP".into(), index: 1, expected: "token" })
        );
    }

    #[test]
    fn connect_requires_sixteen_byte_keys() {
        let env = Envelope::with_payload(
            "CONNECT",
            vec![Value::Int(1), Value::Bytes(vec![0; 15]), Value::Bytes(vec![0; 16])],
        );
        assert!(matches!(
            Message::from_envelope(env),
            Err(ProtocolError::InvalidValue { index: 1, .. })
        ));
    }

    #[test]
    fn chunk_is_trimmed_to_count() {
        let env = Envelope::with_payload("CHUNK", vec![Value::Bytes(vec![9; 4096]), Value::Int(10)]);
        let Message::Chunk(chunk) = Message::from_envelope(env).unwrap() else {
            panic!("expected chunk");
        };
        assert_eq!(chunk.data, vec![9; 10]);

        let overlong = Envelope::with_payload("CHUNK", vec![Value::Bytes(vec![1; 4]), Value::Int(5)]);
        assert!(Message::from_envelope(overlong).is_err());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let env = Envelope::new("FROBNICATE");
        assert_eq!(
            Message::from_envelope(env),
            Err(ProtocolError::UnknownTag("FROBNICATE".into()))
        );
    }

    #[test]
    fn key_index_wire_form() {
        assert_eq!(KeyIndex::from_wire(-1), Some(KeyIndex::Latest));
        assert_eq!(KeyIndex::from_wire(3), Some(KeyIndex::At(3)));
        assert_eq!(KeyIndex::from_wire(-2), None);
        assert_eq!(KeyIndex::At(3).to_wire(), 3);
    }

    #[test]
    fn debug_hides_secrets() {
        let rendered = format!(
            "{:?}",
            Message::Connect(Connect { challenge: 5, session_key: [0xAB; 16], signing_key: [0xCD; 16] })
        );
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("171"));
    }
}
