//! File server requests and the chunked transfer sub-protocol.

use crate::Token;

/// Size of one transfer chunk.
pub const CHUNK_SIZE: usize = 4096;

/// Start an upload of `path` shared with `group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Remote path
    pub path: String,
    /// Group the file is shared with
    pub group: String,
    /// Caller token
    pub token: Token,
}

/// Request naming a remote path (download start, delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    /// Remote path
    pub path: String,
    /// Caller token
    pub token: Token,
}

/// One block of file content.
///
/// On the wire this is the raw block plus its byte count. Decoding trims the
/// block to the count, so `data` always holds exactly the useful bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Content bytes
    pub data: Vec<u8>,
}
