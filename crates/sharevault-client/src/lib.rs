//! Sharevault client library.
//!
//! Async clients for both servers, each owning one secure session over TCP.
//! Requests are strictly sequential: every call waits for its reply before
//! returning.
//!
//! # Components
//!
//! - [`GroupClient`]: log in, manage users, groups and ownership, fetch
//!   group keys
//! - [`FileClient`]: trust-on-first-use key check, list, chunked upload and
//!   download, delete
//! - [`StdinPrompter`]: interactive fingerprint confirmation
//!
//! A typical session gets a token from the group server bound to the file
//! server's endpoint, then presents it on every file server request:
//!
//! ```no_run
//! # use sharevault_client::{ClientError, FileClient, GroupClient, StdinPrompter};
//! # use sharevault_core::{Environment, TrustStore};
//! # use sharevault_crypto::PublicIdentity;
//! # use sharevault_proto::Endpoint;
//! # async fn example<E: Environment>(env: E, group_key: PublicIdentity) -> Result<(), ClientError> {
//! let files = Endpoint::new("127.0.0.1", 4321);
//!
//! let mut group = GroupClient::connect("127.0.0.1:8765", env.clone(), group_key).await?;
//! let token = group.get_token("alice", "secret", files.clone()).await?;
//!
//! let mut trust = TrustStore::open("known_hosts.cbor")?;
//! let mut file = FileClient::connect(files, env, &mut trust, &mut StdinPrompter).await?;
//! for path in file.list_files(&token).await? {
//!     tracing::info!(%path, "readable");
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod file;
mod group;
mod prompt;

pub use error::ClientError;
pub use file::FileClient;
pub use group::GroupClient;
pub use prompt::StdinPrompter;
use sharevault_proto::{Message, ResponseTag};

/// Accept exactly `Status(success)`.
fn expect_status(reply: &Message, success: ResponseTag) -> Result<(), ClientError> {
    match reply {
        Message::Status(tag) if *tag == success => Ok(()),
        Message::Status(tag) => Err(ClientError::Refused(*tag)),
        other => Err(unexpected(other)),
    }
}

fn unexpected(reply: &Message) -> ClientError {
    tracing::warn!(tag = reply.tag(), "unexpected reply");
    ClientError::UnexpectedReply(reply.tag().to_string())
}
