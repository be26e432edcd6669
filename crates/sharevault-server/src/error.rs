//! Server error types.

use sharevault_core::{ChannelError, Denial};
use sharevault_crypto::CryptoError;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that stop a server or end one connection.
///
/// Authorization denials are not errors here; they are answered with a
/// response tag and the connection continues.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket or file system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Handshake, transport or protocol failure on a connection
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Identity key could not be loaded, generated or written
    #[error("identity key error: {0}")]
    Identity(#[from] CryptoError),

    /// First-run administrator could not be created
    #[error("admin bootstrap failed: {0}")]
    Bootstrap(Denial),
}
