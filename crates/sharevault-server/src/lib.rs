//! Sharevault production servers.
//!
//! Tokio runtimes around [`sharevault_core`]: the group server owns the user
//! and group directory and issues tokens, the file server stores files and
//! checks those tokens offline against the group server's public key.
//!
//! # Components
//!
//! - [`GroupServer`]: accept loop, per-connection sessions, periodic
//!   directory snapshots
//! - [`dispatch`]: maps one group server request to its reply
//! - [`FileServer`]: key offer, file index, chunked transfers
//! - [`Storage`]: directory and file index persistence ([`RedbStorage`] on
//!   disk, [`MemoryStorage`] for tests)
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
mod error;
pub mod file_server;
pub mod files;
pub mod group_server;
pub mod identity;
pub mod storage;
mod system_env;

pub use config::{AdminCredentials, FileServerConfig, GroupServerConfig};
pub use error::ServerError;
pub use file_server::FileServer;
pub use group_server::{GroupServer, dispatch};
pub use storage::{FileRecord, MemoryStorage, RedbStorage, Storage, StorageError};
pub use system_env::SystemEnv;
