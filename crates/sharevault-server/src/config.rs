//! Server configuration.
//!
//! Plain structs with defaults; the binaries fill them from command-line
//! arguments.

use std::{fmt, path::PathBuf, time::Duration};

use sharevault_core::AuthzConfig;
use sharevault_crypto::DEFAULT_RSA_BITS;
use sharevault_proto::Endpoint;

/// Default group server port.
pub const DEFAULT_GROUP_PORT: u16 = 8765;

/// Default file server port.
pub const DEFAULT_FILE_PORT: u16 = 4321;

/// Interval between directory snapshots.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(300);

/// Identity private key file name inside a data directory.
pub const IDENTITY_FILE: &str = "identity.pem";

/// Identity public key file name inside a data directory.
pub const PUBLIC_KEY_FILE: &str = "identity.pub.pem";

/// Credentials for the first administrator.
#[derive(Clone)]
pub struct AdminCredentials {
    /// Admin username
    pub username: String,
    /// Admin password
    pub password: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Group server configuration.
#[derive(Debug, Clone)]
pub struct GroupServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:8765")
    pub bind_address: String,
    /// Directory holding the database and identity key
    pub data_dir: PathBuf,
    /// Issuer name and password throttle
    pub authz: AuthzConfig,
    /// Interval between directory snapshots
    pub autosave_interval: Duration,
    /// Modulus size for a newly generated identity key
    pub rsa_bits: usize,
    /// Admin to create when the directory is empty
    pub admin: Option<AdminCredentials>,
}

impl Default for GroupServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_GROUP_PORT}"),
            data_dir: PathBuf::from("group_data"),
            authz: AuthzConfig::default(),
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            rsa_bits: DEFAULT_RSA_BITS,
            admin: None,
        }
    }
}

impl GroupServerConfig {
    /// Path of the redb database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("group.redb")
    }

    /// Path of the identity private key.
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(IDENTITY_FILE)
    }
}

/// File server configuration.
#[derive(Debug, Clone)]
pub struct FileServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:4321")
    pub bind_address: String,
    /// Endpoint clients request tokens for; tokens bound elsewhere are refused
    pub advertise: Endpoint,
    /// Directory holding the file index, shared files and identity key
    pub data_dir: PathBuf,
    /// Token issuer name (the group server's name)
    pub issuer: String,
    /// Group server public key (SPKI PEM)
    pub group_server_key: PathBuf,
    /// Modulus size for a newly generated identity key
    pub rsa_bits: usize,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_FILE_PORT}"),
            advertise: Endpoint::new("127.0.0.1", DEFAULT_FILE_PORT),
            data_dir: PathBuf::from("file_data"),
            issuer: sharevault_core::DEFAULT_SERVER_NAME.to_string(),
            group_server_key: PathBuf::from("group_data").join(PUBLIC_KEY_FILE),
            rsa_bits: DEFAULT_RSA_BITS,
        }
    }
}

impl FileServerConfig {
    /// Path of the file index database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("files.redb")
    }

    /// Directory holding file contents.
    pub fn shared_dir(&self) -> PathBuf {
        self.data_dir.join("shared_files")
    }

    /// Path of the identity private key.
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(IDENTITY_FILE)
    }
}
