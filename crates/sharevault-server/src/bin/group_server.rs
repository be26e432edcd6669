//! Sharevault group server binary.
//!
//! # Usage
//!
//! ```bash
//! # First start: create the admin account
//! sharevault-group-server --data-dir group_data --admin-user root --admin-password hunter22
//!
//! # Later starts restore the directory from group_data/group.redb
//! sharevault-group-server --data-dir group_data
//! ```
//!
//! The public key written to `group_data/identity.pub.pem` is what file
//! servers need to check tokens.

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use sharevault_core::{AuthzConfig, DEFAULT_SERVER_NAME};
use sharevault_crypto::DEFAULT_RSA_BITS;
use sharevault_server::{
    AdminCredentials, GroupServer, GroupServerConfig, RedbStorage, SystemEnv,
    config::{DEFAULT_GROUP_PORT, PUBLIC_KEY_FILE},
    identity,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sharevault group server
#[derive(Parser, Debug)]
#[command(name = "sharevault-group-server")]
#[command(about = "Sharevault user, group and token server")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_GROUP_PORT)]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Directory for the database and identity key
    #[arg(short, long, default_value = "group_data")]
    data_dir: PathBuf,

    /// Issuer name placed in every token
    #[arg(long, default_value = DEFAULT_SERVER_NAME)]
    name: String,

    /// Admin username to create when the directory is empty
    #[arg(long, requires = "admin_password")]
    admin_user: Option<String>,

    /// Admin password to create when the directory is empty
    #[arg(long, env = "SHAREVAULT_ADMIN_PASSWORD", requires = "admin_user")]
    admin_password: Option<String>,

    /// Seconds between directory snapshots
    #[arg(long, default_value = "300")]
    autosave_secs: u64,

    /// RSA modulus size for a newly generated identity key
    #[arg(long, default_value_t = DEFAULT_RSA_BITS)]
    rsa_bits: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Sharevault group server starting");

    let admin = match (args.admin_user, args.admin_password) {
        (Some(username), Some(password)) => Some(AdminCredentials { username, password }),
        _ => None,
    };
    let config = GroupServerConfig {
        bind_address: format!("{}:{}", args.host, args.port),
        data_dir: args.data_dir,
        authz: AuthzConfig { server_name: args.name, ..AuthzConfig::default() },
        autosave_interval: Duration::from_secs(args.autosave_secs.max(1)),
        rsa_bits: args.rsa_bits,
        admin,
    };

    std::fs::create_dir_all(&config.data_dir)?;
    let env = SystemEnv::new();
    let identity = identity::load_or_generate(
        &config.identity_path(),
        &config.data_dir.join(PUBLIC_KEY_FILE),
        config.rsa_bits,
        &env,
    )?;
    tracing::info!(fingerprint = %identity.public().fingerprint()?, "group server identity");

    let storage = RedbStorage::open(config.database_path())?;
    let server = GroupServer::bind(&config, env, storage, Arc::new(identity)).await?;

    tracing::info!("Group server listening on {}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}
