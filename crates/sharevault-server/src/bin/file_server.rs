//! Sharevault file server binary.
//!
//! # Usage
//!
//! ```bash
//! sharevault-file-server --data-dir file_data \
//!     --group-key group_data/identity.pub.pem \
//!     --advertise-host 127.0.0.1 --port 4321
//! ```
//!
//! Clients must request tokens for the advertised host and port exactly as
//! given here.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use sharevault_core::{DEFAULT_SERVER_NAME, TokenVerifier};
use sharevault_crypto::DEFAULT_RSA_BITS;
use sharevault_proto::Endpoint;
use sharevault_server::{
    FileServer, FileServerConfig, RedbStorage, SystemEnv,
    config::{DEFAULT_FILE_PORT, PUBLIC_KEY_FILE},
    identity,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sharevault file server
#[derive(Parser, Debug)]
#[command(name = "sharevault-file-server")]
#[command(about = "Sharevault file storage server")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_FILE_PORT)]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Host clients use to reach this server; tokens must name it
    #[arg(long, default_value = "127.0.0.1")]
    advertise_host: String,

    /// Directory for the file index, shared files and identity key
    #[arg(short, long, default_value = "file_data")]
    data_dir: PathBuf,

    /// Group server public key (SPKI PEM)
    #[arg(short, long, default_value = "group_data/identity.pub.pem")]
    group_key: PathBuf,

    /// Group server name expected as token issuer
    #[arg(long, default_value = DEFAULT_SERVER_NAME)]
    issuer: String,

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

    tracing::info!("Sharevault file server starting");

    let config = FileServerConfig {
        bind_address: format!("{}:{}", args.host, args.port),
        advertise: Endpoint::new(args.advertise_host, args.port),
        data_dir: args.data_dir,
        issuer: args.issuer,
        group_server_key: args.group_key,
        rsa_bits: args.rsa_bits,
    };

    let group_key = identity::load_public_key(&config.group_server_key)?;
    let verifier = TokenVerifier::new(config.issuer.clone(), group_key);

    std::fs::create_dir_all(&config.data_dir)?;
    let env = SystemEnv::new();
    let identity = identity::load_or_generate(
        &config.identity_path(),
        &config.data_dir.join(PUBLIC_KEY_FILE),
        config.rsa_bits,
        &env,
    )?;
    tracing::info!(fingerprint = %identity.public().fingerprint()?, "file server identity");

    let storage = RedbStorage::open(config.database_path())?;
    let server = FileServer::bind(&config, env, storage, Arc::new(identity), verifier).await?;

    tracing::info!("File server listening on {}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}
