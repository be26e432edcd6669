//! Long-term identity keys on disk.
//!
//! A server's key pair is generated on first start and kept as PKCS#8 PEM.
//! The public half is written next to it as SPKI PEM so it can be handed to
//! clients and file servers.

use std::{fs, io, path::Path};

use sharevault_core::{EnvRng, Environment};
use sharevault_crypto::{IdentityKeyPair, PublicIdentity};

use crate::error::ServerError;

/// Load the key pair at `path`, or generate one with `bits` and write it
/// (plus its public key at `public_path`).
///
/// # Errors
///
/// - `Io` if the files cannot be read or written
/// - `Identity` if the PEM is invalid or generation fails
pub fn load_or_generate<E: Environment>(
    path: &Path,
    public_path: &Path,
    bits: usize,
    env: &E,
) -> Result<IdentityKeyPair, ServerError> {
    match fs::read_to_string(path) {
        Ok(pem) => {
            let identity = IdentityKeyPair::from_pem(&pem)?;
            tracing::info!(path = %path.display(), "loaded identity key");
            return Ok(identity);
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => return Err(e.into()),
    }

    tracing::info!(bits, path = %path.display(), "generating identity key");
    let identity = IdentityKeyPair::generate(&mut EnvRng(env), bits)?;
    save(&identity, path, public_path)?;
    Ok(identity)
}

/// Write `identity` as PKCS#8 PEM and its public key as SPKI PEM.
///
/// # Errors
///
/// - `Io` on write failure
/// - `Identity` if encoding fails
pub fn save(identity: &IdentityKeyPair, path: &Path, public_path: &Path) -> Result<(), ServerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let private = identity.to_pem()?;
    write_private(path, private.as_bytes())?;
    fs::write(public_path, identity.public().to_pem()?)?;
    Ok(())
}

/// Read a peer's public key from an SPKI PEM file.
///
/// # Errors
///
/// - `Io` if the file cannot be read
/// - `Identity` if it is not an RSA public key
pub fn load_public_key(path: &Path) -> Result<PublicIdentity, ServerError> {
    let pem = fs::read_to_string(path)?;
    Ok(PublicIdentity::from_pem(&pem)?)
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::{io::Write, os::unix::fs::OpenOptionsExt};

    let mut file =
        fs::OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)
}
