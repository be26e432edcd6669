//! Trust-on-first-use pinning of file server keys.
//!
//! The first time a client meets a file server, the operator is shown the
//! key fingerprint and must confirm it. Confirmed keys are pinned and never
//! prompted for again; later connections seal their session keys to the
//! pinned key, so a server presenting a different key cannot complete the
//! handshake.
//!
//! Pins are kept in memory and, when the store has a path, in a CBOR
//! known-hosts file that survives restarts.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sharevault_crypto::PublicIdentity;

use crate::error::TrustError;

/// Asks a human to confirm an unknown host key.
pub trait Prompter {
    /// Show `fingerprint` for `identity` and return the operator's answer.
    ///
    /// # Errors
    ///
    /// I/O failure while prompting.
    fn ask(&mut self, identity: &str, fingerprint: &str) -> io::Result<String>;
}

impl<F> Prompter for F
where
    F: FnMut(&str, &str) -> io::Result<String>,
{
    fn ask(&mut self, identity: &str, fingerprint: &str) -> io::Result<String> {
        self(identity, fingerprint)
    }
}

/// True for an affirmative answer (`yes` / `y`, any case).
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("yes") || answer.eq_ignore_ascii_case("y")
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KnownHosts {
    /// `ip:port` -> SPKI DER, hex encoded
    hosts: BTreeMap<String, String>,
}

/// Pinned host keys.
#[derive(Debug, Default)]
pub struct TrustStore {
    pins: BTreeMap<String, PublicIdentity>,
    path: Option<PathBuf>,
}

impl TrustStore {
    /// Store that forgets its pins when the process exits.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store backed by a known-hosts file. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// - `Io` if the file exists but cannot be read
    /// - `Corrupt` if it cannot be decoded
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TrustError> {
        let path = path.into();
        let pins = match fs::read(&path) {
            Ok(bytes) => decode_known_hosts(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { pins, path: Some(path) })
    }

    /// Pinned key for `identity`, if any.
    pub fn pinned(&self, identity: &str) -> Option<&PublicIdentity> {
        self.pins.get(identity)
    }

    /// Decide whether to trust `offered` for `identity` and return the key
    /// the handshake must be sealed to.
    ///
    /// A pinned identity returns its pinned key without prompting, even if
    /// `offered` differs (the mismatch is logged; the handshake will then
    /// fail against an impostor). An unknown identity is shown to
    /// `prompter` and pinned on an affirmative answer.
    ///
    /// # Errors
    ///
    /// - `Rejected` if the operator declines
    /// - `InvalidKey` if the offered key cannot be fingerprinted
    /// - `Io` if prompting or persisting fails
    pub fn verify<P: Prompter + ?Sized>(
        &mut self,
        identity: &str,
        offered: &PublicIdentity,
        prompter: &mut P,
    ) -> Result<PublicIdentity, TrustError> {
        if let Some(pinned) = self.pins.get(identity) {
            if pinned != offered {
                tracing::warn!(
                    host = identity,
                    pinned = %pinned.fingerprint().unwrap_or_default(),
                    offered = %offered.fingerprint().unwrap_or_default(),
                    "host key differs from pinned key; using pinned key"
                );
            }
            return Ok(pinned.clone());
        }

        let fingerprint = offered.fingerprint()?;
        let answer = prompter.ask(identity, &fingerprint)?;
        if !is_affirmative(&answer) {
            return Err(TrustError::Rejected { identity: identity.to_string() });
        }

        self.pins.insert(identity.to_string(), offered.clone());
        self.persist()?;
        tracing::info!(host = identity, %fingerprint, "pinned host key");
        Ok(offered.clone())
    }

    fn persist(&self) -> Result<(), TrustError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut known = KnownHosts::default();
        for (identity, key) in &self.pins {
            known.hosts.insert(identity.clone(), hex::encode(key.to_der()?));
        }

        let mut bytes = Vec::new();
        ciborium::into_writer(&known, &mut bytes)
            .map_err(|e| TrustError::Corrupt(e.to_string()))?;
        write_atomically(path, &bytes)?;
        Ok(())
    }
}

fn decode_known_hosts(bytes: &[u8]) -> Result<BTreeMap<String, PublicIdentity>, TrustError> {
    let known: KnownHosts =
        ciborium::from_reader(bytes).map_err(|e| TrustError::Corrupt(e.to_string()))?;

    known
        .hosts
        .into_iter()
        .map(|(identity, der_hex)| {
            let der = hex::decode(&der_hex).map_err(|e| TrustError::Corrupt(e.to_string()))?;
            Ok((identity, PublicIdentity::from_der(&der)?))
        })
        .collect()
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
