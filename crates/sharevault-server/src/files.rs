//! File contents on disk.
//!
//! Remote paths are hierarchical strings chosen by clients; on disk every
//! file lives directly in one shared directory under a flat name derived
//! from the path. Hex encoding keeps distinct paths distinct and keeps
//! separators and `..` out of the file system.

use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::{
    fs,
    io::{AsyncReadExt, AsyncWriteExt},
};

/// Longest accepted remote path in bytes. The staging name is twice this
/// plus a 22-byte suffix and must fit a 255-byte file name.
pub const MAX_PATH_LEN: usize = 112;

/// Canonical form of a remote path: components joined by single slashes,
/// with no leading or trailing slash.
///
/// Returns `None` for a path with no components, a `.` or `..` component,
/// or a canonical form longer than [`MAX_PATH_LEN`].
pub fn normalize_path(path: &str) -> Option<String> {
    let mut components = Vec::new();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        if component == "." || component == ".." {
            return None;
        }
        components.push(component);
    }

    let canonical = components.join("/");
    if canonical.is_empty() || canonical.len() > MAX_PATH_LEN {
        return None;
    }
    Some(canonical)
}

/// Flat directory holding every shared file.
#[derive(Debug, Clone)]
pub struct SharedDirectory {
    root: PathBuf,
}

impl SharedDirectory {
    /// Use `root`, creating it if needed.
    ///
    /// # Errors
    ///
    /// I/O failure creating the directory.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// On-disk location of a normalized remote path.
    pub fn file_path(&self, path: &str) -> PathBuf {
        self.root.join(hex::encode(path.as_bytes()))
    }

    /// Start writing an upload to a private staging file.
    ///
    /// # Errors
    ///
    /// I/O failure creating the staging file.
    pub async fn begin_upload(&self, path: &str, nonce: u64) -> io::Result<Upload> {
        let staging = self.root.join(format!("{}.{nonce:016x}.part", hex::encode(path.as_bytes())));
        let file = fs::File::create(&staging).await?;
        Ok(Upload { file, staging, target: self.file_path(path) })
    }

    /// Open a stored file for reading. `Ok(None)` if it is not on disk.
    ///
    /// # Errors
    ///
    /// I/O failure other than the file being absent.
    pub async fn open_file(&self, path: &str) -> io::Result<Option<fs::File>> {
        match fs::File::open(self.file_path(path)).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete a stored file.
    ///
    /// # Errors
    ///
    /// `NotFound` if it is not on disk, or any other I/O failure.
    pub async fn remove(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.file_path(path)).await
    }
}

/// An upload in progress.
///
/// Content goes to a staging file that only replaces the target on
/// [`Upload::commit`].
#[derive(Debug)]
pub struct Upload {
    file: fs::File,
    staging: PathBuf,
    target: PathBuf,
}

impl Upload {
    /// Append one chunk.
    ///
    /// # Errors
    ///
    /// I/O failure.
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data).await
    }

    /// Flush and move the staging file into place.
    ///
    /// # Errors
    ///
    /// I/O failure; the staging file is removed.
    pub async fn commit(mut self) -> io::Result<()> {
        let result = async {
            self.file.flush().await?;
            self.file.sync_all().await?;
            fs::rename(&self.staging, &self.target).await
        }
        .await;
        if result.is_err() {
            discard(&self.staging).await;
        }
        result
    }

    /// Remove the staging file.
    pub async fn abort(self) {
        drop(self.file);
        discard(&self.staging).await;
    }
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        tracing::debug!(path = %path.display(), error = %e, "failed to remove staging file");
    }
}

/// Read up to `buf.len()` bytes, stopping early only at end of file.
///
/// # Errors
///
/// I/O failure.
pub async fn read_chunk(file: &mut fs::File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
