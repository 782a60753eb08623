//! Access to the screenshot files the portal leaves behind.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use url::Url;

use crate::{Error, Result};

/// Reads and deletes the files pointed at by the portal.
pub trait FileStore {
    /// Reads the whole file at `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Deletes the file at `path`.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
/// The local file system.
pub struct LocalFiles;

impl FileStore for LocalFiles {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Turns a `file://` uri into a local path, decoding escaped characters.
pub(crate) fn uri_to_path(uri: &str) -> Result<PathBuf> {
    let url = Url::parse(uri).map_err(|e| Error::protocol(format!("invalid uri {uri:?}: {e}")))?;
    if url.scheme() != "file" {
        return Err(Error::protocol(format!("expected a file uri, got {uri:?}")));
    }
    url.to_file_path()
        .map_err(|()| Error::protocol(format!("{uri:?} does not point to a local file")))
}

/// Reads the file at `path` then deletes it, whether the read worked or not.
///
/// A failed deletion is logged and otherwise ignored. An empty file is an
/// error.
pub(crate) fn read_and_remove(files: &impl FileStore, path: &Path) -> Result<Vec<u8>> {
    let bytes = files.read(path);
    if let Err(_e) = files.remove(path) {
        #[cfg(feature = "tracing")]
        tracing::warn!("Failed to remove {}: {_e}", path.display());
    }

    let bytes = bytes?;
    if bytes.is_empty() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} is empty", path.display()),
        )));
    }
    #[cfg(feature = "tracing")]
    tracing::debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}
