//! Locating the file that backs the running process.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{LocalFileReader, ReadAt};
use crate::error::{Error, Result};

/// Open the running executable for random access.
///
/// Returns the path reported by the platform together with the reader. On
/// Linux the image is opened through `/proc/self/exe`, which keeps working
/// when the file at that path was replaced or removed after launch.
pub fn open_current_exe() -> Result<(PathBuf, LocalFileReader)> {
    let path = std::env::current_exe().map_err(|source| Error::BinaryLocate {
        path: PathBuf::from("<current_exe>"),
        source,
    })?;

    #[cfg(target_os = "linux")]
    if let Ok(reader) = LocalFileReader::new(Path::new("/proc/self/exe")) {
        debug!(exe_path = ?path, size = reader.size(), "opened running binary");
        return Ok((path, reader));
    }

    let reader = open_binary(&path)?;
    Ok((path, reader))
}

/// Open an executable image at an explicit path.
pub fn open_binary(path: &Path) -> Result<LocalFileReader> {
    let reader = LocalFileReader::new(path).map_err(|source| Error::BinaryLocate {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(exe_path = ?path, size = reader.size(), "opened binary");
    Ok(reader)
}
