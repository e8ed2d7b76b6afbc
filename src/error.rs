//! Error taxonomy for the asset view.
//!
//! Initialization failures ([`Error::BinaryLocate`], [`Error::ArchiveNotFound`],
//! [`Error::ArchiveCorrupt`], [`Error::NamespaceConflict`]) are recorded once by
//! the lifecycle manager. Everything else is returned directly from the call
//! that triggered it.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The running executable could not be resolved or opened.
    #[error("cannot open running binary {}: {source}", path.display())]
    BinaryLocate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No end of central directory record in the tail of the binary.
    #[error("no zip archive appended to binary")]
    ArchiveNotFound,

    #[error("corrupt zip archive: {0}")]
    ArchiveCorrupt(String),

    #[error("archive path is both a file and a directory: {0}")]
    NamespaceConflict(String),

    #[error("file does not exist")]
    NotExist,

    #[error("file already closed")]
    Closed,

    #[error("not a directory")]
    NotADirectory,

    #[error("read on directory")]
    ReadOnDirectory,

    #[error("seek on directory")]
    SeekOnDirectory,

    #[error("seek on compressed file")]
    SeekUnsupportedOnCompressedEntry,

    #[error("unsupported compression method {0}")]
    UnsupportedCompression(u16),

    /// Initialization failed and no fallback directory was usable.
    #[error("asset view unavailable: {0}")]
    Unavailable(Arc<Error>),

    #[error("io: {0}")]
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Recover the crate error carried by an `io::Error` returned from
    /// [`Read`](std::io::Read) or [`Seek`](std::io::Seek) on a file handle.
    pub fn from_io(err: &io::Error) -> Option<&Error> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<Error>())
    }

    /// The closest `io::ErrorKind` for this error.
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            Error::BinaryLocate { source, .. } => source.kind(),
            Error::ArchiveNotFound | Error::NotExist => io::ErrorKind::NotFound,
            Error::ArchiveCorrupt(_) | Error::NamespaceConflict(_) => io::ErrorKind::InvalidData,
            Error::NotADirectory => io::ErrorKind::NotADirectory,
            Error::ReadOnDirectory | Error::SeekOnDirectory => io::ErrorKind::IsADirectory,
            Error::SeekUnsupportedOnCompressedEntry | Error::UnsupportedCompression(_) => {
                io::ErrorKind::Unsupported
            }
            Error::Closed => io::ErrorKind::Other,
            Error::Unavailable(inner) => inner.io_kind(),
            Error::Io(err) => err.kind(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.get_ref() {
            Some(inner) if inner.is::<Error>() => {}
            _ => return Error::Io(err),
        }

        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(ours)) => *ours,
            Some(Err(other)) => Error::Io(io::Error::new(kind, other)),
            None => Error::Io(kind.into()),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            err => io::Error::new(err.io_kind(), err),
        }
    }
}
