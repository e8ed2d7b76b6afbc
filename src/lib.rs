//! # httpasset
//!
//! Serve static assets from a zip archive appended to the running executable.
//!
//! Build the program, then append a zip file to it (`cat app assets.zip >
//! app.packaged`). At runtime the archive is found by scanning the tail of
//! the executable and exposed as a read-only file tree. When nothing was
//! appended yet, for instance during development, a local directory is served
//! instead.
//!
//! ## Features
//!
//! - Directories inferred from file paths; explicit directory entries optional
//! - STORED entries are seekable, DEFLATE entries stream sequentially
//! - ZIP64 archives, and archives with offsets relative to either the archive
//!   or the whole file
//! - Lazy once-only initialization with an idempotent close
//!
//! ## Example
//!
//! ```no_run
//! use std::io::Read;
//!
//! let fs = httpasset::init("assets");
//! if let Some(err) = fs.last_error() {
//!     eprintln!("serving ./assets: {err}");
//! }
//!
//! let mut index = String::new();
//! fs.open("/index.html")?.read_to_string(&mut index)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod file;
pub mod io;
pub mod lifecycle;
pub mod namespace;
pub mod serve;
pub mod view;
pub mod zip;

use std::path::Path;
use std::sync::{Arc, LazyLock};

pub use cli::Cli;
pub use config::{BinarySource, FallbackPolicy, Options};
pub use error::{Error, Result};
pub use file::{File, FileInfo};
pub use io::{LocalFileReader, ReadAt};
pub use lifecycle::{AssetFs, Lifecycle};
// `crate::` keeps this apart from the `zip` dev-dependency in test builds.
pub use crate::zip::{ZipFileEntry, ZipParser};

static GLOBAL: LazyLock<Arc<Lifecycle>> =
    LazyLock::new(|| Arc::new(Lifecycle::new(Options::default())));

/// Initialize the process-wide view, falling back to `fallback` when the
/// running binary carries no usable archive.
///
/// Only the first call (or the first after [`close`]) initializes; later calls
/// return a handle to the existing view.
pub fn init(fallback: impl AsRef<Path>) -> AssetFs {
    GLOBAL.initialize(Some(fallback.as_ref()))
}

/// The process-wide view without a fallback directory.
pub fn fs() -> AssetFs {
    GLOBAL.initialize(None)
}

/// Error recorded by the last initialization of the process-wide view.
pub fn last_error() -> Option<Arc<Error>> {
    GLOBAL.last_error()
}

/// Close the process-wide view. Idempotent.
pub fn close() {
    GLOBAL.close()
}
