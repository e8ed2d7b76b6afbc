//! Lazy, once-only initialization of the asset view.
//!
//! State machine:
//!
//! ```text
//!  Uninitialized ──initialize──▶ Ready(view)      archive, or fallback after a failure
//!        ▲                  └──▶ Failed(error)    no usable fallback
//!        └───────── close ───────────┘
//! ```
//!
//! The first `initialize` runs the whole locate, decode and build sequence
//! under the write lock; concurrent callers wait for it and then see the
//! result. `open` holds the read lock only long enough to clone the view.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, info, warn};

use crate::config::{BinarySource, Options};
use crate::error::{Error, Result};
use crate::file::File;
use crate::io::{self, ReadAt};
use crate::view::{ArchiveView, LocalDir, View};

enum LifecycleState {
    Uninitialized,
    Ready(Arc<View>),
    Failed(Arc<Error>),
}

struct Inner {
    state: LifecycleState,
    /// Error of the most recent initialization, kept across `close`
    last_error: Option<Arc<Error>>,
}

/// Owner of the process' asset view.
///
/// Usually reached through [`crate::init`]; tests and programs that want to
/// read another binary create their own.
pub struct Lifecycle {
    options: Options,
    inner: RwLock<Inner>,
}

impl Lifecycle {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            inner: RwLock::new(Inner {
                state: LifecycleState::Uninitialized,
                last_error: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the view if this has not happened yet and return a handle to it.
    ///
    /// `fallback` is only consulted by the call that performs the
    /// initialization. The returned handle is always usable: if neither the
    /// archive nor a fallback is available, its `open` reports the recorded
    /// error.
    pub fn initialize(self: &Arc<Self>, fallback: Option<&Path>) -> AssetFs {
        if matches!(self.read().state, LifecycleState::Uninitialized) {
            let mut inner = self.write();
            if matches!(inner.state, LifecycleState::Uninitialized) {
                let (state, last_error) = self.load(fallback);
                inner.state = state;
                inner.last_error = last_error;
            }
        }

        AssetFs {
            lifecycle: Arc::clone(self),
        }
    }

    /// Like [`initialize`](Self::initialize) without a fallback, failing
    /// unless the view is backed by an archive.
    pub fn try_initialize(self: &Arc<Self>) -> std::result::Result<AssetFs, Arc<Error>> {
        let fs = self.initialize(None);
        let inner = self.read();
        match &inner.state {
            LifecycleState::Ready(view) if view.is_archive() => Ok(fs),
            LifecycleState::Failed(err) => Err(Arc::clone(err)),
            _ => Err(inner
                .last_error
                .clone()
                .unwrap_or_else(|| Arc::new(Error::Closed))),
        }
    }

    fn load(&self, fallback: Option<&Path>) -> (LifecycleState, Option<Arc<Error>>) {
        debug!(binary = ?self.options.binary, "initializing asset view");

        let err = match self.load_archive() {
            Ok(archive) => {
                info!(
                    files = archive.namespace().file_count(),
                    directories = archive.namespace().directory_count(),
                    "serving assets from appended archive"
                );
                return (LifecycleState::Ready(Arc::new(View::Archive(archive))), None);
            }
            Err(err) => Arc::new(err),
        };

        match fallback {
            Some(root) if self.options.fallback_policy.allows(&err) => {
                warn!(error = %err, fallback = %root.display(), "falling back to local assets");
                let view = View::Local(LocalDir::new(root));
                (LifecycleState::Ready(Arc::new(view)), Some(err))
            }
            _ => {
                error!(error = %err, "asset view unavailable");
                (LifecycleState::Failed(Arc::clone(&err)), Some(err))
            }
        }
    }

    fn load_archive(&self) -> Result<ArchiveView> {
        let source: Arc<dyn ReadAt> = match &self.options.binary {
            BinarySource::CurrentExe => {
                let (path, reader) = io::open_current_exe()?;
                debug!(exe_path = ?path, "reading archive from running binary");
                Arc::new(reader)
            }
            BinarySource::Path(path) => Arc::new(io::open_binary(path)?),
        };
        ArchiveView::load(source)
    }

    /// Error recorded by the most recent initialization; `None` if it was
    /// served from the archive.
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.read().last_error.clone()
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.read().state, LifecycleState::Uninitialized)
    }

    /// Whether the current view is backed by the archive.
    pub fn is_archive(&self) -> bool {
        matches!(&self.read().state, LifecycleState::Ready(view) if view.is_archive())
    }

    /// Drop the view and return to the uninitialized state. Idempotent.
    ///
    /// Handles opened before keep their own reference to the archive.
    pub fn close(&self) {
        let mut inner = self.write();
        if !matches!(inner.state, LifecycleState::Uninitialized) {
            debug!("closing asset view");
            inner.state = LifecycleState::Uninitialized;
        }
    }

    /// Open an absolute path in the current view.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after [`close`](Self::close) until the next
    /// initialization, [`Error::Unavailable`] if initialization failed,
    /// otherwise whatever the view reports.
    pub fn open(&self, path: &str) -> Result<File> {
        let view = match &self.read().state {
            LifecycleState::Uninitialized => return Err(Error::Closed),
            LifecycleState::Failed(err) => return Err(Error::Unavailable(Arc::clone(err))),
            LifecycleState::Ready(view) => Arc::clone(view),
        };
        view.open(path)
    }
}

/// Cheap, cloneable handle to an initialized [`Lifecycle`].
#[derive(Clone)]
pub struct AssetFs {
    lifecycle: Arc<Lifecycle>,
}

impl AssetFs {
    /// Open an absolute path such as `/index.html`.
    pub fn open(&self, path: &str) -> Result<File> {
        self.lifecycle.open(path)
    }

    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.lifecycle.last_error()
    }

    pub fn is_archive(&self) -> bool {
        self.lifecycle.is_archive()
    }

    /// Close the underlying view for every handle sharing it.
    pub fn close(&self) {
        self.lifecycle.close()
    }
}
