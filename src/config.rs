//! Options for building an asset view.

use std::path::PathBuf;

use crate::error::Error;

/// Where the archive-carrying executable is read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BinarySource {
    /// The image of the running process
    #[default]
    CurrentExe,
    /// Another file, e.g. a packaged copy of the binary
    Path(PathBuf),
}

/// Which initialization failures may be served from the fallback directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Fall back on any failure; the error stays available via `last_error`.
    #[default]
    AnyFailure,
    /// Fall back only when the binary carries no archive or cannot be read.
    /// A corrupt or ambiguous archive leaves the view unavailable.
    NotPackagedOnly,
}

impl FallbackPolicy {
    pub fn allows(&self, err: &Error) -> bool {
        match self {
            FallbackPolicy::AnyFailure => true,
            FallbackPolicy::NotPackagedOnly => {
                matches!(err, Error::ArchiveNotFound | Error::BinaryLocate { .. })
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub binary: BinarySource,
    pub fallback_policy: FallbackPolicy,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the archive from `path` instead of the running executable.
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = BinarySource::Path(path.into());
        self
    }

    pub fn fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.fallback_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_policy_refuses_corruption() {
        let strict = FallbackPolicy::NotPackagedOnly;
        assert!(strict.allows(&Error::ArchiveNotFound));
        assert!(!strict.allows(&Error::ArchiveCorrupt("bad".into())));
        assert!(!strict.allows(&Error::NamespaceConflict("a".into())));
        assert!(FallbackPolicy::default().allows(&Error::ArchiveCorrupt("bad".into())));
    }

    #[test]
    fn builder_sets_binary() {
        let opts = Options::new().binary("/tmp/packaged");
        assert_eq!(opts.binary, BinarySource::Path("/tmp/packaged".into()));
        assert_eq!(opts.fallback_policy, FallbackPolicy::AnyFailure);
    }
}
