//! The backing objects that serve `open` calls.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::file::File;
use crate::io::ReadAt;
use crate::namespace::{Namespace, Node, base_name};
use crate::zip::ZipParser;

/// Files from the archive appended to a binary.
pub struct ArchiveView {
    parser: ZipParser<dyn ReadAt>,
    namespace: Namespace,
}

impl ArchiveView {
    /// Decode the archive at the end of `source` and build its namespace.
    pub fn load(source: Arc<dyn ReadAt>) -> Result<Self> {
        let parser = ZipParser::new(source);
        let entries = parser.list_files()?;
        let namespace = Namespace::build(entries)?;
        Ok(Self { parser, namespace })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn open(&self, path: &str) -> Result<File> {
        match self.namespace.lookup(path)? {
            Node::Directory => Ok(File::directory(base_name(path))),
            Node::File(entry) => {
                let data_offset = self.parser.get_data_offset(entry)?;
                trace!(path, data_offset, method = ?entry.compression_method, "open archive entry");
                File::archive_entry(
                    base_name(path),
                    Arc::clone(self.parser.reader()),
                    Arc::clone(entry),
                    data_offset,
                )
            }
        }
    }
}

/// Files from a directory on disk.
pub struct LocalDir {
    root: PathBuf,
}

impl LocalDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn open(&self, path: &str) -> Result<File> {
        let relative = path.strip_prefix('/').ok_or(Error::NotExist)?;
        let relative = Path::new(relative);
        // Only plain names: no way out of the root
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::NotExist);
        }
        File::local(base_name(path), self.root.join(relative))
    }
}

/// The active backing view.
pub enum View {
    Archive(ArchiveView),
    Local(LocalDir),
}

impl View {
    /// Open an absolute path. Paths not starting with `/` do not exist.
    pub fn open(&self, path: &str) -> Result<File> {
        if !path.starts_with('/') {
            return Err(Error::NotExist);
        }
        match self {
            View::Archive(archive) => archive.open(path),
            View::Local(local) => local.open(path),
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, View::Archive(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    #[test]
    fn local_dir_serves_absolute_paths_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hi.txt"), "hi\n").unwrap();
        let view = View::Local(LocalDir::new(dir.path()));

        let mut f = view.open("/hi.txt").unwrap();
        let mut s = String::new();
        f.read_to_string(&mut s).unwrap();
        assert_eq!(s, "hi\n");
        assert_eq!(f.stat().unwrap().name(), "hi.txt");

        assert!(matches!(view.open("hi.txt"), Err(Error::NotExist)));
        assert!(matches!(view.open("/missing"), Err(Error::NotExist)));
        assert!(view.open("/").unwrap().stat().unwrap().is_dir());
    }

    #[test]
    fn local_file_with_trailing_slash_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hi.txt"), "hi\n").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let view = View::Local(LocalDir::new(dir.path()));

        assert!(matches!(view.open("/hi.txt/"), Err(Error::NotExist)));
        assert!(matches!(view.open("/hi.txt/x"), Err(Error::NotExist)));
        assert!(view.open("/sub/").unwrap().stat().unwrap().is_dir());
    }

    #[test]
    fn local_dir_rejects_parent_components() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(outer.path().join("secret"), "x").unwrap();

        let view = View::Local(LocalDir::new(&root));
        assert!(matches!(view.open("/../secret"), Err(Error::NotExist)));
    }

    #[test]
    fn archive_view_without_archive_is_not_found() {
        let source: Arc<dyn ReadAt> = Arc::new(vec![0x7f, b'E', b'L', b'F'].repeat(64));
        assert!(matches!(
            ArchiveView::load(source),
            Err(Error::ArchiveNotFound)
        ));
    }
}
