//! Path lookup over the flat archive entry list.
//!
//! Archives only list files. Every proper prefix of a file path is inferred to
//! be a directory; explicit `name/` directory entries are accepted too. The
//! mapping is built once and never mutated, so lookups need no locking.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::zip::ZipFileEntry;

#[derive(Debug, Clone)]
pub enum Node {
    File(Arc<ZipFileEntry>),
    Directory,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory)
    }
}

static ROOT: Node = Node::Directory;

/// Absolute path to node mapping, keyed without the leading slash.
#[derive(Debug, Default)]
pub struct Namespace {
    nodes: HashMap<String, Node>,
}

impl Namespace {
    /// Build the namespace from the decoded entries.
    ///
    /// # Errors
    ///
    /// [`Error::NamespaceConflict`] if a path is used both as a file and as a
    /// directory, or names two files.
    pub fn build(entries: Vec<ZipFileEntry>) -> Result<Self> {
        let mut nodes = HashMap::with_capacity(entries.len());

        for entry in entries {
            let components: Vec<&str> = entry
                .file_name
                .split('/')
                .filter(|c| !c.is_empty())
                .collect();
            if components.is_empty() {
                continue;
            }
            let key = components.join("/");

            for end in 1..components.len() {
                insert_directory(&mut nodes, components[..end].join("/"))?;
            }

            if entry.is_directory {
                insert_directory(&mut nodes, key)?;
                continue;
            }

            match nodes.entry(key) {
                Entry::Occupied(occupied) => {
                    return Err(Error::NamespaceConflict(occupied.key().clone()));
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Node::File(Arc::new(entry)));
                }
            }
        }

        Ok(Self { nodes })
    }

    /// Resolve an absolute path such as `/a/file1`.
    ///
    /// The root is accepted, as are trailing slashes on directories. Paths
    /// not starting with `/` never resolve.
    pub fn lookup(&self, path: &str) -> Result<&Node> {
        let relative = path.strip_prefix('/').ok_or(Error::NotExist)?;
        let trimmed = relative.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(&ROOT);
        }
        match self.nodes.get(trimmed) {
            Some(Node::File(_)) if trimmed.len() != relative.len() => Err(Error::NotExist),
            Some(node) => Ok(node),
            None => Err(Error::NotExist),
        }
    }

    pub fn file_count(&self) -> usize {
        self.nodes.values().filter(|n| !n.is_dir()).count()
    }

    /// Number of directories, not counting the root.
    pub fn directory_count(&self) -> usize {
        self.nodes.values().filter(|n| n.is_dir()).count()
    }

    /// All paths in the namespace, absolute and sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.nodes.keys().map(|k| format!("/{k}")).collect();
        paths.sort();
        paths
    }
}

fn insert_directory(nodes: &mut HashMap<String, Node>, path: String) -> Result<()> {
    match nodes.entry(path) {
        Entry::Occupied(occupied) => match occupied.get() {
            Node::Directory => Ok(()),
            Node::File(_) => Err(Error::NamespaceConflict(occupied.key().clone())),
        },
        Entry::Vacant(vacant) => {
            vacant.insert(Node::Directory);
            Ok(())
        }
    }
}

/// Last component of a lookup path, `/` for the root.
pub(crate) fn base_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::CompressionMethod;

    fn entry(name: &str) -> ZipFileEntry {
        ZipFileEntry {
            file_name: name.to_string(),
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: 0,
            last_mod_date: 0,
            version_made_by: 0,
            external_attrs: 0,
            is_directory: name.ends_with('/'),
        }
    }

    fn build(names: &[&str]) -> Result<Namespace> {
        Namespace::build(names.iter().map(|n| entry(n)).collect())
    }

    #[test]
    fn infers_directories_from_prefixes() {
        let ns = build(&["test.txt", "a/compressed.txt", "a/file1", "b/c/d/e.txt"]).unwrap();
        assert_eq!(ns.file_count(), 4);
        // a, b, b/c, b/c/d
        assert_eq!(ns.directory_count(), 4);

        for dir in ["/", "/a", "/a/", "/b", "/b/c", "/b/c/d"] {
            assert!(ns.lookup(dir).unwrap().is_dir(), "{dir}");
        }
        match ns.lookup("/b/c/d/e.txt").unwrap() {
            Node::File(e) => assert_eq!(e.file_name, "b/c/d/e.txt"),
            Node::Directory => panic!("expected a file"),
        }
    }

    #[test]
    fn relative_and_unknown_paths_do_not_exist() {
        let ns = build(&["test.txt"]).unwrap();
        assert!(matches!(ns.lookup("test.txt"), Err(Error::NotExist)));
        assert!(matches!(ns.lookup(""), Err(Error::NotExist)));
        assert!(matches!(ns.lookup("/bogus.txt"), Err(Error::NotExist)));
        assert!(matches!(ns.lookup("/test.txt/x"), Err(Error::NotExist)));
    }

    #[test]
    fn trailing_slash_only_resolves_directories() {
        let ns = build(&["test.txt", "a/file1"]).unwrap();
        assert!(matches!(ns.lookup("/test.txt/"), Err(Error::NotExist)));
        assert!(matches!(ns.lookup("/a/file1//"), Err(Error::NotExist)));
        assert!(ns.lookup("/a/").unwrap().is_dir());
        assert!(!ns.lookup("/a/file1").unwrap().is_dir());
    }

    #[test]
    fn explicit_directory_entries_are_directories() {
        let ns = build(&["a/", "a/b/", "a/b/c.txt"]).unwrap();
        assert_eq!(ns.file_count(), 1);
        assert_eq!(ns.directory_count(), 2);
        assert!(ns.lookup("/a/b").unwrap().is_dir());
    }

    #[test]
    fn file_then_nested_file_conflicts() {
        match build(&["a", "a/b"]) {
            Err(Error::NamespaceConflict(path)) => assert_eq!(path, "a"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_file_then_file_conflicts() {
        assert!(matches!(
            build(&["a/b", "a"]),
            Err(Error::NamespaceConflict(_))
        ));
        assert!(matches!(
            build(&["a/", "a"]),
            Err(Error::NamespaceConflict(_))
        ));
    }

    #[test]
    fn duplicate_file_conflicts() {
        assert!(matches!(
            build(&["x.txt", "x.txt"]),
            Err(Error::NamespaceConflict(_))
        ));
    }

    #[test]
    fn leading_and_doubled_slashes_are_normalized() {
        let ns = build(&["/abs/x", "d//y", "/"]).unwrap();
        assert_eq!(ns.paths(), ["/abs", "/abs/x", "/d", "/d/y"]);
    }

    #[test]
    fn base_names() {
        assert_eq!(base_name("/a/compressed.txt"), "compressed.txt");
        assert_eq!(base_name("/a/"), "a");
        assert_eq!(base_name("/"), "/");
    }
}
