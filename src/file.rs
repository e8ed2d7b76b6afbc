//! File handles returned by [`AssetFs::open`](crate::AssetFs::open).
//!
//! One [`File`] type covers every kind of node a view can serve:
//!
//! | variant      | read                 | seek                                   | list children          |
//! |--------------|----------------------|----------------------------------------|------------------------|
//! | directory    | `ReadOnDirectory`    | `SeekOnDirectory`                      | always empty           |
//! | stored entry | bytes from archive   | start / current / end                  | `NotADirectory`        |
//! | deflated     | decompressed stream  | `SeekUnsupportedOnCompressedEntry`     | `NotADirectory`        |
//! | local file   | `std::fs::File`      | `std::fs::File`                        | `NotADirectory`        |
//! | local dir    | `ReadOnDirectory`    | `SeekOnDirectory`                      | `read_dir` entries     |
//!
//! Handles are not shared: each open produces an independent cursor.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use flate2::CrcReader;
use flate2::read::DeflateDecoder;

use crate::error::{Error, Result};
use crate::io::ReadAt;
use crate::zip::{CompressionMethod, ZipFileEntry};

/// Metadata reported by [`File::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    size: u64,
    mode: u32,
    modified: Option<SystemTime>,
    is_dir: bool,
}

/// Attributes shared by every archive directory; only the name differs.
const DIRECTORY: FileInfo = FileInfo {
    name: String::new(),
    size: 0,
    mode: 0o555,
    modified: None,
    is_dir: true,
};

/// Mode for archive files that carry no Unix permissions.
const DEFAULT_FILE_MODE: u32 = 0o444;

impl FileInfo {
    pub(crate) fn directory(name: &str) -> Self {
        FileInfo {
            name: name.to_string(),
            ..DIRECTORY
        }
    }

    pub(crate) fn from_entry(name: &str, entry: &ZipFileEntry) -> Self {
        FileInfo {
            name: name.to_string(),
            size: entry.uncompressed_size,
            mode: entry.unix_mode().map_or(DEFAULT_FILE_MODE, |m| m & 0o777),
            modified: entry.modified(),
            is_dir: false,
        }
    }

    pub(crate) fn from_metadata(name: &str, metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o777
        };
        #[cfg(not(unix))]
        let mode = if metadata.permissions().readonly() {
            0o444
        } else {
            0o644
        };

        FileInfo {
            name: name.to_string(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mode,
            modified: metadata.modified().ok(),
            is_dir: metadata.is_dir(),
        }
    }

    /// Last path component, `/` for the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed size in bytes; zero for directories.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Permission bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }
}

/// A byte range of a [`ReadAt`] source with its own cursor.
struct EntryReader {
    source: Arc<dyn ReadAt>,
    start: u64,
    len: u64,
    pos: u64,
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }

        let want = (buf.len() as u64).min(self.len - self.pos) as usize;
        let n = self.source.read_at(self.start + self.pos, &mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ended inside entry data",
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for EntryReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
        };
        self.pos = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        Ok(self.pos)
    }
}

/// Sequential inflate of a deflated entry, checked against the recorded CRC.
struct Inflater {
    stream: CrcReader<DeflateDecoder<EntryReader>>,
    expected_crc: u32,
    expected_len: u64,
}

impl Inflater {
    fn verify(&self) -> io::Result<()> {
        let crc = self.stream.crc();
        if crc.sum() != self.expected_crc || crc.amount() != self.expected_len as u32 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "checksum mismatch in compressed entry",
            ));
        }
        Ok(())
    }
}

impl Read for Inflater {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stream.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.verify()?;
        }
        Ok(n)
    }
}

enum Inner {
    Directory,
    Stored {
        entry: Arc<ZipFileEntry>,
        data: EntryReader,
    },
    Compressed {
        entry: Arc<ZipFileEntry>,
        data: Box<Inflater>,
    },
    LocalFile {
        file: fs::File,
    },
    LocalDir {
        path: PathBuf,
        children: Option<fs::ReadDir>,
    },
}

/// An open file or directory.
///
/// Implements [`Read`] and [`Seek`]; errors from those carry the crate
/// [`Error`], recoverable with [`Error::from_io`].
pub struct File {
    name: String,
    /// `None` once closed
    inner: Option<Inner>,
}

impl File {
    pub(crate) fn directory(name: &str) -> Self {
        File {
            name: name.to_string(),
            inner: Some(Inner::Directory),
        }
    }

    /// Handle over an archive entry whose data starts at `data_offset`.
    pub(crate) fn archive_entry(
        name: &str,
        source: Arc<dyn ReadAt>,
        entry: Arc<ZipFileEntry>,
        data_offset: u64,
    ) -> Result<Self> {
        let data = EntryReader {
            source,
            start: data_offset,
            len: entry.compressed_size,
            pos: 0,
        };

        let inner = match entry.compression_method {
            CompressionMethod::Stored => Inner::Stored { entry, data },
            CompressionMethod::Deflated => {
                let data = Box::new(Inflater {
                    stream: CrcReader::new(DeflateDecoder::new(data)),
                    expected_crc: entry.crc32,
                    expected_len: entry.uncompressed_size,
                });
                Inner::Compressed { entry, data }
            }
            CompressionMethod::Unknown(method) => {
                return Err(Error::UnsupportedCompression(method));
            }
        };

        Ok(File {
            name: name.to_string(),
            inner: Some(inner),
        })
    }

    /// Handle over a path on disk; directories are detected by metadata.
    pub(crate) fn local(name: &str, path: PathBuf) -> Result<Self> {
        let metadata = fs::metadata(&path).map_err(not_found_as_not_exist)?;
        let inner = if metadata.is_dir() {
            Inner::LocalDir {
                path,
                children: None,
            }
        } else {
            Inner::LocalFile {
                file: fs::File::open(&path).map_err(not_found_as_not_exist)?,
            }
        };

        Ok(File {
            name: name.to_string(),
            inner: Some(inner),
        })
    }

    /// Name this handle was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn inner(&self) -> Result<&Inner> {
        self.inner.as_ref().ok_or(Error::Closed)
    }

    fn inner_mut(&mut self) -> Result<&mut Inner> {
        self.inner.as_mut().ok_or(Error::Closed)
    }

    pub fn stat(&self) -> Result<FileInfo> {
        match self.inner()? {
            Inner::Directory => Ok(FileInfo::directory(&self.name)),
            Inner::Stored { entry, .. } | Inner::Compressed { entry, .. } => {
                Ok(FileInfo::from_entry(&self.name, entry))
            }
            Inner::LocalFile { file } => Ok(FileInfo::from_metadata(&self.name, &file.metadata()?)),
            Inner::LocalDir { path, .. } => {
                Ok(FileInfo::from_metadata(&self.name, &fs::metadata(path)?))
            }
        }
    }

    /// Up to `count` further entries of a directory, all remaining ones for
    /// `None`. Listing continues where the previous call stopped and is not
    /// restartable.
    ///
    /// Archive directories always list as empty.
    pub fn list_children(&mut self, count: Option<usize>) -> Result<Vec<FileInfo>> {
        match self.inner_mut()? {
            Inner::Directory => Ok(Vec::new()),
            Inner::LocalDir { path, children: slot } => {
                let mut children = match slot.take() {
                    Some(children) => children,
                    None => fs::read_dir(&*path)?,
                };
                let listed = list_local(&mut children, count);
                *slot = Some(children);
                listed
            }
            Inner::Stored { .. } | Inner::Compressed { .. } | Inner::LocalFile { .. } => {
                Err(Error::NotADirectory)
            }
        }
    }

    /// Release the handle. Closing again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.inner = None;
        Ok(())
    }
}

fn list_local(children: &mut fs::ReadDir, count: Option<usize>) -> Result<Vec<FileInfo>> {
    let mut infos = Vec::new();
    for child in children.take(count.unwrap_or(usize::MAX)) {
        let child = child?;
        let name = child.file_name().to_string_lossy().into_owned();
        infos.push(FileInfo::from_metadata(&name, &child.metadata()?));
    }
    Ok(infos)
}

/// A missing entry, or a file used as a directory (`/hi.txt/`, `/hi.txt/x`),
/// does not exist.
fn not_found_as_not_exist(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Error::NotExist,
        _ => Error::Io(err),
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner_mut()? {
            Inner::Directory | Inner::LocalDir { .. } => Err(Error::ReadOnDirectory.into()),
            Inner::Stored { data, .. } => data.read(buf),
            Inner::Compressed { data, .. } => data.read(buf),
            Inner::LocalFile { file } => file.read(buf),
        }
    }
}

impl Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.inner_mut()? {
            Inner::Directory | Inner::LocalDir { .. } => Err(Error::SeekOnDirectory.into()),
            Inner::Stored { data, .. } => data.seek(pos),
            Inner::Compressed { .. } => Err(Error::SeekUnsupportedOnCompressedEntry.into()),
            Inner::LocalFile { file } => file.seek(pos),
        }
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            None => "closed",
            Some(Inner::Directory) => "directory",
            Some(Inner::Stored { .. }) => "stored",
            Some(Inner::Compressed { .. }) => "compressed",
            Some(Inner::LocalFile { .. }) => "local file",
            Some(Inner::LocalDir { .. }) => "local directory",
        };
        f.debug_struct("File")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entry(method: CompressionMethod, data: &[u8], plain: &[u8]) -> ZipFileEntry {
        let mut crc = flate2::Crc::new();
        crc.update(plain);
        ZipFileEntry {
            file_name: "f".into(),
            compression_method: method,
            compressed_size: data.len() as u64,
            uncompressed_size: plain.len() as u64,
            crc32: crc.sum(),
            lfh_offset: 0,
            last_mod_time: 0,
            last_mod_date: 0,
            version_made_by: 0,
            external_attrs: 0,
            is_directory: false,
        }
    }

    /// `data` placed at offset 3 of an in-memory source.
    fn open(method: CompressionMethod, data: &[u8], plain: &[u8]) -> Result<File> {
        let mut source = b"xyz".to_vec();
        source.extend_from_slice(data);
        source.extend_from_slice(b"trailer");
        File::archive_entry(
            "f",
            Arc::new(source),
            Arc::new(entry(method, data, plain)),
            3,
        )
    }

    fn deflate(plain: &[u8]) -> Vec<u8> {
        let mut enc =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(plain).unwrap();
        enc.finish().unwrap()
    }

    fn err_of(err: io::Error) -> Error {
        err.into()
    }

    #[test]
    fn stored_reads_and_seeks() {
        let mut f = open(CompressionMethod::Stored, b"hello", b"hello").unwrap();
        let mut s = String::new();
        f.read_to_string(&mut s).unwrap();
        assert_eq!(s, "hello");

        assert_eq!(f.seek(SeekFrom::Start(1)).unwrap(), 1);
        let mut buf = [0u8; 2];
        f.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"el");

        assert_eq!(f.seek(SeekFrom::End(-1)).unwrap(), 4);
        assert_eq!(f.seek(SeekFrom::Current(-2)).unwrap(), 2);
        s.clear();
        f.read_to_string(&mut s).unwrap();
        assert_eq!(s, "llo");

        assert!(f.seek(SeekFrom::Current(-10)).is_err());
        assert_eq!(f.seek(SeekFrom::Start(100)).unwrap(), 100);
        assert_eq!(f.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn compressed_reads_but_never_seeks() {
        let plain = b"compressed file";
        let mut f = open(CompressionMethod::Deflated, &deflate(plain), plain).unwrap();

        for target in [SeekFrom::Start(0), SeekFrom::Start(1), SeekFrom::End(0)] {
            let err = err_of(f.seek(target).unwrap_err());
            assert!(matches!(err, Error::SeekUnsupportedOnCompressedEntry));
        }

        let mut out = Vec::new();
        f.read_to_end(&mut out).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn compressed_checksum_mismatch_is_reported() {
        let plain = b"compressed file";
        let mut f = open(CompressionMethod::Deflated, &deflate(plain), b"something else").unwrap();
        let err = f.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unknown_method_cannot_be_opened() {
        assert!(matches!(
            open(CompressionMethod::Unknown(12), b"??", b"??"),
            Err(Error::UnsupportedCompression(12))
        ));
    }

    #[test]
    fn file_stat_and_listing() {
        let mut f = open(CompressionMethod::Stored, b"hi", b"hi").unwrap();
        let info = f.stat().unwrap();
        assert_eq!(info.name(), "f");
        assert_eq!(info.size(), 2);
        assert_eq!(info.mode(), DEFAULT_FILE_MODE);
        assert!(!info.is_dir());
        assert!(matches!(f.list_children(Some(1)), Err(Error::NotADirectory)));
    }

    #[test]
    fn directory_handle_contract() {
        let mut a = File::directory("a");
        let b = File::directory("b");

        let err = err_of(a.read(&mut [0u8; 1]).unwrap_err());
        assert!(matches!(err, Error::ReadOnDirectory));
        let err = err_of(a.seek(SeekFrom::Start(0)).unwrap_err());
        assert!(matches!(err, Error::SeekOnDirectory));
        assert!(a.list_children(Some(1)).unwrap().is_empty());
        assert!(a.list_children(None).unwrap().is_empty());

        let (sa, sb) = (a.stat().unwrap(), b.stat().unwrap());
        assert!(sa.is_dir() && sb.is_dir());
        assert_eq!(sa.name(), "a");
        assert_eq!(
            (sa.size(), sa.mode(), sa.modified()),
            (sb.size(), sb.mode(), sb.modified())
        );
        assert_eq!(sa, FileInfo::directory("a"));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let mut f = open(CompressionMethod::Stored, b"hi", b"hi").unwrap();
        f.close().unwrap();
        f.close().unwrap();
        assert!(matches!(f.stat(), Err(Error::Closed)));
        let err = err_of(f.read(&mut [0u8; 1]).unwrap_err());
        assert!(matches!(err, Error::Closed));
    }

    #[test]
    fn local_directory_lists_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["one", "two", "three"] {
            fs::write(dir.path().join(name), name).unwrap();
        }

        let mut d = File::local("d", dir.path().to_path_buf()).unwrap();
        assert!(d.stat().unwrap().is_dir());
        assert_eq!(d.list_children(Some(2)).unwrap().len(), 2);
        assert_eq!(d.list_children(None).unwrap().len(), 1);
        assert!(d.list_children(None).unwrap().is_empty());

        let err = err_of(d.read(&mut [0u8; 1]).unwrap_err());
        assert!(matches!(err, Error::ReadOnDirectory));
    }

    #[test]
    fn local_missing_path_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            File::local("nope", dir.path().join("nope")),
            Err(Error::NotExist)
        ));
    }
}
