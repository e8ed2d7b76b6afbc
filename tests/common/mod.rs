#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;

use httpasset::{Lifecycle, Options};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// (name, contents, deflate)
pub type Asset<'a> = (&'a str, &'a str, bool);

pub const ASSETS: &[Asset] = &[
    ("test.txt", "hi", false),
    ("a/file1", "a", false),
    ("a/compressed.txt", "compressed file", true),
    ("b/c/d/e.txt", "e", false),
];

/// A standalone zip archive with offsets relative to its own start.
pub fn zip_bytes(assets: &[Asset]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents, deflate) in assets {
        let method = if *deflate {
            zip::CompressionMethod::Deflated
        } else {
            zip::CompressionMethod::Stored
        };
        let options = SimpleFileOptions::default().compression_method(method);
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A copy of the running test binary with `archive` appended.
pub struct Packaged {
    pub dir: TempDir,
    pub binary: PathBuf,
}

pub fn package(archive: &[u8]) -> Packaged {
    let exe = std::env::current_exe().unwrap();
    let mut data = std::fs::read(exe).unwrap();
    data.extend_from_slice(archive);

    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("packaged");
    std::fs::write(&binary, data).unwrap();
    Packaged { dir, binary }
}

pub fn lifecycle(packaged: &Packaged) -> Arc<Lifecycle> {
    Arc::new(Lifecycle::new(Options::new().binary(&packaged.binary)))
}

pub fn read_all(mut file: impl std::io::Read) -> String {
    let mut s = String::new();
    file.read_to_string(&mut s).unwrap();
    s
}
