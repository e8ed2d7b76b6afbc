//! ZIP archive decoding.
//!
//! Given a random-access source and its length, produce the flat list of
//! archive entries. The rest of the crate only relies on [`ZipParser::list_files`]
//! and [`ZipParser::get_data_offset`].
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Parsing of ZIP structures from a [`ReadAt`](crate::io::ReadAt) source
//!
//! ## ZIP Format Overview
//!
//! A packaged binary looks like:
//! 1. The executable itself
//! 2. Local file headers and file data for each entry
//! 3. Central Directory with metadata for all files
//! 4. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is found by scanning the tail, so any amount of data may precede
//! the archive.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED (no compression) and DEFLATE entries
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - Other compression methods are listed but cannot be opened

mod parser;
mod structures;

pub use parser::ZipParser;
pub use structures::*;
