//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) in the file's tail
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Work out how far the archive is shifted inside the source
//! 4. Read the Central Directory to get metadata for all files
//! 5. On open, read each file's Local File Header to find its data
//!
//! ## Prepended data
//!
//! The archive is usually preceded by an executable. Offsets stored in the
//! archive may be relative to the start of the archive (plain `cat`) or to the
//! start of the combined file (`zip -A`). The parser locates the Central
//! Directory by its position relative to the EOCD and derives a base offset
//! from the difference, so both layouts resolve to the same absolute offsets.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Where the Central Directory lives and how far the archive is shifted.
struct DirectoryLocation {
    /// Absolute offset of the Central Directory in the source
    offset: u64,
    size: u64,
    total_entries: u64,
    /// Amount added to every offset stored in the archive
    base: u64,
}

/// Low-level ZIP file parser.
///
/// Generic over the reader type so the same code reads the running binary,
/// a file on disk, or an archive held in memory.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let entries = parser.list_files()?;
/// for entry in entries {
///     let offset = parser.get_data_offset(&entry)?;
///     // Read file data from offset...
/// }
/// ```
pub struct ZipParser<R: ReadAt + ?Sized> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the source in bytes
    size: u64,
}

fn corrupt(what: impl Into<String>) -> Error {
    Error::ArchiveCorrupt(what.into())
}

impl<R: ReadAt + ?Sized> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Only the trailing `22 + 65535` bytes are searched. A candidate
    /// signature is accepted only if its comment length reaches exactly to
    /// the end of the source, so stray `PK\x05\x06` bytes inside the
    /// executable are not mistaken for an archive.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// [`Error::ArchiveNotFound`] when no record is present, which is the
    /// normal state of a binary nothing was appended to.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(Error::ArchiveNotFound);
        }

        // Common case first: no archive comment.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf)?;

        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        // The EOCD could be earlier if there's a ZIP comment.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf)?;

        // Search backwards for EOCD signature (PK\x05\x06)
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }

            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                let eocd =
                    EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(Error::ArchiveNotFound)
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Returns the record and the base offset of the archive within the
    /// source, derived from where the record actually sits compared to where
    /// the locator says it is.
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<(Zip64EOCD, u64)> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| corrupt("missing ZIP64 end of central directory locator"))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.read_archive(locator_offset, &mut locator_buf)?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        // Offsets already relative to the whole source
        if let Some(eocd64) = self.try_zip64_eocd_at(locator.eocd64_offset) {
            return Ok((eocd64, 0));
        }

        // Otherwise the record (without extensible data) ends at the locator
        let actual = locator_offset
            .checked_sub(Zip64EOCD::MIN_SIZE as u64)
            .ok_or_else(|| corrupt("truncated ZIP64 end of central directory record"))?;
        let base = actual
            .checked_sub(locator.eocd64_offset)
            .ok_or_else(|| corrupt("ZIP64 end of central directory offset out of range"))?;
        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.read_archive(actual, &mut eocd64_buf)?;

        Ok((Zip64EOCD::from_bytes(&eocd64_buf)?, base))
    }

    fn try_zip64_eocd_at(&self, offset: u64) -> Option<Zip64EOCD> {
        let mut buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader.read_exact_at(offset, &mut buf).ok()?;
        Zip64EOCD::from_bytes(&buf).ok()
    }

    fn locate_directory(&self) -> Result<DirectoryLocation> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        if eocd.is_multi_disk() {
            return Err(corrupt("multi-disk archives are not supported"));
        }

        if eocd.is_zip64() {
            let (eocd64, base) = self.read_zip64_eocd(eocd_offset)?;
            return Ok(DirectoryLocation {
                offset: eocd64
                    .cd_offset
                    .checked_add(base)
                    .ok_or_else(|| corrupt("central directory offset out of range"))?,
                size: eocd64.cd_size,
                total_entries: eocd64.total_entries,
                base,
            });
        }

        // The Central Directory ends where the EOCD starts.
        let cd_size = eocd.cd_size as u64;
        let offset = eocd_offset
            .checked_sub(cd_size)
            .ok_or_else(|| corrupt("central directory larger than archive"))?;
        let base = offset
            .checked_sub(eocd.cd_offset as u64)
            .ok_or_else(|| corrupt("central directory offset out of range"))?;

        Ok(DirectoryLocation {
            offset,
            size: cd_size,
            total_entries: eocd.total_entries as u64,
            base,
        })
    }

    /// List all files in the ZIP archive.
    ///
    /// Reads the EOCD first, then fetches and parses the entire Central
    /// Directory in one read.
    ///
    /// # Errors
    ///
    /// [`Error::ArchiveNotFound`] if there is no archive at the end of the
    /// source, [`Error::ArchiveCorrupt`] if there is one but it cannot be
    /// decoded.
    pub fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let location = self.locate_directory()?;

        if location.offset.saturating_add(location.size) > self.size {
            return Err(corrupt("central directory extends past end of file"));
        }

        let mut cd_data = vec![0u8; location.size as usize];
        self.read_archive(location.offset, &mut cd_data)?;

        let capacity = location
            .total_entries
            .min(location.size / CDFH_MIN_SIZE as u64);
        let mut entries = Vec::with_capacity(capacity as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for index in 0..location.total_entries {
            let mut entry = Self::parse_cdfh(&mut cursor)
                .map_err(|e| corrupt(format!("central directory entry {index}: {e}")))?;
            entry.lfh_offset = entry
                .lfh_offset
                .checked_add(location.base)
                .ok_or_else(|| corrupt("local header offset out of range"))?;
            entries.push(entry);
        }

        debug!(
            entries = entries.len(),
            cd_offset = location.offset,
            base = location.base,
            "read central directory"
        );

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    ///
    /// `lfh_offset` in the result is still relative to the archive.
    fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> io::Result<ZipFileEntry> {
        // Read and verify the signature (PK\x01\x02)
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid central directory file header signature",
            ));
        }

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let _flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        // Lossy conversion keeps non-UTF8 names addressable
        let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();

        let is_directory = file_name.ends_with('/');

        let extra_field_end = cursor.position() + extra_field_length as u64;
        let comment_end = extra_field_end + file_comment_length as u64;
        if comment_end > cursor.get_ref().len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "central directory entry truncated",
            ));
        }

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()?;
            let field_end = cursor.position() + field_size as u64;

            if header_id == 0x0001 {
                // ZIP64 extended information: a field is present only if the
                // corresponding header field is 0xFFFFFFFF
                if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
            }
            cursor.set_position(field_end.min(extra_field_end));
        }

        cursor.set_position(comment_end);

        Ok(ZipFileEntry {
            file_name,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            version_made_by,
            external_attrs,
            is_directory,
        })
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header (LFH) has variable-length fields (filename,
    /// extra field) that may differ from the Central Directory entry, so it
    /// is read to find where the file data begins.
    pub fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.read_archive(entry.lfh_offset, &mut lfh_buf)?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(corrupt(format!(
                "invalid local file header for {}",
                entry.file_name
            )));
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        // Data starts after: LFH (30 bytes) + filename + extra field
        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        if data_offset.saturating_add(entry.compressed_size) > self.size {
            return Err(corrupt(format!(
                "data for {} extends past end of file",
                entry.file_name
            )));
        }

        Ok(data_offset)
    }

    /// Read archive structures, reporting a short read as corruption.
    fn read_archive(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact_at(offset, buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                corrupt("archive truncated")
            } else {
                Error::Io(e)
            }
        })
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}
