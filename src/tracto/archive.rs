//! Minimal zip container reader backing the TRX decoder.
//!
//! Walks local file headers sequentially instead of trusting the central
//! directory, which keeps truncated and stream-written archives readable.
//! Handles the two awkward variants TRX producers emit in the wild:
//! ZIP64 size records and streaming entries whose sizes live in a trailing
//! data descriptor.

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use crate::tracto::codec::compression;
use crate::tracto::types::error::{Result, TractoError};

const LOCAL_FILE_SIG: u32 = 0x0403_4B50;
const CENTRAL_DIR_SIG: u32 = 0x0201_4B50;
const END_CENTRAL_SIG: u32 = 0x0605_4B50;
const END_CENTRAL64_SIG: u32 = 0x0606_4B50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4B50;

/// 32-bit size fields hold this sentinel when the real sizes are in a
/// ZIP64 extra record.
const ZIP64_SENTINEL: u32 = 0xFFFF_FFFF;
const ZIP64_EXTRA_TAG: u16 = 0x0001;

/// General-purpose flag bit 3: sizes were unknown when the local header was
/// written and follow the payload in a data descriptor.
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Compression method: payload stored verbatim.
pub const METHOD_STORED: u16 = 0;
/// Compression method: raw (headerless) deflate stream.
pub const METHOD_DEFLATE: u16 = 8;

/// Metadata for one local file entry, enough to extract its payload.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry path as stored in the archive.
    pub name: String,
    /// Compression method (0 = stored, 8 = deflate).
    pub method: u16,
    /// Payload size as stored in the archive.
    pub compressed_size: u64,
    /// Payload size after decompression.
    pub uncompressed_size: u64,
    /// Payload start within the source buffer.
    pub offset: usize,
}

/// A parsed archive borrowing its source buffer.
///
/// Entries are enumerated once at open time; extraction is independent per
/// entry and safe to run concurrently for disjoint entries.
#[derive(Debug)]
pub struct Archive<'a> {
    data: &'a [u8],
    entries: Vec<ArchiveEntry>,
}

/// Scanner position within the archive structure.
enum ScanState {
    /// At a record boundary, signature not yet inspected.
    Scanning,
    /// At a local file header.
    LocalEntry,
    /// At a central directory record.
    CentralDirectory,
    /// End-of-central-directory reached or buffer exhausted.
    Done,
}

impl<'a> Archive<'a> {
    /// Enumerate the local file entries of a zip buffer.
    pub fn open(data: &'a [u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut pos = 0usize;
        let mut state = ScanState::Scanning;

        loop {
            state = match state {
                ScanState::Scanning => {
                    if pos + 4 > data.len() {
                        ScanState::Done
                    } else {
                        match LittleEndian::read_u32(&data[pos..]) {
                            LOCAL_FILE_SIG => ScanState::LocalEntry,
                            CENTRAL_DIR_SIG => ScanState::CentralDirectory,
                            END_CENTRAL_SIG | END_CENTRAL64_SIG => ScanState::Done,
                            other => {
                                return Err(TractoError::CorruptArchive(format!(
                                    "unrecognised signature {:#010x} at offset {}",
                                    other, pos
                                )))
                            }
                        }
                    }
                }
                ScanState::LocalEntry => {
                    let (entry, next) = parse_local_entry(data, pos)?;
                    trace!(
                        "entry {:?}: method {}, {} -> {} bytes at offset {}",
                        entry.name,
                        entry.method,
                        entry.compressed_size,
                        entry.uncompressed_size,
                        entry.offset
                    );
                    entries.push(entry);
                    pos = next;
                    ScanState::Scanning
                }
                ScanState::CentralDirectory => {
                    pos = skip_central_record(data, pos)?;
                    ScanState::Scanning
                }
                ScanState::Done => break,
            };
        }

        debug!("archive opened: {} entries", entries.len());
        Ok(Self { data, entries })
    }

    /// The enumerated entries, in file order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Extract one entry's payload as an owned byte vector.
    pub fn extract(&self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        let start = entry.offset;
        let end = start
            .checked_add(entry.compressed_size as usize)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                TractoError::CorruptArchive(format!(
                    "payload of {:?} runs past end of archive",
                    entry.name
                ))
            })?;
        let payload = &self.data[start..end];

        match entry.method {
            METHOD_STORED => Ok(payload.to_vec()),
            METHOD_DEFLATE => compression::inflate_raw(payload, entry.uncompressed_size),
            other => Err(TractoError::UnsupportedCompression(other)),
        }
    }
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16> {
    data.get(pos..pos + 2)
        .map(LittleEndian::read_u16)
        .ok_or_else(|| TractoError::CorruptArchive(format!("unexpected end of archive at offset {}", pos)))
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    data.get(pos..pos + 4)
        .map(LittleEndian::read_u32)
        .ok_or_else(|| TractoError::CorruptArchive(format!("unexpected end of archive at offset {}", pos)))
}

fn read_u64(data: &[u8], pos: usize) -> Result<u64> {
    data.get(pos..pos + 8)
        .map(LittleEndian::read_u64)
        .ok_or_else(|| TractoError::CorruptArchive(format!("unexpected end of archive at offset {}", pos)))
}

/// Parse one local file header at `pos`; returns the entry and the offset
/// of the next record.
fn parse_local_entry(data: &[u8], pos: usize) -> Result<(ArchiveEntry, usize)> {
    // Fixed 30-byte part of the local file header.
    let flags = read_u16(data, pos + 6)?;
    let method = read_u16(data, pos + 8)?;
    let mut compressed_size = read_u32(data, pos + 18)? as u64;
    let mut uncompressed_size = read_u32(data, pos + 22)? as u64;
    let name_len = read_u16(data, pos + 26)? as usize;
    let extra_len = read_u16(data, pos + 28)? as usize;

    let name_start = pos + 30;
    let extra_start = name_start + name_len;
    let payload_start = extra_start + extra_len;
    if payload_start > data.len() {
        return Err(TractoError::CorruptArchive(format!(
            "local header at offset {} runs past end of archive",
            pos
        )));
    }
    let name = String::from_utf8_lossy(&data[name_start..extra_start]).into_owned();

    // ZIP64: the 32-bit fields are sentinels and the real sizes live in an
    // extra-field record.
    if compressed_size == ZIP64_SENTINEL as u64 || uncompressed_size == ZIP64_SENTINEL as u64 {
        let (zip64_uncompressed, zip64_compressed) =
            find_zip64_sizes(data, extra_start, extra_len)?.ok_or_else(|| {
                TractoError::CorruptArchive(format!(
                    "entry {:?} declares ZIP64 sizes but carries no ZIP64 extra field",
                    name
                ))
            })?;
        uncompressed_size = zip64_uncompressed;
        compressed_size = zip64_compressed;
    }

    if flags & FLAG_DATA_DESCRIPTOR != 0 {
        // Streaming entry: sizes follow the payload in a data descriptor.
        let (descriptor_pos, desc_compressed, desc_uncompressed) =
            find_data_descriptor(data, payload_start).ok_or_else(|| {
                TractoError::CorruptArchive(format!(
                    "no data descriptor found for streaming entry {:?}",
                    name
                ))
            })?;
        let entry = ArchiveEntry {
            name,
            method,
            compressed_size: desc_compressed as u64,
            uncompressed_size: desc_uncompressed as u64,
            offset: payload_start,
        };
        // Signature plus CRC, compressed size, uncompressed size.
        return Ok((entry, descriptor_pos + 16));
    }

    let next = payload_start
        .checked_add(compressed_size as usize)
        .filter(|&next| next <= data.len())
        .ok_or_else(|| {
            TractoError::CorruptArchive(format!(
                "payload of {:?} runs past end of archive",
                name
            ))
        })?;
    let entry = ArchiveEntry {
        name,
        method,
        compressed_size,
        uncompressed_size,
        offset: payload_start,
    };
    Ok((entry, next))
}

/// Locate the ZIP64 extra record (tag 0x0001) inside an entry's extra field.
///
/// Returns `(uncompressed_size, compressed_size)` in the order the record
/// stores them.
fn find_zip64_sizes(data: &[u8], extra_start: usize, extra_len: usize) -> Result<Option<(u64, u64)>> {
    let mut pos = extra_start;
    let extra_end = extra_start + extra_len;
    while pos + 4 <= extra_end {
        let tag = read_u16(data, pos)?;
        let size = read_u16(data, pos + 2)? as usize;
        if tag == ZIP64_EXTRA_TAG {
            if size < 16 || pos + 4 + size > extra_end {
                return Err(TractoError::CorruptArchive(
                    "ZIP64 extra field too short for both 64-bit sizes".to_string(),
                ));
            }
            let uncompressed = read_u64(data, pos + 4)?;
            let compressed = read_u64(data, pos + 12)?;
            return Ok(Some((uncompressed, compressed)));
        }
        pos += 4 + size;
    }
    Ok(None)
}

/// Forward-scan the payload for its trailing data descriptor.
///
/// The descriptor signature can also occur inside payload bytes, so a match
/// only counts when the 16-bit field at +16 (the start of the next record's
/// signature) reads `0x4B50` ("PK"). Returns the descriptor offset and its
/// compressed/uncompressed size fields.
fn find_data_descriptor(data: &[u8], from: usize) -> Option<(usize, u32, u32)> {
    let mut pos = from;
    while pos + 18 <= data.len() {
        if LittleEndian::read_u32(&data[pos..]) == DATA_DESCRIPTOR_SIG
            && LittleEndian::read_u16(&data[pos + 16..]) == 0x4B50
        {
            let compressed = LittleEndian::read_u32(&data[pos + 8..]);
            let uncompressed = LittleEndian::read_u32(&data[pos + 12..]);
            return Some((pos, compressed, uncompressed));
        }
        pos += 1;
    }
    None
}

/// Skip a central directory record. Central records repeat metadata already
/// collected from the local headers, so only their extent matters here.
fn skip_central_record(data: &[u8], pos: usize) -> Result<usize> {
    let name_len = read_u16(data, pos + 28)? as usize;
    let extra_len = read_u16(data, pos + 30)? as usize;
    let comment_len = read_u16(data, pos + 32)? as usize;
    let next = pos + 46 + name_len + extra_len + comment_len;
    if next > data.len() {
        return Err(TractoError::CorruptArchive(format!(
            "central directory record at offset {} runs past end of archive",
            pos
        )));
    }
    Ok(next)
}
