//! Region payload files: a parcel directory followed by the parcel stream.
//!
//! ```text
//! +-------+----------+---------------+--------------+
//! | SDPF  | version  | region name   | entry_count  |
//! | 4B    | u16 LE   | len u8 + utf8 | u32 LE       |
//! +-------+----------+---------------+--------------+
//! | directory entries, 21 bytes each                |
//! |   family u8 | sequence u32 LE | offset u64 LE   |
//! |   stored_len u32 LE | crc32 u32 LE              |
//! +-------------------------------------------------+
//! | parcel stream                                   |
//! +-------------------------------------------------+
//! ```
//!
//! Entries are sorted by (family, sequence) and `offset` is absolute from
//! the start of the file, so a reader can reach any parcel with one seek.
//! `stored_len` covers the whole stored parcel record, header included.

use crate::error::{BuildError, BuildResult};
use crate::parcel::SealedParcel;
use crate::types::{ParcelFamily, ParcelSeq};

/// Magic at the start of every region payload file.
pub const PAYLOAD_MAGIC: [u8; 4] = *b"SDPF";
/// Format version written by this crate.
pub const PAYLOAD_VERSION: u16 = 1;
/// Size of one directory entry on the wire.
pub const DIRECTORY_ENTRY_LEN: usize = 21;

/// One row of a region's parcel directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Family of the parcel.
    pub family: ParcelFamily,
    /// Sequence of the parcel within its family.
    pub sequence: ParcelSeq,
    /// Absolute byte offset of the parcel in the payload file.
    pub offset: u64,
    /// Length of the stored parcel record in bytes.
    pub stored_len: u32,
    /// CRC-32 of the parcel's uncompressed payload.
    pub crc: u32,
}

impl DirectoryEntry {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.push(self.family.as_u8());
        buf.extend_from_slice(&self.sequence.as_u32().to_le_bytes());
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.stored_len.to_le_bytes());
        buf.extend_from_slice(&self.crc.to_le_bytes());
    }

    /// Reads one entry at `*pos`, advancing past it.
    pub fn read(data: &[u8], pos: &mut usize) -> BuildResult<Self> {
        if data.len().saturating_sub(*pos) < DIRECTORY_ENTRY_LEN {
            return Err(BuildError::invalid_format("truncated directory entry"));
        }
        let tag = data[*pos];
        let family = ParcelFamily::from_u8(tag).ok_or_else(|| {
            BuildError::invalid_format(format!("unknown family tag {tag} in directory"))
        })?;
        let fixed = &data[*pos + 1..*pos + DIRECTORY_ENTRY_LEN];
        *pos += DIRECTORY_ENTRY_LEN;
        Ok(Self {
            family,
            sequence: ParcelSeq::new(u32::from_le_bytes([fixed[0], fixed[1], fixed[2], fixed[3]])),
            offset: u64::from_le_bytes([
                fixed[4], fixed[5], fixed[6], fixed[7], fixed[8], fixed[9], fixed[10], fixed[11],
            ]),
            stored_len: u32::from_le_bytes([fixed[12], fixed[13], fixed[14], fixed[15]]),
            crc: u32::from_le_bytes([fixed[16], fixed[17], fixed[18], fixed[19]]),
        })
    }

    /// The stored parcel record this entry points at, bounds-checked.
    pub fn slice<'a>(&self, payload: &'a [u8]) -> BuildResult<&'a [u8]> {
        let start = usize::try_from(self.offset)
            .map_err(|_| BuildError::invalid_format("directory offset exceeds address space"))?;
        let end = start
            .checked_add(self.stored_len as usize)
            .filter(|&end| end <= payload.len())
            .ok_or_else(|| {
                BuildError::invalid_format(format!(
                    "directory entry {}/{} reaches past end of payload",
                    self.family, self.sequence
                ))
            })?;
        Ok(&payload[start..end])
    }
}

/// Parsed header of a region payload file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRegion {
    /// Region name from the header.
    pub name: String,
    /// Directory rows in stored order.
    pub entries: Vec<DirectoryEntry>,
    /// Offset of the first parcel byte.
    pub stream_start: u64,
}

/// Serializes one region's sealed parcels into a payload file.
pub fn assemble_region(name: &str, parcels: &[SealedParcel]) -> BuildResult<Vec<u8>> {
    if name.len() > usize::from(u8::MAX) {
        return Err(BuildError::invalid_config(format!(
            "region name {name:?} longer than 255 bytes"
        )));
    }
    let entry_count = u32::try_from(parcels.len())
        .map_err(|_| BuildError::invalid_format("region holds more than 2^32 parcels"))?;

    let mut order: Vec<&SealedParcel> = parcels.iter().collect();
    order.sort_by_key(|p| (p.family, p.sequence));

    let header_len = 4 + 2 + 1 + name.len() + 4 + parcels.len() * DIRECTORY_ENTRY_LEN;
    let stream_len: usize = order.iter().map(|p| p.bytes.len()).sum();
    let mut file = Vec::with_capacity(header_len + stream_len);
    file.extend_from_slice(&PAYLOAD_MAGIC);
    file.extend_from_slice(&PAYLOAD_VERSION.to_le_bytes());
    file.push(name.len() as u8);
    file.extend_from_slice(name.as_bytes());
    file.extend_from_slice(&entry_count.to_le_bytes());

    let mut offset = header_len as u64;
    for parcel in &order {
        let entry = DirectoryEntry {
            family: parcel.family,
            sequence: parcel.sequence,
            offset,
            stored_len: parcel.stored_len(),
            crc: parcel.crc,
        };
        entry.write(&mut file);
        offset += u64::from(parcel.stored_len());
    }
    for parcel in &order {
        file.extend_from_slice(&parcel.bytes);
    }
    Ok(file)
}

/// Parses a payload file's header and directory.
///
/// Parcel contents are not touched; callers slice them through the
/// returned entries.
pub fn parse_region(data: &[u8]) -> BuildResult<ParsedRegion> {
    if data.len() < 11 {
        return Err(BuildError::invalid_format("payload shorter than its header"));
    }
    if data[0..4] != PAYLOAD_MAGIC {
        return Err(BuildError::invalid_format("bad payload magic"));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != PAYLOAD_VERSION {
        return Err(BuildError::invalid_format(format!(
            "unsupported payload version {version}"
        )));
    }
    let name_len = usize::from(data[6]);
    let mut pos = 7usize;
    if data.len() - pos < name_len + 4 {
        return Err(BuildError::invalid_format("payload truncated in header"));
    }
    let name = std::str::from_utf8(&data[pos..pos + name_len])
        .map_err(|_| BuildError::invalid_format("region name is not valid UTF-8"))?
        .to_owned();
    pos += name_len;
    let entry_count =
        u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
    pos += 4;
    if entry_count.saturating_mul(DIRECTORY_ENTRY_LEN) > data.len().saturating_sub(pos) {
        return Err(BuildError::invalid_format(
            "directory entry count exceeds payload size",
        ));
    }
    let mut entries = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        entries.push(DirectoryEntry::read(data, &mut pos)?);
    }
    Ok(ParsedRegion {
        name,
        entries,
        stream_start: pos as u64,
    })
}
