//! Core identifiers and locator types.

use crate::error::{BuildError, BuildResult};
use sdal_codec::{read_varint_u32, write_varint, CodecResult};
use std::fmt;

/// Content family a parcel belongs to.
///
/// Families 1 through 3 hold data records; the two index families each hold
/// exactly one parcel carrying a serialized index blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ParcelFamily {
    /// Full road geometry, packed in spatial order.
    Cartographic = 1,
    /// Navigable road attributes, packed in way-identifier order.
    Navigable = 2,
    /// POIs and density tiles, packed in spatial order.
    Overlay = 3,
    /// The spatial index blob.
    SpatialIndex = 4,
    /// The way index blob.
    WayIndex = 5,
}

impl ParcelFamily {
    /// All families in directory order.
    pub const ALL: [Self; 5] = [
        Self::Cartographic,
        Self::Navigable,
        Self::Overlay,
        Self::SpatialIndex,
        Self::WayIndex,
    ];

    /// Returns the wire tag.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Cartographic),
            2 => Some(Self::Navigable),
            3 => Some(Self::Overlay),
            4 => Some(Self::SpatialIndex),
            5 => Some(Self::WayIndex),
            _ => None,
        }
    }
}

impl fmt::Display for ParcelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cartographic => "cartographic",
            Self::Navigable => "navigable",
            Self::Overlay => "overlay",
            Self::SpatialIndex => "spatial-index",
            Self::WayIndex => "way-index",
        };
        f.write_str(name)
    }
}

/// Position of a parcel within its family; write order, starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ParcelSeq(pub u32);

impl ParcelSeq {
    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u32) -> Self {
        Self(seq)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ParcelSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parcel:{}", self.0)
    }
}

/// Storage position of one record: family, parcel, and the byte offset of
/// its frame inside the parcel's uncompressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locator {
    /// Family of the parcel holding the record.
    pub family: ParcelFamily,
    /// Sequence of the parcel within its family.
    pub sequence: ParcelSeq,
    /// Frame start offset in the uncompressed payload.
    pub offset: u32,
}

impl Locator {
    /// Creates a new locator.
    #[must_use]
    pub const fn new(family: ParcelFamily, sequence: ParcelSeq, offset: u32) -> Self {
        Self {
            family,
            sequence,
            offset,
        }
    }

    /// Appends the wire form: family tag, then sequence and offset varints.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.family.as_u8());
        write_varint(buf, u64::from(self.sequence.as_u32()));
        write_varint(buf, u64::from(self.offset));
    }

    /// Decodes a locator, advancing `*pos`.
    pub fn decode(data: &[u8], pos: &mut usize) -> BuildResult<Self> {
        let tag = *data.get(*pos).ok_or_else(|| {
            BuildError::invalid_format("truncated locator")
        })?;
        *pos += 1;
        let family = ParcelFamily::from_u8(tag)
            .ok_or_else(|| BuildError::invalid_format(format!("unknown family tag {tag}")))?;
        let sequence = ParcelSeq::new(read_varint_u32_cursor(data, pos)?);
        let offset = read_varint_u32_cursor(data, pos)?;
        Ok(Self::new(family, sequence, offset))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}+{}",
            self.family,
            self.sequence.as_u32(),
            self.offset
        )
    }
}

pub(crate) fn read_varint_u32_cursor(data: &[u8], pos: &mut usize) -> BuildResult<u32> {
    let result: CodecResult<u32> = read_varint_u32(data, pos);
    result.map_err(BuildError::from)
}
