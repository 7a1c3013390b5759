//! Parcel wire format and the greedy record packer.
//!
//! A parcel is the unit of storage and of integrity checking. On the wire:
//!
//! ```text
//! +--------+------------+---------------------+-------------------+
//! | family | sequence   | uncompressed_len    | compressed_len    |
//! | u8     | varint     | varint              | varint            |
//! +--------+------------+---------------------+-------------------+
//! | crc32 of uncompressed payload, u32 little-endian               |
//! +----------------------------------------------------------------+
//! | canonical code table | compressed payload                      |
//! +----------------------------------------------------------------+
//! ```
//!
//! The uncompressed payload is a run of record frames. [`ParcelPacker`]
//! fills parcels greedily in input order and never splits a record across
//! parcels; a record whose framed size alone exceeds the payload limit is
//! rejected outright.

use crate::config::BuildConfig;
use crate::crc::compute_crc32;
use crate::error::{BuildError, BuildResult};
use crate::huffman::{self, CodeTable};
use crate::types::{Locator, ParcelFamily, ParcelSeq};
use sdal_codec::{read_varint_u32, varint_len, write_frame, write_varint};

/// Fixed-position header fields of one stored parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParcelHeader {
    /// Family tag.
    pub family: ParcelFamily,
    /// Sequence within the family.
    pub sequence: ParcelSeq,
    /// Payload size before compression.
    pub uncompressed_len: u32,
    /// Compressed payload size in bytes.
    pub compressed_len: u32,
    /// CRC-32 of the uncompressed payload.
    pub crc: u32,
}

impl ParcelHeader {
    /// Decodes the header fields, advancing `*pos` to the code table.
    pub fn decode(data: &[u8], pos: &mut usize) -> BuildResult<Self> {
        let tag = *data
            .get(*pos)
            .ok_or_else(|| BuildError::invalid_format("parcel truncated before family tag"))?;
        *pos += 1;
        let family = ParcelFamily::from_u8(tag)
            .ok_or_else(|| BuildError::invalid_format(format!("unknown parcel family tag {tag}")))?;
        let sequence = ParcelSeq::new(read_varint_u32(data, pos)?);
        let uncompressed_len = read_varint_u32(data, pos)?;
        let compressed_len = read_varint_u32(data, pos)?;
        if data.len() - *pos < 4 {
            return Err(BuildError::invalid_format(
                "parcel truncated inside checksum field",
            ));
        }
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&data[*pos..*pos + 4]);
        *pos += 4;
        Ok(Self {
            family,
            sequence,
            uncompressed_len,
            compressed_len,
            crc: u32::from_le_bytes(crc_bytes),
        })
    }
}

/// One fully encoded parcel, ready to be placed in a region payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedParcel {
    /// Family tag.
    pub family: ParcelFamily,
    /// Sequence within the family.
    pub sequence: ParcelSeq,
    /// Number of record frames in the payload.
    pub record_count: u32,
    /// Payload size before compression.
    pub uncompressed_len: u32,
    /// CRC-32 of the uncompressed payload.
    pub crc: u32,
    /// Complete wire bytes, header through compressed payload.
    pub bytes: Vec<u8>,
}

impl SealedParcel {
    /// Size of the whole stored parcel in bytes.
    #[must_use]
    pub fn stored_len(&self) -> u32 {
        self.bytes.len() as u32
    }
}

/// Compresses `payload` and encodes a complete parcel.
pub fn seal_parcel(
    family: ParcelFamily,
    sequence: ParcelSeq,
    record_count: u32,
    payload: &[u8],
) -> BuildResult<SealedParcel> {
    let crc = compute_crc32(payload);
    let (table, compressed) = huffman::compress_payload(payload)?;
    let mut bytes = Vec::with_capacity(compressed.len() + 64);
    bytes.push(family.as_u8());
    write_varint(&mut bytes, u64::from(sequence.as_u32()));
    write_varint(&mut bytes, payload.len() as u64);
    write_varint(&mut bytes, compressed.len() as u64);
    bytes.extend_from_slice(&crc.to_le_bytes());
    table.encode_into(&mut bytes);
    bytes.extend_from_slice(&compressed);
    Ok(SealedParcel {
        family,
        sequence,
        record_count,
        uncompressed_len: payload.len() as u32,
        crc,
        bytes,
    })
}

/// Decodes one parcel starting at `*pos`, verifying its checksum.
///
/// Returns the header and the decompressed payload; `*pos` lands on the
/// first byte after the parcel.
pub fn decode_parcel(data: &[u8], pos: &mut usize) -> BuildResult<(ParcelHeader, Vec<u8>)> {
    let header = ParcelHeader::decode(data, pos)?;
    let table = CodeTable::decode(data, pos)?;
    let compressed_len = header.compressed_len as usize;
    if data.len() - *pos < compressed_len {
        return Err(BuildError::invalid_format(
            "parcel truncated inside compressed payload",
        ));
    }
    let compressed = &data[*pos..*pos + compressed_len];
    *pos += compressed_len;
    let payload = huffman::decompress(compressed, &table, header.uncompressed_len as usize)?;
    let actual = compute_crc32(&payload);
    if actual != header.crc {
        return Err(BuildError::ChecksumMismatch {
            family: header.family,
            sequence: header.sequence.as_u32(),
            expected: header.crc,
            actual,
        });
    }
    Ok((header, payload))
}

/// Greedy packer that turns a record stream into sealed parcels.
///
/// Records go into the current parcel until the next frame would push the
/// payload past `max_parcel_payload` or the frame count past
/// `max_parcel_records`; the parcel is then sealed and a fresh one opened.
/// Every pushed record is answered with the [`Locator`] of its frame.
#[derive(Debug)]
pub struct ParcelPacker {
    family: ParcelFamily,
    max_payload: usize,
    max_records: usize,
    sequence: ParcelSeq,
    payload: Vec<u8>,
    records: usize,
    sealed: Vec<SealedParcel>,
}

impl ParcelPacker {
    /// Creates a packer for one family with the configured limits.
    #[must_use]
    pub fn new(family: ParcelFamily, config: &BuildConfig) -> Self {
        Self {
            family,
            max_payload: config.max_parcel_payload,
            max_records: config.max_parcel_records,
            sequence: ParcelSeq::new(0),
            payload: Vec::new(),
            records: 0,
            sealed: Vec::new(),
        }
    }

    /// Appends one record body, returning where its frame landed.
    ///
    /// `record_id` only names the record in a capacity error.
    pub fn push_record(&mut self, record_id: u64, body: &[u8]) -> BuildResult<Locator> {
        let framed = varint_len(body.len() as u64) + body.len();
        if framed > self.max_payload {
            return Err(BuildError::Capacity {
                family: self.family,
                record_id,
                encoded_len: framed,
                limit: self.max_payload,
            });
        }
        if !self.payload.is_empty()
            && (self.payload.len() + framed > self.max_payload || self.records >= self.max_records)
        {
            self.seal_current()?;
        }
        let offset = write_frame(&mut self.payload, body);
        self.records += 1;
        Ok(Locator::new(self.family, self.sequence, offset as u32))
    }

    /// Number of parcels sealed so far, not counting the one in progress.
    #[must_use]
    pub fn sealed_count(&self) -> usize {
        self.sealed.len()
    }

    /// Seals the in-progress parcel (if any) and returns them all.
    pub fn finish(mut self) -> BuildResult<Vec<SealedParcel>> {
        self.seal_current()?;
        Ok(self.sealed)
    }

    fn seal_current(&mut self) -> BuildResult<()> {
        if self.payload.is_empty() {
            return Ok(());
        }
        let payload = std::mem::take(&mut self.payload);
        let records = std::mem::take(&mut self.records);
        let sealed = seal_parcel(self.family, self.sequence, records as u32, &payload)?;
        tracing::debug!(
            family = %self.family,
            sequence = self.sequence.as_u32(),
            records,
            payload_len = payload.len(),
            stored_len = sealed.bytes.len(),
            "sealed parcel"
        );
        self.sealed.push(sealed);
        self.sequence = self.sequence.next();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config(max_payload: usize, max_records: usize) -> BuildConfig {
        BuildConfig::new()
            .max_parcel_payload(max_payload)
            .max_parcel_records(max_records)
    }

    #[test]
    fn seal_and_decode_roundtrip() {
        let mut payload = Vec::new();
        write_frame(&mut payload, b"first record body");
        write_frame(&mut payload, b"second record body");
        let sealed =
            seal_parcel(ParcelFamily::Cartographic, ParcelSeq::new(3), 2, &payload).unwrap();
        let mut pos = 0;
        let (header, restored) = decode_parcel(&sealed.bytes, &mut pos).unwrap();
        assert_eq!(header.family, ParcelFamily::Cartographic);
        assert_eq!(header.sequence, ParcelSeq::new(3));
        assert_eq!(header.uncompressed_len as usize, payload.len());
        assert_eq!(restored, payload);
        assert_eq!(pos, sealed.bytes.len());
    }

    #[test]
    fn packer_reports_frame_offsets() {
        let config = tiny_config(1024, 64);
        let mut packer = ParcelPacker::new(ParcelFamily::Navigable, &config);
        let a = packer.push_record(1, &[0xAA; 10]).unwrap();
        let b = packer.push_record(2, &[0xBB; 10]).unwrap();
        assert_eq!(a.offset, 0);
        // First frame is 1 length byte + 10 body bytes.
        assert_eq!(b.offset, 11);
        assert_eq!(a.sequence, b.sequence);
    }

    #[test]
    fn packer_rolls_over_on_payload_limit() {
        let config = tiny_config(16, 64);
        let mut packer = ParcelPacker::new(ParcelFamily::Cartographic, &config);
        let a = packer.push_record(1, &[1u8; 10]).unwrap();
        let b = packer.push_record(2, &[2u8; 10]).unwrap();
        assert_eq!(a.sequence, ParcelSeq::new(0));
        assert_eq!(b.sequence, ParcelSeq::new(1));
        assert_eq!(b.offset, 0);
        let parcels = packer.finish().unwrap();
        assert_eq!(parcels.len(), 2);
        assert_eq!(parcels[0].record_count, 1);
    }

    #[test]
    fn packer_rolls_over_on_record_limit() {
        let config = tiny_config(1024, 2);
        let mut packer = ParcelPacker::new(ParcelFamily::Overlay, &config);
        for id in 0..5u64 {
            packer.push_record(id, &[id as u8; 4]).unwrap();
        }
        let parcels = packer.finish().unwrap();
        assert_eq!(parcels.len(), 3);
        assert_eq!(parcels[0].record_count, 2);
        assert_eq!(parcels[2].record_count, 1);
    }

    #[test]
    fn record_filling_whole_payload_accepted() {
        let config = tiny_config(16, 64);
        let mut packer = ParcelPacker::new(ParcelFamily::Cartographic, &config);
        // 15 body bytes plus 1 length byte is exactly the limit.
        packer.push_record(7, &[0u8; 15]).unwrap();
        let parcels = packer.finish().unwrap();
        assert_eq!(parcels.len(), 1);
        assert_eq!(parcels[0].uncompressed_len, 16);
    }

    #[test]
    fn oversized_record_rejected_with_identity() {
        let config = tiny_config(16, 64);
        let mut packer = ParcelPacker::new(ParcelFamily::Cartographic, &config);
        let err = packer.push_record(42, &[0u8; 16]).unwrap_err();
        match err {
            BuildError::Capacity {
                record_id,
                encoded_len,
                limit,
                ..
            } => {
                assert_eq!(record_id, 42);
                assert_eq!(encoded_len, 17);
                assert_eq!(limit, 16);
            }
            other => panic!("expected capacity error, got {other}"),
        }
    }

    #[test]
    fn empty_packer_produces_nothing() {
        let config = tiny_config(64, 4);
        let packer = ParcelPacker::new(ParcelFamily::Navigable, &config);
        assert!(packer.finish().unwrap().is_empty());
    }

    #[test]
    fn damaged_checksum_detected() {
        let mut payload = Vec::new();
        write_frame(&mut payload, b"checksummed body");
        let mut sealed =
            seal_parcel(ParcelFamily::Navigable, ParcelSeq::new(0), 1, &payload).unwrap();
        // Header varints are all single bytes here, so the stored checksum
        // sits at offset 4.
        sealed.bytes[4] ^= 0x01;
        let mut pos = 0;
        let err = decode_parcel(&sealed.bytes, &mut pos).unwrap_err();
        assert!(matches!(err, BuildError::ChecksumMismatch { .. }));
    }

    #[test]
    fn truncated_parcel_rejected() {
        let mut payload = Vec::new();
        write_frame(&mut payload, b"soon to be cut short");
        let sealed =
            seal_parcel(ParcelFamily::Overlay, ParcelSeq::new(0), 1, &payload).unwrap();
        let cut = &sealed.bytes[..sealed.bytes.len() - 2];
        let mut pos = 0;
        assert!(decode_parcel(cut, &mut pos).is_err());
    }
}
