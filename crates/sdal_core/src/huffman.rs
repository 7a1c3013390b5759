//! Per-parcel canonical Huffman coding.
//!
//! Every parcel carries its own code table built from the byte frequencies
//! of that parcel's payload alone, so the coder adapts to local statistics
//! and each parcel decodes with no shared state. The table stores only
//! (symbol, bit length) pairs in ascending symbol order; both sides assign
//! the actual codes canonically, ordered by (length, symbol), which makes
//! the table compact and the assignment unambiguous.
//!
//! The bitstream is MSB-first and zero-padded to a whole byte. A decoder
//! reads exactly the uncompressed length recorded in the parcel header and
//! never examines the padding.

use crate::error::CompressionError;
use sdal_codec::{read_varint, write_varint};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Longest admissible code in bits.
pub const MAX_CODE_LEN: u8 = 32;

/// One table entry: a byte symbol and its code length in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeEntry {
    /// The byte value.
    pub symbol: u8,
    /// Code length in bits, 1 through [`MAX_CODE_LEN`].
    pub len: u8,
}

/// Canonical code table for one parcel.
///
/// Entries are strictly ascending by symbol. The table is valid by
/// construction: [`CodeTable::build`] produces real Huffman lengths and
/// [`CodeTable::decode`] re-checks every invariant on untrusted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    entries: Vec<CodeEntry>,
}

impl CodeTable {
    /// Builds a table from the byte frequencies of `payload`.
    pub fn build(payload: &[u8]) -> Result<Self, CompressionError> {
        if payload.is_empty() {
            return Err(CompressionError::EmptyPayload);
        }
        let mut freq = [0u64; 256];
        for &byte in payload {
            freq[byte as usize] += 1;
        }
        loop {
            let lengths = code_lengths(&freq);
            let longest = lengths.iter().copied().max().unwrap_or(0);
            if longest <= MAX_CODE_LEN {
                let entries = (0u16..256)
                    .filter(|&s| lengths[s as usize] > 0)
                    .map(|s| CodeEntry {
                        symbol: s as u8,
                        len: lengths[s as usize],
                    })
                    .collect();
                return Ok(Self { entries });
            }
            // Flatten the distribution until the deepest leaf fits.
            for f in freq.iter_mut() {
                if *f > 0 {
                    *f = *f / 2 + 1;
                }
            }
        }
    }

    /// Returns the entries in ascending symbol order.
    #[must_use]
    pub fn entries(&self) -> &[CodeEntry] {
        &self.entries
    }

    /// Appends the wire form: entry count, then (symbol, length) pairs.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        write_varint(buf, self.entries.len() as u64);
        for entry in &self.entries {
            buf.push(entry.symbol);
            buf.push(entry.len);
        }
    }

    /// Decodes and validates a table, advancing `*pos`.
    pub fn decode(data: &[u8], pos: &mut usize) -> Result<Self, CompressionError> {
        let count = read_varint(data, pos)
            .map_err(|_| CompressionError::invalid_table("truncated entry count"))?;
        if count == 0 || count > 256 {
            return Err(CompressionError::invalid_table(format!(
                "entry count {count} outside 1..=256"
            )));
        }
        let count = count as usize;
        if data.len() - *pos < count * 2 {
            return Err(CompressionError::invalid_table("truncated entries"));
        }
        let mut entries = Vec::with_capacity(count);
        let mut kraft = 0u64;
        let mut prev_symbol: i32 = -1;
        for _ in 0..count {
            let symbol = data[*pos];
            let len = data[*pos + 1];
            *pos += 2;
            if i32::from(symbol) <= prev_symbol {
                return Err(CompressionError::invalid_table(
                    "symbols not strictly ascending",
                ));
            }
            prev_symbol = i32::from(symbol);
            if len == 0 || len > MAX_CODE_LEN {
                return Err(CompressionError::invalid_table(format!(
                    "code length {len} outside 1..={MAX_CODE_LEN}"
                )));
            }
            kraft += 1u64 << (MAX_CODE_LEN - len);
            entries.push(CodeEntry { symbol, len });
        }
        if kraft > 1u64 << MAX_CODE_LEN {
            return Err(CompressionError::invalid_table(
                "code lengths are over-subscribed",
            ));
        }
        Ok(Self { entries })
    }

    /// Canonical (symbol, length, code) assignment ordered by (length, symbol).
    fn assign(&self) -> Vec<(u8, u8, u32)> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|e| (e.len, e.symbol));
        let mut assigned = Vec::with_capacity(sorted.len());
        let mut code = 0u32;
        let mut prev_len = sorted[0].len;
        for entry in &sorted {
            code <<= entry.len - prev_len;
            assigned.push((entry.symbol, entry.len, code));
            code = code.wrapping_add(1);
            prev_len = entry.len;
        }
        assigned
    }
}

/// Huffman code lengths for every byte with a nonzero frequency.
///
/// Deterministic: the heap breaks weight ties by node id, leaves are
/// numbered in symbol order, and merged nodes in creation order.
fn code_lengths(freq: &[u64; 256]) -> [u8; 256] {
    let mut lengths = [0u8; 256];
    let symbols: Vec<u8> = (0u16..256)
        .filter(|&s| freq[s as usize] > 0)
        .map(|s| s as u8)
        .collect();
    match symbols.len() {
        0 => return lengths,
        1 => {
            lengths[symbols[0] as usize] = 1;
            return lengths;
        }
        _ => {}
    }

    let mut parent = vec![u32::MAX; symbols.len()];
    let mut heap: BinaryHeap<Reverse<(u64, u32)>> = symbols
        .iter()
        .enumerate()
        .map(|(i, &s)| Reverse((freq[s as usize], i as u32)))
        .collect();
    while heap.len() > 1 {
        let Reverse((weight_a, a)) = heap.pop().unwrap_or(Reverse((0, 0)));
        let Reverse((weight_b, b)) = heap.pop().unwrap_or(Reverse((0, 0)));
        let merged = parent.len() as u32;
        parent.push(u32::MAX);
        parent[a as usize] = merged;
        parent[b as usize] = merged;
        heap.push(Reverse((weight_a + weight_b, merged)));
    }

    for (i, &symbol) in symbols.iter().enumerate() {
        let mut depth = 0u32;
        let mut node = i as u32;
        while parent[node as usize] != u32::MAX {
            depth += 1;
            node = parent[node as usize];
        }
        lengths[symbol as usize] = depth.min(u32::from(u8::MAX)) as u8;
    }
    lengths
}

struct BitWriter {
    bytes: Vec<u8>,
    current: u8,
    used: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            current: 0,
            used: 0,
        }
    }

    fn push(&mut self, code: u32, len: u8) {
        let mut remaining = len;
        while remaining > 0 {
            remaining -= 1;
            let bit = ((code >> remaining) & 1) as u8;
            self.current = (self.current << 1) | bit;
            self.used += 1;
            if self.used == 8 {
                self.bytes.push(self.current);
                self.current = 0;
                self.used = 0;
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.bytes.push(self.current << (8 - self.used));
        }
        self.bytes
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    byte: usize,
    bit: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte: 0,
            bit: 0,
        }
    }

    fn next_bit(&mut self) -> Option<u8> {
        let current = *self.data.get(self.byte)?;
        let bit = (current >> (7 - self.bit)) & 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.byte += 1;
        }
        Some(bit)
    }
}

/// Builds a table for `payload` and compresses it in one step.
pub fn compress_payload(payload: &[u8]) -> Result<(CodeTable, Vec<u8>), CompressionError> {
    let table = CodeTable::build(payload)?;
    let bits = compress(payload, &table)?;
    Ok((table, bits))
}

/// Compresses `payload` with an existing table.
pub fn compress(payload: &[u8], table: &CodeTable) -> Result<Vec<u8>, CompressionError> {
    let mut codes: [Option<(u32, u8)>; 256] = [None; 256];
    for (symbol, len, code) in table.assign() {
        codes[symbol as usize] = Some((code, len));
    }
    let mut writer = BitWriter::new();
    for &byte in payload {
        let (code, len) =
            codes[byte as usize].ok_or(CompressionError::UnknownSymbol { symbol: byte })?;
        writer.push(code, len);
    }
    Ok(writer.finish())
}

/// Decompresses exactly `expected_len` symbols from `data`.
pub fn decompress(
    data: &[u8],
    table: &CodeTable,
    expected_len: usize,
) -> Result<Vec<u8>, CompressionError> {
    // Canonical decode state: per length, the first code value and where
    // that length's symbols start in the canonical symbol order.
    let assigned = table.assign();
    let mut count = [0u32; MAX_CODE_LEN as usize + 1];
    let mut first_code = [0u32; MAX_CODE_LEN as usize + 1];
    let mut first_index = [0u32; MAX_CODE_LEN as usize + 1];
    let mut symbols = Vec::with_capacity(assigned.len());
    for (i, &(symbol, len, code)) in assigned.iter().enumerate() {
        if count[len as usize] == 0 {
            first_code[len as usize] = code;
            first_index[len as usize] = i as u32;
        }
        count[len as usize] += 1;
        symbols.push(symbol);
    }

    let mut reader = BitReader::new(data);
    let mut out = Vec::with_capacity(expected_len);
    while out.len() < expected_len {
        let mut code = 0u32;
        let mut len = 0usize;
        loop {
            let bit = reader.next_bit().ok_or(CompressionError::TruncatedStream {
                decoded: out.len(),
                expected: expected_len,
            })?;
            code = (code << 1) | u32::from(bit);
            len += 1;
            if count[len] > 0 && code >= first_code[len] {
                let index = code - first_code[len];
                if index < count[len] {
                    out.push(symbols[(first_index[len] + index) as usize]);
                    break;
                }
            }
            if len >= MAX_CODE_LEN as usize {
                return Err(CompressionError::UnknownCode {
                    decoded: out.len(),
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(payload: &[u8]) -> (CodeTable, Vec<u8>) {
        let (table, bits) = compress_payload(payload).unwrap();
        let restored = decompress(&bits, &table, payload.len()).unwrap();
        assert_eq!(restored, payload);
        (table, bits)
    }

    #[test]
    fn empty_payload_rejected() {
        assert!(matches!(
            CodeTable::build(&[]),
            Err(CompressionError::EmptyPayload)
        ));
    }

    #[test]
    fn single_symbol_payload() {
        let payload = vec![0xAB; 100];
        let (table, bits) = roundtrip(&payload);
        assert_eq!(table.entries().len(), 1);
        assert_eq!(table.entries()[0].len, 1);
        // 100 one-bit codes fit in 13 bytes.
        assert_eq!(bits.len(), 13);
    }

    #[test]
    fn skewed_payload_compresses() {
        let mut payload = vec![b'a'; 4000];
        payload.extend_from_slice(&[b'b'; 100]);
        payload.extend_from_slice(&[b'c'; 10]);
        let (_, bits) = roundtrip(&payload);
        assert!(bits.len() < payload.len() / 4);
    }

    #[test]
    fn uniform_payload_roundtrips() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(2048).collect();
        roundtrip(&payload);
    }

    #[test]
    fn table_wire_roundtrip() {
        let payload = b"mississippi river basin";
        let (table, _) = compress_payload(payload).unwrap();
        let mut buf = Vec::new();
        table.encode_into(&mut buf);
        let mut pos = 0;
        let decoded = CodeTable::decode(&buf, &mut pos).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn deterministic_tables() {
        let payload = b"the same bytes in, the same bytes out";
        let (table_a, bits_a) = compress_payload(payload).unwrap();
        let (table_b, bits_b) = compress_payload(payload).unwrap();
        assert_eq!(table_a, table_b);
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn equal_weight_ties_break_by_symbol() {
        // Four symbols, one occurrence each: lengths must all be 2 and the
        // canonical codes 00, 01, 10, 11 in symbol order.
        let payload = [1u8, 2, 3, 4];
        let (table, _) = compress_payload(&payload).unwrap();
        let lens: Vec<u8> = table.entries().iter().map(|e| e.len).collect();
        assert_eq!(lens, vec![2, 2, 2, 2]);
    }

    #[test]
    fn oversubscribed_table_rejected() {
        // Three one-bit codes cannot coexist.
        let mut buf = Vec::new();
        write_varint(&mut buf, 3);
        for symbol in [1u8, 2, 3] {
            buf.push(symbol);
            buf.push(1);
        }
        let mut pos = 0;
        assert!(matches!(
            CodeTable::decode(&buf, &mut pos),
            Err(CompressionError::InvalidTable { .. })
        ));
    }

    #[test]
    fn unsorted_table_rejected() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 2);
        buf.extend_from_slice(&[5, 2, 4, 2]);
        let mut pos = 0;
        assert!(CodeTable::decode(&buf, &mut pos).is_err());
    }

    #[test]
    fn zero_length_code_rejected() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 1);
        buf.extend_from_slice(&[7, 0]);
        let mut pos = 0;
        assert!(CodeTable::decode(&buf, &mut pos).is_err());
    }

    #[test]
    fn truncated_stream_detected() {
        let payload = b"abcabcabcabc";
        let (table, bits) = compress_payload(payload).unwrap();
        let result = decompress(&bits[..bits.len() - 1], &table, payload.len());
        assert!(matches!(
            result,
            Err(CompressionError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn hole_in_incomplete_code_detected() {
        // A single-symbol table assigns only the all-zeros code; a stream
        // starting with a one bit falls into the unassigned half.
        let payload = [9u8, 9, 9];
        let (table, _) = compress_payload(&payload).unwrap();
        let result = decompress(&[0xFF], &table, 3);
        assert!(matches!(result, Err(CompressionError::UnknownCode { .. })));
    }

    proptest! {
        #[test]
        fn roundtrip_any_payload(payload in proptest::collection::vec(any::<u8>(), 1..2048)) {
            roundtrip(&payload);
        }

        #[test]
        fn roundtrip_skewed_payload(
            runs in proptest::collection::vec((any::<u8>(), 1usize..64), 1..64),
        ) {
            let payload: Vec<u8> = runs
                .into_iter()
                .flat_map(|(byte, n)| std::iter::repeat(byte).take(n))
                .collect();
            roundtrip(&payload);
        }
    }
}
