//! Variable-length integer primitives.
//!
//! Unsigned values use LEB128: seven payload bits per byte, least significant
//! group first, high bit set on every byte except the last. Signed values are
//! zigzag-mapped first so small magnitudes of either sign stay short.

use crate::error::{CodecError, CodecResult};

/// Maximum encoded size of a u64 varint.
pub const MAX_VARINT_BYTES: usize = 10;

/// Appends `value` to `buf` as a LEB128 varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Returns the encoded size of `value` in bytes without writing it.
#[must_use]
pub fn varint_len(value: u64) -> usize {
    let mut len = 1;
    let mut value = value >> 7;
    while value != 0 {
        len += 1;
        value >>= 7;
    }
    len
}

/// Reads a varint from `data` starting at `*pos`, advancing the cursor.
pub fn read_varint(data: &[u8], pos: &mut usize) -> CodecResult<u64> {
    let start = *pos;
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        if *pos >= data.len() || *pos - start >= MAX_VARINT_BYTES {
            return Err(CodecError::InvalidVarint { offset: start });
        }
        let byte = data[*pos];
        *pos += 1;
        if shift == 63 && byte > 1 {
            return Err(CodecError::InvalidVarint { offset: start });
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Reads a varint that must fit in a u32.
pub fn read_varint_u32(data: &[u8], pos: &mut usize) -> CodecResult<u32> {
    let start = *pos;
    let value = read_varint(data, pos)?;
    u32::try_from(value).map_err(|_| CodecError::InvalidVarint { offset: start })
}

/// Appends `value` to `buf` zigzag-mapped and varint-encoded.
pub fn write_zigzag32(buf: &mut Vec<u8>, value: i32) {
    let encoded = ((value << 1) ^ (value >> 31)) as u32;
    write_varint(buf, u64::from(encoded));
}

/// Reads a zigzag-encoded i32 from `data` at `*pos`.
pub fn read_zigzag32(data: &[u8], pos: &mut usize) -> CodecResult<i32> {
    let raw = read_varint_u32(data, pos)?;
    Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip_u64(value: u64) -> u64 {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        assert_eq!(buf.len(), varint_len(value));
        let mut pos = 0;
        let decoded = read_varint(&buf, &mut pos).unwrap();
        assert_eq!(pos, buf.len());
        decoded
    }

    #[test]
    fn varint_boundaries() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            assert_eq!(roundtrip_u64(value), value);
        }
        assert_eq!(varint_len(u64::MAX), MAX_VARINT_BYTES);
    }

    #[test]
    fn zigzag_signs() {
        for value in [0, -1, 1, -2, i32::MIN, i32::MAX] {
            let mut buf = Vec::new();
            write_zigzag32(&mut buf, value);
            let mut pos = 0;
            assert_eq!(read_zigzag32(&buf, &mut pos).unwrap(), value);
        }
    }

    #[test]
    fn small_magnitudes_stay_short() {
        let mut buf = Vec::new();
        write_zigzag32(&mut buf, -3);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn truncated_varint_rejected() {
        let mut pos = 0;
        let result = read_varint(&[0x80, 0x80], &mut pos);
        assert!(matches!(result, Err(CodecError::InvalidVarint { .. })));
    }

    #[test]
    fn overlong_varint_rejected() {
        let data = [0xFF; 11];
        let mut pos = 0;
        assert!(read_varint(&data, &mut pos).is_err());
    }

    #[test]
    fn u32_overflow_rejected() {
        let mut buf = Vec::new();
        write_varint(&mut buf, u64::from(u32::MAX) + 1);
        let mut pos = 0;
        assert!(read_varint_u32(&buf, &mut pos).is_err());
    }

    proptest! {
        #[test]
        fn varint_roundtrip(value in any::<u64>()) {
            prop_assert_eq!(roundtrip_u64(value), value);
        }

        #[test]
        fn zigzag_roundtrip(value in any::<i32>()) {
            let mut buf = Vec::new();
            write_zigzag32(&mut buf, value);
            let mut pos = 0;
            prop_assert_eq!(read_zigzag32(&buf, &mut pos).unwrap(), value);
        }
    }
}
