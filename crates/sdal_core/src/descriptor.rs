//! The global descriptor, stored on disc as `MTOC.SDL`.
//!
//! The descriptor is the reader's entry point: it lists every region with
//! its payload file name and size, carries the shared name dictionary, and
//! ends in a CRC-32 trailer over everything before it.

use crate::crc::compute_crc32;
use crate::error::{BuildError, BuildResult};
use sdal_codec::{read_varint, write_varint, NameDictionary};

/// Magic at the start of the descriptor.
pub const DESCRIPTOR_MAGIC: [u8; 4] = *b"MTOC";
/// Descriptor version written by this crate.
pub const DESCRIPTOR_VERSION: u16 = 1;
/// Name of the descriptor file in the disc image root.
pub const DESCRIPTOR_FILE_NAME: &str = "MTOC.SDL";

/// One region line of the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSummary {
    /// Human-readable region name.
    pub name: String,
    /// Payload file name in the image root.
    pub file_name: String,
    /// Payload file size in bytes.
    pub payload_size: u64,
}

/// Parsed or to-be-written descriptor contents.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Regions in image order.
    pub regions: Vec<RegionSummary>,
    /// Shared name dictionary; record name ids resolve here.
    pub names: NameDictionary,
}

impl Descriptor {
    /// Serializes the descriptor, including its checksum trailer.
    pub fn encode(&self) -> BuildResult<Vec<u8>> {
        let region_count = u16::try_from(self.regions.len()).map_err(|_| {
            BuildError::invalid_config(format!(
                "{} regions exceed the descriptor limit of {}",
                self.regions.len(),
                u16::MAX
            ))
        })?;
        let mut buf = Vec::new();
        buf.extend_from_slice(&DESCRIPTOR_MAGIC);
        buf.extend_from_slice(&DESCRIPTOR_VERSION.to_le_bytes());
        buf.extend_from_slice(&region_count.to_le_bytes());
        for region in &self.regions {
            write_name(&mut buf, &region.name)?;
            write_name(&mut buf, &region.file_name)?;
            buf.extend_from_slice(&region.payload_size.to_le_bytes());
        }
        write_varint(&mut buf, self.names.len() as u64);
        for name in self.names.iter() {
            write_varint(&mut buf, name.len() as u64);
            buf.extend_from_slice(name.as_bytes());
        }
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Parses a descriptor, verifying the trailer first.
    pub fn decode(data: &[u8]) -> BuildResult<Self> {
        if data.len() < 12 {
            return Err(BuildError::invalid_format("descriptor too short"));
        }
        let body_len = data.len() - 4;
        let stored = u32::from_le_bytes([
            data[body_len],
            data[body_len + 1],
            data[body_len + 2],
            data[body_len + 3],
        ]);
        let actual = compute_crc32(&data[..body_len]);
        if stored != actual {
            return Err(BuildError::invalid_format(format!(
                "descriptor checksum mismatch: stored {stored:08x}, computed {actual:08x}"
            )));
        }
        let body = &data[..body_len];
        if body[0..4] != DESCRIPTOR_MAGIC {
            return Err(BuildError::invalid_format("bad descriptor magic"));
        }
        let version = u16::from_le_bytes([body[4], body[5]]);
        if version != DESCRIPTOR_VERSION {
            return Err(BuildError::invalid_format(format!(
                "unsupported descriptor version {version}"
            )));
        }
        let region_count = u16::from_le_bytes([body[6], body[7]]);
        let mut pos = 8usize;
        let mut regions = Vec::with_capacity(usize::from(region_count));
        for _ in 0..region_count {
            let name = read_name(body, &mut pos)?;
            let file_name = read_name(body, &mut pos)?;
            if body.len() - pos < 8 {
                return Err(BuildError::invalid_format(
                    "descriptor truncated at payload size",
                ));
            }
            let payload_size = u64::from_le_bytes([
                body[pos],
                body[pos + 1],
                body[pos + 2],
                body[pos + 3],
                body[pos + 4],
                body[pos + 5],
                body[pos + 6],
                body[pos + 7],
            ]);
            pos += 8;
            regions.push(RegionSummary {
                name,
                file_name,
                payload_size,
            });
        }
        let name_count = read_varint(body, &mut pos)? as usize;
        if name_count > body.len().saturating_sub(pos) {
            return Err(BuildError::invalid_format(
                "dictionary count exceeds descriptor size",
            ));
        }
        let mut names = Vec::with_capacity(name_count);
        for _ in 0..name_count {
            let len = read_varint(body, &mut pos)? as usize;
            if body.len() - pos < len {
                return Err(BuildError::invalid_format(
                    "descriptor truncated inside dictionary",
                ));
            }
            let name = std::str::from_utf8(&body[pos..pos + len])
                .map_err(|_| BuildError::invalid_format("dictionary entry is not valid UTF-8"))?;
            names.push(name.to_owned());
            pos += len;
        }
        if pos != body.len() {
            return Err(BuildError::invalid_format(
                "trailing bytes before descriptor checksum",
            ));
        }
        Ok(Self {
            regions,
            names: NameDictionary::from_names(names),
        })
    }
}

fn write_name(buf: &mut Vec<u8>, name: &str) -> BuildResult<()> {
    let len = u8::try_from(name.len()).map_err(|_| {
        BuildError::invalid_config(format!("name {name:?} longer than 255 bytes"))
    })?;
    buf.push(len);
    buf.extend_from_slice(name.as_bytes());
    Ok(())
}

fn read_name(data: &[u8], pos: &mut usize) -> BuildResult<String> {
    let len = usize::from(*data.get(*pos).ok_or_else(|| {
        BuildError::invalid_format("descriptor truncated at name length")
    })?);
    *pos += 1;
    if data.len() - *pos < len {
        return Err(BuildError::invalid_format("descriptor truncated inside name"));
    }
    let name = std::str::from_utf8(&data[*pos..*pos + len])
        .map_err(|_| BuildError::invalid_format("descriptor name is not valid UTF-8"))?
        .to_owned();
    *pos += len;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Descriptor {
        let mut names = NameDictionary::new();
        names.intern("Main St");
        names.intern("Oak Ave");
        Descriptor {
            regions: vec![
                RegionSummary {
                    name: "metro".to_owned(),
                    file_name: "R000.SDP".to_owned(),
                    payload_size: 4096,
                },
                RegionSummary {
                    name: "rural".to_owned(),
                    file_name: "R001.SDP".to_owned(),
                    payload_size: 123,
                },
            ],
            names,
        }
    }

    #[test]
    fn encode_decode_roundtrips() {
        let descriptor = sample();
        let bytes = descriptor.encode().unwrap();
        let decoded = Descriptor::decode(&bytes).unwrap();
        assert_eq!(decoded.regions, descriptor.regions);
        assert_eq!(decoded.names.resolve(sdal_codec::NameId::new(0)), Some("Main St"));
        assert_eq!(decoded.names.resolve(sdal_codec::NameId::new(1)), Some("Oak Ave"));
    }

    #[test]
    fn trailer_detects_corruption() {
        let bytes = sample().encode().unwrap();
        for position in [0, 6, bytes.len() / 2, bytes.len() - 5] {
            let mut damaged = bytes.clone();
            damaged[position] ^= 0x40;
            assert!(
                Descriptor::decode(&damaged).is_err(),
                "corruption at {position} went unnoticed"
            );
        }
    }

    #[test]
    fn empty_descriptor_roundtrips() {
        let descriptor = Descriptor {
            regions: Vec::new(),
            names: NameDictionary::new(),
        };
        let decoded = Descriptor::decode(&descriptor.encode().unwrap()).unwrap();
        assert!(decoded.regions.is_empty());
        assert!(decoded.names.is_empty());
    }

    #[test]
    fn overlong_region_name_rejected() {
        let descriptor = Descriptor {
            regions: vec![RegionSummary {
                name: "x".repeat(256),
                file_name: "R000.SDP".to_owned(),
                payload_size: 0,
            }],
            names: NameDictionary::new(),
        };
        assert!(descriptor.encode().is_err());
    }
}
