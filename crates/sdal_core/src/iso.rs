//! Minimal ISO-9660 image writer and reader.
//!
//! Head units mount the disc as a plain ISO-9660 volume, so the image only
//! needs the subset those firmwares read: a primary volume descriptor, a
//! terminator, one-entry path tables, and a flat root directory of 8.3
//! files. Interchange level 1 identifiers only; no Joliet, no Rock Ridge,
//! no subdirectories.
//!
//! Images are reproducible: all four volume timestamps are written as the
//! zeroed digit form and the volume id comes from configuration, so the
//! same input bytes always produce the same image bytes.

use crate::error::{BuildError, BuildResult, PackagingError};

/// Logical sector size of the volume.
pub const SECTOR_SIZE: usize = 2048;
/// Sector of the primary volume descriptor.
const PVD_SECTOR: usize = 16;
/// Sector of the set terminator.
const TERMINATOR_SECTOR: usize = 17;
/// Sector of the little-endian path table.
const PATH_TABLE_L_SECTOR: usize = 18;
/// Sector of the big-endian path table.
const PATH_TABLE_M_SECTOR: usize = 19;
/// First sector of the root directory extent.
const ROOT_DIR_SECTOR: usize = 20;
/// Wire size of the one-entry path table.
const PATH_TABLE_SIZE: u32 = 10;
/// Longest volume identifier, per the d-character field width.
const VOLUME_ID_MAX: usize = 32;

/// A file staged for the image root directory.
#[derive(Debug, Clone)]
struct StagedFile {
    /// On-disc identifier without the `;1` suffix.
    name: String,
    data: Vec<u8>,
}

/// One file found in an image's root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoEntry {
    /// Identifier with the version suffix stripped.
    pub name: String,
    /// Absolute byte offset of the file contents.
    pub offset: u64,
    /// File size in bytes.
    pub size: u32,
}

/// Parsed skeleton of an image.
#[derive(Debug, Clone)]
pub struct IsoContents {
    /// Volume identifier, trailing pad spaces removed.
    pub volume_id: String,
    /// Volume space size in sectors.
    pub volume_sectors: u32,
    /// Root directory files in stored order.
    pub files: Vec<IsoEntry>,
}

/// Accumulates root-directory files and writes the final image.
#[derive(Debug)]
pub struct IsoWriter {
    volume_id: String,
    files: Vec<StagedFile>,
}

impl IsoWriter {
    /// Creates a writer for a volume named `volume_id`.
    pub fn new(volume_id: &str) -> BuildResult<Self> {
        if volume_id.is_empty()
            || volume_id.len() > VOLUME_ID_MAX
            || !volume_id.bytes().all(is_d_char)
        {
            return Err(BuildError::invalid_config(format!(
                "volume id {volume_id:?} must be 1..={VOLUME_ID_MAX} characters of A-Z, 0-9, _"
            )));
        }
        Ok(Self {
            volume_id: volume_id.to_owned(),
            files: Vec::new(),
        })
    }

    /// Stages one root-directory file.
    pub fn add_file(&mut self, name: &str, data: Vec<u8>) -> BuildResult<()> {
        validate_file_name(name)?;
        if self.files.iter().any(|f| f.name == name) {
            return Err(PackagingError::DuplicateFileName {
                name: name.to_owned(),
            }
            .into());
        }
        if data.len() as u64 > u64::from(u32::MAX) {
            return Err(PackagingError::FileTooLarge {
                name: name.to_owned(),
                size: data.len() as u64,
                limit: u64::from(u32::MAX),
            }
            .into());
        }
        self.files.push(StagedFile {
            name: name.to_owned(),
            data,
        });
        Ok(())
    }

    /// Lays out and returns the complete image.
    pub fn finish(mut self) -> BuildResult<Vec<u8>> {
        self.files.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        // Place directory records into sectors; a record never straddles a
        // sector boundary.
        let records: Vec<Vec<u8>> = self
            .files
            .iter()
            .map(|f| {
                let identifier = format!("{};1", f.name);
                dir_record(0, 0, 0x00, identifier.as_bytes())
            })
            .collect();
        let mut sector_fill = 34usize * 2; // '.' and '..' up front
        let mut dir_sectors = 1usize;
        let mut record_sector = vec![0usize; records.len()];
        for (i, record) in records.iter().enumerate() {
            if sector_fill + record.len() > SECTOR_SIZE {
                dir_sectors += 1;
                sector_fill = 0;
            }
            record_sector[i] = dir_sectors - 1;
            sector_fill += record.len();
        }
        let root_dir_size = (dir_sectors * SECTOR_SIZE) as u32;

        // File extents follow the directory, each aligned to a sector.
        let mut next_sector = ROOT_DIR_SECTOR + dir_sectors;
        let mut extents = Vec::with_capacity(self.files.len());
        for file in &self.files {
            extents.push(next_sector as u32);
            next_sector += file.data.len().div_ceil(SECTOR_SIZE);
        }
        let total_sectors = u32::try_from(next_sector)
            .map_err(|_| BuildError::invalid_format("image exceeds the sector address space"))?;

        let mut image = vec![0u8; next_sector * SECTOR_SIZE];

        // Primary volume descriptor.
        {
            let pvd = sector_mut(&mut image, PVD_SECTOR);
            pvd[0] = 1;
            pvd[1..6].copy_from_slice(b"CD001");
            pvd[6] = 1;
            fill_spaces(&mut pvd[8..40]);
            fill_spaces(&mut pvd[40..72]);
            pvd[40..40 + self.volume_id.len()].copy_from_slice(self.volume_id.as_bytes());
            both_u32(pvd, 80, total_sectors);
            both_u16(pvd, 120, 1);
            both_u16(pvd, 124, 1);
            both_u16(pvd, 128, SECTOR_SIZE as u16);
            both_u32(pvd, 132, PATH_TABLE_SIZE);
            pvd[140..144].copy_from_slice(&(PATH_TABLE_L_SECTOR as u32).to_le_bytes());
            pvd[148..152].copy_from_slice(&(PATH_TABLE_M_SECTOR as u32).to_be_bytes());
            let root = dir_record(ROOT_DIR_SECTOR as u32, root_dir_size, 0x02, &[0x00]);
            pvd[156..156 + root.len()].copy_from_slice(&root);
            fill_spaces(&mut pvd[190..813]);
            for field in 0..4 {
                let at = 813 + field * 17;
                pvd[at..at + 16].copy_from_slice(b"0000000000000000");
            }
            pvd[881] = 1;
        }

        // Volume descriptor set terminator.
        {
            let terminator = sector_mut(&mut image, TERMINATOR_SECTOR);
            terminator[0] = 255;
            terminator[1..6].copy_from_slice(b"CD001");
            terminator[6] = 1;
        }

        // One-entry path tables, little- and big-endian.
        {
            let table = sector_mut(&mut image, PATH_TABLE_L_SECTOR);
            table[0] = 1;
            table[2..6].copy_from_slice(&(ROOT_DIR_SECTOR as u32).to_le_bytes());
            table[6..8].copy_from_slice(&1u16.to_le_bytes());
        }
        {
            let table = sector_mut(&mut image, PATH_TABLE_M_SECTOR);
            table[0] = 1;
            table[2..6].copy_from_slice(&(ROOT_DIR_SECTOR as u32).to_be_bytes());
            table[6..8].copy_from_slice(&1u16.to_be_bytes());
        }

        // Root directory extent.
        {
            let dir_start = ROOT_DIR_SECTOR * SECTOR_SIZE;
            let this_dir = dir_record(ROOT_DIR_SECTOR as u32, root_dir_size, 0x02, &[0x00]);
            let parent_dir = dir_record(ROOT_DIR_SECTOR as u32, root_dir_size, 0x02, &[0x01]);
            image[dir_start..dir_start + 34].copy_from_slice(&this_dir);
            image[dir_start + 34..dir_start + 68].copy_from_slice(&parent_dir);
            let mut write_at = dir_start + 68;
            let mut current_sector = 0usize;
            for (i, file) in self.files.iter().enumerate() {
                if record_sector[i] != current_sector {
                    current_sector = record_sector[i];
                    write_at = dir_start + current_sector * SECTOR_SIZE;
                }
                let identifier = format!("{};1", file.name);
                let record = dir_record(
                    extents[i],
                    file.data.len() as u32,
                    0x00,
                    identifier.as_bytes(),
                );
                image[write_at..write_at + record.len()].copy_from_slice(&record);
                write_at += record.len();
            }
        }

        // File contents.
        for (i, file) in self.files.iter().enumerate() {
            let at = extents[i] as usize * SECTOR_SIZE;
            image[at..at + file.data.len()].copy_from_slice(&file.data);
        }

        Ok(image)
    }
}

/// Parses the volume skeleton of an image.
pub fn read_image(data: &[u8]) -> BuildResult<IsoContents> {
    if data.len() < (TERMINATOR_SECTOR + 1) * SECTOR_SIZE {
        return Err(BuildError::invalid_format(
            "image smaller than its volume descriptors",
        ));
    }
    let pvd = &data[PVD_SECTOR * SECTOR_SIZE..(PVD_SECTOR + 1) * SECTOR_SIZE];
    if pvd[0] != 1 || &pvd[1..6] != b"CD001" || pvd[6] != 1 {
        return Err(BuildError::invalid_format(
            "missing primary volume descriptor",
        ));
    }
    let block_size = u16::from_le_bytes([pvd[128], pvd[129]]);
    if usize::from(block_size) != SECTOR_SIZE {
        return Err(BuildError::invalid_format(format!(
            "unsupported logical block size {block_size}"
        )));
    }
    let volume_id = String::from_utf8_lossy(&pvd[40..72]).trim_end().to_owned();
    let volume_sectors = u32::from_le_bytes([pvd[80], pvd[81], pvd[82], pvd[83]]);
    let root_extent = u32::from_le_bytes([pvd[158], pvd[159], pvd[160], pvd[161]]);
    let root_size = u32::from_le_bytes([pvd[166], pvd[167], pvd[168], pvd[169]]);

    let dir_start = root_extent as usize * SECTOR_SIZE;
    let dir_end = dir_start
        .checked_add(root_size as usize)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| BuildError::invalid_format("root directory extent out of bounds"))?;

    let mut files = Vec::new();
    let mut sector_at = dir_start;
    while sector_at < dir_end {
        let sector = &data[sector_at..dir_end.min(sector_at + SECTOR_SIZE)];
        let mut pos = 0usize;
        while pos < sector.len() {
            let len_dr = usize::from(sector[pos]);
            if len_dr == 0 {
                // Rest of the sector is padding.
                break;
            }
            if pos + len_dr > sector.len() || len_dr < 34 {
                return Err(BuildError::invalid_format(
                    "directory record crosses a sector boundary",
                ));
            }
            let record = &sector[pos..pos + len_dr];
            let len_fi = usize::from(record[32]);
            if 33 + len_fi > len_dr {
                return Err(BuildError::invalid_format(
                    "directory record identifier overruns the record",
                ));
            }
            let identifier = &record[33..33 + len_fi];
            let flags = record[25];
            let is_special = len_fi == 1 && (identifier[0] == 0x00 || identifier[0] == 0x01);
            if flags & 0x02 == 0 && !is_special {
                let extent =
                    u32::from_le_bytes([record[2], record[3], record[4], record[5]]);
                let size = u32::from_le_bytes([record[10], record[11], record[12], record[13]]);
                let raw = std::str::from_utf8(identifier).map_err(|_| {
                    BuildError::invalid_format("file identifier is not valid UTF-8")
                })?;
                let name = raw.split(';').next().unwrap_or(raw).to_owned();
                files.push(IsoEntry {
                    name,
                    offset: u64::from(extent) * SECTOR_SIZE as u64,
                    size,
                });
            }
            pos += len_dr;
        }
        sector_at += SECTOR_SIZE;
    }
    Ok(IsoContents {
        volume_id,
        volume_sectors,
        files,
    })
}

/// Checks a name against the 8.3 interchange level 1 rules.
pub fn validate_file_name(name: &str) -> BuildResult<()> {
    let valid = match name.split_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && stem.len() <= 8
                && !ext.is_empty()
                && ext.len() <= 3
                && stem.bytes().all(is_d_char)
                && ext.bytes().all(is_d_char)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(PackagingError::InvalidFileName {
            name: name.to_owned(),
        }
        .into())
    }
}

const fn is_d_char(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit() || byte == b'_'
}

fn sector_mut(image: &mut [u8], sector: usize) -> &mut [u8] {
    &mut image[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE]
}

fn fill_spaces(field: &mut [u8]) {
    field.fill(b' ');
}

fn both_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
    buf[at + 2..at + 4].copy_from_slice(&value.to_be_bytes());
}

fn both_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    buf[at + 4..at + 8].copy_from_slice(&value.to_be_bytes());
}

/// Builds one directory record; `identifier` is raw bytes so the special
/// `0x00`/`0x01` names can be expressed.
fn dir_record(extent: u32, size: u32, flags: u8, identifier: &[u8]) -> Vec<u8> {
    let len_fi = identifier.len();
    let pad = usize::from(len_fi % 2 == 0);
    let len_dr = 33 + len_fi + pad;
    let mut record = vec![0u8; len_dr];
    record[0] = len_dr as u8;
    both_u32(&mut record, 2, extent);
    both_u32(&mut record, 10, size);
    record[25] = flags;
    both_u16(&mut record, 28, 1);
    record[32] = len_fi as u8;
    record[33..33 + len_fi].copy_from_slice(identifier);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_file_image() -> Vec<u8> {
        let mut writer = IsoWriter::new("TESTVOL").unwrap();
        writer.add_file("MTOC.SDL", b"descriptor bytes".to_vec()).unwrap();
        writer.add_file("R000.SDP", vec![0xA5; 5000]).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn descriptors_are_where_readers_expect() {
        let image = two_file_image();
        assert_eq!(&image[PVD_SECTOR * SECTOR_SIZE + 1..PVD_SECTOR * SECTOR_SIZE + 6], b"CD001");
        assert_eq!(image[TERMINATOR_SECTOR * SECTOR_SIZE], 255);
        // Both-endian volume space size must agree with itself.
        let at = PVD_SECTOR * SECTOR_SIZE + 80;
        let le = u32::from_le_bytes([image[at], image[at + 1], image[at + 2], image[at + 3]]);
        let be = u32::from_be_bytes([image[at + 4], image[at + 5], image[at + 6], image[at + 7]]);
        assert_eq!(le, be);
        assert_eq!(image.len(), le as usize * SECTOR_SIZE);
    }

    #[test]
    fn files_read_back_with_contents() {
        let image = two_file_image();
        let contents = read_image(&image).unwrap();
        assert_eq!(contents.volume_id, "TESTVOL");
        let names: Vec<&str> = contents.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["MTOC.SDL", "R000.SDP"]);
        let mtoc = &contents.files[0];
        let at = mtoc.offset as usize;
        assert_eq!(&image[at..at + mtoc.size as usize], b"descriptor bytes");
        let payload = &contents.files[1];
        assert_eq!(payload.size, 5000);
        assert!(payload.offset % SECTOR_SIZE as u64 == 0);
    }

    #[test]
    fn names_sort_bytewise_regardless_of_insertion() {
        let mut writer = IsoWriter::new("V").unwrap();
        writer.add_file("ZULU.BIN", vec![1]).unwrap();
        writer.add_file("ALPHA.BIN", vec![2]).unwrap();
        writer.add_file("M.X", vec![3]).unwrap();
        let contents = read_image(&writer.finish().unwrap()).unwrap();
        let names: Vec<&str> = contents.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ALPHA.BIN", "M.X", "ZULU.BIN"]);
    }

    #[test]
    fn image_bytes_are_deterministic() {
        assert_eq!(two_file_image(), two_file_image());
    }

    #[test]
    fn large_directory_spans_sectors_cleanly() {
        let mut writer = IsoWriter::new("MANY").unwrap();
        for i in 0..120 {
            writer.add_file(&format!("F{i:06}.DAT"), vec![i as u8; 10]).unwrap();
        }
        let image = writer.finish().unwrap();
        let contents = read_image(&image).unwrap();
        assert_eq!(contents.files.len(), 120);
        // Every record was parsed without tripping the boundary check, and
        // every file's extent holds its own bytes.
        for (i, entry) in contents.files.iter().enumerate() {
            let at = entry.offset as usize;
            assert_eq!(image[at], i as u8);
        }
    }

    #[test]
    fn bad_file_names_rejected() {
        let mut writer = IsoWriter::new("V").unwrap();
        for name in [
            "lower.sdp",
            "NO_EXTENSION",
            "WAYTOOLONG.SDP",
            "R.TOOLONG",
            "SPA CE.SDP",
            "TWO.DOT.SDP",
            ".SDP",
            "R000.",
        ] {
            assert!(writer.add_file(name, Vec::new()).is_err(), "{name} accepted");
        }
    }

    #[test]
    fn duplicate_file_names_rejected() {
        let mut writer = IsoWriter::new("V").unwrap();
        writer.add_file("SAME.SDP", vec![1]).unwrap();
        let err = writer.add_file("SAME.SDP", vec![2]).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Packaging(PackagingError::DuplicateFileName { .. })
        ));
    }

    #[test]
    fn bad_volume_ids_rejected() {
        assert!(IsoWriter::new("").is_err());
        assert!(IsoWriter::new("lower").is_err());
        assert!(IsoWriter::new(&"A".repeat(33)).is_err());
        assert!(IsoWriter::new("WITH SPACE").is_err());
        assert!(IsoWriter::new("SDAL_IMAGE").is_ok());
    }
}
