//! Whole-image validation.
//!
//! The validator re-reads a finished image the way a head unit would:
//! volume descriptors, the global descriptor, every region directory,
//! every parcel, every record, and both indexes. It never stops at the
//! first problem; each check appends a [`Finding`] and the walk continues
//! with whatever structure is still readable, so one report describes all
//! the damage an image carries.

use crate::descriptor::{Descriptor, DESCRIPTOR_FILE_NAME};
use crate::directory::{parse_region, ParsedRegion};
use crate::error::BuildError;
use crate::iso::{self, SECTOR_SIZE};
use crate::parcel::decode_parcel;
use crate::spatial::SpatialIndex;
use crate::types::{Locator, ParcelFamily};
use crate::wayindex::{scan_for_way, WayIndex};
use sdal_codec::{
    CartoRoad, FrameIter, GeometryPoint, NameDictionary, NameId, NavRoad, OverlayRecord,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Broad class of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FindingKind {
    /// Volume or container layout is wrong.
    Structure,
    /// Directory bookkeeping disagrees with the data it describes.
    Directory,
    /// Stored bytes fail their integrity checks.
    Integrity,
    /// A payload or record does not decode.
    Decode,
    /// An index entry or lookup is inconsistent with the records.
    Index,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Structure => "structure",
            Self::Directory => "directory",
            Self::Integrity => "integrity",
            Self::Decode => "decode",
            Self::Index => "index",
        };
        f.write_str(name)
    }
}

/// One problem found in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// What class of check failed.
    pub kind: FindingKind,
    /// Where in the image the problem sits.
    pub context: String,
    /// What exactly is wrong.
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.context, self.message)
    }
}

/// Volume counters gathered during a validation walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    /// Regions visited.
    pub regions: usize,
    /// Parcels visited.
    pub parcels: usize,
    /// Record frames decoded.
    pub records: u64,
}

/// Outcome of [`validate_image`].
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    findings: Vec<Finding>,
    /// Counters over everything the walk reached.
    pub stats: ValidationStats,
}

impl ValidationReport {
    /// Whether no findings were recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// All findings in discovery order.
    #[must_use]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// The first finding, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Finding> {
        self.findings.first()
    }

    fn push(&mut self, kind: FindingKind, context: &str, message: impl Into<String>) {
        self.findings.push(Finding {
            kind,
            context: context.to_owned(),
            message: message.into(),
        });
    }
}

/// Validates a complete image, accumulating every finding.
#[must_use]
pub fn validate_image(image: &[u8]) -> ValidationReport {
    let mut report = ValidationReport::default();

    let contents = match iso::read_image(image) {
        Ok(contents) => contents,
        Err(e) => {
            report.push(FindingKind::Structure, "image", e.to_string());
            return report;
        }
    };
    let terminator_at = 17 * SECTOR_SIZE;
    if image.len() < terminator_at + SECTOR_SIZE
        || image[terminator_at] != 255
        || &image[terminator_at + 1..terminator_at + 6] != b"CD001"
    {
        report.push(
            FindingKind::Structure,
            "image",
            "volume descriptor set terminator missing",
        );
    }
    if contents.volume_sectors as usize * SECTOR_SIZE != image.len() {
        report.push(
            FindingKind::Structure,
            "image",
            format!(
                "volume space size says {} sectors, image holds {} bytes",
                contents.volume_sectors,
                image.len()
            ),
        );
    }

    let mut file_bytes: BTreeMap<&str, &[u8]> = BTreeMap::new();
    for entry in &contents.files {
        let context = format!("file {}", entry.name);
        let start = entry.offset as usize;
        let Some(end) = start
            .checked_add(entry.size as usize)
            .filter(|&end| end <= image.len())
        else {
            report.push(
                FindingKind::Structure,
                &context,
                "extent reaches past the end of the image",
            );
            continue;
        };
        if file_bytes.insert(&entry.name, &image[start..end]).is_some() {
            report.push(FindingKind::Directory, &context, "duplicate root entry");
        }
    }

    let Some(descriptor_bytes) = file_bytes.get(DESCRIPTOR_FILE_NAME) else {
        report.push(
            FindingKind::Structure,
            "image",
            format!("{DESCRIPTOR_FILE_NAME} missing from the root directory"),
        );
        return report;
    };
    let descriptor = match Descriptor::decode(descriptor_bytes) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            report.push(FindingKind::Structure, "descriptor", e.to_string());
            return report;
        }
    };

    let referenced: BTreeSet<&str> = descriptor
        .regions
        .iter()
        .map(|r| r.file_name.as_str())
        .collect();
    for entry in &contents.files {
        if entry.name != DESCRIPTOR_FILE_NAME && !referenced.contains(entry.name.as_str()) {
            report.push(
                FindingKind::Directory,
                &format!("file {}", entry.name),
                "not referenced by the descriptor",
            );
        }
    }

    for summary in &descriptor.regions {
        report.stats.regions += 1;
        let context = format!("region {}", summary.name);
        let Some(payload) = file_bytes.get(summary.file_name.as_str()).copied() else {
            report.push(
                FindingKind::Directory,
                &context,
                format!("payload file {} missing from the image", summary.file_name),
            );
            continue;
        };
        if payload.len() as u64 != summary.payload_size {
            report.push(
                FindingKind::Directory,
                &context,
                format!(
                    "descriptor says {} bytes, file holds {}",
                    summary.payload_size,
                    payload.len()
                ),
            );
        }
        let parsed = match parse_region(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                report.push(FindingKind::Structure, &context, e.to_string());
                continue;
            }
        };
        if parsed.name != summary.name {
            report.push(
                FindingKind::Directory,
                &context,
                format!("payload names itself {:?}", parsed.name),
            );
        }
        check_region(payload, &parsed, &descriptor.names, &context, &mut report);
    }
    report
}

fn check_region(
    payload: &[u8],
    parsed: &ParsedRegion,
    names: &NameDictionary,
    context: &str,
    report: &mut ValidationReport,
) {
    if let Some(first) = parsed.entries.first() {
        if first.offset < parsed.stream_start {
            report.push(
                FindingKind::Directory,
                context,
                "first parcel overlaps the directory",
            );
        }
    }
    for pair in parsed.entries.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if (b.family, b.sequence) <= (a.family, a.sequence) {
            report.push(
                FindingKind::Directory,
                context,
                format!(
                    "directory not sorted at {} parcel {}",
                    b.family,
                    b.sequence.as_u32()
                ),
            );
        }
        if b.offset < a.offset + u64::from(a.stored_len) {
            report.push(
                FindingKind::Directory,
                context,
                format!(
                    "{} parcel {} overlaps its predecessor",
                    b.family,
                    b.sequence.as_u32()
                ),
            );
        }
    }

    let mut frames: BTreeMap<(ParcelFamily, u32), BTreeSet<u32>> = BTreeMap::new();
    let mut payloads: BTreeMap<(ParcelFamily, u32), Vec<u8>> = BTreeMap::new();
    let mut spatial_records: Vec<(GeometryPoint, Locator)> = Vec::new();
    let mut nav_records: Vec<(u64, Locator)> = Vec::new();
    let mut last_way: Option<u64> = None;
    let mut spatial_blob: Option<Vec<u8>> = None;
    let mut way_blob: Option<Vec<u8>> = None;

    for entry in &parsed.entries {
        report.stats.parcels += 1;
        let pcontext = format!(
            "{context}, {} parcel {}",
            entry.family,
            entry.sequence.as_u32()
        );
        let stored = match entry.slice(payload) {
            Ok(stored) => stored,
            Err(e) => {
                report.push(FindingKind::Directory, &pcontext, e.to_string());
                continue;
            }
        };
        let mut pos = 0usize;
        let (header, parcel_payload) = match decode_parcel(stored, &mut pos) {
            Ok(decoded) => decoded,
            Err(e) => {
                report.push(decode_error_kind(&e), &pcontext, e.to_string());
                continue;
            }
        };
        if pos != stored.len() {
            report.push(
                FindingKind::Integrity,
                &pcontext,
                format!("{} trailing bytes inside the stored parcel", stored.len() - pos),
            );
        }
        if header.family != entry.family || header.sequence != entry.sequence {
            report.push(
                FindingKind::Integrity,
                &pcontext,
                format!(
                    "parcel header says {} parcel {}",
                    header.family,
                    header.sequence.as_u32()
                ),
            );
        }
        if header.crc != entry.crc {
            report.push(
                FindingKind::Integrity,
                &pcontext,
                "directory checksum disagrees with the parcel header",
            );
        }

        match entry.family {
            ParcelFamily::SpatialIndex | ParcelFamily::WayIndex => {
                if entry.sequence.as_u32() != 0 {
                    report.push(
                        FindingKind::Directory,
                        &pcontext,
                        "index family must hold one parcel at sequence 0",
                    );
                }
                let slot = if entry.family == ParcelFamily::SpatialIndex {
                    &mut spatial_blob
                } else {
                    &mut way_blob
                };
                if slot.is_some() {
                    report.push(FindingKind::Directory, &pcontext, "duplicate index parcel");
                } else {
                    *slot = Some(parcel_payload);
                }
            }
            _ => {
                let offsets = decode_data_records(
                    entry.family,
                    entry.sequence.as_u32(),
                    &parcel_payload,
                    names,
                    &pcontext,
                    report,
                    &mut spatial_records,
                    &mut nav_records,
                    &mut last_way,
                );
                frames.insert((entry.family, entry.sequence.as_u32()), offsets);
                payloads.insert((entry.family, entry.sequence.as_u32()), parcel_payload);
            }
        }
    }

    check_spatial_index(spatial_blob, &frames, &spatial_records, context, report);
    check_way_index(way_blob, &frames, &payloads, &nav_records, context, report);
}

#[allow(clippy::too_many_arguments)]
fn decode_data_records(
    family: ParcelFamily,
    sequence: u32,
    parcel_payload: &[u8],
    names: &NameDictionary,
    pcontext: &str,
    report: &mut ValidationReport,
    spatial_records: &mut Vec<(GeometryPoint, Locator)>,
    nav_records: &mut Vec<(u64, Locator)>,
    last_way: &mut Option<u64>,
) -> BTreeSet<u32> {
    let mut offsets = BTreeSet::new();
    for item in FrameIter::new(parcel_payload) {
        let (offset, body) = match item {
            Ok(frame) => frame,
            Err(e) => {
                report.push(FindingKind::Decode, pcontext, e.to_string());
                break;
            }
        };
        report.stats.records += 1;
        offsets.insert(offset);
        let locator = Locator::new(family, crate::types::ParcelSeq::new(sequence), offset);
        match family {
            ParcelFamily::Cartographic => match CartoRoad::decode_body(body) {
                Ok(road) => {
                    check_name(road.name, names, pcontext, report);
                    spatial_records.push((road.representative(), locator));
                }
                Err(e) => report.push(FindingKind::Decode, pcontext, e.to_string()),
            },
            ParcelFamily::Navigable => match NavRoad::decode_body(body) {
                Ok(road) => {
                    check_name(road.name, names, pcontext, report);
                    if let Some(prev) = *last_way {
                        if road.way_id <= prev {
                            report.push(
                                FindingKind::Index,
                                pcontext,
                                format!("way {} not above its predecessor {prev}", road.way_id),
                            );
                        }
                    }
                    *last_way = Some(road.way_id);
                    nav_records.push((road.way_id, locator));
                }
                Err(e) => report.push(FindingKind::Decode, pcontext, e.to_string()),
            },
            ParcelFamily::Overlay => match OverlayRecord::decode_body(body) {
                Ok(record) => {
                    if let OverlayRecord::Poi(poi) = &record {
                        check_name(poi.name, names, pcontext, report);
                    }
                    spatial_records.push((record.representative(), locator));
                }
                Err(e) => report.push(FindingKind::Decode, pcontext, e.to_string()),
            },
            ParcelFamily::SpatialIndex | ParcelFamily::WayIndex => {}
        }
    }
    offsets
}

fn check_name(
    name: Option<NameId>,
    names: &NameDictionary,
    pcontext: &str,
    report: &mut ValidationReport,
) {
    if let Some(id) = name {
        if names.resolve(id).is_none() {
            report.push(
                FindingKind::Decode,
                pcontext,
                format!("{id} not present in the dictionary"),
            );
        }
    }
}

fn frame_exists(frames: &BTreeMap<(ParcelFamily, u32), BTreeSet<u32>>, locator: Locator) -> bool {
    frames
        .get(&(locator.family, locator.sequence.as_u32()))
        .is_some_and(|set| set.contains(&locator.offset))
}

fn check_spatial_index(
    blob: Option<Vec<u8>>,
    frames: &BTreeMap<(ParcelFamily, u32), BTreeSet<u32>>,
    spatial_records: &[(GeometryPoint, Locator)],
    context: &str,
    report: &mut ValidationReport,
) {
    let Some(blob) = blob else {
        report.push(FindingKind::Index, context, "spatial index parcel missing");
        return;
    };
    let index = match SpatialIndex::decode(&blob) {
        Ok(index) => index,
        Err(e) => {
            report.push(FindingKind::Index, context, e.to_string());
            return;
        }
    };
    let mut leaf_counts: BTreeMap<Locator, usize> = BTreeMap::new();
    for locator in index.locators() {
        *leaf_counts.entry(locator).or_insert(0) += 1;
        if !frame_exists(frames, locator) {
            report.push(
                FindingKind::Index,
                context,
                format!("spatial entry {locator} does not point at a record frame"),
            );
        }
    }
    for (locator, count) in &leaf_counts {
        if *count > 1 {
            report.push(
                FindingKind::Index,
                context,
                format!("spatial entry {locator} stored in {count} leaves"),
            );
        }
    }
    for &(point, locator) in spatial_records {
        let hits = index.lookup(point);
        let count = hits.iter().filter(|&&hit| hit == locator).count();
        if count != 1 {
            report.push(
                FindingKind::Index,
                context,
                format!("record {locator} appears {count} times in its covering leaf"),
            );
        }
    }
}

fn check_way_index(
    blob: Option<Vec<u8>>,
    frames: &BTreeMap<(ParcelFamily, u32), BTreeSet<u32>>,
    payloads: &BTreeMap<(ParcelFamily, u32), Vec<u8>>,
    nav_records: &[(u64, Locator)],
    context: &str,
    report: &mut ValidationReport,
) {
    let Some(blob) = blob else {
        report.push(FindingKind::Index, context, "way index parcel missing");
        return;
    };
    let index = match WayIndex::decode(&blob) {
        Ok(index) => index,
        Err(e) => {
            report.push(FindingKind::Index, context, e.to_string());
            return;
        }
    };
    if index.record_count() != nav_records.len() as u64 {
        report.push(
            FindingKind::Index,
            context,
            format!(
                "way index covers {} records, the family holds {}",
                index.record_count(),
                nav_records.len()
            ),
        );
    }
    let mut prev: Option<u64> = None;
    for entry in index.entries() {
        if let Some(p) = prev {
            if entry.way_id <= p {
                report.push(
                    FindingKind::Index,
                    context,
                    format!("index key {} not above its predecessor {p}", entry.way_id),
                );
            }
        }
        prev = Some(entry.way_id);
        if !frame_exists(frames, entry.locator) {
            report.push(
                FindingKind::Index,
                context,
                format!(
                    "way entry {} does not point at a record frame",
                    entry.way_id
                ),
            );
        }
    }
    for &(way_id, locator) in nav_records {
        let Some(start) = index.locate(way_id) else {
            report.push(
                FindingKind::Index,
                context,
                format!("way {way_id} has no preceding index entry"),
            );
            continue;
        };
        if start.family != locator.family || start.sequence != locator.sequence {
            report.push(
                FindingKind::Index,
                context,
                format!("way {way_id} resolves into the wrong parcel"),
            );
            continue;
        }
        let Some(parcel_payload) = payloads.get(&(locator.family, locator.sequence.as_u32()))
        else {
            continue;
        };
        match scan_for_way(parcel_payload, start.offset, way_id) {
            Ok(Some(offset)) if offset == locator.offset => {}
            Ok(_) => report.push(
                FindingKind::Index,
                context,
                format!("way {way_id} not reachable by scan from its index entry"),
            ),
            Err(e) => report.push(FindingKind::Decode, context, e.to_string()),
        }
    }
}

fn decode_error_kind(error: &BuildError) -> FindingKind {
    match error {
        BuildError::ChecksumMismatch { .. } => FindingKind::Integrity,
        BuildError::InvalidFormat { .. } => FindingKind::Structure,
        _ => FindingKind::Decode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::iso::IsoWriter;
    use crate::spatial::SpatialIndexBuilder;
    use crate::types::ParcelSeq;

    #[test]
    fn garbage_is_a_structure_finding() {
        let report = validate_image(&[0u8; 4096]);
        assert!(!report.is_clean());
        assert_eq!(report.findings()[0].kind, FindingKind::Structure);
    }

    #[test]
    fn missing_descriptor_is_reported() {
        let mut writer = IsoWriter::new("NODESC").unwrap();
        writer.add_file("OTHER.BIN", vec![1, 2, 3]).unwrap();
        let report = validate_image(&writer.finish().unwrap());
        assert!(report
            .findings()
            .iter()
            .any(|f| f.kind == FindingKind::Structure
                && f.message.contains(DESCRIPTOR_FILE_NAME)));
    }

    #[test]
    fn duplicated_spatial_entry_is_reported() {
        // The same locator filed under two far-apart points lands in two
        // leaves; each record must be stored exactly once.
        let locator = Locator::new(ParcelFamily::Cartographic, ParcelSeq::new(0), 0);
        let near = GeometryPoint::new(-500_000_000, -500_000_000);
        let far = GeometryPoint::new(500_000_000, 500_000_000);
        let config = BuildConfig::new()
            .spatial_grid_depth(1)
            .spatial_leaf_capacity(1);
        let index = SpatialIndexBuilder::new(&config).build(&[(near, locator), (far, locator)]);

        let mut frames: BTreeMap<(ParcelFamily, u32), BTreeSet<u32>> = BTreeMap::new();
        frames.insert((ParcelFamily::Cartographic, 0), BTreeSet::from([0]));
        let mut report = ValidationReport::default();
        check_spatial_index(
            Some(index.encode()),
            &frames,
            &[(near, locator)],
            "region test",
            &mut report,
        );
        assert!(report
            .findings()
            .iter()
            .any(|f| f.kind == FindingKind::Index && f.message.contains("leaves")));
    }

    #[test]
    fn findings_render_with_kind_and_context() {
        let finding = Finding {
            kind: FindingKind::Integrity,
            context: "region metro, cartographic parcel 2".to_owned(),
            message: "checksum mismatch".to_owned(),
        };
        assert_eq!(
            finding.to_string(),
            "[integrity] region metro, cartographic parcel 2: checksum mismatch"
        );
    }
}
