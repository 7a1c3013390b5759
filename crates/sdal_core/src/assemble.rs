//! Image assembly: region payloads into a finished disc image.
//!
//! The assembler is the last stage of a build. Regions arrive as sealed
//! parcel sets, become payload files with a leading parcel directory, and
//! are mastered together with the global descriptor into one ISO-9660
//! image. Payload file names are derived from region names under the 8.3
//! interchange rules; a region whose name cannot be shortened without
//! colliding with another is a packaging error, not something to silently
//! rename.

use crate::config::BuildConfig;
use crate::descriptor::{Descriptor, RegionSummary, DESCRIPTOR_FILE_NAME};
use crate::directory::assemble_region;
use crate::error::{BuildResult, PackagingError};
use crate::iso::IsoWriter;
use crate::parcel::SealedParcel;
use sdal_codec::NameDictionary;

/// Extension shared by every payload file on the image.
const PAYLOAD_EXTENSION: &str = "SDL";

/// Derives the on-image payload file name for a region.
///
/// Keeps the ASCII alphanumerics and underscores of the region name,
/// uppercased and truncated to the 8-character stem limit; other characters
/// are dropped. A name with nothing usable gets a positional `R###` stem.
#[must_use]
pub fn region_file_name(region_name: &str, position: usize) -> String {
    let stem: String = region_name
        .chars()
        .filter_map(|c| match c {
            'a'..='z' => Some(c.to_ascii_uppercase()),
            'A'..='Z' | '0'..='9' | '_' => Some(c),
            _ => None,
        })
        .take(8)
        .collect();
    if stem.is_empty() {
        format!("R{position:03}.{PAYLOAD_EXTENSION}")
    } else {
        format!("{stem}.{PAYLOAD_EXTENSION}")
    }
}

/// Collects region payloads and masters the final image.
#[derive(Debug)]
pub struct ImageAssembler {
    volume_id: String,
    capacity: u64,
    regions: Vec<RegionSummary>,
    payloads: Vec<Vec<u8>>,
}

impl ImageAssembler {
    /// Creates an assembler with the configured volume id and capacity.
    #[must_use]
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            volume_id: config.volume_id.clone(),
            capacity: config.target_capacity_bytes,
            regions: Vec::new(),
            payloads: Vec::new(),
        }
    }

    /// Adds one region's sealed parcels, in image order.
    pub fn push_region(&mut self, name: &str, parcels: &[SealedParcel]) -> BuildResult<()> {
        let file_name = region_file_name(name, self.regions.len());
        if self.regions.iter().any(|r| r.file_name == file_name) {
            return Err(PackagingError::DuplicateFileName { name: file_name }.into());
        }
        let payload = assemble_region(name, parcels)?;
        tracing::info!(
            region = name,
            file = %file_name,
            parcels = parcels.len(),
            bytes = payload.len(),
            "assembled region payload"
        );
        self.regions.push(RegionSummary {
            name: name.to_owned(),
            file_name,
            payload_size: payload.len() as u64,
        });
        self.payloads.push(payload);
        Ok(())
    }

    /// Writes the descriptor and masters everything into image bytes.
    pub fn finish(self, names: NameDictionary) -> BuildResult<Vec<u8>> {
        let descriptor = Descriptor {
            regions: self.regions,
            names,
        };
        let mut writer = IsoWriter::new(&self.volume_id)?;
        writer.add_file(DESCRIPTOR_FILE_NAME, descriptor.encode()?)?;
        for (summary, payload) in descriptor.regions.iter().zip(self.payloads) {
            writer.add_file(&summary.file_name, payload)?;
        }
        let image = writer.finish()?;
        if image.len() as u64 > self.capacity {
            return Err(PackagingError::CapacityExceeded {
                size: image.len() as u64,
                limit: self.capacity,
            }
            .into());
        }
        tracing::info!(
            regions = descriptor.regions.len(),
            bytes = image.len(),
            "mastered image"
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use crate::iso::read_image;
    use crate::parcel::seal_parcel;
    use crate::types::{ParcelFamily, ParcelSeq};
    use sdal_codec::write_frame;

    fn one_parcel() -> Vec<SealedParcel> {
        let mut payload = Vec::new();
        write_frame(&mut payload, b"record body");
        vec![seal_parcel(ParcelFamily::Cartographic, ParcelSeq::new(0), 1, &payload).unwrap()]
    }

    #[test]
    fn file_names_follow_region_names() {
        assert_eq!(region_file_name("metro west", 0), "METROWES.SDL");
        assert_eq!(region_file_name("Bay_Area", 3), "BAY_AREA.SDL");
        assert_eq!(region_file_name("東京", 2), "R002.SDL");
        assert_eq!(region_file_name("", 11), "R011.SDL");
    }

    #[test]
    fn image_lists_descriptor_and_payloads() {
        let mut assembler = ImageAssembler::new(&BuildConfig::new().volume_id("ASSEM"));
        assembler.push_region("metro", &one_parcel()).unwrap();
        assembler.push_region("rural", &one_parcel()).unwrap();
        let image = assembler.finish(NameDictionary::new()).unwrap();

        let contents = read_image(&image).unwrap();
        assert_eq!(contents.volume_id, "ASSEM");
        let names: Vec<&str> = contents.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["METRO.SDL", "MTOC.SDL", "RURAL.SDL"]);

        let mtoc = contents.files.iter().find(|f| f.name == "MTOC.SDL").unwrap();
        let at = mtoc.offset as usize;
        let descriptor = Descriptor::decode(&image[at..at + mtoc.size as usize]).unwrap();
        assert_eq!(descriptor.regions.len(), 2);
        assert_eq!(descriptor.regions[0].file_name, "METRO.SDL");
    }

    #[test]
    fn colliding_region_names_rejected() {
        let mut assembler = ImageAssembler::new(&BuildConfig::new());
        assembler.push_region("metro west", &one_parcel()).unwrap();
        let err = assembler.push_region("METRO WEST", &one_parcel()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Packaging(PackagingError::DuplicateFileName { .. })
        ));
    }

    #[test]
    fn capacity_limit_enforced() {
        let mut assembler =
            ImageAssembler::new(&BuildConfig::new().target_capacity_bytes(10 * 2048));
        assembler.push_region("metro", &one_parcel()).unwrap();
        let err = assembler.finish(NameDictionary::new()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Packaging(PackagingError::CapacityExceeded { .. })
        ));
    }
}
