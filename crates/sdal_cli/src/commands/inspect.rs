//! Inspect command implementation.

use sdal_core::{parse_region, read_image, Descriptor, ParcelFamily, DESCRIPTOR_FILE_NAME};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Image inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Volume identifier from the primary volume descriptor.
    pub volume_id: String,
    /// Volume space size in sectors.
    pub volume_sectors: u32,
    /// Image size in bytes.
    pub image_size: u64,
    /// Number of entries in the shared name dictionary.
    pub name_count: usize,
    /// Per-region statistics in image order.
    pub regions: Vec<RegionStats>,
}

/// Statistics for a single region.
#[derive(Debug, Serialize)]
pub struct RegionStats {
    /// Region name from the descriptor.
    pub name: String,
    /// Payload file name in the image root.
    pub file_name: String,
    /// Payload file size in bytes.
    pub payload_size: u64,
    /// Per-family parcel counts and stored sizes.
    pub families: Vec<FamilyStats>,
}

/// Parcel statistics for one family within a region.
#[derive(Debug, Serialize)]
pub struct FamilyStats {
    /// Family name.
    pub family: String,
    /// Number of parcels.
    pub parcels: usize,
    /// Stored bytes across all parcels of the family.
    pub stored_bytes: u64,
}

/// Runs the inspect command.
pub fn run(image_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let image = fs::read(image_path)?;
    let result = inspect(&image)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }

    Ok(())
}

fn inspect(image: &[u8]) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let contents = read_image(image)?;
    let descriptor_entry = contents
        .files
        .iter()
        .find(|f| f.name == DESCRIPTOR_FILE_NAME)
        .ok_or_else(|| format!("{DESCRIPTOR_FILE_NAME} missing from the root directory"))?;
    let at = descriptor_entry.offset as usize;
    let descriptor = Descriptor::decode(&image[at..at + descriptor_entry.size as usize])?;

    let mut regions = Vec::new();
    for summary in &descriptor.regions {
        let entry = contents
            .files
            .iter()
            .find(|f| f.name == summary.file_name)
            .ok_or_else(|| format!("payload file {} missing", summary.file_name))?;
        let start = entry.offset as usize;
        let parsed = parse_region(&image[start..start + entry.size as usize])?;

        let order = [
            ParcelFamily::Cartographic,
            ParcelFamily::Navigable,
            ParcelFamily::Overlay,
            ParcelFamily::SpatialIndex,
            ParcelFamily::WayIndex,
        ];
        let families = order
            .iter()
            .map(|&family| {
                let rows = parsed.entries.iter().filter(|e| e.family == family);
                FamilyStats {
                    family: family.to_string(),
                    parcels: rows.clone().count(),
                    stored_bytes: rows.map(|e| u64::from(e.stored_len)).sum(),
                }
            })
            .filter(|stats| stats.parcels > 0)
            .collect();

        regions.push(RegionStats {
            name: summary.name.clone(),
            file_name: summary.file_name.clone(),
            payload_size: summary.payload_size,
            families,
        });
    }

    Ok(InspectResult {
        volume_id: contents.volume_id,
        volume_sectors: contents.volume_sectors,
        image_size: image.len() as u64,
        name_count: descriptor.names.len(),
        regions,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("SDAL Image Inspection");
    println!("=====================");
    println!();
    println!("Volume: {}", result.volume_id);
    println!(
        "  Size:    {} sectors, {} bytes",
        result.volume_sectors, result.image_size
    );
    println!("  Names:   {} dictionary entries", result.name_count);
    println!("  Regions: {}", result.regions.len());

    for region in &result.regions {
        println!();
        println!(
            "Region {:?} ({}, {} bytes)",
            region.name, region.file_name, region.payload_size
        );
        for stats in &region.families {
            println!(
                "  {:<14} {} parcels, {} bytes stored",
                stats.family, stats.parcels, stats.stored_bytes
            );
        }
    }
}
