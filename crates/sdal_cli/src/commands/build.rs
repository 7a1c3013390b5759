//! Build command implementation.
//!
//! Reads a JSON extract, runs the full build pipeline, and writes the
//! image atomically: the bytes land in a temp file next to the target
//! and are renamed into place only after a successful sync, so a failed
//! or interrupted build never leaves a half-written image behind.

use fs2::FileExt;
use sdal_core::{build_image, BuildConfig, BuildInput, PoiInput, RegionInput, RoadInput};
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Optional configuration knobs exposed on the command line.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    /// Volume identifier stamped into the image.
    pub volume_id: Option<String>,
    /// Coordinate precision in decimal digits.
    pub precision: Option<u8>,
    /// Density overlay zoom levels.
    pub density_zooms: Option<u8>,
    /// Maximum uncompressed payload bytes per parcel.
    pub parcel_bytes: Option<usize>,
}

/// Top level of the JSON extract.
#[derive(Debug, Deserialize)]
struct Extract {
    regions: Vec<RegionDto>,
}

#[derive(Debug, Deserialize)]
struct RegionDto {
    name: String,
    #[serde(default)]
    roads: Vec<RoadDto>,
    #[serde(default)]
    pois: Vec<PoiDto>,
}

#[derive(Debug, Deserialize)]
struct RoadDto {
    way_id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    attributes: u32,
    #[serde(default = "default_navigable")]
    navigable: bool,
    /// Polyline vertices as [latitude, longitude] pairs in degrees.
    points: Vec<(f64, f64)>,
}

#[derive(Debug, Deserialize)]
struct PoiDto {
    poi_id: u64,
    #[serde(default)]
    category: u16,
    #[serde(default)]
    name: Option<String>,
    lat: f64,
    lon: f64,
}

fn default_navigable() -> bool {
    true
}

/// Runs the build command.
pub fn run(
    extract_path: &Path,
    out_path: &Path,
    overrides: &ConfigOverrides,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Reading extract from {:?}", extract_path);
    let raw = fs::read(extract_path)?;
    let extract: Extract = serde_json::from_slice(&raw)?;
    let input = to_build_input(extract);

    let config = apply_overrides(BuildConfig::new(), overrides);

    info!(
        "Building image from {} regions, {} roads",
        input.regions.len(),
        input.road_count()
    );
    let image = build_image(&input, &config)?;
    write_atomic(out_path, &image)?;

    println!("✓ Image written");
    println!("  Path: {:?}", out_path);
    println!("  Size: {} bytes", image.len());
    println!("  Regions: {}", input.regions.len());

    Ok(())
}

fn to_build_input(extract: Extract) -> BuildInput {
    let mut input = BuildInput::new();
    for region in extract.regions {
        let mut out = RegionInput::new(region.name);
        out.roads = region
            .roads
            .into_iter()
            .map(|r| RoadInput {
                way_id: r.way_id,
                name: r.name,
                attributes: r.attributes,
                navigable: r.navigable,
                points: r.points,
            })
            .collect();
        out.pois = region
            .pois
            .into_iter()
            .map(|p| PoiInput {
                poi_id: p.poi_id,
                category: p.category,
                name: p.name,
                lat: p.lat,
                lon: p.lon,
            })
            .collect();
        input.push_region(out);
    }
    input
}

fn apply_overrides(mut config: BuildConfig, overrides: &ConfigOverrides) -> BuildConfig {
    if let Some(id) = &overrides.volume_id {
        config = config.volume_id(id.clone());
    }
    if let Some(precision) = overrides.precision {
        config = config.coord_precision(precision);
    }
    if let Some(zooms) = overrides.density_zooms {
        config = config.density_zoom_levels(zooms);
    }
    if let Some(bytes) = overrides.parcel_bytes {
        config = config.max_parcel_payload(bytes);
    }
    config
}

/// Writes `bytes` to `path` through a temp file and rename.
///
/// A sibling lock file guards against two builds racing for the same
/// output path.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let lock_path = path.with_extension("lock");
    let lock_file = fs::File::create(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| format!("another build is writing {:?}", path))?;

    let tmp_path = path.with_extension("tmp");
    let result = (|| -> Result<(), Box<dyn std::error::Error>> {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    lock_file.unlock()?;
    let _ = fs::remove_file(&lock_path);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_fields_default_sensibly() {
        let json = r#"{
            "regions": [{
                "name": "metro",
                "roads": [
                    {"way_id": 10, "points": [[52.5, 13.4], [52.6, 13.5]]},
                    {"way_id": 20, "name": "Oak Ave", "attributes": 3,
                     "navigable": false, "points": [[52.5, 13.4]]}
                ],
                "pois": [{"poi_id": 7, "lat": 52.52, "lon": 13.41}]
            }]
        }"#;
        let extract: Extract = serde_json::from_str(json).unwrap();
        let input = to_build_input(extract);

        let region = &input.regions[0];
        assert_eq!(region.name, "metro");
        assert!(region.roads[0].navigable);
        assert_eq!(region.roads[0].attributes, 0);
        assert!(!region.roads[1].navigable);
        assert_eq!(region.pois[0].category, 0);
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("disc.iso");
        write_atomic(&out, b"image bytes").unwrap();

        assert_eq!(fs::read(&out).unwrap(), b"image bytes");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != out)
            .collect();
        assert!(leftovers.is_empty(), "leftovers: {leftovers:?}");
    }

    #[test]
    fn overrides_apply() {
        let overrides = ConfigOverrides {
            volume_id: Some("TEST_DISC".to_owned()),
            precision: Some(5),
            density_zooms: Some(2),
            parcel_bytes: Some(4096),
        };
        let config = apply_overrides(BuildConfig::new(), &overrides);
        assert_eq!(config.volume_id, "TEST_DISC");
        assert_eq!(config.coord_precision, 5);
        assert_eq!(config.density_zoom_levels, 2);
        assert_eq!(config.max_parcel_payload, 4096);
    }
}
