//! The build pipeline: normalized input to finished image bytes.
//!
//! Stages run in a fixed order per region: one pass interns every name
//! into the build-global dictionary (the dictionary is frozen before any
//! packing starts), records are ordered and packed family by family, the
//! two indexes are built from the resulting locators, and the region
//! becomes a payload file. After the last region the image is mastered
//! and immediately re-validated; bytes that fail their own validation are
//! never returned.
//!
//! Cartographic and overlay records are packed in Morton order of their
//! representative point so records that are close on the map share
//! parcels; navigable records are packed in way-id order, which is what
//! makes the sparse way index's bounded forward scan work.

use crate::assemble::ImageAssembler;
use crate::config::BuildConfig;
use crate::density::DensityBuilder;
use crate::error::{BuildError, BuildResult};
use crate::input::{BuildInput, RegionInput};
use crate::parcel::{seal_parcel, ParcelPacker, SealedParcel};
use crate::spatial::SpatialIndexBuilder;
use crate::types::{Locator, ParcelFamily, ParcelSeq};
use crate::validate::validate_image;
use crate::wayindex::WayIndexBuilder;
use sdal_codec::{
    quantize, CartoRoad, GeometryPoint, NameDictionary, NameId, NavRoad, OverlayRecord, Poi,
};

/// Builds a complete disc image from normalized input.
///
/// This is the library entry point: every stage described in the module
/// docs runs inside, and the returned bytes have already passed
/// [`validate_image`] with an empty report.
pub fn build_image(input: &BuildInput, config: &BuildConfig) -> BuildResult<Vec<u8>> {
    config.validate()?;

    // Dictionary pass. Completing it before any packing is the barrier
    // that lets every family resolve names against one frozen id space.
    let mut names = NameDictionary::new();
    for region in &input.regions {
        for road in &region.roads {
            if let Some(name) = &road.name {
                names.intern(name);
            }
        }
        for poi in &region.pois {
            if let Some(name) = &poi.name {
                names.intern(name);
            }
        }
    }
    tracing::info!(
        regions = input.regions.len(),
        roads = input.road_count(),
        names = names.len(),
        "dictionary pass complete"
    );

    let mut assembler = ImageAssembler::new(config);
    for region in &input.regions {
        let parcels = build_region(region, &names, config)?;
        assembler.push_region(&region.name, &parcels)?;
    }
    let image = assembler.finish(names)?;

    let report = validate_image(&image);
    if !report.is_clean() {
        return Err(BuildError::SelfCheck {
            count: report.findings().len(),
            first: report
                .first()
                .map(ToString::to_string)
                .unwrap_or_default(),
        });
    }
    Ok(image)
}

fn build_region(
    region: &RegionInput,
    names: &NameDictionary,
    config: &BuildConfig,
) -> BuildResult<Vec<SealedParcel>> {
    let precision = config.coord_precision;
    let mut carto = Vec::with_capacity(region.roads.len());
    for road in &region.roads {
        if road.points.is_empty() {
            return Err(sdal_codec::CodecError::EmptyGeometry {
                way_id: road.way_id,
            }
            .into());
        }
        let mut points = Vec::with_capacity(road.points.len());
        for &(lat, lon) in &road.points {
            points.push(GeometryPoint::new(
                quantize("lat", lat, precision)?,
                quantize("lon", lon, precision)?,
            ));
        }
        carto.push(CartoRoad {
            way_id: road.way_id,
            attributes: road.attributes,
            name: resolve_name(names, road.name.as_deref())?,
            navigable: road.navigable,
            points,
        });
    }

    let mut overlay: Vec<(u64, OverlayRecord)> = Vec::with_capacity(region.pois.len());
    for poi in &region.pois {
        overlay.push((
            poi.poi_id,
            OverlayRecord::Poi(Poi {
                poi_id: poi.poi_id,
                category: poi.category,
                name: resolve_name(names, poi.name.as_deref())?,
                point: GeometryPoint::new(
                    quantize("lat", poi.lat, precision)?,
                    quantize("lon", poi.lon, precision)?,
                ),
            }),
        ));
    }
    let density = DensityBuilder::new(config);
    if density.enabled() {
        let polylines: Vec<&[GeometryPoint]> =
            carto.iter().map(|road| road.points.as_slice()).collect();
        for tile in density.build(&polylines) {
            let tile_id = u64::from(tile.zoom) << 48
                | u64::from(tile.tile_y) << 24
                | u64::from(tile.tile_x);
            overlay.push((tile_id, OverlayRecord::Density(tile)));
        }
    }

    // Spatial families go to disc in Morton order of the representative
    // point (the midpoint of the record's extent); navigable goes in
    // way-id order. Both sorts are stable, so ties keep input order and
    // rebuilds are byte-identical.
    carto.sort_by_key(|road| morton_key(road.representative()));
    overlay.sort_by_key(|(_, record)| morton_key(record.representative()));
    let mut nav: Vec<NavRoad> = carto
        .iter()
        .filter(|road| road.navigable)
        .map(|road| NavRoad {
            way_id: road.way_id,
            attributes: road.attributes,
            name: road.name,
            first: road.points[0],
            last: *road.points.last().unwrap_or(&road.points[0]),
        })
        .collect();
    nav.sort_by_key(|road| road.way_id);

    let mut spatial_entries: Vec<(GeometryPoint, Locator)> = Vec::new();
    let mut parcels = Vec::new();

    let mut packer = ParcelPacker::new(ParcelFamily::Cartographic, config);
    for road in &carto {
        let body = road.encode_body()?;
        let locator = packer.push_record(road.way_id, &body)?;
        spatial_entries.push((road.representative(), locator));
    }
    parcels.extend(packer.finish()?);

    let mut packer = ParcelPacker::new(ParcelFamily::Navigable, config);
    let mut nav_entries: Vec<(u64, Locator)> = Vec::with_capacity(nav.len());
    for road in &nav {
        let body = road.encode_body();
        let locator = packer.push_record(road.way_id, &body)?;
        nav_entries.push((road.way_id, locator));
    }
    parcels.extend(packer.finish()?);

    let mut packer = ParcelPacker::new(ParcelFamily::Overlay, config);
    for (record_id, record) in &overlay {
        let body = record.encode_body()?;
        let locator = packer.push_record(*record_id, &body)?;
        spatial_entries.push((record.representative(), locator));
    }
    parcels.extend(packer.finish()?);

    // Indexes are built only now, after every locator is final.
    let spatial = SpatialIndexBuilder::new(config).build(&spatial_entries);
    parcels.push(seal_parcel(
        ParcelFamily::SpatialIndex,
        ParcelSeq::new(0),
        1,
        &spatial.encode(),
    )?);
    let way = WayIndexBuilder::new(config).build(&nav_entries)?;
    parcels.push(seal_parcel(
        ParcelFamily::WayIndex,
        ParcelSeq::new(0),
        1,
        &way.encode(),
    )?);

    tracing::info!(
        region = %region.name,
        roads = carto.len(),
        navigable = nav.len(),
        overlay = overlay.len(),
        parcels = parcels.len(),
        "packed region"
    );
    Ok(parcels)
}

fn resolve_name(names: &NameDictionary, name: Option<&str>) -> BuildResult<Option<NameId>> {
    match name {
        None => Ok(None),
        Some(name) => names
            .get(name)
            .map(Some)
            .ok_or_else(|| BuildError::index(format!("name {name:?} missed the dictionary pass"))),
    }
}

/// Z-order key of a point; close points share high bits.
///
/// Coordinates are biased into unsigned space first so the key orders the
/// whole signed range; longitude takes the even bits.
#[must_use]
pub fn morton_key(point: GeometryPoint) -> u64 {
    let lat = (point.lat as u32) ^ 0x8000_0000;
    let lon = (point.lon as u32) ^ 0x8000_0000;
    spread(lon) | spread(lat) << 1
}

fn spread(value: u32) -> u64 {
    let mut v = u64::from(value);
    v = (v | v << 16) & 0x0000_FFFF_0000_FFFF;
    v = (v | v << 8) & 0x00FF_00FF_00FF_00FF;
    v = (v | v << 4) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | v << 2) & 0x3333_3333_3333_3333;
    v = (v | v << 1) & 0x5555_5555_5555_5555;
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{PoiInput, RoadInput};

    fn road(way_id: u64, name: Option<&str>, navigable: bool, points: &[(f64, f64)]) -> RoadInput {
        RoadInput {
            way_id,
            name: name.map(str::to_owned),
            attributes: 0,
            navigable,
            points: points.to_vec(),
        }
    }

    fn small_input() -> BuildInput {
        let mut region = RegionInput::new("metro");
        region.roads.push(road(
            10,
            Some("Main St"),
            true,
            &[(52.52, 13.40), (52.53, 13.41)],
        ));
        region.roads.push(road(
            20,
            Some("Oak Ave"),
            true,
            &[(52.51, 13.39), (52.50, 13.38)],
        ));
        region.pois.push(PoiInput {
            poi_id: 7,
            category: 3,
            name: Some("Main St".to_owned()),
            lat: 52.515,
            lon: 13.395,
        });
        let mut input = BuildInput::new();
        input.push_region(region);
        input
    }

    #[test]
    fn build_passes_its_own_validation() {
        let image = build_image(&small_input(), &BuildConfig::new()).unwrap();
        assert!(validate_image(&image).is_clean());
    }

    #[test]
    fn builds_are_byte_identical() {
        let config = BuildConfig::new().density_zoom_levels(2);
        let a = build_image(&small_input(), &config).unwrap();
        let b = build_image(&small_input(), &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_range_coordinate_aborts() {
        let mut input = small_input();
        input.regions[0].roads[0].points[0] = (400.0, 13.40);
        let err = build_image(&input, &BuildConfig::new().coord_precision(7)).unwrap_err();
        assert!(matches!(err, BuildError::Encoding(_)));
    }

    #[test]
    fn duplicate_way_ids_abort() {
        let mut input = small_input();
        input.regions[0]
            .roads
            .push(road(10, None, true, &[(52.0, 13.0)]));
        let err = build_image(&input, &BuildConfig::new()).unwrap_err();
        assert!(matches!(err, BuildError::Index { .. }));
    }

    #[test]
    fn invalid_config_rejected_before_work() {
        let err = build_image(&small_input(), &BuildConfig::new().way_index_sparsity(0));
        assert!(matches!(err, Err(BuildError::InvalidConfig { .. })));
    }

    #[test]
    fn morton_key_orders_neighbors_together() {
        let near_a = morton_key(GeometryPoint::new(1000, 1000));
        let near_b = morton_key(GeometryPoint::new(1001, 1001));
        let far = morton_key(GeometryPoint::new(1_000_000, 1_000_000));
        assert!(near_a.abs_diff(near_b) < near_a.abs_diff(far));
    }

    #[test]
    fn morton_key_handles_signed_range() {
        // Biasing must keep west-of-meridian points below east-of-meridian
        // ones at equal latitude.
        let west = morton_key(GeometryPoint::new(0, -10));
        let east = morton_key(GeometryPoint::new(0, 10));
        assert!(west < east);
    }
}
