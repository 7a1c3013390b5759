//! End-to-end build and validation scenarios over the public API.

use sdal_codec::{CartoRoad, GeometryPoint, NavRoad};
use sdal_core::{
    build_image, decode_parcel, parse_region, read_image, scan_for_way, validate_image,
    BuildConfig, BuildError, BuildInput, Descriptor, FindingKind, ParcelFamily, RegionInput,
    RoadInput, SpatialIndex, WayIndex, DESCRIPTOR_FILE_NAME,
};
use sdal_testkit::fixtures::{sample_region, small_config, three_road_region};

fn build(input: BuildInput, config: &BuildConfig) -> Vec<u8> {
    build_image(&input, config).expect("build failed")
}

fn single_region(region: sdal_core::RegionInput) -> BuildInput {
    let mut input = BuildInput::new();
    input.push_region(region);
    input
}

/// Returns (absolute offset, stored length) of one parcel inside the image.
fn locate_parcel(image: &[u8], family: ParcelFamily, sequence: u32) -> (usize, usize) {
    let contents = read_image(image).unwrap();
    for file in &contents.files {
        if file.name == DESCRIPTOR_FILE_NAME {
            continue;
        }
        let start = file.offset as usize;
        let payload = &image[start..start + file.size as usize];
        let parsed = parse_region(payload).unwrap();
        for entry in &parsed.entries {
            if entry.family == family && entry.sequence.as_u32() == sequence {
                return (start + entry.offset as usize, entry.stored_len as usize);
            }
        }
    }
    panic!("{family} parcel {sequence} not found");
}

#[test]
fn three_road_scenario() {
    let image = build(single_region(three_road_region()), &BuildConfig::new());

    let contents = read_image(&image).unwrap();
    let mtoc = contents
        .files
        .iter()
        .find(|f| f.name == DESCRIPTOR_FILE_NAME)
        .expect("descriptor missing");
    let at = mtoc.offset as usize;
    let descriptor = Descriptor::decode(&image[at..at + mtoc.size as usize]).unwrap();

    // One region, and the two distinct names survived deduplication.
    assert_eq!(descriptor.regions.len(), 1);
    assert_eq!(descriptor.regions[0].name, "metro");
    assert_eq!(descriptor.names.len(), 2);

    // 2 data parcels plus the two index parcels.
    let region_file = contents
        .files
        .iter()
        .find(|f| f.name == descriptor.regions[0].file_name)
        .expect("payload missing");
    let start = region_file.offset as usize;
    let parsed = parse_region(&image[start..start + region_file.size as usize]).unwrap();
    let families: Vec<ParcelFamily> = parsed.entries.iter().map(|e| e.family).collect();
    assert_eq!(
        families,
        vec![
            ParcelFamily::Cartographic,
            ParcelFamily::Navigable,
            ParcelFamily::SpatialIndex,
            ParcelFamily::WayIndex,
        ]
    );

    assert!(validate_image(&image).is_clean());
}

#[test]
fn flipped_payload_byte_is_reported_against_its_parcel() {
    let mut image = build(single_region(three_road_region()), &BuildConfig::new());
    let (at, len) = locate_parcel(&image, ParcelFamily::Cartographic, 0);
    // Midway through the stored parcel, past the fixed header fields.
    image[at + len / 2] ^= 0x10;

    let report = validate_image(&image);
    assert!(!report.is_clean());
    let about_parcel: Vec<_> = report
        .findings()
        .iter()
        .filter(|f| {
            f.context.contains("cartographic parcel 0")
                && matches!(f.kind, FindingKind::Integrity | FindingKind::Decode)
        })
        .collect();
    assert_eq!(about_parcel.len(), 1, "findings: {:?}", report.findings());
    // No other parcel is accused of damage.
    assert!(report
        .findings()
        .iter()
        .filter(|f| matches!(f.kind, FindingKind::Integrity | FindingKind::Decode))
        .all(|f| f.context.contains("cartographic parcel 0")));
}

#[test]
fn flipped_checksum_is_an_integrity_finding() {
    let mut image = build(single_region(three_road_region()), &BuildConfig::new());
    let (at, _) = locate_parcel(&image, ParcelFamily::Navigable, 0);
    // Family byte and three single-byte varints put the CRC at offset 4.
    image[at + 4] ^= 0x01;

    let report = validate_image(&image);
    assert!(report.findings().iter().any(|f| {
        f.kind == FindingKind::Integrity && f.context.contains("navigable parcel 0")
    }));
}

#[test]
fn every_input_way_is_reachable_through_the_index() {
    let region = sample_region("lookup", 150, 0);
    let expected: Vec<u64> = region
        .roads
        .iter()
        .filter(|r| r.navigable)
        .map(|r| r.way_id)
        .collect();
    let image = build(single_region(region), &small_config());

    // Pull the way index and every navigable parcel payload back out.
    let (at, len) = locate_parcel(&image, ParcelFamily::WayIndex, 0);
    let mut pos = 0;
    let (_, blob) = decode_parcel(&image[at..at + len], &mut pos).unwrap();
    let index = WayIndex::decode(&blob).unwrap();
    assert_eq!(index.record_count(), expected.len() as u64);

    let mut payloads = Vec::new();
    for sequence in 0.. {
        let contents = read_image(&image).unwrap();
        let file = contents.files.iter().find(|f| f.name == "LOOKUP.SDL").unwrap();
        let start = file.offset as usize;
        let parsed = parse_region(&image[start..start + file.size as usize]).unwrap();
        let Some(entry) = parsed
            .entries
            .iter()
            .find(|e| e.family == ParcelFamily::Navigable && e.sequence.as_u32() == sequence)
        else {
            break;
        };
        let from = start + entry.offset as usize;
        let mut pos = 0;
        let (_, payload) =
            decode_parcel(&image[from..from + entry.stored_len as usize], &mut pos).unwrap();
        payloads.push(payload);
    }
    assert!(payloads.len() > 1, "expected several navigable parcels");

    for way_id in &expected {
        let start = index.locate(*way_id).expect("no preceding entry");
        let payload = &payloads[start.sequence.as_u32() as usize];
        let offset = scan_for_way(payload, start.offset, *way_id)
            .unwrap()
            .expect("scan missed a present id");
        let mut pos = offset as usize;
        let body = sdal_codec::read_frame(payload, &mut pos).unwrap();
        assert_eq!(NavRoad::decode_body(body).unwrap().way_id, *way_id);
    }

    // An id between two present ids is a miss, not a wrong record.
    if let Some(absent) = expected.iter().find(|id| !expected.contains(&(*id + 1))) {
        let absent = absent + 1;
        if let Some(start) = index.locate(absent) {
            let payload = &payloads[start.sequence.as_u32() as usize];
            assert_eq!(scan_for_way(payload, start.offset, absent).unwrap(), None);
        }
    }
}

#[test]
fn spanning_road_is_filed_under_its_extent_midpoint() {
    // One road crosses the whole region while its first vertex sits in a
    // corner; thirty short roads crowd the diagonal. A lookup at the long
    // road's extent midpoint must return it from that leaf.
    let mut region = RegionInput::new("span");
    region.roads.push(RoadInput {
        way_id: 1,
        name: None,
        attributes: 0,
        navigable: true,
        points: vec![(0.0, 0.0), (0.1, 0.2), (10.0, 10.0)],
    });
    for i in 0..30u64 {
        let t = i as f64 * 0.33;
        region.roads.push(RoadInput {
            way_id: 10 + i,
            name: None,
            attributes: 0,
            navigable: true,
            points: vec![(t, t), (t + 0.01, t + 0.01)],
        });
    }
    let image = build(single_region(region), &BuildConfig::new());

    let (at, len) = locate_parcel(&image, ParcelFamily::SpatialIndex, 0);
    let mut pos = 0;
    let (_, blob) = decode_parcel(&image[at..at + len], &mut pos).unwrap();
    let index = SpatialIndex::decode(&blob).unwrap();

    let (at, len) = locate_parcel(&image, ParcelFamily::Cartographic, 0);
    let mut pos = 0;
    let (_, payload) = decode_parcel(&image[at..at + len], &mut pos).unwrap();

    // Precision 6 puts the quantized midpoint of (0,0)-(10,10) here.
    let hits = index.lookup(GeometryPoint::new(5_000_000, 5_000_000));
    let spanning: Vec<u64> = hits
        .iter()
        .map(|locator| {
            let mut pos = locator.offset as usize;
            let body = sdal_codec::read_frame(&payload, &mut pos).unwrap();
            CartoRoad::decode_body(body).unwrap().way_id
        })
        .filter(|&way_id| way_id == 1)
        .collect();
    assert_eq!(spanning, vec![1], "hits: {hits:?}");
}

#[test]
fn larger_build_is_deterministic_and_clean() {
    let config = small_config().density_zoom_levels(2);
    let make = || {
        let mut input = BuildInput::new();
        input.push_region(sample_region("alpha", 120, 40));
        input.push_region(sample_region("beta", 30, 5));
        input
    };
    let a = build(make(), &config);
    let b = build(make(), &config);
    assert_eq!(a, b);
    assert!(validate_image(&a).is_clean());
}

#[test]
fn oversized_record_fails_the_build_with_identity() {
    let mut region = three_road_region();
    // A polyline long enough that its frame alone exceeds the bound.
    region.roads[1].points = (0..600)
        .map(|i| (50.0 + f64::from(i) * 0.001, 8.0 + f64::from(i) * 0.001))
        .collect();
    let config = BuildConfig::new().max_parcel_payload(512);
    let err = build_image(&single_region(region), &config).unwrap_err();
    match err {
        BuildError::Capacity { record_id, family, .. } => {
            assert_eq!(record_id, 20);
            assert_eq!(family, ParcelFamily::Cartographic);
        }
        other => panic!("expected capacity error, got {other}"),
    }
}

#[test]
fn records_round_trip_through_the_image() {
    let region = sample_region("round", 40, 15);
    let image = build(single_region(region.clone()), &small_config());

    let (at, len) = locate_parcel(&image, ParcelFamily::Cartographic, 0);
    let mut pos = 0;
    let (_, payload) = decode_parcel(&image[at..at + len], &mut pos).unwrap();
    let mut frame_pos = 0;
    let body = sdal_codec::read_frame(&payload, &mut frame_pos).unwrap();
    let decoded = CartoRoad::decode_body(body).unwrap();
    let source = region
        .roads
        .iter()
        .find(|r| r.way_id == decoded.way_id)
        .expect("decoded road not in input");
    assert_eq!(decoded.points.len(), source.points.len());
    assert_eq!(decoded.navigable, source.navigable);
}
