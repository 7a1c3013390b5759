//! Benchmark fixtures shared by the bench targets.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use sdal_codec::{CartoRoad, GeometryPoint, NameId};
use sdal_core::BuildInput;
use sdal_testkit::fixtures::sample_region;

/// A cartographic record with `points` polyline vertices.
#[must_use]
pub fn carto_road(points: usize) -> CartoRoad {
    let mut prev = GeometryPoint::new(52_500_000, 13_400_000);
    let polyline = (0..points)
        .map(|i| {
            prev = GeometryPoint::new(
                prev.lat + (i as i32 % 17) - 8,
                prev.lon + (i as i32 % 13) - 6,
            );
            prev
        })
        .collect();
    CartoRoad {
        way_id: 123_456_789,
        attributes: 0x2A,
        name: Some(NameId::new(7)),
        navigable: true,
        points: polyline,
    }
}

/// A build input with `roads` roads and a tenth as many POIs.
#[must_use]
pub fn build_input(roads: usize) -> BuildInput {
    let mut input = BuildInput::new();
    input.push_region(sample_region("bench", roads, roads / 10));
    input
}
