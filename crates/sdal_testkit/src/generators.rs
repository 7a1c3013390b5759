//! Property-based generators.
//!
//! Strategies produce input that upstream normalization would hand the
//! builder: coordinates inside the quantizable range, non-empty
//! polylines, and way ids that are unique and ascending within a region.

use proptest::prelude::*;
use sdal_core::{PoiInput, RegionInput, RoadInput};

/// Strategy for a (latitude, longitude) pair inside the usable range.
pub fn coordinate_strategy() -> impl Strategy<Value = (f64, f64)> {
    (-85.0f64..85.0, -175.0f64..175.0)
}

/// Strategy for an optional street-like name from a small pool, so
/// generated regions exercise dictionary deduplication.
pub fn name_strategy() -> impl Strategy<Value = Option<String>> {
    proptest::option::of(
        prop::sample::select(vec!["Main St", "Oak Ave", "High St", "Ringstrasse", "Rue A"])
            .prop_map(str::to_owned),
    )
}

/// Strategy for one road; the way id is assigned by [`region_strategy`].
pub fn road_strategy() -> impl Strategy<Value = RoadInput> {
    (
        name_strategy(),
        any::<u32>(),
        any::<bool>(),
        prop::collection::vec(coordinate_strategy(), 1..12),
    )
        .prop_map(|(name, attributes, navigable, points)| RoadInput {
            way_id: 0,
            name,
            attributes,
            navigable,
            points,
        })
}

/// Strategy for one POI; the id is assigned by [`region_strategy`].
pub fn poi_strategy() -> impl Strategy<Value = PoiInput> {
    (name_strategy(), 0u16..512, coordinate_strategy()).prop_map(
        |(name, category, (lat, lon))| PoiInput {
            poi_id: 0,
            category,
            name,
            lat,
            lon,
        },
    )
}

/// Strategy for a whole region with unique ascending identifiers.
pub fn region_strategy(max_roads: usize, max_pois: usize) -> impl Strategy<Value = RegionInput> {
    (
        prop::collection::vec(road_strategy(), 0..=max_roads),
        prop::collection::vec(poi_strategy(), 0..=max_pois),
        1u64..1000,
    )
        .prop_map(|(mut roads, mut pois, stride)| {
            for (i, road) in roads.iter_mut().enumerate() {
                road.way_id = 1 + i as u64 * stride;
            }
            for (i, poi) in pois.iter_mut().enumerate() {
                poi.poi_id = 1 + i as u64;
            }
            let mut region = RegionInput::new("generated");
            region.roads = roads;
            region.pois = pois;
            region
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn way_ids_are_unique_and_ascending(region in region_strategy(30, 10)) {
            for pair in region.roads.windows(2) {
                prop_assert!(pair[0].way_id < pair[1].way_id);
            }
        }

        #[test]
        fn polylines_are_never_empty(region in region_strategy(20, 0)) {
            for road in &region.roads {
                prop_assert!(!road.points.is_empty());
            }
        }
    }
}
