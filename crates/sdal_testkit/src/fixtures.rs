//! Deterministic fixtures.
//!
//! Regions produced here use a fixed linear-congruential sequence, so two
//! calls with the same arguments return identical input and the builds on
//! top of them are byte-identical.

use sdal_core::{BuildConfig, PoiInput, RegionInput, RoadInput};

/// Multiplier of the fixture LCG (Numerical Recipes constants).
const LCG_MUL: u64 = 1_664_525;
const LCG_ADD: u64 = 1_013_904_223;

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(LCG_MUL).wrapping_add(LCG_ADD);
        self.0
    }

    /// A degree offset in roughly -0.5..0.5.
    fn jitter(&mut self) -> f64 {
        (self.next() % 1_000_000) as f64 / 1_000_000.0 - 0.5
    }
}

/// The canonical three-road scenario.
///
/// Way ids 10, 20, 30 with names "Main St", "Oak Ave", "Main St"; the
/// dictionary deduplicates to two entries, and with default limits the
/// region packs into one cartographic and one navigable parcel.
#[must_use]
pub fn three_road_region() -> RegionInput {
    let mut region = RegionInput::new("metro");
    let roads = [
        (10u64, "Main St", 52.520, 13.404),
        (20, "Oak Ave", 52.525, 13.410),
        (30, "Main St", 52.530, 13.416),
    ];
    for (way_id, name, lat, lon) in roads {
        region.roads.push(RoadInput {
            way_id,
            name: Some(name.to_owned()),
            attributes: 1,
            navigable: true,
            points: vec![(lat, lon), (lat + 0.001, lon + 0.002)],
        });
    }
    region
}

/// A deterministic region with `roads` roads and `pois` POIs.
///
/// Roads scatter around one metro area, every third road is unnamed,
/// every fourth is not navigable, and way ids ascend with gaps so sparse
/// way-index lookups exercise both hits and misses.
#[must_use]
pub fn sample_region(name: &str, roads: usize, pois: usize) -> RegionInput {
    let mut rng = Lcg(0x5DA1);
    let mut region = RegionInput::new(name);
    for i in 0..roads {
        let lat = 48.0 + rng.jitter();
        let lon = 11.0 + rng.jitter();
        let vertex_count = 2 + (rng.next() % 6) as usize;
        let mut points = vec![(lat, lon)];
        for _ in 1..vertex_count {
            let (last_lat, last_lon) = *points.last().unwrap();
            points.push((last_lat + rng.jitter() / 100.0, last_lon + rng.jitter() / 100.0));
        }
        region.roads.push(RoadInput {
            way_id: (i as u64) * 7 + 100,
            name: (i % 3 != 0).then(|| format!("Street {}", i % 40)),
            attributes: (rng.next() % 256) as u32,
            navigable: i % 4 != 0,
            points,
        });
    }
    for i in 0..pois {
        region.pois.push(PoiInput {
            poi_id: 1_000_000 + i as u64,
            category: (rng.next() % 64) as u16,
            name: (i % 2 == 0).then(|| format!("Place {}", i % 25)),
            lat: 48.0 + rng.jitter(),
            lon: 11.0 + rng.jitter(),
        });
    }
    region
}

/// A configuration with small limits so tests hit parcel rollover and
/// multi-level index trees without huge inputs.
#[must_use]
pub fn small_config() -> BuildConfig {
    BuildConfig::new()
        .max_parcel_payload(2048)
        .max_parcel_records(32)
        .spatial_grid_depth(2)
        .spatial_leaf_capacity(8)
        .way_index_fanout(4)
        .way_index_sparsity(4)
}

/// A payload with a skewed byte distribution, the shape Huffman coding
/// rewards; `len` bytes, deterministic.
#[must_use]
pub fn skewed_payload(len: usize) -> Vec<u8> {
    let mut rng = Lcg(0xBEEF);
    (0..len)
        .map(|_| {
            let roll = rng.next() % 100;
            match roll {
                0..=59 => 0x00,
                60..=84 => 0x41 + (rng.next() % 4) as u8,
                _ => (rng.next() % 256) as u8,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_are_deterministic() {
        let a = sample_region("r", 20, 10);
        let b = sample_region("r", 20, 10);
        assert_eq!(a.roads.len(), b.roads.len());
        assert_eq!(a.roads[7].points, b.roads[7].points);
        assert_eq!(skewed_payload(64), skewed_payload(64));
    }

    #[test]
    fn three_roads_have_two_distinct_names() {
        let region = three_road_region();
        let mut names: Vec<&str> = region
            .roads
            .iter()
            .filter_map(|r| r.name.as_deref())
            .collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names, vec!["Main St", "Oak Ave"]);
    }

    #[test]
    fn skewed_payload_is_actually_skewed() {
        let payload = skewed_payload(4096);
        let zeros = payload.iter().filter(|&&b| b == 0).count();
        assert!(zeros > payload.len() / 3);
    }
}
