//! Normalized build input.
//!
//! Callers hand the builder plain degree-space records; quantization,
//! ordering, and name interning all happen inside the pipeline so the
//! input model stays toolchain-neutral.

/// Everything one build consumes.
#[derive(Debug, Clone, Default)]
pub struct BuildInput {
    /// Regions in image order.
    pub regions: Vec<RegionInput>,
}

impl BuildInput {
    /// Creates an empty input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region, keeping image order.
    pub fn push_region(&mut self, region: RegionInput) {
        self.regions.push(region);
    }

    /// Total road count across all regions.
    #[must_use]
    pub fn road_count(&self) -> usize {
        self.regions.iter().map(|r| r.roads.len()).sum()
    }
}

/// One region's worth of records.
#[derive(Debug, Clone)]
pub struct RegionInput {
    /// Region name, recorded in the descriptor.
    pub name: String,
    /// Road records, any order.
    pub roads: Vec<RoadInput>,
    /// Point-of-interest records, any order.
    pub pois: Vec<PoiInput>,
}

impl RegionInput {
    /// Creates an empty region.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roads: Vec::new(),
            pois: Vec::new(),
        }
    }
}

/// A road record in degree space.
#[derive(Debug, Clone)]
pub struct RoadInput {
    /// Stable way identifier; unique within the region.
    pub way_id: u64,
    /// Display name, shared through the dictionary when repeated.
    pub name: Option<String>,
    /// Opaque attribute bits carried through to the record.
    pub attributes: u32,
    /// Whether the road participates in routing.
    pub navigable: bool,
    /// Polyline vertices as (latitude, longitude) degrees.
    pub points: Vec<(f64, f64)>,
}

/// A point of interest in degree space.
#[derive(Debug, Clone)]
pub struct PoiInput {
    /// Stable POI identifier.
    pub poi_id: u64,
    /// Category code from the source taxonomy.
    pub category: u16,
    /// Display name, shared through the dictionary when repeated.
    pub name: Option<String>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}
