//! Build configuration.

use crate::error::{BuildError, BuildResult};
use sdal_codec::MAX_PRECISION;

/// Configuration for building an image.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Decimal digits preserved by coordinate quantization.
    pub coord_precision: u8,

    /// Maximum uncompressed payload bytes per parcel.
    pub max_parcel_payload: usize,

    /// Maximum record count per parcel.
    pub max_parcel_records: usize,

    /// Depth of the level-1 spatial grid; the grid has 2^depth cells.
    pub spatial_grid_depth: u8,

    /// Maximum locators per spatial leaf below the grid level.
    pub spatial_leaf_capacity: usize,

    /// Fan-out of way-index nodes.
    pub way_index_fanout: usize,

    /// Sparsity factor K: every Kth record per parcel gets an index entry.
    pub way_index_sparsity: usize,

    /// Density overlay zoom levels to render; 0 disables the overlay.
    pub density_zoom_levels: u8,

    /// Cells per side of one density tile.
    pub density_grid_dim: u16,

    /// Volume identifier stamped into the image descriptor.
    pub volume_id: String,

    /// Total image capacity in bytes (default: 74-minute disc).
    pub target_capacity_bytes: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            coord_precision: 6,
            max_parcel_payload: 64 * 1024,
            max_parcel_records: 4096,
            spatial_grid_depth: 4,
            spatial_leaf_capacity: 32,
            way_index_fanout: 32,
            way_index_sparsity: 16,
            density_zoom_levels: 0, // disabled
            density_grid_dim: 64,
            volume_id: "SDAL_IMAGE".to_string(),
            target_capacity_bytes: 333_000 * 2048,
        }
    }
}

impl BuildConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the coordinate precision.
    #[must_use]
    pub const fn coord_precision(mut self, precision: u8) -> Self {
        self.coord_precision = precision;
        self
    }

    /// Sets the maximum uncompressed payload bytes per parcel.
    #[must_use]
    pub const fn max_parcel_payload(mut self, bytes: usize) -> Self {
        self.max_parcel_payload = bytes;
        self
    }

    /// Sets the maximum record count per parcel.
    #[must_use]
    pub const fn max_parcel_records(mut self, count: usize) -> Self {
        self.max_parcel_records = count;
        self
    }

    /// Sets the level-1 spatial grid depth.
    #[must_use]
    pub const fn spatial_grid_depth(mut self, depth: u8) -> Self {
        self.spatial_grid_depth = depth;
        self
    }

    /// Sets the spatial leaf capacity.
    #[must_use]
    pub const fn spatial_leaf_capacity(mut self, capacity: usize) -> Self {
        self.spatial_leaf_capacity = capacity;
        self
    }

    /// Sets the way-index fan-out.
    #[must_use]
    pub const fn way_index_fanout(mut self, fanout: usize) -> Self {
        self.way_index_fanout = fanout;
        self
    }

    /// Sets the way-index sparsity factor.
    #[must_use]
    pub const fn way_index_sparsity(mut self, sparsity: usize) -> Self {
        self.way_index_sparsity = sparsity;
        self
    }

    /// Sets the density overlay zoom levels (0 disables).
    #[must_use]
    pub const fn density_zoom_levels(mut self, levels: u8) -> Self {
        self.density_zoom_levels = levels;
        self
    }

    /// Sets the density tile grid dimension.
    #[must_use]
    pub const fn density_grid_dim(mut self, dim: u16) -> Self {
        self.density_grid_dim = dim;
        self
    }

    /// Sets the volume identifier.
    #[must_use]
    pub fn volume_id(mut self, id: impl Into<String>) -> Self {
        self.volume_id = id.into();
        self
    }

    /// Sets the target capacity in bytes.
    #[must_use]
    pub const fn target_capacity_bytes(mut self, bytes: u64) -> Self {
        self.target_capacity_bytes = bytes;
        self
    }

    /// Checks internal consistency before a build.
    pub fn validate(&self) -> BuildResult<()> {
        if self.coord_precision > MAX_PRECISION {
            return Err(BuildError::invalid_config(format!(
                "coord_precision {} exceeds maximum {MAX_PRECISION}",
                self.coord_precision
            )));
        }
        if self.max_parcel_payload == 0 || self.max_parcel_payload > u32::MAX as usize {
            return Err(BuildError::invalid_config(
                "max_parcel_payload must be between 1 and u32::MAX",
            ));
        }
        if self.max_parcel_records == 0 {
            return Err(BuildError::invalid_config(
                "max_parcel_records must be at least 1",
            ));
        }
        if self.spatial_grid_depth > 16 {
            return Err(BuildError::invalid_config(
                "spatial_grid_depth must be at most 16",
            ));
        }
        if self.spatial_leaf_capacity == 0 {
            return Err(BuildError::invalid_config(
                "spatial_leaf_capacity must be at least 1",
            ));
        }
        if self.way_index_fanout < 2 {
            return Err(BuildError::invalid_config(
                "way_index_fanout must be at least 2",
            ));
        }
        if self.way_index_sparsity == 0 {
            return Err(BuildError::invalid_config(
                "way_index_sparsity must be at least 1",
            ));
        }
        if self.density_zoom_levels > 12 {
            return Err(BuildError::invalid_config(
                "density_zoom_levels must be at most 12",
            ));
        }
        if self.density_zoom_levels > 0 && self.density_grid_dim == 0 {
            return Err(BuildError::invalid_config(
                "density_grid_dim must be at least 1 when the overlay is enabled",
            ));
        }
        Ok(())
    }
}
