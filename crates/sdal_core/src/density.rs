//! Density overlay tiles.
//!
//! For every enabled zoom level the region extent is cut into `2^z` by
//! `2^z` tiles, each carrying a `dim` by `dim` cell grid of road density.
//! Each polyline segment contributes its length to the cell holding its
//! midpoint, so a road weighs by how much of it there is, not by how many
//! vertices digitized it. Cell weights are normalized per tile so the
//! densest cell is always 65535; renderers shade against a fixed ramp
//! without knowing how much data the region holds. Only tiles that
//! received at least one segment are emitted, in (zoom, row, column)
//! order.
//!
//! Binning happens in fixed-point degree space, the same space records
//! store, so a tile's extent and its cell boundaries are exact integer
//! ranges.

use crate::config::BuildConfig;
use sdal_codec::{DensityTile, Extent, GeometryPoint};
use std::collections::BTreeMap;

/// Builds density tiles from road polylines.
#[derive(Debug, Clone, Copy)]
pub struct DensityBuilder {
    zoom_levels: u8,
    dim: u16,
}

impl DensityBuilder {
    /// Creates a builder from the image configuration.
    #[must_use]
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            zoom_levels: config.density_zoom_levels,
            dim: config.density_grid_dim,
        }
    }

    /// Whether any zoom level is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.zoom_levels > 0
    }

    /// Bins road segments into tiles for every enabled zoom level.
    ///
    /// Each segment contributes its length to the cell holding its
    /// midpoint; zero-length segments contribute nothing.
    #[must_use]
    pub fn build(&self, polylines: &[&[GeometryPoint]]) -> Vec<DensityTile> {
        if self.zoom_levels == 0 {
            return Vec::new();
        }
        let mut extent: Option<Extent> = None;
        for polyline in polylines {
            for &point in *polyline {
                match extent.as_mut() {
                    Some(extent) => extent.expand(point),
                    None => extent = Some(Extent::from_point(point)),
                }
            }
        }
        let Some(extent) = extent else {
            return Vec::new();
        };
        let segments = collect_segments(polylines);
        if segments.is_empty() {
            return Vec::new();
        }
        let span_lat = i64::from(extent.max_lat) - i64::from(extent.min_lat) + 1;
        let span_lon = i64::from(extent.max_lon) - i64::from(extent.min_lon) + 1;
        let dim = i64::from(self.dim);

        let mut tiles = Vec::new();
        for zoom in 0..self.zoom_levels {
            let per_axis = 1i64 << zoom;
            let cells_per_axis = per_axis * dim;

            let mut counts: BTreeMap<(u32, u32), Vec<u64>> = BTreeMap::new();
            for &(midpoint, length) in &segments {
                let cell_lat =
                    scale_to_cell(midpoint.lat, extent.min_lat, span_lat, cells_per_axis);
                let cell_lon =
                    scale_to_cell(midpoint.lon, extent.min_lon, span_lon, cells_per_axis);
                let key = ((cell_lat / dim) as u32, (cell_lon / dim) as u32);
                let cells = counts
                    .entry(key)
                    .or_insert_with(|| vec![0u64; (dim * dim) as usize]);
                cells[((cell_lat % dim) * dim + cell_lon % dim) as usize] += length;
            }

            for ((tile_y, tile_x), raw) in counts {
                let peak = raw.iter().copied().max().unwrap_or(1).max(1);
                let cells = raw
                    .iter()
                    .map(|&count| (count * u64::from(u16::MAX) / peak) as u16)
                    .collect();
                tiles.push(DensityTile {
                    zoom,
                    tile_x,
                    tile_y,
                    extent: tile_extent(extent, per_axis, tile_y, tile_x),
                    dim: self.dim,
                    cells,
                });
            }
        }
        tiles
    }
}

/// Midpoint and length of every non-degenerate segment, in input order.
///
/// Lengths are straight-line distances in fixed-point units. The square
/// root is the only floating-point step and IEEE requires it correctly
/// rounded, so builds stay byte-identical across platforms.
fn collect_segments(polylines: &[&[GeometryPoint]]) -> Vec<(GeometryPoint, u64)> {
    let mut segments = Vec::new();
    for polyline in polylines {
        for pair in polyline.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let dlat = (i64::from(b.lat) - i64::from(a.lat)) as f64;
            let dlon = (i64::from(b.lon) - i64::from(a.lon)) as f64;
            let length = (dlat * dlat + dlon * dlon).sqrt() as u64;
            if length == 0 {
                continue;
            }
            let midpoint = GeometryPoint::new(
                ((i64::from(a.lat) + i64::from(b.lat)) / 2) as i32,
                ((i64::from(a.lon) + i64::from(b.lon)) / 2) as i32,
            );
            segments.push((midpoint, length));
        }
    }
    segments
}

/// Maps a coordinate into `0..cells` over the closed span starting at `min`.
fn scale_to_cell(coord: i32, min: i32, span: i64, cells: i64) -> i64 {
    (i64::from(coord) - i64::from(min)) * cells / span
}

/// The exact integer sub-extent of tile (`row`, `col`) in a `per_axis`
/// square tiling; adjacent tiles never overlap and together cover the
/// whole extent.
fn tile_extent(extent: Extent, per_axis: i64, row: u32, col: u32) -> Extent {
    let span_lat = i64::from(extent.max_lat) - i64::from(extent.min_lat) + 1;
    let span_lon = i64::from(extent.max_lon) - i64::from(extent.min_lon) + 1;
    let lat_lo = i64::from(extent.min_lat) + span_lat * i64::from(row) / per_axis;
    let lat_hi = i64::from(extent.min_lat) + span_lat * (i64::from(row) + 1) / per_axis - 1;
    let lon_lo = i64::from(extent.min_lon) + span_lon * i64::from(col) / per_axis;
    let lon_hi = i64::from(extent.min_lon) + span_lon * (i64::from(col) + 1) / per_axis - 1;
    Extent::new(lat_lo as i32, lon_lo as i32, lat_hi as i32, lon_hi as i32)
}
