//! Two-level spatial index over record locators.
//!
//! Level one is a fixed grid: alternating-axis median splits down to the
//! configured grid depth, built unconditionally so every image shares the
//! same coarse shape regardless of how little data a region holds. Level
//! two continues splitting inside each grid cell until a cell holds at
//! most `spatial_leaf_capacity` locators.
//!
//! Nodes live in one flat vector and refer to children by index, so the
//! serialized blob needs no pointer fixup on load and a damaged child
//! reference is detectable by range check alone.

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::types::{read_varint_u32_cursor, Locator};
use sdal_codec::{read_varint, read_zigzag32, write_varint, write_zigzag32, Extent, GeometryPoint};

const NODE_INTERNAL: u8 = 0;
const NODE_LEAF: u8 = 1;

/// Split axis of an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// East-west coordinate.
    Lon = 0,
    /// North-south coordinate.
    Lat = 1,
}

impl Axis {
    const fn flip(self) -> Self {
        match self {
            Self::Lon => Self::Lat,
            Self::Lat => Self::Lon,
        }
    }

    const fn as_u8(self) -> u8 {
        self as u8
    }

    const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Lon),
            1 => Some(Self::Lat),
            _ => None,
        }
    }

    /// The coordinate of `point` along this axis.
    #[must_use]
    pub const fn coord(self, point: GeometryPoint) -> i32 {
        match self {
            Self::Lon => point.lon,
            Self::Lat => point.lat,
        }
    }
}

/// One node of the index tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialNode {
    /// Bounding box of everything under this node.
    pub extent: Extent,
    /// Internal split or leaf payload.
    pub kind: SpatialNodeKind,
}

/// Payload of a [`SpatialNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpatialNodeKind {
    /// Binary split; lookups go left when the coordinate is below `split`.
    Internal {
        /// Axis the split applies to.
        axis: Axis,
        /// Split value in fixed-point units.
        split: i32,
        /// Index of the child holding coordinates below `split`.
        left: u32,
        /// Index of the child holding coordinates at or above `split`.
        right: u32,
    },
    /// Terminal cell holding the locators of its records.
    Leaf {
        /// Locators of the records whose representative point fell here.
        locators: Vec<Locator>,
    },
}

/// Builds a [`SpatialIndex`] with the configured grid depth and capacity.
#[derive(Debug, Clone, Copy)]
pub struct SpatialIndexBuilder {
    grid_depth: u8,
    leaf_capacity: usize,
}

impl SpatialIndexBuilder {
    /// Creates a builder from the image configuration.
    #[must_use]
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            grid_depth: config.spatial_grid_depth,
            leaf_capacity: config.spatial_leaf_capacity,
        }
    }

    /// Builds the index over one region's representative points.
    #[must_use]
    pub fn build(&self, entries: &[(GeometryPoint, Locator)]) -> SpatialIndex {
        let mut slots: Vec<Entry> = entries
            .iter()
            .enumerate()
            .map(|(ordinal, &(point, locator))| Entry {
                point,
                locator,
                ordinal: ordinal as u32,
            })
            .collect();
        let extent = extent_of(&slots).unwrap_or(Extent::new(0, 0, 0, 0));
        let mut nodes = Vec::new();
        build_node(
            &mut nodes,
            &mut slots,
            extent,
            0,
            self.grid_depth,
            self.leaf_capacity,
            Axis::Lon,
        );
        SpatialIndex {
            grid_depth: self.grid_depth,
            leaf_capacity: self.leaf_capacity,
            nodes,
        }
    }
}

/// Point-to-parcel index for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialIndex {
    grid_depth: u8,
    leaf_capacity: usize,
    nodes: Vec<SpatialNode>,
}

impl SpatialIndex {
    /// Grid depth the index was built with.
    #[must_use]
    pub fn grid_depth(&self) -> u8 {
        self.grid_depth
    }

    /// Leaf capacity the index was built with.
    #[must_use]
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// All nodes, root first.
    #[must_use]
    pub fn nodes(&self) -> &[SpatialNode] {
        &self.nodes
    }

    /// Locators of the leaf cell containing `point`.
    #[must_use]
    pub fn lookup(&self, point: GeometryPoint) -> &[Locator] {
        let mut index = 0usize;
        // The walk is bounded so a damaged blob with a child cycle cannot
        // spin forever.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index).map(|node| &node.kind) {
                None => return &[],
                Some(SpatialNodeKind::Leaf { locators }) => return locators,
                Some(SpatialNodeKind::Internal {
                    axis,
                    split,
                    left,
                    right,
                }) => {
                    index = if axis.coord(point) < *split {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
            }
        }
        &[]
    }

    /// Every locator stored in any leaf, in node order.
    pub fn locators(&self) -> impl Iterator<Item = Locator> + '_ {
        self.nodes
            .iter()
            .flat_map(|node| match &node.kind {
                SpatialNodeKind::Leaf { locators } => locators.as_slice(),
                SpatialNodeKind::Internal { .. } => &[],
            })
            .copied()
    }

    /// Serializes the index into its parcel payload form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.grid_depth);
        write_varint(&mut buf, self.leaf_capacity as u64);
        write_varint(&mut buf, self.nodes.len() as u64);
        for node in &self.nodes {
            match &node.kind {
                SpatialNodeKind::Internal { .. } => buf.push(NODE_INTERNAL),
                SpatialNodeKind::Leaf { .. } => buf.push(NODE_LEAF),
            }
            write_zigzag32(&mut buf, node.extent.min_lat);
            write_zigzag32(&mut buf, node.extent.min_lon);
            write_zigzag32(&mut buf, node.extent.max_lat);
            write_zigzag32(&mut buf, node.extent.max_lon);
            match &node.kind {
                SpatialNodeKind::Internal {
                    axis,
                    split,
                    left,
                    right,
                } => {
                    buf.push(axis.as_u8());
                    write_zigzag32(&mut buf, *split);
                    write_varint(&mut buf, u64::from(*left));
                    write_varint(&mut buf, u64::from(*right));
                }
                SpatialNodeKind::Leaf { locators } => {
                    write_varint(&mut buf, locators.len() as u64);
                    for locator in locators {
                        locator.encode(&mut buf);
                    }
                }
            }
        }
        buf
    }

    /// Parses and validates a serialized index.
    pub fn decode(data: &[u8]) -> BuildResult<Self> {
        let grid_depth = *data
            .first()
            .ok_or_else(|| BuildError::invalid_format("empty spatial index blob"))?;
        let mut pos = 1usize;
        let leaf_capacity = read_varint(data, &mut pos)? as usize;
        let node_count = read_varint_u32_cursor(data, &mut pos)? as usize;
        // A node is at least six bytes on the wire.
        if node_count.saturating_mul(6) > data.len().saturating_sub(pos) {
            return Err(BuildError::invalid_format(
                "spatial node count exceeds blob size",
            ));
        }
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let kind = *data
                .get(pos)
                .ok_or_else(|| BuildError::invalid_format("spatial node truncated at kind"))?;
            pos += 1;
            let min_lat = read_zigzag32(data, &mut pos)?;
            let min_lon = read_zigzag32(data, &mut pos)?;
            let max_lat = read_zigzag32(data, &mut pos)?;
            let max_lon = read_zigzag32(data, &mut pos)?;
            let extent = Extent::new(min_lat, min_lon, max_lat, max_lon);
            let kind = match kind {
                NODE_INTERNAL => {
                    let axis_tag = *data.get(pos).ok_or_else(|| {
                        BuildError::invalid_format("spatial node truncated at axis")
                    })?;
                    pos += 1;
                    let axis = Axis::from_u8(axis_tag).ok_or_else(|| {
                        BuildError::invalid_format(format!("unknown split axis {axis_tag}"))
                    })?;
                    let split = read_zigzag32(data, &mut pos)?;
                    let left = read_varint_u32_cursor(data, &mut pos)?;
                    let right = read_varint_u32_cursor(data, &mut pos)?;
                    if left as usize >= node_count || right as usize >= node_count {
                        return Err(BuildError::index(format!(
                            "spatial child reference out of range: {left}/{right} of {node_count}"
                        )));
                    }
                    SpatialNodeKind::Internal {
                        axis,
                        split,
                        left,
                        right,
                    }
                }
                NODE_LEAF => {
                    let count = read_varint(data, &mut pos)? as usize;
                    // Family byte plus two varints per locator.
                    if count.saturating_mul(3) > data.len().saturating_sub(pos) {
                        return Err(BuildError::invalid_format(
                            "spatial leaf count exceeds blob size",
                        ));
                    }
                    let mut locators = Vec::with_capacity(count);
                    for _ in 0..count {
                        locators.push(Locator::decode(data, &mut pos)?);
                    }
                    SpatialNodeKind::Leaf { locators }
                }
                other => {
                    return Err(BuildError::invalid_format(format!(
                        "unknown spatial node kind {other}"
                    )));
                }
            };
            nodes.push(SpatialNode { extent, kind });
        }
        if pos != data.len() {
            return Err(BuildError::invalid_format(
                "trailing bytes after spatial nodes",
            ));
        }
        Ok(Self {
            grid_depth,
            leaf_capacity,
            nodes,
        })
    }
}

#[derive(Clone, Copy)]
struct Entry {
    point: GeometryPoint,
    locator: Locator,
    ordinal: u32,
}

fn extent_of(entries: &[Entry]) -> Option<Extent> {
    let (first, rest) = entries.split_first()?;
    let mut extent = Extent::from_point(first.point);
    for entry in rest {
        extent.expand(entry.point);
    }
    Some(extent)
}

/// Median whose value partition leaves both halves nonempty, if one exists.
///
/// Sorts `entries` by (coordinate, arrival order) as a side effect. Returns
/// `None` only when every coordinate on the axis is equal.
fn usable_split(entries: &mut [Entry], axis: Axis) -> Option<i32> {
    entries.sort_by_key(|e| (axis.coord(e.point), e.ordinal));
    let min = axis.coord(entries[0].point);
    let mid = axis.coord(entries[entries.len() / 2].point);
    if mid > min {
        return Some(mid);
    }
    // The median sits inside the run of minimum values; the first larger
    // coordinate, if any, is at or after the midpoint.
    entries[entries.len() / 2..]
        .iter()
        .map(|e| axis.coord(e.point))
        .find(|&coord| coord > min)
}

fn child_extents(
    extent: Extent,
    axis: Axis,
    split: i32,
    left: &[Entry],
    right: &[Entry],
) -> (Extent, Extent) {
    let low_half = match axis {
        Axis::Lon => Extent::new(extent.min_lat, extent.min_lon, extent.max_lat, split),
        Axis::Lat => Extent::new(extent.min_lat, extent.min_lon, split, extent.max_lon),
    };
    let high_half = match axis {
        Axis::Lon => Extent::new(extent.min_lat, split, extent.max_lat, extent.max_lon),
        Axis::Lat => Extent::new(split, extent.min_lon, extent.max_lat, extent.max_lon),
    };
    (
        extent_of(left).unwrap_or(low_half),
        extent_of(right).unwrap_or(high_half),
    )
}

fn build_node(
    nodes: &mut Vec<SpatialNode>,
    entries: &mut [Entry],
    extent: Extent,
    depth: u8,
    grid_depth: u8,
    leaf_capacity: usize,
    axis: Axis,
) -> u32 {
    let index = nodes.len() as u32;
    nodes.push(SpatialNode {
        extent,
        kind: SpatialNodeKind::Leaf {
            locators: Vec::new(),
        },
    });

    let in_grid = depth < grid_depth;
    if !in_grid && entries.len() <= leaf_capacity {
        nodes[index as usize].kind = SpatialNodeKind::Leaf {
            locators: entries.iter().map(|e| e.locator).collect(),
        };
        return index;
    }

    let chosen = if in_grid {
        if entries.is_empty() {
            Some((axis, axis.coord(extent.midpoint())))
        } else if let Some(split) = usable_split(entries, axis) {
            Some((axis, split))
        } else {
            // The cell keeps its fixed shape even when every coordinate
            // matches the median; one empty half is fine at bounded depth.
            Some((axis, axis.coord(entries[entries.len() / 2].point)))
        }
    } else {
        match usable_split(entries, axis) {
            Some(split) => Some((axis, split)),
            None => usable_split(entries, axis.flip()).map(|split| (axis.flip(), split)),
        }
    };

    let Some((split_axis, split)) = chosen else {
        // Every point in the cell is identical, so no split can make
        // progress; the leaf holds them all regardless of capacity.
        nodes[index as usize].kind = SpatialNodeKind::Leaf {
            locators: entries.iter().map(|e| e.locator).collect(),
        };
        return index;
    };

    // `usable_split` leaves the slice sorted by the chosen axis.
    let cut = entries.partition_point(|e| split_axis.coord(e.point) < split);
    let (left_entries, right_entries) = entries.split_at_mut(cut);
    let (left_extent, right_extent) =
        child_extents(extent, split_axis, split, left_entries, right_entries);

    let next_axis = split_axis.flip();
    let left = build_node(
        nodes,
        left_entries,
        left_extent,
        depth + 1,
        grid_depth,
        leaf_capacity,
        next_axis,
    );
    let right = build_node(
        nodes,
        right_entries,
        right_extent,
        depth + 1,
        grid_depth,
        leaf_capacity,
        next_axis,
    );
    nodes[index as usize].kind = SpatialNodeKind::Internal {
        axis: split_axis,
        split,
        left,
        right,
    };
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParcelFamily, ParcelSeq};

    fn locator(offset: u32) -> Locator {
        Locator::new(ParcelFamily::Cartographic, ParcelSeq::new(0), offset)
    }

    fn scatter(count: usize) -> Vec<(GeometryPoint, Locator)> {
        (0..count)
            .map(|i| {
                let lat = (i as i32 * 7919) % 90_000_000 - 45_000_000;
                let lon = (i as i32 * 104_729) % 180_000_000 - 90_000_000;
                (GeometryPoint::new(lat, lon), locator(i as u32))
            })
            .collect()
    }

    fn config(depth: u8, capacity: usize) -> BuildConfig {
        BuildConfig::new()
            .spatial_grid_depth(depth)
            .spatial_leaf_capacity(capacity)
    }

    #[test]
    fn every_point_reaches_its_locator_exactly_once() {
        let entries = scatter(500);
        let index = SpatialIndexBuilder::new(&config(3, 8)).build(&entries);
        for (point, loc) in &entries {
            let hits = index.lookup(*point);
            let count = hits.iter().filter(|&hit| hit == loc).count();
            assert_eq!(
                count, 1,
                "locator {loc} appears {count} times in the leaf for {point:?}"
            );
        }
        // No locator is stored in more than one leaf either.
        let mut counts: std::collections::BTreeMap<Locator, usize> =
            std::collections::BTreeMap::new();
        for loc in index.locators() {
            *counts.entry(loc).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), entries.len());
        assert!(counts.values().all(|&count| count == 1));
    }

    #[test]
    fn grid_is_built_even_for_one_point() {
        let entries = vec![(GeometryPoint::new(1, 2), locator(0))];
        let index = SpatialIndexBuilder::new(&config(2, 8)).build(&entries);
        // Depth-2 grid: 3 internal nodes plus 4 cells at least.
        let internals = index
            .nodes()
            .iter()
            .filter(|n| matches!(n.kind, SpatialNodeKind::Internal { .. }))
            .count();
        assert!(internals >= 3);
        assert_eq!(index.lookup(GeometryPoint::new(1, 2)), &[locator(0)]);
    }

    #[test]
    fn empty_region_still_has_a_grid() {
        let index = SpatialIndexBuilder::new(&config(2, 8)).build(&[]);
        assert!(!index.nodes().is_empty());
        assert!(index.lookup(GeometryPoint::new(0, 0)).is_empty());
        let blob = index.encode();
        let decoded = SpatialIndex::decode(&blob).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn identical_points_terminate_in_one_leaf() {
        let entries: Vec<_> = (0..40)
            .map(|i| (GeometryPoint::new(5, 5), locator(i)))
            .collect();
        let index = SpatialIndexBuilder::new(&config(1, 4)).build(&entries);
        let hits = index.lookup(GeometryPoint::new(5, 5));
        assert_eq!(hits.len(), 40);
    }

    #[test]
    fn duplicate_heavy_input_terminates() {
        let mut entries: Vec<_> = (0..30)
            .map(|i| (GeometryPoint::new(0, 0), locator(i)))
            .collect();
        entries.push((GeometryPoint::new(0, 1), locator(30)));
        entries.push((GeometryPoint::new(1, 0), locator(31)));
        let index = SpatialIndexBuilder::new(&config(0, 4)).build(&entries);
        for (point, loc) in &entries {
            assert!(index.lookup(*point).contains(loc));
        }
    }

    #[test]
    fn blob_roundtrip_preserves_nodes() {
        let entries = scatter(128);
        let index = SpatialIndexBuilder::new(&config(2, 8)).build(&entries);
        let blob = index.encode();
        let decoded = SpatialIndex::decode(&blob).unwrap();
        assert_eq!(decoded, index);
        assert_eq!(decoded.locators().count(), 128);
    }

    #[test]
    fn builds_are_deterministic() {
        let entries = scatter(256);
        let a = SpatialIndexBuilder::new(&config(3, 8)).build(&entries).encode();
        let b = SpatialIndexBuilder::new(&config(3, 8)).build(&entries).encode();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_node_kind_rejected() {
        let entries = scatter(4);
        let index = SpatialIndexBuilder::new(&config(1, 8)).build(&entries);
        let mut blob = index.encode();
        // First node kind byte follows the three header fields.
        let kind_at = 1 + 1 + 1;
        blob[kind_at] = 9;
        assert!(SpatialIndex::decode(&blob).is_err());
    }

    #[test]
    fn out_of_range_child_rejected() {
        let entries = scatter(64);
        let index = SpatialIndexBuilder::new(&config(1, 8)).build(&entries);
        let blob = index.encode();
        let decoded = SpatialIndex::decode(&blob).unwrap();
        assert_eq!(decoded.nodes().len(), index.nodes().len());
        let mut nodes = index.nodes().to_vec();
        if let SpatialNodeKind::Internal { left, .. } = &mut nodes[0].kind {
            *left = u32::MAX;
        }
        let broken = SpatialIndex {
            grid_depth: 1,
            leaf_capacity: 8,
            nodes,
        };
        assert!(SpatialIndex::decode(&broken.encode()).is_err());
    }
}
