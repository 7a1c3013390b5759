//! Sparse way-id index over the navigable family.
//!
//! Navigable records are packed in ascending way-id order, so the index
//! does not need an entry per record: it keeps every `sparsity`-th record
//! of each parcel and relies on a short forward scan inside the parcel to
//! reach the exact record. The ordinal counter resets at each parcel
//! boundary and the first record of every parcel is always indexed, which
//! pins the nearest preceding entry to the same parcel as its target; a
//! scan can therefore never need to cross into another parcel.
//!
//! Entries are chunked into leaves of `fanout` keys, and internal levels
//! of (lowest key, child) pairs are stacked on top until one node remains.
//! Nodes are stored bottom-up in one flat vector, so every child reference
//! points at a smaller index and the decoder can reject cycles by a single
//! comparison.

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::types::{read_varint_u32_cursor, Locator};
use sdal_codec::{read_frame, read_varint, write_varint, NavRoad};

const NODE_INTERNAL: u8 = 0;
const NODE_LEAF: u8 = 1;

/// One sparse entry: a way id and the frame that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WayEntry {
    /// Way identifier of the indexed record.
    pub way_id: u64,
    /// Frame locator of the indexed record.
    pub locator: Locator,
}

/// A child reference inside an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WayChild {
    /// Smallest way id reachable through this child.
    pub lowest: u64,
    /// Index of the child node.
    pub node: u32,
}

/// One node of the way index tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WayNode {
    /// Routing level holding (lowest key, child) pairs.
    Internal {
        /// Children in ascending key order.
        children: Vec<WayChild>,
    },
    /// Bottom level holding sparse entries.
    Leaf {
        /// Entries in ascending way-id order.
        entries: Vec<WayEntry>,
    },
}

/// Builds a [`WayIndex`] with the configured fanout and sparsity.
#[derive(Debug, Clone, Copy)]
pub struct WayIndexBuilder {
    fanout: usize,
    sparsity: usize,
}

impl WayIndexBuilder {
    /// Creates a builder from the image configuration.
    #[must_use]
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            fanout: config.way_index_fanout,
            sparsity: config.way_index_sparsity,
        }
    }

    /// Builds the index over every navigable record, in packed order.
    ///
    /// `records` must be strictly increasing by way id.
    pub fn build(&self, records: &[(u64, Locator)]) -> BuildResult<WayIndex> {
        let mut entries = Vec::new();
        let mut previous: Option<u64> = None;
        let mut parcel = None;
        let mut ordinal = 0usize;
        for &(way_id, locator) in records {
            if let Some(prev) = previous {
                if way_id <= prev {
                    return Err(BuildError::index(format!(
                        "way ids not strictly increasing: {way_id} after {prev}"
                    )));
                }
            }
            previous = Some(way_id);
            if parcel != Some(locator.sequence) {
                parcel = Some(locator.sequence);
                ordinal = 0;
            }
            if ordinal % self.sparsity == 0 {
                entries.push(WayEntry { way_id, locator });
            }
            ordinal += 1;
        }

        let mut nodes = Vec::new();
        if entries.is_empty() {
            nodes.push(WayNode::Leaf {
                entries: Vec::new(),
            });
        } else {
            // Leaves first, then internal levels stacked until one node
            // covers everything.
            let mut level: Vec<WayChild> = Vec::new();
            for chunk in entries.chunks(self.fanout) {
                level.push(WayChild {
                    lowest: chunk[0].way_id,
                    node: nodes.len() as u32,
                });
                nodes.push(WayNode::Leaf {
                    entries: chunk.to_vec(),
                });
            }
            while level.len() > 1 {
                let mut upper = Vec::new();
                for chunk in level.chunks(self.fanout) {
                    upper.push(WayChild {
                        lowest: chunk[0].lowest,
                        node: nodes.len() as u32,
                    });
                    nodes.push(WayNode::Internal {
                        children: chunk.to_vec(),
                    });
                }
                level = upper;
            }
        }
        let root = nodes.len() as u32 - 1;
        Ok(WayIndex {
            fanout: self.fanout,
            sparsity: self.sparsity,
            entry_count: entries.len() as u64,
            record_count: records.len() as u64,
            nodes,
            root,
        })
    }
}

/// Way-id to parcel index for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WayIndex {
    fanout: usize,
    sparsity: usize,
    entry_count: u64,
    record_count: u64,
    nodes: Vec<WayNode>,
    root: u32,
}

impl WayIndex {
    /// Sparse stride the index was built with.
    #[must_use]
    pub fn sparsity(&self) -> usize {
        self.sparsity
    }

    /// Number of sparse entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Number of navigable records the index covers.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// All nodes, leaves before their parents.
    #[must_use]
    pub fn nodes(&self) -> &[WayNode] {
        &self.nodes
    }

    /// Nearest sparse entry at or before `way_id`, if any.
    #[must_use]
    pub fn locate(&self, way_id: u64) -> Option<Locator> {
        let mut index = self.root as usize;
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index)? {
                WayNode::Leaf { entries } => {
                    let pos = entries.partition_point(|e| e.way_id <= way_id);
                    return if pos == 0 {
                        None
                    } else {
                        Some(entries[pos - 1].locator)
                    };
                }
                WayNode::Internal { children } => {
                    let pos = children.partition_point(|c| c.lowest <= way_id);
                    if pos == 0 {
                        return None;
                    }
                    index = children[pos - 1].node as usize;
                }
            }
        }
        None
    }

    /// Every sparse entry, in ascending way-id order.
    pub fn entries(&self) -> impl Iterator<Item = WayEntry> + '_ {
        self.nodes
            .iter()
            .flat_map(|node| match node {
                WayNode::Leaf { entries } => entries.as_slice(),
                WayNode::Internal { .. } => &[],
            })
            .copied()
    }

    /// Serializes the index into its parcel payload form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, self.fanout as u64);
        write_varint(&mut buf, self.sparsity as u64);
        write_varint(&mut buf, self.entry_count);
        write_varint(&mut buf, self.record_count);
        write_varint(&mut buf, self.nodes.len() as u64);
        write_varint(&mut buf, u64::from(self.root));
        for node in &self.nodes {
            match node {
                WayNode::Internal { children } => {
                    buf.push(NODE_INTERNAL);
                    write_varint(&mut buf, children.len() as u64);
                    for child in children {
                        write_varint(&mut buf, child.lowest);
                        write_varint(&mut buf, u64::from(child.node));
                    }
                }
                WayNode::Leaf { entries } => {
                    buf.push(NODE_LEAF);
                    write_varint(&mut buf, entries.len() as u64);
                    for entry in entries {
                        write_varint(&mut buf, entry.way_id);
                        entry.locator.encode(&mut buf);
                    }
                }
            }
        }
        buf
    }

    /// Parses and validates a serialized index.
    pub fn decode(data: &[u8]) -> BuildResult<Self> {
        let mut pos = 0usize;
        let fanout = read_varint(data, &mut pos)? as usize;
        let sparsity = read_varint(data, &mut pos)? as usize;
        let entry_count = read_varint(data, &mut pos)?;
        let record_count = read_varint(data, &mut pos)?;
        let node_count = read_varint_u32_cursor(data, &mut pos)? as usize;
        let root = read_varint_u32_cursor(data, &mut pos)?;
        if node_count == 0 || root as usize != node_count - 1 {
            return Err(BuildError::invalid_format(
                "way index root must be the last node",
            ));
        }
        // A node is at least two bytes on the wire.
        if node_count.saturating_mul(2) > data.len().saturating_sub(pos) {
            return Err(BuildError::invalid_format(
                "way index node count exceeds blob size",
            ));
        }
        let mut nodes = Vec::with_capacity(node_count);
        for index in 0..node_count {
            let kind = *data.get(pos).ok_or_else(|| {
                BuildError::invalid_format("way index truncated at node kind")
            })?;
            pos += 1;
            let count = read_varint(data, &mut pos)? as usize;
            let node = match kind {
                NODE_INTERNAL => {
                    if count.saturating_mul(2) > data.len().saturating_sub(pos) {
                        return Err(BuildError::invalid_format(
                            "way index child count exceeds blob size",
                        ));
                    }
                    let mut children = Vec::with_capacity(count);
                    for _ in 0..count {
                        let lowest = read_varint(data, &mut pos)?;
                        let child = read_varint_u32_cursor(data, &mut pos)?;
                        if child as usize >= index {
                            return Err(BuildError::index(format!(
                                "way index child {child} not below parent {index}"
                            )));
                        }
                        children.push(WayChild {
                            lowest,
                            node: child,
                        });
                    }
                    WayNode::Internal { children }
                }
                NODE_LEAF => {
                    // Way id plus a three-byte minimum locator per entry.
                    if count.saturating_mul(4) > data.len().saturating_sub(pos) {
                        return Err(BuildError::invalid_format(
                            "way index entry count exceeds blob size",
                        ));
                    }
                    let mut entries = Vec::with_capacity(count);
                    for _ in 0..count {
                        let way_id = read_varint(data, &mut pos)?;
                        let locator = Locator::decode(data, &mut pos)?;
                        entries.push(WayEntry { way_id, locator });
                    }
                    WayNode::Leaf { entries }
                }
                other => {
                    return Err(BuildError::invalid_format(format!(
                        "unknown way index node kind {other}"
                    )));
                }
            };
            nodes.push(node);
        }
        if pos != data.len() {
            return Err(BuildError::invalid_format(
                "trailing bytes after way index nodes",
            ));
        }
        Ok(Self {
            fanout,
            sparsity,
            entry_count,
            record_count,
            nodes,
            root,
        })
    }
}

/// Forward-scans record frames for the one carrying exactly `way_id`.
///
/// `payload` is a decompressed navigable parcel and `start_offset` a frame
/// boundary inside it, normally the locator returned by
/// [`WayIndex::locate`]. Returns the frame offset on a hit; stops early on
/// the first larger key since the payload is sorted.
pub fn scan_for_way(payload: &[u8], start_offset: u32, way_id: u64) -> BuildResult<Option<u32>> {
    let mut pos = start_offset as usize;
    while pos < payload.len() {
        let frame_offset = pos as u32;
        let body = read_frame(payload, &mut pos)?;
        let found = NavRoad::peek_way_id(body)?;
        if found == way_id {
            return Ok(Some(frame_offset));
        }
        if found > way_id {
            return Ok(None);
        }
    }
    Ok(None)
}
