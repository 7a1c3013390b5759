//! Record frame encoding.
//!
//! Every record inside a parcel payload is framed as `varint(body_len)`
//! followed by the body, so readers can skip records without decoding them.
//! A locator's byte offset addresses the first byte of the length prefix.
//!
//! Body layouts:
//!
//! ```text
//! cartographic road:
//!   way_id varint | flags u8 | attributes varint | [name_id varint]
//!   | point_count varint | lat0 zigzag | lon0 zigzag
//!   | (dlat zigzag, dlon zigzag) * (point_count - 1)
//!
//! navigable road:
//!   way_id varint | flags u8 | attributes varint | [name_id varint]
//!   | first_lat zigzag | first_lon zigzag | last_lat zigzag | last_lon zigzag
//!
//! overlay (kind byte first):
//!   kind 0: poi_id varint | flags u8 | category varint | [name_id varint]
//!           | lat zigzag | lon zigzag
//!   kind 1: zoom u8 | tile_x varint | tile_y varint | extent (4 zigzags)
//!           | dim varint | dim*dim u16-LE cells
//! ```

use crate::error::{CodecError, CodecResult};
use crate::geometry::{Extent, GeometryPoint};
use crate::names::NameId;
use crate::varint::{read_varint, read_varint_u32, read_zigzag32, write_varint, write_zigzag32};

/// Overlay kind byte for a point of interest.
pub const OVERLAY_KIND_POI: u8 = 0;
/// Overlay kind byte for a density tile.
pub const OVERLAY_KIND_DENSITY: u8 = 1;

/// Bit flags carried by record bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u8);

impl RecordFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Record participates in the navigable topology.
    pub const NAVIGABLE: Self = Self(0x01);
    /// Record body carries a name id.
    pub const HAS_NAME: Self = Self(0x02);

    /// Creates flags from a raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks the navigable flag.
    #[must_use]
    pub const fn is_navigable(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Checks the name flag.
    #[must_use]
    pub const fn has_name(self) -> bool {
        self.0 & 0x02 != 0
    }

    /// Sets the navigable flag.
    #[must_use]
    pub const fn with_navigable(self) -> Self {
        Self(self.0 | 0x01)
    }

    /// Sets the name flag.
    #[must_use]
    pub const fn with_name(self) -> Self {
        Self(self.0 | 0x02)
    }
}

fn flags_for(navigable: bool, name: Option<NameId>) -> RecordFlags {
    let mut flags = RecordFlags::NONE;
    if navigable {
        flags = flags.with_navigable();
    }
    if name.is_some() {
        flags = flags.with_name();
    }
    flags
}

/// Appends `body` as a framed record and returns the frame's start offset.
pub fn write_frame(buf: &mut Vec<u8>, body: &[u8]) -> usize {
    let start = buf.len();
    write_varint(buf, body.len() as u64);
    buf.extend_from_slice(body);
    start
}

/// Reads one frame at `*pos` and returns its body, advancing past it.
pub fn read_frame<'a>(data: &'a [u8], pos: &mut usize) -> CodecResult<&'a [u8]> {
    let len = read_varint(data, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| CodecError::invalid_frame("frame length exceeds payload"))?;
    let body = &data[*pos..end];
    *pos = end;
    Ok(body)
}

/// Iterator over the framed records of an uncompressed parcel payload.
///
/// Yields `(frame_offset, body)` pairs. A malformed frame ends iteration
/// after yielding the error.
pub struct FrameIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameIter<'a> {
    /// Creates an iterator over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = CodecResult<(u32, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let at = self.pos as u32;
        match read_frame(self.data, &mut self.pos) {
            Ok(body) => Some(Ok((at, body))),
            Err(e) => {
                self.pos = self.data.len();
                Some(Err(e))
            }
        }
    }
}

fn read_byte(data: &[u8], pos: &mut usize, what: &str) -> CodecResult<u8> {
    let byte = *data
        .get(*pos)
        .ok_or_else(|| CodecError::invalid_frame(format!("truncated {what}")))?;
    *pos += 1;
    Ok(byte)
}

fn read_name(data: &[u8], pos: &mut usize, flags: RecordFlags) -> CodecResult<Option<NameId>> {
    if flags.has_name() {
        Ok(Some(NameId::new(read_varint_u32(data, pos)?)))
    } else {
        Ok(None)
    }
}

fn expect_end(data: &[u8], pos: usize, what: &str) -> CodecResult<()> {
    if pos == data.len() {
        Ok(())
    } else {
        Err(CodecError::invalid_frame(format!(
            "{} bytes trailing {what} body",
            data.len() - pos
        )))
    }
}

/// Cartographic view of a road: attributes plus the full polyline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartoRoad {
    /// External way identifier.
    pub way_id: u64,
    /// Attribute bitfield.
    pub attributes: u32,
    /// Optional interned name.
    pub name: Option<NameId>,
    /// Whether a navigable twin record exists.
    pub navigable: bool,
    /// Quantized polyline, at least one point.
    pub points: Vec<GeometryPoint>,
}

impl CartoRoad {
    /// Encodes the record body. First point absolute, rest delta-encoded.
    pub fn encode_body(&self) -> CodecResult<Vec<u8>> {
        let (first, rest) = self
            .points
            .split_first()
            .ok_or(CodecError::EmptyGeometry {
                way_id: self.way_id,
            })?;
        let mut buf = Vec::with_capacity(16 + self.points.len() * 4);
        write_varint(&mut buf, self.way_id);
        buf.push(flags_for(self.navigable, self.name).as_byte());
        write_varint(&mut buf, u64::from(self.attributes));
        if let Some(name) = self.name {
            write_varint(&mut buf, u64::from(name.as_u32()));
        }
        write_varint(&mut buf, self.points.len() as u64);
        write_zigzag32(&mut buf, first.lat);
        write_zigzag32(&mut buf, first.lon);
        let mut prev = *first;
        for point in rest {
            write_zigzag32(&mut buf, point.lat.wrapping_sub(prev.lat));
            write_zigzag32(&mut buf, point.lon.wrapping_sub(prev.lon));
            prev = *point;
        }
        Ok(buf)
    }

    /// Decodes a record body produced by [`CartoRoad::encode_body`].
    pub fn decode_body(data: &[u8]) -> CodecResult<Self> {
        let mut pos = 0;
        let way_id = read_varint(data, &mut pos)?;
        let flags = RecordFlags::from_byte(read_byte(data, &mut pos, "road flags")?);
        let attributes = read_varint_u32(data, &mut pos)?;
        let name = read_name(data, &mut pos, flags)?;
        let count = read_varint_u32(data, &mut pos)? as usize;
        if count == 0 {
            return Err(CodecError::EmptyGeometry { way_id });
        }
        // Each point needs at least two varint bytes.
        if count.saturating_mul(2) > data.len() - pos {
            return Err(CodecError::invalid_frame("point count exceeds body"));
        }
        let mut points = Vec::with_capacity(count);
        let first = GeometryPoint::new(
            read_zigzag32(data, &mut pos)?,
            read_zigzag32(data, &mut pos)?,
        );
        points.push(first);
        let mut prev = first;
        for _ in 1..count {
            let point = GeometryPoint::new(
                prev.lat.wrapping_add(read_zigzag32(data, &mut pos)?),
                prev.lon.wrapping_add(read_zigzag32(data, &mut pos)?),
            );
            points.push(point);
            prev = point;
        }
        expect_end(data, pos, "cartographic road")?;
        Ok(Self {
            way_id,
            attributes,
            name,
            navigable: flags.is_navigable(),
            points,
        })
    }

    /// The point the record is spatially indexed by: the midpoint of the
    /// polyline's extent, not any individual vertex.
    #[must_use]
    pub fn representative(&self) -> GeometryPoint {
        match Extent::of_points(&self.points) {
            Some(extent) => extent.midpoint(),
            None => GeometryPoint::new(0, 0),
        }
    }
}

/// Navigable view of a road: attributes and endpoints, no full geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavRoad {
    /// External way identifier.
    pub way_id: u64,
    /// Attribute bitfield.
    pub attributes: u32,
    /// Optional interned name.
    pub name: Option<NameId>,
    /// First polyline point.
    pub first: GeometryPoint,
    /// Last polyline point.
    pub last: GeometryPoint,
}

impl NavRoad {
    /// Encodes the record body. Endpoints are absolute.
    #[must_use]
    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24);
        write_varint(&mut buf, self.way_id);
        buf.push(flags_for(true, self.name).as_byte());
        write_varint(&mut buf, u64::from(self.attributes));
        if let Some(name) = self.name {
            write_varint(&mut buf, u64::from(name.as_u32()));
        }
        write_zigzag32(&mut buf, self.first.lat);
        write_zigzag32(&mut buf, self.first.lon);
        write_zigzag32(&mut buf, self.last.lat);
        write_zigzag32(&mut buf, self.last.lon);
        buf
    }

    /// Decodes a record body produced by [`NavRoad::encode_body`].
    pub fn decode_body(data: &[u8]) -> CodecResult<Self> {
        let mut pos = 0;
        let way_id = read_varint(data, &mut pos)?;
        let flags = RecordFlags::from_byte(read_byte(data, &mut pos, "road flags")?);
        let attributes = read_varint_u32(data, &mut pos)?;
        let name = read_name(data, &mut pos, flags)?;
        let first = GeometryPoint::new(
            read_zigzag32(data, &mut pos)?,
            read_zigzag32(data, &mut pos)?,
        );
        let last = GeometryPoint::new(
            read_zigzag32(data, &mut pos)?,
            read_zigzag32(data, &mut pos)?,
        );
        expect_end(data, pos, "navigable road")?;
        Ok(Self {
            way_id,
            attributes,
            name,
            first,
            last,
        })
    }

    /// Reads only the way identifier from a navigable body.
    ///
    /// Used by the sparse-index forward scan, which compares identifiers
    /// without materializing whole records.
    pub fn peek_way_id(data: &[u8]) -> CodecResult<u64> {
        let mut pos = 0;
        read_varint(data, &mut pos)
    }
}

/// A point of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poi {
    /// External identifier.
    pub poi_id: u64,
    /// Category code.
    pub category: u16,
    /// Optional interned name.
    pub name: Option<NameId>,
    /// Quantized position.
    pub point: GeometryPoint,
}

impl Poi {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        write_varint(buf, self.poi_id);
        buf.push(flags_for(false, self.name).as_byte());
        write_varint(buf, u64::from(self.category));
        if let Some(name) = self.name {
            write_varint(buf, u64::from(name.as_u32()));
        }
        write_zigzag32(buf, self.point.lat);
        write_zigzag32(buf, self.point.lon);
    }

    fn decode_from(data: &[u8], pos: &mut usize) -> CodecResult<Self> {
        let poi_id = read_varint(data, pos)?;
        let flags = RecordFlags::from_byte(read_byte(data, pos, "poi flags")?);
        let category = read_varint_u32(data, pos)?;
        let category = u16::try_from(category)
            .map_err(|_| CodecError::invalid_frame("poi category exceeds u16"))?;
        let name = read_name(data, pos, flags)?;
        let point = GeometryPoint::new(read_zigzag32(data, pos)?, read_zigzag32(data, pos)?);
        Ok(Self {
            poi_id,
            category,
            name,
            point,
        })
    }
}

/// A pre-rendered density tile: a square grid of u16 weights over an extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityTile {
    /// Zoom level the tile belongs to.
    pub zoom: u8,
    /// Column within the zoom level's tile grid.
    pub tile_x: u32,
    /// Row within the zoom level's tile grid.
    pub tile_y: u32,
    /// Geographic extent covered by the tile.
    pub extent: Extent,
    /// Grid dimension; the tile holds `dim * dim` cells in row-major order.
    pub dim: u16,
    /// Cell weights, scaled so the densest cell is 65535.
    pub cells: Vec<u16>,
}

impl DensityTile {
    fn encode_into(&self, buf: &mut Vec<u8>) -> CodecResult<()> {
        let expected = usize::from(self.dim) * usize::from(self.dim);
        if self.cells.len() != expected {
            return Err(CodecError::invalid_frame(format!(
                "density tile holds {} cells, dim {} needs {expected}",
                self.cells.len(),
                self.dim
            )));
        }
        buf.push(self.zoom);
        write_varint(buf, u64::from(self.tile_x));
        write_varint(buf, u64::from(self.tile_y));
        write_zigzag32(buf, self.extent.min_lat);
        write_zigzag32(buf, self.extent.min_lon);
        write_zigzag32(buf, self.extent.max_lat);
        write_zigzag32(buf, self.extent.max_lon);
        write_varint(buf, u64::from(self.dim));
        for cell in &self.cells {
            buf.extend_from_slice(&cell.to_le_bytes());
        }
        Ok(())
    }

    fn decode_from(data: &[u8], pos: &mut usize) -> CodecResult<Self> {
        let zoom = read_byte(data, pos, "density zoom")?;
        let tile_x = read_varint_u32(data, pos)?;
        let tile_y = read_varint_u32(data, pos)?;
        let extent = Extent::new(
            read_zigzag32(data, pos)?,
            read_zigzag32(data, pos)?,
            read_zigzag32(data, pos)?,
            read_zigzag32(data, pos)?,
        );
        let dim = read_varint_u32(data, pos)?;
        let dim = u16::try_from(dim)
            .map_err(|_| CodecError::invalid_frame("density dim exceeds u16"))?;
        let count = usize::from(dim) * usize::from(dim);
        if data.len() - *pos != count * 2 {
            return Err(CodecError::invalid_frame("density cell bytes mismatch"));
        }
        let mut cells = Vec::with_capacity(count);
        for _ in 0..count {
            cells.push(u16::from_le_bytes([data[*pos], data[*pos + 1]]));
            *pos += 2;
        }
        Ok(Self {
            zoom,
            tile_x,
            tile_y,
            extent,
            dim,
            cells,
        })
    }
}

/// A record of the overlay family, discriminated by a leading kind byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayRecord {
    /// Point of interest.
    Poi(Poi),
    /// Density tile.
    Density(DensityTile),
}

impl OverlayRecord {
    /// Encodes the record body including the kind byte.
    pub fn encode_body(&self) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(24);
        match self {
            Self::Poi(poi) => {
                buf.push(OVERLAY_KIND_POI);
                poi.encode_into(&mut buf);
            }
            Self::Density(tile) => {
                buf.push(OVERLAY_KIND_DENSITY);
                tile.encode_into(&mut buf)?;
            }
        }
        Ok(buf)
    }

    /// Decodes an overlay record body.
    pub fn decode_body(data: &[u8]) -> CodecResult<Self> {
        let mut pos = 0;
        let kind = read_byte(data, &mut pos, "overlay kind")?;
        let record = match kind {
            OVERLAY_KIND_POI => Self::Poi(Poi::decode_from(data, &mut pos)?),
            OVERLAY_KIND_DENSITY => Self::Density(DensityTile::decode_from(data, &mut pos)?),
            other => {
                return Err(CodecError::invalid_frame(format!(
                    "unknown overlay kind {other}"
                )))
            }
        };
        expect_end(data, pos, "overlay")?;
        Ok(record)
    }

    /// Representative point used for spatial ordering and indexing.
    #[must_use]
    pub fn representative(&self) -> GeometryPoint {
        match self {
            Self::Poi(poi) => poi.point,
            Self::Density(tile) => tile.extent.midpoint(),
        }
    }
}
