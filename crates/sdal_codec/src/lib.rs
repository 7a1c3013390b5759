//! # SDAL Codec
//!
//! Record-level codec for SDAL parcel images.
//!
//! This crate owns the byte layouts below the parcel layer:
//! - Fixed-point quantization of geographic coordinates
//! - LEB128 varints and zigzag signed encoding
//! - Delta-encoded polylines (first point absolute, rest deltas)
//! - The per-build name dictionary shared by every record family
//! - Record frames for the cartographic, navigable, and overlay families
//!
//! Encoding is deterministic: identical input produces identical bytes, so
//! image builds are reproducible byte for byte.
//!
//! ## Usage
//!
//! ```
//! use sdal_codec::{CartoRoad, GeometryPoint, NameDictionary};
//!
//! let mut names = NameDictionary::new();
//! let road = CartoRoad {
//!     way_id: 10,
//!     attributes: 0,
//!     name: Some(names.intern("Main St")),
//!     navigable: true,
//!     points: vec![GeometryPoint::new(52_520_008, 13_404_954)],
//! };
//!
//! let body = road.encode_body().unwrap();
//! let decoded = CartoRoad::decode_body(&body).unwrap();
//! assert_eq!(road, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod geometry;
mod names;
mod record;
mod varint;

pub use error::{CodecError, CodecResult};
pub use geometry::{
    dequantize, quantize, Extent, GeometryPoint, DEFAULT_PRECISION, MAX_PRECISION,
};
pub use names::{NameDictionary, NameId};
pub use record::{
    read_frame, write_frame, CartoRoad, DensityTile, FrameIter, NavRoad, OverlayRecord, Poi,
    RecordFlags, OVERLAY_KIND_DENSITY, OVERLAY_KIND_POI,
};
pub use varint::{
    read_varint, read_varint_u32, read_zigzag32, varint_len, write_varint, write_zigzag32,
    MAX_VARINT_BYTES,
};
