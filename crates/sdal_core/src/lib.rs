//! # SDAL Core
//!
//! Parcel packing, indexing, and disc-image assembly for SDAL images.
//!
//! This crate turns normalized road and POI records into a finished
//! ISO-9660 image for legacy navigation head units:
//!
//! - [`ParcelPacker`] fills compressed, checksummed parcels per family
//! - [`SpatialIndexBuilder`] and [`WayIndexBuilder`] build the two index
//!   structures over packed locators
//! - [`ImageAssembler`] lays out region payload files, the global
//!   descriptor, and the final image
//! - [`validate_image`] walks finished bytes and reports every violation
//!
//! The two entry points most callers need are [`build_image`] and
//! [`validate_image`]; everything else is exposed for tools that work on
//! individual layers of the format.
//!
//! ## Usage
//!
//! ```
//! use sdal_core::{build_image, validate_image, BuildConfig, BuildInput, RegionInput, RoadInput};
//!
//! let mut region = RegionInput::new("metro");
//! region.roads.push(RoadInput {
//!     way_id: 10,
//!     name: Some("Main St".to_owned()),
//!     attributes: 0,
//!     navigable: true,
//!     points: vec![(52.52, 13.40), (52.53, 13.41)],
//! });
//! let mut input = BuildInput::new();
//! input.push_region(region);
//!
//! let image = build_image(&input, &BuildConfig::new()).unwrap();
//! assert!(validate_image(&image).is_clean());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod assemble;
mod config;
mod crc;
mod density;
mod descriptor;
mod directory;
mod error;
mod huffman;
mod input;
mod iso;
mod parcel;
mod pipeline;
mod spatial;
mod types;
mod validate;
mod wayindex;

pub use assemble::{region_file_name, ImageAssembler};
pub use config::BuildConfig;
pub use crc::compute_crc32;
pub use density::DensityBuilder;
pub use descriptor::{
    Descriptor, RegionSummary, DESCRIPTOR_FILE_NAME, DESCRIPTOR_MAGIC, DESCRIPTOR_VERSION,
};
pub use directory::{
    assemble_region, parse_region, DirectoryEntry, ParsedRegion, DIRECTORY_ENTRY_LEN,
    PAYLOAD_MAGIC, PAYLOAD_VERSION,
};
pub use error::{BuildError, BuildResult, CompressionError, PackagingError};
pub use huffman::{compress, compress_payload, decompress, CodeEntry, CodeTable};
pub use input::{BuildInput, PoiInput, RegionInput, RoadInput};
pub use iso::{read_image, validate_file_name, IsoContents, IsoEntry, IsoWriter, SECTOR_SIZE};
pub use parcel::{decode_parcel, seal_parcel, ParcelHeader, ParcelPacker, SealedParcel};
pub use pipeline::{build_image, morton_key};
pub use spatial::{Axis, SpatialIndex, SpatialIndexBuilder, SpatialNode, SpatialNodeKind};
pub use types::{Locator, ParcelFamily, ParcelSeq};
pub use validate::{validate_image, Finding, FindingKind, ValidationReport, ValidationStats};
pub use wayindex::{scan_for_way, WayChild, WayEntry, WayIndex, WayIndexBuilder, WayNode};

/// Crate version, surfaced by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
