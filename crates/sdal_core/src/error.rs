//! Error types for image building.

use crate::types::ParcelFamily;
use std::io;
use thiserror::Error;

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors that can occur while building or reading an image.
///
/// All of these are deterministic functions of input and configuration;
/// none are retried. A failure aborts the whole region build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Record codec error.
    #[error("encoding error: {0}")]
    Encoding(#[from] sdal_codec::CodecError),

    /// A single record cannot fit any parcel.
    #[error(
        "record {record_id} needs {encoded_len} bytes framed, \
         {family} parcel payload limit is {limit}"
    )]
    Capacity {
        /// Family the record was being packed into.
        family: ParcelFamily,
        /// Identifier of the offending record.
        record_id: u64,
        /// Framed size of the record in bytes.
        encoded_len: usize,
        /// Configured payload limit in bytes.
        limit: usize,
    },

    /// Parcel compression failed.
    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    /// Stored and computed checksums disagree.
    #[error("checksum mismatch in {family} parcel {sequence}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Family of the damaged parcel.
        family: ParcelFamily,
        /// Sequence of the damaged parcel.
        sequence: u32,
        /// Checksum stored in the parcel header.
        expected: u32,
        /// Checksum computed over the decompressed payload.
        actual: u32,
    },

    /// Index construction or resolution failure.
    #[error("index error: {message}")]
    Index {
        /// Description of the violation.
        message: String,
    },

    /// Disc image layout constraint violated.
    #[error("packaging error: {0}")]
    Packaging(#[from] PackagingError),

    /// The assembled image failed its own validation pass.
    #[error("self-check found {count} violations; first: {first}")]
    SelfCheck {
        /// Number of findings.
        count: usize,
        /// The first finding, for the error message.
        first: String,
    },

    /// Invalid build configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the invalid field.
        message: String,
    },

    /// Malformed image, payload, or blob structure.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the defect.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BuildError {
    /// Creates an index error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}

/// Errors from the per-parcel compression layer.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// A code table cannot be built for an empty payload.
    #[error("cannot build a code table for an empty payload")]
    EmptyPayload,

    /// Serialized code table is malformed.
    #[error("invalid code table: {message}")]
    InvalidTable {
        /// Description of the defect.
        message: String,
    },

    /// A payload byte has no code in the table.
    #[error("symbol {symbol:#04x} has no code in the table")]
    UnknownSymbol {
        /// The uncodable byte.
        symbol: u8,
    },

    /// The bitstream ended before all symbols were decoded.
    #[error("bitstream exhausted after {decoded} of {expected} symbols")]
    TruncatedStream {
        /// Symbols decoded before the stream ran out.
        decoded: usize,
        /// Symbols the parcel header promised.
        expected: usize,
    },

    /// A bit pattern does not map to any symbol.
    #[error("bit pattern at symbol {decoded} maps to no table entry")]
    UnknownCode {
        /// Symbols decoded before the bad pattern.
        decoded: usize,
    },
}

impl CompressionError {
    /// Creates an invalid table error.
    pub fn invalid_table(message: impl Into<String>) -> Self {
        Self::InvalidTable {
            message: message.into(),
        }
    }
}

/// Errors from disc-image mastering.
#[derive(Debug, Error)]
pub enum PackagingError {
    /// Two files map to the same identifier.
    #[error("duplicate file name on image: {name}")]
    DuplicateFileName {
        /// The colliding identifier.
        name: String,
    },

    /// A name cannot be expressed as a valid identifier.
    #[error("file name not representable on the image: {name}")]
    InvalidFileName {
        /// The rejected name.
        name: String,
    },

    /// A single file exceeds the format's extent limit.
    #[error("file {name} is {size} bytes, over the {limit}-byte single-file limit")]
    FileTooLarge {
        /// Name of the oversized file.
        name: String,
        /// Actual size in bytes.
        size: u64,
        /// Format limit in bytes.
        limit: u64,
    },

    /// Total image size exceeds the target capacity.
    #[error("image needs {size} bytes, target capacity is {limit}")]
    CapacityExceeded {
        /// Required image size in bytes.
        size: u64,
        /// Configured capacity in bytes.
        limit: u64,
    },
}
