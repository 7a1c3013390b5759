//! Error types for the record codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding records.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Coordinate does not fit the fixed-point range at the configured precision.
    #[error("coordinate out of range: {axis} {degrees} at precision {precision}")]
    CoordinateOutOfRange {
        /// Which axis overflowed.
        axis: &'static str,
        /// The offending value in degrees.
        degrees: f64,
        /// Decimal digits of the fixed-point encoding.
        precision: u8,
    },

    /// Precision outside the supported range.
    #[error("unsupported precision {precision}, maximum is {max}")]
    UnsupportedPrecision {
        /// Requested precision.
        precision: u8,
        /// Highest supported precision.
        max: u8,
    },

    /// Polyline carries no points.
    #[error("empty geometry for way {way_id}")]
    EmptyGeometry {
        /// Identifier of the offending road.
        way_id: u64,
    },

    /// Name id is not present in the dictionary.
    #[error("unknown name id {id}")]
    UnknownName {
        /// The unresolved id.
        id: u32,
    },

    /// Varint is truncated, over-long, or overflows its target width.
    #[error("invalid varint at offset {offset}")]
    InvalidVarint {
        /// Byte offset where decoding started.
        offset: usize,
    },

    /// Record frame is truncated or structurally malformed.
    #[error("invalid frame: {message}")]
    InvalidFrame {
        /// Description of the defect.
        message: String,
    },
}

impl CodecError {
    /// Creates an invalid frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }
}
