//! Error types for GorillaDB

use thiserror::Error;

/// Result type alias for GorillaDB operations
pub type Result<T> = std::result::Result<T, GorillaError>;

/// GorillaDB error types
#[derive(Error, Debug)]
pub enum GorillaError {
    /// Reader ran out of bits or bytes
    #[error("Unexpected end of stream: needed {needed} bits, {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// A point is missing one of the declared variables
    #[error("Missing variable: {0}")]
    MissingVariable(String),

    /// Write attempted on a sealed block
    #[error("Block is sealed")]
    BlockSealed,

    /// Positional row does not match the schema width
    #[error("Arity mismatch: expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// Schema declared with no variables
    #[error("Schema must declare at least one variable")]
    EmptySchema,

    /// Schema declared the same variable twice
    #[error("Duplicate variable: {0}")]
    DuplicateVariable(String),

    /// Signed value does not fit the requested two's complement width
    #[error("Value {value} does not fit in {bits}-bit two's complement")]
    SignedOutOfRange { value: i64, bits: u32 },

    /// Bit count outside 0..=64
    #[error("Invalid bit width: {0}")]
    BitWidth(u32),

    /// Patch target lies outside the written buffer
    #[error("Patch offset {offset} out of bounds for buffer of {len} bytes")]
    PatchOutOfBounds { offset: usize, len: usize },

    /// Delta-of-delta too wide for the 32-bit tier
    #[error("Timestamp delta-of-delta {dod} exceeds the 32-bit tier")]
    TimestampGap { dod: i64 },

    /// Series key not registered
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// Series key already registered
    #[error("Series already exists: {0}")]
    SeriesExists(String),

    /// Decoded data is inconsistent
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of [`GorillaError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StreamUnderrun,
    SchemaViolation,
    RangeViolation,
    LookupFailure,
    DecodeDesync,
    InvalidConfig,
}

impl GorillaError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GorillaError::UnexpectedEof { .. } => ErrorKind::StreamUnderrun,
            GorillaError::MissingVariable(_)
            | GorillaError::BlockSealed
            | GorillaError::ArityMismatch { .. }
            | GorillaError::EmptySchema
            | GorillaError::DuplicateVariable(_) => ErrorKind::SchemaViolation,
            GorillaError::SignedOutOfRange { .. }
            | GorillaError::BitWidth(_)
            | GorillaError::PatchOutOfBounds { .. }
            | GorillaError::TimestampGap { .. } => ErrorKind::RangeViolation,
            GorillaError::SeriesNotFound(_) | GorillaError::SeriesExists(_) => {
                ErrorKind::LookupFailure
            }
            GorillaError::Corruption(_) | GorillaError::Serialization(_) => {
                ErrorKind::DecodeDesync
            }
            GorillaError::Config(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Check if error is an end-of-stream condition
    pub fn is_eof(&self) -> bool {
        matches!(self, GorillaError::UnexpectedEof { .. })
    }

    /// Check if error indicates corrupted or mismatched input
    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::DecodeDesync
    }
}
