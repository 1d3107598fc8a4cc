//! GorillaDB Core - Gorilla-compressed multivariate time series
//!
//! An in-memory engine that stores timestamped points of several float
//! variables in compact bit-packed blocks, using the delta-of-delta and XOR
//! schemes from Facebook's Gorilla paper.
//!
//! # Architecture
//!
//! - **Compression**: bit stream plus the timestamp and value codecs
//! - **Block**: one time window of interleaved points, sealed into immutable bytes
//! - **Series**: fixed-duration blocks of one schema, with range queries
//! - **Store**: a registry of named series

pub mod block;
pub mod compression;
pub mod storage;

mod error;
mod types;

pub use block::{Block, BlockDecoder, SealedBlock};
pub use error::{ErrorKind, GorillaError, Result};
pub use storage::{Series, SeriesConfig, Store};
pub use types::*;

/// GorillaDB version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Block duration: two hours in milliseconds
    pub const DEFAULT_BLOCK_DURATION_MS: i64 = 2 * 60 * 60 * 1000;

    /// Most wasted window bits the verification strategy still reuses
    pub const VERIFICATION_WASTE_THRESHOLD: u32 = 11;

    /// Initial capacity of a block's write buffer (bytes)
    pub const WRITER_CAPACITY_HINT: usize = 4 * 1024;
}
