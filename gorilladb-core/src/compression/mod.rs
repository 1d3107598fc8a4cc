//! Gorilla compression for time-series data
//!
//! Implements the compression scheme from Facebook's paper:
//! "Gorilla: A Fast, Scalable, In-Memory Time Series Database"
//!
//! Timestamps and values are encoded by separate stateful codecs that write
//! into a caller-owned [`BitWriter`], so several codecs can interleave their
//! output in one stream.

mod bitstream;
mod timestamp;
mod value;

pub use bitstream::{fits_signed, to_twos_complement, BitReader, BitWriter};
pub use timestamp::{
    analyze_timestamps, compress_timestamps, decompress_timestamps, dod_encoded_bits,
    TimestampDecoder, TimestampEncoder, TimestampStats,
};
pub use value::{compress_values, decompress_values, ValueDecoder, ValueEncoder, WindowStrategy};

/// `original / compressed`, 0 when nothing was compressed
pub(crate) fn compression_ratio(original: usize, compressed: usize) -> f64 {
    if compressed > 0 {
        original as f64 / compressed as f64
    } else {
        0.0
    }
}

/// Space saved as a percentage of `original`, 0 when empty
pub(crate) fn savings_percent(original: usize, compressed: usize) -> f64 {
    if original > 0 {
        (1.0 - compressed as f64 / original as f64) * 100.0
    } else {
        0.0
    }
}
