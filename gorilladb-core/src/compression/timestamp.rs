//! Delta-of-delta timestamp compression
//!
//! - First timestamp: raw big-endian i64, byte-aligned
//! - Second timestamp: raw big-endian i64 delta, byte-aligned
//! - Every later timestamp: delta-of-delta with a variable-length prefix code
//!
//! | dod                       | prefix | payload |
//! |---------------------------|--------|---------|
//! | 0                         | `0`    | -       |
//! | `[-64, 63]`               | `10`   | 7       |
//! | `[-256, 255]`             | `110`  | 9       |
//! | `[-2048, 2047]`           | `1110` | 12      |
//! | `[i32::MIN, i32::MAX]`    | `1111` | 32      |
//!
//! Payloads are two's complement. A dod outside the 32-bit tier is rejected
//! before any bit is written.

use super::bitstream::{fits_signed, BitReader, BitWriter};
use super::{compression_ratio, savings_percent};
use crate::{GorillaError, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// (prefix, prefix length, payload width) for every non-zero tier
const DOD_TIERS: [(u64, u32, u32); 4] = [
    (0b10, 2, 7),
    (0b110, 3, 9),
    (0b1110, 4, 12),
    (0b1111, 4, 32),
];

/// Total encoded width of a delta-of-delta, or `None` if it has no tier
pub fn dod_encoded_bits(dod: i64) -> Option<u32> {
    if dod == 0 {
        return Some(1);
    }
    DOD_TIERS
        .iter()
        .find(|(_, _, payload)| fits_signed(dod, *payload))
        .map(|(_, prefix_len, payload)| prefix_len + payload)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeltaState {
    Empty,
    First { prev: Timestamp },
    Running { prev: Timestamp, delta: i64 },
}

/// Delta-of-delta timestamp encoder
#[derive(Debug, Clone)]
pub struct TimestampEncoder {
    state: DeltaState,
    count: usize,
}

impl TimestampEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            state: DeltaState::Empty,
            count: 0,
        }
    }

    /// Number of timestamps encoded
    pub fn count(&self) -> usize {
        self.count
    }

    /// Encode a timestamp into `writer`.
    ///
    /// On error the writer and the encoder are left untouched.
    pub fn encode(&mut self, writer: &mut BitWriter, timestamp: Timestamp) -> Result<()> {
        self.state = match self.state {
            DeltaState::Empty => {
                writer.write_i64(timestamp);
                DeltaState::First { prev: timestamp }
            }
            DeltaState::First { prev } => {
                let delta = timestamp.wrapping_sub(prev);
                writer.write_i64(delta);
                DeltaState::Running { prev: timestamp, delta }
            }
            DeltaState::Running { prev, delta: prev_delta } => {
                let delta = timestamp.wrapping_sub(prev);
                let dod = delta.wrapping_sub(prev_delta);
                write_dod(writer, dod)?;
                DeltaState::Running { prev: timestamp, delta }
            }
        };
        self.count += 1;
        Ok(())
    }

    /// Check that `timestamp` can be encoded next without writing it
    pub fn check(&self, timestamp: Timestamp) -> Result<()> {
        if let DeltaState::Running { prev, delta: prev_delta } = self.state {
            let dod = timestamp.wrapping_sub(prev).wrapping_sub(prev_delta);
            if dod_encoded_bits(dod).is_none() {
                return Err(GorillaError::TimestampGap { dod });
            }
        }
        Ok(())
    }

    /// Last encoded timestamp
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        match self.state {
            DeltaState::Empty => None,
            DeltaState::First { prev } | DeltaState::Running { prev, .. } => Some(prev),
        }
    }
}

impl Default for TimestampEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_dod(writer: &mut BitWriter, dod: i64) -> Result<()> {
    if dod == 0 {
        writer.write_bit(false);
        return Ok(());
    }

    let (prefix, prefix_len, payload) = DOD_TIERS
        .iter()
        .copied()
        .find(|(_, _, payload)| fits_signed(dod, *payload))
        .ok_or(GorillaError::TimestampGap { dod })?;

    writer.write_bits(prefix, prefix_len)?;
    writer.write_signed(dod, payload)
}

fn read_dod(reader: &mut BitReader<'_>) -> Result<i64> {
    let mut ones = 0;
    while ones < DOD_TIERS.len() && reader.read_bit()? {
        ones += 1;
    }
    if ones == 0 {
        return Ok(0);
    }
    let (_, _, payload) = DOD_TIERS[ones - 1];
    reader.read_signed(payload)
}

/// Delta-of-delta timestamp decoder
#[derive(Debug, Clone)]
pub struct TimestampDecoder {
    state: DeltaState,
    count: usize,
}

impl TimestampDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self {
            state: DeltaState::Empty,
            count: 0,
        }
    }

    /// Number of timestamps decoded
    pub fn count(&self) -> usize {
        self.count
    }

    /// Decode the next timestamp from `reader`
    pub fn decode(&mut self, reader: &mut BitReader<'_>) -> Result<Timestamp> {
        let (timestamp, state) = match self.state {
            DeltaState::Empty => {
                let timestamp = reader.read_i64()?;
                (timestamp, DeltaState::First { prev: timestamp })
            }
            DeltaState::First { prev } => {
                let delta = reader.read_i64()?;
                let timestamp = prev.wrapping_add(delta);
                (timestamp, DeltaState::Running { prev: timestamp, delta })
            }
            DeltaState::Running { prev, delta: prev_delta } => {
                let delta = prev_delta.wrapping_add(read_dod(reader)?);
                let timestamp = prev.wrapping_add(delta);
                (timestamp, DeltaState::Running { prev: timestamp, delta })
            }
        };
        self.state = state;
        self.count += 1;
        Ok(timestamp)
    }
}

impl Default for TimestampDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Compress a timestamp sequence into a standalone buffer
pub fn compress_timestamps(timestamps: &[Timestamp]) -> Result<Vec<u8>> {
    let mut writer = BitWriter::with_capacity(16 + timestamps.len() / 4);
    let mut encoder = TimestampEncoder::new();
    for &ts in timestamps {
        encoder.encode(&mut writer, ts)?;
    }
    Ok(writer.finish())
}

/// Codec-level statistics for a timestamp sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampStats {
    pub count: usize,
    /// 8 bytes per raw timestamp
    pub original_bytes: usize,
    pub compressed_bytes: usize,
    pub compression_ratio: f64,
    pub bits_per_timestamp: f64,
    pub savings_percent: f64,
}

/// Compress `timestamps` and report how well they compressed
pub fn analyze_timestamps(timestamps: &[Timestamp]) -> Result<TimestampStats> {
    let count = timestamps.len();
    let compressed_bytes = if count == 0 {
        0
    } else {
        compress_timestamps(timestamps)?.len()
    };
    let original_bytes = count * 8;
    Ok(TimestampStats {
        count,
        original_bytes,
        compressed_bytes,
        compression_ratio: compression_ratio(original_bytes, compressed_bytes),
        bits_per_timestamp: if count > 0 {
            (compressed_bytes * 8) as f64 / count as f64
        } else {
            0.0
        },
        savings_percent: savings_percent(original_bytes, compressed_bytes),
    })
}

/// Decompress `count` timestamps produced by [`compress_timestamps`]
pub fn decompress_timestamps(data: &[u8], count: usize) -> Result<Vec<Timestamp>> {
    let mut reader = BitReader::new(data);
    let mut decoder = TimestampDecoder::new();
    (0..count).map(|_| decoder.decode(&mut reader)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(timestamps: &[Timestamp]) -> Vec<Timestamp> {
        let data = compress_timestamps(timestamps).unwrap();
        decompress_timestamps(&data, timestamps.len()).unwrap()
    }

    /// Bits spent on the third timestamp when the first two are `0, 1000`
    fn third_point_bits(dod: i64) -> Result<usize> {
        let mut writer = BitWriter::new();
        let mut encoder = TimestampEncoder::new();
        encoder.encode(&mut writer, 0)?;
        encoder.encode(&mut writer, 1000)?;
        let before = writer.bit_len();
        encoder.encode(&mut writer, 2000 + dod)?;
        Ok(writer.bit_len() - before)
    }

    #[test]
    fn test_periodic_roundtrip() {
        let timestamps: Vec<Timestamp> = (0..100).map(|i| 1000 + i * 10).collect();
        assert_eq!(roundtrip(&timestamps), timestamps);
    }

    #[test]
    fn test_analyze_periodic() {
        let timestamps: Vec<Timestamp> = (0..1000).map(|i| 1_700_000_000_000 + i * 1000).collect();
        let stats = analyze_timestamps(&timestamps).unwrap();
        assert_eq!(stats.count, 1000);
        assert_eq!(stats.original_bytes, 8000);
        // 16 header bytes + 998 one-bit points
        assert_eq!(stats.compressed_bytes, 16 + 125);
        assert!(stats.compression_ratio > 50.0);
        assert!(stats.bits_per_timestamp < 1.2);
        assert!(stats.savings_percent > 98.0);

        let empty = analyze_timestamps(&[]).unwrap();
        assert_eq!(empty.compressed_bytes, 0);
        assert_eq!(empty.compression_ratio, 0.0);
        assert_eq!(empty.bits_per_timestamp, 0.0);

        let gap = [0, 1, i64::MAX];
        assert!(analyze_timestamps(&gap).is_err());
    }

    #[test]
    fn test_periodic_costs_one_bit_per_point() {
        let mut writer = BitWriter::new();
        let mut encoder = TimestampEncoder::new();
        encoder.encode(&mut writer, 1_000).unwrap();
        encoder.encode(&mut writer, 1_060).unwrap();
        let header = writer.bit_len();
        assert_eq!(header, 128);

        for i in 2..202 {
            encoder.encode(&mut writer, 1_000 + i * 60).unwrap();
        }
        assert_eq!(writer.bit_len() - header, 200);
        assert_eq!(encoder.count(), 202);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(third_point_bits(0).unwrap(), 1);
        assert_eq!(third_point_bits(63).unwrap(), 9);
        assert_eq!(third_point_bits(-64).unwrap(), 9);
        assert_eq!(third_point_bits(64).unwrap(), 12);
        assert_eq!(third_point_bits(-65).unwrap(), 12);
        assert_eq!(third_point_bits(255).unwrap(), 12);
        assert_eq!(third_point_bits(-256).unwrap(), 12);
        assert_eq!(third_point_bits(256).unwrap(), 16);
        assert_eq!(third_point_bits(2047).unwrap(), 16);
        assert_eq!(third_point_bits(-2048).unwrap(), 16);
        assert_eq!(third_point_bits(2048).unwrap(), 36);
        assert_eq!(third_point_bits(i32::MAX as i64).unwrap(), 36);
        assert_eq!(third_point_bits(i32::MIN as i64).unwrap(), 36);
    }

    #[test]
    fn test_boundary_values_roundtrip() {
        for dod in [63, -64, 64, -65, 255, -256, 256, 2047, -2048, 2048, -2049] {
            let timestamps = vec![0, 1000, 2000 + dod, 3000 + dod];
            assert_eq!(roundtrip(&timestamps), timestamps, "dod {}", dod);
        }
    }

    #[test]
    fn test_gap_beyond_32_bits_rejected_cleanly() {
        let mut writer = BitWriter::new();
        let mut encoder = TimestampEncoder::new();
        assert_eq!(encoder.last_timestamp(), None);
        encoder.encode(&mut writer, 0).unwrap();
        encoder.encode(&mut writer, 10).unwrap();
        let before = writer.bit_len();

        let far = 20 + i32::MAX as i64 + 1;
        assert!(encoder.check(far).is_err());
        assert!(encoder.check(20 + i32::MAX as i64).is_ok());
        let err = encoder.encode(&mut writer, far).unwrap_err();
        assert!(matches!(err, GorillaError::TimestampGap { .. }));
        assert_eq!(writer.bit_len(), before);
        assert_eq!(encoder.count(), 2);
        assert_eq!(encoder.last_timestamp(), Some(10));

        // encoder state is intact
        encoder.encode(&mut writer, 20).unwrap();
        let data = writer.finish();
        assert_eq!(decompress_timestamps(&data, 3).unwrap(), vec![0, 10, 20]);
    }

    #[test]
    fn test_jitter_and_irregular() {
        let timestamps = vec![100, 160, 225, 400, 401, 10_000, 10_000, 10_001];
        assert_eq!(roundtrip(&timestamps), timestamps);

        let negative = vec![-5_000, -4_990, -4_980, -4_975];
        assert_eq!(roundtrip(&negative), negative);
    }

    #[test]
    fn test_extreme_first_values() {
        let timestamps = vec![i64::MIN, i64::MIN + 1, i64::MIN + 2];
        assert_eq!(roundtrip(&timestamps), timestamps);
        assert_eq!(roundtrip(&[i64::MAX]), vec![i64::MAX]);
    }

    #[test]
    fn test_truncated_stream_is_eof() {
        let data = compress_timestamps(&[1000, 1010, 1020]).unwrap();
        let err = decompress_timestamps(&data[..12], 2).unwrap_err();
        assert!(err.is_eof());
    }

    #[test]
    fn test_dod_encoded_bits() {
        assert_eq!(dod_encoded_bits(0), Some(1));
        assert_eq!(dod_encoded_bits(1), Some(9));
        assert_eq!(dod_encoded_bits(i64::MAX), None);
    }
}
