//! XOR-based float compression
//!
//! Each value is XOR-ed with the previous value's bit pattern:
//! - First value: raw big-endian u64 bit pattern, byte-aligned
//! - `xor == 0`: `0`
//! - `xor != 0`, fits the previous window: `10` + window-width bits
//! - otherwise: `11` + leading (5 bits) + `meaningful - 1` (6 bits) + meaningful bits
//!
//! Leading zeros are clamped to 31 to fit the 5-bit field. The 6-bit length
//! field carries `meaningful - 1`, so widths 1..=64 are representable.
//!
//! The codec only looks at bit patterns: `-0.0`, NaN payloads and infinities
//! round-trip exactly.

use super::bitstream::{BitReader, BitWriter};
use crate::config::VERIFICATION_WASTE_THRESHOLD;
use crate::{GorillaError, Result};

const MAX_LEADING: u32 = 31;
const LEADING_BITS: u32 = 5;
const LENGTH_BITS: u32 = 6;

/// Heuristic deciding when the previous meaningful-bits window is reused
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStrategy {
    /// Reuse whenever the new XOR fits inside the previous window
    #[default]
    Standard,
    /// Reuse only if it wastes at most `VERIFICATION_WASTE_THRESHOLD` bits
    /// compared to a tight new window
    Verification,
}

impl WindowStrategy {
    fn reuses(self, window: Window, leading: u32, trailing: u32) -> bool {
        if leading < window.leading || trailing < window.trailing {
            return false;
        }
        match self {
            WindowStrategy::Standard => true,
            WindowStrategy::Verification => {
                let waste = window.meaningful() - (64 - leading - trailing);
                waste <= VERIFICATION_WASTE_THRESHOLD
            }
        }
    }
}

/// Span of meaningful bits inside a 64-bit XOR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    leading: u32,
    trailing: u32,
}

impl Window {
    fn meaningful(self) -> u32 {
        64 - self.leading - self.trailing
    }
}

/// XOR value encoder
#[derive(Debug, Clone)]
pub struct ValueEncoder {
    strategy: WindowStrategy,
    prev_bits: u64,
    window: Option<Window>,
    count: usize,
}

impl ValueEncoder {
    /// Create a new encoder
    pub fn new(strategy: WindowStrategy) -> Self {
        Self {
            strategy,
            prev_bits: 0,
            window: None,
            count: 0,
        }
    }

    /// Number of values encoded
    pub fn count(&self) -> usize {
        self.count
    }

    /// Strategy used by [`encode`](Self::encode)
    pub fn strategy(&self) -> WindowStrategy {
        self.strategy
    }

    /// Encode a value with the encoder's own strategy
    pub fn encode(&mut self, writer: &mut BitWriter, value: f64) -> Result<()> {
        self.encode_with(writer, value, self.strategy)
    }

    /// Encode a value with an explicit strategy for this call
    pub fn encode_with(
        &mut self,
        writer: &mut BitWriter,
        value: f64,
        strategy: WindowStrategy,
    ) -> Result<()> {
        let bits = value.to_bits();

        if self.count == 0 {
            writer.write_u64(bits);
        } else {
            self.encode_xor(writer, bits ^ self.prev_bits, strategy)?;
        }

        self.prev_bits = bits;
        self.count += 1;
        Ok(())
    }

    fn encode_xor(
        &mut self,
        writer: &mut BitWriter,
        xor: u64,
        strategy: WindowStrategy,
    ) -> Result<()> {
        if xor == 0 {
            writer.write_bit(false);
            return Ok(());
        }
        writer.write_bit(true);

        let leading = xor.leading_zeros().min(MAX_LEADING);
        let trailing = xor.trailing_zeros();

        match self.window {
            Some(window) if strategy.reuses(window, leading, trailing) => {
                writer.write_bit(false);
                writer.write_bits(xor >> window.trailing, window.meaningful())?;
            }
            _ => {
                let window = Window { leading, trailing };
                let meaningful = window.meaningful();
                writer.write_bit(true);
                writer.write_bits(leading as u64, LEADING_BITS)?;
                writer.write_bits((meaningful - 1) as u64, LENGTH_BITS)?;
                writer.write_bits(xor >> trailing, meaningful)?;
                self.window = Some(window);
            }
        }
        Ok(())
    }
}

/// XOR value decoder
#[derive(Debug, Clone, Default)]
pub struct ValueDecoder {
    prev_bits: u64,
    window: Option<Window>,
    count: usize,
}

impl ValueDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values decoded
    pub fn count(&self) -> usize {
        self.count
    }

    /// Decode the next value from `reader`
    pub fn decode(&mut self, reader: &mut BitReader<'_>) -> Result<f64> {
        let bits = if self.count == 0 {
            reader.read_u64()?
        } else {
            self.prev_bits ^ self.decode_xor(reader)?
        };

        self.prev_bits = bits;
        self.count += 1;
        Ok(f64::from_bits(bits))
    }

    fn decode_xor(&mut self, reader: &mut BitReader<'_>) -> Result<u64> {
        if !reader.read_bit()? {
            return Ok(0);
        }

        let window = if reader.read_bit()? {
            let leading = reader.read_bits(LEADING_BITS)? as u32;
            let meaningful = reader.read_bits(LENGTH_BITS)? as u32 + 1;
            if leading + meaningful > 64 {
                return Err(GorillaError::Corruption(format!(
                    "meaningful bit count {} with {} leading zeros exceeds 64",
                    meaningful, leading
                )));
            }
            let window = Window {
                leading,
                trailing: 64 - leading - meaningful,
            };
            self.window = Some(window);
            window
        } else {
            self.window.ok_or_else(|| {
                GorillaError::Corruption("window reuse before any window was defined".into())
            })?
        };

        let meaningful = reader.read_bits(window.meaningful())?;
        Ok(meaningful << window.trailing)
    }
}

/// Compress a value sequence into a standalone buffer
pub fn compress_values(values: &[f64], strategy: WindowStrategy) -> Result<Vec<u8>> {
    let mut writer = BitWriter::with_capacity(16 + values.len() * 2);
    let mut encoder = ValueEncoder::new(strategy);
    for &value in values {
        encoder.encode(&mut writer, value)?;
    }
    Ok(writer.finish())
}

/// Decompress `count` values produced by [`compress_values`]
pub fn decompress_values(data: &[u8], count: usize) -> Result<Vec<f64>> {
    let mut reader = BitReader::new(data);
    let mut decoder = ValueDecoder::new();
    (0..count).map(|_| decoder.decode(&mut reader)).collect()
}
