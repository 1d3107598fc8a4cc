//! Bit-level I/O for Gorilla compression
//!
//! Bits are packed MSB-first within each byte. Fixed-width fields
//! (`u32`, `i64`, `u64`) are byte-aligned and big-endian.

use crate::{GorillaError, Result};
use bytes::Buf;

/// Returns true if `value` fits in `bits`-bit two's complement
#[inline]
pub fn fits_signed(value: i64, bits: u32) -> bool {
    if bits == 0 || bits > 64 {
        return false;
    }
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    (min..=max).contains(&(value as i128))
}

/// Encode `value` as a `bits`-wide two's complement pattern
pub fn to_twos_complement(value: i64, bits: u32) -> Result<u64> {
    if bits == 0 || bits > 64 {
        return Err(GorillaError::BitWidth(bits));
    }
    if !fits_signed(value, bits) {
        return Err(GorillaError::SignedOutOfRange { value, bits });
    }
    Ok(value as u64 & low_mask(bits))
}

#[inline]
fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Bit writer for encoding compressed data
#[derive(Debug, Clone)]
pub struct BitWriter {
    buffer: Vec<u8>,
    current_byte: u8,
    bit_position: u8,
}

impl BitWriter {
    /// Create a new BitWriter
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            current_byte: 0,
            bit_position: 0,
        }
    }

    /// Create with capacity hint
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            current_byte: 0,
            bit_position: 0,
        }
    }

    /// Write a single bit
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.current_byte |= 1 << (7 - self.bit_position);
        }
        self.bit_position += 1;

        if self.bit_position == 8 {
            self.buffer.push(self.current_byte);
            self.current_byte = 0;
            self.bit_position = 0;
        }
    }

    /// Write the low `num_bits` bits of `value`, MSB-first.
    ///
    /// Higher bits of `value` are silently dropped.
    #[inline]
    pub fn write_bits(&mut self, value: u64, num_bits: u32) -> Result<()> {
        if num_bits > 64 {
            return Err(GorillaError::BitWidth(num_bits));
        }
        let value = value & low_mask(num_bits);
        for i in (0..num_bits).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Write a signed value as `bits`-wide two's complement.
    ///
    /// Fails before writing anything if the value does not fit.
    pub fn write_signed(&mut self, value: i64, bits: u32) -> Result<()> {
        let encoded = to_twos_complement(value, bits)?;
        self.write_bits(encoded, bits)
    }

    /// Pad the in-progress byte with zero bits
    pub fn align_to_byte(&mut self) {
        if self.bit_position > 0 {
            self.buffer.push(self.current_byte);
            self.current_byte = 0;
            self.bit_position = 0;
        }
    }

    /// Align, then append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.align_to_byte();
        self.buffer.extend_from_slice(bytes);
    }

    /// Align, then write a big-endian u32
    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Align, then write a big-endian i64
    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Align, then write a big-endian u64
    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Reserve four zero bytes and return their offset for [`patch_u32`](Self::patch_u32)
    pub fn reserve_u32(&mut self) -> usize {
        self.align_to_byte();
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(&[0; 4]);
        offset
    }

    /// Overwrite four previously written bytes at `offset`
    pub fn patch_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        let len = self.buffer.len();
        match offset.checked_add(4) {
            Some(end) if end <= len => {
                self.buffer[offset..end].copy_from_slice(&value.to_be_bytes());
                Ok(())
            }
            _ => Err(GorillaError::PatchOutOfBounds { offset, len }),
        }
    }

    /// Number of bits written so far
    pub fn bit_len(&self) -> usize {
        self.buffer.len() * 8 + self.bit_position as usize
    }

    /// Get current size in bytes, counting a partial byte
    pub fn byte_len(&self) -> usize {
        self.buffer.len() + if self.bit_position > 0 { 1 } else { 0 }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.bit_position == 0
    }

    /// Aligned copy of everything written so far; the writer stays usable
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        out.extend_from_slice(&self.buffer);
        if self.bit_position > 0 {
            out.push(self.current_byte);
        }
        out
    }

    /// Finish writing and return the buffer
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.buffer
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bit reader for decoding compressed data
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_position: usize,
    bit_position: u8,
}

impl<'a> BitReader<'a> {
    /// Create a new BitReader
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_position: 0,
            bit_position: 0,
        }
    }

    /// Read a single bit
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        let bit = self.peek_bit()?;
        self.bit_position += 1;

        if self.bit_position == 8 {
            self.byte_position += 1;
            self.bit_position = 0;
        }

        Ok(bit)
    }

    /// Next bit without advancing
    #[inline]
    pub fn peek_bit(&self) -> Result<bool> {
        if self.byte_position >= self.data.len() {
            return Err(self.eof(1));
        }
        Ok((self.data[self.byte_position] >> (7 - self.bit_position)) & 1 == 1)
    }

    /// Read `num_bits` bits MSB-first as a u64.
    ///
    /// On underrun nothing is consumed.
    #[inline]
    pub fn read_bits(&mut self, num_bits: u32) -> Result<u64> {
        if num_bits > 64 {
            return Err(GorillaError::BitWidth(num_bits));
        }
        if self.bits_remaining() < num_bits as usize {
            return Err(self.eof(num_bits as usize));
        }

        let mut value = 0u64;
        for _ in 0..num_bits {
            let bit = self.read_bit()?;
            value = (value << 1) | (bit as u64);
        }
        Ok(value)
    }

    /// Read a `bits`-wide two's complement value
    pub fn read_signed(&mut self, bits: u32) -> Result<i64> {
        if bits == 0 || bits > 64 {
            return Err(GorillaError::BitWidth(bits));
        }
        let raw = self.read_bits(bits)?;
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Skip the rest of the current byte
    pub fn align_to_byte(&mut self) {
        if self.bit_position > 0 {
            self.bit_position = 0;
            self.byte_position += 1;
        }
    }

    /// Align, then borrow `n` raw bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.align_to_byte();
        let available = self.data.len().saturating_sub(self.byte_position);
        if available < n {
            return Err(GorillaError::UnexpectedEof {
                needed: n * 8,
                available: available * 8,
            });
        }
        let out = &self.data[self.byte_position..self.byte_position + n];
        self.byte_position += n;
        Ok(out)
    }

    /// Align, then read a big-endian u32
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = self.read_bytes(4)?;
        Ok(bytes.get_u32())
    }

    /// Align, then read a big-endian i64
    pub fn read_i64(&mut self) -> Result<i64> {
        let mut bytes = self.read_bytes(8)?;
        Ok(bytes.get_i64())
    }

    /// Align, then read a big-endian u64
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut bytes = self.read_bytes(8)?;
        Ok(bytes.get_u64())
    }

    /// Unread bits left in the stream
    pub fn bits_remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position())
    }

    /// Check if there are more bits to read
    pub fn has_more(&self) -> bool {
        self.bits_remaining() > 0
    }

    /// Get the current position in bits
    pub fn position(&self) -> usize {
        self.byte_position * 8 + self.bit_position as usize
    }

    fn eof(&self, needed: usize) -> GorillaError {
        GorillaError::UnexpectedEof {
            needed,
            available: self.bits_remaining(),
        }
    }
}
