//! Multivariate Gorilla block
//!
//! One timestamp stream shared by all variables plus one XOR value stream per
//! variable, interleaved point by point in a single bit stream:
//!
//! ```text
//! ts0 (i64) | v0[0] (u64) .. v0[n-1] (u64)
//! delta1 (i64) | xor(v1[0]) .. xor(v1[n-1])
//! dod2 | xor(v2[0]) .. xor(v2[n-1])
//! ...
//! ```
//!
//! The buffer is not self-describing: decoding needs the point count and the
//! exact variable order used while encoding.

use crate::compression::{
    BitReader, BitWriter, TimestampDecoder, TimestampEncoder, ValueDecoder, ValueEncoder,
    WindowStrategy,
};
use crate::{DataPoint, Fields, GorillaError, Result, Schema, TimeRange, Timestamp};
use bytes::Bytes;
use tracing::debug;

/// Encoders live only while the block is open
#[derive(Debug)]
struct Encoders {
    writer: BitWriter,
    timestamps: TimestampEncoder,
    values: Vec<ValueEncoder>,
}

#[derive(Debug)]
enum BlockState {
    Open(Encoders),
    Sealed(Bytes),
}

/// An append-only block of multivariate points
#[derive(Debug)]
pub struct Block {
    schema: Schema,
    strategy: WindowStrategy,
    start_timestamp: Option<Timestamp>,
    count: usize,
    state: BlockState,
}

impl Block {
    /// Create an open block; the start timestamp is taken from the first point
    pub fn new(schema: Schema, strategy: WindowStrategy) -> Self {
        let encoders = Encoders {
            writer: BitWriter::with_capacity(crate::config::WRITER_CAPACITY_HINT),
            timestamps: TimestampEncoder::new(),
            values: (0..schema.len()).map(|_| ValueEncoder::new(strategy)).collect(),
        };
        Self {
            schema,
            strategy,
            start_timestamp: None,
            count: 0,
            state: BlockState::Open(encoders),
        }
    }

    /// Create an open block with a preset start timestamp
    pub fn with_start(
        schema: Schema,
        start_timestamp: Timestamp,
        strategy: WindowStrategy,
    ) -> Self {
        let mut block = Self::new(schema, strategy);
        block.start_timestamp = Some(start_timestamp);
        block
    }

    /// Add a named point using the block's window strategy
    pub fn add(&mut self, timestamp: Timestamp, fields: &Fields) -> Result<()> {
        self.ensure_open()?;
        let values = self.schema.project(fields)?;
        self.append(timestamp, &values, self.strategy)
    }

    /// Add a named point using the verification window heuristic
    pub fn add_verification(&mut self, timestamp: Timestamp, fields: &Fields) -> Result<()> {
        self.ensure_open()?;
        let values = self.schema.project(fields)?;
        self.append(timestamp, &values, WindowStrategy::Verification)
    }

    /// Add a positional point, values in schema order
    pub fn add_row(&mut self, timestamp: Timestamp, values: &[f64]) -> Result<()> {
        self.append(timestamp, values, self.strategy)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            BlockState::Open(_) => Ok(()),
            BlockState::Sealed(_) => Err(GorillaError::BlockSealed),
        }
    }

    fn append(
        &mut self,
        timestamp: Timestamp,
        values: &[f64],
        strategy: WindowStrategy,
    ) -> Result<()> {
        let encoders = match &mut self.state {
            BlockState::Open(encoders) => encoders,
            BlockState::Sealed(_) => return Err(GorillaError::BlockSealed),
        };
        self.schema.check_arity(values)?;
        // the only fallible step; it fails before touching the stream
        encoders.timestamps.encode(&mut encoders.writer, timestamp)?;
        for (encoder, &value) in encoders.values.iter_mut().zip(values) {
            encoder.encode_with(&mut encoders.writer, value, strategy)?;
        }

        if self.start_timestamp.is_none() {
            self.start_timestamp = Some(timestamp);
        }
        self.count += 1;
        Ok(())
    }

    /// Seal the block and return its buffer. Idempotent.
    pub fn seal(&mut self) -> Bytes {
        let state = std::mem::replace(&mut self.state, BlockState::Sealed(Bytes::new()));
        let data = match state {
            BlockState::Open(encoders) => {
                let data = Bytes::from(encoders.writer.finish());
                debug!(
                    start = ?self.start_timestamp,
                    points = self.count,
                    bytes = data.len(),
                    "sealed block"
                );
                data
            }
            BlockState::Sealed(data) => data,
        };
        self.state = BlockState::Sealed(data.clone());
        data
    }

    /// Seal and convert into an immutable [`SealedBlock`]
    pub fn into_sealed(mut self) -> SealedBlock {
        let data = self.seal();
        SealedBlock {
            start_timestamp: self.start_timestamp.unwrap_or_default(),
            count: self.count,
            data,
        }
    }

    /// Aligned copy of the data encoded so far; does not seal
    pub fn snapshot_bytes(&self) -> Bytes {
        match &self.state {
            BlockState::Open(encoders) => Bytes::from(encoders.writer.to_bytes()),
            BlockState::Sealed(data) => data.clone(),
        }
    }

    /// Sealed buffer, if sealed
    pub fn sealed_bytes(&self) -> Option<&Bytes> {
        match &self.state {
            BlockState::Sealed(data) => Some(data),
            BlockState::Open(_) => None,
        }
    }

    /// Decode every point encoded so far
    pub fn decode_all(&self) -> Result<Vec<DataPoint>> {
        let data = self.snapshot_bytes();
        BlockDecoder::new(&data, &self.schema, self.count).read_all()
    }

    /// Number of points added
    pub fn count(&self) -> usize {
        self.count
    }

    /// Check if no point was added
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if sealed
    pub fn is_sealed(&self) -> bool {
        matches!(self.state, BlockState::Sealed(_))
    }

    /// Start timestamp, preset or taken from the first point
    pub fn start_timestamp(&self) -> Option<Timestamp> {
        self.start_timestamp
    }

    /// Block schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Variable names in encoding order
    pub fn variable_names(&self) -> &[String] {
        self.schema.names()
    }

    /// Compressed size in bytes, counting a partial byte while open
    pub fn compressed_len(&self) -> usize {
        match &self.state {
            BlockState::Open(encoders) => encoders.writer.byte_len(),
            BlockState::Sealed(data) => data.len(),
        }
    }
}

/// An immutable, sealed block: `(start, count, bytes)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    /// Aligned start of the block's time window
    pub start_timestamp: Timestamp,
    /// Number of encoded points
    pub count: usize,
    /// Compressed data
    pub data: Bytes,
}

impl SealedBlock {
    /// Decoder over this block
    pub fn decoder<'a>(&'a self, schema: &Schema) -> BlockDecoder<'a> {
        BlockDecoder::new(&self.data, schema, self.count)
    }

    /// Decode the whole block, keeping points inside `range`
    pub fn query(&self, schema: &Schema, range: &TimeRange) -> Result<Vec<DataPoint>> {
        decode_filtered(&self.data, schema, self.count, range)
    }

    /// Compressed size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Decode `count` points from `data`, keeping those inside `range`.
///
/// Points are encoded sequentially, so every point is decoded.
pub(crate) fn decode_filtered(
    data: &[u8],
    schema: &Schema,
    count: usize,
    range: &TimeRange,
) -> Result<Vec<DataPoint>> {
    let mut points = Vec::new();
    for point in BlockDecoder::new(data, schema, count) {
        let point = point?;
        if range.contains(point.timestamp) {
            points.push(point);
        }
    }
    Ok(points)
}

/// Sequential decoder for a block buffer
#[derive(Debug)]
pub struct BlockDecoder<'a> {
    reader: BitReader<'a>,
    timestamps: TimestampDecoder,
    values: Vec<ValueDecoder>,
    count: usize,
    read: usize,
}

impl<'a> BlockDecoder<'a> {
    /// Create a decoder for `count` points encoded with `schema`
    pub fn new(data: &'a [u8], schema: &Schema, count: usize) -> Self {
        Self {
            reader: BitReader::new(data),
            timestamps: TimestampDecoder::new(),
            values: (0..schema.len()).map(|_| ValueDecoder::new()).collect(),
            count,
            read: 0,
        }
    }

    /// Read the next point.
    ///
    /// After the last declared point the seal padding is skipped, leaving
    /// [`bits_remaining`](Self::bits_remaining) at zero for a well-formed
    /// buffer.
    pub fn read_point(&mut self) -> Result<DataPoint> {
        if self.read >= self.count {
            return Err(GorillaError::UnexpectedEof {
                needed: 1,
                available: self.reader.bits_remaining(),
            });
        }

        let timestamp = self.timestamps.decode(&mut self.reader)?;
        let values = self
            .values
            .iter_mut()
            .map(|decoder| decoder.decode(&mut self.reader))
            .collect::<Result<Vec<f64>>>()?;

        self.read += 1;
        if self.read == self.count {
            self.reader.align_to_byte();
        }
        Ok(DataPoint::new(timestamp, values))
    }

    /// Read all remaining points
    pub fn read_all(mut self) -> Result<Vec<DataPoint>> {
        // every point takes at least one bit
        let remaining = self.count - self.read;
        let mut points = Vec::with_capacity(remaining.min(self.reader.bits_remaining()));
        while self.read < self.count {
            points.push(self.read_point()?);
        }
        Ok(points)
    }

    /// Points read so far
    pub fn points_read(&self) -> usize {
        self.read
    }

    /// Unread bits in the buffer
    pub fn bits_remaining(&self) -> usize {
        self.reader.bits_remaining()
    }
}

impl Iterator for BlockDecoder<'_> {
    type Item = Result<DataPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.read >= self.count {
            return None;
        }
        let point = self.read_point();
        if point.is_err() {
            // stop after the first failure
            self.read = self.count;
        }
        Some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema3() -> Schema {
        Schema::new(["temp", "humidity", "light"]).unwrap()
    }

    fn sample_points() -> Vec<(Timestamp, Fields)> {
        vec![
            (1000, Fields::new().with("temp", 22.5).with("humidity", 45.0).with("light", 500.0)),
            (2000, Fields::new().with("temp", 22.5).with("humidity", 45.1).with("light", 500.0)),
            (3000, Fields::new().with("temp", 22.6).with("humidity", 45.1).with("light", 501.0)),
            (4000, Fields::new().with("temp", 22.6).with("humidity", 45.2).with("light", 499.0)),
            (5000, Fields::new().with("temp", 22.7).with("humidity", 45.2).with("light", 500.0)),
        ]
    }

    #[test]
    fn test_block_roundtrip() {
        let schema = schema3();
        let mut block = Block::new(schema.clone(), WindowStrategy::Standard);
        for (ts, fields) in sample_points() {
            block.add(ts, &fields).unwrap();
        }
        assert_eq!(block.count(), 5);
        assert_eq!(block.start_timestamp(), Some(1000));

        let data = block.seal();
        assert!(block.is_sealed());
        assert!(data.len() < 5 * 32);

        let decoded = BlockDecoder::new(&data, &schema, 5).read_all().unwrap();
        for ((ts, fields), point) in sample_points().iter().zip(&decoded) {
            assert_eq!(*ts, point.timestamp);
            assert_eq!(point.to_fields(&schema), *fields);
        }
    }

    #[test]
    fn test_concrete_scenario_consumes_whole_buffer() {
        let schema = Schema::new(["temp"]).unwrap();
        let mut block = Block::with_start(schema.clone(), 0, WindowStrategy::Standard);
        block.add_row(1000, &[22.5]).unwrap();
        block.add_row(1010, &[22.5]).unwrap();
        block.add_row(1020, &[22.6]).unwrap();
        let data = block.seal();

        let mut decoder = BlockDecoder::new(&data, &schema, 3);
        assert_eq!(decoder.read_point().unwrap(), DataPoint::new(1000, vec![22.5]));
        assert_eq!(decoder.read_point().unwrap(), DataPoint::new(1010, vec![22.5]));
        assert_eq!(decoder.read_point().unwrap(), DataPoint::new(1020, vec![22.6]));
        assert_eq!(decoder.points_read(), 3);
        assert_eq!(decoder.bits_remaining(), 0);
        assert!(decoder.read_point().unwrap_err().is_eof());
    }

    #[test]
    fn test_wire_layout_header() {
        let schema = Schema::new(["a", "b"]).unwrap();
        let mut block = Block::new(schema, WindowStrategy::Standard);
        block.add_row(7, &[1.0, 2.0]).unwrap();
        block.add_row(9, &[1.0, 2.0]).unwrap();
        let data = block.seal();

        assert_eq!(&data[..8], &7i64.to_be_bytes());
        assert_eq!(&data[8..16], &1.0f64.to_bits().to_be_bytes());
        assert_eq!(&data[16..24], &2.0f64.to_bits().to_be_bytes());
        assert_eq!(&data[24..32], &2i64.to_be_bytes());
        // two repeated-value bits, then padding
        assert_eq!(data.len(), 33);
        assert_eq!(data[32], 0);
    }

    #[test]
    fn test_missing_variable_rejected_without_mutation() {
        let mut block = Block::new(schema3(), WindowStrategy::Standard);
        let (ts, fields) = sample_points().remove(0);
        block.add(ts, &fields).unwrap();
        let before = block.compressed_len();

        let partial = Fields::new().with("temp", 1.0).with("light", 2.0);
        let err = block.add(2000, &partial).unwrap_err();
        assert!(matches!(err, GorillaError::MissingVariable(name) if name == "humidity"));
        assert_eq!(block.count(), 1);
        assert_eq!(block.compressed_len(), before);

        assert!(matches!(
            block.add_row(2000, &[1.0]),
            Err(GorillaError::ArityMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_timestamp_gap_rejected_without_mutation() {
        let schema = Schema::new(["v"]).unwrap();
        let mut block = Block::new(schema, WindowStrategy::Standard);
        block.add_row(0, &[1.0]).unwrap();
        block.add_row(10, &[2.0]).unwrap();
        let before = block.snapshot_bytes();

        assert!(block.add_row(i64::MAX, &[3.0]).is_err());
        assert_eq!(block.snapshot_bytes(), before);

        block.add_row(20, &[3.0]).unwrap();
        let points = block.decode_all().unwrap();
        assert_eq!(points.iter().map(|p| p.timestamp).collect::<Vec<_>>(), vec![0, 10, 20]);
    }

    #[test]
    fn test_sealed_block_rejects_writes() {
        let mut block = Block::new(schema3(), WindowStrategy::Standard);
        let (ts, fields) = sample_points().remove(0);
        block.add(ts, &fields).unwrap();
        assert!(block.sealed_bytes().is_none());
        let first = block.seal();
        let second = block.seal();
        assert_eq!(first, second);
        assert_eq!(block.sealed_bytes(), Some(&first));

        assert!(matches!(block.add(9000, &fields), Err(GorillaError::BlockSealed)));
        assert!(matches!(
            block.add_verification(9000, &fields),
            Err(GorillaError::BlockSealed)
        ));
        assert_eq!(block.count(), 1);
    }

    #[test]
    fn test_snapshot_of_open_block() {
        let schema = schema3();
        let mut block = Block::new(schema.clone(), WindowStrategy::Standard);
        for (ts, fields) in sample_points().into_iter().take(3) {
            block.add(ts, &fields).unwrap();
        }
        let snapshot = block.snapshot_bytes();
        assert!(!block.is_sealed());

        let decoded = BlockDecoder::new(&snapshot, &schema, 3).read_all().unwrap();
        assert_eq!(decoded.len(), 3);

        // the block keeps accepting points after a snapshot
        let (ts, fields) = sample_points().remove(3);
        block.add(ts, &fields).unwrap();
        assert_eq!(block.decode_all().unwrap().len(), 4);
    }

    #[test]
    fn test_verification_mix_decodes() {
        let schema = Schema::new(["v"]).unwrap();
        let mut block = Block::new(schema.clone(), WindowStrategy::Standard);
        let values = [1.0, 1.5, 1.25, 1000.125, 1000.0, 3.0];
        for (i, v) in values.iter().enumerate() {
            let fields = Fields::new().with("v", *v);
            if i % 2 == 0 {
                block.add(i as i64 * 10, &fields).unwrap();
            } else {
                block.add_verification(i as i64 * 10, &fields).unwrap();
            }
        }
        let sealed = block.into_sealed();
        assert_eq!(sealed.start_timestamp, 0);
        let decoded: Vec<f64> = sealed
            .decoder(&schema)
            .map(|p| p.unwrap().values[0])
            .collect();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_sealed_block_query_filters() {
        let schema = Schema::new(["v"]).unwrap();
        let mut block = Block::new(schema.clone(), WindowStrategy::Standard);
        for i in 0..10 {
            block.add_row(i * 10, &[i as f64]).unwrap();
        }
        let sealed = block.into_sealed();
        let points = sealed.query(&schema, &TimeRange::new(20, 50)).unwrap();
        assert_eq!(
            points.iter().map(|p| p.timestamp).collect::<Vec<_>>(),
            vec![20, 30, 40, 50]
        );
    }

    #[test]
    fn test_truncated_buffer_is_eof() {
        let schema = Schema::new(["v"]).unwrap();
        let mut block = Block::new(schema.clone(), WindowStrategy::Standard);
        for i in 0..4 {
            block.add_row(i * 10, &[i as f64 * 1.1]).unwrap();
        }
        let data = block.seal();
        let truncated = &data[..20];
        let err = BlockDecoder::new(truncated, &schema, 4).read_all().unwrap_err();
        assert!(err.is_eof());
    }

    #[test]
    fn test_oversized_count_is_eof() {
        let schema = Schema::new(["v"]).unwrap();
        let mut block = Block::new(schema.clone(), WindowStrategy::Standard);
        block.add_row(1000, &[22.5]).unwrap();
        let data = block.seal();

        let err = BlockDecoder::new(&data, &schema, usize::MAX)
            .read_all()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StreamUnderrun);

        let sealed = SealedBlock {
            start_timestamp: 0,
            count: 1_000_000_000_000,
            data,
        };
        let err = sealed.query(&schema, &TimeRange::all()).unwrap_err();
        assert!(err.is_eof());
    }
}
