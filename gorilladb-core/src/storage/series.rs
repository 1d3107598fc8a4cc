//! Series - an ordered sequence of time-windowed blocks

use super::{BlockMeta, SeriesConfig, SeriesManifest};
use crate::block::{decode_filtered, Block, SealedBlock};
use crate::compression::{compression_ratio, savings_percent};
use crate::{DataPoint, Fields, GorillaError, Result, Schema, TimeRange, Timestamp};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// A multivariate time series split into fixed-duration blocks.
///
/// At most one block is open; every other block is sealed and immutable.
#[derive(Debug)]
pub struct Series {
    schema: Schema,
    config: SeriesConfig,
    open: Option<Block>,
    sealed: Vec<SealedBlock>,
}

impl Series {
    /// Create a series for the given variable names
    pub fn new<I, S>(variable_names: I, config: SeriesConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_schema(Schema::new(variable_names)?, config)
    }

    /// Create a series for an existing schema
    pub fn with_schema(schema: Schema, config: SeriesConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            schema,
            config,
            open: None,
            sealed: Vec::new(),
        })
    }

    /// Rebuild a series from exported metadata and block buffers
    pub fn restore<I>(manifest: &SeriesManifest, buffers: I) -> Result<Self>
    where
        I: IntoIterator<Item = Bytes>,
    {
        let config = SeriesConfig {
            block_duration: manifest.block_duration,
            window_strategy: manifest.window_strategy,
        };
        let mut series = Self::new(manifest.variable_names.iter().cloned(), config)?;

        let buffers: Vec<Bytes> = buffers.into_iter().collect();
        if buffers.len() != manifest.blocks.len() {
            warn!(
                expected = manifest.blocks.len(),
                actual = buffers.len(),
                "manifest and block buffers disagree"
            );
            return Err(GorillaError::Corruption(format!(
                "manifest lists {} blocks but {} buffers were supplied",
                manifest.blocks.len(),
                buffers.len()
            )));
        }

        for (meta, data) in manifest.blocks.iter().zip(buffers) {
            if meta.size_bytes != data.len() {
                return Err(GorillaError::Corruption(format!(
                    "block at {} should be {} bytes, got {}",
                    meta.start_timestamp,
                    meta.size_bytes,
                    data.len()
                )));
            }
            series.sealed.push(SealedBlock {
                start_timestamp: meta.start_timestamp,
                count: meta.count,
                data,
            });
        }
        Ok(series)
    }

    /// Insert a named point
    pub fn insert(&mut self, timestamp: Timestamp, fields: &Fields) -> Result<()> {
        let values = self.schema.project(fields)?;
        self.insert_row(timestamp, &values)
    }

    /// Insert a positional point, values in schema order
    pub fn insert_row(&mut self, timestamp: Timestamp, values: &[f64]) -> Result<()> {
        self.schema.check_arity(values)?;

        let block = match self.open.take() {
            Some(block) if self.in_window(&block, timestamp) => block,
            previous => {
                if let Some(block) = previous {
                    self.seal_block(block);
                }
                self.new_block(timestamp)
            }
        };
        let block = self.open.insert(block);
        block.add_row(timestamp, values)
    }

    fn in_window(&self, block: &Block, timestamp: Timestamp) -> bool {
        match block.start_timestamp() {
            Some(start) => {
                timestamp >= start
                    && timestamp
                        .checked_sub(start)
                        .is_some_and(|d| d < self.config.block_duration)
            }
            None => false,
        }
    }

    fn new_block(&self, timestamp: Timestamp) -> Block {
        let duration = self.config.block_duration;
        let start = timestamp.saturating_sub(timestamp.rem_euclid(duration));
        debug!(start, "opening block");
        Block::with_start(self.schema.clone(), start, self.config.window_strategy)
    }

    fn seal_block(&mut self, block: Block) {
        if block.is_empty() {
            return;
        }
        let sealed = block.into_sealed();
        debug!(
            start = sealed.start_timestamp,
            points = sealed.count,
            bytes = sealed.data.len(),
            "closed block"
        );
        self.sealed.push(sealed);
    }

    /// Seal the open block, if any
    pub fn flush(&mut self) {
        if let Some(block) = self.open.take() {
            self.seal_block(block);
        }
    }

    /// Points with `t_start <= timestamp <= t_end`, in insertion order
    pub fn query(&self, t_start: Timestamp, t_end: Timestamp) -> Result<Vec<DataPoint>> {
        let open = self.open_snapshot();
        query_blocks(
            self.sealed.iter().chain(open.as_ref()),
            &self.schema,
            self.config.block_duration,
            &TimeRange::new(t_start, t_end),
        )
    }

    /// Like [`query`](Self::query), with values keyed by variable name
    pub fn query_fields(
        &self,
        t_start: Timestamp,
        t_end: Timestamp,
    ) -> Result<Vec<(Timestamp, Fields)>> {
        Ok(self
            .query(t_start, t_end)?
            .into_iter()
            .map(|point| (point.timestamp, point.to_fields(&self.schema)))
            .collect())
    }

    /// Every point of the series
    pub fn query_all(&self) -> Result<Vec<DataPoint>> {
        self.query(Timestamp::MIN, Timestamp::MAX)
    }

    /// Immutable copy of the current state, queryable without the writer
    pub fn snapshot(&self) -> SeriesSnapshot {
        let mut blocks = self.sealed.clone();
        blocks.extend(self.open_snapshot());
        SeriesSnapshot {
            schema: self.schema.clone(),
            block_duration: self.config.block_duration,
            blocks,
        }
    }

    fn open_snapshot(&self) -> Option<SealedBlock> {
        let block = self.open.as_ref().filter(|b| !b.is_empty())?;
        Some(SealedBlock {
            start_timestamp: block.start_timestamp()?,
            count: block.count(),
            data: block.snapshot_bytes(),
        })
    }

    /// Export metadata of the sealed blocks
    pub fn manifest(&self) -> SeriesManifest {
        let blocks: Vec<BlockMeta> = self
            .sealed
            .iter()
            .map(|b| BlockMeta {
                start_timestamp: b.start_timestamp,
                count: b.count,
                size_bytes: b.data.len(),
            })
            .collect();
        SeriesManifest {
            variable_names: self.schema.names().to_vec(),
            block_duration: self.config.block_duration,
            window_strategy: self.config.window_strategy,
            total_points: blocks.iter().map(|b| b.count).sum(),
            compressed_bytes: blocks.iter().map(|b| b.size_bytes).sum(),
            blocks,
        }
    }

    /// Compression statistics over sealed and open blocks
    pub fn get_compression_stats(&self) -> CompressionStats {
        let open_bytes = self.open.as_ref().map_or(0, |b| b.compressed_len());
        let compressed_bytes =
            self.sealed.iter().map(|b| b.data.len()).sum::<usize>() + open_bytes;
        CompressionStats::new(
            self.total_points(),
            self.schema.len(),
            self.num_blocks(),
            compressed_bytes,
        )
    }

    /// Sealed blocks in closing order
    pub fn sealed_blocks(&self) -> &[SealedBlock] {
        &self.sealed
    }

    /// The open block, if any
    pub fn open_block(&self) -> Option<&Block> {
        self.open.as_ref()
    }

    /// Total number of points
    pub fn total_points(&self) -> usize {
        self.sealed.iter().map(|b| b.count).sum::<usize>()
            + self.open.as_ref().map_or(0, |b| b.count())
    }

    /// Sealed blocks plus the open one
    pub fn num_blocks(&self) -> usize {
        self.sealed.len() + usize::from(self.open.is_some())
    }

    /// Series schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Variable names in encoding order
    pub fn variable_names(&self) -> &[String] {
        self.schema.names()
    }

    /// Block duration
    pub fn block_duration(&self) -> i64 {
        self.config.block_duration
    }

    /// Series configuration
    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }
}

/// A point-in-time, immutable view of a series.
///
/// Holds only shared immutable buffers, so it can be queried from any thread
/// while the series keeps ingesting.
#[derive(Debug, Clone)]
pub struct SeriesSnapshot {
    schema: Schema,
    block_duration: i64,
    blocks: Vec<SealedBlock>,
}

impl SeriesSnapshot {
    /// Points with `t_start <= timestamp <= t_end`
    pub fn query(&self, t_start: Timestamp, t_end: Timestamp) -> Result<Vec<DataPoint>> {
        query_blocks(
            self.blocks.iter(),
            &self.schema,
            self.block_duration,
            &TimeRange::new(t_start, t_end),
        )
    }

    /// Blocks captured by the snapshot
    pub fn blocks(&self) -> &[SealedBlock] {
        &self.blocks
    }

    /// Snapshot schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

fn query_blocks<'a>(
    blocks: impl Iterator<Item = &'a SealedBlock>,
    schema: &Schema,
    block_duration: i64,
    range: &TimeRange,
) -> Result<Vec<DataPoint>> {
    let mut results = Vec::new();
    for block in blocks {
        if !TimeRange::for_block(block.start_timestamp, block_duration).overlaps(range) {
            continue;
        }
        trace!(start = block.start_timestamp, points = block.count, "decoding block");
        results.extend(decode_filtered(&block.data, schema, block.count, range)?);
    }
    Ok(results)
}

/// Compression statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    pub total_points: usize,
    pub num_variables: usize,
    pub num_blocks: usize,
    /// Uncompressed size: `8 + 8 * num_variables` bytes per point
    pub original_bytes: usize,
    pub compressed_bytes: usize,
    pub compression_ratio: f64,
    pub savings_percent: f64,
    pub bits_per_point: f64,
}

impl CompressionStats {
    fn new(
        total_points: usize,
        num_variables: usize,
        num_blocks: usize,
        compressed_bytes: usize,
    ) -> Self {
        let original_bytes = total_points * (8 + 8 * num_variables);
        Self {
            total_points,
            num_variables,
            num_blocks,
            original_bytes,
            compressed_bytes,
            compression_ratio: compression_ratio(original_bytes, compressed_bytes),
            savings_percent: savings_percent(original_bytes, compressed_bytes),
            bits_per_point: if total_points > 0 {
                (compressed_bytes * 8) as f64 / total_points as f64
            } else {
                0.0
            },
        }
    }
}
