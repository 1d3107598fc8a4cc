//! Store - a registry of named series

use super::{Series, SeriesConfig};
use crate::compression::{compression_ratio, savings_percent};
use crate::{DataPoint, Fields, GorillaError, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Named collection of independent series
#[derive(Debug, Default)]
pub struct Store {
    series: HashMap<String, Series>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new series under `key`
    pub fn create_series<I, S>(
        &mut self,
        key: &str,
        variable_names: I,
        config: SeriesConfig,
    ) -> Result<&mut Series>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.series.contains_key(key) {
            return Err(GorillaError::SeriesExists(key.to_string()));
        }
        let series = Series::new(variable_names, config)?;
        info!(
            key,
            variables = %series.schema(),
            block_duration = config.block_duration,
            "created series"
        );
        Ok(self.series.entry(key.to_string()).or_insert(series))
    }

    /// Add an already-built series, e.g. one restored from a manifest
    pub fn insert_series(&mut self, key: &str, series: Series) -> Result<()> {
        if self.series.contains_key(key) {
            return Err(GorillaError::SeriesExists(key.to_string()));
        }
        self.series.insert(key.to_string(), series);
        Ok(())
    }

    /// Look up a series
    pub fn get_series(&self, key: &str) -> Option<&Series> {
        self.series.get(key)
    }

    /// Look up a series for writing
    pub fn get_series_mut(&mut self, key: &str) -> Option<&mut Series> {
        self.series.get_mut(key)
    }

    /// Check if a series exists
    pub fn contains(&self, key: &str) -> bool {
        self.series.contains_key(key)
    }

    /// Remove and return a series
    pub fn remove_series(&mut self, key: &str) -> Result<Series> {
        self.series
            .remove(key)
            .ok_or_else(|| GorillaError::SeriesNotFound(key.to_string()))
    }

    /// Sorted series keys
    pub fn list_series(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.series.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Iterate over all series, in no particular order
    pub fn scan_all(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.series.iter().map(|(k, s)| (k.as_str(), s))
    }

    /// Number of series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Check if the store holds no series
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Insert a point into an existing series
    pub fn insert(&mut self, key: &str, timestamp: Timestamp, fields: &Fields) -> Result<()> {
        self.series
            .get_mut(key)
            .ok_or_else(|| GorillaError::SeriesNotFound(key.to_string()))?
            .insert(timestamp, fields)
    }

    /// Query an existing series, both bounds inclusive
    pub fn query(
        &self,
        key: &str,
        t_start: Timestamp,
        t_end: Timestamp,
    ) -> Result<Vec<DataPoint>> {
        self.series
            .get(key)
            .ok_or_else(|| GorillaError::SeriesNotFound(key.to_string()))?
            .query(t_start, t_end)
    }

    /// Seal the open block of every series
    pub fn flush_all(&mut self) {
        for series in self.series.values_mut() {
            series.flush();
        }
        info!(series = self.series.len(), "flushed all series");
    }

    /// Aggregate statistics over every series
    pub fn get_total_stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            num_series: self.series.len(),
            ..StoreStats::default()
        };
        for series in self.series.values() {
            let s = series.get_compression_stats();
            stats.total_points += s.total_points;
            stats.total_original_bytes += s.original_bytes;
            stats.total_compressed_bytes += s.compressed_bytes;
        }
        stats.overall_compression_ratio =
            compression_ratio(stats.total_original_bytes, stats.total_compressed_bytes);
        stats.overall_savings_percent =
            savings_percent(stats.total_original_bytes, stats.total_compressed_bytes);
        stats
    }
}

/// Store-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub num_series: usize,
    pub total_points: usize,
    pub total_original_bytes: usize,
    pub total_compressed_bytes: usize,
    pub overall_compression_ratio: f64,
    pub overall_savings_percent: f64,
}
