//! Core types for GorillaDB

use crate::{GorillaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Timestamp, milliseconds since Unix epoch by convention
pub type Timestamp = i64;

/// Ordered variable names of a series.
///
/// The wire format carries no field tags, so this order is the only thing
/// tying a value to its variable. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schema {
    names: Arc<[String]>,
}

impl Schema {
    /// Create a schema, rejecting empty or duplicated names
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(GorillaError::EmptySchema);
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(GorillaError::DuplicateVariable(name.clone()));
            }
        }
        Ok(Self {
            names: names.into(),
        })
    }

    /// Variable names in encoding order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false for a constructed schema
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a variable
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Pick the schema's values out of `fields`, in schema order.
    ///
    /// Extra fields are ignored; a missing one is an error.
    pub fn project(&self, fields: &Fields) -> Result<Vec<f64>> {
        self.names
            .iter()
            .map(|name| {
                fields
                    .get(name)
                    .ok_or_else(|| GorillaError::MissingVariable(name.clone()))
            })
            .collect()
    }

    /// Check a positional row has exactly one value per variable
    pub fn check_arity(&self, values: &[f64]) -> Result<()> {
        if values.len() != self.len() {
            return Err(GorillaError::ArityMismatch {
                expected: self.len(),
                actual: values.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}

/// Named field values of one point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fields(pub BTreeMap<String, f64>);

impl Fields {
    /// Create empty fields
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    /// Add a field
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

impl Default for Fields {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Fields {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<HashMap<String, f64>> for Fields {
    fn from(map: HashMap<String, f64>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl From<BTreeMap<String, f64>> for Fields {
    fn from(map: BTreeMap<String, f64>) -> Self {
        Self(map)
    }
}

/// A decoded point, values in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Timestamp
    pub timestamp: Timestamp,
    /// One value per schema variable
    pub values: Vec<f64>,
}

impl DataPoint {
    /// Create a new data point
    pub fn new(timestamp: Timestamp, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }

    /// Look up a value by variable name
    pub fn get(&self, schema: &Schema, name: &str) -> Option<f64> {
        schema
            .index_of(name)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Name the values using `schema`
    pub fn to_fields(&self, schema: &Schema) -> Fields {
        schema
            .names()
            .iter()
            .cloned()
            .zip(self.values.iter().copied())
            .collect()
    }
}

/// Time range for queries, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: Timestamp,
    /// End timestamp (inclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Everything
    pub fn all() -> Self {
        Self::new(Timestamp::MIN, Timestamp::MAX)
    }

    /// Inclusive range covered by a block `[start, start + duration)`
    pub fn for_block(start: Timestamp, duration: i64) -> Self {
        Self::new(start, start.saturating_add(duration).saturating_sub(1))
    }

    /// Check if a timestamp is within the range
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Check if two ranges overlap
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Check if the range is empty
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_validation() {
        assert!(matches!(
            Schema::new(Vec::<String>::new()),
            Err(GorillaError::EmptySchema)
        ));
        assert!(matches!(
            Schema::new(["a", "b", "a"]),
            Err(GorillaError::DuplicateVariable(name)) if name == "a"
        ));

        let schema = Schema::new(["temp", "humidity"]).unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.index_of("humidity"), Some(1));
        assert_eq!(schema.to_string(), "[temp, humidity]");
    }

    #[test]
    fn test_schema_project() {
        let schema = Schema::new(["temp", "humidity"]).unwrap();
        let fields = Fields::new()
            .with("humidity", 45.0)
            .with("temp", 22.5)
            .with("extra", 1.0);
        assert_eq!(schema.project(&fields).unwrap(), vec![22.5, 45.0]);

        let missing = Fields::new().with("temp", 22.5);
        assert!(matches!(
            schema.project(&missing),
            Err(GorillaError::MissingVariable(name)) if name == "humidity"
        ));
        assert!(schema.check_arity(&[1.0]).is_err());
    }

    #[test]
    fn test_data_point_fields() {
        let schema = Schema::new(["temp", "humidity"]).unwrap();
        let point = DataPoint::new(1000, vec![22.5, 45.0]);
        assert_eq!(point.get(&schema, "humidity"), Some(45.0));
        assert_eq!(point.get(&schema, "light"), None);

        let fields = point.to_fields(&schema);
        assert_eq!(fields.get("temp"), Some(22.5));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_time_range() {
        let range1 = TimeRange::new(100, 200);
        let range2 = TimeRange::new(150, 250);
        let range3 = TimeRange::new(300, 400);

        assert!(range1.overlaps(&range2));
        assert!(!range1.overlaps(&range3));
        assert!(range1.contains(100));
        assert!(range1.contains(200));
        assert!(!range1.contains(250));

        let block = TimeRange::for_block(0, 100);
        assert!(block.contains(99));
        assert!(!block.contains(100));
        assert!(TimeRange::new(5, 4).is_empty());
    }
}
