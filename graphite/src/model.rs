//! Series data model shared by storage, the evaluator and the HTTP layer.
//!
//! Fetching produces [`SeriesPoints`] (a sparse, timestamp-keyed point set per
//! metric) collected in a [`SeriesMap`]. The evaluator works on [`Series`],
//! the dense fixed-step form that is finally rendered as JSON.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::ser::{SerializeSeq, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};

/// A single timestamped value. `None` marks an absent (undefined) point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub timestamp: i64,
    pub value: Option<f64>,
}

impl DataPoint {
    /// Creates a point, treating `NaN` as absent.
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value: defined(value),
        }
    }
}

fn defined(value: f64) -> Option<f64> {
    if value.is_nan() { None } else { Some(value) }
}

/// A named, fixed-step sequence of values.
///
/// Slot `i` holds the value at `start + i * step`. The step never changes
/// after construction; transforms produce new series instead of resampling
/// in place. `alias` starts out equal to `name` and is the display name
/// written to the `target` field of the JSON output.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    values: Vec<Option<f64>>,
    start: i64,
    step: i64,
    alias: String,
}

impl Series {
    /// Builds a series from raw values; `NaN` entries become absent.
    pub fn new(name: impl Into<String>, values: Vec<f64>, start: i64, step: i64) -> Self {
        let values = values.into_iter().map(defined).collect();
        Self::with_values(name, values, start, step)
    }

    /// Builds a series from possibly-absent values.
    pub fn with_values(
        name: impl Into<String>,
        values: Vec<Option<f64>>,
        start: i64,
        step: i64,
    ) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            values: values.into_iter().map(|v| v.and_then(defined)).collect(),
            start,
            step,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Timestamp of the last slot, or `start` when empty.
    pub fn end(&self) -> i64 {
        self.start + self.step * self.values.len().saturating_sub(1) as i64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Iterates over the slots as timestamped points.
    pub fn points(&self) -> impl Iterator<Item = DataPoint> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| DataPoint {
                timestamp: self.start + self.step * i as i64,
                value: *v,
            })
    }
}

impl Serialize for Series {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Series", 2)?;
        state.serialize_field("target", &self.alias)?;
        state.serialize_field("datapoints", &Datapoints(self))?;
        state.end()
    }
}

/// `[[value_or_null, timestamp], ...]`
struct Datapoints<'a>(&'a Series);

impl Serialize for Datapoints<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for point in self.0.points() {
            seq.serialize_element(&(point.value, point.timestamp))?;
        }
        seq.end()
    }
}

/// Raised when two point sets for the same metric disagree on step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMismatch {
    pub name: String,
    pub left: i64,
    pub right: i64,
}

impl Display for StepMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot merge points for {}: step {} differs from step {}",
            self.name, self.left, self.right
        )
    }
}

impl std::error::Error for StepMismatch {}

/// Sparse point set for one metric, as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoints {
    name: String,
    points: BTreeMap<i64, Option<f64>>,
    step: i64,
}

impl SeriesPoints {
    pub fn new(name: impl Into<String>, step: i64) -> Self {
        Self {
            name: name.into(),
            points: BTreeMap::new(),
            step,
        }
    }

    /// Collects points; for repeated timestamps the later point wins.
    pub fn from_points(
        name: impl Into<String>,
        points: impl IntoIterator<Item = DataPoint>,
        step: i64,
    ) -> Self {
        let mut set = Self::new(name, step);
        for point in points {
            set.insert(point);
        }
        set
    }

    pub fn insert(&mut self, point: DataPoint) {
        self.points.insert(point.timestamp, point.value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in ascending timestamp order.
    pub fn points(&self) -> impl Iterator<Item = DataPoint> + '_ {
        self.points
            .iter()
            .map(|(&timestamp, &value)| DataPoint { timestamp, value })
    }

    /// Unions `other` into `self`. Points from `other` replace points at the
    /// same timestamp.
    pub fn merge(&mut self, other: SeriesPoints) -> Result<(), StepMismatch> {
        if self.step != other.step {
            return Err(StepMismatch {
                name: self.name.clone(),
                left: self.step,
                right: other.step,
            });
        }
        self.points.extend(other.points);
        Ok(())
    }

    /// Lays the points out on the step grid.
    ///
    /// The series starts at the first timestamp floored to the step and runs
    /// through the last point; slots without a point are absent. An empty set
    /// becomes a zero-length series starting at `empty_start` floored to the
    /// step.
    pub fn to_series(&self, empty_start: i64) -> Series {
        let step = self.step.max(1);
        let (Some(&first), Some(&last)) = (self.points.keys().next(), self.points.keys().last())
        else {
            let start = empty_start - empty_start.rem_euclid(step);
            return Series::with_values(self.name.clone(), Vec::new(), start, step);
        };

        let start = first - first.rem_euclid(step);
        let len = ((last - start) / step + 1) as usize;
        let mut values = vec![None; len];
        for (&ts, &value) in &self.points {
            values[((ts - start) / step) as usize] = value;
        }
        Series::with_values(self.name.clone(), values, start, step)
    }
}

/// Point sets keyed by metric name, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesMap(BTreeMap<String, SeriesPoints>);

impl SeriesMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `points`, replacing any set already stored under its name.
    pub fn insert(&mut self, points: SeriesPoints) {
        self.0.insert(points.name.clone(), points);
    }

    pub fn get(&self, name: &str) -> Option<&SeriesPoints> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeriesPoints> {
        self.0.values()
    }

    /// Unions every point set of `other` into this map.
    ///
    /// Entries of `other` are merged last, so their points win on timestamp
    /// collisions. On a step mismatch the map is left partially merged and
    /// the error is returned; callers discard it.
    pub fn merge(&mut self, other: SeriesMap) -> Result<(), StepMismatch> {
        for (name, points) in other.0 {
            match self.0.get_mut(&name) {
                Some(existing) => existing.merge(points)?,
                None => {
                    self.0.insert(name, points);
                }
            }
        }
        Ok(())
    }

    /// Converts every entry to a [`Series`], ordered by name.
    pub fn into_series(self, empty_start: i64) -> Vec<Series> {
        self.0
            .values()
            .map(|points| points.to_series(empty_start))
            .collect()
    }
}

impl FromIterator<SeriesPoints> for SeriesMap {
    fn from_iter<T: IntoIterator<Item = SeriesPoints>>(iter: T) -> Self {
        let mut map = SeriesMap::new();
        for points in iter {
            map.insert(points);
        }
        map
    }
}

/// A write request: one metric and the samples to store for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub datapoints: Vec<Sample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}
