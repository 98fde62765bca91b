//! Row and flat-row filter stages.
//!
//! A filter wraps a source with an include hook. The hook may drop a row
//! (iteration continues), substitute it, or fail (iteration halts with the
//! hook's error). All schema metadata is forwarded unchanged.

use std::time::Duration;

use bytes::Bytes;

use crate::encoding::Timestamp;
use crate::error::Result;
use crate::pipeline::{
    Deadline, FlatRow, FlatRowSource, OnFlatRow, OnRow, RowSource, Source, Transform, Vals,
};
use crate::schema::{Fields, GroupBy};

/// Filters or rewrites rows of sequences.
///
/// The include hook returns `None` to drop a row and `Some` to forward a
/// (possibly substituted) key and value vector downstream.
pub struct RowFilter<S, F> {
    source: S,
    label: String,
    include: F,
}

impl<S, F> RowFilter<S, F>
where
    S: RowSource,
    F: Fn(&Deadline, Bytes, Vals) -> Result<Option<(Bytes, Vals)>>,
{
    /// Wraps `source` with the given include hook. The label only shows up
    /// in descriptions.
    pub fn new(source: S, label: impl Into<String>, include: F) -> Self {
        Self {
            source,
            label: label.into(),
            include,
        }
    }
}

impl<S, F> Source for RowFilter<S, F>
where
    S: RowSource,
    F: Fn(&Deadline, Bytes, Vals) -> Result<Option<(Bytes, Vals)>>,
{
    fn fields(&self) -> Fields {
        self.source.fields()
    }

    fn group_by(&self) -> Vec<GroupBy> {
        self.source.group_by()
    }

    fn resolution(&self) -> Duration {
        self.source.resolution()
    }

    fn as_of(&self) -> Timestamp {
        self.source.as_of()
    }

    fn until(&self) -> Timestamp {
        self.source.until()
    }

    fn describe(&self) -> String {
        format!("row_filter {}", self.label)
    }
}

impl<S, F> Transform for RowFilter<S, F>
where
    S: RowSource,
    F: Fn(&Deadline, Bytes, Vals) -> Result<Option<(Bytes, Vals)>>,
{
    fn source(&self) -> &dyn Source {
        &self.source
    }
}

impl<S, F> RowSource for RowFilter<S, F>
where
    S: RowSource,
    F: Fn(&Deadline, Bytes, Vals) -> Result<Option<(Bytes, Vals)>>,
{
    fn iterate(&self, deadline: &Deadline, on_row: OnRow<'_>) -> Result<()> {
        self.source.iterate(deadline, &mut |key, vals| {
            match (self.include)(deadline, key, vals)? {
                Some((key, vals)) => {
                    deadline.check()?;
                    on_row(key, vals)
                }
                None => Ok(true),
            }
        })
    }
}

/// Filters or rewrites flat rows.
///
/// The include hook returns `None` to drop a row and `Some` to forward a
/// (possibly substituted) flat row downstream.
pub struct FlatRowFilter<S, F> {
    source: S,
    label: String,
    include: F,
}

impl<S, F> FlatRowFilter<S, F>
where
    S: FlatRowSource,
    F: Fn(&Deadline, FlatRow) -> Result<Option<FlatRow>>,
{
    /// Wraps `source` with the given include hook.
    pub fn new(source: S, label: impl Into<String>, include: F) -> Self {
        Self {
            source,
            label: label.into(),
            include,
        }
    }
}

impl<S, F> Source for FlatRowFilter<S, F>
where
    S: FlatRowSource,
    F: Fn(&Deadline, FlatRow) -> Result<Option<FlatRow>>,
{
    fn fields(&self) -> Fields {
        self.source.fields()
    }

    fn group_by(&self) -> Vec<GroupBy> {
        self.source.group_by()
    }

    fn resolution(&self) -> Duration {
        self.source.resolution()
    }

    fn as_of(&self) -> Timestamp {
        self.source.as_of()
    }

    fn until(&self) -> Timestamp {
        self.source.until()
    }

    fn describe(&self) -> String {
        format!("flat_row_filter {}", self.label)
    }
}

impl<S, F> Transform for FlatRowFilter<S, F>
where
    S: FlatRowSource,
    F: Fn(&Deadline, FlatRow) -> Result<Option<FlatRow>>,
{
    fn source(&self) -> &dyn Source {
        &self.source
    }
}

impl<S, F> FlatRowSource for FlatRowFilter<S, F>
where
    S: FlatRowSource,
    F: Fn(&Deadline, FlatRow) -> Result<Option<FlatRow>>,
{
    fn iterate(&self, deadline: &Deadline, on_row: OnFlatRow<'_>) -> Result<()> {
        self.source.iterate(deadline, &mut |row| {
            match (self.include)(deadline, row)? {
                Some(row) => {
                    deadline.check()?;
                    on_row(row)
                }
                None => Ok(true),
            }
        })
    }
}
