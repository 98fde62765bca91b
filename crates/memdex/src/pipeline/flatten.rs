//! Flatten stage: expands multi-period rows into per-tick flat rows.
//!
//! A single stored row covers a span of time; flattening is the time-series
//! fan-out that turns it into one flat row per resolution tick within the
//! row's window. Ticks whose only populated values come from constant
//! expressions are suppressed.

use std::time::Duration;

use crate::encoding::{duration_nanos, Sequence, Timestamp};
use crate::error::Result;
use crate::pipeline::{
    Deadline, FlatRow, FlatRowSource, OnFlatRow, RowSource, Source, Transform,
};
use crate::schema::{Fields, GroupBy};

/// Converts a row source into a flat-row source.
pub struct Flatten<S> {
    source: S,
}

impl<S: RowSource> Flatten<S> {
    /// Wraps `source` for flattening.
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: RowSource> Source for Flatten<S> {
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
        "flatten".to_string()
    }
}

impl<S: RowSource> Transform for Flatten<S> {
    fn source(&self) -> &dyn Source {
        &self.source
    }
}

impl<S: RowSource> FlatRowSource for Flatten<S> {
    fn iterate(&self, deadline: &Deadline, on_row: OnFlatRow<'_>) -> Result<()> {
        let fields = self.source.fields();
        let resolution = self.source.resolution();
        let res_nanos = duration_nanos(resolution);
        let empty = Sequence::empty();

        self.source.iterate(deadline, &mut |key, vals| {
            // Total time range across all fields with stored periods.
            let mut window: Option<(Timestamp, Timestamp)> = None;
            for (i, field) in fields.iter().enumerate() {
                let val = vals.get(i).unwrap_or(&empty);
                let width = field.expr().encoded_width();
                if val.num_periods(width) == 0 {
                    continue;
                }
                let as_of = val.as_of(width, resolution);
                let until = val.until();
                window = Some(match window {
                    None => (as_of, until),
                    Some((lo, hi)) => (lo.min(as_of), hi.max(until)),
                });
            }
            let Some((as_of, until)) = window else {
                // Every field is empty; nothing to fan out.
                return Ok(true);
            };

            let mut ts = as_of;
            while ts <= until {
                let mut values = vec![0.0; fields.len()];
                let mut any_non_constant = false;
                for (i, field) in fields.iter().enumerate() {
                    let val = vals.get(i).unwrap_or(&empty);
                    let (value, found) = val.value_at(ts, field.expr().as_ref(), resolution);
                    if found && !field.expr().is_constant() {
                        any_non_constant = true;
                    }
                    values[i] = value;
                }
                if any_non_constant {
                    deadline.check()?;
                    let more = on_row(FlatRow {
                        ts,
                        key: key.clone(),
                        values,
                        totals: None,
                    })?;
                    if !more {
                        return Ok(false);
                    }
                }
                ts += res_nanos;
            }
            Ok(true)
        })
    }
}
