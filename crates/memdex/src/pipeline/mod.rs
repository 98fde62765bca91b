//! Pull-based query pipeline.
//!
//! Sources yield rows to visitor callbacks; transforms wrap a source,
//! forward its schema metadata, and intercept the stream. Two row shapes
//! flow through a pipeline:
//!
//! - a **row** pairs a dimension key with one sequence per field;
//! - a **flat row** is a single resolution tick: timestamp, key, and one
//!   scalar per field.
//!
//! A visitor returns `Ok(true)` to continue, `Ok(false)` to stop, or an
//! error; stops and errors terminate iteration immediately and propagate to
//! the outermost caller. Every stage checks the [`Deadline`] before each
//! downstream emission and surfaces
//! [`MemdexError::DeadlineExceeded`](crate::MemdexError::DeadlineExceeded)
//! when it fires.

mod filter;
mod flatten;
mod scan;

pub use filter::{FlatRowFilter, RowFilter};
pub use flatten::Flatten;
pub use scan::TreeScan;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::encoding::{Sequence, Timestamp};
use crate::error::{MemdexError, Result};
use crate::schema::{Fields, GroupBy};

/// Per-field sequence vector of one row.
pub type Vals = Vec<Sequence>;

/// Row visitor: `Ok(true)` continues, `Ok(false)` stops iteration.
pub type OnRow<'a> = &'a mut dyn FnMut(Bytes, Vals) -> Result<bool>;

/// Flat-row visitor: `Ok(true)` continues, `Ok(false)` stops iteration.
pub type OnFlatRow<'a> = &'a mut dyn FnMut(FlatRow) -> Result<bool>;

/// A single point-in-time row produced by flattening.
#[derive(Debug, Clone)]
pub struct FlatRow {
    /// Timestamp of this row's resolution tick.
    pub ts: Timestamp,
    /// Dimension key of the originating row.
    pub key: Bytes,
    /// One scalar per field.
    pub values: Vec<f64>,
    /// Per-field totals for crosstab queries, when computed.
    pub totals: Option<Vec<f64>>,
}

/// Cancellation and deadline handle threaded through iterations.
///
/// The default handle never fires. Cloning shares the cancel flag, so any
/// clone can cancel the whole iteration.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    /// A handle that never fires.
    pub fn none() -> Self {
        Self::default()
    }

    /// A handle that fires after `timeout` from now.
    pub fn within(timeout: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancels all iterations sharing this handle.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Non-blocking query: has this handle fired?
    pub fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Returns the deadline-exceeded error if this handle has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            Err(MemdexError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

/// Shared schema metadata exposed by anything that yields rows.
pub trait Source {
    /// Ordered output fields.
    fn fields(&self) -> Fields;

    /// Grouped dimensions.
    fn group_by(&self) -> Vec<GroupBy>;

    /// Duration of one output period.
    fn resolution(&self) -> Duration;

    /// Inclusive start of the covered time window.
    fn as_of(&self) -> Timestamp;

    /// Inclusive end of the covered time window.
    fn until(&self) -> Timestamp;

    /// Human-readable description of this stage.
    fn describe(&self) -> String;
}

/// A source yielding rows of per-field sequences.
pub trait RowSource: Source {
    /// Feeds rows to `on_row` until exhaustion, a stop verdict, an error, or
    /// the deadline.
    fn iterate(&self, deadline: &Deadline, on_row: OnRow<'_>) -> Result<()>;
}

/// A source yielding flat rows.
pub trait FlatRowSource: Source {
    /// Feeds flat rows to `on_row` until exhaustion, a stop verdict, an
    /// error, or the deadline.
    fn iterate(&self, deadline: &Deadline, on_row: OnFlatRow<'_>) -> Result<()>;
}

/// A pipeline stage that wraps another source.
pub trait Transform {
    /// The wrapped upstream source.
    fn source(&self) -> &dyn Source;
}
