//! Tree-backed row source: the base of every pipeline.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::encoding::Timestamp;
use crate::error::{MemdexError, Result};
use crate::pipeline::{Deadline, OnRow, RowSource, Source};
use crate::schema::{Fields, GroupBy, Table};
use crate::tree::{ByteTree, ContextId};

/// A row source that walks a byte-tree.
///
/// Plain scans read with the reserved context 0 and leave the tree
/// untouched. A *consuming* scan under a nonzero context tombstones every
/// row it delivers, so a later scan with the same context picks up only
/// what arrived in between: the drain pattern used to flush a memstore.
pub struct TreeScan {
    tree: Arc<ByteTree>,
    table: Table,
    ctx: ContextId,
    group_by: Vec<GroupBy>,
    as_of: Timestamp,
    until: Timestamp,
    consuming: bool,
}

impl TreeScan {
    /// Creates a non-consuming scan over `tree` with the reserved context 0.
    pub fn new(tree: Arc<ByteTree>, table: Table) -> Self {
        Self {
            tree,
            table,
            ctx: 0,
            group_by: Vec::new(),
            as_of: 0,
            until: 0,
            consuming: false,
        }
    }

    /// Sets the iteration context. Consuming scans need a nonzero context;
    /// the reserved context 0 carries no tombstone state.
    pub fn with_context(mut self, ctx: ContextId) -> Self {
        self.ctx = ctx;
        self
    }

    /// Sets the time-window metadata advertised to downstream stages.
    pub fn with_window(mut self, as_of: Timestamp, until: Timestamp) -> Self {
        self.as_of = as_of;
        self.until = until;
        self
    }

    /// Sets the grouped dimensions advertised to downstream stages.
    pub fn with_group_by(mut self, group_by: Vec<GroupBy>) -> Self {
        self.group_by = group_by;
        self
    }

    /// Marks this scan as consuming: every row delivered downstream is
    /// tombstoned for the scan's context.
    pub fn consuming(mut self) -> Self {
        self.consuming = true;
        self
    }
}

impl Source for TreeScan {
    fn fields(&self) -> Fields {
        self.table.fields().clone()
    }

    fn group_by(&self) -> Vec<GroupBy> {
        self.group_by.clone()
    }

    fn resolution(&self) -> Duration {
        self.table.resolution()
    }

    fn as_of(&self) -> Timestamp {
        self.as_of
    }

    fn until(&self) -> Timestamp {
        self.until
    }

    fn describe(&self) -> String {
        format!("scan {}", self.table.name())
    }
}

impl RowSource for TreeScan {
    fn iterate(&self, deadline: &Deadline, on_row: OnRow<'_>) -> Result<()> {
        let mut outcome: Result<()> = Ok(());
        let mut stopped = false;
        let mut rows = 0usize;
        self.tree.walk(self.ctx, |key, data| {
            if stopped || outcome.is_err() {
                return true;
            }
            if deadline.is_done() {
                outcome = Err(MemdexError::DeadlineExceeded);
                return true;
            }
            rows += 1;
            match on_row(Bytes::copy_from_slice(key), data.to_vec()) {
                Ok(true) => !self.consuming,
                Ok(false) => {
                    stopped = true;
                    !self.consuming
                }
                Err(err) => {
                    // The row was not consumed; keep it visible.
                    outcome = Err(err);
                    true
                }
            }
        });
        debug!(
            table = self.table.name(),
            ctx = self.ctx,
            rows,
            stopped,
            "tree scan complete"
        );
        outcome
    }
}
