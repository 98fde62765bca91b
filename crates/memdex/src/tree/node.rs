//! Radix-tree vertex: per-field sequence slots and iteration tombstones.

use std::sync::{OnceLock, RwLock};

use bytes::Bytes;

use crate::encoding::{Sequence, Timestamp};
use crate::expr::Sample;
use crate::schema::Table;
use crate::tree::ContextId;

/// Value-bearing state of a node, guarded by the node's own lock.
#[derive(Debug, Default)]
struct NodeState {
    /// One sequence slot per table field; an empty vector marks a pure-split
    /// internal node.
    data: Vec<Sequence>,
    /// Iteration contexts for which this node has been logically deleted.
    removed_for: Vec<ContextId>,
}

/// A radix-tree vertex.
///
/// The stored key is set once, when the node first becomes terminal, and is
/// immutable afterwards. Sequence slots and tombstones are guarded by the
/// node's reader-writer lock; child edges live in the tree's slot table and
/// are guarded by the tree-level lock.
#[derive(Debug, Default)]
pub(crate) struct Node {
    key: OnceLock<Bytes>,
    state: RwLock<NodeState>,
}

impl Node {
    /// Creates a pure-split internal node with no stored key.
    pub fn internal() -> Self {
        Self::default()
    }

    /// Creates a terminal node storing the given full key.
    pub fn terminal(key: Bytes) -> Self {
        let node = Self::default();
        let _ = node.key.set(key);
        node
    }

    /// Records the full key on a node that is becoming terminal. The first
    /// key wins; later calls are no-ops.
    pub fn ensure_key(&self, key: &[u8]) {
        if self.key.get().is_none() {
            let _ = self.key.set(Bytes::copy_from_slice(key));
        }
    }

    /// Merges sample values into each field's sequence, growing the slot
    /// vector to the table's field count. Returns the net change in stored
    /// sequence bytes and whether this merge made the node terminal.
    pub fn merge(
        &self,
        table: &Table,
        truncate_before: Timestamp,
        sample: &Sample,
    ) -> (i64, bool) {
        let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
        let fields = table.fields();
        let became_terminal = state.data.is_empty() && !fields.is_empty();
        if state.data.len() < fields.len() {
            state.data.resize_with(fields.len(), Sequence::empty);
        }
        let mut delta = 0i64;
        for (i, field) in fields.iter().enumerate() {
            let previous = state.data[i].len() as i64;
            let updated = state.data[i].update(
                sample,
                field.expr().as_ref(),
                table.resolution(),
                truncate_before,
            );
            delta += updated.len() as i64 - previous;
            state.data[i] = updated;
        }
        (delta, became_terminal)
    }

    /// Runs `visit` under the node read lock if the node is terminal and not
    /// tombstoned for `ctx`. Returns the visitor's keep verdict, or `None`
    /// if the node was skipped.
    pub fn visit<F>(&self, ctx: ContextId, visit: F) -> Option<bool>
    where
        F: FnOnce(&[u8], &[Sequence]) -> bool,
    {
        let state = self.state.read().unwrap_or_else(|err| err.into_inner());
        if state.data.is_empty() {
            return None;
        }
        if ctx != 0 && state.removed_for.contains(&ctx) {
            return None;
        }
        let key = self.key.get().map(|k| &k[..]).unwrap_or(&[]);
        Some(visit(key, &state.data))
    }

    /// True if this node is tombstoned for the given iteration context.
    /// The reserved context 0 is never tombstoned.
    pub fn was_removed_for(&self, ctx: ContextId) -> bool {
        if ctx == 0 {
            return false;
        }
        let state = self.state.read().unwrap_or_else(|err| err.into_inner());
        state.removed_for.contains(&ctx)
    }

    /// Tombstones this node for the given context. Returns false for the
    /// reserved context 0, which carries no per-iteration state.
    pub fn remove_for(&self, ctx: ContextId) -> bool {
        if ctx == 0 {
            return false;
        }
        let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
        state.removed_for.push(ctx);
        true
    }

    /// Clones the current sequence vector. Empty for non-terminal nodes.
    pub fn snapshot_data(&self) -> Vec<Sequence> {
        let state = self.state.read().unwrap_or_else(|err| err.into_inner());
        state.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::sum;
    use crate::schema::{Field, Fields, Table};
    use std::time::Duration;

    fn one_field() -> Table {
        Table::new(
            "t",
            Fields::new(vec![Field::new("hits", sum("hits"))]),
            Duration::from_secs(60),
        )
    }

    fn two_fields() -> Table {
        Table::new(
            "t",
            Fields::new(vec![
                Field::new("hits", sum("hits")),
                Field::new("errors", sum("errors")),
            ]),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_merge_grows_slots_lazily() {
        let node = Node::terminal(Bytes::from_static(b"k"));
        let sample = Sample::new(0).with("hits", 1.0).with("errors", 2.0);

        node.merge(&one_field(), 0, &sample);
        assert_eq!(node.snapshot_data().len(), 1);

        node.merge(&two_fields(), 0, &sample);
        let data = node.snapshot_data();
        assert_eq!(data.len(), 2);
        assert!(!data[0].is_empty());
        assert!(!data[1].is_empty());
    }

    #[test]
    fn test_merge_reports_byte_delta() {
        let node = Node::terminal(Bytes::from_static(b"k"));
        let sample = Sample::new(0).with("hits", 1.0);

        let (first, became_terminal) = node.merge(&one_field(), 0, &sample);
        assert_eq!(first, 17); // 8-byte header + 9-byte accumulator
        assert!(became_terminal);

        // Merging into the same period does not grow the sequence, and the
        // node only becomes terminal once.
        let (second, became_terminal) = node.merge(&one_field(), 0, &sample);
        assert_eq!(second, 0);
        assert!(!became_terminal);
    }

    #[test]
    fn test_tombstones_are_per_context() {
        let node = Node::terminal(Bytes::from_static(b"k"));
        assert!(!node.was_removed_for(7));
        assert!(node.remove_for(7));
        assert!(node.was_removed_for(7));
        assert!(!node.was_removed_for(8));

        // Context 0 is reserved: never tombstoned, never skipped.
        assert!(!node.remove_for(0));
        assert!(!node.was_removed_for(0));
    }

    #[test]
    fn test_visit_skips_internal_and_tombstoned() {
        let node = Node::internal();
        assert_eq!(node.visit(0, |_, _| true), None);

        let node = Node::terminal(Bytes::from_static(b"k"));
        node.merge(&one_field(), 0, &Sample::new(0).with("hits", 1.0));
        assert_eq!(node.visit(3, |key, _| key == b"k"), Some(true));

        node.remove_for(3);
        assert_eq!(node.visit(3, |_, _| true), None);
        assert_eq!(node.visit(0, |_, _| true), Some(true));
    }
}
