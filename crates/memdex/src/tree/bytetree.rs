//! The concurrent byte-tree mapping opaque keys to per-field sequences.
//!
//! A radix tree with path compression: each edge carries a multi-byte label
//! and no two sibling edges share a non-empty prefix. The tree owns every
//! node through a growing slot vector and edges refer to nodes by index, so
//! a split re-points an edge in place without freeing the orphaned layout.
//!
//! # Locking
//!
//! Two lock levels cooperate:
//!
//! - the tree-level lock guards the slot vector, every node's edge list, and
//!   the aggregate counters;
//! - each node's own lock guards its sequence slots and tombstones.
//!
//! A node lock is always released before the tree lock is taken for counter
//! updates, and the tree lock is never held while taking a node lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tracing::trace;

use crate::encoding::{Sequence, Timestamp};
use crate::expr::Sample;
use crate::schema::Table;
use crate::tree::node::Node;
use crate::tree::ContextId;

/// Slot index of the always-present empty root node.
const ROOT: usize = 0;

/// An edge to a child node, labeled with the bytes consumed by traversal.
#[derive(Debug, Clone)]
struct Edge {
    label: Bytes,
    target: usize,
}

/// One arena slot: the node handle plus its outgoing edges.
#[derive(Debug)]
struct Slot {
    node: Arc<Node>,
    edges: Vec<Edge>,
}

/// Structural state guarded by the tree-level lock.
#[derive(Debug)]
struct Core {
    slots: Vec<Slot>,
    total_bytes: usize,
    total_length: usize,
    ctx_removals: HashMap<ContextId, usize>,
}

/// The next move for a key suffix at some node, decided by prefix matching
/// against the node's edges.
enum Step {
    /// Exact label match with the key fully consumed.
    Found(usize),
    /// Label fully consumed with key bytes remaining: descend.
    Descend { target: usize, consumed: usize },
    /// Partial label match: split this edge at the given offset.
    Split { pos: usize, at: usize },
    /// No edge shares a prefix: append a new edge.
    Append,
}

/// A concurrent radix tree mapping non-empty byte keys to per-field
/// sequence vectors.
///
/// Terminal nodes are created on first update for a key and never physically
/// removed; logical deletion is per iteration context via tombstones.
#[derive(Debug)]
pub struct ByteTree {
    core: RwLock<Core>,
}

impl Default for ByteTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        let root = Slot {
            node: Arc::new(Node::internal()),
            edges: Vec::new(),
        };
        Self {
            core: RwLock::new(Core {
                slots: vec![root],
                total_bytes: 0,
                total_length: 0,
                ctx_removals: HashMap::new(),
            }),
        }
    }

    /// Total stored bytes: all sequence bytes plus all edge-label bytes.
    ///
    /// The counter is maintained under the tree lock after each node merge
    /// completes, so concurrent readers may briefly observe a value slightly
    /// behind the true sum.
    pub fn bytes(&self) -> usize {
        self.read().total_bytes
    }

    /// Number of terminal nodes still visible to the given iteration
    /// context: total terminals minus the context's tombstones.
    pub fn length(&self, ctx: ContextId) -> usize {
        let core = self.read();
        core.total_length - core.ctx_removals.get(&ctx).copied().unwrap_or(0)
    }

    /// Merges `sample` into the terminal node for `key`, creating it (and
    /// any structural splits) as needed. Returns the net change in stored
    /// bytes, including new edge labels.
    ///
    /// `key` must be non-empty; `table` must be stable for the duration of
    /// the call.
    pub fn update(
        &self,
        table: &Table,
        truncate_before: Timestamp,
        key: &[u8],
        sample: &Sample,
    ) -> i64 {
        debug_assert!(!key.is_empty(), "update requires a non-empty key");

        // Fast path: the key already has a node, no structural change.
        let existing = {
            let core = self.read();
            find_terminal(&core, key).map(|idx| core.slots[idx].node.clone())
        };
        let (node, structural_bytes) = match existing {
            Some(node) => (node, 0i64),
            None => {
                let mut core = self.write();
                let (idx, added) = insert(&mut core, key);
                (core.slots[idx].node.clone(), added)
            }
        };

        node.ensure_key(key);
        // The node lock is released inside merge before the tree lock is
        // retaken for the counters.
        let (merge_delta, became_terminal) = node.merge(table, truncate_before, sample);
        let delta = merge_delta + structural_bytes;
        self.record_update(delta, became_terminal);
        delta
    }

    /// Tombstones the terminal node for `key` under `ctx` and returns its
    /// sequence vector, or `None` if no such node exists or it is already
    /// tombstoned for `ctx`.
    ///
    /// With the reserved context 0 this is a no-op that still returns the
    /// data: context 0 carries no per-iteration state.
    pub fn remove(&self, ctx: ContextId, key: &[u8]) -> Option<Vec<Sequence>> {
        let node = {
            let core = self.read();
            find_terminal(&core, key).map(|idx| core.slots[idx].node.clone())
        }?;
        if node.was_removed_for(ctx) {
            return None;
        }
        let data = node.snapshot_data();
        if data.is_empty() {
            // Exact match on a pure-split internal node: nothing stored.
            return None;
        }
        if node.remove_for(ctx) {
            self.record_removal(ctx);
        }
        Some(data)
    }

    /// Breadth-first traversal of all terminal nodes visible to `ctx`.
    ///
    /// The visitor runs under the node's read lock and observes a consistent
    /// sequence vector. Returning `false` tombstones the node for `ctx`, so
    /// later walks with the same context skip it. Each node is visited at
    /// most once per walk; structural writes racing the walk may or may not
    /// be observed.
    pub fn walk<F>(&self, ctx: ContextId, mut visit: F)
    where
        F: FnMut(&[u8], &[Sequence]) -> bool,
    {
        // Capacity from the visible length is a size hint only.
        let mut queue = VecDeque::with_capacity(self.length(ctx) + 1);
        queue.push_back(ROOT);
        while let Some(idx) = queue.pop_front() {
            let node = self.read().slots[idx].node.clone();
            if node.visit(ctx, &mut visit) == Some(false) && node.remove_for(ctx) {
                self.record_removal(ctx);
            }
            let core = self.read();
            for edge in &core.slots[idx].edges {
                queue.push_back(edge.target);
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Core> {
        self.core.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Core> {
        self.core.write().unwrap_or_else(|err| err.into_inner())
    }

    /// Applies an update's byte delta and terminal count to the aggregate
    /// counters. Callers must not hold any node lock.
    fn record_update(&self, delta: i64, became_terminal: bool) {
        let mut core = self.write();
        core.total_bytes = (core.total_bytes as i64 + delta) as usize;
        if became_terminal {
            core.total_length += 1;
        }
    }

    /// Counts one tombstone against the context. Callers must not hold any
    /// node lock.
    fn record_removal(&self, ctx: ContextId) {
        let mut core = self.write();
        *core.ctx_removals.entry(ctx).or_insert(0) += 1;
    }
}

/// Locates the node whose path exactly spells `full_key`, without mutating
/// structure. A partial label match is final: siblings share no prefix.
fn find_terminal(core: &Core, full_key: &[u8]) -> Option<usize> {
    let mut current = ROOT;
    let mut key = full_key;
    'descend: loop {
        for edge in &core.slots[current].edges {
            let m = common_prefix_len(&edge.label, key);
            if m == edge.label.len() && m == key.len() {
                return Some(edge.target);
            } else if m == edge.label.len() && m < key.len() {
                current = edge.target;
                key = &key[m..];
                continue 'descend;
            } else if m > 0 {
                return None;
            }
        }
        return None;
    }
}

/// Descends from the root, splitting or appending as needed, and returns
/// `(slot index for the key's node, structural bytes added)`.
fn insert(core: &mut Core, full_key: &[u8]) -> (usize, i64) {
    let mut current = ROOT;
    let mut key_off = 0usize;
    loop {
        let remaining = &full_key[key_off..];
        let mut step = Step::Append;
        for (pos, edge) in core.slots[current].edges.iter().enumerate() {
            let m = common_prefix_len(&edge.label, remaining);
            if m == edge.label.len() && m == remaining.len() {
                step = Step::Found(edge.target);
                break;
            } else if m == edge.label.len() && m < remaining.len() {
                step = Step::Descend {
                    target: edge.target,
                    consumed: m,
                };
                break;
            } else if m > 0 {
                step = Step::Split { pos, at: m };
                break;
            }
        }
        match step {
            Step::Found(target) => return (target, 0),
            Step::Descend { target, consumed } => {
                current = target;
                key_off += consumed;
            }
            Step::Split { pos, at } => return split_edge(core, current, pos, at, full_key, key_off),
            Step::Append => {
                let label = Bytes::copy_from_slice(remaining);
                let added = label.len() as i64;
                let target = push_slot(core, Node::terminal(Bytes::copy_from_slice(full_key)));
                core.slots[current].edges.push(Edge { label, target });
                trace!(key_len = full_key.len(), "appended edge for new key");
                return (target, added);
            }
        }
    }
}

/// Splits the edge at `pos` of `parent` at label offset `at`, inserting a
/// new internal node. When the key ends at the split point the internal
/// node itself becomes the terminal for `full_key`.
fn split_edge(
    core: &mut Core,
    parent: usize,
    pos: usize,
    at: usize,
    full_key: &[u8],
    key_off: usize,
) -> (usize, i64) {
    let remaining_len = full_key.len() - key_off;
    let (old_label, old_target) = {
        let edge = &core.slots[parent].edges[pos];
        (edge.label.clone(), edge.target)
    };

    // The new internal node takes over the tail of the split label.
    let tail = Edge {
        label: old_label.slice(at..),
        target: old_target,
    };
    let internal;
    let leaf;
    if at < remaining_len {
        internal = push_slot(core, Node::internal());
        leaf = push_slot(core, Node::terminal(Bytes::copy_from_slice(full_key)));
        core.slots[internal].edges.push(tail);
        core.slots[internal].edges.push(Edge {
            label: Bytes::copy_from_slice(&full_key[key_off + at..]),
            target: leaf,
        });
    } else {
        internal = push_slot(core, Node::terminal(Bytes::copy_from_slice(full_key)));
        leaf = internal;
        core.slots[internal].edges.push(tail);
    }

    let edge = &mut core.slots[parent].edges[pos];
    edge.label = old_label.slice(..at);
    edge.target = internal;
    trace!(split_at = at, key_len = full_key.len(), "split edge");
    (leaf, (remaining_len - at) as i64)
}

fn push_slot(core: &mut Core, node: Node) -> usize {
    core.slots.push(Slot {
        node: Arc::new(node),
        edges: Vec::new(),
    });
    core.slots.len() - 1
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
