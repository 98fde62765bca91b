//! Concurrent radix tree ("byte-tree") mapping opaque dimension keys to
//! per-field compressed sequences.

mod bytetree;
mod node;

pub use bytetree::ByteTree;

/// Iteration-context identifier.
///
/// A context identifies one logical reader for per-reader tombstoning. The
/// value 0 is reserved to mean "no per-iteration bookkeeping": context-0
/// reads never tombstone and never skip tombstoned nodes. Callers must
/// allocate monotonically increasing nonzero ids for consuming readers.
pub type ContextId = i64;
