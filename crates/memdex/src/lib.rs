//! Memdex - Fennec In-Memory Time Series Index
//!
//! This crate provides the concurrent in-memory indexing core of the Fennec
//! time series analytics database.
//!
//! # Components
//!
//! - [`ByteTree`]: concurrent radix tree mapping opaque dimension keys to a
//!   per-field vector of compressed sequences, with per-reader tombstones
//! - [`Sequence`]: packed fixed-resolution sequence codec
//! - [`TreeScan`] / [`RowFilter`] / [`FlatRowFilter`] / [`Flatten`]:
//!   pull-based query pipeline stages sharing schema metadata
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use fennec_memdex::expr::sum;
//! use fennec_memdex::{ByteTree, Field, Fields, Sample, Table};
//!
//! let table = Table::new(
//!     "requests",
//!     Fields::new(vec![Field::new("hits", sum("hits"))]),
//!     Duration::from_secs(60),
//! );
//!
//! let tree = ByteTree::new();
//! tree.update(&table, 0, b"host=a", &Sample::new(now_ns).with("hits", 1.0));
//! assert_eq!(tree.length(0), 1);
//! ```

#![deny(missing_docs)]

pub mod encoding;
pub mod error;
pub mod expr;
pub mod pipeline;
pub mod schema;
pub mod tree;

pub use encoding::{Sequence, Timestamp};
pub use error::{MemdexError, Result};
pub use expr::{Expr, Sample};
pub use pipeline::{
    Deadline, FlatRow, FlatRowFilter, FlatRowSource, Flatten, OnFlatRow, OnRow, RowFilter,
    RowSource, Source, Transform, TreeScan, Vals,
};
pub use schema::{Field, Fields, GroupBy, Table};
pub use tree::{ByteTree, ContextId};
