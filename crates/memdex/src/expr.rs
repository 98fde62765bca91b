//! Per-period accumulator expressions.
//!
//! An [`Expr`] owns the layout of one period slot inside a sequence: how many
//! bytes it occupies, how an incoming [`Sample`] merges into it, and how a
//! stored slot reads back out. The sequence codec treats slots as opaque
//! bytes and delegates all interpretation here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::encoding::Timestamp;

/// A timestamped bundle of named raw values submitted on the write path.
#[derive(Debug, Clone)]
pub struct Sample {
    ts: Timestamp,
    values: HashMap<String, f64>,
}

impl Sample {
    /// Creates an empty sample at the given timestamp.
    pub fn new(ts: Timestamp) -> Self {
        Self {
            ts,
            values: HashMap::new(),
        }
    }

    /// Adds a named value to this sample.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Timestamp of this sample.
    pub fn ts(&self) -> Timestamp {
        self.ts
    }

    /// Looks up a named value.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// An accumulator evaluated once per sequence period.
pub trait Expr: std::fmt::Debug + Send + Sync {
    /// Number of bytes one period slot occupies for this expression.
    fn encoded_width(&self) -> usize;

    /// True if the expression evaluates to the same value for every period.
    fn is_constant(&self) -> bool {
        false
    }

    /// Merges one sample into a period slot.
    fn update(&self, slot: &mut [u8], sample: &Sample);

    /// Reads the current value of a period slot and whether it was ever set.
    fn get(&self, slot: &[u8]) -> (f64, bool);
}

/// Slot width of the scalar accumulators: a set flag plus an f64.
const ACCUMULATOR_WIDTH: usize = 9;

fn read_slot(slot: &[u8]) -> (f64, bool) {
    let set = slot[0] != 0;
    let value = f64::from_le_bytes(slot[1..ACCUMULATOR_WIDTH].try_into().unwrap());
    (value, set)
}

fn write_slot(slot: &mut [u8], value: f64) {
    slot[0] = 1;
    slot[1..ACCUMULATOR_WIDTH].copy_from_slice(&value.to_le_bytes());
}

/// Sums the named input across all samples in a period.
#[derive(Debug, Clone)]
pub struct Sum {
    input: String,
}

impl Expr for Sum {
    fn encoded_width(&self) -> usize {
        ACCUMULATOR_WIDTH
    }

    fn update(&self, slot: &mut [u8], sample: &Sample) {
        if let Some(v) = sample.get(&self.input) {
            let (current, set) = read_slot(slot);
            write_slot(slot, if set { current + v } else { v });
        }
    }

    fn get(&self, slot: &[u8]) -> (f64, bool) {
        read_slot(slot)
    }
}

/// Counts the samples that carry the named input in a period.
#[derive(Debug, Clone)]
pub struct Count {
    input: String,
}

impl Expr for Count {
    fn encoded_width(&self) -> usize {
        ACCUMULATOR_WIDTH
    }

    fn update(&self, slot: &mut [u8], sample: &Sample) {
        if sample.get(&self.input).is_some() {
            let (current, set) = read_slot(slot);
            write_slot(slot, if set { current + 1.0 } else { 1.0 });
        }
    }

    fn get(&self, slot: &[u8]) -> (f64, bool) {
        read_slot(slot)
    }
}

/// Keeps the maximum of the named input across all samples in a period.
#[derive(Debug, Clone)]
pub struct Max {
    input: String,
}

impl Expr for Max {
    fn encoded_width(&self) -> usize {
        ACCUMULATOR_WIDTH
    }

    fn update(&self, slot: &mut [u8], sample: &Sample) {
        if let Some(v) = sample.get(&self.input) {
            let (current, set) = read_slot(slot);
            write_slot(slot, if set { current.max(v) } else { v });
        }
    }

    fn get(&self, slot: &[u8]) -> (f64, bool) {
        read_slot(slot)
    }
}

/// A fixed value taking no slot space.
#[derive(Debug, Clone)]
pub struct Constant {
    value: f64,
}

impl Expr for Constant {
    fn encoded_width(&self) -> usize {
        0
    }

    fn is_constant(&self) -> bool {
        true
    }

    fn update(&self, _slot: &mut [u8], _sample: &Sample) {}

    fn get(&self, _slot: &[u8]) -> (f64, bool) {
        (self.value, true)
    }
}

/// Creates a [`Sum`] over the named input.
pub fn sum(input: impl Into<String>) -> Arc<dyn Expr> {
    Arc::new(Sum {
        input: input.into(),
    })
}

/// Creates a [`Count`] of the named input.
pub fn count(input: impl Into<String>) -> Arc<dyn Expr> {
    Arc::new(Count {
        input: input.into(),
    })
}

/// Creates a [`Max`] over the named input.
pub fn max(input: impl Into<String>) -> Arc<dyn Expr> {
    Arc::new(Max {
        input: input.into(),
    })
}

/// Creates a [`Constant`] expression.
pub fn constant(value: f64) -> Arc<dyn Expr> {
    Arc::new(Constant { value })
}
