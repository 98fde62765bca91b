//! Timestamp and resolution primitives shared by the sequence codec.

pub mod sequence;

pub use sequence::{Sequence, TIME_WIDTH};

use std::time::Duration;

/// Nanosecond-precision timestamp relative to the Unix epoch.
pub type Timestamp = i64;

/// Converts a resolution to whole nanoseconds.
pub fn duration_nanos(resolution: Duration) -> i64 {
    resolution.as_nanos() as i64
}

/// Floors a timestamp to the start of its resolution period.
pub fn round_to_resolution(ts: Timestamp, resolution: Duration) -> Timestamp {
    let res = duration_nanos(resolution);
    debug_assert!(res > 0, "resolution must be non-zero");
    ts.div_euclid(res) * res
}
