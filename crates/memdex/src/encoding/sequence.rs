//! Packed fixed-resolution sequence codec.
//!
//! A sequence is the compressed time series of a single field at a single
//! dimension key. The layout is byte-aligned and little-endian:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Until Timestamp: i64 nanos (8 bytes)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Period 0 (width bytes): starts at until                     │
//! │  Period 1 (width bytes): starts at until - resolution        │
//! │  ...                                                         │
//! │  Period n-1 (width bytes): starts at until - (n-1)*res       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `width` is the expression's encoded width; period slots hold whatever the
//! expression accumulates there. An empty sequence is zero bytes. A width-0
//! expression (a constant) stores only the header and tracks `until`.
//!
//! Sequences are immutable: every update returns a fresh buffer, so readers
//! holding a clone keep a consistent snapshot while writers replace the slot.

use bytes::Bytes;
use std::time::Duration;

use super::{duration_nanos, round_to_resolution, Timestamp};
use crate::expr::{Expr, Sample};

/// Width of the `until` timestamp header in bytes.
pub const TIME_WIDTH: usize = 8;

/// A packed time series for one field, most recent period first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    buf: Bytes,
}

impl Sequence {
    /// Returns the empty sequence.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of bytes this sequence occupies.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if this sequence holds no data at all.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Start of the most recent period, or 0 for an empty sequence.
    pub fn until(&self) -> Timestamp {
        if self.buf.len() < TIME_WIDTH {
            return 0;
        }
        i64::from_le_bytes(self.buf[..TIME_WIDTH].try_into().unwrap())
    }

    /// Number of stored periods for the given slot width.
    pub fn num_periods(&self, width: usize) -> usize {
        if width == 0 || self.buf.len() <= TIME_WIDTH {
            return 0;
        }
        (self.buf.len() - TIME_WIDTH) / width
    }

    /// Inclusive start of the oldest stored period, or 0 for an empty
    /// sequence.
    pub fn as_of(&self, width: usize, resolution: Duration) -> Timestamp {
        let periods = self.num_periods(width);
        if periods == 0 {
            return 0;
        }
        self.until() - (periods as i64 - 1) * duration_nanos(resolution)
    }

    /// Reads the value covering `ts`, reporting whether the slot was ever
    /// set. Timestamps after `until` or before the oldest stored period are
    /// not found; width-0 expressions report their value for any ts ≤ until.
    pub fn value_at(&self, ts: Timestamp, expr: &dyn Expr, resolution: Duration) -> (f64, bool) {
        if self.is_empty() {
            return (0.0, false);
        }
        let ts = round_to_resolution(ts, resolution);
        let until = self.until();
        if ts > until {
            return (0.0, false);
        }
        let width = expr.encoded_width();
        let period = ((until - ts) / duration_nanos(resolution)) as usize;
        let offset = TIME_WIDTH + period * width;
        if offset + width > self.buf.len() {
            return (0.0, false);
        }
        expr.get(&self.buf[offset..offset + width])
    }

    /// Drops periods whose start is not after `truncate_before`, returning
    /// the shortened sequence (possibly empty).
    pub fn truncate(
        &self,
        width: usize,
        resolution: Duration,
        truncate_before: Timestamp,
    ) -> Sequence {
        if self.is_empty() {
            return Sequence::empty();
        }
        let cutoff = round_to_resolution(truncate_before, resolution);
        let max_periods = (self.until() - cutoff) / duration_nanos(resolution);
        if max_periods <= 0 {
            return Sequence::empty();
        }
        let max_len = TIME_WIDTH + max_periods as usize * width;
        if max_len >= self.buf.len() {
            return self.clone();
        }
        Sequence {
            buf: self.buf.slice(..max_len),
        }
    }

    /// Merges one sample into this sequence, returning a fresh sequence
    /// truncated to the cutoff. Samples strictly older than the cutoff only
    /// truncate; samples older than the stored window are dropped.
    pub fn update(
        &self,
        sample: &Sample,
        expr: &dyn Expr,
        resolution: Duration,
        truncate_before: Timestamp,
    ) -> Sequence {
        let width = expr.encoded_width();
        let res = duration_nanos(resolution);
        let ts = round_to_resolution(sample.ts(), resolution);
        let cutoff = round_to_resolution(truncate_before, resolution);

        if ts < cutoff {
            return self.truncate(width, resolution, truncate_before);
        }

        if self.is_empty() || self.until() < cutoff {
            // Start over at the sample's period.
            let mut out = vec![0u8; TIME_WIDTH + width];
            out[..TIME_WIDTH].copy_from_slice(&ts.to_le_bytes());
            expr.update(&mut out[TIME_WIDTH..], sample);
            return Sequence { buf: out.into() };
        }

        let until = self.until();
        if ts > until {
            // Prepend newer periods, zero-filled across any gap.
            let gap = ((ts - until) / res) as usize;
            let mut out = vec![0u8; self.buf.len() + gap * width];
            out[..TIME_WIDTH].copy_from_slice(&ts.to_le_bytes());
            out[TIME_WIDTH + gap * width..].copy_from_slice(&self.buf[TIME_WIDTH..]);
            expr.update(&mut out[TIME_WIDTH..TIME_WIDTH + width], sample);
            return Sequence { buf: out.into() }.truncate(width, resolution, truncate_before);
        }

        let period = ((until - ts) / res) as usize;
        let offset = TIME_WIDTH + period * width;
        if width == 0 || offset + width > self.buf.len() {
            // Nothing to merge into: width-0 slots carry no state, and
            // samples older than the stored window are dropped.
            return self.truncate(width, resolution, truncate_before);
        }
        let mut out = self.buf.to_vec();
        expr.update(&mut out[offset..offset + width], sample);
        Sequence { buf: out.into() }.truncate(width, resolution, truncate_before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{constant, sum};

    const RES: Duration = Duration::from_secs(60);
    const RES_NANOS: i64 = 60 * 1_000_000_000;

    fn hits(ts: Timestamp, v: f64) -> Sample {
        Sample::new(ts).with("hits", v)
    }

    #[test]
    fn test_empty_sequence() {
        let seq = Sequence::empty();
        let expr = sum("hits");
        assert!(seq.is_empty());
        assert_eq!(seq.until(), 0);
        assert_eq!(seq.num_periods(expr.encoded_width()), 0);
        assert_eq!(seq.as_of(expr.encoded_width(), RES), 0);
        assert_eq!(seq.value_at(0, expr.as_ref(), RES), (0.0, false));
    }

    #[test]
    fn test_fresh_update() {
        let expr = sum("hits");
        let seq = Sequence::empty().update(&hits(RES_NANOS * 5, 2.0), expr.as_ref(), RES, 0);
        assert_eq!(seq.len(), TIME_WIDTH + 9);
        assert_eq!(seq.until(), RES_NANOS * 5);
        assert_eq!(seq.num_periods(9), 1);
        assert_eq!(seq.as_of(9, RES), RES_NANOS * 5);
        assert_eq!(seq.value_at(RES_NANOS * 5, expr.as_ref(), RES), (2.0, true));
    }

    #[test]
    fn test_prepend_with_gap() {
        let expr = sum("hits");
        let seq = Sequence::empty()
            .update(&hits(RES_NANOS, 1.0), expr.as_ref(), RES, 0)
            .update(&hits(RES_NANOS * 4, 2.0), expr.as_ref(), RES, 0);
        assert_eq!(seq.num_periods(9), 4);
        assert_eq!(seq.until(), RES_NANOS * 4);
        assert_eq!(seq.as_of(9, RES), RES_NANOS);
        assert_eq!(seq.value_at(RES_NANOS * 4, expr.as_ref(), RES), (2.0, true));
        assert_eq!(seq.value_at(RES_NANOS, expr.as_ref(), RES), (1.0, true));
        // Gap periods exist but were never set.
        assert_eq!(seq.value_at(RES_NANOS * 2, expr.as_ref(), RES), (0.0, false));
        assert_eq!(seq.value_at(RES_NANOS * 3, expr.as_ref(), RES), (0.0, false));
    }

    #[test]
    fn test_in_window_merge() {
        let expr = sum("hits");
        let seq = Sequence::empty()
            .update(&hits(RES_NANOS * 3, 1.0), expr.as_ref(), RES, 0)
            .update(&hits(RES_NANOS, 5.0), expr.as_ref(), RES, 0);
        // The second sample lands two periods before a one-period window and
        // is dropped rather than growing the sequence backwards.
        assert_eq!(seq.num_periods(9), 1);
        assert_eq!(seq.value_at(RES_NANOS, expr.as_ref(), RES), (0.0, false));

        // With the window established first, in-place merge accumulates.
        let seq = Sequence::empty()
            .update(&hits(RES_NANOS, 1.0), expr.as_ref(), RES, 0)
            .update(&hits(RES_NANOS * 3, 1.0), expr.as_ref(), RES, 0)
            .update(&hits(RES_NANOS, 5.0), expr.as_ref(), RES, 0);
        assert_eq!(seq.num_periods(9), 3);
        assert_eq!(seq.value_at(RES_NANOS, expr.as_ref(), RES), (6.0, true));
    }

    #[test]
    fn test_update_rounds_timestamps() {
        let expr = sum("hits");
        let seq = Sequence::empty()
            .update(&hits(RES_NANOS + 1, 1.0), expr.as_ref(), RES, 0)
            .update(&hits(RES_NANOS + 2, 1.0), expr.as_ref(), RES, 0);
        assert_eq!(seq.num_periods(9), 1);
        assert_eq!(seq.until(), RES_NANOS);
        assert_eq!(seq.value_at(RES_NANOS + 30, expr.as_ref(), RES), (2.0, true));
    }

    #[test]
    fn test_sample_older_than_cutoff_truncates() {
        let expr = sum("hits");
        let seq = Sequence::empty()
            .update(&hits(RES_NANOS, 1.0), expr.as_ref(), RES, 0)
            .update(&hits(RES_NANOS * 2, 1.0), expr.as_ref(), RES, 0)
            .update(&hits(RES_NANOS * 3, 1.0), expr.as_ref(), RES, 0);
        assert_eq!(seq.num_periods(9), 3);

        // A stale sample with an advanced cutoff shrinks the sequence.
        let truncated = seq.update(&hits(0, 9.0), expr.as_ref(), RES, RES_NANOS * 2);
        assert_eq!(truncated.num_periods(9), 1);
        assert_eq!(truncated.until(), RES_NANOS * 3);
    }

    #[test]
    fn test_truncate_boundary() {
        let expr = sum("hits");
        let seq = Sequence::empty()
            .update(&hits(RES_NANOS, 1.0), expr.as_ref(), RES, 0)
            .update(&hits(RES_NANOS * 3, 1.0), expr.as_ref(), RES, 0);
        assert_eq!(seq.num_periods(9), 3);

        // A period starting exactly at the cutoff is dropped.
        let t = seq.truncate(9, RES, RES_NANOS);
        assert_eq!(t.num_periods(9), 2);
        assert_eq!(t.as_of(9, RES), RES_NANOS * 2);

        // Truncating past until empties the sequence.
        let t = seq.truncate(9, RES, RES_NANOS * 3);
        assert!(t.is_empty());
    }

    #[test]
    fn test_value_at_window_edges() {
        let expr = sum("hits");
        let seq = Sequence::empty()
            .update(&hits(RES_NANOS * 2, 1.0), expr.as_ref(), RES, 0)
            .update(&hits(RES_NANOS * 4, 1.0), expr.as_ref(), RES, 0);
        assert_eq!(seq.value_at(RES_NANOS * 5, expr.as_ref(), RES), (0.0, false));
        assert_eq!(seq.value_at(RES_NANOS, expr.as_ref(), RES), (0.0, false));
        assert_eq!(seq.value_at(RES_NANOS * 2, expr.as_ref(), RES), (1.0, true));
        assert_eq!(seq.value_at(RES_NANOS * 4, expr.as_ref(), RES), (1.0, true));
    }

    #[test]
    fn test_constant_width_zero() {
        let expr = constant(7.5);
        let seq = Sequence::empty().update(&hits(RES_NANOS * 3, 0.0), expr.as_ref(), RES, 0);
        assert_eq!(seq.len(), TIME_WIDTH);
        assert_eq!(seq.until(), RES_NANOS * 3);
        assert_eq!(seq.num_periods(0), 0);
        // Any timestamp up to until reports the constant.
        assert_eq!(seq.value_at(0, expr.as_ref(), RES), (7.5, true));
        assert_eq!(seq.value_at(RES_NANOS * 3, expr.as_ref(), RES), (7.5, true));
        assert_eq!(seq.value_at(RES_NANOS * 4, expr.as_ref(), RES), (0.0, false));
        // Advancing until keeps the header-only layout.
        let seq = seq.update(&hits(RES_NANOS * 5, 0.0), expr.as_ref(), RES, 0);
        assert_eq!(seq.len(), TIME_WIDTH);
        assert_eq!(seq.until(), RES_NANOS * 5);
        // An expired constant is dropped entirely.
        let t = seq.truncate(0, RES, RES_NANOS * 5);
        assert!(t.is_empty());
    }
}
