//! Pagination bounds normalization.
//!
//! Callers express slices as `(begin, end)` where either bound may be
//! omitted or negative. Bounds are normalized against the live row count:
//! negative values address from the end, inverted bounds are swapped, and
//! the end bound is exclusive.

use serde::{Deserialize, Serialize};

/// Relative slice bounds, normalized against a live total at query time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SliceBounds {
    /// Start offset; negative counts from the end
    pub begin: Option<i64>,
    /// Exclusive end offset; negative counts from the end
    pub end: Option<i64>,
}

impl SliceBounds {
    /// Bounds selecting everything
    pub fn all() -> SliceBounds {
        SliceBounds::default()
    }

    /// Bounds with both ends set
    pub fn new(begin: i64, end: i64) -> SliceBounds {
        SliceBounds {
            begin: Some(begin),
            end: Some(end),
        }
    }

    /// Fill unset bounds from a fallback (a store's default bounds)
    pub fn or(self, fallback: SliceBounds) -> SliceBounds {
        SliceBounds {
            begin: self.begin.or(fallback.begin),
            end: self.end.or(fallback.end),
        }
    }

    /// True when no bound is set
    pub fn is_unbounded(&self) -> bool {
        self.begin.is_none() && self.end.is_none()
    }

    /// Convert to an absolute `(offset, limit)` against `total` rows.
    ///
    /// `limit` is `None` when the slice is open-ended.
    pub fn normalize(&self, total: u64) -> (u64, Option<u64>) {
        let total = total as i64;
        let adjust = |bound: i64| -> i64 {
            let abs = if bound < 0 { total + bound } else { bound };
            abs.clamp(0, total)
        };
        match (self.begin, self.end) {
            (Some(b), Some(e)) => {
                let (mut b, mut e) = (adjust(b), adjust(e));
                if b > e {
                    std::mem::swap(&mut b, &mut e);
                }
                (b as u64, Some((e - b) as u64))
            }
            (Some(b), None) => (adjust(b) as u64, None),
            (None, Some(e)) => (0, Some(adjust(e) as u64)),
            (None, None) => (0, None),
        }
    }
}
