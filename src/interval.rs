// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Frequency intervals, and the partitioning of a spectral window into
//! continuum-safe chunks.

use std::fmt::{Display, Formatter};

use log::{trace, warn};
use serde::{Deserialize, Serialize};

/// A closed frequency range `[start, end]`, usually in GHz.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// The lower bound
    pub start: f64,
    /// The upper bound
    pub end: f64,
}

impl Interval {
    /// Create a new interval. No validation is done; see [`Interval::is_malformed`].
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Create an interval from two bounds given in any order.
    pub fn from_unordered(a: f64, b: f64) -> Self {
        if a <= b {
            Self::new(a, b)
        } else {
            Self::new(b, a)
        }
    }

    /// The width of the interval. Zero for malformed intervals.
    pub fn width(&self) -> f64 {
        if self.is_malformed() {
            0.0
        } else {
            self.end - self.start
        }
    }

    /// Whether `start > end`, or either bound is not a number.
    pub fn is_malformed(&self) -> bool {
        // `!(a <= b)` is also true when either bound is NaN.
        #[allow(clippy::neg_cmp_op_on_partial_ord)]
        let malformed = !(self.start <= self.end);
        malformed
    }

    /// Whether `value` lies inside the interval, bounds included.
    pub fn contains(&self, value: f64) -> bool {
        self.start <= value && value <= self.end
    }

    /// The overlapping part of two intervals, if they overlap.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start <= end {
            Some(Self::new(start, end))
        } else {
            None
        }
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}~{}", self.start, self.end)
    }
}

impl From<(f64, f64)> for Interval {
    fn from((start, end): (f64, f64)) -> Self {
        Self::new(start, end)
    }
}

/// How a single exclusion affects a single chunk.
#[derive(Debug, PartialEq)]
enum Overlap {
    /// The exclusion does not touch the chunk.
    None,
    /// The exclusion covers the whole chunk.
    Cover,
    /// The exclusion covers the lower edge of the chunk.
    Lower,
    /// The exclusion covers the upper edge of the chunk.
    Upper,
    /// The exclusion lies strictly inside the chunk.
    Inside,
    /// None of the above. Only reachable with malformed bounds.
    Degenerate,
}

fn classify(chunk: &Interval, excl: &Interval) -> Overlap {
    if excl.end < chunk.start || excl.start > chunk.end {
        Overlap::None
    } else if excl.start <= chunk.start && excl.end >= chunk.end {
        Overlap::Cover
    } else if excl.start <= chunk.start && chunk.start <= excl.end {
        Overlap::Lower
    } else if excl.start <= chunk.end && chunk.end <= excl.end {
        Overlap::Upper
    } else if chunk.start < excl.start && excl.end < chunk.end {
        Overlap::Inside
    } else {
        Overlap::Degenerate
    }
}

/// Apply one exclusion to every chunk, producing the refined chunk list.
fn apply_exclusion(chunks: Vec<Interval>, excl: &Interval) -> Vec<Interval> {
    if excl.is_malformed() {
        warn!("ignoring malformed exclusion range {excl}");
        return chunks;
    }

    let mut refined = Vec::with_capacity(chunks.len() + 1);
    for chunk in chunks {
        match classify(&chunk, excl) {
            Overlap::None => refined.push(chunk),
            Overlap::Cover => {}
            Overlap::Lower => refined.push(Interval::new(excl.end, chunk.end)),
            Overlap::Upper => refined.push(Interval::new(chunk.start, excl.start)),
            Overlap::Inside => {
                refined.push(Interval::new(chunk.start, excl.start));
                refined.push(Interval::new(excl.end, chunk.end));
            }
            Overlap::Degenerate => {
                warn!("exclusion {excl} has no defined effect on chunk {chunk}, leaving it unchanged");
                refined.push(chunk);
            }
        }
    }
    refined
}

/// Subtract the `exclusions` from `base`, returning the remaining continuum
/// chunks in insertion order.
///
/// Exclusions are applied one at a time, each against the chunk list left by
/// the previous one. Where two exclusions overlap, the boundary of the one
/// applied last wins at the seam, but the total width removed does not depend
/// on the order.
///
/// Malformed intervals (`start > end`) are not applied; a warning is logged
/// instead.
///
/// # Examples
///
/// ```rust
/// use lband::{partition_cont_range, Interval};
///
/// let chunks = partition_cont_range(
///     Interval::new(1.0, 2.0),
///     &[Interval::new(1.2, 1.4), Interval::new(1.6, 1.8)],
/// );
/// assert_eq!(
///     chunks,
///     vec![
///         Interval::new(1.0, 1.2),
///         Interval::new(1.4, 1.6),
///         Interval::new(1.8, 2.0),
///     ]
/// );
/// ```
pub fn partition_cont_range(base: Interval, exclusions: &[Interval]) -> Vec<Interval> {
    trace!("start partition_cont_range");

    if base.is_malformed() {
        warn!("base range {base} is malformed, no exclusions applied");
        return vec![base];
    }

    let chunks = exclusions
        .iter()
        .fold(vec![base], |chunks, excl| apply_exclusion(chunks, excl));

    trace!("end partition_cont_range");
    chunks
}

/// The summed width of a list of chunks.
pub fn total_width(chunks: &[Interval]) -> f64 {
    chunks.iter().map(Interval::width).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn assert_chunks_eq(result: &[Interval], expected: &[(f64, f64)]) {
        assert_eq!(
            result.len(),
            expected.len(),
            "chunk count mismatch: {result:?} vs {expected:?}"
        );
        for (chunk, &(start, end)) in result.iter().zip(expected) {
            assert_abs_diff_eq!(chunk.start, start, epsilon = 1e-12);
            assert_abs_diff_eq!(chunk.end, end, epsilon = 1e-12);
        }
    }

    /// Width of the union of `exclusions`, clipped to `base`.
    fn union_width_in(base: &Interval, exclusions: &[Interval]) -> f64 {
        let mut clipped: Vec<Interval> = exclusions
            .iter()
            .filter_map(|excl| excl.intersection(base))
            .collect();
        clipped.sort_by(|a, b| a.start.total_cmp(&b.start));
        let mut merged: Vec<Interval> = vec![];
        for iv in clipped {
            match merged.last_mut() {
                Some(last) if iv.start <= last.end => last.end = last.end.max(iv.end),
                _ => merged.push(iv),
            }
        }
        total_width(&merged)
    }

    #[test]
    fn test_partition_inside_splits() {
        let chunks = partition_cont_range(Interval::new(1.0, 2.0), &[Interval::new(1.3, 1.7)]);
        assert_chunks_eq(&chunks, &[(1.0, 1.3), (1.7, 2.0)]);
    }

    #[test]
    fn test_partition_lower_edge() {
        let chunks = partition_cont_range(Interval::new(1.0, 2.0), &[Interval::new(0.5, 1.5)]);
        assert_chunks_eq(&chunks, &[(1.5, 2.0)]);
    }

    #[test]
    fn test_partition_upper_edge() {
        let chunks = partition_cont_range(Interval::new(1.0, 2.0), &[Interval::new(1.5, 2.5)]);
        assert_chunks_eq(&chunks, &[(1.0, 1.5)]);
    }

    #[test]
    fn test_partition_edges_sharing_a_bound() {
        let chunks = partition_cont_range(Interval::new(1.0, 2.0), &[Interval::new(1.0, 1.2)]);
        assert_chunks_eq(&chunks, &[(1.2, 2.0)]);
        let chunks = partition_cont_range(Interval::new(1.0, 2.0), &[Interval::new(1.8, 2.0)]);
        assert_chunks_eq(&chunks, &[(1.0, 1.8)]);
    }

    #[test]
    fn test_partition_full_cover_deletes() {
        let chunks = partition_cont_range(Interval::new(1.0, 2.0), &[Interval::new(1.0, 2.0)]);
        assert!(chunks.is_empty());
        let chunks = partition_cont_range(Interval::new(1.0, 2.0), &[Interval::new(0.0, 3.0)]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_partition_two_inside() {
        let chunks = partition_cont_range(
            Interval::new(1.0, 2.0),
            &[Interval::new(1.2, 1.4), Interval::new(1.6, 1.8)],
        );
        assert_chunks_eq(&chunks, &[(1.0, 1.2), (1.4, 1.6), (1.8, 2.0)]);
    }

    #[test]
    fn test_partition_no_exclusions_is_identity() {
        let base = Interval::new(1.0, 2.0);
        assert_eq!(partition_cont_range(base, &[]), vec![base]);
    }

    #[test]
    fn test_partition_outside_is_untouched() {
        let base = Interval::new(1.0, 2.0);
        let chunks = partition_cont_range(
            base,
            &[Interval::new(0.1, 0.9), Interval::new(2.1, 3.0)],
        );
        assert_eq!(chunks, vec![base]);
    }

    #[test]
    fn test_partition_zero_width_base() {
        let base = Interval::new(1.5, 1.5);
        assert_eq!(
            partition_cont_range(base, &[Interval::new(1.6, 1.7)]),
            vec![base]
        );
        assert!(partition_cont_range(base, &[Interval::new(1.5, 1.5)]).is_empty());
    }

    #[test]
    fn test_partition_malformed_exclusion_is_noop() {
        let base = Interval::new(1.0, 2.0);
        let chunks = partition_cont_range(base, &[Interval::new(1.7, 1.3)]);
        assert_eq!(chunks, vec![base]);

        let chunks = partition_cont_range(
            base,
            &[Interval::new(f64::NAN, 1.5), Interval::new(1.3, 1.7)],
        );
        assert_chunks_eq(&chunks, &[(1.0, 1.3), (1.7, 2.0)]);
    }

    #[test]
    fn test_partition_overlapping_exclusions_order() {
        let base = Interval::new(1.0, 2.0);
        let a = Interval::new(1.2, 1.5);
        let b = Interval::new(1.4, 1.6);

        let ab = partition_cont_range(base, &[a, b]);
        let ba = partition_cont_range(base, &[b, a]);
        assert_chunks_eq(&ab, &[(1.0, 1.2), (1.6, 2.0)]);
        assert_chunks_eq(&ba, &[(1.0, 1.2), (1.6, 2.0)]);
        assert_abs_diff_eq!(total_width(&ab), total_width(&ba), epsilon = 1e-12);
    }

    #[test]
    fn test_partition_properties_random() {
        let mut rng = StdRng::seed_from_u64(1420);
        for _ in 0..500 {
            let lo = rng.gen_range(1.0..1.5);
            let base = Interval::new(lo, lo + rng.gen_range(0.0..0.5));
            let num_excl = rng.gen_range(0..6);
            let exclusions: Vec<Interval> = (0..num_excl)
                .map(|_| {
                    Interval::from_unordered(rng.gen_range(0.9..2.1), rng.gen_range(0.9..2.1))
                })
                .collect();

            let chunks = partition_cont_range(base, &exclusions);

            // every chunk is well formed and within the base
            for chunk in &chunks {
                assert!(!chunk.is_malformed());
                assert!(base.contains(chunk.start) && base.contains(chunk.end));
            }

            // pairwise disjoint, apart from shared bounds
            let mut sorted = chunks.clone();
            sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
            for pair in sorted.windows(2) {
                assert!(pair[0].end <= pair[1].start, "{sorted:?}");
            }

            // area conservation
            assert_abs_diff_eq!(
                total_width(&chunks),
                base.width() - union_width_in(&base, &exclusions),
                epsilon = 1e-9
            );

            // order independence of the removed width
            let mut reversed = exclusions.clone();
            reversed.reverse();
            assert_abs_diff_eq!(
                total_width(&chunks),
                total_width(&partition_cont_range(base, &reversed)),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_interval_display() {
        assert_eq!(Interval::new(1.25, 1.5).to_string(), "1.25~1.5");
    }
}
