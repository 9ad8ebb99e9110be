//! Cached byte intervals of one file
//!
//! A `RangeSet` keeps half-open intervals sorted, disjoint and maximally
//! merged: no two stored intervals overlap or touch. Queries split a
//! requested window into `Cached` and `Gap` segments that tile it exactly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open byte interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "inverted range {start}..{end}");
        Self { start, end }
    }

    /// Interval starting at `offset` spanning `len` bytes, saturating at `u64::MAX`
    pub fn from_len(offset: u64, len: u64) -> Self {
        Self::new(offset, offset.saturating_add(len))
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// One piece of a query result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Bytes already stored in the block store
    Cached(ByteRange),
    /// Bytes that must be fetched from the backing source
    Gap(ByteRange),
}

impl Segment {
    pub fn range(&self) -> ByteRange {
        match self {
            Self::Cached(r) | Self::Gap(r) => *r,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, Self::Gap(_))
    }
}

/// Error produced when a serialized set breaks the ordering invariant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRangeSet(String);

impl fmt::Display for InvalidRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid range set: {}", self.0)
    }
}

impl std::error::Error for InvalidRangeSet {}

/// Sorted, disjoint, merged set of cached intervals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ByteRange>", into = "Vec<ByteRange>")]
pub struct RangeSet {
    ranges: Vec<ByteRange>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored intervals in ascending order
    pub fn intervals(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of cached bytes
    pub fn cached_bytes(&self) -> u64 {
        self.ranges.iter().map(ByteRange::len).sum()
    }

    /// End of the highest cached interval, 0 when empty
    pub fn max_end(&self) -> u64 {
        self.ranges.last().map_or(0, |r| r.end)
    }

    /// Whether every byte of `[0, size)` is cached
    pub fn is_complete(&self, size: u64) -> bool {
        size == 0 || self.covers(0, size)
    }

    /// Whether every byte of `[offset, offset + length)` is cached
    pub fn covers(&self, offset: u64, length: u64) -> bool {
        if length == 0 {
            return true;
        }
        let want = ByteRange::from_len(offset, length);
        let idx = self.ranges.partition_point(|r| r.end <= want.start);
        self.ranges
            .get(idx)
            .is_some_and(|r| r.start <= want.start && r.end >= want.end)
    }

    /// Split `[offset, offset + length)` into cached and missing segments
    ///
    /// Segments are contiguous, ascending and tile the window exactly.
    pub fn query(&self, offset: u64, length: u64) -> Vec<Segment> {
        let mut segments = Vec::new();
        if length == 0 {
            return segments;
        }

        let want = ByteRange::from_len(offset, length);
        let mut cursor = want.start;
        let first = self.ranges.partition_point(|r| r.end <= want.start);

        for r in &self.ranges[first..] {
            if r.start >= want.end {
                break;
            }
            if r.start > cursor {
                segments.push(Segment::Gap(ByteRange::new(cursor, r.start)));
                cursor = r.start;
            }
            let end = r.end.min(want.end);
            segments.push(Segment::Cached(ByteRange::new(cursor, end)));
            cursor = end;
        }

        if cursor < want.end {
            segments.push(Segment::Gap(ByteRange::new(cursor, want.end)));
        }

        segments
    }

    /// Record `[offset, offset + length)` as cached
    ///
    /// Overlapping and touching intervals merge into one. Marking an
    /// already-cached region changes nothing.
    pub fn mark_cached(&mut self, offset: u64, length: u64) {
        if length == 0 {
            return;
        }

        let mut new = ByteRange::from_len(offset, length);
        // First interval that overlaps or touches `new`, and one past the last.
        let lo = self.ranges.partition_point(|r| r.end < new.start);
        let hi = self.ranges.partition_point(|r| r.start <= new.end);

        if lo < hi {
            new.start = new.start.min(self.ranges[lo].start);
            new.end = new.end.max(self.ranges[hi - 1].end);
        }
        self.ranges.splice(lo..hi, std::iter::once(new));
    }
}

impl TryFrom<Vec<ByteRange>> for RangeSet {
    type Error = InvalidRangeSet;

    fn try_from(ranges: Vec<ByteRange>) -> Result<Self, Self::Error> {
        for r in &ranges {
            if r.is_empty() {
                return Err(InvalidRangeSet(format!("empty or inverted interval {r}")));
            }
        }
        for pair in ranges.windows(2) {
            if pair[0].end >= pair[1].start {
                return Err(InvalidRangeSet(format!(
                    "{} and {} overlap, touch or are out of order",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self { ranges })
    }
}

impl From<RangeSet> for Vec<ByteRange> {
    fn from(set: RangeSet) -> Self {
        set.ranges
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{r}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ranges: &[(u64, u64)]) -> RangeSet {
        let mut s = RangeSet::new();
        for &(start, end) in ranges {
            s.mark_cached(start, end - start);
        }
        s
    }

    fn pairs(s: &RangeSet) -> Vec<(u64, u64)> {
        s.intervals().iter().map(|r| (r.start, r.end)).collect()
    }

    fn assert_invariant(s: &RangeSet) {
        for r in s.intervals() {
            assert!(r.start < r.end, "empty interval in {s}");
        }
        for w in s.intervals().windows(2) {
            assert!(w[0].end < w[1].start, "not merged or unsorted: {s}");
        }
    }

    /// Check a query result tiles the window and agrees with a bitmap model
    fn assert_query_matches(s: &RangeSet, model: &[bool], offset: u64, len: u64) {
        let segments = s.query(offset, len);
        if len == 0 {
            assert!(segments.is_empty());
            return;
        }
        let mut cursor = offset;
        for (i, seg) in segments.iter().enumerate() {
            let r = seg.range();
            assert_eq!(r.start, cursor, "segments not contiguous");
            assert!(!r.is_empty());
            for b in r.start..r.end {
                let cached = model.get(b as usize).copied().unwrap_or(false);
                assert_eq!(cached, !seg.is_gap(), "byte {b} misclassified");
            }
            if i > 0 {
                assert_ne!(
                    segments[i - 1].is_gap(),
                    seg.is_gap(),
                    "adjacent segments of the same kind"
                );
            }
            cursor = r.end;
        }
        assert_eq!(cursor, offset + len);
    }

    #[test]
    fn empty_set_query_is_one_gap() {
        let s = RangeSet::new();
        assert_eq!(
            s.query(10, 5),
            vec![Segment::Gap(ByteRange::new(10, 15))]
        );
        assert!(s.query(10, 0).is_empty());
    }

    #[test]
    fn merges_overlapping_and_adjacent() {
        assert_eq!(pairs(&set(&[(0, 10), (5, 20)])), vec![(0, 20)]);
        assert_eq!(pairs(&set(&[(0, 10), (10, 20)])), vec![(0, 20)]);
        assert_eq!(pairs(&set(&[(10, 20), (0, 10)])), vec![(0, 20)]);
        assert_eq!(pairs(&set(&[(0, 10), (11, 20)])), vec![(0, 10), (11, 20)]);
    }

    #[test]
    fn bridging_insert_collapses_many() {
        let mut s = set(&[(0, 2), (4, 6), (8, 10), (20, 30)]);
        s.mark_cached(1, 8);
        assert_eq!(pairs(&s), vec![(0, 10), (20, 30)]);
    }

    #[test]
    fn contained_insert_is_noop() {
        let mut s = set(&[(0, 100)]);
        let before = s.clone();
        s.mark_cached(10, 20);
        assert_eq!(s, before);
    }

    #[test]
    fn idempotent_mark() {
        let mut once = set(&[(5, 9), (30, 40)]);
        once.mark_cached(12, 6);
        let mut twice = once.clone();
        twice.mark_cached(12, 6);
        assert_eq!(once, twice);
    }

    #[test]
    fn query_mixed_segments() {
        let s = set(&[(0, 100)]);
        assert_eq!(
            s.query(50, 100),
            vec![
                Segment::Cached(ByteRange::new(50, 100)),
                Segment::Gap(ByteRange::new(100, 150)),
            ]
        );

        let s = set(&[(10, 20), (30, 40)]);
        assert_eq!(
            s.query(0, 50),
            vec![
                Segment::Gap(ByteRange::new(0, 10)),
                Segment::Cached(ByteRange::new(10, 20)),
                Segment::Gap(ByteRange::new(20, 30)),
                Segment::Cached(ByteRange::new(30, 40)),
                Segment::Gap(ByteRange::new(40, 50)),
            ]
        );
    }

    #[test]
    fn covers_and_counts() {
        let s = set(&[(0, 150), (200, 250)]);
        assert!(s.covers(0, 150));
        assert!(s.covers(210, 10));
        assert!(!s.covers(140, 70));
        assert!(s.covers(999, 0));
        assert_eq!(s.cached_bytes(), 200);
        assert_eq!(s.max_end(), 250);
        assert!(!s.is_complete(250));
        assert!(set(&[(0, 250)]).is_complete(250));
        assert!(RangeSet::new().is_complete(0));
    }

    #[test]
    fn query_near_u64_max_saturates() {
        let s = RangeSet::new();
        let segs = s.query(u64::MAX - 5, 100);
        assert_eq!(segs, vec![Segment::Gap(ByteRange::new(u64::MAX - 5, u64::MAX))]);
    }

    /// Every pair of inserts over a small universe, checked against a bitmap
    #[test]
    fn exhaustive_small_universe() {
        const N: u64 = 7;
        let mut all = Vec::new();
        for s in 0..N {
            for e in s..=N {
                all.push((s, e));
            }
        }

        for &(a0, a1) in &all {
            for &(b0, b1) in &all {
                let mut s = RangeSet::new();
                let mut model = vec![false; N as usize];
                for &(x0, x1) in &[(a0, a1), (b0, b1)] {
                    s.mark_cached(x0, x1 - x0);
                    for b in x0..x1 {
                        model[b as usize] = true;
                    }
                }
                assert_invariant(&s);
                assert_eq!(s.cached_bytes(), model.iter().filter(|&&c| c).count() as u64);
                for &(q0, q1) in &all {
                    assert_query_matches(&s, &model, q0, q1 - q0);
                }
            }
        }
    }

    #[test]
    fn deserialize_validates() {
        let json = r#"[{"start":0,"end":5},{"start":6,"end":9}]"#;
        let ok: RangeSet = serde_json::from_str(json).unwrap();
        assert_eq!(pairs(&ok), vec![(0, 5), (6, 9)]);

        let touching = r#"[{"start":0,"end":5},{"start":5,"end":9}]"#;
        assert!(serde_json::from_str::<RangeSet>(touching).is_err());
        let unsorted = r#"[{"start":6,"end":9},{"start":0,"end":5}]"#;
        assert!(serde_json::from_str::<RangeSet>(unsorted).is_err());
        let empty = r#"[{"start":3,"end":3}]"#;
        assert!(serde_json::from_str::<RangeSet>(empty).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn inserts() -> impl Strategy<Value = Vec<(u64, u64)>> {
            prop::collection::vec((0u64..200, 0u64..40), 0..30)
        }

        proptest! {
            /// Property: any sequence of inserts keeps the set sorted, disjoint and merged
            #[test]
            fn invariant_holds(ops in inserts()) {
                let mut s = RangeSet::new();
                for (offset, len) in ops {
                    s.mark_cached(offset, len);
                    for w in s.intervals().windows(2) {
                        prop_assert!(w[0].end < w[1].start);
                    }
                    for r in s.intervals() {
                        prop_assert!(r.start < r.end);
                    }
                }
            }

            /// Property: marking the same range twice equals marking it once
            #[test]
            fn mark_is_idempotent(ops in inserts(), offset in 0u64..200, len in 0u64..40) {
                let mut s = RangeSet::new();
                for (o, l) in ops {
                    s.mark_cached(o, l);
                }
                s.mark_cached(offset, len);
                let once = s.clone();
                s.mark_cached(offset, len);
                prop_assert_eq!(once, s);
            }

            /// Property: query segments tile the window and match a bitmap model
            #[test]
            fn query_is_complete(ops in inserts(), offset in 0u64..260, len in 0u64..80) {
                let mut s = RangeSet::new();
                let mut model = vec![false; 260];
                for (o, l) in ops {
                    s.mark_cached(o, l);
                    for b in o..o + l {
                        model[b as usize] = true;
                    }
                }
                let segments = s.query(offset, len);
                let mut cursor = offset;
                for seg in &segments {
                    let r = seg.range();
                    prop_assert_eq!(r.start, cursor);
                    for b in r.start..r.end {
                        let cached = model.get(b as usize).copied().unwrap_or(false);
                        prop_assert_eq!(cached, !seg.is_gap());
                    }
                    cursor = r.end;
                }
                prop_assert_eq!(cursor, offset + len);
            }

            /// Property: serialization round-trips through the validating path
            #[test]
            fn serde_accepts_what_mark_produces(ops in inserts()) {
                let mut s = RangeSet::new();
                for (o, l) in ops {
                    s.mark_cached(o, l);
                }
                let json = serde_json::to_string(&s).unwrap();
                let back: RangeSet = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(back, s);
            }
        }
    }
}
