use std::fmt;

use smallvec::SmallVec;

/// One interval of the real line. Infinite ends are always open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Interval {
    pub(crate) lo: f64,
    pub(crate) lo_closed: bool,
    pub(crate) hi: f64,
    pub(crate) hi_closed: bool,
}

impl Interval {
    pub(crate) const FULL: Interval = Interval {
        lo: f64::NEG_INFINITY,
        lo_closed: false,
        hi: f64::INFINITY,
        hi_closed: false,
    };

    pub(crate) fn point(v: f64) -> Self {
        Self {
            lo: v,
            lo_closed: true,
            hi: v,
            hi_closed: true,
        }
    }

    /// `(-inf, hi)` or `(-inf, hi]`.
    pub(crate) fn below(hi: f64, closed: bool) -> Self {
        Self {
            hi,
            hi_closed: closed && hi.is_finite(),
            ..Self::FULL
        }
    }

    /// `(lo, +inf)` or `[lo, +inf)`.
    pub(crate) fn above(lo: f64, closed: bool) -> Self {
        Self {
            lo,
            lo_closed: closed && lo.is_finite(),
            ..Self::FULL
        }
    }

    fn is_empty(&self) -> bool {
        self.lo > self.hi || (self.lo == self.hi && !(self.lo_closed && self.hi_closed))
    }

    fn intersect(&self, other: &Interval) -> Interval {
        let (lo, lo_closed) = if self.lo > other.lo {
            (self.lo, self.lo_closed)
        } else if other.lo > self.lo {
            (other.lo, other.lo_closed)
        } else {
            (self.lo, self.lo_closed && other.lo_closed)
        };
        let (hi, hi_closed) = if self.hi < other.hi {
            (self.hi, self.hi_closed)
        } else if other.hi < self.hi {
            (other.hi, other.hi_closed)
        } else {
            (self.hi, self.hi_closed && other.hi_closed)
        };
        Interval {
            lo,
            lo_closed,
            hi,
            hi_closed,
        }
    }

    /// True when `self` ends before `next` starts with no shared or touching point.
    fn separated_from(&self, next: &Interval) -> bool {
        self.hi < next.lo || (self.hi == next.lo && !self.hi_closed && !next.lo_closed)
    }
}

/// Set of possible values for a numeric shader-variable component, kept as sorted, disjoint
/// intervals. The default is the whole real line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValueSet {
    intervals: SmallVec<[Interval; 2]>,
}

impl Default for ValueSet {
    fn default() -> Self {
        Self::full()
    }
}

impl ValueSet {
    pub(crate) fn full() -> Self {
        Self::from_interval(Interval::FULL)
    }

    pub(crate) fn empty() -> Self {
        Self {
            intervals: SmallVec::new(),
        }
    }

    pub(crate) fn single(v: f64) -> Self {
        Self::from_interval(Interval::point(v))
    }

    pub(crate) fn from_interval(i: Interval) -> Self {
        let mut s = Self::empty();
        if !i.is_empty() {
            s.intervals.push(i);
        }
        s
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub(crate) fn single_value(&self) -> Option<f64> {
        match self.intervals.as_slice() {
            [i] if i.lo == i.hi => Some(i.lo),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, v: f64) -> bool {
        self.overlaps(&Self::single(v))
    }

    pub(crate) fn overlaps(&self, other: &ValueSet) -> bool {
        !self.intersect(other).is_empty()
    }

    pub(crate) fn lower(&self) -> Option<(f64, bool)> {
        self.intervals.first().map(|i| (i.lo, i.lo_closed))
    }

    pub(crate) fn upper(&self) -> Option<(f64, bool)> {
        self.intervals.last().map(|i| (i.hi, i.hi_closed))
    }

    pub(crate) fn intersect(&self, other: &ValueSet) -> ValueSet {
        let mut out = SmallVec::new();
        for a in &self.intervals {
            for b in &other.intervals {
                let i = a.intersect(b);
                if !i.is_empty() {
                    out.push(i);
                }
            }
        }
        Self::normalized(out)
    }

    pub(crate) fn union(&self, other: &ValueSet) -> ValueSet {
        let mut out: SmallVec<[Interval; 2]> = SmallVec::new();
        out.extend(self.intervals.iter().copied());
        out.extend(other.intervals.iter().copied());
        Self::normalized(out)
    }

    pub(crate) fn complement(&self) -> ValueSet {
        let mut out = SmallVec::new();
        let mut lo = f64::NEG_INFINITY;
        let mut lo_closed = false;
        for i in &self.intervals {
            let gap = Interval {
                lo,
                lo_closed,
                hi: i.lo,
                hi_closed: !i.lo_closed && i.lo.is_finite(),
            };
            if !gap.is_empty() && !(gap.lo == f64::NEG_INFINITY && i.lo == f64::NEG_INFINITY) {
                out.push(gap);
            }
            lo = i.hi;
            lo_closed = !i.hi_closed && i.hi.is_finite();
        }
        if lo != f64::INFINITY {
            let tail = Interval {
                lo,
                lo_closed,
                ..Interval::FULL
            };
            if !tail.is_empty() {
                out.push(tail);
            }
        }
        Self::normalized(out)
    }

    fn normalized(mut v: SmallVec<[Interval; 2]>) -> ValueSet {
        v.retain(|i| !i.is_empty());
        v.sort_by(|a, b| {
            a.lo.total_cmp(&b.lo)
                .then_with(|| b.lo_closed.cmp(&a.lo_closed))
        });
        let mut out: SmallVec<[Interval; 2]> = SmallVec::new();
        for i in v {
            match out.last_mut() {
                Some(last) if !last.separated_from(&i) => {
                    if i.hi > last.hi {
                        last.hi = i.hi;
                        last.hi_closed = i.hi_closed;
                    } else if i.hi == last.hi {
                        last.hi_closed |= i.hi_closed;
                    }
                }
                _ => out.push(i),
            }
        }
        ValueSet { intervals: out }
    }
}

impl fmt::Display for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return f.write_str("{}");
        }
        for (n, i) in self.intervals.iter().enumerate() {
            if n > 0 {
                f.write_str("|")?;
            }
            if i.lo == i.hi {
                write!(f, "{{{}}}", i.lo)?;
            } else {
                write!(
                    f,
                    "{}{},{}{}",
                    if i.lo_closed { '[' } else { '(' },
                    i.lo,
                    i.hi,
                    if i.hi_closed { ']' } else { ')' }
                )?;
            }
        }
        Ok(())
    }
}

/// Set of possible values of a boolean fact. The default admits both values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ValueSetBool {
    pub(crate) can_true: bool,
    pub(crate) can_false: bool,
}

impl Default for ValueSetBool {
    fn default() -> Self {
        Self {
            can_true: true,
            can_false: true,
        }
    }
}

impl ValueSetBool {
    pub(crate) fn single(v: bool) -> Self {
        Self {
            can_true: v,
            can_false: !v,
        }
    }

    pub(crate) fn single_value(self) -> Option<bool> {
        match (self.can_true, self.can_false) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    }

    pub(crate) fn is_empty(self) -> bool {
        !self.can_true && !self.can_false
    }

    pub(crate) fn overlaps(self, other: Self) -> bool {
        !self.intersect(other).is_empty()
    }

    pub(crate) fn intersect(self, other: Self) -> Self {
        Self {
            can_true: self.can_true && other.can_true,
            can_false: self.can_false && other.can_false,
        }
    }

    pub(crate) fn union(self, other: Self) -> Self {
        Self {
            can_true: self.can_true || other.can_true,
            can_false: self.can_false || other.can_false,
        }
    }

    pub(crate) fn complement(self) -> Self {
        Self {
            can_true: !self.can_true,
            can_false: !self.can_false,
        }
    }
}

impl fmt::Display for ValueSetBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match (self.can_true, self.can_false) {
            (true, true) => "{true,false}",
            (true, false) => "{true}",
            (false, true) => "{false}",
            (false, false) => "{}",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complement_of_point_splits_line() {
        let c = ValueSet::single(1.0).complement();
        assert!(!c.contains(1.0));
        assert!(c.contains(0.999));
        assert!(c.contains(1.001));
        assert_eq!(c.to_string(), "(-inf,1)|(1,inf)");
        assert_eq!(c.complement(), ValueSet::single(1.0));
    }

    #[test]
    fn full_and_empty_are_complements() {
        assert!(ValueSet::full().complement().is_empty());
        assert_eq!(ValueSet::empty().complement(), ValueSet::full());
    }

    #[test]
    fn union_merges_touching_intervals() {
        let a = ValueSet::from_interval(Interval::below(2.0, false));
        let b = ValueSet::from_interval(Interval::above(2.0, true));
        assert_eq!(a.union(&b), ValueSet::full());
        let c = ValueSet::from_interval(Interval::above(2.0, false));
        let u = a.union(&c);
        assert!(!u.contains(2.0));
        assert!(u.contains(5.0));
    }

    #[test]
    fn intersection_respects_open_ends() {
        let a = ValueSet::from_interval(Interval::below(3.0, false));
        let b = ValueSet::from_interval(Interval::above(3.0, true));
        assert!(!a.overlaps(&b));
        let c = ValueSet::from_interval(Interval::below(3.0, true));
        assert_eq!(c.intersect(&b).single_value(), Some(3.0));
    }

    #[test]
    fn bool_sets() {
        let t = ValueSetBool::single(true);
        assert_eq!(t.single_value(), Some(true));
        assert_eq!(t.complement().single_value(), Some(false));
        assert!(ValueSetBool::default().overlaps(t));
        assert!(t.intersect(t.complement()).is_empty());
    }
}
