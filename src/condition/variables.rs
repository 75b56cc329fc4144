use std::collections::BTreeMap;
use std::fmt::Write as _;

use smallvec::SmallVec;

use crate::condition::valueset::{ValueSet, ValueSetBool};
use crate::foundation::intern::{InternId, StringInterner};

/// Key of one shader variable slot: the interned name plus its array index path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SvKey {
    pub(crate) name: InternId,
    pub(crate) indices: SmallVec<[usize; 2]>,
}

/// Boolean facts tracked per variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoolSlot {
    Exists,
    Texture,
    Buffer,
}

/// Possible values of one shader variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Values {
    vec: [ValueSet; 4],
    var: ValueSetBool,
    tex: ValueSetBool,
    buf: ValueSetBool,
}

impl Values {
    pub(crate) fn component(&self, c: usize) -> &ValueSet {
        &self.vec[c.min(3)]
    }

    pub(crate) fn set_component(&mut self, c: usize, v: ValueSet) {
        self.vec[c.min(3)] = v;
    }

    pub(crate) fn flag(&self, slot: BoolSlot) -> ValueSetBool {
        match slot {
            BoolSlot::Exists => self.var,
            BoolSlot::Texture => self.tex,
            BoolSlot::Buffer => self.buf,
        }
    }

    pub(crate) fn set_flag(&mut self, slot: BoolSlot, v: ValueSetBool) {
        match slot {
            BoolSlot::Exists => self.var = v,
            BoolSlot::Texture => self.tex = v,
            BoolSlot::Buffer => self.buf = v,
        }
    }

    fn is_unconstrained(&self) -> bool {
        *self == Values::default()
    }

    fn intersect(&self, other: &Values) -> Values {
        Values {
            vec: std::array::from_fn(|c| self.vec[c].intersect(&other.vec[c])),
            var: self.var.intersect(other.var),
            tex: self.tex.intersect(other.tex),
            buf: self.buf.intersect(other.buf),
        }
    }

    fn union(&self, other: &Values) -> Values {
        Values {
            vec: std::array::from_fn(|c| self.vec[c].union(&other.vec[c])),
            var: self.var.union(other.var),
            tex: self.tex.union(other.tex),
            buf: self.buf.union(other.buf),
        }
    }

    fn dump(&self, out: &mut String) {
        for (c, vs) in self.vec.iter().enumerate() {
            if *vs != ValueSet::full() {
                let _ = write!(out, "v{c}: {vs}; ");
            }
        }
        let _ = write!(out, "var: {}; tex: {}; buf: {}; ", self.var, self.tex, self.buf);
    }
}

/// Assumed possible values of all shader variables at one point of the condition tree.
///
/// A variable without an entry may take any value.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Variables {
    values: BTreeMap<SvKey, Values>,
}

impl Variables {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &SvKey) -> Values {
        self.values.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn get_mut(&mut self, key: &SvKey) -> &mut Values {
        self.values.entry(key.clone()).or_default()
    }

    pub(crate) fn is_unconstrained(&self) -> bool {
        self.values.values().all(Values::is_unconstrained)
    }

    /// Values possible under both assumptions.
    pub(crate) fn intersect(&self, other: &Variables) -> Variables {
        let mut out = self.clone();
        for (k, v) in &other.values {
            let merged = match out.values.get(k) {
                Some(mine) => mine.intersect(v),
                None => v.clone(),
            };
            out.values.insert(k.clone(), merged);
        }
        out
    }

    /// Values possible under either assumption. Entries missing on one side stay unconstrained.
    pub(crate) fn union(&self, other: &Variables) -> Variables {
        let values = self
            .values
            .iter()
            .filter_map(|(k, v)| other.values.get(k).map(|o| (k.clone(), v.union(o))))
            .filter(|(_, v)| !v.is_unconstrained())
            .collect();
        Variables { values }
    }

    pub(crate) fn dump(&self, names: &StringInterner) -> String {
        let mut out = String::new();
        for (k, v) in &self.values {
            if v.is_unconstrained() {
                continue;
            }
            let _ = write!(out, "var {}", names.get(k.name));
            for i in &k.indices {
                let _ = write!(out, "[{i}]");
            }
            out.push_str(": ");
            v.dump(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: &mut StringInterner, name: &str) -> SvKey {
        SvKey {
            name: i.intern(name),
            indices: SmallVec::new(),
        }
    }

    #[test]
    fn missing_entries_are_unconstrained() {
        let mut names = StringInterner::new();
        let a = key(&mut names, "a");
        let v = Variables::new();
        assert_eq!(v.get(&a), Values::default());
        assert!(v.is_unconstrained());
    }

    #[test]
    fn union_drops_one_sided_entries() {
        let mut names = StringInterner::new();
        let a = key(&mut names, "a");
        let b = key(&mut names, "b");
        let mut x = Variables::new();
        x.get_mut(&a).set_component(0, ValueSet::single(1.0));
        x.get_mut(&b).set_component(0, ValueSet::single(1.0));
        let mut y = Variables::new();
        y.get_mut(&a).set_component(0, ValueSet::single(2.0));

        let u = x.union(&y);
        assert!(u.get(&a).component(0).contains(1.0));
        assert!(u.get(&a).component(0).contains(2.0));
        assert_eq!(u.get(&b), Values::default());
    }

    #[test]
    fn intersect_combines_both_sides() {
        let mut names = StringInterner::new();
        let a = key(&mut names, "a");
        let mut x = Variables::new();
        x.get_mut(&a).set_flag(BoolSlot::Exists, ValueSetBool::single(true));
        let y = Variables::new();
        let i = y.intersect(&x);
        assert_eq!(i.get(&a).flag(BoolSlot::Exists).single_value(), Some(true));
        assert_eq!(i.dump(&names), "var a: var: {true}; tex: {true,false}; buf: {true,false}; ");
    }
}
