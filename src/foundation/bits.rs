use smallvec::SmallVec;

/// Growable bit array with value semantics.
///
/// Equality and hashing ignore trailing zero words, so arrays sized for different condition
/// counts still compare equal when they carry the same bits.
#[derive(Clone, Debug, Default)]
pub(crate) struct BitArray {
    words: SmallVec<[u64; 2]>,
}

impl BitArray {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_len(bits: usize) -> Self {
        let mut words = SmallVec::new();
        words.resize(bits.div_ceil(64), 0);
        Self { words }
    }

    pub(crate) fn get(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|w| (w >> (bit % 64)) & 1 == 1)
    }

    pub(crate) fn set(&mut self, bit: usize, value: bool) {
        let word = bit / 64;
        if word >= self.words.len() {
            if !value {
                return;
            }
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << (bit % 64);
        if value {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.words.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub(crate) fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..64).filter(move |b| (w >> b) & 1 == 1).map(move |b| wi * 64 + b)
        })
    }

    fn significant(&self) -> &[u64] {
        let mut n = self.words.len();
        while n > 0 && self.words[n - 1] == 0 {
            n -= 1;
        }
        &self.words[..n]
    }
}

impl PartialEq for BitArray {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for BitArray {}

impl std::hash::Hash for BitArray {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_and_clear_across_words() {
        let mut b = BitArray::new();
        b.set(3, true);
        b.set(70, true);
        assert!(b.get(3));
        assert!(b.get(70));
        assert!(!b.get(4));
        assert_eq!(b.iter_set().collect::<Vec<_>>(), vec![3, 70]);
        b.set(70, false);
        assert!(!b.get(70));
        b.clear();
        assert!(b.is_empty());
    }

    #[test]
    fn equality_ignores_capacity() {
        let mut a = BitArray::with_len(256);
        let mut b = BitArray::new();
        a.set(5, true);
        b.set(5, true);
        assert_eq!(a, b);
    }
}
