use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x5c1f_93d2_7a0e_4b68;

/// Seeded xxh3 hasher with explicit, platform-independent field encoding.
pub(crate) struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    pub(crate) fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    pub(crate) fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub(crate) fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_f64(&mut self, v: f64) {
        // -0.0 and 0.0 compare equal, so they must hash equal too.
        let v = if v == 0.0 { 0.0 } else { v };
        self.write_bytes(&v.to_bits().to_le_bytes());
    }

    pub(crate) fn finish(&self) -> u64 {
        self.inner.digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_digest() {
        let mut a = StableHasher::new();
        let mut b = StableHasher::new();
        a.write_u32(42);
        a.write_bool(true);
        b.write_u32(42);
        b.write_bool(true);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn signed_zero_hashes_equal() {
        let mut a = StableHasher::new();
        let mut b = StableHasher::new();
        a.write_f64(0.0);
        b.write_f64(-0.0);
        assert_eq!(a.finish(), b.finish());
    }
}
