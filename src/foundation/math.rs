use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x5eed_7a7c_b10c_0001;

/// Order-sensitive hasher for identities that must be stable across runs and recompiles.
///
/// Strings are length-prefixed so `("ab", "c")` and `("a", "bc")` hash differently.
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

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    pub(crate) fn finish_u64(self) -> u64 {
        self.inner.digest()
    }

    pub(crate) fn finish_u128(self) -> (u64, u64) {
        let v = self.inner.digest128();
        ((v >> 64) as u64, v as u64)
    }
}

/// Wrap into `[0, 1)`. Negative inputs wrap from the top.
/// Largest phase below 1. Finite timelines hold here once they end.
pub(crate) const LAST_PHASE: f64 = 1.0 - f64::EPSILON / 2.0;

pub(crate) fn wrap_phase(x: f64) -> f64 {
    let w = x - x.floor();
    // `x - floor(x)` can round up to exactly 1.0 for tiny negative inputs.
    if w >= 1.0 { 0.0 } else { w }
}

/// Map a hash to a uniform value in `[0, 1)` using its top 53 bits.
pub(crate) fn unit_from_hash(h: u64) -> f64 {
    (h >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
