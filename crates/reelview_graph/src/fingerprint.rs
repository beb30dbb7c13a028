// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable 64-bit fingerprints for identifiers and shader expressions.

/// FNV-1a, 64-bit
#[derive(Clone, Copy, Debug)]
pub struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    /// Standard FNV offset basis
    pub const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    /// Start a hash from `seed`
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Feed raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let mut h = self.state;
        for b in bytes {
            h ^= u64::from(*b);
            h = h.wrapping_mul(Self::PRIME);
        }
        self.state = h;
    }

    /// Feed a tag byte
    pub fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    /// Feed a little-endian u64
    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Feed a length-prefixed string
    pub fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    /// Current hash value
    pub fn finish(self) -> u64 {
        self.state
    }
}

impl Default for Fnv1a64 {
    fn default() -> Self {
        Self::new(Self::OFFSET_BASIS)
    }
}

/// Fingerprint of a float slice by bit pattern
pub fn fingerprint_floats(values: &[f32]) -> u64 {
    let mut h = Fnv1a64::default();
    h.write_u64(values.len() as u64);
    for v in values {
        h.write_bytes(&v.to_bits().to_le_bytes());
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let mut h = Fnv1a64::default();
        h.write_bytes(b"a");
        assert_eq!(h.finish(), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_length_prefix_separates_fields() {
        let mut a = Fnv1a64::default();
        a.write_str("ab");
        a.write_str("c");
        let mut b = Fnv1a64::default();
        b.write_str("a");
        b.write_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_float_bits_distinguish_zero_signs() {
        assert_ne!(fingerprint_floats(&[0.0]), fingerprint_floats(&[-0.0]));
        assert_eq!(fingerprint_floats(&[1.5, 2.0]), fingerprint_floats(&[1.5, 2.0]));
    }
}
