//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ algorithm for fast, high-quality, deterministic randomness.
//! Given the same seed string, produces identical sequence on all platforms.
//! Puzzle modules must draw every random choice from this generator so that two
//! engines given the same seed produce byte-identical parameters.

use sha2::{Sha256, Digest};

/// Domain separator for seed string hashing.
const SEED_DOMAIN: &[u8] = b"LAST_WORDS_SEED_V1";

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use last_words::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::from_seed_str("abc");
/// let mut b = DeterministicRng::from_seed_str("abc");
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create RNG from an arbitrary seed string.
    ///
    /// The string is hashed with a domain separator, so short or
    /// similar seeds still yield unrelated streams.
    pub fn from_seed_str(seed: &str) -> Self {
        Self::new(seed_from_str(seed))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Shuffle a slice in place using Fisher-Yates algorithm.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_int((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Hash a seed string down to the 64-bit RNG seed.
///
/// Takes the first 8 bytes (little-endian) of
/// `SHA-256(domain || seed)`.
pub fn seed_from_str(seed: &str) -> u64 {
    let digest = seed_digest(seed);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// Full SHA-256 digest of a seed string (with domain separator).
pub fn seed_digest(seed: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SEED_DOMAIN);
    hasher.update(seed.as_bytes());
    hasher.finalize().into()
}

/// Derive the seed string handed to one module of a match.
///
/// Each module gets its own stream so adding a module never
/// perturbs the content of the others.
pub fn derive_module_seed(match_seed: &str, module_key: &str) -> String {
    format!("{match_seed}{module_key}")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rng_determinism() {
        // Same seed must produce same sequence
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        // Very unlikely to match
        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_seed_str_is_stable() {
        assert_eq!(seed_from_str("abc"), seed_from_str("abc"));
        assert_ne!(seed_from_str("abc"), seed_from_str("abd"));
    }

    #[test]
    fn test_next_int() {
        let mut rng = DeterministicRng::new(1234);

        for _ in 0..1000 {
            let val = rng.next_int(100);
            assert!(val < 100);
        }

        // Edge case: max = 0
        assert_eq!(rng.next_int(0), 0);

        // Edge case: max = 1
        assert_eq!(rng.next_int(1), 0);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = DeterministicRng::from_seed_str("perm");
        let mut arr = [1, 2, 3, 4, 5, 6];
        rng.shuffle(&mut arr);

        let mut sorted = arr;
        sorted.sort();
        assert_eq!(sorted, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_derive_module_seed() {
        assert_eq!(derive_module_seed("01HXYZ", "glyphOrder"), "01HXYZglyphOrder");
    }

    proptest! {
        #[test]
        fn prop_same_seed_same_shuffle(seed in ".{0,64}") {
            let mut a = DeterministicRng::from_seed_str(&seed);
            let mut b = DeterministicRng::from_seed_str(&seed);
            let mut xs: Vec<u32> = (0..16).collect();
            let mut ys = xs.clone();
            a.shuffle(&mut xs);
            b.shuffle(&mut ys);
            prop_assert_eq!(xs, ys);
        }
    }
}
