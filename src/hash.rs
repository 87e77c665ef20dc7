//! Linear-hashing bucket resolution: the low/high hash pair and the rule
//! that picks between them using the split pointer.

use std::sync::Arc;

/// How a key's raw bytes reduce to the 64-bit integer the hash formula
/// operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Host-endian unsigned integer key, any width up to 8 bytes.
    Unsigned,
    /// Host-endian signed integer key, any width up to 8 bytes.
    Signed,
    /// Arbitrary byte-string key, reduced with a deterministic mix.
    Bytes,
}

/// FNV-1a, chosen over `std::collections::hash_map::DefaultHasher` because
/// that hasher's seed is randomized per process: a disk-resident index
/// needs the same key to land in the same bucket across restarts.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

/// A caller-supplied reduction from a key's raw bytes to the 64-bit
/// integer the hash formula operates on, set once at `initialise` time.
/// Overrides the built-in `KeyKind` reduction entirely when present —
/// the escape hatch for key shapes (composite keys, variable-width byte
/// strings that need domain-specific mixing) the default kinds don't
/// cover.
pub type HashFn = Arc<dyn Fn(&[u8]) -> u64 + Send + Sync>;

fn key_to_u64(kind: KeyKind, key: &[u8], custom: Option<&HashFn>) -> u64 {
    if let Some(f) = custom {
        return f(key);
    }
    match kind {
        KeyKind::Bytes => fnv1a(key),
        KeyKind::Unsigned | KeyKind::Signed => {
            let mut buf = [0u8; 8];
            let n = key.len().min(8);
            buf[..n].copy_from_slice(&key[..n]);
            u64::from_ne_bytes(buf)
        }
    }
}

/// The pair of candidate bucket ids produced by the two hash functions in
/// effect at the current file level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPair {
    pub low: u64,
    pub high: u64,
}

/// Computes `h_low = k mod (n0 * 2^level)` and `h_high = k mod (n0 * 2^(level+1))`.
/// `custom`, when set, entirely replaces the `KeyKind`-driven reduction.
pub fn compute(
    kind: KeyKind,
    key: &[u8],
    initial_buckets: u64,
    level: u32,
    custom: Option<&HashFn>,
) -> HashPair {
    let k = key_to_u64(kind, key, custom);
    let low_modulus = initial_buckets << level;
    let high_modulus = initial_buckets << (level + 1);
    HashPair {
        low: k % low_modulus,
        high: k % high_modulus,
    }
}

/// Resolves a `HashPair` against the split pointer to the bucket id a key
/// currently lives in.
pub fn resolve_bucket(pair: HashPair, split_pointer: u64) -> u64 {
    if pair.low >= split_pointer {
        pair.low
    } else {
        pair.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_to_low_hash_above_split_pointer() {
        let pair = HashPair { low: 5, high: 13 };
        assert_eq!(resolve_bucket(pair, 3), 5);
    }

    #[test]
    fn resolves_to_high_hash_below_split_pointer() {
        let pair = HashPair { low: 1, high: 9 };
        assert_eq!(resolve_bucket(pair, 3), 9);
    }

    #[test]
    fn compute_matches_modulus_formula() {
        let pair = compute(KeyKind::Unsigned, &42u32.to_ne_bytes(), 4, 1, None);
        assert_eq!(pair.low, 42 % 8);
        assert_eq!(pair.high, 42 % 16);
    }

    #[test]
    fn bytes_kind_is_stable_across_calls() {
        let a = compute(KeyKind::Bytes, b"hello world", 4, 0, None);
        let b = compute(KeyKind::Bytes, b"hello world", 4, 0, None);
        assert_eq!(a, b);
    }

    #[test]
    fn custom_hash_fn_overrides_default_reduction() {
        let custom: HashFn = Arc::new(|key: &[u8]| key.len() as u64 * 1000);
        let pair = compute(KeyKind::Bytes, b"abc", 4, 0, Some(&custom));
        assert_eq!(pair.low, 3000 % 4);
    }
}
