//! Stable, non-cryptographic fingerprints for event identities.

const FNV_OFFSET: u64 = 14_695_981_039_346_656_037;
const FNV_PRIME: u64 = 1_099_511_628_211;

/// FNV-1a 64-bit hash of `bytes`.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Fixed-width (16 hex chars) fingerprint of an identity string.
pub fn fingerprint(identity: &str) -> String {
    format!("{:016x}", fnv1a64(identity.as_bytes()))
}
