//! Hashing of serialized values.
//!
//! The hash is only as stable as the value's serialization, so callers sort
//! anything drawn from a `HashMap` before hashing it.

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// xxh64 of the value's JSON encoding.
///
/// Values JSON cannot represent (maps with non-string keys) hash as the
/// empty buffer.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&serde_json::to_vec(value).unwrap_or_default(), 0)
}

/// [`canonical_hash`] as 16 lowercase hex digits.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}
