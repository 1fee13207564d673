//! Hash functions shared by ring placement and bucket splitting.
//!
//! The hash function is a deployment-wide invariant: every process in the
//! cluster must use the same one, or they will disagree on ownership.

use std::fmt;

use sha2::{Digest, Sha256};

/// A stable 64-bit hash over bytes.
///
/// Implementations must not depend on process state (no random seeds), since
/// the output is compared across machines.
pub trait HashFunction: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Hash raw bytes.
    fn hash(&self, bytes: &[u8]) -> u64;

    /// Hash the UTF-8 bytes of a string.
    fn hash_str(&self, value: &str) -> u64 {
        self.hash(value.as_bytes())
    }
}

/// First eight bytes of SHA-256, big endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sha256Hash;

impl HashFunction for Sha256Hash {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn hash(&self, bytes: &[u8]) -> u64 {
        let digest = Sha256::digest(bytes);
        digest
            .as_slice()
            .first_chunk::<8>()
            .map_or(0, |prefix| u64::from_be_bytes(*prefix))
    }
}

/// Maps a key onto `[0, bucket_count)`.
pub trait BucketHasher {
    /// Bucket index for `key`. Returns 0 when `bucket_count` is 0.
    fn bucket_for(&self, key: &str, bucket_count: u32) -> u32;
}

impl<H: HashFunction + ?Sized> BucketHasher for H {
    fn bucket_for(&self, key: &str, bucket_count: u32) -> u32 {
        bucket_of(self.hash_str(key), bucket_count)
    }
}

/// Reduce a hash onto `[0, bucket_count)`.
#[must_use]
pub fn bucket_of(hash: u64, bucket_count: u32) -> u32 {
    hash.checked_rem(u64::from(bucket_count))
        .and_then(|bucket| u32::try_from(bucket).ok())
        .unwrap_or(0)
}
