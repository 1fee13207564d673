//! Fragments multi-receiver messages into per-bucket copies.

use std::collections::BTreeMap;

use itertools::Itertools;
use tracing::{debug, warn};

use crate::error::{Result, RoutingError};
use crate::hash::BucketHasher;
use crate::message::InternalMessage;

/// Splits messages using a fixed bucket count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSplitter {
    bucket_count: u32,
}

impl MessageSplitter {
    /// Create a splitter.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::InvalidBucketCount` if `bucket_count` is 0.
    pub fn new(bucket_count: u32) -> Result<Self> {
        if bucket_count == 0 {
            return Err(RoutingError::InvalidBucketCount { count: 0 });
        }
        Ok(Self { bucket_count })
    }

    /// Number of buckets.
    #[must_use]
    pub const fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Split `message` against one hasher snapshot.
    ///
    /// # Errors
    ///
    /// Never fails for a splitter built with [`MessageSplitter::new`].
    pub fn split<H: BucketHasher + ?Sized>(
        &self,
        message: &InternalMessage,
        hasher: &H,
    ) -> Result<BTreeMap<u32, InternalMessage>> {
        split_in_buckets(message, hasher, self.bucket_count)
    }
}

/// Group `message` receivers by bucket, one message per occupied bucket.
///
/// A single receiver yields the message itself with its id intact. Several
/// receivers yield copies with fresh ids, each carrying the receivers of its
/// bucket in their original relative order.
///
/// # Errors
///
/// Returns `RoutingError::InvalidBucketCount` if `bucket_count` is 0.
pub fn split_in_buckets<H: BucketHasher + ?Sized>(
    message: &InternalMessage,
    hasher: &H,
    bucket_count: u32,
) -> Result<BTreeMap<u32, InternalMessage>> {
    if bucket_count == 0 {
        return Err(RoutingError::InvalidBucketCount { count: bucket_count });
    }

    match message.receivers() {
        [] => {
            warn!(message_id = %message.id(), "Split requested for message without receivers");
            Ok(BTreeMap::new())
        }
        [only] => {
            let bucket = hasher.bucket_for(only.key(), bucket_count);
            Ok(BTreeMap::from([(bucket, message.copy_of())]))
        }
        receivers => {
            let groups = receivers
                .iter()
                .cloned()
                .into_group_map_by(|receiver| hasher.bucket_for(receiver.key(), bucket_count));

            let splits: BTreeMap<u32, InternalMessage> = groups
                .into_iter()
                .map(|(bucket, group)| (bucket, message.copy_for_receivers(group)))
                .collect();

            debug!(
                message_id = %message.id(),
                receivers = receivers.len(),
                buckets = splits.len(),
                "Message split"
            );
            Ok(splits)
        }
    }
}
