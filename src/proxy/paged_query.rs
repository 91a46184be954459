//! # Paged Scatter-Gather Queries
//!
//! Walks a data map a batch of partitions at a time. The first round queries a
//! single random partition and sizes later batches from its result; every
//! round hands the client a cookie holding the partitions still to visit and
//! the batch size. The last page carries no cookie.

use crate::cluster::map::{ClusteredMap, ClusteredMapExt};
use crate::cluster::partitions::{partition_for_key, PartitionOwnership};
use crate::error::GridResult;
use crate::partition::{decode_cookie, encode_cookie, CookieCodec, PartitionBatcher, PartitionSet};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One page of entries and the cookie for the next one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub entries: Vec<(Bytes, Bytes)>,
    pub cookie: Option<Bytes>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.cookie.is_none()
    }
}

#[derive(Clone)]
pub struct PagedQuery {
    batcher: PartitionBatcher,
    codec: Arc<dyn CookieCodec>,
}

impl fmt::Debug for PagedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedQuery")
            .field("batcher", &self.batcher)
            .field("codec", &self.codec.name())
            .finish()
    }
}

impl PagedQuery {
    pub fn new(batcher: PartitionBatcher, codec: Arc<dyn CookieCodec>) -> Self {
        Self { batcher, codec }
    }

    pub fn batcher(&self) -> &PartitionBatcher {
        &self.batcher
    }

    pub fn next_page(
        &self,
        map: &dyn ClusteredMap<Bytes, Bytes>,
        ownership: &dyn PartitionOwnership,
        cookie: Option<&[u8]>,
    ) -> GridResult<Page> {
        let partition_count = ownership.partition_count();
        let decoded = decode_cookie(self.codec.as_ref(), cookie, partition_count)?;
        let mut remaining = decoded.partitions;

        // The cursor carries the batch size; zero means nothing sized yet
        let carried = u32::try_from(decoded.cursor).unwrap_or(u32::MAX);
        let batch = if carried == 0 {
            sample_partition(&mut remaining)
        } else {
            self.batcher
                .remove_partition_batch(Some(ownership), &mut remaining, carried)
        };

        let entries = query_partitions(map, &batch)?;
        let batch_size = if carried == 0 {
            self.batcher
                .calculate_batch_size(partition_count, payload_bytes(&entries))
        } else {
            carried
        };

        debug!(
            map = %map.name(),
            queried = batch.cardinality(),
            remaining = remaining.cardinality(),
            batch_size = batch_size,
            entries = entries.len(),
            "Paged query round"
        );

        Ok(Page {
            entries,
            cookie: encode_cookie(self.codec.as_ref(), &remaining, u64::from(batch_size)),
        })
    }
}

/// Take one random partition out of `remaining` for the sizing round
fn sample_partition(remaining: &mut PartitionSet) -> PartitionSet {
    let mut batch = PartitionSet::new(remaining.partition_count());
    if let Some(partition) = remaining.random_partition(&mut rand::thread_rng()) {
        remaining.remove(partition);
        batch.add(partition);
    }
    batch
}

fn query_partitions(
    map: &dyn ClusteredMap<Bytes, Bytes>,
    partitions: &PartitionSet,
) -> GridResult<Vec<(Bytes, Bytes)>> {
    if partitions.is_empty() {
        return Ok(Vec::new());
    }
    let count = partitions.partition_count();
    map.entries_matching(&|key: &Bytes, _| partitions.contains(partition_for_key(key, count)))
}

fn payload_bytes(entries: &[(Bytes, Bytes)]) -> u64 {
    entries
        .iter()
        .map(|(k, v)| (k.len() + v.len()) as u64)
        .sum()
}
