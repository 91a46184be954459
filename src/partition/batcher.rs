//! # Partition Batching
//!
//! Sizes and selects the partitions queried by one round of a paged
//! scatter-gather request. The batch size is extrapolated from the result size
//! of a single sampled partition, and batches prefer partitions that share an
//! owning member so each round contacts as few members as possible.

use crate::cluster::partitions::PartitionOwnership;
use crate::config::PartitionConfig;
use crate::constants::DEFAULT_TRANSFER_THRESHOLD;
use crate::partition::PartitionSet;
use rand::Rng;
use tracing::trace;

/// Computes batch sizes against a byte budget and carves batches out of the
/// remaining partition set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBatcher {
    transfer_threshold: u64,
}

impl Default for PartitionBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSFER_THRESHOLD)
    }
}

impl PartitionBatcher {
    pub fn new(transfer_threshold: u64) -> Self {
        Self {
            transfer_threshold: transfer_threshold.max(1),
        }
    }

    pub fn from_config(config: &PartitionConfig) -> Self {
        Self::new(config.transfer_threshold)
    }

    pub fn transfer_threshold(&self) -> u64 {
        self.transfer_threshold
    }

    /// Number of partitions to query in the next round.
    ///
    /// A zero sample means results are sparse and everything goes in one
    /// round. Otherwise the threshold is divided by the sampled size and
    /// clamped to `[1, total_partitions]`.
    pub fn calculate_batch_size(&self, total_partitions: u32, sampled_bytes: u64) -> u32 {
        if total_partitions == 0 {
            return 0;
        }
        if sampled_bytes == 0 {
            return total_partitions;
        }
        let batch = self.transfer_threshold / sampled_bytes;
        batch.clamp(1, u64::from(total_partitions)) as u32
    }

    /// Remove up to `max_batch` partitions from `remaining` and return them
    pub fn remove_partition_batch(
        &self,
        ownership: Option<&dyn PartitionOwnership>,
        remaining: &mut PartitionSet,
        max_batch: u32,
    ) -> PartitionSet {
        self.remove_partition_batch_with_rng(ownership, remaining, max_batch, &mut rand::thread_rng())
    }

    /// [`Self::remove_partition_batch`] with a caller supplied random source
    pub fn remove_partition_batch_with_rng<R: Rng + ?Sized>(
        &self,
        ownership: Option<&dyn PartitionOwnership>,
        remaining: &mut PartitionSet,
        max_batch: u32,
        rng: &mut R,
    ) -> PartitionSet {
        let max_batch = max_batch.max(1);
        let mut batch = PartitionSet::new(remaining.partition_count());

        if remaining.cardinality() <= max_batch {
            batch.add_all(remaining);
            remaining.clear();
            return batch;
        }

        let mut budget = max_batch;
        if let Some(ownership) = ownership {
            budget = take_by_owner(ownership, remaining, &mut batch, budget, rng);
        }

        if batch.is_empty() {
            take_random_run(remaining, &mut batch, budget, rng);
        }

        trace!(
            batch = %batch,
            remaining = remaining.cardinality(),
            "Removed partition batch"
        );
        batch
    }
}

/// Member-affinity selection; returns the budget left over
fn take_by_owner<R: Rng + ?Sized>(
    ownership: &dyn PartitionOwnership,
    remaining: &mut PartitionSet,
    batch: &mut PartitionSet,
    mut budget: u32,
    rng: &mut R,
) -> u32 {
    while budget > 0 {
        let Some(start) = remaining.random_partition(rng) else {
            break;
        };

        // Owners can be missing while partitions move; scan forward, at most
        // once around what is left
        let mut candidate = start;
        let mut owner = None;
        for _ in 0..remaining.cardinality() {
            if let Some(member) = ownership.partition_owner(candidate) {
                owner = Some(member);
                break;
            }
            match remaining.next_wrapping(candidate + 1) {
                Some(next) if next != start => candidate = next,
                _ => break,
            }
        }

        let Some(owner) = owner else {
            trace!("No partition owner found, abandoning affinity selection");
            break;
        };

        remaining.remove(candidate);
        batch.add(candidate);
        budget -= 1;

        let mut co_located = ownership.owned_partitions(&owner);
        co_located.retain_all(remaining);
        for partition in co_located.iter() {
            if budget == 0 {
                break;
            }
            remaining.remove(partition);
            batch.add(partition);
            budget -= 1;
        }
    }
    budget
}

/// Contiguous run around the ring from a random starting point
fn take_random_run<R: Rng + ?Sized>(
    remaining: &mut PartitionSet,
    batch: &mut PartitionSet,
    budget: u32,
    rng: &mut R,
) {
    let mut cursor = remaining.random_partition(rng);
    let mut taken = 0;
    while let Some(partition) = cursor {
        if taken >= budget {
            break;
        }
        remaining.remove(partition);
        batch.add(partition);
        taken += 1;
        cursor = remaining.next_wrapping(partition + 1);
    }
}
