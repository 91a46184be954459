//! Partition ownership.

use crate::cluster::member::Member;
use crate::partition::PartitionSet;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Read-only view of which member owns which partition
pub trait PartitionOwnership: Send + Sync {
    fn partition_count(&self) -> u32;

    /// Current owner, `None` while the partition is being transferred
    fn partition_owner(&self, partition: u32) -> Option<Member>;

    fn owned_partitions(&self, member: &Member) -> PartitionSet;
}

/// Partition id a key hashes to
pub fn partition_for_key<K: Hash + ?Sized>(key: &K, partition_count: u32) -> u32 {
    if partition_count == 0 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(partition_count)) as u32
}

/// Mutable ownership table for the in-process grid
#[derive(Debug)]
pub struct PartitionTable {
    owners: RwLock<Vec<Option<Member>>>,
}

impl PartitionTable {
    /// A table where every partition is still unowned
    pub fn new(partition_count: u32) -> Self {
        Self {
            owners: RwLock::new(vec![None; partition_count as usize]),
        }
    }

    pub fn assign(&self, partition: u32, owner: Option<Member>) {
        if let Some(slot) = self.owners.write().get_mut(partition as usize) {
            *slot = owner;
        }
    }

    /// Spread partitions across `members` in contiguous blocks
    pub fn distribute(&self, members: &[Member]) {
        let mut owners = self.owners.write();
        if members.is_empty() {
            owners.iter_mut().for_each(|slot| *slot = None);
            return;
        }
        let count = owners.len();
        let block = count.div_ceil(members.len()).max(1);
        for (partition, slot) in owners.iter_mut().enumerate() {
            let member = &members[(partition / block).min(members.len() - 1)];
            *slot = Some(member.clone());
        }
    }

    /// Drop ownership of the given partitions, as during a transfer
    pub fn mark_in_flux(&self, partitions: &PartitionSet) {
        let mut owners = self.owners.write();
        for partition in partitions.iter() {
            if let Some(slot) = owners.get_mut(partition as usize) {
                *slot = None;
            }
        }
    }
}

impl PartitionOwnership for PartitionTable {
    fn partition_count(&self) -> u32 {
        self.owners.read().len() as u32
    }

    fn partition_owner(&self, partition: u32) -> Option<Member> {
        self.owners.read().get(partition as usize).cloned().flatten()
    }

    fn owned_partitions(&self, member: &Member) -> PartitionSet {
        let owners = self.owners.read();
        let mut set = PartitionSet::new(owners.len() as u32);
        for (partition, owner) in owners.iter().enumerate() {
            if owner.as_ref().is_some_and(|o| o.id == member.id) {
                set.add(partition as u32);
            }
        }
        set
    }
}
