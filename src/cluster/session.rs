//! # Grid Session
//!
//! Entry point the coordinator, orchestrator and proxy use to reach clustered
//! maps, membership and partition ownership. Map handles are fetched per call
//! so that callers pick up fresh handles after a reconnect.

use crate::assignment::ClusteredAssignment;
use crate::cluster::local::{LocalClusteredMap, MapStorage};
use crate::cluster::map::ClusteredMap;
use crate::cluster::member::{Member, Membership};
use crate::cluster::partitions::{PartitionOwnership, PartitionTable};
use crate::config::GridConfig;
use crate::task::TaskRecord;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub type TaskMap = Arc<dyn ClusteredMap<String, TaskRecord>>;
pub type AssignmentMap = Arc<dyn ClusteredMap<String, ClusteredAssignment>>;
pub type DataMap = Arc<dyn ClusteredMap<Bytes, Bytes>>;

pub trait GridSession: Send + Sync {
    fn task_map(&self) -> TaskMap;

    fn assignment_map(&self) -> AssignmentMap;

    /// A named data map, created on first use
    fn data_map(&self, name: &str) -> DataMap;

    fn membership(&self) -> Arc<Membership>;

    fn partitions(&self) -> Arc<dyn PartitionOwnership>;
}

struct Handles {
    tasks: Arc<LocalClusteredMap<String, TaskRecord>>,
    assignments: Arc<LocalClusteredMap<String, ClusteredAssignment>>,
    data: DashMap<String, Arc<LocalClusteredMap<Bytes, Bytes>>>,
}

/// Single-process grid: shared storage, one membership service and a
/// partition table spread over the current members
pub struct LocalGrid {
    config: GridConfig,
    task_storage: Arc<MapStorage<String, TaskRecord>>,
    assignment_storage: Arc<MapStorage<String, ClusteredAssignment>>,
    data_storage: DashMap<String, Arc<MapStorage<Bytes, Bytes>>>,
    handles: RwLock<Handles>,
    membership: Arc<Membership>,
    partitions: Arc<PartitionTable>,
}

impl fmt::Debug for LocalGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalGrid")
            .field("member", self.membership.local_member())
            .field("task_map", &self.config.cluster.task_map_name)
            .field("assignment_map", &self.config.cluster.assignment_map_name)
            .field("data_maps", &self.data_storage.len())
            .finish()
    }
}

impl LocalGrid {
    pub fn new(config: GridConfig) -> Self {
        let partition_count = config.partitions.partition_count;
        let local = Member::new(config.cluster.member_name.clone());
        let partitions = Arc::new(PartitionTable::new(partition_count));
        partitions.distribute(std::slice::from_ref(&local));

        let task_storage = Arc::new(MapStorage::new(
            config.cluster.task_map_name.clone(),
            partition_count,
        ));
        let assignment_storage = Arc::new(MapStorage::new(
            config.cluster.assignment_map_name.clone(),
            partition_count,
        ));
        let handles = Handles {
            tasks: Arc::new(LocalClusteredMap::new(Arc::clone(&task_storage))),
            assignments: Arc::new(LocalClusteredMap::new(Arc::clone(&assignment_storage))),
            data: DashMap::new(),
        };

        info!(
            member = %local,
            partition_count = partition_count,
            "Local grid started"
        );

        Self {
            config,
            task_storage,
            assignment_storage,
            data_storage: DashMap::new(),
            handles: RwLock::new(handles),
            membership: Arc::new(Membership::new(local)),
            partitions,
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn partition_table(&self) -> &Arc<PartitionTable> {
        &self.partitions
    }

    pub fn task_storage(&self) -> &Arc<MapStorage<String, TaskRecord>> {
        &self.task_storage
    }

    pub fn assignment_storage(&self) -> &Arc<MapStorage<String, ClusteredAssignment>> {
        &self.assignment_storage
    }

    /// Add a storage member and rebalance partitions across all members
    pub fn add_member(&self, member: Member) {
        self.membership.join(member);
        self.partitions.distribute(&self.membership.members());
    }

    /// Release every outstanding map handle, issue fresh ones over the same
    /// storage and fire the reconnect hook
    pub fn simulate_reconnect(&self) {
        {
            let mut handles = self.handles.write();
            handles.tasks.release();
            handles.assignments.release();
            for entry in handles.data.iter() {
                entry.value().release();
            }

            *handles = Handles {
                tasks: Arc::new(LocalClusteredMap::new(Arc::clone(&self.task_storage))),
                assignments: Arc::new(LocalClusteredMap::new(Arc::clone(
                    &self.assignment_storage,
                ))),
                data: DashMap::new(),
            };
        }
        info!(member = %self.membership.local_member(), "Session reconnected");
        self.membership.notify_reconnected();
    }
}

impl GridSession for LocalGrid {
    fn task_map(&self) -> TaskMap {
        self.handles.read().tasks.clone()
    }

    fn assignment_map(&self) -> AssignmentMap {
        self.handles.read().assignments.clone()
    }

    fn data_map(&self, name: &str) -> DataMap {
        let handles = self.handles.read();
        let handle = handles
            .data
            .entry(name.to_string())
            .or_insert_with(|| {
                let storage = self
                    .data_storage
                    .entry(name.to_string())
                    .or_insert_with(|| {
                        Arc::new(MapStorage::new(name, self.config.partitions.partition_count))
                    })
                    .clone();
                Arc::new(LocalClusteredMap::new(storage))
            })
            .clone();
        handle
    }

    fn membership(&self) -> Arc<Membership> {
        Arc::clone(&self.membership)
    }

    fn partitions(&self) -> Arc<dyn PartitionOwnership> {
        self.partitions.clone()
    }
}
