//! # Cluster Collaborators
//!
//! Contracts the executor core consumes from the grid (clustered maps,
//! membership, partition ownership, a listener executor) together with
//! in-process implementations used to run a single-member grid.

pub mod executor;
pub mod local;
pub mod map;
pub mod member;
pub mod partitions;
pub mod session;

pub use executor::{Job, ListenerExecutor, RejectedExecution, TokioListenerExecutor};
pub use local::{LocalClusteredMap, MapStorage};
pub use map::{
    ClusteredMap, ClusteredMapExt, EntryFilter, EntryProcessor, ListenerToken, MapEntry,
    MapEvent, MapEventKind, MapListener,
};
pub use member::{Member, MemberEvent, MemberEventKind, MemberListener, Membership};
pub use partitions::{partition_for_key, PartitionOwnership, PartitionTable};
pub use session::{AssignmentMap, DataMap, GridSession, LocalGrid, TaskMap};
