//! # Cluster Membership
//!
//! Member identity, member listeners and the in-process membership service.
//! Listener callbacks run under `catch_unwind` so a panicking listener never
//! reaches the caller that triggered the event.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A cluster member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
}

impl Member {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberEventKind {
    Joined,
    Leaving,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEvent {
    pub kind: MemberEventKind,
    pub member: Member,
    /// Whether the event concerns the local member
    pub local: bool,
}

/// Receives membership changes; only joins are mandatory to handle
pub trait MemberListener: Send + Sync {
    fn member_joined(&self, event: &MemberEvent);

    fn member_leaving(&self, _event: &MemberEvent) {}

    fn member_left(&self, _event: &MemberEvent) {}
}

/// In-process membership service
pub struct Membership {
    local: Member,
    members: RwLock<Vec<Member>>,
    listeners: RwLock<HashMap<Uuid, Arc<dyn MemberListener>>>,
}

impl fmt::Debug for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Membership")
            .field("local", &self.local)
            .field("members", &self.members.read().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl Membership {
    pub fn new(local: Member) -> Self {
        Self {
            members: RwLock::new(vec![local.clone()]),
            local,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    pub fn local_member(&self) -> &Member {
        &self.local
    }

    pub fn members(&self) -> Vec<Member> {
        self.members.read().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn add_member_listener(&self, listener: Arc<dyn MemberListener>) -> Uuid {
        let id = Uuid::new_v4();
        self.listeners.write().insert(id, listener);
        id
    }

    pub fn remove_member_listener(&self, id: Uuid) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// Add a member and announce it; a known member is not announced twice
    pub fn join(&self, member: Member) {
        {
            let mut members = self.members.write();
            if members.iter().any(|m| m.id == member.id) {
                return;
            }
            members.push(member.clone());
        }
        info!(member = %member, "Member joined");
        self.dispatch(MemberEventKind::Joined, member);
    }

    /// Remove a member, announcing `Leaving` and then `Left`
    pub fn leave(&self, member_id: Uuid) -> Option<Member> {
        let member = self
            .members
            .read()
            .iter()
            .find(|m| m.id == member_id)
            .cloned()?;
        self.dispatch(MemberEventKind::Leaving, member.clone());
        self.members.write().retain(|m| m.id != member_id);
        info!(member = %member, "Member left");
        self.dispatch(MemberEventKind::Left, member.clone());
        Some(member)
    }

    /// Reconnect hook: the local member regained contact with the cluster
    pub fn notify_reconnected(&self) {
        debug!(member = %self.local, "Local member reconnected");
        self.dispatch(MemberEventKind::Joined, self.local.clone());
    }

    fn dispatch(&self, kind: MemberEventKind, member: Member) {
        let event = MemberEvent {
            local: member.id == self.local.id,
            kind,
            member,
        };
        // Snapshot so listeners may (de)register from inside a callback
        let listeners: Vec<Arc<dyn MemberListener>> =
            self.listeners.read().values().cloned().collect();

        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| match event.kind {
                MemberEventKind::Joined => listener.member_joined(&event),
                MemberEventKind::Leaving => listener.member_leaving(&event),
                MemberEventKind::Left => listener.member_left(&event),
            }));
            if outcome.is_err() {
                warn!(kind = ?event.kind, member = %event.member, "Member listener panicked");
            }
        }
    }
}
