//! # Clustered Map Abstraction
//!
//! The key-value contract the executor core runs against. All mutations of
//! shared records go through [`EntryProcessor`]s, which the map runs under the
//! owning partition's lock so two processors never touch the same key at the
//! same time. Listeners observe committed changes per key in commit order.

use crate::error::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// One entry as seen by an entry processor
#[derive(Debug, Clone)]
pub struct MapEntry<K, V> {
    key: K,
    original: Option<V>,
    value: Option<V>,
    dirty: bool,
}

impl<K, V: Clone> MapEntry<K, V> {
    pub fn new(key: K, value: Option<V>) -> Self {
        Self {
            key,
            original: value.clone(),
            value,
            dirty: false,
        }
    }
}

impl<K, V> MapEntry<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Value as it was before the processor ran
    pub fn original_value(&self) -> Option<&V> {
        self.original.as_ref()
    }

    pub fn set_value(&mut self, value: V) {
        self.value = Some(value);
        self.dirty = true;
    }

    /// Mutate the present value in place; returns `None` for an absent entry
    pub fn update<R>(&mut self, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let value = self.value.as_mut()?;
        self.dirty = true;
        Some(f(value))
    }

    pub fn remove(&mut self) {
        if self.value.is_some() || self.original.is_some() {
            self.dirty = true;
        }
        self.value = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// `(key, original, current, dirty)`
    pub fn into_parts(self) -> (K, Option<V>, Option<V>, bool) {
        (self.key, self.original, self.value, self.dirty)
    }
}

/// Atomic read-modify-write against one entry
pub trait EntryProcessor<K, V>: Send + Sync {
    type Output;

    fn process(&self, entry: &mut MapEntry<K, V>) -> Self::Output;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapEventKind {
    Inserted,
    Updated,
    Deleted,
}

impl fmt::Display for MapEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// A committed change
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent<K, V> {
    pub map_name: String,
    pub kind: MapEventKind,
    pub key: K,
    pub old_value: Option<V>,
    pub new_value: Option<V>,
}

/// Receives committed changes. Callbacks run on the registration's dispatch
/// thread and must not block.
pub trait MapListener<K, V>: Send + Sync {
    fn entry_inserted(&self, _event: &MapEvent<K, V>) {}

    fn entry_updated(&self, _event: &MapEvent<K, V>) {}

    fn entry_deleted(&self, _event: &MapEvent<K, V>) {}
}

/// Route an event to the listener callback for its kind
pub fn dispatch_map_event<K, V>(listener: &dyn MapListener<K, V>, event: &MapEvent<K, V>) {
    match event.kind {
        MapEventKind::Inserted => listener.entry_inserted(event),
        MapEventKind::Updated => listener.entry_updated(event),
        MapEventKind::Deleted => listener.entry_deleted(event),
    }
}

/// Handle for a listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerToken(pub Uuid);

impl ListenerToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type EntryFilter<'a, K, V> = &'a (dyn Fn(&K, &V) -> bool + Sync);

/// Object-safe clustered map contract
pub trait ClusteredMap<K, V>: Send + Sync {
    fn name(&self) -> &str;

    /// `false` once the handle has been released, e.g. by a reconnect
    fn is_active(&self) -> bool;

    fn get(&self, key: &K) -> GridResult<Option<V>>;

    fn put(&self, key: K, value: V) -> GridResult<Option<V>>;

    fn put_all(&self, entries: Vec<(K, V)>) -> GridResult<()>;

    fn remove(&self, key: &K) -> GridResult<Option<V>>;

    fn keys(&self) -> GridResult<Vec<K>>;

    fn len(&self) -> GridResult<usize>;

    fn is_empty(&self) -> GridResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Run `f` against one entry under the key's partition lock
    fn apply(&self, key: &K, f: &mut dyn FnMut(&mut MapEntry<K, V>)) -> GridResult<()>;

    /// Run `f` against every present entry accepted by `filter`, each under
    /// its own partition lock
    fn apply_filtered(
        &self,
        filter: EntryFilter<'_, K, V>,
        f: &mut dyn FnMut(&mut MapEntry<K, V>),
    ) -> GridResult<()>;

    /// Register a listener for all keys, or only `key` when given
    fn add_map_listener(
        &self,
        listener: Arc<dyn MapListener<K, V>>,
        key: Option<K>,
    ) -> GridResult<ListenerToken>;

    fn remove_map_listener(&self, token: ListenerToken) -> GridResult<bool>;
}

/// Typed helpers layered over [`ClusteredMap`]
pub trait ClusteredMapExt<K, V>: ClusteredMap<K, V> {
    /// Run a processor against `key` and return its result
    fn invoke<P>(&self, key: &K, processor: &P) -> GridResult<P::Output>
    where
        P: EntryProcessor<K, V> + ?Sized,
    {
        let mut output = None;
        self.apply(key, &mut |entry| output = Some(processor.process(entry)))?;
        output.ok_or_else(|| {
            GridError::Internal(format!("processor did not run on map '{}'", self.name()))
        })
    }

    /// Run a processor against every entry accepted by `filter`
    fn invoke_all<P>(&self, filter: EntryFilter<'_, K, V>, processor: &P) -> GridResult<Vec<(K, P::Output)>>
    where
        K: Clone,
        P: EntryProcessor<K, V> + ?Sized,
    {
        let mut results = Vec::new();
        self.apply_filtered(filter, &mut |entry| {
            let key = entry.key().clone();
            results.push((key, processor.process(entry)));
        })?;
        Ok(results)
    }

    /// Conditionally remove every entry accepted by `filter`
    fn remove_matching(&self, filter: EntryFilter<'_, K, V>) -> GridResult<usize> {
        let mut removed = 0;
        self.apply_filtered(filter, &mut |entry| {
            if entry.is_present() {
                entry.remove();
                removed += 1;
            }
        })?;
        Ok(removed)
    }

    fn entries_matching(&self, filter: EntryFilter<'_, K, V>) -> GridResult<Vec<(K, V)>>
    where
        K: Clone,
        V: Clone,
    {
        let mut entries = Vec::new();
        self.apply_filtered(filter, &mut |entry| {
            if let Some(value) = entry.value() {
                entries.push((entry.key().clone(), value.clone()));
            }
        })?;
        Ok(entries)
    }
}

impl<K, V, M: ClusteredMap<K, V> + ?Sized> ClusteredMapExt<K, V> for M {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_tracks_changes() {
        let mut entry = MapEntry::new("k", Some(1));
        assert!(!entry.is_dirty());
        entry.set_value(2);
        assert!(entry.is_dirty());
        assert_eq!(entry.value(), Some(&2));
        assert_eq!(entry.original_value(), Some(&1));

        entry.remove();
        let (key, original, value, dirty) = entry.into_parts();
        assert_eq!((key, original, value, dirty), ("k", Some(1), None, true));
    }

    #[test]
    fn test_removing_absent_entry_is_clean() {
        let mut entry: MapEntry<&str, i32> = MapEntry::new("k", None);
        entry.remove();
        assert!(!entry.is_dirty());
        assert_eq!(entry.update(|v| *v += 1), None);
    }
}
