//! # In-Process Clustered Map
//!
//! [`MapStorage`] holds the entries of one named map. Mutations are
//! serialised per partition with striped `parking_lot` mutexes, and events are
//! queued to listeners before the stripe is released, so each key's events
//! reach every listener in commit order. Each registration has a dedicated
//! dispatch thread fed by a crossbeam channel.
//!
//! [`LocalClusteredMap`] is a handle over shared storage. Releasing a handle
//! deactivates it and drops the registrations it created, which is how a
//! client reconnect invalidates earlier map references.

use crate::cluster::map::{
    dispatch_map_event, ClusteredMap, EntryFilter, ListenerToken, MapEntry, MapEvent,
    MapEventKind, MapListener,
};
use crate::cluster::partitions::partition_for_key;
use crate::error::{GridError, GridResult};
use crossbeam::channel::{self, Sender};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

struct Registration<K, V> {
    owner: Uuid,
    key: Option<K>,
    sender: Sender<MapEvent<K, V>>,
    active: Arc<AtomicBool>,
}

/// Shared entries, partition locks and listener registrations of one map
pub struct MapStorage<K, V> {
    name: String,
    entries: DashMap<K, V>,
    locks: Vec<Mutex<()>>,
    registrations: RwLock<HashMap<ListenerToken, Registration<K, V>>>,
    offline: AtomicBool,
}

impl<K: Eq + Hash, V> fmt::Debug for MapStorage<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapStorage")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("partitions", &self.locks.len())
            .field("listeners", &self.registrations.read().len())
            .finish()
    }
}

impl<K, V> MapStorage<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, partition_count: u32) -> Self {
        let stripes = partition_count.max(1) as usize;
        Self {
            name: name.into(),
            entries: DashMap::new(),
            locks: (0..stripes).map(|_| Mutex::new(())).collect(),
            registrations: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> u32 {
        self.locks.len() as u32
    }

    pub fn listener_count(&self) -> usize {
        self.registrations.read().len()
    }

    /// Simulate losing (or regaining) the connection to the storage members
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> GridResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GridError::Communication(format!(
                "storage for map '{}' is unreachable",
                self.name
            )));
        }
        Ok(())
    }

    fn stripe(&self, key: &K) -> &Mutex<()> {
        let partition = partition_for_key(key, self.partition_count());
        &self.locks[partition as usize]
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn apply(&self, key: &K, f: &mut dyn FnMut(&mut MapEntry<K, V>)) {
        let _stripe = self.stripe(key).lock();
        let mut entry = MapEntry::new(key.clone(), self.get(key));
        f(&mut entry);
        self.commit(entry);
    }

    fn apply_filtered(&self, filter: EntryFilter<'_, K, V>, f: &mut dyn FnMut(&mut MapEntry<K, V>)) {
        let keys: Vec<K> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let _stripe = self.stripe(&key).lock();
            // Re-check under the lock; the entry may have changed since the scan
            let Some(current) = self.get(&key) else {
                continue;
            };
            if !filter(&key, &current) {
                continue;
            }
            let mut entry = MapEntry::new(key, Some(current));
            f(&mut entry);
            self.commit(entry);
        }
    }

    /// Must be called with the key's stripe held
    fn commit(&self, entry: MapEntry<K, V>) {
        let (key, original, value, dirty) = entry.into_parts();
        if !dirty {
            return;
        }
        let kind = match (&original, &value) {
            (None, None) => return,
            (None, Some(new)) => {
                self.entries.insert(key.clone(), new.clone());
                MapEventKind::Inserted
            }
            (Some(_), Some(new)) => {
                self.entries.insert(key.clone(), new.clone());
                MapEventKind::Updated
            }
            (Some(_), None) => {
                self.entries.remove(&key);
                MapEventKind::Deleted
            }
        };
        self.publish(MapEvent {
            map_name: self.name.clone(),
            kind,
            key,
            old_value: original,
            new_value: value,
        });
    }

    fn publish(&self, event: MapEvent<K, V>) {
        let registrations = self.registrations.read();
        for (token, registration) in registrations.iter() {
            if registration.key.as_ref().is_some_and(|k| *k != event.key) {
                continue;
            }
            if registration.sender.send(event.clone()).is_err() {
                debug!(map = %self.name, token = %token, "Listener dispatch thread has exited");
            }
        }
    }

    fn register(
        &self,
        owner: Uuid,
        listener: Arc<dyn MapListener<K, V>>,
        key: Option<K>,
    ) -> GridResult<ListenerToken> {
        let token = ListenerToken::new();
        let (sender, receiver) = channel::unbounded::<MapEvent<K, V>>();
        let active = Arc::new(AtomicBool::new(true));

        let thread_active = Arc::clone(&active);
        let map_name = self.name.clone();
        std::thread::Builder::new()
            .name(format!("{}-listener", self.name))
            .spawn(move || {
                for event in receiver {
                    if !thread_active.load(Ordering::SeqCst) {
                        break;
                    }
                    let outcome =
                        catch_unwind(AssertUnwindSafe(|| dispatch_map_event(listener.as_ref(), &event)));
                    if outcome.is_err() {
                        warn!(map = %map_name, kind = %event.kind, "Map listener panicked");
                    }
                }
            })
            .map_err(|e| GridError::Internal(format!("failed to start listener thread: {e}")))?;

        self.registrations.write().insert(
            token,
            Registration {
                owner,
                key,
                sender,
                active,
            },
        );
        Ok(token)
    }

    fn unregister(&self, token: ListenerToken) -> bool {
        match self.registrations.write().remove(&token) {
            Some(registration) => {
                registration.active.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    fn unregister_owner(&self, owner: Uuid) -> usize {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|_, registration| {
            let keep = registration.owner != owner;
            if !keep {
                registration.active.store(false, Ordering::SeqCst);
            }
            keep
        });
        before - registrations.len()
    }
}

/// A handle onto shared [`MapStorage`]
pub struct LocalClusteredMap<K, V> {
    handle_id: Uuid,
    storage: Arc<MapStorage<K, V>>,
    active: AtomicBool,
}

impl<K: Eq + Hash, V> fmt::Debug for LocalClusteredMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalClusteredMap")
            .field("handle_id", &self.handle_id)
            .field("storage", &self.storage)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish()
    }
}

impl<K, V> LocalClusteredMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(storage: Arc<MapStorage<K, V>>) -> Self {
        Self {
            handle_id: Uuid::new_v4(),
            storage,
            active: AtomicBool::new(true),
        }
    }

    /// Standalone map with its own storage
    pub fn standalone(name: impl Into<String>, partition_count: u32) -> Self {
        Self::new(Arc::new(MapStorage::new(name, partition_count)))
    }

    pub fn storage(&self) -> &Arc<MapStorage<K, V>> {
        &self.storage
    }

    pub fn listener_count(&self) -> usize {
        self.storage.listener_count()
    }

    /// Deactivate this handle and drop its listener registrations
    pub fn release(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            let dropped = self.storage.unregister_owner(self.handle_id);
            debug!(
                map = %self.storage.name(),
                handle = %self.handle_id,
                dropped_listeners = dropped,
                "Released map handle"
            );
        }
    }

    fn ensure_usable(&self) -> GridResult<()> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(GridError::MapInactive {
                name: self.storage.name().to_string(),
            });
        }
        self.storage.check_reachable()
    }
}

impl<K, V> ClusteredMap<K, V> for LocalClusteredMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.storage.name()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn get(&self, key: &K) -> GridResult<Option<V>> {
        self.ensure_usable()?;
        Ok(self.storage.get(key))
    }

    fn put(&self, key: K, value: V) -> GridResult<Option<V>> {
        self.ensure_usable()?;
        let mut previous = None;
        let mut value = Some(value);
        self.storage.apply(&key, &mut |entry| {
            previous = entry.value().cloned();
            if let Some(value) = value.take() {
                entry.set_value(value);
            }
        });
        Ok(previous)
    }

    fn put_all(&self, entries: Vec<(K, V)>) -> GridResult<()> {
        self.ensure_usable()?;
        for (key, value) in entries {
            let mut value = Some(value);
            self.storage.apply(&key, &mut |entry| {
                if let Some(value) = value.take() {
                    entry.set_value(value);
                }
            });
        }
        Ok(())
    }

    fn remove(&self, key: &K) -> GridResult<Option<V>> {
        self.ensure_usable()?;
        let mut previous = None;
        self.storage.apply(key, &mut |entry| {
            previous = entry.value().cloned();
            entry.remove();
        });
        Ok(previous)
    }

    fn keys(&self) -> GridResult<Vec<K>> {
        self.ensure_usable()?;
        Ok(self.storage.entries.iter().map(|e| e.key().clone()).collect())
    }

    fn len(&self) -> GridResult<usize> {
        self.ensure_usable()?;
        Ok(self.storage.entries.len())
    }

    fn apply(&self, key: &K, f: &mut dyn FnMut(&mut MapEntry<K, V>)) -> GridResult<()> {
        self.ensure_usable()?;
        self.storage.apply(key, f);
        Ok(())
    }

    fn apply_filtered(
        &self,
        filter: EntryFilter<'_, K, V>,
        f: &mut dyn FnMut(&mut MapEntry<K, V>),
    ) -> GridResult<()> {
        self.ensure_usable()?;
        self.storage.apply_filtered(filter, f);
        Ok(())
    }

    fn add_map_listener(
        &self,
        listener: Arc<dyn MapListener<K, V>>,
        key: Option<K>,
    ) -> GridResult<ListenerToken> {
        self.ensure_usable()?;
        self.storage.register(self.handle_id, listener, key)
    }

    fn remove_map_listener(&self, token: ListenerToken) -> GridResult<bool> {
        self.ensure_usable()?;
        Ok(self.storage.unregister(token))
    }
}
