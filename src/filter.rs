// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Admission of watch notifications before they reach the reconcile queue.

use crate::config::Config;
use kube::api::ObjectMeta;
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use std::collections::HashMap;
use tracing::trace;

/// A single observed change to an object
#[derive(Debug)]
pub enum ChangeEvent<'a, K> {
    Created(&'a K),
    Updated { old: &'a K, new: &'a K },
    Deleted(&'a K),
}

/// Pure predicate over [`ChangeEvent`]s
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    namespace: Option<String>,
    generation_changes_only: bool,
}

impl EventFilter {
    pub fn new(namespace: Option<String>, generation_changes_only: bool) -> Self {
        Self {
            namespace,
            generation_changes_only,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.watch_namespace.clone(), config.generation_changes_only)
    }

    /// Whether `event` should enqueue a reconciliation
    pub fn admit<K: Resource>(&self, event: &ChangeEvent<'_, K>) -> bool {
        match event {
            ChangeEvent::Created(obj) | ChangeEvent::Deleted(obj) => self.in_scope(obj.meta()),
            ChangeEvent::Updated { old, new } => {
                self.in_scope(new.meta())
                    && (!self.generation_changes_only || lifecycle_changed(old.meta(), new.meta()))
            }
        }
    }

    fn in_scope(&self, meta: &ObjectMeta) -> bool {
        match &self.namespace {
            Some(ns) => meta.namespace.as_deref() == Some(ns.as_str()),
            None => true,
        }
    }
}

/// Spec edits bump generation; deletion requests and hold changes show up in
/// metadata. Status writes and resync touch neither.
fn lifecycle_changed(old: &ObjectMeta, new: &ObjectMeta) -> bool {
    old.generation != new.generation
        || old.deletion_timestamp != new.deletion_timestamp
        || old.finalizers != new.finalizers
}

type Key = (Option<String>, String);

fn key_of<K: Resource>(obj: &K) -> Key {
    (obj.namespace(), obj.name_any())
}

/// Turns raw watch events into [`ChangeEvent`]s by remembering the last
/// version seen of every object, and yields the objects [`EventFilter`] admits.
#[derive(Debug)]
pub struct ChangeTracker<K> {
    seen: HashMap<Key, K>,
    relist: Option<HashMap<Key, K>>,
}

impl<K> Default for ChangeTracker<K> {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
            relist: None,
        }
    }
}

impl<K: Resource + Clone> ChangeTracker<K> {
    pub fn admitted(&mut self, filter: &EventFilter, event: watcher::Event<K>) -> Vec<K> {
        match event {
            watcher::Event::Apply(obj) => self.observe(filter, obj).into_iter().collect(),
            watcher::Event::InitApply(obj) => {
                if let Some(relist) = self.relist.as_mut() {
                    relist.insert(key_of(&obj), obj.clone());
                }
                self.observe(filter, obj).into_iter().collect()
            }
            watcher::Event::Delete(obj) => {
                self.seen.remove(&key_of(&obj));
                if filter.admit(&ChangeEvent::Deleted(&obj)) {
                    vec![obj]
                } else {
                    Vec::new()
                }
            }
            watcher::Event::Init => {
                self.relist = Some(HashMap::new());
                Vec::new()
            }
            watcher::Event::InitDone => {
                // Objects missing from the relist were deleted while disconnected
                if let Some(relist) = self.relist.take() {
                    self.seen = relist;
                }
                Vec::new()
            }
        }
    }

    fn observe(&mut self, filter: &EventFilter, obj: K) -> Option<K> {
        let key = key_of(&obj);
        let admitted = match self.seen.get(&key) {
            Some(old) => filter.admit(&ChangeEvent::Updated { old, new: &obj }),
            None => filter.admit(&ChangeEvent::Created(&obj)),
        };
        self.seen.insert(key, obj.clone());

        if !admitted {
            trace!("Dropping notification for {}", obj.name_any());
        }
        admitted.then_some(obj)
    }
}
