// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace index over managed Deployments.
//!
//! Fed by the Deployment watch stream and eventually consistent with it. The
//! API server stays authoritative; the index only answers bulk lookups
//! without listing.
//!
//! Readers load an immutable snapshot and never wait. The single writer
//! builds the next snapshot and swaps it in atomically.

use arc_swap::ArcSwap;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::watcher;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Identity of an indexed Deployment
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChildKey {
    pub namespace: String,
    pub name: String,
}

impl ChildKey {
    fn of(deployment: &Deployment) -> Self {
        Self {
            namespace: deployment.namespace().unwrap_or_default(),
            name: deployment.name_any(),
        }
    }
}

/// Maps a Deployment to the index buckets it belongs in
pub type Extractor = fn(&Deployment) -> Vec<String>;

/// Default extractor: one bucket, the Deployment's own namespace
pub fn by_namespace(deployment: &Deployment) -> Vec<String> {
    deployment.namespace().into_iter().collect()
}

type Bucket = Arc<BTreeMap<ChildKey, Arc<Deployment>>>;

#[derive(Debug, Default)]
struct Snapshot {
    buckets: HashMap<String, Bucket>,
}

/// Read side of the index; cheap to clone and share between reconciliations
#[derive(Clone)]
pub struct NamespaceIndex {
    snapshot: Arc<ArcSwap<Snapshot>>,
}

impl NamespaceIndex {
    /// Deployments currently known in `namespace`
    pub fn children(&self, namespace: &str) -> Vec<Arc<Deployment>> {
        self.snapshot
            .load()
            .buckets
            .get(namespace)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Identities of the Deployments currently known in `namespace`
    pub fn keys(&self, namespace: &str) -> Vec<ChildKey> {
        self.snapshot
            .load()
            .buckets
            .get(namespace)
            .map(|bucket| bucket.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, namespace: &str) -> usize {
        self.snapshot
            .load()
            .buckets
            .get(namespace)
            .map_or(0, |bucket| bucket.len())
    }

    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }
}

/// Write side of the index. Not `Clone`: exactly one watch stream feeds it.
pub struct NamespaceIndexWriter {
    snapshot: Arc<ArcSwap<Snapshot>>,
    extract: Extractor,
    /// Buckets each Deployment was last placed in
    placed: HashMap<ChildKey, Vec<String>>,
    relist: Option<Vec<Deployment>>,
}

/// Create an index keyed by each Deployment's namespace
pub fn namespace_index() -> (NamespaceIndexWriter, NamespaceIndex) {
    namespace_index_with(by_namespace)
}

/// Create an index with a custom bucket extractor
pub fn namespace_index_with(extract: Extractor) -> (NamespaceIndexWriter, NamespaceIndex) {
    let snapshot = Arc::new(ArcSwap::from_pointee(Snapshot::default()));
    let writer = NamespaceIndexWriter {
        snapshot: snapshot.clone(),
        extract,
        placed: HashMap::new(),
        relist: None,
    };
    (writer, NamespaceIndex { snapshot })
}

impl NamespaceIndexWriter {
    /// Apply one watch event
    pub fn apply(&mut self, event: &watcher::Event<Deployment>) {
        match event {
            watcher::Event::Apply(deployment) => self.upsert(deployment),
            watcher::Event::Delete(deployment) => self.remove(&ChildKey::of(deployment)),
            watcher::Event::Init => self.relist = Some(Vec::new()),
            watcher::Event::InitApply(deployment) => {
                if let Some(relist) = self.relist.as_mut() {
                    relist.push(deployment.clone());
                }
            }
            watcher::Event::InitDone => {
                if let Some(relist) = self.relist.take() {
                    self.rebuild(relist);
                }
            }
        }
    }

    fn upsert(&mut self, deployment: &Deployment) {
        let key = ChildKey::of(deployment);
        let buckets = (self.extract)(deployment);
        let mut next = self.current();

        if let Some(previous) = self.placed.remove(&key) {
            drop_from(&mut next, &key, &previous);
        }
        let shared = Arc::new(deployment.clone());
        for bucket in &buckets {
            Arc::make_mut(next.buckets.entry(bucket.clone()).or_default())
                .insert(key.clone(), shared.clone());
        }
        self.placed.insert(key, buckets);
        self.snapshot.store(Arc::new(next));
    }

    fn remove(&mut self, key: &ChildKey) {
        let Some(previous) = self.placed.remove(key) else {
            return;
        };
        let mut next = self.current();
        drop_from(&mut next, key, &previous);
        self.snapshot.store(Arc::new(next));
    }

    fn rebuild(&mut self, deployments: Vec<Deployment>) {
        let mut next = Snapshot::default();
        self.placed.clear();

        for deployment in deployments {
            let key = ChildKey::of(&deployment);
            let buckets = (self.extract)(&deployment);
            let shared = Arc::new(deployment);
            for bucket in &buckets {
                Arc::make_mut(next.buckets.entry(bucket.clone()).or_default())
                    .insert(key.clone(), shared.clone());
            }
            self.placed.insert(key, buckets);
        }

        debug!("Namespace index rebuilt with {} deployments", self.placed.len());
        self.snapshot.store(Arc::new(next));
    }

    /// Shallow copy of the published snapshot; buckets are shared until modified
    fn current(&self) -> Snapshot {
        Snapshot {
            buckets: self.snapshot.load().buckets.clone(),
        }
    }
}

fn drop_from(snapshot: &mut Snapshot, key: &ChildKey, buckets: &[String]) {
    for bucket in buckets {
        if let Some(entries) = snapshot.buckets.get_mut(bucket) {
            Arc::make_mut(entries).remove(key);
            if entries.is_empty() {
                snapshot.buckets.remove(bucket);
            }
        }
    }
}
