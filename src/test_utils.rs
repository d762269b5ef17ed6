// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: MacBook fixtures, a mocked Kubernetes HTTP API and an
//! in-memory [`ClusterStore`].

use crate::error::{OperatorError, Result};
use crate::finalizer::ExternalCleanup;
use crate::kubernetes::store::{ClusterStore, OperatorEvent};
use crate::types::{MacBook, MacBookSpec, MacBookStatus};
use async_trait::async_trait;
use http::{Request, Response};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::core::ErrorResponse;
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tower::Service;

/// An active MacBook with uid, resource version and generation populated
pub fn make_macbook(namespace: &str, name: &str) -> MacBook {
    MacBook {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            resource_version: Some("1".to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: MacBookSpec {
            display: Some("x".to_string()),
        },
        status: None,
    }
}

/// A deletion timestamp, as set by the API server on delete
pub fn deletion_marker() -> Time {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap()
}

pub fn server_error(message: &str) -> OperatorError {
    OperatorError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response for requests with `method` matching the exact path
    pub fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, status, body)
    }

    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    /// Method and path of every request received so far
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Prefix match for paths like /apis/apps/v1/namespaces/foo/deployments/bar
        for ((m, p), resp) in responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        self.requests
            .lock()
            .unwrap()
            .push((method.clone(), path.clone()));
        let (status, body) = self
            .find_response(&method, &path)
            .unwrap_or_else(|| (404, status_json(404, "NotFound", "not found")));

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// A `Status` failure body as returned by the API server
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

pub fn macbook_json(macbook: &MacBook) -> String {
    serde_json::to_string(macbook).unwrap()
}

pub fn deployment_json(deployment: &Deployment) -> String {
    serde_json::to_string(deployment).unwrap()
}

type Key = (String, String);

fn key_of(meta: &ObjectMeta) -> Key {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn not_found(kind: &str, name: &str) -> OperatorError {
    OperatorError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{kind} \"{name}\" not found"),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

/// Contents and call counters of a [`FakeStore`]
#[derive(Default)]
pub struct FakeState {
    pub macbooks: BTreeMap<Key, MacBook>,
    pub deployments: BTreeMap<Key, Deployment>,
    pub gets: usize,
    pub replaces: usize,
    pub status_patches: usize,
    pub creates: usize,
    pub events: Vec<OperatorEvent>,
    pub fail_gets: bool,
    pub fail_creates: bool,
    next_version: u64,
}

impl FakeState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        (100 + self.next_version).to_string()
    }
}

/// In-memory [`ClusterStore`] mimicking API server semantics: optimistic
/// concurrency on replace, and removal of a MacBook once it is marked for
/// deletion and holds no finalizers.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_macbook(self, macbook: MacBook) -> Self {
        self.state().macbooks.insert(key_of(&macbook.metadata), macbook);
        self
    }

    pub fn with_deployment(self, deployment: Deployment) -> Self {
        self.state()
            .deployments
            .insert(key_of(&deployment.metadata), deployment);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn macbook(&self, namespace: &str, name: &str) -> Option<MacBook> {
        self.state()
            .macbooks
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state()
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Simulate `kubectl delete`: set the deletion marker, or remove outright
    /// when nothing holds the object
    pub fn request_deletion(&self, namespace: &str, name: &str) {
        let mut state = self.state();
        let key = (namespace.to_string(), name.to_string());
        let held = match state.macbooks.get(&key) {
            Some(macbook) => !macbook.finalizers().is_empty(),
            None => return,
        };
        if !held {
            state.macbooks.remove(&key);
            return;
        }

        let version = state.bump_version();
        if let Some(macbook) = state.macbooks.get_mut(&key) {
            macbook.metadata.deletion_timestamp = Some(deletion_marker());
            macbook.metadata.resource_version = Some(version);
        }
    }
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn get_macbook(&self, namespace: &str, name: &str) -> Result<Option<MacBook>> {
        let mut state = self.state();
        state.gets += 1;
        if state.fail_gets {
            return Err(server_error("etcd unavailable"));
        }
        Ok(state
            .macbooks
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn replace_macbook(&self, macbook: &MacBook) -> Result<MacBook> {
        let mut state = self.state();
        state.replaces += 1;
        let key = key_of(&macbook.metadata);

        let Some(current) = state.macbooks.get(&key) else {
            return Err(not_found("macbooks", &key.1));
        };
        if current.metadata.resource_version != macbook.metadata.resource_version {
            return Err(OperatorError::Conflict(format!("MacBook {}/{}", key.0, key.1)));
        }

        let mut updated = macbook.clone();
        // Status and the deletion marker are not writable through replace
        updated.status = current.status.clone();
        updated.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        updated.metadata.resource_version = Some(state.bump_version());

        if updated.metadata.deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            state.macbooks.remove(&key);
        } else {
            state.macbooks.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn patch_macbook_status(&self, macbook: &MacBook, status: &MacBookStatus) -> Result<MacBook> {
        let mut state = self.state();
        state.status_patches += 1;
        let key = key_of(&macbook.metadata);
        let version = state.bump_version();

        let Some(current) = state.macbooks.get_mut(&key) else {
            return Err(not_found("macbooks", &key.1));
        };
        current.status = Some(status.clone());
        current.metadata.resource_version = Some(version);
        Ok(current.clone())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let mut state = self.state();
        state.gets += 1;
        if state.fail_gets {
            return Err(server_error("etcd unavailable"));
        }
        Ok(state
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let mut state = self.state();
        state.creates += 1;
        if state.fail_creates {
            return Err(server_error("admission webhook timed out"));
        }

        let key = key_of(&deployment.metadata);
        if state.deployments.contains_key(&key) {
            return Err(OperatorError::AlreadyExists(format!("Deployment {}/{}", key.0, key.1)));
        }

        let mut created = deployment.clone();
        created.metadata.uid = Some(format!("uid-{}", key.1));
        created.metadata.resource_version = Some(state.bump_version());
        state.deployments.insert(key, created.clone());
        Ok(created)
    }

    async fn list_deployments(&self, namespace: &str, field_selector: Option<&str>) -> Result<Vec<Deployment>> {
        let state = self.state();
        let wanted_name = field_selector.and_then(|s| s.strip_prefix("metadata.name="));

        Ok(state
            .deployments
            .iter()
            .filter(|((ns, name), _)| ns == namespace && wanted_name.map_or(true, |w| w == name))
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn publish_event(&self, _macbook: &MacBook, event: OperatorEvent) {
        self.state().events.push(event);
    }
}

/// [`ExternalCleanup`] that counts invocations and fails a set number of times first
#[derive(Default)]
pub struct CountingCleanup {
    pub calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl CountingCleanup {
    pub fn failing(times: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(times),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalCleanup for CountingCleanup {
    async fn cleanup(&self, macbook: &MacBook) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(OperatorError::CleanupFailed(format!(
                "external state for {} still present",
                macbook.name_any()
            )));
        }
        Ok(())
    }
}
