// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Object store operations the reconciler depends on.

use crate::constants::OPERATOR_NAME;
use crate::error::{OperatorError, Result};
use crate::types::{MacBook, MacBookStatus};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::{ListParams, Patch, PatchParams, PostParams},
    runtime::events::{Event, EventType, Recorder, Reporter},
    Api, Client, Resource, ResourceExt,
};
use tracing::{debug, instrument, warn};

/// A Kubernetes event to attach to a MacBook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorEvent {
    pub warning: bool,
    pub reason: &'static str,
    pub note: String,
}

impl OperatorEvent {
    pub fn normal(reason: &'static str, note: impl Into<String>) -> Self {
        Self {
            warning: false,
            reason,
            note: note.into(),
        }
    }

    pub fn warning(reason: &'static str, note: impl Into<String>) -> Self {
        Self {
            warning: true,
            reason,
            note: note.into(),
        }
    }
}

/// Cluster API operations used during reconciliation.
///
/// Each call is a single round trip against the API server. Missing objects
/// are reported as `Ok(None)`, never as errors.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Get a MacBook by namespace and name
    async fn get_macbook(&self, namespace: &str, name: &str) -> Result<Option<MacBook>>;

    /// Replace metadata and spec of a MacBook, guarded by its resource version.
    ///
    /// Returns [`OperatorError::Conflict`] when the object changed concurrently.
    async fn replace_macbook(&self, macbook: &MacBook) -> Result<MacBook>;

    /// Write the status subresource only
    async fn patch_macbook_status(&self, macbook: &MacBook, status: &MacBookStatus) -> Result<MacBook>;

    /// Get a Deployment by namespace and name
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    /// Create a Deployment; [`OperatorError::AlreadyExists`] if the name is taken
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    /// List Deployments in a namespace, optionally narrowed by a field selector
    async fn list_deployments(&self, namespace: &str, field_selector: Option<&str>) -> Result<Vec<Deployment>>;

    /// Publish an event on a MacBook. Failures are logged, never returned.
    async fn publish_event(&self, macbook: &MacBook, event: OperatorEvent);
}

/// [`ClusterStore`] backed by the Kubernetes API
pub struct KubeStore {
    client: Client,
    recorder: Recorder,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: OPERATOR_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }

    fn macbooks(&self, namespace: &str) -> Api<MacBook> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: Resource>(obj: &K) -> Result<String> {
    obj.meta()
        .namespace
        .clone()
        .ok_or(OperatorError::MissingObjectKey(".metadata.namespace"))
}

fn name_of<K: Resource>(obj: &K) -> Result<String> {
    obj.meta()
        .name
        .clone()
        .ok_or(OperatorError::MissingObjectKey(".metadata.name"))
}

fn field_manager() -> PostParams {
    PostParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    #[instrument(skip(self))]
    async fn get_macbook(&self, namespace: &str, name: &str) -> Result<Option<MacBook>> {
        Ok(self.macbooks(namespace).get_opt(name).await?)
    }

    #[instrument(skip(self, macbook), fields(macbook = %macbook.name_any()))]
    async fn replace_macbook(&self, macbook: &MacBook) -> Result<MacBook> {
        let namespace = namespace_of(macbook)?;
        let name = name_of(macbook)?;

        match self
            .macbooks(&namespace)
            .replace(&name, &field_manager(), macbook)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!("MacBook {}/{} changed concurrently: {}", namespace, name, ae.message);
                Err(OperatorError::Conflict(format!("MacBook {}/{}", namespace, name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, macbook, status), fields(macbook = %macbook.name_any()))]
    async fn patch_macbook_status(&self, macbook: &MacBook, status: &MacBookStatus) -> Result<MacBook> {
        let namespace = namespace_of(macbook)?;
        let name = name_of(macbook)?;
        let patch = serde_json::json!({ "status": status });

        Ok(self
            .macbooks(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    #[instrument(skip(self))]
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        Ok(self.deployments(namespace).get_opt(name).await?)
    }

    #[instrument(skip(self, deployment), fields(deployment = %deployment.name_any()))]
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let namespace = namespace_of(deployment)?;

        match self
            .deployments(&namespace)
            .create(&field_manager(), deployment)
            .await
        {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(OperatorError::AlreadyExists(format!(
                "Deployment {}/{}",
                namespace,
                deployment.name_any()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn list_deployments(&self, namespace: &str, field_selector: Option<&str>) -> Result<Vec<Deployment>> {
        let mut lp = ListParams::default();
        if let Some(selector) = field_selector {
            lp = lp.fields(selector);
        }

        Ok(self.deployments(namespace).list(&lp).await?.items)
    }

    async fn publish_event(&self, macbook: &MacBook, event: OperatorEvent) {
        let ev = Event {
            type_: if event.warning {
                EventType::Warning
            } else {
                EventType::Normal
            },
            reason: event.reason.to_string(),
            note: Some(event.note),
            action: "Reconcile".to_string(),
            secondary: None,
        };

        if let Err(e) = self.recorder.publish(&ev, &macbook.object_ref(&())).await {
            warn!(
                "Failed to publish {} event for MacBook {}: {}",
                event.reason,
                macbook.name_any(),
                e
            );
        }
    }
}
