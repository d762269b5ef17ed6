// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! MacBook reconciler - keeps one Deployment per active MacBook and holds
//! deletion until external cleanup is done.

use crate::config::Config;
use crate::constants::{labels, reasons, OPERATOR_NAME};
use crate::desired::{build_deployment, controlling_owner, set_controller_reference};
use crate::error::{OperatorError, Result};
use crate::filter::{ChangeTracker, EventFilter};
use crate::finalizer::{self, ExternalCleanup, Transition};
use crate::index::{ChildKey, NamespaceIndex, NamespaceIndexWriter};
use crate::kubernetes::store::{ClusterStore, OperatorEvent};
use crate::types::{MacBook, MacBookStatus};
use futures::{stream, StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use kube_runtime::watcher::Config as WatcherConfig;
use kube::{
    runtime::{controller::Action, reflector, watcher, Controller, WatchStreamExt},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// What a single reconciliation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The MacBook no longer exists
    NotFound,
    /// The deletion hold was added; the resulting update triggers the next run
    HoldAdded,
    /// Cleanup is done and the hold released; the API server finishes deletion
    Released,
    /// The Deployment was created and recorded in status
    ChildCreated(String),
    /// The Deployment already exists and was left as is
    ChildPresent(String),
}

pub struct MacBookReconciler {
    store: Arc<dyn ClusterStore>,
    cleanup: Arc<dyn ExternalCleanup>,
    index: NamespaceIndex,
    config: Config,
}

impl MacBookReconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        cleanup: Arc<dyn ExternalCleanup>,
        index: NamespaceIndex,
        config: Config,
    ) -> Self {
        Self {
            store,
            cleanup,
            index,
            config,
        }
    }

    /// Identities of the managed Deployments known in `namespace`, served
    /// from the namespace index without listing
    pub fn list_children(&self, namespace: &str) -> Vec<ChildKey> {
        self.index.keys(namespace)
    }

    /// Drive the MacBook `namespace/name` one step toward its desired state.
    ///
    /// Always recomputes everything from what the store returns, so it can be
    /// re-run at any time, including after a crash halfway through.
    #[instrument(skip(self))]
    pub async fn reconcile_key(&self, namespace: &str, name: &str) -> Result<Outcome> {
        let Some(macbook) = self.store.get_macbook(namespace, name).await? else {
            debug!("MacBook {}/{} is gone, nothing to do", namespace, name);
            return Ok(Outcome::NotFound);
        };

        let macbook = match finalizer::drive(self.store.as_ref(), self.cleanup.as_ref(), macbook.clone()).await {
            Ok(Transition::Proceed(macbook)) => macbook,
            Ok(Transition::HoldAdded(updated)) => {
                self.publish(
                    &updated,
                    OperatorEvent::normal(reasons::FINALIZER_ADDED, "Deletion now waits for cleanup"),
                )
                .await;
                return Ok(Outcome::HoldAdded);
            }
            Ok(Transition::Released) => {
                if macbook.has_finalizer() {
                    self.publish(
                        &macbook,
                        OperatorEvent::normal(reasons::FINALIZER_REMOVED, "Cleanup finished"),
                    )
                    .await;
                }
                return Ok(Outcome::Released);
            }
            Err(e @ OperatorError::CleanupFailed(_)) => {
                self.publish(&macbook, OperatorEvent::warning(reasons::CLEANUP_FAILED, e.to_string()))
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.sync_child(&macbook).await
    }

    async fn sync_child(&self, macbook: &MacBook) -> Result<Outcome> {
        let namespace = macbook
            .namespace()
            .ok_or(OperatorError::MissingObjectKey(".metadata.namespace"))?;
        let mut desired = build_deployment(macbook, &self.config.child_image);
        let child_name = desired.name_any();

        if self.index.is_empty(&namespace) {
            debug!("No managed deployments indexed in namespace {} yet", namespace);
        }

        if let Some(existing) = self.store.get_deployment(&namespace, &child_name).await? {
            return self.observe_existing(macbook, &existing).await;
        }

        if let Err(e) = set_controller_reference(macbook, &mut desired.metadata) {
            warn!(
                "Creating deployment {}/{} without owner reference, it will not be garbage collected: {}",
                namespace, child_name, e
            );
        }

        match self.store.create_deployment(&desired).await {
            Ok(_) => info!("Created deployment {}/{}", namespace, child_name),
            Err(OperatorError::AlreadyExists(_)) => {
                // Created since our lookup; the next notification sees it
                debug!("Deployment {}/{} appeared concurrently", namespace, child_name);
                return Ok(Outcome::ChildPresent(child_name));
            }
            Err(e) => {
                error!("Failed to create deployment {}/{}: {}", namespace, child_name, e);
                return Err(e);
            }
        }

        self.record_child(macbook, &child_name).await?;
        self.publish(
            macbook,
            OperatorEvent::normal(reasons::CREATED, format!("Created deployment {child_name}")),
        )
        .await;

        Ok(Outcome::ChildCreated(child_name))
    }

    /// The Deployment is never updated in place. Status is filled in when a
    /// previous run created the Deployment but stopped before recording it.
    async fn observe_existing(&self, macbook: &MacBook, existing: &Deployment) -> Result<Outcome> {
        let child_name = existing.name_any();

        match controlling_owner(&existing.metadata) {
            Some(owner) if Some(&owner.uid) == macbook.metadata.uid.as_ref() => {
                debug!("Deployment {} already exists", child_name);
                if macbook.recorded_child() != Some(child_name.as_str()) {
                    info!("Recording existing deployment {} in status", child_name);
                    self.record_child(macbook, &child_name).await?;
                }
            }
            Some(owner) => warn!(
                "Deployment {} is controlled by {} {}, leaving it alone",
                child_name, owner.kind, owner.name
            ),
            None => warn!("Deployment {} exists without a controller", child_name),
        }

        Ok(Outcome::ChildPresent(child_name))
    }

    async fn record_child(&self, macbook: &MacBook, child_name: &str) -> Result<()> {
        let status = MacBookStatus {
            deployment: Some(child_name.to_string()),
        };
        self.store.patch_macbook_status(macbook, &status).await?;
        Ok(())
    }

    async fn publish(&self, macbook: &MacBook, event: OperatorEvent) {
        self.store.publish_event(macbook, event).await;
    }

    /// Watch MacBooks and their Deployments and reconcile until shutdown.
    ///
    /// MacBook notifications pass through the [`EventFilter`]; Deployment
    /// notifications feed the namespace index and are routed to their owning
    /// MacBook through the owner reference.
    pub async fn run(self, client: Client, mut index_writer: NamespaceIndexWriter) -> anyhow::Result<()> {
        let (macbooks, deployments): (Api<MacBook>, Api<Deployment>) = match &self.config.watch_namespace {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            ),
            None => (Api::all(client.clone()), Api::all(client.clone())),
        };

        let filter = EventFilter::from_config(&self.config);
        let mut tracker = ChangeTracker::default();
        let (reader, writer) = reflector::store();
        let parents = watcher(macbooks, WatcherConfig::default())
            .default_backoff()
            .reflect(writer)
            .map_ok(move |event| {
                stream::iter(
                    tracker
                        .admitted(&filter, event)
                        .into_iter()
                        .map(Ok::<_, watcher::Error>),
                )
            })
            .try_flatten();

        let managed = WatcherConfig::default().labels(&format!("{}={}", labels::MANAGED_BY, OPERATOR_NAME));
        let children = watcher(deployments, managed)
            .default_backoff()
            .map_ok(move |event| {
                index_writer.apply(&event);
                event
            })
            .touched_objects();

        let context = Arc::new(self);

        Controller::for_stream(parents, reader)
            .owns_stream(children)
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled macbook: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(macbook: Arc<MacBook>, ctx: Arc<MacBookReconciler>) -> Result<Action> {
    let namespace = macbook
        .namespace()
        .ok_or(OperatorError::MissingObjectKey(".metadata.namespace"))?;

    let outcome = ctx.reconcile_key(&namespace, &macbook.name_any()).await?;
    debug!("MacBook {}/{}: {:?}", namespace, macbook.name_any(), outcome);

    // Level triggered: the next watch notification or error requeue drives the next run
    Ok(Action::await_change())
}

fn error_policy(macbook: Arc<MacBook>, error: &OperatorError, ctx: Arc<MacBookReconciler>) -> Action {
    if error.is_retryable() {
        warn!(
            "Reconciliation of MacBook {} failed, retrying in {}s: {}",
            macbook.name_any(),
            ctx.config.error_requeue_secs,
            error
        );
        Action::requeue(Duration::from_secs(ctx.config.error_requeue_secs))
    } else {
        // Retrying cannot help; wait for the object to change
        error!("Reconciliation of MacBook {} failed: {}", macbook.name_any(), error);
        Action::await_change()
    }
}
