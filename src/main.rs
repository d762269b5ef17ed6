// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use macbook_operator::config::Config;
use macbook_operator::finalizer::NoExternalState;
use macbook_operator::index::namespace_index;
use macbook_operator::kubernetes::{wait_for_crd, KubeStore};
use macbook_operator::reconcilers::MacBookReconciler;
use macbook_operator::types::MacBook;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting MacBook operator");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: watch_namespace={}, generation_changes_only={}, child_image={}",
        config.watch_namespace.as_deref().unwrap_or("<all>"),
        config.generation_changes_only,
        config.child_image
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for MacBook CRD to become available...");
    wait_for_crd::<MacBook>(&client).await?;

    let (index_writer, index) = namespace_index();
    let store = Arc::new(KubeStore::new(client.clone()));
    let reconciler = MacBookReconciler::new(store, Arc::new(NoExternalState), index, config);

    info!("Starting reconciler...");
    reconciler.run(client, index_writer).await?;

    warn!("Reconciler stopped");
    Ok(())
}
