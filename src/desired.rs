// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Desired Deployment for a MacBook, and the owner references that tie it back.

use crate::constants::{child, labels, OPERATOR_NAME};
use crate::error::{OperatorError, Result};
use crate::types::MacBook;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Build the Deployment that should exist for `macbook`.
///
/// Pure: reads only the MacBook's name and namespace, so two MacBooks with the
/// same identity always yield the same Deployment regardless of status or
/// finalizers.
pub fn build_deployment(macbook: &MacBook, image: &str) -> Deployment {
    let selector_labels = BTreeMap::from([(labels::APP.to_string(), macbook.name_any())]);

    let mut object_labels = selector_labels.clone();
    object_labels.insert(labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string());

    Deployment {
        metadata: ObjectMeta {
            name: Some(macbook.child_name()),
            namespace: macbook.namespace(),
            labels: Some(object_labels),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(child::REPLICAS),
            selector: LabelSelector {
                match_labels: Some(selector_labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    termination_grace_period_seconds: Some(0),
                    containers: vec![Container {
                        name: child::CONTAINER_NAME.to_string(),
                        image: Some(image.to_string()),
                        ports: Some(vec![ContainerPort {
                            name: Some(child::PORT_NAME.to_string()),
                            protocol: Some("TCP".to_string()),
                            container_port: child::PORT,
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// The owner reference on `meta` that claims to be its controller, if any
pub fn controlling_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
}

/// Mark `owner` as the single controller of the object described by `meta`.
///
/// Fails when the owner has no uid yet, or when another object already
/// controls `meta`.
pub fn set_controller_reference(owner: &MacBook, meta: &mut ObjectMeta) -> Result<()> {
    let mut owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::OwnerLinkage(format!(
            "MacBook {} has no uid, cannot become a controller",
            owner.name_any()
        ))
    })?;

    if let Some(existing) = controlling_owner(meta) {
        if existing.uid != owner_ref.uid {
            return Err(OperatorError::OwnerLinkage(format!(
                "{} is already controlled by {} {}",
                meta.name.as_deref().unwrap_or_default(),
                existing.kind,
                existing.name
            )));
        }
    }

    // Foreground deletion of the MacBook waits for the Deployment
    owner_ref.block_owner_deletion = Some(true);
    upsert_owner_reference(meta, owner_ref);
    Ok(())
}

/// Add `owner` as a non-controlling owner of the object described by `meta`.
///
/// An existing controller reference to `owner` is kept as is.
pub fn set_owner_reference(owner: &MacBook, meta: &mut ObjectMeta) -> Result<()> {
    let owner_ref = owner.owner_ref(&()).ok_or_else(|| {
        OperatorError::OwnerLinkage(format!("MacBook {} has no uid", owner.name_any()))
    })?;

    if controlling_owner(meta).is_some_and(|c| c.uid == owner_ref.uid) {
        return Ok(());
    }

    upsert_owner_reference(meta, owner_ref);
    Ok(())
}

fn upsert_owner_reference(meta: &mut ObjectMeta, owner_ref: OwnerReference) {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.uid == owner_ref.uid) {
        Some(existing) => *existing = owner_ref,
        None => refs.push(owner_ref),
    }
}
