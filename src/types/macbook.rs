// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{child::NAME_SUFFIX, FINALIZER};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

#[derive(
    CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash, schemars::JsonSchema,
)]
#[kube(group = "mock.dong.com", version = "v1beta1", kind = "MacBook")]
#[kube(namespaced)]
#[kube(status = "MacBookStatus")]
#[kube(printcolumn = r#"{"name":"Deployment", "type":"string", "jsonPath":".status.mod"}"#)]
#[serde(rename_all = "camelCase")]
pub struct MacBookSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Written only by the operator, through the status subresource
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub struct MacBookStatus {
    /// Name of the Deployment created for this MacBook
    #[serde(rename = "mod", default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
}

impl MacBook {
    /// Deletion has been requested (the object may still be held by finalizers)
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Check if this operator's deletion hold is present
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    /// Name of the Deployment derived from this MacBook
    pub fn child_name(&self) -> String {
        format!("{}{}", self.name_any(), NAME_SUFFIX)
    }

    /// Deployment name recorded in status, if any
    pub fn recorded_child(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.deployment.as_deref())
    }
}
