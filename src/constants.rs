// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Deletion hold placed on every active MacBook
pub const FINALIZER: &str = "dong.com/finalizer";

/// The operator name used as field manager and event reporter
pub const OPERATOR_NAME: &str = "macbook-operator";

/// Label keys set on managed Deployments
pub mod labels {
    /// Carries the owning MacBook's name; used as the pod selector
    pub const APP: &str = "app";
    /// Marks Deployments created by this operator
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
}

/// Shape of the Deployment built for each MacBook
pub mod child {
    /// Appended to the MacBook name to derive the Deployment name
    pub const NAME_SUFFIX: &str = "-deployment";
    pub const CONTAINER_NAME: &str = "web";
    pub const DEFAULT_IMAGE: &str = "nginx:1.12";
    pub const PORT_NAME: &str = "http";
    pub const PORT: i32 = 80;
    pub const REPLICAS: i32 = 1;
}

/// Kubernetes event reasons published on MacBooks
pub mod reasons {
    pub const FINALIZER_ADDED: &str = "FinalizerAdded";
    pub const FINALIZER_REMOVED: &str = "FinalizerRemoved";
    pub const CREATED: &str = "Created";
    pub const CLEANUP_FAILED: &str = "CleanupFailed";
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
