// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("External cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("Owner reference could not be set: {0}")]
    OwnerLinkage(String),

    #[error("Object is missing {0}")]
    MissingObjectKey(&'static str),
}

impl OperatorError {
    /// Whether the dispatcher should simply retry the reconciliation
    pub fn is_retryable(&self) -> bool {
        match self {
            OperatorError::Conflict(_) | OperatorError::CleanupFailed(_) => true,
            OperatorError::KubeError(kube::Error::Api(ae)) => {
                ae.code == 409 || ae.code == 429 || ae.code >= 500
            }
            OperatorError::KubeError(_) => true,
            OperatorError::AlreadyExists(_)
            | OperatorError::OwnerLinkage(_)
            | OperatorError::MissingObjectKey(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
