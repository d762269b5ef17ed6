// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deletion hold handling for MacBooks.
//!
//! An active MacBook always carries [`FINALIZER`]. Once deletion is requested
//! the hold is released only after [`ExternalCleanup::cleanup`] succeeds, so
//! the API server can never remove a MacBook whose external state is still
//! around.

use crate::constants::FINALIZER;
use crate::error::{OperatorError, Result};
use crate::kubernetes::store::ClusterStore;
use crate::types::MacBook;
use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

/// Where a MacBook stands with respect to deletion and our hold on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    ActiveNoHold,
    ActiveHeld,
    TerminatingHeld,
    /// Our hold is gone; the API server may remove the object
    TerminatingReleased,
}

impl FinalizerState {
    /// Classify a MacBook from its metadata alone
    pub fn of(macbook: &MacBook) -> Self {
        match (macbook.is_terminating(), macbook.has_finalizer()) {
            (false, false) => FinalizerState::ActiveNoHold,
            (false, true) => FinalizerState::ActiveHeld,
            (true, true) => FinalizerState::TerminatingHeld,
            (true, false) => FinalizerState::TerminatingReleased,
        }
    }
}

/// Result of one [`drive`] step
#[derive(Debug)]
pub enum Transition {
    /// The hold was just added and persisted; the write triggers the next run
    HoldAdded(MacBook),
    /// Active and held: normal reconciliation continues with this object
    Proceed(MacBook),
    /// Cleanup ran (now or earlier) and the hold is gone
    Released,
}

/// Removal of state the API server's garbage collector does not know about.
///
/// Invoked at least once per deleted MacBook and again after every failure or
/// crash, so implementations must tolerate repeated calls.
#[async_trait]
pub trait ExternalCleanup: Send + Sync {
    async fn cleanup(&self, macbook: &MacBook) -> Result<()>;
}

/// Cleanup for deployments where a MacBook owns nothing outside the cluster.
/// The Deployment itself is removed by garbage collection via its owner reference.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExternalState;

#[async_trait]
impl ExternalCleanup for NoExternalState {
    async fn cleanup(&self, macbook: &MacBook) -> Result<()> {
        debug!("No external state to clean up for MacBook {}", macbook.name_any());
        Ok(())
    }
}

/// Advance the deletion state machine by one step.
#[instrument(skip_all, fields(macbook = %macbook.name_any()))]
pub async fn drive(
    store: &dyn ClusterStore,
    cleanup: &dyn ExternalCleanup,
    macbook: MacBook,
) -> Result<Transition> {
    match FinalizerState::of(&macbook) {
        FinalizerState::ActiveNoHold => {
            let mut held = macbook;
            held.finalizers_mut().push(FINALIZER.to_string());
            let updated = store.replace_macbook(&held).await?;
            info!("Added finalizer {}", FINALIZER);
            Ok(Transition::HoldAdded(updated))
        }
        FinalizerState::ActiveHeld => Ok(Transition::Proceed(macbook)),
        FinalizerState::TerminatingHeld => {
            if let Err(e) = cleanup.cleanup(&macbook).await {
                warn!("Cleanup failed, keeping finalizer: {}", e);
                return Err(match e {
                    OperatorError::CleanupFailed(msg) => OperatorError::CleanupFailed(msg),
                    other => OperatorError::CleanupFailed(other.to_string()),
                });
            }

            let mut released = macbook;
            released.finalizers_mut().retain(|f| f != FINALIZER);
            store.replace_macbook(&released).await?;
            info!("Cleanup done, removed finalizer {}", FINALIZER);
            Ok(Transition::Released)
        }
        FinalizerState::TerminatingReleased => {
            debug!("Terminating without our finalizer, nothing to do");
            Ok(Transition::Released)
        }
    }
}
