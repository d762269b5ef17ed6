// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::child::DEFAULT_IMAGE;
use anyhow::{Context, Result};
use std::env;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Only MacBooks in this namespace are reconciled; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Drop MacBook updates that touch neither spec, deletion marker nor finalizers
    pub generation_changes_only: bool,
    /// Requeue delay after a failed reconciliation
    pub error_requeue_secs: u64,
    /// Container image of the managed Deployment
    pub child_image: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            watch_namespace: None,
            generation_changes_only: true,
            error_requeue_secs: 60,
            child_image: DEFAULT_IMAGE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let generation_changes_only = match lookup("GENERATION_CHANGES_ONLY") {
            Some(v) => v
                .parse()
                .with_context(|| format!("GENERATION_CHANGES_ONLY must be true or false, got {v:?}"))?,
            None => defaults.generation_changes_only,
        };

        let error_requeue_secs = match lookup("ERROR_REQUEUE_SECS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("ERROR_REQUEUE_SECS must be a number of seconds, got {v:?}"))?,
            None => defaults.error_requeue_secs,
        };

        let child_image = lookup("CHILD_IMAGE").unwrap_or(defaults.child_image);

        Ok(Config {
            watch_namespace,
            generation_changes_only,
            error_requeue_secs,
            child_image,
        })
    }
}
