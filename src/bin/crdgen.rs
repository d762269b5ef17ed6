// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Prints the MacBook CustomResourceDefinition as YAML, for `kubectl apply -f -`.

use kube::CustomResourceExt;
use macbook_operator::types::MacBook;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&MacBook::crd())?);
    Ok(())
}
