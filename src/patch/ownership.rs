// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! One LightrunJavaAgent per workload.

use crate::constants::annotations::AGENT_NAME;
use crate::error::{AgentError, Result};
use crate::kubernetes::PodWorkload;
use kube::ResourceExt;

/// Name of the agent recorded on the workload, if any
pub fn current_owner<W: PodWorkload>(workload: &W) -> Option<&str> {
    workload
        .annotations()
        .get(AGENT_NAME)
        .map(String::as_str)
        .filter(|owner| !owner.is_empty())
}

/// Fail when the workload is already managed by another agent
pub fn check_ownership<W: PodWorkload>(agent_name: &str, workload: &W) -> Result<()> {
    match current_owner(workload) {
        Some(owner) if owner != agent_name => Err(AgentError::OwnershipConflict {
            kind: W::KIND.to_string().to_lowercase(),
            owner: owner.to_string(),
        }),
        _ => Ok(()),
    }
}
