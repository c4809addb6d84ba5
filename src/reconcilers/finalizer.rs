// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Finalizer handling and the cleanup that runs before it is released.

use crate::constants::{annotations::AGENT_NAME, FINALIZER};
use crate::error::{AgentError, Result};
use crate::kubernetes::{ClusterApi, PodWorkload};
use crate::patch::{empty_fragment, unpatch_env, DriftMarkers};
use crate::types::LightrunJavaAgent;
use kube::ResourceExt;
use tracing::{debug, info};

/// Add the finalizer, returning the agent as stored afterwards
pub async fn add_finalizer<C: ClusterApi>(
    api: &C,
    agent: &LightrunJavaAgent,
) -> Result<LightrunJavaAgent> {
    info!("Adding finalizer to LightrunJavaAgent {}", agent.name_any());
    let mut updated = agent.clone();
    updated.finalizers_mut().push(FINALIZER.to_string());
    api.merge_patch(agent, &updated).await
}

/// Remove the finalizer, returning the agent as stored afterwards
pub async fn remove_finalizer<C: ClusterApi>(
    api: &C,
    agent: &LightrunJavaAgent,
) -> Result<LightrunJavaAgent> {
    info!("Removing finalizer from LightrunJavaAgent {}", agent.name_any());
    let mut updated = agent.clone();
    updated.finalizers_mut().retain(|f| f != FINALIZER);
    api.merge_patch(agent, &updated).await
}

/// Undo everything the agent did to `workload`.
///
/// The env fragment and the tracking annotations go first, in one merge patch.
/// Then an empty apply releases the volumes, init container and mounts. A workload
/// that disappears halfway counts as cleaned up.
pub async fn cleanup_workload<W: PodWorkload, C: ClusterApi>(
    api: &C,
    agent: &LightrunJavaAgent,
    workload: &W,
) -> Result<()> {
    let name = workload.name_any();
    let namespace = workload.namespace().unwrap_or_default();
    info!("Unpatching {} {}/{}", W::KIND, namespace, name);

    let markers = DriftMarkers::from_annotations(workload.annotations());
    let mut unpatched = workload.clone();
    if let Some(containers) = unpatched.containers_mut() {
        for container in containers
            .iter_mut()
            .filter(|c| agent.selects_container(&c.name))
        {
            unpatch_env(container, &markers);
        }
    }
    if !unpatched.annotations().is_empty() {
        let annotations = unpatched.annotations_mut();
        DriftMarkers::clear(annotations);
        annotations.remove(AGENT_NAME);
    }

    match api.merge_patch(workload, &unpatched).await {
        Ok(_) => {}
        Err(AgentError::NotFound(_)) => {
            debug!("{} {} is already gone", W::KIND, name);
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    match api
        .apply::<W>(&namespace, &name, &empty_fragment::<W>(&namespace, &name))
        .await
    {
        Ok(()) | Err(AgentError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
