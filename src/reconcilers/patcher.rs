// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcile one LightrunJavaAgent against its workload.
//!
//! Every run starts from the agent spec and the live workload; whatever has to be
//! remembered between runs lives in the agent's finalizers and status and in the
//! annotations on the workload.

use crate::constants::{conditions, requeue};
use crate::error::{AgentError, Result};
use crate::kubernetes::{ClusterApi, PodWorkload};
use crate::patch::{
    agent_argument, build_config_artifact, build_fragment, check_container_selector,
    check_ownership, patch_env, resolve_workload, DriftMarkers,
};
use crate::reconcilers::finalizer::{add_finalizer, cleanup_workload, remove_finalizer};
use crate::reconcilers::status::{failure_condition, success_condition, write_status};
use crate::types::{LightrunJavaAgent, WorkloadKind};
use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run one reconcile for `agent` and record the outcome in its status.
///
/// Validation failures end in a `ReconcileFailed` condition and wait for the next
/// change. API errors are recorded as well and then returned, so the controller
/// retries them. A stale resourceVersion only requeues.
pub async fn reconcile_agent<C: ClusterApi>(api: &C, agent: &LightrunJavaAgent) -> Result<Action> {
    let mut current = agent.clone();
    let result = sync_agent(api, &mut current).await;
    report(api, &current, result).await
}

async fn sync_agent<C: ClusterApi>(
    api: &C,
    agent: &mut LightrunJavaAgent,
) -> Result<&'static str> {
    let target = resolve_workload(&agent.spec)?;
    match target.kind {
        WorkloadKind::Deployment => sync_workload::<Deployment, C>(api, agent, &target.name).await,
        WorkloadKind::StatefulSet => {
            sync_workload::<StatefulSet, C>(api, agent, &target.name).await
        }
    }
}

async fn sync_workload<W: PodWorkload, C: ClusterApi>(
    api: &C,
    agent: &mut LightrunJavaAgent,
    name: &str,
) -> Result<&'static str> {
    let namespace = agent.namespace().unwrap_or_default();

    let Some(workload) = api.get::<W>(&namespace, name).await? else {
        return workload_gone::<W, C>(api, agent, name).await;
    };

    check_ownership(&agent.name_any(), &workload)?;

    if agent.is_being_deleted() {
        if agent.has_finalizer() {
            cleanup_workload(api, agent, &workload).await?;
            *agent = remove_finalizer(api, agent).await?;
        }
        return Ok(conditions::PROGRESSING);
    }

    apply_agent(api, agent, &workload).await?;
    Ok(conditions::READY)
}

async fn workload_gone<W: PodWorkload, C: ClusterApi>(
    api: &C,
    agent: &mut LightrunJavaAgent,
    name: &str,
) -> Result<&'static str> {
    let kind = W::KIND.to_string().to_lowercase();
    if agent.has_finalizer() {
        *agent = remove_finalizer(api, agent).await?;
    }
    if agent.is_being_deleted() {
        debug!("{} {} already gone, nothing to clean up", kind, name);
        return Ok(conditions::PROGRESSING);
    }
    Err(AgentError::NotFound(format!("{} {}", kind, name)))
}

async fn apply_agent<W: PodWorkload, C: ClusterApi>(
    api: &C,
    agent: &mut LightrunJavaAgent,
    workload: &W,
) -> Result<()> {
    let namespace = agent.namespace().unwrap_or_default();
    let name = workload.name_any();

    let argument = agent_argument(
        &agent.spec.init_container.shared_volume_mount_path,
        agent.cli_flags(),
    )?;
    check_container_selector(agent, workload)?;

    if !agent.has_finalizer() {
        *agent = add_finalizer(api, agent).await?;
    }

    let secret_name = agent.spec.secret_name.clone();
    let secret = api
        .get::<Secret>(&namespace, &secret_name)
        .await?
        .ok_or_else(|| AgentError::NotFound(format!("secret {}", secret_name)))?;

    let artifact = build_config_artifact(agent)?;
    let config_map_name = artifact.config_map.name_any();
    api.apply::<ConfigMap>(
        &namespace,
        &config_map_name,
        &serde_json::to_value(&artifact.config_map)?,
    )
    .await?;
    debug!("Applied config map {} with hash {}", config_map_name, artifact.hash);

    let fragment = build_fragment(agent, workload, &secret.name_any(), &artifact.hash)?;
    api.apply::<W>(&namespace, &name, &fragment).await?;

    // The apply bumped the resourceVersion, splice against the fresh copy
    let workload = api.get::<W>(&namespace, &name).await?.ok_or_else(|| {
        AgentError::NotFound(format!("{} {}", W::KIND.to_string().to_lowercase(), name))
    })?;
    splice_agent_env(api, agent, &workload, &argument).await
}

/// Add the agent argument to the env of every selected container and record what
/// was added, in one optimistic merge patch.
async fn splice_agent_env<W: PodWorkload, C: ClusterApi>(
    api: &C,
    agent: &LightrunJavaAgent,
    workload: &W,
    argument: &str,
) -> Result<()> {
    let previous = DriftMarkers::from_annotations(workload.annotations());
    let target_env = agent.spec.agent_env_var_name.as_str();

    let mut patched = workload.clone();
    let mut markers = DriftMarkers::new(target_env, argument);
    if let Some(containers) = patched.containers_mut() {
        for container in containers
            .iter_mut()
            .filter(|c| agent.selects_container(&c.name))
        {
            markers = patch_env(container, target_env, argument, &previous)?;
        }
    }
    markers.write_to(patched.annotations_mut());

    if previous != markers {
        info!(
            "Patching {} of {} {} with the agent",
            target_env,
            W::KIND,
            workload.name_any()
        );
    }
    api.merge_patch(workload, &patched).await?;
    Ok(())
}

async fn report<C: ClusterApi>(
    api: &C,
    agent: &LightrunJavaAgent,
    result: Result<&'static str>,
) -> Result<Action> {
    let conflict = || Action::requeue(Duration::from_secs(requeue::CONFLICT_SECS));
    let generation = agent.meta().generation;

    let (condition, outcome) = match result {
        Ok(condition_type) => (
            success_condition(condition_type, generation, Utc::now()),
            Ok(Action::await_change()),
        ),
        Err(e) if e.is_conflict() => {
            debug!("{}, will trigger another reconcile", e);
            return Ok(conflict());
        }
        Err(e) => {
            warn!("Reconcile of LightrunJavaAgent {} failed: {}", agent.name_any(), e);
            let condition = failure_condition(&e.to_string(), generation, Utc::now());
            let outcome = if e.is_permanent() {
                Ok(Action::await_change())
            } else {
                Err(e)
            };
            (condition, outcome)
        }
    };

    match write_status(api, agent, condition).await {
        Ok(()) => outcome,
        Err(e) if e.is_conflict() => {
            debug!("Status of {} is stale, will trigger another reconcile", agent.name_any());
            Ok(conflict())
        }
        Err(e) => Err(e),
    }
}
