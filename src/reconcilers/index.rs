// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Map events on workloads and secrets back to the agents that reference them.

use crate::types::LightrunJavaAgent;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use std::sync::Arc;

/// Extracts the name an agent is indexed under
pub type IndexFn = fn(&LightrunJavaAgent) -> Option<&str>;

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Legacy `deploymentName`
pub fn deployment_name_index(agent: &LightrunJavaAgent) -> Option<&str> {
    non_empty(&agent.spec.deployment_name)
}

pub fn workload_name_index(agent: &LightrunJavaAgent) -> Option<&str> {
    non_empty(&agent.spec.workload_name)
}

pub fn secret_name_index(agent: &LightrunJavaAgent) -> Option<&str> {
    Some(agent.spec.secret_name.as_str()).filter(|s| !s.is_empty())
}

/// Indexes that can point at a Deployment
pub const DEPLOYMENT_INDEXES: &[IndexFn] = &[deployment_name_index, workload_name_index];
/// Indexes that can point at a StatefulSet
pub const STATEFULSET_INDEXES: &[IndexFn] = &[workload_name_index];
/// Indexes that can point at a Secret
pub const SECRET_INDEXES: &[IndexFn] = &[secret_name_index];

/// Agents in the namespace of `object` indexed under its name by any of `indexes`
pub fn agents_referencing<K: Resource>(
    agents: &[Arc<LightrunJavaAgent>],
    object: &K,
    indexes: &[IndexFn],
) -> Vec<ObjectRef<LightrunJavaAgent>> {
    let name = object.name_any();
    let namespace = object.namespace();

    let mut matches: Vec<ObjectRef<LightrunJavaAgent>> = Vec::new();
    for agent in agents {
        if agent.namespace() != namespace {
            continue;
        }
        if !indexes.iter().any(|index| index(agent) == Some(name.as_str())) {
            continue;
        }
        let reference = ObjectRef::from_obj(agent.as_ref());
        if !matches.contains(&reference) {
            matches.push(reference);
        }
    }
    matches
}
