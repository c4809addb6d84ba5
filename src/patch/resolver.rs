// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resolve which workload a LightrunJavaAgent targets.

use crate::error::{AgentError, Result};
use crate::types::{LightrunJavaAgentSpec, WorkloadKind};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadTarget {
    pub kind: WorkloadKind,
    pub name: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Validate the target fields of the spec. Either the legacy `deploymentName` or
/// the `workloadName` + `workloadType` pair must be set, never both.
pub fn resolve_workload(spec: &LightrunJavaAgentSpec) -> Result<WorkloadTarget> {
    let legacy_name = non_empty(&spec.deployment_name);
    let workload_name = non_empty(&spec.workload_name);
    let workload_configured = workload_name.is_some() || spec.workload_type.is_some();

    match (legacy_name, workload_configured) {
        (Some(name), false) => {
            warn!("Using deprecated field deploymentName, consider migrating to workloadName and workloadType");
            Ok(WorkloadTarget {
                kind: WorkloadKind::Deployment,
                name: name.to_string(),
            })
        }
        (None, true) => {
            let Some(kind) = spec.workload_type else {
                return Err(AgentError::Validation(
                    "workloadType must be set when using workloadName".to_string(),
                ));
            };
            let Some(name) = workload_name else {
                return Err(AgentError::Validation(
                    "workloadName must be set when using workloadType".to_string(),
                ));
            };
            Ok(WorkloadTarget {
                kind,
                name: name.to_string(),
            })
        }
        (Some(_), true) => Err(AgentError::Validation(
            "use either deploymentName (legacy) or workloadName with workloadType, not both"
                .to_string(),
        )),
        (None, false) => Err(AgentError::Validation(
            "must set either deploymentName (legacy) or workloadName with workloadType"
                .to_string(),
        )),
    }
}
