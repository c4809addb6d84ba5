// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::FINALIZER;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "agents.lightrun.com", version = "v1beta", kind = "LightrunJavaAgent")]
#[kube(namespaced)]
#[kube(status = "LightrunJavaAgentStatus")]
#[kube(shortname = "lrja")]
#[kube(
    printcolumn = r#"{"name":"Workload","type":"string","jsonPath":".spec.workloadName","description":"Workload name"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.workloadType","description":"Workload type"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.workloadStatus","description":"Status of Workload Reconciliation"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LightrunJavaAgentSpec {
    /// Containers of the pod template that receive the agent
    pub container_selector: Vec<String>,
    pub init_container: AgentInitContainer,
    /// Deprecated, use workloadName and workloadType
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_type: Option<WorkloadKind>,
    /// Secret in the same namespace holding the agent key and pinned cert hash
    pub secret_name: String,
    /// Env var that carries the -agentpath argument, usually JAVA_TOOL_OPTIONS
    pub agent_env_var_name: String,
    /// Server the init container downloads the agent from
    #[serde(default)]
    pub server_hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_cli_flags: Option<String>,
    #[serde(default)]
    pub agent_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Mount the secret as files instead of exposing it through env vars
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_secrets_as_mounted_files: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_libstdc: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentInitContainer {
    /// Volume shared between the init container and the app containers
    pub shared_volume_name: String,
    /// Where the shared volume is mounted in the app containers
    pub shared_volume_mount_path: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::Deployment => write!(f, "Deployment"),
            WorkloadKind::StatefulSet => write!(f, "StatefulSet"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LightrunJavaAgentStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_status: Option<String>,
    /// Mirrors workloadStatus for clients of the deprecated field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// RFC3339 timestamp
    pub last_transition_time: String,
}

impl LightrunJavaAgent {
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    pub fn cli_flags(&self) -> &str {
        self.spec.agent_cli_flags.as_deref().unwrap_or_default()
    }

    pub fn secrets_as_files(&self) -> bool {
        self.spec.use_secrets_as_mounted_files.unwrap_or(false)
    }

    pub fn mount_libstdc(&self) -> bool {
        self.spec.mount_libstdc.unwrap_or(false)
    }

    /// Whether a container of the pod template is listed in containerSelector
    pub fn selects_container(&self, name: &str) -> bool {
        self.spec.container_selector.iter().any(|c| c == name)
    }
}
