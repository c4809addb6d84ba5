// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Splice the `-agentpath` argument into a shared env var and take it out again.
//!
//! The env var (usually `JAVA_TOOL_OPTIONS`) can hold options from other writers,
//! so only our own fragment is ever added or removed. The fragment and env var
//! name last written are kept in annotations on the workload, which lets a later
//! reconcile remove exactly what was added even after the spec changed.

use crate::constants::{annotations, injection::AGENT_SO_PATH, MAX_AGENT_ARG_LEN};
use crate::error::{AgentError, Result};
use k8s_openapi::api::core::v1::{Container, EnvVar};
use std::collections::BTreeMap;

/// Build the `-agentpath` option for the agent mounted under `mount_path`
pub fn agent_argument(mount_path: &str, cli_flags: &str) -> Result<String> {
    let mut argument = format!("-agentpath:{}{}", mount_path, AGENT_SO_PATH);
    if !cli_flags.is_empty() {
        argument.push('=');
        argument.push_str(cli_flags);
    }
    if argument.len() > MAX_AGENT_ARG_LEN {
        return Err(AgentError::LimitExceeded(
            "agentpath with agentCliFlags".to_string(),
        ));
    }
    Ok(argument)
}

/// Env var name and fragment injected by the previous reconcile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftMarkers {
    pub env_name: String,
    pub fragment: String,
}

impl DriftMarkers {
    pub fn new(env_name: &str, fragment: &str) -> Self {
        Self {
            env_name: env_name.to_string(),
            fragment: fragment.to_string(),
        }
    }

    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| annotations.get(key).cloned().unwrap_or_default();
        Self {
            env_name: get(annotations::PATCHED_ENV_NAME),
            fragment: get(annotations::PATCHED_ENV_VALUE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.env_name.is_empty() && self.fragment.is_empty()
    }

    pub fn write_to(&self, target: &mut BTreeMap<String, String>) {
        target.insert(annotations::PATCHED_ENV_NAME.to_string(), self.env_name.clone());
        target.insert(annotations::PATCHED_ENV_VALUE.to_string(), self.fragment.clone());
    }

    pub fn clear(target: &mut BTreeMap<String, String>) {
        target.remove(annotations::PATCHED_ENV_NAME);
        target.remove(annotations::PATCHED_ENV_VALUE);
    }
}

/// Add `argument` to `target_env` of the container, appending to any value already
/// there. A fragment recorded in `previous` for another env var or with another
/// value is removed first. Returns the markers describing this injection.
pub fn patch_env(
    container: &mut Container,
    target_env: &str,
    argument: &str,
    previous: &DriftMarkers,
) -> Result<DriftMarkers> {
    let markers = DriftMarkers::new(target_env, argument);
    if *previous != markers {
        unpatch_env(container, previous);
    }

    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter().position(|e| e.name == target_env) {
        None => env.push(EnvVar {
            name: target_env.to_string(),
            value: Some(argument.to_string()),
            ..Default::default()
        }),
        Some(index) if env[index].value_from.is_some() => {
            return Err(AgentError::Validation(format!(
                "env var {} is set from valueFrom and cannot carry the agent argument",
                target_env
            )));
        }
        Some(index) => {
            let value = env[index].value.get_or_insert_with(String::new);
            if !value.contains(argument) {
                value.push(' ');
                value.push_str(argument);
                if value.len() > MAX_AGENT_ARG_LEN {
                    return Err(AgentError::LimitExceeded(target_env.to_string()));
                }
            }
        }
    }

    Ok(markers)
}

/// Remove the fragment recorded in `previous` from the container. The env var is
/// dropped when nothing else is left in it.
pub fn unpatch_env(container: &mut Container, previous: &DriftMarkers) {
    if previous.is_empty() {
        return;
    }
    let Some(env) = container.env.as_mut() else {
        return;
    };
    let Some(index) = env.iter().position(|e| e.name == previous.env_name) else {
        return;
    };

    let remaining = env[index]
        .value
        .as_deref()
        .unwrap_or_default()
        .replace(previous.fragment.as_str(), "")
        .trim()
        .to_string();

    if remaining.is_empty() {
        env.remove(index);
        if env.is_empty() {
            container.env = None;
        }
    } else {
        env[index].value = Some(remaining);
    }
}
