// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Server-side apply fragments for the volumes, init container and app container
//! mounts the operator owns on a workload.
//!
//! Only the fields listed here are ever sent under the operator's field manager.
//! Applying [`empty_fragment`] later drops all of them again.

use crate::constants::{annotations, injection};
use crate::error::{AgentError, Result};
use crate::kubernetes::PodWorkload;
use crate::patch::config_map::config_map_name;
use crate::types::LightrunJavaAgent;
use kube::ResourceExt;
use serde_json::{json, Value};

const LIBSTDC_PATH: &str = "/tmp/libstdc";
const INIT_RESOURCES_CPU: &str = "50m";
const INIT_RESOURCES_MEMORY: &str = "64M";

/// Full desired state owned by the operator on `workload`
pub fn build_fragment<W: PodWorkload>(
    agent: &LightrunJavaAgent,
    workload: &W,
    secret_name: &str,
    config_hash: &str,
) -> Result<Value> {
    let containers = app_containers(agent, workload)?;

    Ok(json!({
        "apiVersion": W::api_version(&()),
        "kind": W::kind(&()),
        "metadata": {
            "name": workload.name_any(),
            "namespace": workload.namespace(),
            "annotations": { annotations::AGENT_NAME: agent.name_any() },
        },
        "spec": {
            "template": {
                "metadata": {
                    "annotations": { annotations::CONFIG_MAP_HASH: config_hash },
                },
                "spec": {
                    "volumes": volumes(agent, secret_name),
                    "initContainers": [init_container(agent, secret_name)],
                    "containers": containers,
                },
            },
        },
    }))
}

/// Apply body that owns nothing; applying it removes everything applied before
pub fn empty_fragment<W: PodWorkload>(namespace: &str, name: &str) -> Value {
    json!({
        "apiVersion": W::api_version(&()),
        "kind": W::kind(&()),
        "metadata": { "name": name, "namespace": namespace },
    })
}

/// Fail unless at least one container of the workload is selected
pub fn check_container_selector<W: PodWorkload>(
    agent: &LightrunJavaAgent,
    workload: &W,
) -> Result<()> {
    if workload
        .containers()
        .iter()
        .any(|c| agent.selects_container(&c.name))
    {
        Ok(())
    } else {
        Err(AgentError::Validation(
            "unable to find matching container to patch".to_string(),
        ))
    }
}

fn volumes(agent: &LightrunJavaAgent, secret_name: &str) -> Vec<Value> {
    let init = &agent.spec.init_container;
    let mut volumes = vec![
        json!({ "name": init.shared_volume_name, "emptyDir": {} }),
        json!({
            "name": injection::CONFIG_VOLUME,
            "configMap": {
                "name": config_map_name(&agent.name_any()),
                "items": [
                    { "key": "config", "path": "agent.config" },
                    { "key": "metadata", "path": "agent.metadata.json" },
                ],
            },
        }),
    ];

    if agent.secrets_as_files() {
        volumes.push(json!({
            "name": injection::SECRET_VOLUME,
            "secret": {
                "secretName": secret_name,
                "items": [
                    { "key": injection::SECRET_KEY, "path": injection::SECRET_KEY },
                    { "key": injection::SECRET_CERT_HASH, "path": injection::SECRET_CERT_HASH },
                ],
                "defaultMode": 0o440,
            },
        }));
    }
    if agent.mount_libstdc() {
        volumes.push(json!({ "name": injection::LIBSTDC_VOLUME, "emptyDir": {} }));
    }
    volumes
}

fn init_container(agent: &LightrunJavaAgent, secret_name: &str) -> Value {
    let spec = &agent.spec;

    let mut volume_mounts = vec![
        json!({ "name": spec.init_container.shared_volume_name, "mountPath": "/tmp/" }),
        json!({ "name": injection::CONFIG_VOLUME, "mountPath": "/tmp/cm/" }),
    ];
    if agent.secrets_as_files() {
        volume_mounts.push(json!({
            "name": injection::SECRET_VOLUME,
            "mountPath": "/etc/lightrun/secret",
            "readOnly": true,
        }));
    }
    if agent.mount_libstdc() {
        volume_mounts.push(json!({ "name": injection::LIBSTDC_VOLUME, "mountPath": "/tmp/libstdc/" }));
    }

    let mut env = vec![json!({ "name": "LIGHTRUN_SERVER", "value": spec.server_hostname })];
    if !agent.secrets_as_files() {
        env.push(secret_env("LIGHTRUN_KEY", secret_name, injection::SECRET_KEY));
        env.push(secret_env("PINNED_CERT", secret_name, injection::SECRET_CERT_HASH));
    }
    if agent.mount_libstdc() {
        env.push(json!({ "name": "MOUNT_LIBSTDC", "value": "true" }));
    }

    let resources = json!({ "cpu": INIT_RESOURCES_CPU, "memory": INIT_RESOURCES_MEMORY });
    let mut container = json!({
        "name": injection::INIT_CONTAINER,
        "image": spec.init_container.image,
        "volumeMounts": volume_mounts,
        "env": env,
        "securityContext": {
            "capabilities": { "drop": ["ALL"] },
            "runAsNonRoot": true,
            "allowPrivilegeEscalation": false,
            "seccompProfile": { "type": "RuntimeDefault" },
        },
        "resources": { "limits": resources.clone(), "requests": resources },
    });

    if let Some(policy) = spec
        .init_container
        .image_pull_policy
        .as_deref()
        .filter(|p| !p.is_empty())
    {
        container["imagePullPolicy"] = json!(policy);
    }
    container
}

fn secret_env(name: &str, secret_name: &str, key: &str) -> Value {
    json!({
        "name": name,
        "valueFrom": { "secretKeyRef": { "name": secret_name, "key": key } },
    })
}

fn app_containers<W: PodWorkload>(agent: &LightrunJavaAgent, workload: &W) -> Result<Vec<Value>> {
    check_container_selector(agent, workload)?;

    let init = &agent.spec.init_container;
    let containers = workload
        .containers()
        .iter()
        .filter(|c| agent.selects_container(&c.name))
        .map(|c| {
            let mut volume_mounts = vec![json!({
                "name": init.shared_volume_name,
                "mountPath": init.shared_volume_mount_path,
            })];
            if agent.mount_libstdc() {
                volume_mounts.push(json!({
                    "name": injection::LIBSTDC_VOLUME,
                    "mountPath": LIBSTDC_PATH,
                    "readOnly": true,
                }));
            }

            let mut container = json!({ "name": c.name, "volumeMounts": volume_mounts });
            if let Some(image) = &c.image {
                container["image"] = json!(image);
            }
            if agent.mount_libstdc() {
                container["env"] = json!([{ "name": "LD_LIBRARY_PATH", "value": LIBSTDC_PATH }]);
            }
            container
        })
        .collect();

    Ok(containers)
}
