// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The agent config map, built fresh from the spec on every reconcile.

use crate::constants::injection::CONFIG_MAP_PREFIX;
use crate::error::Result;
use crate::types::LightrunJavaAgent;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{api::ObjectMeta, Resource, ResourceExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Serialize)]
struct AgentMetadata<'a> {
    registration: Registration<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Registration<'a> {
    display_name: &'a str,
    tags: Vec<Tag<'a>>,
}

#[derive(Serialize)]
struct Tag<'a> {
    name: &'a str,
}

/// Config map for an agent plus the hash stamped on the pod template
#[derive(Debug, Clone)]
pub struct ConfigArtifact {
    pub config_map: ConfigMap,
    pub hash: String,
}

pub fn config_map_name(agent_name: &str) -> String {
    format!("{}{}", CONFIG_MAP_PREFIX, agent_name)
}

/// `key=value` lines, sorted by key so equal configs always render the same
pub fn agent_config_lines(config: &BTreeMap<String, String>) -> String {
    config
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
}

pub fn agent_metadata(display_name: &str, tags: &[String]) -> Result<String> {
    let metadata = AgentMetadata {
        registration: Registration {
            display_name,
            tags: tags.iter().map(|t| Tag { name: t.as_str() }).collect(),
        },
    };
    Ok(serde_json::to_string(&metadata)?)
}

/// Short content hash over the config map values, in key order
pub fn content_hash(data: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for value in data.values() {
        hasher.update(value.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Build the config map owned by `agent`
pub fn build_config_artifact(agent: &LightrunJavaAgent) -> Result<ConfigArtifact> {
    let spec = &agent.spec;
    let config = spec.agent_config.clone().unwrap_or_default();
    let display_name = spec.agent_name.as_deref().unwrap_or_default();

    let data = BTreeMap::from([
        ("config".to_string(), agent_config_lines(&config)),
        (
            "metadata".to_string(),
            agent_metadata(display_name, &spec.agent_tags)?,
        ),
    ]);
    let hash = content_hash(&data);

    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(&agent.name_any())),
            namespace: agent.namespace(),
            owner_references: agent.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };

    Ok(ConfigArtifact { config_map, hash })
}
