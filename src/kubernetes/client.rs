// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster API access used by the reconciler.
//!
//! Everything the reconciler reads or writes goes through [`ClusterApi`], so the
//! state machine can run against the real API server or an in-memory fake.

use crate::constants::FIELD_MANAGER;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::Debug;
use tracing::debug;

/// A typed, namespaced Kubernetes object the operator reads or writes.
pub trait NamespacedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> NamespacedObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    async fn get<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Server-side apply `fragment` as the operator's field manager, forcing ownership
    async fn apply<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        fragment: &Value,
    ) -> Result<()>;

    /// Merge patch the difference between `original` and `mutated`, guarded by the
    /// resourceVersion of `original`. Returns the object as stored afterwards.
    async fn merge_patch<K: NamespacedObject>(&self, original: &K, mutated: &K) -> Result<K>;

    /// Replace the status subresource, guarded by the resourceVersion of `object`
    async fn patch_status<K: NamespacedObject>(&self, object: &K, status: Value) -> Result<K>;
}

/// [`ClusterApi`] backed by a kube [`Client`]
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: NamespacedObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn apply<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        fragment: &Value,
    ) -> Result<()> {
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        self.api::<K>(namespace)
            .patch(name, &pp, &Patch::Apply(fragment))
            .await
            .map_err(|e| write_error::<K>(e, name))?;
        Ok(())
    }

    async fn merge_patch<K: NamespacedObject>(&self, original: &K, mutated: &K) -> Result<K> {
        let name = original.name_any();
        let Some(patch) = optimistic_merge_patch(original, mutated)? else {
            debug!("No changes for {}/{}, skipping patch", K::kind(&()), name);
            return Ok(mutated.clone());
        };

        let namespace = original.namespace().unwrap_or_default();
        self.api::<K>(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| write_error::<K>(e, &name))
    }

    async fn patch_status<K: NamespacedObject>(&self, object: &K, status: Value) -> Result<K> {
        let name = object.name_any();
        let namespace = object.namespace().unwrap_or_default();
        let patch = json!({
            "metadata": { "resourceVersion": object.resource_version() },
            "status": status,
        });

        self.api::<K>(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| write_error::<K>(e, &name))
    }
}

/// Map write failures onto the operator's error taxonomy
fn write_error<K: NamespacedObject>(err: kube::Error, name: &str) -> AgentError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => {
            AgentError::Conflict(format!("{}/{}", K::kind(&()), name))
        }
        kube::Error::Api(resp) if resp.code == 404 => {
            AgentError::NotFound(format!("{} {}", K::kind(&()).to_lowercase(), name))
        }
        e => AgentError::KubeError(e),
    }
}

/// Build a JSON merge patch from `original` to `mutated`, pinned to the
/// resourceVersion of `original`. `None` when the two are identical.
pub fn optimistic_merge_patch<K: NamespacedObject>(
    original: &K,
    mutated: &K,
) -> Result<Option<Value>> {
    let mut patch = merge_diff(&serde_json::to_value(original)?, &serde_json::to_value(mutated)?);
    if patch.as_object().is_some_and(|m| m.is_empty()) {
        return Ok(None);
    }
    patch["metadata"]["resourceVersion"] = json!(original.resource_version());
    Ok(Some(patch))
}

/// RFC 7386 merge patch turning `original` into `mutated`. Arrays are replaced whole.
pub fn merge_diff(original: &Value, mutated: &Value) -> Value {
    let (Value::Object(old), Value::Object(new)) = (original, mutated) else {
        return mutated.clone();
    };

    let mut patch = Map::new();
    for (key, old_value) in old {
        match new.get(key) {
            None => {
                patch.insert(key.clone(), Value::Null);
            }
            Some(new_value) if new_value != old_value => {
                let value = if old_value.is_object() && new_value.is_object() {
                    merge_diff(old_value, new_value)
                } else {
                    new_value.clone()
                };
                patch.insert(key.clone(), value);
            }
            Some(_) => {}
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            patch.insert(key.clone(), new_value.clone());
        }
    }
    Value::Object(patch)
}
