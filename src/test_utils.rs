// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock HTTP backend for kube clients, an in-memory cluster and
//! fixtures for agents and workloads.

use crate::error::{AgentError, Result};
use crate::kubernetes::client::{optimistic_merge_patch, ClusterApi, NamespacedObject};
use crate::types::{AgentInitContainer, LightrunJavaAgent, LightrunJavaAgentSpec, WorkloadKind};
use async_trait::async_trait;
use http::{Request, Response};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::core::ErrorResponse;
use kube::{Client, Resource};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for PATCH requests matching the exact path
    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        // Try exact match first
        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Try prefix match for subresources like .../status
        for ((m, p), resp) in responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let response = self.find_response(&method, &path);

        Box::pin(async move {
            let (status, body) = response.unwrap_or_else(|| (404, not_found_json("", "")));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

fn pod_template_json(name: &str, containers: &[&str]) -> Value {
    let containers: Vec<Value> = containers
        .iter()
        .map(|c| json!({ "name": c, "image": format!("{}:latest", c) }))
        .collect();
    json!({
        "metadata": { "labels": { "app": name } },
        "spec": { "containers": containers },
    })
}

/// Create a Deployment JSON object with one `<name>:latest` image per container
pub fn deployment_json(name: &str, namespace: &str, resource_version: &str, containers: &[&str]) -> String {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("{}-uid", name),
            "resourceVersion": resource_version,
        },
        "spec": {
            "replicas": 1,
            "selector": { "matchLabels": { "app": name } },
            "template": pod_template_json(name, containers),
        },
    })
    .to_string()
}

/// Create a StatefulSet JSON object with one `<name>:latest` image per container
pub fn statefulset_json(name: &str, namespace: &str, resource_version: &str, containers: &[&str]) -> String {
    json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("{}-uid", name),
            "resourceVersion": resource_version,
        },
        "spec": {
            "serviceName": name,
            "selector": { "matchLabels": { "app": name } },
            "template": pod_template_json(name, containers),
        },
    })
    .to_string()
}

/// Agent patching container `app` of Deployment `workload`
pub fn make_agent(name: &str, namespace: &str, workload: &str) -> LightrunJavaAgent {
    LightrunJavaAgent {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{}-uid", name)),
            generation: Some(1),
            ..Default::default()
        },
        spec: LightrunJavaAgentSpec {
            container_selector: vec!["app".to_string()],
            init_container: AgentInitContainer {
                shared_volume_name: "lightrun-agent-init".to_string(),
                shared_volume_mount_path: "/lightrun".to_string(),
                image: "lightruncom/k8s-operator-init-java-agent-linux:latest".to_string(),
                image_pull_policy: Some("IfNotPresent".to_string()),
            },
            workload_name: Some(workload.to_string()),
            workload_type: Some(WorkloadKind::Deployment),
            secret_name: "lightrun-secrets".to_string(),
            agent_env_var_name: "JAVA_TOOL_OPTIONS".to_string(),
            server_hostname: "https://app.lightrun.com".to_string(),
            agent_config: Some(BTreeMap::from([(
                "max_log_cpu_cost".to_string(),
                "2".to_string(),
            )])),
            agent_tags: vec!["prod".to_string()],
            agent_name: Some(format!("{}-display", name)),
            ..Default::default()
        },
        status: None,
    }
}

pub fn make_secret(name: &str, namespace: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

type ObjectKey = (String, String, String);

struct StoredObject {
    live: Value,
    /// State written by everyone except the operator's field manager
    seed: Value,
    /// Last fragment applied by the operator's field manager
    applied: Option<Value>,
}

#[derive(Default)]
struct FakeState {
    objects: HashMap<ObjectKey, StoredObject>,
    resource_version: u64,
    pending_conflicts: usize,
    pending_apply_failures: usize,
    writes: Vec<String>,
}

impl FakeState {
    fn bump(&mut self, key: &ObjectKey) {
        self.resource_version += 1;
        if let Some(stored) = self.objects.get_mut(key) {
            stored.live["metadata"]["resourceVersion"] = json!(self.resource_version.to_string());
        }
    }
}

/// In-memory [`ClusterApi`].
///
/// Server-side apply is emulated for one field manager: fields from the previous
/// fragment that the new fragment and the other writers (the seed) do not set are
/// removed, then the new fragment is merged in. Lists of objects are merged by
/// `name` (`mountPath` for volume mounts). Merge patches are RFC 7386 and checked
/// against the stored resourceVersion.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

fn object_key<K: NamespacedObject>(namespace: &str, name: &str) -> ObjectKey {
    (K::kind(&()).to_string(), namespace.to_string(), name.to_string())
}

fn describe(verb: &str, key: &ObjectKey) -> String {
    format!("{} {}/{}", verb, key.0, key.2)
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object as written by another actor
    pub fn insert<K: NamespacedObject>(&self, object: &K) {
        let key = object_key::<K>(
            &object.meta().namespace.clone().unwrap_or_default(),
            &object.meta().name.clone().unwrap_or_default(),
        );
        let value = serde_json::to_value(object).unwrap();

        let mut state = self.state.lock().unwrap();
        state.objects.insert(
            key.clone(),
            StoredObject {
                live: value.clone(),
                seed: value,
                applied: None,
            },
        );
        state.bump(&key);
    }

    /// Change an object as another actor would
    pub fn edit<K: NamespacedObject>(&self, namespace: &str, name: &str, f: impl Fn(&mut Value)) {
        let key = object_key::<K>(namespace, name);
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let stored = state.objects.get_mut(&key).unwrap();
        f(&mut stored.live);
        f(&mut stored.seed);
        state.bump(&key);
    }

    pub fn remove<K: NamespacedObject>(&self, namespace: &str, name: &str) {
        let key = object_key::<K>(namespace, name);
        self.state.lock().unwrap().objects.remove(&key);
    }

    pub fn object<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Option<K> {
        self.raw::<K>(namespace, name)
            .map(|value| serde_json::from_value(value).unwrap())
    }

    pub fn raw<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Option<Value> {
        let key = object_key::<K>(namespace, name);
        let state = self.state.lock().unwrap();
        state.objects.get(&key).map(|stored| stored.live.clone())
    }

    /// Fail the next merge patch with a stale resourceVersion
    pub fn conflict_on_next_merge_patch(&self) {
        self.state.lock().unwrap().pending_conflicts += 1;
    }

    /// Fail the next server-side apply with an internal server error
    pub fn fail_next_apply(&self) {
        self.state.lock().unwrap().pending_apply_failures += 1;
    }

    /// Writes so far, as `"<verb> <Kind>/<name>"`
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        match self.raw::<K>(namespace, name) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn apply<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        fragment: &Value,
    ) -> Result<()> {
        let key = object_key::<K>(namespace, name);
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.writes.push(describe("apply", &key));
        if state.pending_apply_failures > 0 {
            state.pending_apply_failures -= 1;
            return Err(AgentError::KubeError(kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: "etcdserver: request timed out".to_string(),
                reason: "InternalError".to_string(),
                code: 500,
            })));
        }

        let changed = match state.objects.get_mut(&key) {
            Some(stored) => {
                let before = stored.live.clone();
                if let Some(previous) = stored.applied.take() {
                    prune(&mut stored.live, &previous, Some(fragment), Some(&stored.seed), "");
                }
                apply_merge(&mut stored.live, fragment, "");
                stored.applied = Some(fragment.clone());
                stored.live != before
            }
            None => {
                state.objects.insert(
                    key.clone(),
                    StoredObject {
                        live: fragment.clone(),
                        seed: json!({}),
                        applied: Some(fragment.clone()),
                    },
                );
                true
            }
        };
        if changed {
            state.bump(&key);
        }
        Ok(())
    }

    async fn merge_patch<K: NamespacedObject>(&self, original: &K, mutated: &K) -> Result<K> {
        let Some(patch) = optimistic_merge_patch(original, mutated)? else {
            return Ok(mutated.clone());
        };
        let key = object_key::<K>(
            &original.meta().namespace.clone().unwrap_or_default(),
            &original.meta().name.clone().unwrap_or_default(),
        );

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.writes.push(describe("merge", &key));
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(AgentError::Conflict(format!("{}/{}", key.0, key.2)));
        }
        let Some(stored) = state.objects.get_mut(&key) else {
            return Err(AgentError::NotFound(format!("{} {}", key.0.to_lowercase(), key.2)));
        };
        if stored.live["metadata"]["resourceVersion"] != patch["metadata"]["resourceVersion"] {
            return Err(AgentError::Conflict(format!("{}/{}", key.0, key.2)));
        }

        let before = stored.live.clone();
        json_patch::merge(&mut stored.live, &patch);
        let merged = stored.live.clone();

        let finalized = merged["metadata"]
            .get("finalizers")
            .and_then(Value::as_array)
            .map_or(true, |f| f.is_empty());
        if merged["metadata"].get("deletionTimestamp").is_some() && finalized {
            state.objects.remove(&key);
            return Ok(serde_json::from_value(merged)?);
        }

        if merged != before {
            state.bump(&key);
        }
        let live = state.objects[&key].live.clone();
        Ok(serde_json::from_value(live)?)
    }

    async fn patch_status<K: NamespacedObject>(&self, object: &K, status: Value) -> Result<K> {
        let key = object_key::<K>(
            &object.meta().namespace.clone().unwrap_or_default(),
            &object.meta().name.clone().unwrap_or_default(),
        );

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.writes.push(describe("status", &key));
        let Some(stored) = state.objects.get_mut(&key) else {
            return Err(AgentError::NotFound(format!("{} {}", key.0.to_lowercase(), key.2)));
        };
        if let Some(rv) = &object.meta().resource_version {
            if stored.live["metadata"]["resourceVersion"] != json!(rv) {
                return Err(AgentError::Conflict(format!("{}/{}", key.0, key.2)));
            }
        }

        let changed = stored.live["status"] != status;
        stored.live["status"] = status;
        if changed {
            state.bump(&key);
        }
        let live = state.objects[&key].live.clone();
        Ok(serde_json::from_value(live)?)
    }
}

/// Merge key for a list field, `None` for lists replaced as a whole
fn list_key(field: &str) -> Option<&'static str> {
    match field {
        "volumeMounts" => Some("mountPath"),
        "items" | "drop" | "finalizers" => None,
        _ => Some("name"),
    }
}

fn keyed_list<'a>(value: &'a Value, field: &str) -> Option<(&'a Vec<Value>, &'static str)> {
    let list = value.as_array()?;
    let key = list_key(field)?;
    list.iter()
        .all(|item| item.get(key).is_some())
        .then_some((list, key))
}

fn find_item<'a>(list: &'a Value, key: &str, id: &Value) -> Option<&'a Value> {
    list.as_array()?.iter().find(|item| item.get(key) == Some(id))
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(list) => list.is_empty(),
        _ => false,
    }
}

/// Drop fields of `previous` from `live` unless `next` or `seed` still set them
fn prune(live: &mut Value, previous: &Value, next: Option<&Value>, seed: Option<&Value>, field: &str) {
    if let (Value::Object(live), Value::Object(previous)) = (&mut *live, previous) {
        for (k, prev) in previous {
            let next = next.and_then(|n| n.get(k));
            let seed = seed.and_then(|s| s.get(k));
            let Some(current) = live.get_mut(k) else {
                continue;
            };
            if prev.is_object() || keyed_list(prev, k).is_some() {
                prune(current, prev, next, seed, k);
                if next.is_none() && seed.is_none() && is_empty_container(current) {
                    live.remove(k);
                }
            } else if next.is_none() && seed.is_none() {
                live.remove(k);
            }
        }
        return;
    }

    let (Value::Array(live), Some((previous, key))) = (live, keyed_list(previous, field)) else {
        return;
    };
    for prev in previous {
        let id = &prev[key];
        let next = next.and_then(|n| find_item(n, key, id));
        let seed = seed.and_then(|s| find_item(s, key, id));
        let Some(index) = live.iter().position(|item| item.get(key) == Some(id)) else {
            continue;
        };
        if next.is_none() && seed.is_none() {
            live.remove(index);
        } else {
            prune(&mut live[index], prev, next, seed, "");
        }
    }
}

/// Merge `fragment` into `live`, lists of objects by key
fn apply_merge(live: &mut Value, fragment: &Value, field: &str) {
    if let (Value::Object(live), Value::Object(fragment)) = (&mut *live, fragment) {
        for (k, value) in fragment {
            match live.get_mut(k) {
                Some(existing) => apply_merge(existing, value, k),
                None => {
                    live.insert(k.clone(), value.clone());
                }
            }
        }
        return;
    }

    if let (Value::Array(items), Some((fragment_items, key))) =
        (&mut *live, keyed_list(fragment, field))
    {
        for item in fragment_items {
            let id = &item[key];
            match items.iter_mut().find(|existing| existing.get(key) == Some(id)) {
                Some(existing) => apply_merge(existing, item, ""),
                None => items.push(item.clone()),
            }
        }
        return;
    }

    *live = fragment.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;

    fn seeded() -> FakeCluster {
        let cluster = FakeCluster::new();
        let deployment: Deployment =
            serde_json::from_str(&deployment_json("app", "default", "1", &["app"])).unwrap();
        cluster.insert(&deployment);
        cluster
    }

    fn fragment(volumes: &[&str]) -> Value {
        let volumes: Vec<Value> = volumes.iter().map(|v| json!({"name": v, "emptyDir": {}})).collect();
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "app", "namespace": "default" },
            "spec": { "template": { "spec": {
                "volumes": volumes,
                "containers": [{ "name": "app", "volumeMounts": [{"name": "a", "mountPath": "/a"}] }],
            }}},
        })
    }

    #[tokio::test]
    async fn test_apply_removes_fields_dropped_from_fragment() {
        let cluster = seeded();
        cluster.apply::<Deployment>("default", "app", &fragment(&["a", "b"])).await.unwrap();
        cluster.apply::<Deployment>("default", "app", &fragment(&["a"])).await.unwrap();

        let live = cluster.raw::<Deployment>("default", "app").unwrap();
        let pod = &live["spec"]["template"]["spec"];
        assert_eq!(pod["volumes"].as_array().unwrap().len(), 1);
        assert_eq!(pod["containers"][0]["image"], "app:latest");
    }

    #[tokio::test]
    async fn test_reapply_does_not_bump_resource_version() {
        let cluster = seeded();
        cluster.apply::<Deployment>("default", "app", &fragment(&["a"])).await.unwrap();
        let rv = cluster.raw::<Deployment>("default", "app").unwrap()["metadata"]["resourceVersion"].clone();

        cluster.apply::<Deployment>("default", "app", &fragment(&["a"])).await.unwrap();
        let live = cluster.raw::<Deployment>("default", "app").unwrap();
        assert_eq!(live["metadata"]["resourceVersion"], rv);
    }

    #[tokio::test]
    async fn test_empty_apply_restores_seed() {
        let cluster = seeded();
        let seed = cluster.raw::<Deployment>("default", "app").unwrap();
        cluster.apply::<Deployment>("default", "app", &fragment(&["a"])).await.unwrap();

        let empty = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "app", "namespace": "default" },
        });
        cluster.apply::<Deployment>("default", "app", &empty).await.unwrap();

        let mut live = cluster.raw::<Deployment>("default", "app").unwrap();
        live["metadata"]["resourceVersion"] = seed["metadata"]["resourceVersion"].clone();
        assert_eq!(live, seed);
    }

    #[tokio::test]
    async fn test_merge_patch_with_stale_version_conflicts() {
        let cluster = seeded();
        let original: Deployment = cluster.object("default", "app").unwrap();
        cluster.edit::<Deployment>("default", "app", |v| v["spec"]["replicas"] = json!(3));

        let mut mutated = original.clone();
        mutated.spec.as_mut().unwrap().replicas = Some(2);
        let err = cluster.merge_patch(&original, &mutated).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
