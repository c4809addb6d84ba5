// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Agent reconciler - watches LightrunJavaAgent resources together with the
//! Deployments, StatefulSets and Secrets they reference.

use crate::config::Config;
use crate::constants::requeue;
use crate::error::{AgentError, Result};
use crate::kubernetes::{KubeClusterApi, NamespacedObject};
use crate::reconcilers::index::{
    agents_referencing, DEPLOYMENT_INDEXES, SECRET_INDEXES, STATEFULSET_INDEXES,
};
use crate::reconcilers::patcher::reconcile_agent;
use crate::types::LightrunJavaAgent;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct AgentReconciler {
    client: Client,
    config: Config,
}

struct Context {
    api: KubeClusterApi,
}

impl AgentReconciler {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let context = Arc::new(Context {
            api: KubeClusterApi::new(self.client.clone()),
        });

        if self.config.watches_all_namespaces() {
            info!("Watching LightrunJavaAgents in all namespaces");
            run_controller(self.client.clone(), None, context).await;
        } else {
            info!(
                "Watching LightrunJavaAgents in namespaces: {}",
                self.config.watch_namespaces.join(", ")
            );
            futures::future::join_all(self.config.watch_namespaces.iter().map(|namespace| {
                run_controller(self.client.clone(), Some(namespace.as_str()), context.clone())
            }))
            .await;
        }

        Ok(())
    }
}

fn scoped_api<K: NamespacedObject>(client: Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    }
}

async fn run_controller(client: Client, namespace: Option<&str>, context: Arc<Context>) {
    let agents: Api<LightrunJavaAgent> = scoped_api(client.clone(), namespace);
    let controller = Controller::new(agents, WatcherConfig::default());
    let store = controller.store();

    let deployment_store = store.clone();
    let statefulset_store = store.clone();
    let secret_store = store;

    controller
        .watches(
            scoped_api::<Deployment>(client.clone(), namespace),
            WatcherConfig::default(),
            move |deployment| {
                agents_referencing(&deployment_store.state(), &deployment, DEPLOYMENT_INDEXES)
            },
        )
        .watches(
            scoped_api::<StatefulSet>(client.clone(), namespace),
            WatcherConfig::default(),
            move |sts| agents_referencing(&statefulset_store.state(), &sts, STATEFULSET_INDEXES),
        )
        .watches(
            scoped_api::<Secret>(client, namespace),
            WatcherConfig::default(),
            move |secret| agents_referencing(&secret_store.state(), &secret, SECRET_INDEXES),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!("Reconciled LightrunJavaAgent: {:?}", o),
                Err(e) => warn!("Reconciliation error: {:?}", e),
            }
        })
        .await;
}

#[instrument(skip(agent, ctx), fields(name = %agent.name_any(), namespace = %agent.namespace().unwrap_or_default()))]
async fn reconcile(agent: Arc<LightrunJavaAgent>, ctx: Arc<Context>) -> Result<Action> {
    debug!("Reconciling LightrunJavaAgent");
    reconcile_agent(&ctx.api, &agent).await
}

fn error_policy(_agent: Arc<LightrunJavaAgent>, error: &AgentError, _ctx: Arc<Context>) -> Action {
    error!("Reconciliation error: {}", error);
    Action::requeue(Duration::from_secs(requeue::ERROR_SECS))
}
