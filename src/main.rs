// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lightrun_operator::config::Config;
use lightrun_operator::kubernetes::wait_for_agent_crd;
use lightrun_operator::reconcilers::AgentReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Lightrun operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: watch_namespaces={:?}",
        config.watch_namespaces
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Wait for the LightrunJavaAgent CRD before starting the reconciler
    info!("Waiting for LightrunJavaAgent CRD to become available...");
    wait_for_agent_crd(&client).await?;

    info!("Starting reconciler...");
    AgentReconciler::new(client, config).run().await?;

    info!("Reconciler stopped, shutting down");
    Ok(())
}
