// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, cluster API access, and workload access.

pub mod client;
pub mod crd;
pub mod workload;

pub use client::{ClusterApi, KubeClusterApi, NamespacedObject};
pub use crd::wait_for_agent_crd;
pub use workload::PodWorkload;
