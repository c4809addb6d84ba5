// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Building blocks for patching a workload: what to target, what to apply and
//! how to splice the agent into the container env.

pub mod config_map;
pub mod env;
pub mod ownership;
pub mod resolver;
pub mod structural;

pub use config_map::{build_config_artifact, ConfigArtifact};
pub use env::{agent_argument, patch_env, unpatch_env, DriftMarkers};
pub use ownership::check_ownership;
pub use resolver::{resolve_workload, WorkloadTarget};
pub use structural::{build_fragment, check_container_selector, empty_fragment};
