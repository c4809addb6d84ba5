// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Annotation keys written on patched workloads
pub mod annotations {
    /// Name of the LightrunJavaAgent currently managing the workload
    pub const AGENT_NAME: &str = "lightrun.com/lightrunjavaagent";
    /// Env var name that received the agent argument on the last reconcile
    pub const PATCHED_ENV_NAME: &str = "lightrun.com/patched-env-name";
    /// Exact fragment appended to the env var on the last reconcile
    pub const PATCHED_ENV_VALUE: &str = "lightrun.com/patched-env-value";
    /// Hash of the agent config map, set on the pod template to force rollouts
    pub const CONFIG_MAP_HASH: &str = "lightrun.com/configmap-hash";
}

/// The field manager used for server-side apply
pub const FIELD_MANAGER: &str = "lightrun-controller";

/// Finalizer token placed on LightrunJavaAgent resources
pub const FINALIZER: &str = "agent.finalizers.lightrun.com";

/// Java refuses agent options longer than this
pub const MAX_AGENT_ARG_LEN: usize = 1024;

/// Names of the objects injected into the pod template
pub mod injection {
    pub const CONFIG_MAP_PREFIX: &str = "lightrunagent-cm-";
    pub const CONFIG_VOLUME: &str = "lightrunagent-config";
    pub const SECRET_VOLUME: &str = "lightrun-secret";
    pub const LIBSTDC_VOLUME: &str = "lightrun-libstdc";
    pub const INIT_CONTAINER: &str = "lightrun-installer";
    pub const AGENT_SO_PATH: &str = "/agent/lightrun_agent.so";
    pub const SECRET_KEY: &str = "lightrun_key";
    pub const SECRET_CERT_HASH: &str = "pinned_cert_hash";
}

/// Condition types reported in the LightrunJavaAgent status
pub mod conditions {
    pub const READY: &str = "Ready";
    pub const PROGRESSING: &str = "ReconcileProgressing";
    pub const FAILED: &str = "ReconcileFailed";

    pub const REASON_SUCCEEDED: &str = "reconcileSucceeded";
    pub const REASON_FAILED: &str = "reconcileFailed";
}

/// Requeue delays in seconds
pub mod requeue {
    /// After a transport or API error
    pub const ERROR_SECS: u64 = 60;
    /// After a stale resourceVersion on write
    pub const CONFLICT_SECS: u64 = 5;
}

/// CRD polling configuration
pub mod crd {
    pub const GROUP: &str = "agents.lightrun.com";
    pub const VERSION: &str = "v1beta";
    pub const KIND: &str = "LightrunJavaAgent";
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
