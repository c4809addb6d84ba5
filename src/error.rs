// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{kind} already patched by LightrunJavaAgent {owner}")]
    OwnershipConflict { kind: String, owner: String },

    #[error("{0} has more than 1024 chars. This is a limitation of Java")]
    LimitExceeded(String),

    #[error("resource version expired for {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Stale resourceVersion on write; the reconcile is simply run again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AgentError::Conflict(_))
    }

    /// Errors that will not go away by retrying until the inputs change.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AgentError::Validation(_)
                | AgentError::NotFound(_)
                | AgentError::OwnershipConflict { .. }
                | AgentError::LimitExceeded(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
