// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status conditions reported on a LightrunJavaAgent.

use crate::constants::conditions::{FAILED, REASON_FAILED, REASON_SUCCEEDED};
use crate::error::{AgentError, Result};
use crate::kubernetes::ClusterApi;
use crate::types::{Condition, LightrunJavaAgent, LightrunJavaAgentStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use kube::ResourceExt;
use tracing::debug;

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn success_condition(
    condition_type: &str,
    generation: Option<i64>,
    now: DateTime<Utc>,
) -> Condition {
    Condition {
        condition_type: condition_type.to_string(),
        status: "True".to_string(),
        reason: REASON_SUCCEEDED.to_string(),
        message: String::new(),
        observed_generation: generation,
        last_transition_time: timestamp(now),
    }
}

pub fn failure_condition(message: &str, generation: Option<i64>, now: DateTime<Utc>) -> Condition {
    Condition {
        condition_type: FAILED.to_string(),
        status: "True".to_string(),
        reason: REASON_FAILED.to_string(),
        message: message.to_string(),
        observed_generation: generation,
        last_transition_time: timestamp(now),
    }
}

/// Insert the condition, or overwrite the existing one of the same type
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

/// Same condition apart from the transition time
fn same_outcome(a: &Condition, b: &Condition) -> bool {
    a.condition_type == b.condition_type
        && a.status == b.status
        && a.reason == b.reason
        && a.message == b.message
        && a.observed_generation == b.observed_generation
}

/// Type of the condition that transitioned last. The first one wins a tie.
pub fn last_condition_type(conditions: &[Condition]) -> Option<&str> {
    let parsed = |c: &Condition| DateTime::parse_from_rfc3339(&c.last_transition_time).ok();

    let mut latest: Option<&Condition> = None;
    for condition in conditions {
        match latest {
            Some(current) if parsed(condition) <= parsed(current) => {}
            _ => latest = Some(condition),
        }
    }
    latest.map(|c| c.condition_type.as_str())
}

/// Status of `agent` after recording `condition`. Reporting the outcome that is
/// already the latest one leaves the status as it is.
pub fn updated_status(agent: &LightrunJavaAgent, condition: Condition) -> LightrunJavaAgentStatus {
    let mut status = agent.status.clone().unwrap_or_default();
    let latest = last_condition_type(&status.conditions);
    let unchanged = latest == Some(condition.condition_type.as_str())
        && status.workload_status.as_deref() == latest
        && status
            .conditions
            .iter()
            .any(|existing| same_outcome(existing, &condition));
    if unchanged {
        return status;
    }

    set_condition(&mut status.conditions, condition);

    let workload_status = last_condition_type(&status.conditions).map(String::from);
    status.deployment_status = workload_status.clone();
    status.workload_status = workload_status;
    status
}

/// Record `condition` through the status subresource. An agent that is already
/// gone has nothing left to report on.
pub async fn write_status<C: ClusterApi>(
    api: &C,
    agent: &LightrunJavaAgent,
    condition: Condition,
) -> Result<()> {
    let status = updated_status(agent, condition);
    if agent.status.as_ref() == Some(&status) {
        debug!("Status of LightrunJavaAgent {} is unchanged", agent.name_any());
        return Ok(());
    }

    match api.patch_status(agent, serde_json::to_value(status)?).await {
        Ok(_) => Ok(()),
        Err(AgentError::NotFound(_)) => {
            debug!("LightrunJavaAgent {} is gone, skipping status update", agent.name_any());
            Ok(())
        }
        Err(e) => Err(e),
    }
}
