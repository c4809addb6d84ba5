// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deployments and StatefulSets seen through the one capability the patcher needs:
//! a namespaced object carrying a pod template.

use crate::kubernetes::client::NamespacedObject;
use crate::types::WorkloadKind;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Container, PodTemplateSpec};

pub trait PodWorkload: NamespacedObject {
    const KIND: WorkloadKind;

    fn pod_template(&self) -> Option<&PodTemplateSpec>;

    fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec>;

    fn containers(&self) -> &[Container] {
        self.pod_template()
            .and_then(|t| t.spec.as_ref())
            .map(|s| s.containers.as_slice())
            .unwrap_or_default()
    }

    fn containers_mut(&mut self) -> Option<&mut Vec<Container>> {
        self.pod_template_mut()
            .and_then(|t| t.spec.as_mut())
            .map(|s| &mut s.containers)
    }
}

impl PodWorkload for Deployment {
    const KIND: WorkloadKind = WorkloadKind::Deployment;

    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }

    fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        self.spec.as_mut().map(|s| &mut s.template)
    }
}

impl PodWorkload for StatefulSet {
    const KIND: WorkloadKind = WorkloadKind::StatefulSet;

    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }

    fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        self.spec.as_mut().map(|s| &mut s.template)
    }
}
