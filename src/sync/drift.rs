// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Fields the engine re-asserts on objects that already exist.

use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// Re-assert the controller reference; true if the metadata was changed
pub fn reassert_owner(meta: &mut ObjectMeta, owner: &OwnerReference) -> bool {
    let owned = meta
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == owner.uid));
    if owned {
        return false;
    }
    meta.owner_references = Some(vec![owner.clone()]);
    true
}

/// Declaration-derived fields copied from the desired object onto an existing one
pub trait Reassert {
    /// Returns true if `self` was modified
    fn reassert_fields(&mut self, _desired: &Self) -> bool {
        false
    }
}

impl Reassert for ServiceAccount {}
impl Reassert for Service {}
impl Reassert for Secret {}

impl Reassert for MutatingWebhookConfiguration {
    // The trust anchor follows the certificate the webhook currently serves.
    fn reassert_fields(&mut self, desired: &Self) -> bool {
        let Some(desired_hooks) = desired.webhooks.as_ref() else {
            return false;
        };
        let Some(hooks) = self.webhooks.as_mut() else {
            self.webhooks = Some(desired_hooks.clone());
            return true;
        };

        let mut changed = false;
        for hook in hooks.iter_mut() {
            if let Some(wanted) = desired_hooks.iter().find(|d| d.name == hook.name) {
                changed |= replace_if_different(
                    &mut hook.client_config.ca_bundle,
                    &wanted.client_config.ca_bundle,
                );
            }
        }
        changed
    }
}

impl Reassert for Role {
    fn reassert_fields(&mut self, desired: &Self) -> bool {
        replace_if_different(&mut self.rules, &desired.rules)
    }
}

impl Reassert for ClusterRole {
    fn reassert_fields(&mut self, desired: &Self) -> bool {
        replace_if_different(&mut self.rules, &desired.rules)
    }
}

impl Reassert for RoleBinding {
    fn reassert_fields(&mut self, desired: &Self) -> bool {
        let subjects = replace_if_different(&mut self.subjects, &desired.subjects);
        let role_ref = replace_if_different(&mut self.role_ref, &desired.role_ref);
        subjects || role_ref
    }
}

impl Reassert for ClusterRoleBinding {
    fn reassert_fields(&mut self, desired: &Self) -> bool {
        let subjects = replace_if_different(&mut self.subjects, &desired.subjects);
        let role_ref = replace_if_different(&mut self.role_ref, &desired.role_ref);
        subjects || role_ref
    }
}

impl Reassert for DaemonSet {
    // The token audience reaches the webhook only through the container command.
    fn reassert_fields(&mut self, desired: &Self) -> bool {
        let Some(desired_command) = desired
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|pod| pod.containers.first())
            .and_then(|container| container.command.as_ref())
        else {
            return false;
        };

        let Some(container) = self
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .and_then(|pod| pod.containers.first_mut())
        else {
            return false;
        };

        if container.command.as_ref() == Some(desired_command) {
            return false;
        }
        container.command = Some(desired_command.clone());
        true
    }
}

fn replace_if_different<T: PartialEq + Clone>(current: &mut T, desired: &T) -> bool {
    if current == desired {
        return false;
    }
    *current = desired.clone();
    true
}
