// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Desired state of every object the installer manages.
//!
//! Generators are pure: all declaration-derived input is passed in through
//! [`GeneratorContext`] and the dependency objects, so calling a generator
//! twice with the same inputs yields the same object.

pub mod admission;
pub mod endpoint;
pub mod identity;
pub mod secret;
pub mod workload;

pub use admission::mutating_webhook_configuration;
pub use endpoint::service;
pub use identity::{cluster_role, cluster_role_binding, role, role_binding, service_account};
pub use secret::tls_secret;
pub use workload::{daemon_set, webhook_command};

use crate::constants::{labels, OPERATOR_NAME};
use crate::error::{InstallerError, Result};
use crate::types::EksPodIdentityWebhook;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Declaration-derived inputs shared by all generators
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorContext {
    /// Controller reference back to the declaration
    pub owner: OwnerReference,
    /// Namespace the webhook is installed into
    pub namespace: String,
    pub token_audience: String,
    /// Container image of the webhook workload
    pub image: String,
}

impl GeneratorContext {
    /// Build the context for a declaration read from the API server.
    pub fn for_declaration(resource: &EksPodIdentityWebhook, image: &str) -> Result<Self> {
        let owner = resource.controller_owner_ref(&()).ok_or_else(|| {
            InstallerError::PreconditionFailed(format!(
                "EKSPodIdentityWebhook {} has no uid and cannot own resources",
                resource.name_any()
            ))
        })?;

        Ok(GeneratorContext {
            owner,
            namespace: resource.spec.namespace.clone(),
            token_audience: resource.spec.token_audience.clone(),
            image: image.to_string(),
        })
    }

    /// Metadata for a namespaced object owned by the declaration
    pub(crate) fn namespaced_meta(&self, name: &str, extra_labels: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            namespace: Some(self.namespace.clone()),
            ..self.cluster_meta(name, extra_labels)
        }
    }

    /// Metadata for a cluster-scoped object owned by the declaration
    pub(crate) fn cluster_meta(&self, name: &str, extra_labels: &[(&str, &str)]) -> ObjectMeta {
        let mut object_labels = BTreeMap::from([(
            labels::MANAGED_BY.to_string(),
            OPERATOR_NAME.to_string(),
        )]);
        for (key, value) in extra_labels {
            object_labels.insert(key.to_string(), value.to_string());
        }

        ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(object_labels),
            owner_references: Some(vec![self.owner.clone()]),
            ..Default::default()
        }
    }
}

/// Label selector shared by the Service and the DaemonSet pods
pub(crate) fn webhook_pod_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        labels::WEBHOOK_SERVER.to_string(),
        labels::WEBHOOK_SERVER_POD.to_string(),
    )])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::EksPodIdentityWebhookSpec;

    pub(crate) fn make_declaration(namespace: &str, token_audience: &str) -> EksPodIdentityWebhook {
        let mut resource = EksPodIdentityWebhook::new(
            "installer",
            EksPodIdentityWebhookSpec {
                token_audience: token_audience.to_string(),
                namespace: namespace.to_string(),
            },
        );
        resource.metadata = ObjectMeta {
            name: Some("installer".to_string()),
            uid: Some("0a6c6d2e-2d4f-4b7c-9d1e-8f1f2b3c4d5e".to_string()),
            ..Default::default()
        };
        resource
    }

    pub(crate) fn make_context(namespace: &str) -> GeneratorContext {
        GeneratorContext::for_declaration(
            &make_declaration(namespace, "https://issuer.example"),
            "amazon/amazon-eks-pod-identity-webhook:latest",
        )
        .unwrap()
    }

    #[test]
    fn test_context_takes_values_from_declaration() {
        let ctx = make_context("kube-system");

        assert_eq!(ctx.namespace, "kube-system");
        assert_eq!(ctx.token_audience, "https://issuer.example");
        assert_eq!(ctx.owner.kind, "EKSPodIdentityWebhook");
        assert_eq!(ctx.owner.api_version, "installer.h3poteto.dev/v1alpha1");
        assert_eq!(ctx.owner.name, "installer");
        assert_eq!(ctx.owner.controller, Some(true));
    }

    #[test]
    fn test_context_requires_uid() {
        let mut resource = make_declaration("default", "sts.amazonaws.com");
        resource.metadata.uid = None;

        let err = GeneratorContext::for_declaration(&resource, "image").unwrap_err();
        assert!(matches!(err, InstallerError::PreconditionFailed(_)));
    }

    #[test]
    fn test_namespaced_meta_carries_owner_and_labels() {
        let ctx = make_context("kube-system");

        let meta = ctx.namespaced_meta("pod-identity-webhook", &[("kind", "mutator")]);

        assert_eq!(meta.namespace.as_deref(), Some("kube-system"));
        assert_eq!(meta.owner_references, Some(vec![ctx.owner.clone()]));
        let meta_labels = meta.labels.unwrap();
        assert_eq!(meta_labels.get(labels::MANAGED_BY).unwrap(), OPERATOR_NAME);
        assert_eq!(meta_labels.get("kind").unwrap(), "mutator");
    }

    #[test]
    fn test_cluster_meta_has_no_namespace() {
        let ctx = make_context("kube-system");

        assert!(ctx.cluster_meta("pod-identity-webhook", &[]).namespace.is_none());
    }
}
