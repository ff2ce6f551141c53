// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired installation of the pod identity webhook.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "installer.h3poteto.dev",
    version = "v1alpha1",
    kind = "EKSPodIdentityWebhook",
    root = "EksPodIdentityWebhook",
    plural = "ekspodidentitywebhooks"
)]
#[kube(status = "EksPodIdentityWebhookStatus")]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[serde(rename_all = "camelCase")]
pub struct EksPodIdentityWebhookSpec {
    /// Audience of the projected service account tokens, usually the issuer URL
    pub token_audience: String,
    /// Namespace the webhook is installed into
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_phase() -> String {
    "init".to_string()
}

/// Reference to an object the installer created or adopted
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceRef {
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        ResourceRef {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster(name: &str) -> Self {
        ResourceRef {
            namespace: None,
            name: name.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EksPodIdentityWebhookStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_identity_webhook_service_account: Option<ResourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_identity_webhook_service: Option<ResourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_identity_webhook_secret: Option<ResourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_identity_webhook_daemonset: Option<ResourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_identity_webhook_configuration: Option<ResourceRef>,
    #[serde(default = "default_phase")]
    pub phase: String,
}

impl Default for EksPodIdentityWebhookStatus {
    fn default() -> Self {
        EksPodIdentityWebhookStatus {
            pod_identity_webhook_service_account: None,
            pod_identity_webhook_service: None,
            pod_identity_webhook_secret: None,
            pod_identity_webhook_daemonset: None,
            pod_identity_webhook_configuration: None,
            phase: default_phase(),
        }
    }
}

impl EksPodIdentityWebhook {
    /// The observed convergence status, or the initial one if none was written yet
    pub fn observed_status(&self) -> EksPodIdentityWebhookStatus {
        self.status.clone().unwrap_or_default()
    }
}
