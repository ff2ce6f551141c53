// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::GeneratorContext;
use crate::constants::{admission, labels, BASE_NAME};
use crate::pki::service_dns_name;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::ByteString;

/// Registration routing pod creation to the webhook's `/mutate` endpoint.
///
/// `ca_bundle` is the trust anchor the API server uses to verify the
/// webhook's serving certificate, so the service and the certificate must
/// both exist before this is generated.
pub fn mutating_webhook_configuration(
    ctx: &GeneratorContext,
    service: &Service,
    ca_bundle: &[u8],
) -> MutatingWebhookConfiguration {
    let service_name = service.metadata.name.clone().unwrap_or_default();
    let service_namespace = service.metadata.namespace.clone().unwrap_or_default();

    MutatingWebhookConfiguration {
        metadata: ctx.cluster_meta(
            BASE_NAME,
            &[
                (labels::WEBHOOK_SERVER, labels::WEBHOOK_SERVER_CONFIGURATION),
                ("kind", "mutator"),
            ],
        ),
        webhooks: Some(vec![MutatingWebhook {
            name: service_dns_name(&service_name, &service_namespace),
            client_config: WebhookClientConfig {
                service: Some(ServiceReference {
                    namespace: service_namespace,
                    name: service_name,
                    path: Some(admission::PATH.to_string()),
                    port: None,
                }),
                ca_bundle: Some(ByteString(ca_bundle.to_vec())),
                url: None,
            },
            rules: Some(vec![RuleWithOperations {
                operations: Some(vec!["CREATE".to_string()]),
                api_groups: Some(vec!["".to_string()]),
                api_versions: Some(vec!["v1".to_string()]),
                resources: Some(vec!["pods".to_string()]),
                scope: Some("*".to_string()),
            }]),
            failure_policy: Some("Ignore".to_string()),
            match_policy: Some("Equivalent".to_string()),
            side_effects: "None".to_string(),
            timeout_seconds: Some(admission::TIMEOUT_SECONDS),
            admission_review_versions: vec![admission::REVIEW_VERSION.to_string()],
            ..Default::default()
        }]),
    }
}
