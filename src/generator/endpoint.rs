// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{webhook_pod_labels, GeneratorContext};
use crate::constants::{workload::PORT, BASE_NAME};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Service routing HTTPS traffic to the webhook pods
pub fn service(ctx: &GeneratorContext) -> Service {
    Service {
        metadata: ctx.namespaced_meta(BASE_NAME, &[]),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port: PORT,
                target_port: Some(IntOrString::Int(PORT)),
                ..Default::default()
            }]),
            selector: Some(webhook_pod_labels()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
