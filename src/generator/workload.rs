// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{webhook_pod_labels, GeneratorContext};
use crate::constants::{labels, workload, BASE_NAME};
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

/// Command line of the webhook container.
///
/// The external webhook binary depends on this exact flag set.
pub fn webhook_command(namespace: &str, token_audience: &str) -> Vec<String> {
    vec![
        workload::ENTRYPOINT.to_string(),
        "--in-cluster".to_string(),
        format!("--namespace={}", namespace),
        format!("--service-name={}", BASE_NAME),
        format!("--tls-secret={}", BASE_NAME),
        format!("--annotation-prefix={}", workload::ANNOTATION_PREFIX),
        format!("--token-audience={}", token_audience),
        "--logtostderr".to_string(),
    ]
}

/// DaemonSet running the webhook on every node
pub fn daemon_set(ctx: &GeneratorContext) -> DaemonSet {
    DaemonSet {
        metadata: ctx.namespaced_meta(
            BASE_NAME,
            &[(labels::WEBHOOK_SERVER, labels::WEBHOOK_SERVER_DAEMONSET)],
        ),
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(webhook_pod_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(webhook_pod_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(BASE_NAME.to_string()),
                    volumes: Some(vec![Volume {
                        name: workload::CERT_VOLUME.to_string(),
                        empty_dir: Some(EmptyDirVolumeSource::default()),
                        ..Default::default()
                    }]),
                    containers: vec![Container {
                        name: BASE_NAME.to_string(),
                        image: Some(ctx.image.clone()),
                        image_pull_policy: Some("Always".to_string()),
                        command: Some(webhook_command(&ctx.namespace, &ctx.token_audience)),
                        volume_mounts: Some(vec![VolumeMount {
                            name: workload::CERT_VOLUME.to_string(),
                            mount_path: workload::CERT_MOUNT_PATH.to_string(),
                            read_only: Some(false),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
