// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Name shared by every resource the installer generates
pub const BASE_NAME: &str = "pod-identity-webhook";

/// The operator name used for events and field ownership
pub const OPERATOR_NAME: &str = "pod-identity-webhook-installer";

/// Kubernetes label keys and values used by the installer
pub mod labels {
    /// Key of the label selecting webhook pods and tagging generated objects
    pub const WEBHOOK_SERVER: &str = "ekspodidentitywebhooks.installer.h3poteto.dev";
    /// Value carried by webhook pods, matched by the Service selector
    pub const WEBHOOK_SERVER_POD: &str = "pod";
    pub const WEBHOOK_SERVER_DAEMONSET: &str = "eks-webhook-daemonset";
    pub const WEBHOOK_SERVER_SECRET: &str = "eks-webhook";
    pub const WEBHOOK_SERVER_CONFIGURATION: &str = "webhook-configuration";

    /// Set on every generated object so owned-resource watches can be narrowed
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
}

/// Webhook workload settings consumed by the external webhook binary
pub mod workload {
    pub const DEFAULT_IMAGE: &str = "amazon/amazon-eks-pod-identity-webhook:latest";
    pub const ENTRYPOINT: &str = "/webhook";
    pub const ANNOTATION_PREFIX: &str = "eks.amazonaws.com";
    pub const CERT_VOLUME: &str = "webhook-certs";
    pub const CERT_MOUNT_PATH: &str = "/var/run/app/certs";
    pub const PORT: i32 = 443;
}

/// TLS secret data keys
pub mod tls {
    pub const KEY_PEM: &str = "key.pem";
    pub const CERT_PEM: &str = "cert.pem";
    /// Key holding the cluster CA in service account token secrets
    pub const SERVICE_ACCOUNT_CA: &str = "ca.crt";
    /// Validity of the serving certificate in years
    pub const VALIDITY_YEARS: i32 = 10;
}

/// Admission hook registration settings
pub mod admission {
    pub const PATH: &str = "/mutate";
    pub const TIMEOUT_SECONDS: i32 = 30;
    pub const REVIEW_VERSION: &str = "v1beta1";
}

/// CertificateSigningRequest approval
pub mod approval {
    pub const REASON: &str = "AutoApproved";
    pub const MESSAGE: &str = "This CSR was approved by eks-pod-identity-webhook-installer";
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Delay before a failed reconciliation is retried
pub const ERROR_REQUEUE_SECS: u64 = 60;
