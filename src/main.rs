// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::{Client, CustomResourceExt};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pod_identity_installer::config::Config;
use pod_identity_installer::events::{EventPublisher, KubeEventPublisher};
use pod_identity_installer::kubernetes::wait_for_webhook_crd;
use pod_identity_installer::reconcilers::{CsrReconciler, WebhookReconciler};
use pod_identity_installer::types::EksPodIdentityWebhook;

#[tokio::main]
async fn main() -> Result<()> {
    // `crd` prints the CustomResourceDefinition manifest and exits
    if std::env::args().nth(1).as_deref() == Some("crd") {
        print!("{}", serde_yaml::to_string(&EksPodIdentityWebhook::crd())?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting pod identity webhook installer");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: webhook_image={}, ca_bundle_source={:?}, csr_approval_enabled={}",
        config.webhook_image, config.ca_bundle_source, config.csr_approval_enabled
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for EKSPodIdentityWebhook CRD to become available...");
    wait_for_webhook_crd(&client).await?;

    let events: Arc<dyn EventPublisher> = Arc::new(KubeEventPublisher::new(client.clone()));
    let webhook_reconciler =
        WebhookReconciler::new(client.clone(), events.clone(), config.clone());

    info!("Starting reconcilers...");

    if config.csr_approval_enabled {
        let csr_reconciler = CsrReconciler::new(client, events);
        tokio::try_join!(webhook_reconciler.run(), csr_reconciler.run())?;
    } else {
        info!("CertificateSigningRequest approval is disabled");
        webhook_reconciler.run().await?;
    }

    // Reconcilers run until their watch streams end
    warn!("All reconcilers stopped unexpectedly");
    Ok(())
}
