// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CSR reconciler - approves CertificateSigningRequests filed by the webhook's service account.

use crate::approval::{self, Decision};
use crate::constants::ERROR_REQUEUE_SECS;
use crate::error::{InstallerError, Result};
use crate::events::{actions, reasons, EventPublisher};
use crate::types::EksPodIdentityWebhook;
use futures::StreamExt;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::chrono::Utc;
use kube::{
    api::{ListParams, PostParams},
    runtime::{controller::Action, events::EventType, Controller},
    Api, Client, Resource, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct CsrReconciler {
    client: Client,
    events: Arc<dyn EventPublisher>,
}

impl CsrReconciler {
    pub fn new(client: Client, events: Arc<dyn EventPublisher>) -> Self {
        Self { client, events }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let requests: Api<CertificateSigningRequest> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(requests, WatcherConfig::default())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled CertificateSigningRequest: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    /// Target namespaces of every declaration currently in the cluster
    async fn declared_namespaces(&self) -> Result<Vec<String>> {
        let declarations: Api<EksPodIdentityWebhook> = Api::all(self.client.clone());
        let list = declarations.list(&ListParams::default()).await?;
        Ok(list.items.into_iter().map(|d| d.spec.namespace).collect())
    }
}

async fn reconcile(csr: Arc<CertificateSigningRequest>, ctx: Arc<CsrReconciler>) -> Result<Action> {
    let name = csr.name_any();
    let namespaces = ctx.declared_namespaces().await?;

    match approval::evaluate(&csr, &namespaces) {
        Decision::NamespaceUnknown => {
            debug!("No EKSPodIdentityWebhook yet, ignoring CertificateSigningRequest {}", name);
        }
        Decision::NotOwned => {
            debug!("CertificateSigningRequest {} is not ours", name);
        }
        Decision::AlreadyHandled(state) => {
            debug!("CertificateSigningRequest {} is already {:?}", name, state);
        }
        Decision::Approve => submit_approval(&csr, &ctx).await?,
    }

    Ok(Action::await_change())
}

async fn submit_approval(csr: &CertificateSigningRequest, ctx: &CsrReconciler) -> Result<()> {
    let name = csr.name_any();
    let approved = approval::approve(csr, Utc::now());
    let api: Api<CertificateSigningRequest> = Api::all(ctx.client.clone());

    let result = api
        .replace_subresource(
            "approval",
            &name,
            &PostParams::default(),
            serde_json::to_vec(&approved)?,
        )
        .await;

    match result {
        Ok(_) => {
            info!("Approved CertificateSigningRequest {}", name);
            ctx.events
                .publish(
                    &csr.object_ref(&()),
                    EventType::Normal,
                    reasons::APPROVED,
                    actions::APPROVE,
                    None,
                )
                .await;
            Ok(())
        }
        Err(e) => {
            error!("Failed to approve CertificateSigningRequest {}: {}", name, e);
            ctx.events
                .publish(
                    &csr.object_ref(&()),
                    EventType::Warning,
                    reasons::APPROVAL_FAILED,
                    actions::APPROVE,
                    Some(format!("Failed to approve: {}", e)),
                )
                .await;
            Err(e.into())
        }
    }
}

fn error_policy(
    csr: Arc<CertificateSigningRequest>,
    error: &InstallerError,
    _ctx: Arc<CsrReconciler>,
) -> Action {
    error!("Failed to reconcile CertificateSigningRequest {}: {}", csr.name_any(), error);
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}
