// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Webhook reconciler - drives the sync engine for every EKSPodIdentityWebhook.
//!
//! Changes to the declaration or to any object it owns trigger a reconcile.
//! Each reconcile advances at most one stage; the status write it performs
//! triggers the next one.

use crate::config::Config;
use crate::constants::{labels, ERROR_REQUEUE_SECS, OPERATOR_NAME};
use crate::error::{InstallerError, Result};
use crate::events::{actions, reasons, EventPublisher};
use crate::sync::{SyncEngine, SyncOutcome};
use crate::types::EksPodIdentityWebhook;
use futures::StreamExt;
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::{
    runtime::{controller::Action, events::EventType, Controller},
    Api, Client, Resource, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct WebhookReconciler {
    client: Client,
    engine: SyncEngine,
    events: Arc<dyn EventPublisher>,
}

impl WebhookReconciler {
    pub fn new(client: Client, events: Arc<dyn EventPublisher>, config: Config) -> Self {
        let engine = SyncEngine::new(client.clone(), events.clone(), config);
        Self {
            client,
            engine,
            events,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let client = self.client.clone();
        let declarations: Api<EksPodIdentityWebhook> = Api::all(client.clone());
        let managed = WatcherConfig::default()
            .labels(&format!("{}={}", labels::MANAGED_BY, OPERATOR_NAME));
        let context = Arc::new(self);

        Controller::new(declarations, WatcherConfig::default())
            .owns(Api::<ServiceAccount>::all(client.clone()), managed.clone())
            .owns(Api::<Role>::all(client.clone()), managed.clone())
            .owns(Api::<RoleBinding>::all(client.clone()), managed.clone())
            .owns(Api::<ClusterRole>::all(client.clone()), managed.clone())
            .owns(Api::<ClusterRoleBinding>::all(client.clone()), managed.clone())
            .owns(Api::<Service>::all(client.clone()), managed.clone())
            .owns(Api::<Secret>::all(client.clone()), managed.clone())
            .owns(Api::<DaemonSet>::all(client.clone()), managed.clone())
            .owns(Api::<MutatingWebhookConfiguration>::all(client), managed)
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled EKSPodIdentityWebhook: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(
    resource: Arc<EksPodIdentityWebhook>,
    ctx: Arc<WebhookReconciler>,
) -> Result<Action> {
    debug!("Reconciling EKSPodIdentityWebhook: {}", resource.name_any());

    match ctx.engine.sync(&resource).await {
        Ok(SyncOutcome::Progressed(stage)) => {
            debug!("{} synced for {}", stage, resource.name_any());
            Ok(Action::await_change())
        }
        Ok(SyncOutcome::AlreadySynced) => Ok(Action::await_change()),
        Err(e) => {
            ctx.events
                .publish(
                    &resource.object_ref(&()),
                    EventType::Warning,
                    reasons::ERROR,
                    actions::RECONCILE,
                    Some(format!("Failed to sync: {}", e)),
                )
                .await;
            Err(e)
        }
    }
}

fn error_policy(
    resource: Arc<EksPodIdentityWebhook>,
    error: &InstallerError,
    _ctx: Arc<WebhookReconciler>,
) -> Action {
    error!("Failed to sync {}: {}", resource.name_any(), error);
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}
