// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes Event recording.
//!
//! Events are fire-and-forget: a failed publish is logged and never fails
//! the reconciliation that emitted it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

use crate::constants::OPERATOR_NAME;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event about `resource_ref`
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: OPERATOR_NAME.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event actions
pub mod actions {
    pub const CREATE: &str = "Create";
    pub const UPDATE: &str = "Update";
    pub const RECONCILE: &str = "Reconcile";
    pub const APPROVE: &str = "Approve";
}

/// Event reasons for a managed object of the given kind
pub mod reasons {
    pub const ERROR: &str = "Error";
    pub const APPROVED: &str = "Approved";
    pub const APPROVAL_FAILED: &str = "ApprovalFailed";

    pub fn created(kind: &str) -> String {
        format!("{}Created", kind)
    }

    pub fn creation_failed(kind: &str) -> String {
        format!("{}CreationFailed", kind)
    }

    pub fn updated(kind: &str) -> String {
        format!("{}Updated", kind)
    }

    pub fn update_failed(kind: &str) -> String {
        format!("{}UpdateFailed", kind)
    }
}
