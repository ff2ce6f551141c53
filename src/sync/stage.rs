// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Convergence stages and the transitions between them.
//!
//! Everything in here is side-effect free; [`super::engine`] applies a stage
//! against the API server and asks [`step`] what to do next.

use crate::types::{EksPodIdentityWebhookStatus, ResourceRef};
use std::fmt;

pub const PHASE_INIT: &str = "init";
pub const PHASE_PROVISIONING: &str = "Provisioning";
pub const PHASE_SYNCED: &str = "Synced";

/// One class of managed resources, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Service account plus its namespaced and cluster-wide RBAC
    Identity,
    /// Service in front of the webhook pods
    NetworkEndpoint,
    /// Serving key pair, needed by the workload and the admission hook
    TlsSecret,
    /// DaemonSet running the webhook
    WorkloadSet,
    /// MutatingWebhookConfiguration
    AdmissionHook,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Identity,
        Stage::NetworkEndpoint,
        Stage::TlsSecret,
        Stage::WorkloadSet,
        Stage::AdmissionHook,
    ];

    pub fn first() -> Stage {
        Stage::ALL[0]
    }

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Identity => Some(Stage::NetworkEndpoint),
            Stage::NetworkEndpoint => Some(Stage::TlsSecret),
            Stage::TlsSecret => Some(Stage::WorkloadSet),
            Stage::WorkloadSet => Some(Stage::AdmissionHook),
            Stage::AdmissionHook => None,
        }
    }

    /// Reference recorded for this stage, if the engine has observed the resource
    pub fn reference(self, status: &EksPodIdentityWebhookStatus) -> Option<&ResourceRef> {
        match self {
            Stage::Identity => status.pod_identity_webhook_service_account.as_ref(),
            Stage::NetworkEndpoint => status.pod_identity_webhook_service.as_ref(),
            Stage::TlsSecret => status.pod_identity_webhook_secret.as_ref(),
            Stage::WorkloadSet => status.pod_identity_webhook_daemonset.as_ref(),
            Stage::AdmissionHook => status.pod_identity_webhook_configuration.as_ref(),
        }
    }

    /// Record the observed resource and refresh the phase accordingly
    pub fn record(self, status: &mut EksPodIdentityWebhookStatus, reference: ResourceRef) {
        let slot = match self {
            Stage::Identity => &mut status.pod_identity_webhook_service_account,
            Stage::NetworkEndpoint => &mut status.pod_identity_webhook_service,
            Stage::TlsSecret => &mut status.pod_identity_webhook_secret,
            Stage::WorkloadSet => &mut status.pod_identity_webhook_daemonset,
            Stage::AdmissionHook => &mut status.pod_identity_webhook_configuration,
        };
        *slot = Some(reference);
        status.phase = phase_for(status).to_string();
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Identity => "ServiceAccount",
            Stage::NetworkEndpoint => "Service",
            Stage::TlsSecret => "Secret",
            Stage::WorkloadSet => "DaemonSet",
            Stage::AdmissionHook => "MutatingWebhookConfiguration",
        };
        f.write_str(name)
    }
}

/// First stage whose resource has never been observed
pub fn pending_stage(status: &EksPodIdentityWebhookStatus) -> Option<Stage> {
    Stage::ALL
        .into_iter()
        .find(|stage| stage.reference(status).is_none())
}

/// Coarse phase label derived from the recorded references
pub fn phase_for(status: &EksPodIdentityWebhookStatus) -> &'static str {
    let recorded = Stage::ALL
        .iter()
        .filter(|stage| stage.reference(status).is_some())
        .count();

    match recorded {
        0 => PHASE_INIT,
        n if n == Stage::ALL.len() => PHASE_SYNCED,
        _ => PHASE_PROVISIONING,
    }
}

/// What the engine does after applying a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The status changed: persist it and end this invocation
    Persist,
    /// Nothing new was recorded: continue with the given stage
    Advance(Stage),
    /// Nothing new was recorded and no stage is left
    Finished,
}

pub fn step(
    stage: Stage,
    observed: &EksPodIdentityWebhookStatus,
    updated: &EksPodIdentityWebhookStatus,
) -> Step {
    if observed != updated {
        return Step::Persist;
    }
    match stage.next() {
        Some(next) => Step::Advance(next),
        None => Step::Finished,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ref() -> ResourceRef {
        ResourceRef::namespaced("kube-system", "pod-identity-webhook")
    }

    fn make_status_up_to(stages: usize) -> EksPodIdentityWebhookStatus {
        let mut status = EksPodIdentityWebhookStatus::default();
        for stage in Stage::ALL.into_iter().take(stages) {
            stage.record(&mut status, make_ref());
        }
        status
    }

    #[test]
    fn test_next_walks_all_stages_in_order() {
        let mut visited = vec![Stage::first()];
        while let Some(next) = visited.last().and_then(|s| s.next()) {
            visited.push(next);
        }

        assert_eq!(visited, Stage::ALL.to_vec());
    }

    #[test]
    fn test_record_fills_matching_reference() {
        let mut status = EksPodIdentityWebhookStatus::default();

        Stage::TlsSecret.record(&mut status, make_ref());

        assert_eq!(status.pod_identity_webhook_secret, Some(make_ref()));
        assert_eq!(Stage::TlsSecret.reference(&status), Some(&make_ref()));
        assert!(Stage::Identity.reference(&status).is_none());
    }

    #[test]
    fn test_pending_stage_is_first_unrecorded() {
        assert_eq!(pending_stage(&make_status_up_to(0)), Some(Stage::Identity));
        assert_eq!(pending_stage(&make_status_up_to(3)), Some(Stage::WorkloadSet));
        assert_eq!(pending_stage(&make_status_up_to(5)), None);
    }

    #[test]
    fn test_phase_follows_recorded_references() {
        assert_eq!(make_status_up_to(0).phase, PHASE_INIT);
        assert_eq!(make_status_up_to(1).phase, PHASE_PROVISIONING);
        assert_eq!(make_status_up_to(4).phase, PHASE_PROVISIONING);
        assert_eq!(make_status_up_to(5).phase, PHASE_SYNCED);
    }

    #[test]
    fn test_step_persists_on_change() {
        let observed = make_status_up_to(1);
        let mut updated = observed.clone();
        Stage::NetworkEndpoint.record(&mut updated, make_ref());

        assert_eq!(step(Stage::NetworkEndpoint, &observed, &updated), Step::Persist);
    }

    #[test]
    fn test_step_advances_when_unchanged() {
        let status = make_status_up_to(2);

        assert_eq!(
            step(Stage::NetworkEndpoint, &status, &status),
            Step::Advance(Stage::TlsSecret)
        );
    }

    #[test]
    fn test_step_finishes_after_last_stage() {
        let status = make_status_up_to(5);

        assert_eq!(step(Stage::AdmissionHook, &status, &status), Step::Finished);
    }

    #[test]
    fn test_rerecording_same_reference_is_not_a_change() {
        let observed = make_status_up_to(5);
        let mut updated = observed.clone();

        Stage::Identity.record(&mut updated, make_ref());

        assert_eq!(step(Stage::Identity, &observed, &updated), Step::Advance(Stage::NetworkEndpoint));
    }
}
