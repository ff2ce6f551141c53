// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Approval decisions for CertificateSigningRequests filed by the webhook.
//!
//! The only authorization check is an exact match of the request's username
//! against the webhook's service account in a declared namespace.

use crate::constants::{approval, BASE_NAME};
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition,
    CertificateSigningRequestStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::{DateTime, Utc};

/// Conditions after which a request is never evaluated again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Approved,
    Denied,
    Failed,
}

impl TerminalState {
    pub fn from_condition_type(type_: &str) -> Option<Self> {
        match type_ {
            "Approved" => Some(TerminalState::Approved),
            "Denied" => Some(TerminalState::Denied),
            "Failed" => Some(TerminalState::Failed),
            _ => None,
        }
    }
}

/// First terminal condition carried by the request, if any
pub fn terminal_state(csr: &CertificateSigningRequest) -> Option<TerminalState> {
    csr.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .into_iter()
        .flatten()
        .find_map(|condition| TerminalState::from_condition_type(&condition.type_))
}

/// Username the webhook's service account authenticates as
pub fn expected_username(namespace: &str) -> String {
    format!("system:serviceaccount:{}:{}", namespace, BASE_NAME)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No declaration has been observed yet
    NamespaceUnknown,
    /// The request was filed by someone else
    NotOwned,
    AlreadyHandled(TerminalState),
    Approve,
}

/// Decide what to do with a request, given the namespaces of all observed declarations
pub fn evaluate(csr: &CertificateSigningRequest, namespaces: &[String]) -> Decision {
    if namespaces.is_empty() {
        return Decision::NamespaceUnknown;
    }

    let owned = csr.spec.username.as_deref().is_some_and(|username| {
        namespaces
            .iter()
            .any(|namespace| username == expected_username(namespace))
    });
    if !owned {
        return Decision::NotOwned;
    }

    match terminal_state(csr) {
        Some(state) => Decision::AlreadyHandled(state),
        None => Decision::Approve,
    }
}

/// Append the approval condition; the caller submits the result to the approval subresource
pub fn approve(csr: &CertificateSigningRequest, now: DateTime<Utc>) -> CertificateSigningRequest {
    let mut approved = csr.clone();
    let status = approved
        .status
        .get_or_insert_with(CertificateSigningRequestStatus::default);
    status
        .conditions
        .get_or_insert_with(Vec::new)
        .push(CertificateSigningRequestCondition {
            type_: "Approved".to_string(),
            status: "True".to_string(),
            reason: Some(approval::REASON.to_string()),
            message: Some(approval::MESSAGE.to_string()),
            last_update_time: Some(Time(now)),
            ..Default::default()
        });
    approved
}
