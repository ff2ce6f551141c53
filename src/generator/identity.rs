// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Service account of the webhook and its least-privilege RBAC split.
//!
//! The namespaced Role only lets the webhook manage its own TLS secret; the
//! ClusterRole grants read access to service accounts and lets it file
//! CertificateSigningRequests.

use super::GeneratorContext;
use crate::constants::BASE_NAME;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

fn strings(values: &[&str]) -> Option<Vec<String>> {
    Some(values.iter().map(|v| v.to_string()).collect())
}

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: strings(&[api_group]),
        resources: strings(resources),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

fn service_account_subject(sa: &ServiceAccount) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: sa.metadata.name.clone().unwrap_or_default(),
        namespace: sa.metadata.namespace.clone(),
        ..Default::default()
    }
}

pub fn service_account(ctx: &GeneratorContext) -> ServiceAccount {
    ServiceAccount {
        metadata: ctx.namespaced_meta(BASE_NAME, &[]),
        ..Default::default()
    }
}

pub fn role(ctx: &GeneratorContext) -> Role {
    Role {
        metadata: ctx.namespaced_meta(BASE_NAME, &[]),
        rules: Some(vec![
            rule("", &["secrets"], &["create"]),
            PolicyRule {
                resource_names: strings(&[BASE_NAME]),
                ..rule("", &["secrets"], &["get", "update", "patch"])
            },
        ]),
    }
}

pub fn role_binding(ctx: &GeneratorContext, role: &Role, sa: &ServiceAccount) -> RoleBinding {
    RoleBinding {
        metadata: ctx.namespaced_meta(BASE_NAME, &[]),
        subjects: Some(vec![service_account_subject(sa)]),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: role.metadata.name.clone().unwrap_or_default(),
        },
    }
}

pub fn cluster_role(ctx: &GeneratorContext) -> ClusterRole {
    ClusterRole {
        metadata: ctx.cluster_meta(BASE_NAME, &[]),
        rules: Some(vec![
            rule("", &["serviceaccounts"], &["get", "watch", "list"]),
            rule(
                "certificates.k8s.io",
                &["certificatesigningrequests"],
                &["create", "get", "list", "watch"],
            ),
        ]),
        ..Default::default()
    }
}

pub fn cluster_role_binding(
    ctx: &GeneratorContext,
    cluster_role: &ClusterRole,
    sa: &ServiceAccount,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ctx.cluster_meta(BASE_NAME, &[]),
        subjects: Some(vec![service_account_subject(sa)]),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: cluster_role.metadata.name.clone().unwrap_or_default(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::make_context;

    #[test]
    fn test_service_account_lives_in_declared_namespace() {
        let sa = service_account(&make_context("kube-system"));

        assert_eq!(sa.metadata.name.as_deref(), Some(BASE_NAME));
        assert_eq!(sa.metadata.namespace.as_deref(), Some("kube-system"));
    }

    #[test]
    fn test_role_limits_secret_access_to_tls_secret() {
        let role = role(&make_context("default"));

        let rules = role.rules.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].verbs, vec!["create"]);
        assert!(rules[0].resource_names.is_none());
        assert_eq!(rules[1].verbs, vec!["get", "update", "patch"]);
        assert_eq!(rules[1].resource_names, Some(vec![BASE_NAME.to_string()]));
        assert_eq!(rules[1].resources, Some(vec!["secrets".to_string()]));
    }

    #[test]
    fn test_cluster_role_grants_csr_and_service_account_access() {
        let cluster_role = cluster_role(&make_context("default"));

        assert!(cluster_role.metadata.namespace.is_none());
        let rules = cluster_role.rules.unwrap();
        assert_eq!(rules[0].resources, Some(vec!["serviceaccounts".to_string()]));
        assert_eq!(rules[0].verbs, vec!["get", "watch", "list"]);
        assert_eq!(rules[1].api_groups, Some(vec!["certificates.k8s.io".to_string()]));
        assert_eq!(rules[1].verbs, vec!["create", "get", "list", "watch"]);
    }

    #[test]
    fn test_bindings_target_service_account() {
        let ctx = make_context("kube-system");
        let sa = service_account(&ctx);

        let binding = role_binding(&ctx, &role(&ctx), &sa);
        let cluster_binding = cluster_role_binding(&ctx, &cluster_role(&ctx), &sa);

        for subjects in [binding.subjects.unwrap(), cluster_binding.subjects.unwrap()] {
            assert_eq!(subjects.len(), 1);
            assert_eq!(subjects[0].kind, "ServiceAccount");
            assert_eq!(subjects[0].name, BASE_NAME);
            assert_eq!(subjects[0].namespace.as_deref(), Some("kube-system"));
        }
        assert_eq!(binding.role_ref.kind, "Role");
        assert_eq!(cluster_binding.role_ref.kind, "ClusterRole");
        assert_eq!(cluster_binding.role_ref.api_group, RBAC_API_GROUP);
        assert!(cluster_binding.metadata.namespace.is_none());
    }

    #[test]
    fn test_generators_are_deterministic() {
        let ctx = make_context("kube-system");
        let sa = service_account(&ctx);

        assert_eq!(role(&ctx), role(&ctx));
        assert_eq!(cluster_role(&ctx), cluster_role(&ctx));
        assert_eq!(
            role_binding(&ctx, &role(&ctx), &sa),
            role_binding(&ctx, &role(&ctx), &sa)
        );
    }
}
