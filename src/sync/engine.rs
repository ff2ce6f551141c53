// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Convergence engine for EKSPodIdentityWebhook declarations.
//!
//! Each call to [`SyncEngine::sync`] walks the stages in order and stops at
//! the first one that records something new in the status: that status is
//! persisted and the invocation ends. The controller re-invokes the engine
//! until every stage is unchanged.

use crate::config::{CaBundleSource, Config};
use crate::constants::{tls, BASE_NAME};
use crate::error::{InstallerError, Result};
use crate::events::{actions, reasons, EventPublisher};
use crate::generator::{self, secret::certificate_pem, GeneratorContext};
use crate::pki;
use crate::sync::drift::{reassert_owner, Reassert};
use crate::sync::stage::{pending_stage, step, Stage, Step};
use crate::types::{EksPodIdentityWebhook, EksPodIdentityWebhookStatus, ResourceRef};
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Patch, PatchParams, PostParams},
    runtime::events::EventType,
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Result of a single engine invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The given stage recorded a new reference and the status was persisted
    Progressed(Stage),
    /// Every stage was already recorded; nothing was persisted
    AlreadySynced,
}

/// Objects produced by earlier stages of the current invocation
#[derive(Default)]
struct Observed {
    service: Option<Service>,
    secret: Option<Secret>,
}

fn required<'a, T>(value: &'a Option<T>, what: &str) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| {
        InstallerError::PreconditionFailed(format!("{} has not been synced yet", what))
    })
}

fn describe<K: Resource>(obj: &K) -> String {
    match obj.meta().namespace.as_deref() {
        Some(namespace) => format!("{}/{}", namespace, obj.name_any()),
        None => obj.name_any(),
    }
}

fn reference_to<K: Resource>(obj: &K) -> ResourceRef {
    match obj.meta().namespace.as_deref() {
        Some(namespace) => ResourceRef::namespaced(namespace, &obj.name_any()),
        None => ResourceRef::cluster(&obj.name_any()),
    }
}

pub struct SyncEngine {
    client: Client,
    events: Arc<dyn EventPublisher>,
    config: Config,
}

impl SyncEngine {
    pub fn new(client: Client, events: Arc<dyn EventPublisher>, config: Config) -> Self {
        Self {
            client,
            events,
            config,
        }
    }

    /// Advance the declaration by at most one status change.
    #[instrument(skip(self, resource), fields(name = %resource.name_any()))]
    pub async fn sync(&self, resource: &EksPodIdentityWebhook) -> Result<SyncOutcome> {
        let ctx = GeneratorContext::for_declaration(resource, &self.config.webhook_image)?;
        let observed_status = resource.observed_status();
        let mut status = observed_status.clone();
        let mut observed = Observed::default();

        match pending_stage(&observed_status) {
            Some(stage) => info!("Syncing into namespace {}, next stage {}", ctx.namespace, stage),
            None => debug!("Syncing into namespace {}, all stages recorded", ctx.namespace),
        }

        let mut stage = Stage::first();
        loop {
            let recorded = stage.reference(&observed_status).cloned();
            let reference = self
                .apply(stage, resource, &ctx, recorded.as_ref(), &mut observed)
                .await?;
            stage.record(&mut status, reference);

            match step(stage, &observed_status, &status) {
                Step::Persist => {
                    self.persist_status(resource, &status).await?;
                    info!("Success to update status after syncing {}", stage);
                    return Ok(SyncOutcome::Progressed(stage));
                }
                Step::Advance(next) => stage = next,
                Step::Finished => {
                    info!("Already synced");
                    return Ok(SyncOutcome::AlreadySynced);
                }
            }
        }
    }

    async fn apply(
        &self,
        stage: Stage,
        resource: &EksPodIdentityWebhook,
        ctx: &GeneratorContext,
        recorded: Option<&ResourceRef>,
        observed: &mut Observed,
    ) -> Result<ResourceRef> {
        match stage {
            Stage::Identity => self.sync_identity(resource, ctx, recorded).await,
            Stage::NetworkEndpoint => self.sync_service(resource, ctx, recorded, observed).await,
            Stage::TlsSecret => self.sync_secret(resource, ctx, recorded, observed).await,
            Stage::WorkloadSet => self.sync_daemon_set(resource, ctx, recorded).await,
            Stage::AdmissionHook => self.sync_webhook(resource, ctx, recorded, observed).await,
        }
    }

    /// Service account first, then role, role binding, cluster role and cluster role binding
    async fn sync_identity(
        &self,
        resource: &EksPodIdentityWebhook,
        ctx: &GeneratorContext,
        recorded: Option<&ResourceRef>,
    ) -> Result<ResourceRef> {
        let sa_api: Api<ServiceAccount> = self.scoped_api(recorded, &ctx.namespace);
        let existing = find(&sa_api, recorded).await?;
        let service_account = self
            .converge(resource, ctx, &sa_api, existing, generator::service_account(ctx))
            .await?;

        let role_api: Api<Role> = Api::namespaced(self.client.clone(), &ctx.namespace);
        let role = self.ensure(resource, ctx, &role_api, generator::role(ctx)).await?;

        let binding_api: Api<RoleBinding> = Api::namespaced(self.client.clone(), &ctx.namespace);
        let binding = generator::role_binding(ctx, &role, &service_account);
        self.ensure(resource, ctx, &binding_api, binding).await?;

        let cluster_role_api: Api<ClusterRole> = Api::all(self.client.clone());
        let cluster_role = self
            .ensure(resource, ctx, &cluster_role_api, generator::cluster_role(ctx))
            .await?;

        let cluster_binding_api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        let cluster_binding =
            generator::cluster_role_binding(ctx, &cluster_role, &service_account);
        self.ensure(resource, ctx, &cluster_binding_api, cluster_binding)
            .await?;

        Ok(reference_to(&service_account))
    }

    async fn sync_service(
        &self,
        resource: &EksPodIdentityWebhook,
        ctx: &GeneratorContext,
        recorded: Option<&ResourceRef>,
        observed: &mut Observed,
    ) -> Result<ResourceRef> {
        let api: Api<Service> = self.scoped_api(recorded, &ctx.namespace);
        let existing = find(&api, recorded).await?;
        let service = self
            .converge(resource, ctx, &api, existing, generator::service(ctx))
            .await?;

        let reference = reference_to(&service);
        observed.service = Some(service);
        Ok(reference)
    }

    async fn sync_secret(
        &self,
        resource: &EksPodIdentityWebhook,
        ctx: &GeneratorContext,
        recorded: Option<&ResourceRef>,
        observed: &mut Observed,
    ) -> Result<ResourceRef> {
        let api: Api<Secret> = self.scoped_api(recorded, &ctx.namespace);
        let secret = match find(&api, recorded).await? {
            Some(found) => self.reassert(resource, ctx, &api, found, None).await?,
            None => {
                let service = required(&observed.service, "Service")?;
                let bundle = pki::issue_serving_certificate(&service.name_any(), &ctx.namespace)
                    .inspect_err(|e| error!("Failed to generate certificate: {}", e))?;
                self.create(resource, &api, generator::tls_secret(ctx, &bundle))
                    .await?
            }
        };

        let reference = reference_to(&secret);
        observed.secret = Some(secret);
        Ok(reference)
    }

    async fn sync_daemon_set(
        &self,
        resource: &EksPodIdentityWebhook,
        ctx: &GeneratorContext,
        recorded: Option<&ResourceRef>,
    ) -> Result<ResourceRef> {
        let api: Api<DaemonSet> = self.scoped_api(recorded, &ctx.namespace);
        let existing = find(&api, recorded).await?;
        let daemon_set = self
            .converge(resource, ctx, &api, existing, generator::daemon_set(ctx))
            .await?;

        Ok(reference_to(&daemon_set))
    }

    async fn sync_webhook(
        &self,
        resource: &EksPodIdentityWebhook,
        ctx: &GeneratorContext,
        recorded: Option<&ResourceRef>,
        observed: &Observed,
    ) -> Result<ResourceRef> {
        let api: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        let configuration = match find(&api, recorded).await? {
            // A recreated TLS secret carries a new certificate; the cluster CA does not move.
            Some(found) => match self.config.ca_bundle_source {
                CaBundleSource::TlsSecret => {
                    let desired = self.desired_webhook(ctx, observed).await?;
                    self.reassert(resource, ctx, &api, found, Some(&desired)).await?
                }
                CaBundleSource::ServiceAccountToken => {
                    self.reassert(resource, ctx, &api, found, None).await?
                }
            },
            None => {
                let desired = self.desired_webhook(ctx, observed).await?;
                self.create(resource, &api, desired).await?
            }
        };

        Ok(reference_to(&configuration))
    }

    async fn desired_webhook(
        &self,
        ctx: &GeneratorContext,
        observed: &Observed,
    ) -> Result<MutatingWebhookConfiguration> {
        let service = required(&observed.service, "Service")?;
        let ca_bundle = self.trust_anchor(ctx, observed).await?;
        Ok(generator::mutating_webhook_configuration(ctx, service, &ca_bundle))
    }

    /// Certificate the API server uses to verify the webhook's serving identity
    async fn trust_anchor(&self, ctx: &GeneratorContext, observed: &Observed) -> Result<Vec<u8>> {
        match self.config.ca_bundle_source {
            CaBundleSource::TlsSecret => {
                let secret = required(&observed.secret, "Secret")?;
                certificate_pem(secret).map(<[u8]>::to_vec).ok_or_else(|| {
                    InstallerError::PreconditionFailed(format!(
                        "Secret {} has no {}",
                        describe(secret),
                        tls::CERT_PEM
                    ))
                })
            }
            CaBundleSource::ServiceAccountToken => self.service_account_ca(&ctx.namespace).await,
        }
    }

    /// Cluster CA from the token secret of the namespace's `default` service account
    async fn service_account_ca(&self, namespace: &str) -> Result<Vec<u8>> {
        let sa_api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let default_sa = sa_api.get_opt("default").await?.ok_or_else(|| {
            InstallerError::PreconditionFailed(format!(
                "service account {}/default not found",
                namespace
            ))
        })?;

        let secrets = default_sa.secrets.unwrap_or_default();
        let [token_ref] = secrets.as_slice() else {
            error!("Service account {}/default is invalid", namespace);
            return Err(InstallerError::PreconditionFailed(format!(
                "{}/default has invalid secrets: expected exactly one, found {}",
                namespace,
                secrets.len()
            )));
        };
        let token_name = token_ref.name.clone().ok_or_else(|| {
            InstallerError::PreconditionFailed(format!(
                "{}/default references a secret without a name",
                namespace
            ))
        })?;

        let secret_api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let token = secret_api.get(&token_name).await?;
        token
            .data
            .and_then(|mut data| data.remove(tls::SERVICE_ACCOUNT_CA))
            .map(|ca| ca.0)
            .ok_or_else(|| {
                InstallerError::PreconditionFailed(format!(
                    "Secret {}/{} has no {}",
                    namespace,
                    token_name,
                    tls::SERVICE_ACCOUNT_CA
                ))
            })
    }

    /// Write the status, guarded by the resource version the engine started from
    async fn persist_status(
        &self,
        resource: &EksPodIdentityWebhook,
        status: &EksPodIdentityWebhookStatus,
    ) -> Result<()> {
        let api: Api<EksPodIdentityWebhook> = Api::all(self.client.clone());

        let mut patch = serde_json::json!({ "status": serde_json::to_value(status)? });
        if let Some(resource_version) = resource.resource_version() {
            patch["metadata"] = serde_json::json!({ "resourceVersion": resource_version });
        }

        api.patch_status(&resource.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .inspect_err(|e| error!("Failed to update EKSPodIdentityWebhook: {}", e))?;
        Ok(())
    }

    /// Api for a namespaced kind, addressing the recorded namespace when there is one
    fn scoped_api<K>(&self, recorded: Option<&ResourceRef>, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        let namespace = recorded
            .and_then(|r| r.namespace.as_deref())
            .unwrap_or(namespace);
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Create the desired object, or adopt the one already carrying its name
    async fn ensure<K>(
        &self,
        resource: &EksPodIdentityWebhook,
        ctx: &GeneratorContext,
        api: &Api<K>,
        desired: K,
    ) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Reassert + Clone + Serialize + DeserializeOwned + Debug,
    {
        let existing = api.get_opt(&desired.name_any()).await.inspect_err(|e| {
            error!("Failed to get {} {}: {}", K::kind(&()), describe(&desired), e)
        })?;
        self.converge(resource, ctx, api, existing, desired).await
    }

    async fn converge<K>(
        &self,
        resource: &EksPodIdentityWebhook,
        ctx: &GeneratorContext,
        api: &Api<K>,
        existing: Option<K>,
        desired: K,
    ) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Reassert + Clone + Serialize + DeserializeOwned + Debug,
    {
        match existing {
            Some(found) => self.reassert(resource, ctx, api, found, Some(&desired)).await,
            None => self.create(resource, api, desired).await,
        }
    }

    async fn create<K>(&self, resource: &EksPodIdentityWebhook, api: &Api<K>, desired: K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug,
    {
        let kind = K::kind(&()).to_string();
        let location = describe(&desired);
        let owner = resource.object_ref(&());

        match api.create(&PostParams::default(), &desired).await {
            Ok(created) => {
                info!("Success to create {} {}", kind, location);
                self.events
                    .publish(
                        &owner,
                        EventType::Normal,
                        &reasons::created(&kind),
                        actions::CREATE,
                        Some(format!("Success to create {}", location)),
                    )
                    .await;
                Ok(created)
            }
            Err(e) => {
                error!("Failed to create {} {}: {}", kind, location, e);
                self.events
                    .publish(
                        &owner,
                        EventType::Warning,
                        &reasons::creation_failed(&kind),
                        actions::CREATE,
                        Some(format!("Failed to create {}", location)),
                    )
                    .await;
                Err(e.into())
            }
        }
    }

    /// Restore ownership and declaration-derived fields; leaves everything else untouched
    async fn reassert<K>(
        &self,
        resource: &EksPodIdentityWebhook,
        ctx: &GeneratorContext,
        api: &Api<K>,
        mut existing: K,
        desired: Option<&K>,
    ) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Reassert + Clone + Serialize + DeserializeOwned + Debug,
    {
        let kind = K::kind(&()).to_string();
        let location = describe(&existing);

        let owner_changed = reassert_owner(existing.meta_mut(), &ctx.owner);
        let fields_changed = match desired {
            Some(desired) => existing.reassert_fields(desired),
            None => false,
        };
        if !owner_changed && !fields_changed {
            debug!("{} {} is up to date", kind, location);
            return Ok(existing);
        }

        let owner = resource.object_ref(&());
        match api
            .replace(&existing.name_any(), &PostParams::default(), &existing)
            .await
        {
            Ok(updated) => {
                info!("Success to update {} {}", kind, location);
                self.events
                    .publish(
                        &owner,
                        EventType::Normal,
                        &reasons::updated(&kind),
                        actions::UPDATE,
                        Some(format!("Success to update {}", location)),
                    )
                    .await;
                Ok(updated)
            }
            Err(e) => {
                error!("Failed to update {} {}: {}", kind, location, e);
                self.events
                    .publish(
                        &owner,
                        EventType::Warning,
                        &reasons::update_failed(&kind),
                        actions::UPDATE,
                        Some(format!("Failed to update {}", location)),
                    )
                    .await;
                Err(e.into())
            }
        }
    }
}

/// Fetch the object a status reference points to; a missing object counts as absent
async fn find<K>(api: &Api<K>, recorded: Option<&ResourceRef>) -> Result<Option<K>>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let name = recorded.map_or(BASE_NAME, |r| r.name.as_str());
    api.get_opt(name)
        .await
        .inspect_err(|e| error!("Failed to get {}: {}", name, e))
        .map_err(InstallerError::from)
}
