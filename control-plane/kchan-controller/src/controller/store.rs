use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::Client;
use tracing::{debug, info};

use crate::resources::ChildKind;

pub const FIELD_MANAGER: &str = "kchan-controller";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("missing {0}")]
    Invalid(&'static str),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Create-or-update and delete access to the cluster objects a channel owns.
#[async_trait]
pub trait ChildStore: Send + Sync {
    /// Converge the named service to `svc`, creating it when absent.
    async fn apply_service(&self, svc: &Service) -> Result<Service, StoreError>;

    async fn apply_deployment(
        &self,
        dep: &Deployment,
    ) -> Result<Deployment, StoreError>;

    /// Delete a child. Deleting an absent object succeeds.
    async fn delete(
        &self,
        kind: ChildKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError>;
}

fn target(meta: &ObjectMeta) -> Result<(String, String), StoreError> {
    let ns = meta
        .namespace
        .clone()
        .ok_or(StoreError::Invalid("metadata.namespace"))?;
    let name = meta.name.clone().ok_or(StoreError::Invalid("metadata.name"))?;
    Ok((ns, name))
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Server-side apply against the API server.
#[derive(Clone)]
pub struct KubeChildStore {
    client: Client,
}

impl KubeChildStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChildStore for KubeChildStore {
    async fn apply_service(&self, svc: &Service) -> Result<Service, StoreError> {
        let (ns, name) = target(&svc.metadata)?;
        let api: Api<Service> = Api::namespaced(self.client.clone(), &ns);
        let mut svc_json = serde_json::to_value(svc)?;
        svc_json["apiVersion"] = "v1".into();
        svc_json["kind"] = "Service".into();
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        let applied = api.patch(&name, &pp, &Patch::Apply(&svc_json)).await?;
        debug!(%ns, %name, kind = "Service", "store: applied");
        Ok(applied)
    }

    async fn apply_deployment(
        &self,
        dep: &Deployment,
    ) -> Result<Deployment, StoreError> {
        let (ns, name) = target(&dep.metadata)?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &ns);
        let mut dep_json = serde_json::to_value(dep)?;
        dep_json["apiVersion"] = "apps/v1".into();
        dep_json["kind"] = "Deployment".into();
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        let applied = api.patch(&name, &pp, &Patch::Apply(&dep_json)).await?;
        debug!(%ns, %name, kind = "Deployment", "store: applied");
        Ok(applied)
    }

    async fn delete(
        &self,
        kind: ChildKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let res = match kind {
            ChildKind::Service => {
                let api: Api<Service> =
                    Api::namespaced(self.client.clone(), namespace);
                api.delete(name, &DeleteParams::default())
                    .await
                    .map(|_| ())
            }
            ChildKind::Deployment => {
                let api: Api<Deployment> =
                    Api::namespaced(self.client.clone(), namespace);
                api.delete(name, &DeleteParams::default())
                    .await
                    .map(|_| ())
            }
        };
        match res {
            Ok(_) => {
                info!(%namespace, %name, %kind, "store: deleted");
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                debug!(%namespace, %name, %kind, "store: already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
