use k8s_openapi::api::apps::v1::Deployment;
use kchan_admin::SecretReference;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::error::StageError;
use super::store::ChildStore;
use crate::crd::KafkaChannel;
use crate::resources::{
    ChildKind, DispatcherParams, Ownership, channel_dispatcher,
    channel_namespace, channel_topic, child_refs, make_dispatcher_deployment,
    make_dispatcher_service,
};

#[derive(Clone, Debug)]
pub struct DispatcherSettings {
    pub namespace: String,
    pub image: String,
    pub replicas: i32,
}

/// Outcome of converging the dispatcher; the service and the deployment are
/// reported separately so each drives its own condition.
pub struct DispatcherReport {
    pub service: Result<(), StageError>,
    pub deployment: Result<Deployment, StageError>,
}

impl DispatcherReport {
    pub fn into_errors(self) -> Vec<StageError> {
        let mut errors = Vec::new();
        if let Err(e) = self.service {
            errors.push(e);
        }
        if let Err(e) = self.deployment {
            errors.push(e);
        }
        errors
    }
}

/// Converge the per-channel dispatcher service and deployment in the
/// dispatcher namespace. Both are attempted regardless of each other.
#[instrument(skip_all, fields(ns = %channel_namespace(channel), name = %channel.name_any()))]
pub async fn reconcile_dispatcher(
    store: &dyn ChildStore,
    channel: &KafkaChannel,
    settings: &DispatcherSettings,
    secret: &SecretReference,
) -> DispatcherReport {
    let dispatcher = channel_dispatcher(channel);
    let topic = channel_topic(channel);
    let (service, deployment) = tokio::join!(
        converge_service(store, channel, settings, &dispatcher),
        converge_deployment(store, channel, settings, &dispatcher, &topic, secret),
    );
    DispatcherReport {
        service,
        deployment,
    }
}

async fn converge_service(
    store: &dyn ChildStore,
    channel: &KafkaChannel,
    settings: &DispatcherSettings,
    dispatcher: &str,
) -> Result<(), StageError> {
    let desc = make_dispatcher_service(
        channel,
        &settings.namespace,
        dispatcher,
        vec![],
    )
    .map_err(|source| StageError::Build {
        kind: ChildKind::Service,
        name: dispatcher.to_string(),
        source,
    })?;
    store
        .apply_service(&desc.object)
        .await
        .map_err(|source| StageError::Convergence {
            kind: ChildKind::Service,
            namespace: settings.namespace.clone(),
            name: dispatcher.to_string(),
            source,
        })?;
    debug!(service = %dispatcher, "dispatcher service converged");
    Ok(())
}

async fn converge_deployment(
    store: &dyn ChildStore,
    channel: &KafkaChannel,
    settings: &DispatcherSettings,
    dispatcher: &str,
    topic: &str,
    secret: &SecretReference,
) -> Result<Deployment, StageError> {
    let params = DispatcherParams {
        namespace: &settings.namespace,
        name: dispatcher,
        image: &settings.image,
        replicas: settings.replicas,
        topic,
        secret,
    };
    let desc = make_dispatcher_deployment(channel, &params, vec![]).map_err(
        |source| StageError::Build {
            kind: ChildKind::Deployment,
            name: dispatcher.to_string(),
            source,
        },
    )?;
    let applied = store.apply_deployment(&desc.object).await.map_err(
        |source| StageError::Convergence {
            kind: ChildKind::Deployment,
            namespace: settings.namespace.clone(),
            name: dispatcher.to_string(),
            source,
        },
    )?;
    debug!(deployment = %dispatcher, "dispatcher deployment converged");
    Ok(applied)
}

/// Delete the children that cannot be garbage collected through owner
/// references. Stops at the first failure.
#[instrument(skip_all, fields(ns = %channel_namespace(channel), name = %channel.name_any()))]
pub async fn finalize_dispatcher(
    store: &dyn ChildStore,
    channel: &KafkaChannel,
    dispatcher_namespace: &str,
) -> Result<(), StageError> {
    for child in child_refs(channel, dispatcher_namespace)
        .into_iter()
        .filter(|c| c.ownership == Ownership::ManuallyFinalized)
    {
        store
            .delete(child.kind, &child.namespace, &child.name)
            .await
            .map_err(|source| StageError::Teardown {
                kind: child.kind,
                namespace: child.namespace.clone(),
                name: child.name.clone(),
                source,
            })?;
        debug!(kind = %child.kind, child = %child.name, "dispatcher child removed");
    }
    info!("dispatcher finalized");
    Ok(())
}
