use kube::ResourceExt;
use tracing::{debug, instrument};

use super::error::StageError;
use super::store::ChildStore;
use crate::crd::KafkaChannel;
use crate::resources::{
    ChildKind, channel_dispatcher, channel_namespace, channel_service_name,
    channel_url, external_service, make_channel_service,
};

/// Converge the channel's front-end service, an `ExternalName` redirect to
/// the channel's dispatcher service. Returns the channel's address.
#[instrument(skip_all, fields(ns = %channel_namespace(channel), name = %channel.name_any()))]
pub async fn reconcile_channel(
    store: &dyn ChildStore,
    channel: &KafkaChannel,
    dispatcher_namespace: &str,
) -> Result<String, StageError> {
    let name = channel_service_name(&channel.name_any());
    let desc = make_channel_service(
        channel,
        vec![external_service(
            dispatcher_namespace,
            &channel_dispatcher(channel),
        )],
    )
    .map_err(|source| StageError::Build {
        kind: ChildKind::Service,
        name: name.clone(),
        source,
    })?;
    store
        .apply_service(&desc.object)
        .await
        .map_err(|source| StageError::Convergence {
            kind: ChildKind::Service,
            namespace: channel_namespace(channel),
            name: name.clone(),
            source,
        })?;
    debug!(service = %name, "channel service converged");
    Ok(channel_url(channel))
}
