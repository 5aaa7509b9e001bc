//! Desired-state construction for the children of a `KafkaChannel`.
//!
//! Builders are pure: they take the parent and a list of options and return a
//! complete descriptor or an error, never a half-built object.

pub mod deployment;
pub mod names;
pub mod service;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

use crate::crd::KafkaChannel;

pub use deployment::*;
pub use names::*;
pub use service::*;

pub const MESSAGING_ROLE_LABEL: &str = "messaging.knative.dev/role";
pub const MESSAGING_ROLE: &str = "kafka-channel";
pub const DISPATCHER_LABEL: &str = "kafkachannel.knative.dev/dispatcher";
pub const CHANNEL_NAME_LABEL: &str = "kafkachannel.knative.dev/channel-name";
pub const CHANNEL_NAMESPACE_LABEL: &str =
    "kafkachannel.knative.dev/channel-namespace";

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("construction option failed: {0}")]
    Option(String),
    #[error("missing required field: {0}")]
    Missing(&'static str),
}

/// How a child is cleaned up when its channel goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Same namespace as the channel; owner reference lets the cluster
    /// cascade the delete.
    GarbageCollected,
    /// Lives in another namespace; must be deleted by finalization.
    ManuallyFinalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    Service,
    Deployment,
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildKind::Service => write!(f, "Service"),
            ChildKind::Deployment => write!(f, "Deployment"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChildDescriptor<K> {
    pub object: K,
    pub ownership: Ownership,
}

/// Identity of a child without its desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub kind: ChildKind,
    pub namespace: String,
    pub name: String,
    pub ownership: Ownership,
}

/// A fallible mutation applied to a draft object during construction.
pub type Mutator<K> =
    Box<dyn FnOnce(&mut K) -> Result<(), ResourceError> + Send>;

/// Apply `options` to `draft` in order. The first failure drops the draft and
/// is returned as is.
pub fn apply_options<K>(
    mut draft: K,
    options: impl IntoIterator<Item = Mutator<K>>,
) -> Result<K, ResourceError> {
    for option in options {
        option(&mut draft)?;
    }
    Ok(draft)
}

pub(crate) fn owner_reference(
    channel: &KafkaChannel,
) -> Result<OwnerReference, ResourceError> {
    channel
        .controller_owner_ref(&())
        .ok_or(ResourceError::Missing("metadata.uid"))
}

pub(crate) fn dispatcher_labels(
    channel_ns: &str,
    channel_name: &str,
    dispatcher: &str,
) -> BTreeMap<String, String> {
    let mut lbls = BTreeMap::new();
    lbls.insert("app".to_string(), dispatcher.to_string());
    lbls.insert(DISPATCHER_LABEL.to_string(), "true".to_string());
    lbls.insert(CHANNEL_NAME_LABEL.to_string(), channel_name.to_string());
    lbls.insert(CHANNEL_NAMESPACE_LABEL.to_string(), channel_ns.to_string());
    lbls
}

/// Every child the controller manages for `channel`, in teardown order.
pub fn child_refs(
    channel: &KafkaChannel,
    dispatcher_namespace: &str,
) -> Vec<ChildRef> {
    let ns = channel_namespace(channel);
    let dispatcher = channel_dispatcher(channel);
    vec![
        ChildRef {
            kind: ChildKind::Deployment,
            namespace: dispatcher_namespace.to_string(),
            name: dispatcher.clone(),
            ownership: Ownership::ManuallyFinalized,
        },
        ChildRef {
            kind: ChildKind::Service,
            namespace: dispatcher_namespace.to_string(),
            name: dispatcher,
            ownership: Ownership::ManuallyFinalized,
        },
        ChildRef {
            kind: ChildKind::Service,
            namespace: ns,
            name: channel_service_name(&kube::ResourceExt::name_any(channel)),
            ownership: Ownership::GarbageCollected,
        },
    ]
}
