use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{
    ChildDescriptor, MESSAGING_ROLE, MESSAGING_ROLE_LABEL, Mutator, Ownership,
    ResourceError, apply_options, channel_namespace, channel_service_name,
    dispatcher_labels, owner_reference, service_host,
};
use crate::crd::KafkaChannel;

pub const PORT_NAME: &str = "http";
pub const PORT_NUMBER: i32 = 80;
pub const DISPATCHER_CONTAINER_PORT: i32 = 8080;

pub type ServiceOption = Mutator<Service>;

/// Redirect the channel service to a dispatcher service in another namespace.
/// Replaces the port spec with an `ExternalName` target.
pub fn external_service(
    dispatcher_namespace: &str,
    dispatcher_name: &str,
) -> ServiceOption {
    let namespace = dispatcher_namespace.to_string();
    let name = dispatcher_name.to_string();
    Box::new(move |svc: &mut Service| {
        if namespace.is_empty() || name.is_empty() {
            return Err(ResourceError::Option(
                "external service requires a dispatcher name and namespace"
                    .into(),
            ));
        }
        svc.spec = Some(ServiceSpec {
            type_: Some("ExternalName".to_string()),
            external_name: Some(service_host(&name, &namespace)),
            ..Default::default()
        });
        Ok(())
    })
}

/// Front-end service for `channel`, owned by the channel so the cluster
/// removes it together with its parent.
pub fn make_channel_service(
    channel: &KafkaChannel,
    options: impl IntoIterator<Item = ServiceOption>,
) -> Result<ChildDescriptor<Service>, ResourceError> {
    let mut labels = BTreeMap::new();
    labels.insert(MESSAGING_ROLE_LABEL.to_string(), MESSAGING_ROLE.to_string());
    let draft = Service {
        metadata: ObjectMeta {
            name: Some(channel_service_name(&channel.name_any())),
            namespace: Some(channel_namespace(channel)),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(channel)?]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port: PORT_NUMBER,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let object = apply_options(draft, options)?;
    Ok(ChildDescriptor {
        object,
        ownership: Ownership::GarbageCollected,
    })
}

/// Service in front of the dispatcher pods. It shares the dispatcher's
/// namespace, so no owner reference can point back at the channel.
pub fn make_dispatcher_service(
    channel: &KafkaChannel,
    dispatcher_namespace: &str,
    dispatcher_name: &str,
    options: impl IntoIterator<Item = ServiceOption>,
) -> Result<ChildDescriptor<Service>, ResourceError> {
    let labels = dispatcher_labels(
        &channel_namespace(channel),
        &channel.name_any(),
        dispatcher_name,
    );
    let mut selector = BTreeMap::new();
    selector.insert("app".to_string(), dispatcher_name.to_string());
    let draft = Service {
        metadata: ObjectMeta {
            name: Some(dispatcher_name.to_string()),
            namespace: Some(dispatcher_namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port: PORT_NUMBER,
                target_port: Some(IntOrString::Int(DISPATCHER_CONTAINER_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let object = apply_options(draft, options)?;
    Ok(ChildDescriptor {
        object,
        ownership: Ownership::ManuallyFinalized,
    })
}
