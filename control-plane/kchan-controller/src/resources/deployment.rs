use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};
use kchan_admin::SecretReference;
use kube::ResourceExt;

use super::{
    ChildDescriptor, DISPATCHER_CONTAINER_PORT, Mutator, Ownership,
    ResourceError, apply_options, channel_namespace, dispatcher_labels,
};
use crate::crd::KafkaChannel;

pub type DeploymentOption = Mutator<Deployment>;

/// Inputs for the per-channel dispatcher workload.
#[derive(Clone, Debug)]
pub struct DispatcherParams<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub image: &'a str,
    pub replicas: i32,
    pub topic: &'a str,
    pub secret: &'a SecretReference,
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

pub fn make_dispatcher_deployment(
    channel: &KafkaChannel,
    params: &DispatcherParams<'_>,
    options: impl IntoIterator<Item = DeploymentOption>,
) -> Result<ChildDescriptor<Deployment>, ResourceError> {
    if params.image.is_empty() {
        return Err(ResourceError::Missing("dispatcher image"));
    }
    let channel_ns = channel_namespace(channel);
    let channel_name = channel.name_any();
    let labels = dispatcher_labels(&channel_ns, &channel_name, params.name);
    let mut selector = BTreeMap::new();
    selector.insert("app".to_string(), params.name.to_string());

    let container = Container {
        name: "dispatcher".to_string(),
        image: Some(params.image.to_string()),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: DISPATCHER_CONTAINER_PORT,
            ..Default::default()
        }]),
        env: Some(vec![
            env("KAFKA_TOPIC", params.topic),
            env("CHANNEL_KEY", &format!("{}/{}", channel_ns, channel_name)),
            env("SERVICE_NAME", params.name),
            env("KAFKA_SECRET_NAMESPACE", &params.secret.namespace),
            env("KAFKA_SECRET_NAME", &params.secret.name),
        ]),
        ..Default::default()
    };

    let draft = Deployment {
        metadata: ObjectMeta {
            name: Some(params.name.to_string()),
            namespace: Some(params.namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(params.replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
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
