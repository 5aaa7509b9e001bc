//! Kubernetes-native admin backend.
//!
//! Topics are managed as Strimzi `KafkaTopic` objects in the Kafka namespace
//! and the topic operator performs the broker-side work. Credentials secrets
//! are discovered by label in the configured secret namespace.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

use crate::config::AdminConfig;
use crate::error::AdminError;
use crate::traits::*;

pub const KAFKA_SECRET_LABEL: &str = "eventing-kafka.knative.dev/kafka-secret";
pub const STRIMZI_CLUSTER_LABEL: &str = "strimzi.io/cluster";

fn kafka_topic_resource() -> ApiResource {
    let mut ar = ApiResource::from_gvk(&GroupVersionKind::gvk(
        "kafka.strimzi.io",
        "v1beta2",
        "KafkaTopic",
    ));
    ar.plural = "kafkatopics".into();
    ar
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

/// Opens a brand new kube client for every admin connection.
#[derive(Clone)]
pub struct StrimziAdminFactory {
    kube_config: kube::Config,
}

impl StrimziAdminFactory {
    pub fn new(kube_config: kube::Config) -> Self {
        Self { kube_config }
    }

    /// Build from the in-cluster or local kubeconfig.
    pub async fn infer() -> Result<Self, AdminError> {
        let kube_config = kube::Config::infer()
            .await
            .map_err(|e| AdminError::Config(e.to_string()))?;
        Ok(Self::new(kube_config))
    }
}

#[async_trait]
impl AdminClientFactory for StrimziAdminFactory {
    async fn create(
        &self,
        config: &AdminConfig,
        component: &str,
    ) -> AdminResult<Box<dyn AdminClient>> {
        config.validate()?;
        let client = Client::try_from(self.kube_config.clone())
            .map_err(|e| AdminError::Connection(e.to_string()))?;
        debug!(
            component,
            brokers = ?config.broker_list(),
            namespace = %config.kafka_namespace,
            cluster = %config.cluster_name,
            "strimzi admin: client created"
        );
        Ok(Box::new(StrimziAdminClient {
            client: Some(client),
            config: config.clone(),
        }))
    }
}

pub struct StrimziAdminClient {
    client: Option<Client>,
    config: AdminConfig,
}

impl StrimziAdminClient {
    fn client(&self) -> AdminResult<Client> {
        self.client
            .clone()
            .ok_or_else(|| AdminError::Connection("connection closed".into()))
    }

    fn topics_api(&self) -> AdminResult<Api<DynamicObject>> {
        Ok(Api::namespaced_with(
            self.client()?,
            &self.config.kafka_namespace,
            &kafka_topic_resource(),
        ))
    }
}

#[async_trait]
impl AdminClient for StrimziAdminClient {
    async fn resolve_secret_reference(
        &self,
        topic: &str,
    ) -> AdminResult<Option<SecretReference>> {
        let api: Api<Secret> =
            Api::namespaced(self.client()?, &self.config.secret_namespace);
        let lp = ListParams::default().labels(&format!("{}=true", KAFKA_SECRET_LABEL));
        let list = api.list(&lp).await?;
        let mut names: Vec<String> =
            list.items.iter().map(|s| s.name_any()).collect();
        names.sort();
        let found = names.into_iter().next().map(|name| SecretReference {
            namespace: self.config.secret_namespace.clone(),
            name,
        });
        debug!(%topic, secret = ?found, "strimzi admin: resolved secret reference");
        Ok(found)
    }

    async fn ensure_topic(
        &self,
        name: &str,
        config: &TopicConfig,
    ) -> AdminResult<()> {
        let api = self.topics_api()?;
        if api.get_opt(name).await?.is_some() {
            debug!(topic = %name, "strimzi admin: topic already present");
            return Ok(());
        }
        let manifest = json!({
            "apiVersion": "kafka.strimzi.io/v1beta2",
            "kind": "KafkaTopic",
            "metadata": {
                "name": name,
                "namespace": self.config.kafka_namespace,
                "labels": { STRIMZI_CLUSTER_LABEL: self.config.cluster_name },
            },
            "spec": {
                "topicName": name,
                "partitions": config.num_partitions,
                "replicas": config.replication_factor,
                "config": { "retention.ms": config.retention_ms.to_string() },
            }
        });
        let obj: DynamicObject = serde_json::from_value(manifest)?;
        match api.create(&PostParams::default(), &obj).await {
            Ok(_) => {
                info!(topic = %name, partitions = config.num_partitions, "strimzi admin: topic created");
                Ok(())
            }
            // lost a race with another writer; the topic exists either way
            Err(e) if is_status(&e, 409) => Ok(()),
            Err(e) => Err(AdminError::topic(name, e.to_string())),
        }
    }

    async fn delete_topic(&self, name: &str) -> AdminResult<()> {
        let api = self.topics_api()?;
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(topic = %name, "strimzi admin: topic deleted");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(AdminError::topic(name, e.to_string())),
        }
    }

    async fn close(&mut self) -> AdminResult<()> {
        self.client.take();
        Ok(())
    }
}
