use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default,
)]
#[kube(
    group = "messaging.knative.dev",
    version = "v1beta1",
    kind = "KafkaChannel",
    plural = "kafkachannels",
    shortname = "kc",
    namespaced,
    status = "KafkaChannelStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaChannelSpec {
    /// Number of partitions of the backing topic (controller default when omitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_partitions: Option<i32>,
    /// Replication factor of the backing topic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<i16>,
    /// ISO-8601 retention duration, e.g. "PT12H" or "P7D"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_duration: Option<String>,
}

#[derive(
    Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaChannelStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

#[derive(
    Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq,
)]
pub struct Address {
    pub url: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash,
)]
pub enum ConditionType {
    Ready,
    Addressable,
    #[serde(rename = "ConfigurationReady")]
    Config,
    #[serde(rename = "TopicReady")]
    Topic,
    #[serde(rename = "ChannelServiceReady")]
    ChannelService,
    #[serde(rename = "DispatcherServiceReady")]
    DispatcherService,
    #[serde(rename = "DispatcherDeploymentReady")]
    DispatcherDeployment,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}
