use kube::ResourceExt;
use sha2::{Digest, Sha256};

use crate::crd::KafkaChannel;

pub const CHANNEL_SERVICE_SUFFIX: &str = "-kn-channel";
pub const DISPATCHER_SUFFIX: &str = "-dispatcher";
const MAX_DNS_LABEL: usize = 63;
const HASH_LEN: usize = 8;

pub fn channel_namespace(channel: &KafkaChannel) -> String {
    channel.namespace().unwrap_or_else(|| "default".to_string())
}

/// Name of the front-end service in the channel's namespace.
pub fn channel_service_name(channel_name: &str) -> String {
    format!("{}{}", channel_name, CHANNEL_SERVICE_SUFFIX)
}

/// Topic backing a channel. Namespaces cannot contain dots, so the
/// `<namespace>.<name>` form never collides between channels.
pub fn topic_name(namespace: &str, name: &str) -> String {
    format!("{}.{}", namespace, name)
}

pub fn channel_topic(channel: &KafkaChannel) -> String {
    topic_name(&channel_namespace(channel), &channel.name_any())
}

/// Cluster-local DNS name of a service.
pub fn service_host(name: &str, namespace: &str) -> String {
    format!("{}.{}.svc.cluster.local", name, namespace)
}

pub fn channel_url(channel: &KafkaChannel) -> String {
    format!(
        "http://{}",
        service_host(
            &channel_service_name(&channel.name_any()),
            &channel_namespace(channel)
        )
    )
}

/// Dispatcher workload name, unique per channel and valid as a DNS-1123
/// label. Over-long names are truncated and suffixed with a digest of the
/// full name.
pub fn dispatcher_name(namespace: &str, name: &str) -> String {
    let full = format!("{}-{}{}", name, namespace, DISPATCHER_SUFFIX);
    if full.len() <= MAX_DNS_LABEL {
        return full;
    }
    let digest = Sha256::digest(full.as_bytes());
    let hash: String = digest
        .iter()
        .take(HASH_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect();
    let keep = MAX_DNS_LABEL - HASH_LEN - 1;
    let prefix = full[..keep].trim_end_matches('-');
    format!("{}-{}", prefix, hash)
}

pub fn channel_dispatcher(channel: &KafkaChannel) -> String {
    dispatcher_name(&channel_namespace(channel), &channel.name_any())
}
