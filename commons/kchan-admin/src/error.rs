#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Topic {topic} error: {reason}")]
    Topic { topic: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "strimzi")]
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl AdminError {
    pub fn topic(topic: &str, reason: impl Into<String>) -> Self {
        AdminError::Topic {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }
}
