use crate::config::AdminConfig;
use crate::error::AdminError;
use async_trait::async_trait;

pub type AdminResult<T> = Result<T, AdminError>;

/// Desired settings for a backing topic. Only used on creation; existing
/// topics are never reconfigured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub num_partitions: i32,
    pub replication_factor: i16,
    pub retention_ms: i64,
}

/// Location of the secret holding broker credentials for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretReference {
    pub namespace: String,
    pub name: String,
}

/// A single administrative connection. Implementations are not expected to
/// survive long idle periods, so callers open one per unit of work and close
/// it afterwards.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Look up the credentials secret bound to `topic`. `Ok(None)` means no
    /// secret is bound, which is not an error at this layer.
    async fn resolve_secret_reference(
        &self,
        topic: &str,
    ) -> AdminResult<Option<SecretReference>>;

    /// Create the topic when absent. Must not modify an existing topic.
    async fn ensure_topic(
        &self,
        name: &str,
        config: &TopicConfig,
    ) -> AdminResult<()>;

    /// Delete the topic. Deleting an absent topic succeeds.
    async fn delete_topic(&self, name: &str) -> AdminResult<()>;

    /// Close the underlying connection. Calling close twice is allowed.
    async fn close(&mut self) -> AdminResult<()>;
}

#[async_trait]
pub trait AdminClientFactory: Send + Sync {
    /// Open a fresh connection using the given configuration snapshot.
    /// `component` identifies the caller to the backend.
    async fn create(
        &self,
        config: &AdminConfig,
        component: &str,
    ) -> AdminResult<Box<dyn AdminClient>>;
}
