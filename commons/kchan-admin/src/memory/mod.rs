use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::config::AdminConfig;
use crate::error::AdminError;
use crate::traits::*;

#[derive(Default)]
struct MemoryState {
    topics: HashMap<String, TopicConfig>,
    secret: Option<SecretReference>,
}

/// In-process stand-in for a broker cluster. Every connection created by the
/// factory shares the same topic registry.
#[derive(Clone, Default)]
pub struct MemoryAdminBackend {
    state: Arc<RwLock<MemoryState>>,
    open: Arc<AtomicUsize>,
}

impl MemoryAdminBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose topics all resolve to the given credentials secret.
    pub fn with_secret(namespace: &str, name: &str) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                topics: HashMap::new(),
                secret: Some(SecretReference {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }),
            })),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn set_secret(&self, secret: Option<SecretReference>) {
        self.state.write().await.secret = secret;
    }

    pub async fn topic(&self, name: &str) -> Option<TopicConfig> {
        self.state.read().await.topics.get(name).cloned()
    }

    pub async fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.state.read().await.topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of connections currently open against this backend.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdminClientFactory for MemoryAdminBackend {
    async fn create(
        &self,
        config: &AdminConfig,
        component: &str,
    ) -> AdminResult<Box<dyn AdminClient>> {
        config.validate()?;
        self.open.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(component, brokers = %config.brokers, "memory admin: connection opened");
        Ok(Box::new(MemoryAdminClient {
            state: self.state.clone(),
            open: self.open.clone(),
            closed: false,
        }))
    }
}

pub struct MemoryAdminClient {
    state: Arc<RwLock<MemoryState>>,
    open: Arc<AtomicUsize>,
    closed: bool,
}

impl MemoryAdminClient {
    fn check_open(&self) -> AdminResult<()> {
        if self.closed {
            return Err(AdminError::Connection("connection closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AdminClient for MemoryAdminClient {
    async fn resolve_secret_reference(
        &self,
        _topic: &str,
    ) -> AdminResult<Option<SecretReference>> {
        self.check_open()?;
        Ok(self.state.read().await.secret.clone())
    }

    async fn ensure_topic(
        &self,
        name: &str,
        config: &TopicConfig,
    ) -> AdminResult<()> {
        self.check_open()?;
        if config.num_partitions < 1 {
            return Err(AdminError::topic(name, "partitions must be positive"));
        }
        if config.replication_factor < 1 {
            return Err(AdminError::topic(
                name,
                "replication factor must be positive",
            ));
        }
        let mut state = self.state.write().await;
        state
            .topics
            .entry(name.to_string())
            .or_insert_with(|| config.clone());
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> AdminResult<()> {
        self.check_open()?;
        self.state.write().await.topics.remove(name);
        Ok(())
    }

    async fn close(&mut self) -> AdminResult<()> {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemoryAdminClient {
    fn drop(&mut self) {
        if !self.closed {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TopicConfig {
        TopicConfig {
            num_partitions: 3,
            replication_factor: 1,
            retention_ms: 1000,
        }
    }

    #[tokio::test]
    async fn ensure_topic_does_not_overwrite() {
        let backend = MemoryAdminBackend::new();
        let client = backend
            .create(&AdminConfig::default(), "test")
            .await
            .unwrap();
        client.ensure_topic("ns.ch", &cfg()).await.unwrap();
        let mut changed = cfg();
        changed.num_partitions = 10;
        client.ensure_topic("ns.ch", &changed).await.unwrap();
        assert_eq!(backend.topic("ns.ch").await.unwrap().num_partitions, 3);
    }

    #[tokio::test]
    async fn delete_absent_topic_succeeds() {
        let backend = MemoryAdminBackend::new();
        let client = backend
            .create(&AdminConfig::default(), "test")
            .await
            .unwrap();
        client.delete_topic("missing").await.unwrap();
    }

    #[tokio::test]
    async fn closed_client_rejects_calls_and_releases_gauge() {
        let backend = MemoryAdminBackend::with_secret("knative-eventing", "kafka");
        let mut client = backend
            .create(&AdminConfig::default(), "test")
            .await
            .unwrap();
        assert_eq!(backend.open_connections(), 1);
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert_eq!(backend.open_connections(), 0);
        let err = client.resolve_secret_reference("t").await.unwrap_err();
        assert!(matches!(err, AdminError::Connection(_)));
    }

    #[tokio::test]
    async fn dropped_client_releases_gauge() {
        let backend = MemoryAdminBackend::new();
        let client = backend
            .create(&AdminConfig::default(), "test")
            .await
            .unwrap();
        drop(client);
        assert_eq!(backend.open_connections(), 0);
    }
}
