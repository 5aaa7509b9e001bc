//! Per-attempt administrative sessions.
//!
//! The admin connection does not survive idle periods reliably, so a fresh one
//! is opened for every reconciliation or finalization attempt and closed
//! before the attempt returns. A single lock per controller instance keeps at
//! most one connection open at any time.

use std::collections::BTreeMap;
use std::sync::Arc;

use kchan_admin::{AdminClient, AdminClientFactory, AdminConfig};
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tracing::{debug, error, info, warn};

use super::error::StageError;

pub const COMPONENT_NAME: &str = "kafkachannel-controller";

/// Latest-wins feed of admin configuration snapshots.
#[derive(Clone)]
pub struct ConfigFeed {
    tx: Arc<watch::Sender<Arc<AdminConfig>>>,
}

impl ConfigFeed {
    /// Replace the current snapshot. Sessions already open keep the config
    /// they were created with.
    pub fn publish(&self, config: AdminConfig) {
        info!(brokers = %config.brokers, "admin configuration updated");
        self.tx.send_replace(Arc::new(config));
    }

    pub fn current(&self) -> Arc<AdminConfig> {
        self.tx.borrow().clone()
    }

    /// Merge config-map data over the current snapshot and publish the result.
    /// Invalid data is logged and the current snapshot is kept.
    pub fn apply_config_map(
        &self,
        data: Option<&BTreeMap<String, String>>,
    ) -> bool {
        let Some(data) = data else {
            warn!("config map has no data; ignoring");
            return false;
        };
        match self.current().with_overrides(data) {
            Ok(next) if next == *self.current() => {
                debug!("config map unchanged; keeping admin configuration");
                false
            }
            Ok(next) => {
                self.publish(next);
                true
            }
            Err(e) => {
                error!(error = %e, "could not load admin settings from config map");
                false
            }
        }
    }
}

pub struct AdminSessionManager {
    factory: Arc<dyn AdminClientFactory>,
    config: watch::Receiver<Arc<AdminConfig>>,
    lock: Arc<Mutex<()>>,
}

impl AdminSessionManager {
    pub fn new(
        factory: Arc<dyn AdminClientFactory>,
        initial: AdminConfig,
    ) -> (Self, ConfigFeed) {
        let (tx, rx) = watch::channel(Arc::new(initial));
        let manager = Self {
            factory,
            config: rx,
            lock: Arc::new(Mutex::new(())),
        };
        (manager, ConfigFeed { tx: Arc::new(tx) })
    }

    /// Wait for the session lock, then open a connection with the latest
    /// configuration. A connection failure is logged and yields a session
    /// without a client; stages that need one fail with `NoAdminSession`.
    pub async fn acquire(&self) -> AdminSession {
        let guard = self.lock.clone().lock_owned().await;
        let config = self.config.borrow().clone();
        let client = match self.factory.create(&config, COMPONENT_NAME).await
        {
            Ok(c) => {
                debug!("admin session opened");
                Some(c)
            }
            Err(e) => {
                error!(error = %e, "failed to create admin client");
                None
            }
        };
        AdminSession {
            client,
            _guard: guard,
        }
    }
}

/// An admin connection bound to one attempt. Holds the manager's lock until
/// dropped.
pub struct AdminSession {
    // declared before the guard so the connection is gone before the lock is
    client: Option<Box<dyn AdminClient>>,
    _guard: OwnedMutexGuard<()>,
}

impl AdminSession {
    pub fn client(&self) -> Result<&dyn AdminClient, StageError> {
        self.client.as_deref().ok_or(StageError::NoAdminSession)
    }

    /// Close the connection. Releasing a session that has no connection, or
    /// releasing twice, does nothing.
    pub async fn release(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.close().await {
                error!(error = %e, "failed to close admin client");
            } else {
                debug!("admin session closed");
            }
        }
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!("admin session dropped without release; closing connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kchan_admin::memory::MemoryAdminBackend;
    use kchan_admin::{AdminError, AdminResult};

    struct FailingFactory;

    #[async_trait]
    impl AdminClientFactory for FailingFactory {
        async fn create(
            &self,
            _config: &AdminConfig,
            _component: &str,
        ) -> AdminResult<Box<dyn AdminClient>> {
            Err(AdminError::Connection("refused".into()))
        }
    }

    #[tokio::test]
    async fn failed_acquire_yields_empty_session() {
        let (mgr, _feed) = AdminSessionManager::new(
            Arc::new(FailingFactory),
            AdminConfig::default(),
        );
        let mut session = mgr.acquire().await;
        assert!(matches!(session.client(), Err(StageError::NoAdminSession)));
        session.release().await;
        session.release().await;
    }

    #[tokio::test]
    async fn release_closes_connection_and_is_idempotent() {
        let backend = MemoryAdminBackend::new();
        let (mgr, _feed) = AdminSessionManager::new(
            Arc::new(backend.clone()),
            AdminConfig::default(),
        );
        let mut session = mgr.acquire().await;
        assert_eq!(backend.open_connections(), 1);
        session.release().await;
        assert_eq!(backend.open_connections(), 0);
        session.release().await;
        assert_eq!(backend.open_connections(), 0);
    }

    #[tokio::test]
    async fn lock_is_released_with_the_session() {
        let (mgr, _feed) = AdminSessionManager::new(
            Arc::new(MemoryAdminBackend::new()),
            AdminConfig::default(),
        );
        let mut first = mgr.acquire().await;
        first.release().await;
        drop(first);
        let mut second = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            mgr.acquire(),
        )
        .await
        .expect("second acquire should not block");
        second.release().await;
    }

    #[test]
    fn feed_is_latest_wins_and_ignores_bad_data() {
        let (_mgr, feed) = AdminSessionManager::new(
            Arc::new(MemoryAdminBackend::new()),
            AdminConfig::default(),
        );
        let mut data = BTreeMap::new();
        data.insert(kchan_admin::KEY_BROKERS.to_string(), "a:1".to_string());
        assert!(feed.apply_config_map(Some(&data)));
        data.insert(kchan_admin::KEY_BROKERS.to_string(), "b:2".to_string());
        assert!(feed.apply_config_map(Some(&data)));
        assert_eq!(feed.current().brokers, "b:2");

        data.insert(kchan_admin::KEY_BROKERS.to_string(), "".to_string());
        assert!(!feed.apply_config_map(Some(&data)));
        assert!(!feed.apply_config_map(None));
        assert_eq!(feed.current().brokers, "b:2");
    }
}
