#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition, DeploymentStatus};
use k8s_openapi::api::core::v1::Service;
use kchan_admin::memory::MemoryAdminBackend;
use kchan_admin::{
    AdminClient, AdminClientFactory, AdminConfig, AdminError, AdminResult,
    SecretReference, TopicConfig,
};
use kchan_controller::config::TopicDefaultsConfig;
use kchan_controller::controller::dispatcher::DispatcherSettings;
use kchan_controller::controller::{
    AdminSessionManager, ChildStore, ConfigFeed, KafkaChannelReconciler,
    ReconcilerSettings, StoreError,
};
use kchan_controller::crd::{KafkaChannel, KafkaChannelSpec};
use kchan_controller::resources::ChildKind;

pub const KC_NAME: &str = "my-test-kc";
pub const TEST_NS: &str = "my-test-ns";
pub const SYSTEM_NS: &str = "knative-eventing";
pub const SECRET_NAME: &str = "kafka-cluster";

pub fn channel(ns: &str, name: &str) -> KafkaChannel {
    let mut kc = KafkaChannel::new(name, KafkaChannelSpec::default());
    kc.metadata.namespace = Some(ns.to_string());
    kc.metadata.uid = Some(format!("uid-{ns}-{name}"));
    kc.metadata.generation = Some(1);
    kc
}

pub fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        dispatcher: DispatcherSettings {
            namespace: SYSTEM_NS.to_string(),
            image: "dispatcher:test".to_string(),
            replicas: 1,
        },
        topic: TopicDefaultsConfig {
            num_partitions: 4,
            replication_factor: 1,
            retention_ms: 604_800_000,
        },
    }
}

pub fn reconciler(
    factory: Arc<dyn AdminClientFactory>,
    store: Arc<MemoryChildStore>,
) -> (Arc<KafkaChannelReconciler>, ConfigFeed) {
    let (sessions, feed) =
        AdminSessionManager::new(factory, AdminConfig::default());
    let r = KafkaChannelReconciler::new(sessions, store, settings());
    (Arc::new(r), feed)
}

/// Child store backed by maps, with call recording and failure injection.
#[derive(Default)]
pub struct MemoryChildStore {
    services: Mutex<BTreeMap<(String, String), Service>>,
    deployments: Mutex<BTreeMap<(String, String), Deployment>>,
    deletes: Mutex<Vec<(ChildKind, String, String)>>,
    applies: AtomicUsize,
    fail_service: Mutex<Option<String>>,
    fail_delete: AtomicBool,
    fail_deployment: AtomicBool,
    available: AtomicBool,
}

impl MemoryChildStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Report applied deployments as Available.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_service_named(&self, name: &str) {
        *self.fail_service.lock().unwrap() = Some(name.to_string());
    }

    pub fn set_fail_deployment(&self, fail: bool) {
        self.fail_deployment.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn service(&self, ns: &str, name: &str) -> Option<Service> {
        self.services
            .lock()
            .unwrap()
            .get(&(ns.to_string(), name.to_string()))
            .cloned()
    }

    pub fn deployment(&self, ns: &str, name: &str) -> Option<Deployment> {
        self.deployments
            .lock()
            .unwrap()
            .get(&(ns.to_string(), name.to_string()))
            .cloned()
    }

    pub fn deletes(&self) -> Vec<(ChildKind, String, String)> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn apply_count(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }
}

fn key(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> Result<(String, String), StoreError> {
    Ok((
        meta.namespace.clone().ok_or(StoreError::Invalid("metadata.namespace"))?,
        meta.name.clone().ok_or(StoreError::Invalid("metadata.name"))?,
    ))
}

#[async_trait]
impl ChildStore for MemoryChildStore {
    async fn apply_service(&self, svc: &Service) -> Result<Service, StoreError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        let k = key(&svc.metadata)?;
        if self.fail_service.lock().unwrap().as_deref() == Some(k.1.as_str()) {
            return Err(StoreError::Backend(format!("injected failure for {}", k.1)));
        }
        self.services.lock().unwrap().insert(k, svc.clone());
        Ok(svc.clone())
    }

    async fn apply_deployment(
        &self,
        dep: &Deployment,
    ) -> Result<Deployment, StoreError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        let k = key(&dep.metadata)?;
        if self.fail_deployment.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("injected failure for {}", k.1)));
        }
        let mut applied = dep.clone();
        if self.available.load(Ordering::SeqCst) {
            applied.status = Some(DeploymentStatus {
                conditions: Some(vec![DeploymentCondition {
                    type_: "Available".into(),
                    status: "True".into(),
                    ..Default::default()
                }]),
                ..Default::default()
            });
        }
        self.deployments.lock().unwrap().insert(k, applied.clone());
        Ok(applied)
    }

    async fn delete(
        &self,
        kind: ChildKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected delete failure".into()));
        }
        let k = (namespace.to_string(), name.to_string());
        match kind {
            ChildKind::Service => {
                self.services.lock().unwrap().remove(&k);
            }
            ChildKind::Deployment => {
                self.deployments.lock().unwrap().remove(&k);
            }
        }
        self.deletes
            .lock()
            .unwrap()
            .push((kind, k.0, k.1));
        Ok(())
    }
}

/// Counters shared between an instrumented factory and its clients.
#[derive(Default)]
pub struct AdminGauge {
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub created: AtomicUsize,
    pub topic_deletes: AtomicUsize,
    pub configs: Mutex<Vec<AdminConfig>>,
}

impl AdminGauge {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn topic_deletes(&self) -> usize {
        self.topic_deletes.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<AdminConfig> {
        self.configs.lock().unwrap().last().cloned()
    }
}

/// Wraps the in-memory backend and records how sessions are used.
pub struct InstrumentedFactory {
    pub backend: MemoryAdminBackend,
    pub gauge: Arc<AdminGauge>,
    fail_connect: AtomicBool,
    fail_ensure: Arc<AtomicBool>,
}

impl InstrumentedFactory {
    pub fn with_secret() -> Arc<Self> {
        Self::wrap(MemoryAdminBackend::with_secret(SYSTEM_NS, SECRET_NAME))
    }

    pub fn without_secret() -> Arc<Self> {
        Self::wrap(MemoryAdminBackend::new())
    }

    fn wrap(backend: MemoryAdminBackend) -> Arc<Self> {
        Arc::new(Self {
            backend,
            gauge: Arc::new(AdminGauge::default()),
            fail_connect: AtomicBool::new(false),
            fail_ensure: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make topic creation fail on every client, open or future.
    pub fn set_fail_ensure(&self, fail: bool) {
        self.fail_ensure.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AdminClientFactory for InstrumentedFactory {
    async fn create(
        &self,
        config: &AdminConfig,
        component: &str,
    ) -> AdminResult<Box<dyn AdminClient>> {
        self.gauge.configs.lock().unwrap().push(config.clone());
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(AdminError::Connection("broker unreachable".into()));
        }
        let inner = self.backend.create(config, component).await?;
        self.gauge.created.fetch_add(1, Ordering::SeqCst);
        let now = self.gauge.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.max_live.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(InstrumentedClient {
            inner,
            gauge: self.gauge.clone(),
            fail_ensure: self.fail_ensure.clone(),
            closed: false,
        }))
    }
}

struct InstrumentedClient {
    inner: Box<dyn AdminClient>,
    gauge: Arc<AdminGauge>,
    fail_ensure: Arc<AtomicBool>,
    closed: bool,
}

#[async_trait]
impl AdminClient for InstrumentedClient {
    async fn resolve_secret_reference(
        &self,
        topic: &str,
    ) -> AdminResult<Option<SecretReference>> {
        self.inner.resolve_secret_reference(topic).await
    }

    async fn ensure_topic(
        &self,
        name: &str,
        config: &TopicConfig,
    ) -> AdminResult<()> {
        // widen the window in which overlapping sessions would be observed
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.fail_ensure.load(Ordering::SeqCst) {
            return Err(AdminError::topic(name, "not enough brokers"));
        }
        self.inner.ensure_topic(name, config).await
    }

    async fn delete_topic(&self, name: &str) -> AdminResult<()> {
        self.gauge.topic_deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_topic(name).await
    }

    async fn close(&mut self) -> AdminResult<()> {
        if !self.closed {
            self.closed = true;
            self.gauge.live.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.close().await
    }
}

impl Drop for InstrumentedClient {
    fn drop(&mut self) {
        if !self.closed {
            self.gauge.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
