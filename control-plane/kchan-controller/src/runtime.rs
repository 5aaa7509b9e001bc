use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kchan_admin::{
    AdminClientFactory, memory::MemoryAdminBackend,
    strimzi::StrimziAdminFactory,
};
use kube::{
    Api, Client, ResourceExt,
    runtime::{WatchStreamExt, watcher},
};
use tokio::{task::JoinHandle, time::Duration};
use tracing::{debug, error, info, warn};

use crate::{
    config::{AdminBackend, ControllerConfig},
    controller::{
        AdminSessionManager, ConfigFeed, KafkaChannelReconciler,
        KubeChildStore, ReconcilerSettings, run_controller,
    },
};

/// Secret name the in-memory backend reports for every topic.
pub const MEMORY_SECRET_NAME: &str = "kafka-cluster";

/// Build the admin backend selected by the configuration.
pub async fn build_admin_factory(
    cfg: &ControllerConfig,
) -> anyhow::Result<Arc<dyn AdminClientFactory>> {
    let factory: Arc<dyn AdminClientFactory> = match cfg.backend() {
        AdminBackend::Memory => {
            warn!("using in-memory admin backend; topics are not persisted");
            Arc::new(MemoryAdminBackend::with_secret(
                &cfg.system_namespace,
                MEMORY_SECRET_NAME,
            ))
        }
        AdminBackend::Strimzi => Arc::new(StrimziAdminFactory::infer().await?),
    };
    Ok(factory)
}

/// Wire the reconciler together and return it with the feed that updates its
/// admin configuration.
pub async fn build_reconciler(
    client: Client,
    cfg: &ControllerConfig,
) -> anyhow::Result<(Arc<KafkaChannelReconciler>, ConfigFeed)> {
    cfg.admin.validate()?;
    let factory = build_admin_factory(cfg).await?;
    let (sessions, feed) = AdminSessionManager::new(factory, cfg.admin.clone());
    let store = Arc::new(KubeChildStore::new(client));
    let reconciler = KafkaChannelReconciler::new(
        sessions,
        store,
        ReconcilerSettings::from(cfg),
    );
    Ok((Arc::new(reconciler), feed))
}

/// Spawn the Kubernetes controller loop.
pub fn spawn_controller(
    client: Client,
    reconciler: Arc<KafkaChannelReconciler>,
    requeue: Duration,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_controller(client, reconciler, requeue).await })
}

/// Follow the admin ConfigMap and publish every change to `feed`.
pub fn spawn_config_watcher(
    client: Client,
    namespace: String,
    name: String,
    feed: ConfigFeed,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let api: Api<ConfigMap> = Api::namespaced(client, &namespace);
        let wc = watcher::Config::default()
            .fields(&format!("metadata.name={}", name));
        info!(%namespace, %name, "watching admin config map");
        let stream = watcher(api, wc).default_backoff().applied_objects();
        follow_config_map(stream, &feed).await;
        anyhow::bail!("config map watch for {}/{} ended", namespace, name)
    })
}

/// Drain config map events into `feed` until the stream ends. Watch errors
/// are logged and skipped; the backoff layer resumes the watch.
pub async fn follow_config_map<S, E>(stream: S, feed: &ConfigFeed) -> usize
where
    S: Stream<Item = Result<ConfigMap, E>>,
    E: std::fmt::Display,
{
    futures_util::pin_mut!(stream);
    let mut applied = 0;
    while let Some(item) = stream.next().await {
        match item {
            Ok(cm) => {
                if feed.apply_config_map(cm.data.as_ref()) {
                    applied += 1;
                    debug!(name = %cm.name_any(), "admin config map applied");
                }
            }
            Err(e) => warn!(error = %e, "config map watch error; retrying"),
        }
    }
    applied
}

/// Start the controller and config watcher. Returns when either one exits.
pub async fn run_all(client: Client, cfg: ControllerConfig) -> anyhow::Result<()> {
    let (reconciler, feed) = build_reconciler(client.clone(), &cfg).await?;

    let watcher = spawn_config_watcher(
        client.clone(),
        cfg.system_namespace.clone(),
        cfg.config_map.clone(),
        feed,
    );
    let controller = spawn_controller(
        client,
        reconciler,
        Duration::from_secs(cfg.requeue_secs),
    );

    // either task exiting is fatal; the process restarts both
    let (task, res) = tokio::select! {
        res = controller => ("controller", res),
        res = watcher => ("config watcher", res),
    };
    error!(task, "task exited; shutting down");
    res??;
    Ok(())
}
