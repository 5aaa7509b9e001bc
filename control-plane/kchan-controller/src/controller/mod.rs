pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod finalize;
pub mod reconcile;
pub mod session;
pub mod status;
pub mod store;
pub mod topic;

use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    Client, Resource, ResourceExt,
    api::{Api, Patch, PatchParams},
    runtime::{
        Controller, controller::Action, events::Recorder,
        reflector::ObjectRef, watcher::Config,
    },
};
use serde_json::json;
use tokio::time::Duration;
use tracing::{debug, error, info, instrument, trace, warn};

pub use error::{ControllerError, StageError};
pub use events::Lifecycle;
pub use reconcile::{KafkaChannelReconciler, ReconcilerSettings};
pub use session::{AdminSession, AdminSessionManager, ConfigFeed};
pub use store::{ChildStore, KubeChildStore, StoreError};

use crate::crd::{KafkaChannel, KafkaChannelStatus};
use crate::resources::{
    CHANNEL_NAME_LABEL, CHANNEL_NAMESPACE_LABEL, DISPATCHER_LABEL,
};

pub const FINALIZER: &str = "kafkachannels.messaging.knative.dev";

pub struct ControllerContext {
    pub client: Client,
    pub recorder: Recorder,
    pub reconciler: Arc<KafkaChannelReconciler>,
    pub requeue: Duration,
}

pub async fn run_controller(
    client: Client,
    reconciler: Arc<KafkaChannelReconciler>,
    requeue: Duration,
) -> anyhow::Result<()> {
    let api: Api<KafkaChannel> = Api::all(client.clone());
    let dispatcher_ns = reconciler.settings().dispatcher.namespace.clone();
    let dispatchers: Api<Deployment> =
        Api::namespaced(client.clone(), &dispatcher_ns);
    let ctx = Arc::new(ControllerContext {
        recorder: Recorder::new(client.clone(), events::reporter()),
        client,
        reconciler,
        requeue,
    });

    info!(%dispatcher_ns, "starting kafka-channel controller");
    Controller::new(api, Config::default())
        .watches(
            dispatchers,
            Config::default().labels(&format!("{}=true", DISPATCHER_LABEL)),
            dispatcher_owner,
        )
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    debug!(%obj_ref, ?action, "reconciled")
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

/// Map a dispatcher deployment back to the channel it serves. Dispatchers
/// live outside the channel's namespace, so owner references cannot be used.
pub fn dispatcher_owner(dep: Deployment) -> Option<ObjectRef<KafkaChannel>> {
    let labels = dep.labels();
    let name = labels.get(CHANNEL_NAME_LABEL)?;
    let ns = labels.get(CHANNEL_NAMESPACE_LABEL)?;
    Some(ObjectRef::new(name).within(ns))
}

fn has_finalizer(obj: &KafkaChannel) -> bool {
    obj.finalizers().iter().any(|f| f == FINALIZER)
}

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_else(|| "default".into()), name = %obj.name_any()))]
async fn reconcile(
    obj: Arc<KafkaChannel>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ControllerError> {
    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();
    let api: Api<KafkaChannel> = Api::namespaced(ctx.client.clone(), &ns);

    // Handle delete: finalize then remove finalizer
    if obj.meta().deletion_timestamp.is_some() {
        if has_finalizer(&obj) {
            info!(%ns, %name, "reconcile: deletion timestamp detected; finalizing");
            let finalized = ctx.reconciler.finalize(&obj).await;
            events::emit_event(
                &ctx.recorder,
                &obj,
                Lifecycle::Finalize,
                &finalized,
            )
            .await;
            finalized?;
            let finals = obj
                .finalizers()
                .iter()
                .filter(|f| *f != FINALIZER)
                .cloned()
                .collect::<Vec<_>>();
            let patch = json!({"metadata": {"finalizers": finals}});
            api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            info!(%ns, %name, "reconcile: finalizer removed");
        }
        return Ok(Action::await_change());
    }

    // Ensure finalizer
    if !has_finalizer(&obj) {
        info!(%ns, %name, "reconcile: adding finalizer");
        let mut finals = obj.finalizers().to_vec();
        finals.push(FINALIZER.to_string());
        let patch = json!({"metadata": {"finalizers": finals}});
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
    }

    let mut channel = (*obj).clone();
    let result = ctx.reconciler.reconcile(&mut channel).await;
    events::emit_event(&ctx.recorder, &obj, Lifecycle::Reconcile, &result)
        .await;

    // status is published on failure too so conditions explain the retry
    if let Some(status) = channel.status.as_ref() {
        if should_patch_status(obj.status.as_ref(), status) {
            trace!(%ns, %name, "reconcile: status changed; patching status");
            let patch = json!({ "status": status });
            api.patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        } else {
            trace!(%ns, %name, "reconcile: status unchanged; skipping patch");
        }
    }

    result?;
    Ok(Action::await_change())
}

/// Compare two status objects for material differences, ignoring condition
/// transition times.
fn should_patch_status(
    current: Option<&KafkaChannelStatus>,
    desired: &KafkaChannelStatus,
) -> bool {
    match current {
        None => true,
        Some(cur) => normalize_status(cur) != normalize_status(desired),
    }
}

fn normalize_status(s: &KafkaChannelStatus) -> KafkaChannelStatus {
    let mut out = s.clone();
    for c in out.conditions.iter_mut() {
        c.last_transition_time = None;
    }
    out
}

fn error_policy(
    obj: Arc<KafkaChannel>,
    error: &ControllerError,
    ctx: Arc<ControllerContext>,
) -> Action {
    warn!(name = %obj.name_any(), error = %error, "requeueing after failure");
    Action::requeue(ctx.requeue)
}
