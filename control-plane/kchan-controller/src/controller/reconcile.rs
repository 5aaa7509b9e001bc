use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use super::channel::reconcile_channel;
use super::dispatcher::{DispatcherSettings, reconcile_dispatcher};
use super::error::{ControllerError, StageError};
use super::session::{AdminSession, AdminSessionManager};
use super::store::ChildStore;
use super::topic;
use crate::config::{ControllerConfig, TopicDefaultsConfig};
use crate::crd::{ConditionType, KafkaChannel, KafkaChannelStatus};
use crate::resources::channel_topic;

#[derive(Clone, Debug)]
pub struct ReconcilerSettings {
    pub dispatcher: DispatcherSettings,
    pub topic: TopicDefaultsConfig,
}

impl From<&ControllerConfig> for ReconcilerSettings {
    fn from(cfg: &ControllerConfig) -> Self {
        Self {
            dispatcher: DispatcherSettings {
                namespace: cfg.system_namespace.clone(),
                image: cfg.dispatcher.image.clone(),
                replicas: cfg.dispatcher.replicas,
            },
            topic: cfg.topic.clone(),
        }
    }
}

/// Drives a `KafkaChannel` and its children toward the declared state.
///
/// Every attempt runs inside its own admin session; attempts on one instance
/// never overlap their sessions.
pub struct KafkaChannelReconciler {
    pub(super) sessions: AdminSessionManager,
    pub(super) store: Arc<dyn ChildStore>,
    pub(super) settings: ReconcilerSettings,
}

impl KafkaChannelReconciler {
    pub fn new(
        sessions: AdminSessionManager,
        store: Arc<dyn ChildStore>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            sessions,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Run one reconciliation attempt, updating `channel.status` in place.
    /// observedGeneration only advances when every stage succeeded.
    #[instrument(skip_all, fields(ns = %channel.namespace().unwrap_or_default(), name = %channel.name_any()))]
    pub async fn reconcile(
        &self,
        channel: &mut KafkaChannel,
    ) -> Result<(), ControllerError> {
        debug!("start kafka-channel reconciliation");
        let mut session = self.sessions.acquire().await;

        let mut status = channel.status.take().unwrap_or_default();
        status.initialize_conditions();
        info!(spec = ?channel.spec, "reconciling channel");
        let result = self.reconcile_with(&session, channel, &mut status).await;
        session.release().await;

        match result {
            Ok(()) => {
                status.observed_generation = channel.metadata.generation;
                channel.status = Some(status);
                info!("successfully reconciled kafka-channel");
                Ok(())
            }
            Err(e) => {
                channel.status = Some(status);
                error!(error = %e, "failed to reconcile kafka-channel");
                Err(ControllerError::ReconciliationFailed)
            }
        }
    }

    async fn reconcile_with(
        &self,
        session: &AdminSession,
        channel: &KafkaChannel,
        status: &mut KafkaChannelStatus,
    ) -> Result<(), StageError> {
        // topic first: the resolved secret feeds the dispatcher
        let secret =
            match topic::ensure_topic(session, channel, &self.settings.topic)
                .await
            {
                Ok(secret) => {
                    status.mark_true(ConditionType::Topic);
                    secret
                }
                Err(e) => {
                    status.mark_false(
                        ConditionType::Topic,
                        "TopicFailed",
                        &e.to_string(),
                    );
                    return Err(e);
                }
            };

        let Some(secret) = secret else {
            status.mark_false(
                ConditionType::Config,
                "KafkaSecretReconciled",
                "No Kafka Secret For KafkaChannel",
            );
            return Err(StageError::ConfigurationUnresolved {
                topic: channel_topic(channel),
            });
        };
        status.mark_true(ConditionType::Config);

        let store = self.store.as_ref();
        let dispatcher = &self.settings.dispatcher;
        let (channel_res, dispatcher_report) = tokio::join!(
            reconcile_channel(store, channel, &dispatcher.namespace),
            reconcile_dispatcher(store, channel, dispatcher, &secret),
        );

        let mut errors = Vec::new();
        match channel_res {
            Ok(url) => {
                status.mark_true(ConditionType::ChannelService);
                status.set_address(Some(url));
            }
            Err(e) => {
                warn!(error = %e, "channel service reconciliation failed");
                status.mark_false(
                    ConditionType::ChannelService,
                    "ChannelServiceFailed",
                    &e.to_string(),
                );
                status.set_address(None);
                errors.push(e);
            }
        }
        match &dispatcher_report.service {
            Ok(()) => status.mark_true(ConditionType::DispatcherService),
            Err(e) => {
                warn!(error = %e, "dispatcher service reconciliation failed");
                status.mark_false(
                    ConditionType::DispatcherService,
                    "DispatcherServiceFailed",
                    &e.to_string(),
                );
            }
        }
        match &dispatcher_report.deployment {
            Ok(dep) => status.propagate_dispatcher_deployment(dep),
            Err(e) => {
                warn!(error = %e, "dispatcher deployment reconciliation failed");
                status.mark_false(
                    ConditionType::DispatcherDeployment,
                    "DispatcherDeploymentFailed",
                    &e.to_string(),
                );
            }
        }
        errors.extend(dispatcher_report.into_errors());

        match StageError::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
