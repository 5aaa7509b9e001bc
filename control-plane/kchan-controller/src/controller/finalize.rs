use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use super::dispatcher::finalize_dispatcher;
use super::error::{ControllerError, StageError};
use super::reconcile::KafkaChannelReconciler;
use super::session::AdminSession;
use super::topic;
use crate::crd::KafkaChannel;

impl KafkaChannelReconciler {
    /// Tear down what the cluster will not collect on its own: the
    /// dispatcher in the system namespace, then the topic. Not checkpointed;
    /// a failed attempt is retried from the start.
    #[instrument(skip_all, fields(ns = %channel.namespace().unwrap_or_default(), name = %channel.name_any()))]
    pub async fn finalize(
        &self,
        channel: &KafkaChannel,
    ) -> Result<(), ControllerError> {
        debug!("start kafka-channel finalization");
        let mut session = self.sessions.acquire().await;
        let result = self.finalize_with(&session, channel).await;
        session.release().await;

        match result {
            Ok(()) => {
                info!("successfully finalized kafka-channel");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to finalize kafka-channel");
                Err(ControllerError::FinalizationFailed)
            }
        }
    }

    async fn finalize_with(
        &self,
        session: &AdminSession,
        channel: &KafkaChannel,
    ) -> Result<(), StageError> {
        // the dispatcher must be gone before its topic
        finalize_dispatcher(
            self.store.as_ref(),
            channel,
            &self.settings.dispatcher.namespace,
        )
        .await?;
        topic::delete_topic(session, channel).await
    }
}
