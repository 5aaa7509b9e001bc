use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Resource, ResourceExt};
use tracing::warn;

use super::error::ControllerError;
use super::session::COMPONENT_NAME;
use crate::crd::KafkaChannel;

pub const REASON_RECONCILED: &str = "KafkaChannelReconciled";
pub const REASON_FINALIZED: &str = "KafkaChannelFinalized";
pub const REASON_RECONCILE_FAILED: &str = "KafkaChannelReconcileFailed";
pub const REASON_FINALIZE_FAILED: &str = "KafkaChannelFinalizeFailed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Reconcile,
    Finalize,
}

pub fn reporter() -> Reporter {
    Reporter {
        controller: COMPONENT_NAME.into(),
        instance: std::env::var("POD_NAME").ok(),
    }
}

/// Event describing the outcome of one attempt on `channel`.
pub fn lifecycle_event(
    stage: Lifecycle,
    channel: &KafkaChannel,
    result: &Result<(), ControllerError>,
) -> Event {
    let key = format!(
        "{}/{}",
        channel.namespace().unwrap_or_default(),
        channel.name_any()
    );
    let (type_, reason, note) = match (stage, result) {
        (Lifecycle::Reconcile, Ok(())) => (
            EventType::Normal,
            REASON_RECONCILED,
            format!("KafkaChannel Reconciled Successfully: \"{}\"", key),
        ),
        (Lifecycle::Finalize, Ok(())) => (
            EventType::Normal,
            REASON_FINALIZED,
            format!("KafkaChannel Finalized Successfully: \"{}\"", key),
        ),
        (Lifecycle::Reconcile, Err(e)) => (
            EventType::Warning,
            REASON_RECONCILE_FAILED,
            format!("KafkaChannel \"{}\": {}", key, e),
        ),
        (Lifecycle::Finalize, Err(e)) => (
            EventType::Warning,
            REASON_FINALIZE_FAILED,
            format!("KafkaChannel \"{}\": {}", key, e),
        ),
    };
    Event {
        type_,
        reason: reason.into(),
        note: Some(note),
        action: match stage {
            Lifecycle::Reconcile => "Reconcile".into(),
            Lifecycle::Finalize => "Finalize".into(),
        },
        secondary: None,
    }
}

/// Publish the outcome event. Failing to record an event never fails the
/// attempt.
pub async fn emit_event(
    recorder: &Recorder,
    channel: &KafkaChannel,
    stage: Lifecycle,
    result: &Result<(), ControllerError>,
) {
    let event = lifecycle_event(stage, channel, result);
    if let Err(e) = recorder.publish(&event, &channel.object_ref(&())).await {
        warn!(error = %e, reason = %event.reason, "failed to publish event");
    }
}
