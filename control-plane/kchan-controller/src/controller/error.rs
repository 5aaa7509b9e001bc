use kchan_admin::AdminError;

use super::store::StoreError;
use crate::resources::{ChildKind, ResourceError};

/// Errors surfaced to the controller runtime. Stage detail is logged where it
/// happens; callers only see the coarse classification.
#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error("reconciliation failed")]
    ReconciliationFailed,
    #[error("finalization failed")]
    FinalizationFailed,
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cause of a failed stage within one attempt.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("no admin session available")]
    NoAdminSession,
    #[error("topic {topic}: {source}")]
    Topic {
        topic: String,
        #[source]
        source: AdminError,
    },
    #[error("invalid topic configuration: {0}")]
    TopicConfig(String),
    #[error("no kafka secret bound to topic {topic}")]
    ConfigurationUnresolved { topic: String },
    #[error("failed to build {kind} {name}: {source}")]
    Build {
        kind: ChildKind,
        name: String,
        #[source]
        source: ResourceError,
    },
    #[error("failed to converge {kind} {namespace}/{name}: {source}")]
    Convergence {
        kind: ChildKind,
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to delete {kind} {namespace}/{name}: {source}")]
    Teardown {
        kind: ChildKind,
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("{}", join_all(.0))]
    Multiple(Vec<StageError>),
}

fn join_all(errors: &[StageError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl StageError {
    /// Collapse a list of failures; `None` when the list is empty.
    pub fn aggregate(mut errors: Vec<StageError>) -> Option<StageError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(StageError::Multiple(errors)),
        }
    }
}
