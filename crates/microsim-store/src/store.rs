use crate::types::{RoundDelta, RunId, RunStatus};

#[derive(Debug, thiserror::Error)]
pub enum StatusStoreError {
    #[error("resource not found: {resource} ({id})")]
    NotFound { resource: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type StatusStoreResult<T> = Result<T, StatusStoreError>;

/// Persistence for run status. Readers get whatever was last written;
/// `apply_round` is the only writer used by the engine.
#[async_trait::async_trait]
pub trait StatusStore: Send + Sync {
    async fn get_status(&self, run_id: &RunId) -> StatusStoreResult<Option<RunStatus>>;

    /// Re-reads the latest persisted status for `run_id` (creating an empty
    /// one on first use), folds `delta` in and writes the result back.
    async fn apply_round(&self, run_id: &RunId, delta: RoundDelta)
    -> StatusStoreResult<RunStatus>;

    /// Removes the run's status. Returns whether anything was stored.
    async fn delete_run(&self, run_id: &RunId) -> StatusStoreResult<bool>;

    async fn list_runs(&self) -> StatusStoreResult<Vec<RunId>>;
}
