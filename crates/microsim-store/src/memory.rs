use crate::store::{StatusStore, StatusStoreError, StatusStoreResult};
use crate::types::{RoundDelta, RunId, RunStatus};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub(crate) struct MemoryState {
    pub runs: BTreeMap<RunId, RunStatus>,
}

impl MemoryState {
    pub(crate) fn merge(&mut self, run_id: &RunId, delta: RoundDelta) -> StatusStoreResult<RunStatus> {
        if run_id.trim().is_empty() {
            return Err(StatusStoreError::Conflict(
                "cannot merge a round into an unnamed run".to_string(),
            ));
        }
        let status = self.runs.entry(run_id.clone()).or_default();
        status.absorb(delta);
        Ok(status.clone())
    }

    pub(crate) fn remove(&mut self, run_id: &RunId) -> bool {
        self.runs.remove(run_id).is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStatusStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: MemoryState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn snapshot(&self) -> StatusStoreResult<MemoryState> {
        Ok(self.lock()?.clone())
    }

    pub(crate) fn replace(&self, state: MemoryState) -> StatusStoreResult<()> {
        *self.lock()? = state;
        Ok(())
    }

    fn lock(&self) -> StatusStoreResult<MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| StatusStoreError::Backend("memory status store mutex poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get_status(&self, run_id: &RunId) -> StatusStoreResult<Option<RunStatus>> {
        Ok(self.lock()?.runs.get(run_id).cloned())
    }

    async fn apply_round(
        &self,
        run_id: &RunId,
        delta: RoundDelta,
    ) -> StatusStoreResult<RunStatus> {
        self.lock()?.merge(run_id, delta)
    }

    async fn delete_run(&self, run_id: &RunId) -> StatusStoreResult<bool> {
        Ok(self.lock()?.remove(run_id))
    }

    async fn list_runs(&self) -> StatusStoreResult<Vec<RunId>> {
        Ok(self.lock()?.runs.keys().cloned().collect())
    }
}
