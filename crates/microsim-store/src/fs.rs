use crate::memory::{MemoryState, MemoryStatusStore};
use crate::store::{StatusStore, StatusStoreError, StatusStoreResult};
use crate::types::{RoundDelta, RunId, RunStatus};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const STATE_FILE_NAME: &str = "status-state.json";

/// JSON-file backed store. Every mutation is applied to a copy of the state,
/// written atomically, and only then made visible to readers.
#[derive(Clone, Debug)]
pub struct FsStatusStore {
    state_file: PathBuf,
    inner: MemoryStatusStore,
    write_guard: Arc<Mutex<()>>,
}

impl FsStatusStore {
    pub fn new<P: AsRef<Path>>(root: P) -> StatusStoreResult<Self> {
        fs::create_dir_all(root.as_ref()).map_err(|err| {
            StatusStoreError::Backend(format!("create fs store root failed: {err}"))
        })?;
        let state_file = root.as_ref().join(STATE_FILE_NAME);
        let state = if state_file.exists() {
            let raw = fs::read(&state_file).map_err(|err| {
                StatusStoreError::Backend(format!("read state file failed: {err}"))
            })?;
            serde_json::from_slice::<MemoryState>(&raw)
                .map_err(|err| StatusStoreError::Serialization(err.to_string()))?
        } else {
            MemoryState::default()
        };

        Ok(Self {
            state_file,
            inner: MemoryStatusStore::from_state(state),
            write_guard: Arc::new(Mutex::new(())),
        })
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    fn persist(&self, state: &MemoryState) -> StatusStoreResult<()> {
        let raw = serde_json::to_vec_pretty(state)
            .map_err(|err| StatusStoreError::Serialization(err.to_string()))?;
        let tmp = self.state_file.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .map_err(|err| StatusStoreError::Backend(format!("write state file failed: {err}")))?;
        fs::rename(&tmp, &self.state_file)
            .map_err(|err| StatusStoreError::Backend(format!("rename state file failed: {err}")))?;
        Ok(())
    }

    fn write_lock(&self) -> StatusStoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_guard
            .lock()
            .map_err(|_| StatusStoreError::Backend("fs status store mutex poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl StatusStore for FsStatusStore {
    async fn get_status(&self, run_id: &RunId) -> StatusStoreResult<Option<RunStatus>> {
        self.inner.get_status(run_id).await
    }

    async fn apply_round(
        &self,
        run_id: &RunId,
        delta: RoundDelta,
    ) -> StatusStoreResult<RunStatus> {
        let _guard = self.write_lock()?;
        let mut candidate = self.inner.snapshot()?;
        let status = candidate.merge(run_id, delta)?;
        self.persist(&candidate)?;
        self.inner.replace(candidate)?;
        Ok(status)
    }

    async fn delete_run(&self, run_id: &RunId) -> StatusStoreResult<bool> {
        let _guard = self.write_lock()?;
        let mut candidate = self.inner.snapshot()?;
        let removed = candidate.remove(run_id);
        self.persist(&candidate)?;
        self.inner.replace(candidate)?;
        Ok(removed)
    }

    async fn list_runs(&self) -> StatusStoreResult<Vec<RunId>> {
        self.inner.list_runs().await
    }
}
