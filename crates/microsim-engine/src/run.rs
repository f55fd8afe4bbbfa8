use crate::SimError;
use crate::route::RouteNode;
use async_trait::async_trait;
use microsim_store::RunId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub const DEFAULT_REPLICAS: u32 = 1;
pub const DEFAULT_BETWEEN_DELAY_MS: u64 = 1_000;

/// Declarative configuration of one simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub run_id: RunId,
    pub topology_id: String,
    pub route: RouteNode,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_count_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_between_delay_ms")]
    pub between_delay_ms: u64,
    /// Unset until someone stamps it; the reconciler uses the time it first
    /// saw the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_ms: Option<u64>,
}

fn default_replicas() -> u32 {
    DEFAULT_REPLICAS
}

fn default_between_delay_ms() -> u64 {
    DEFAULT_BETWEEN_DELAY_MS
}

impl RunSpec {
    pub fn new(run_id: impl Into<RunId>, topology_id: impl Into<String>, route: RouteNode) -> Self {
        Self {
            run_id: run_id.into(),
            topology_id: topology_id.into(),
            route,
            replicas: DEFAULT_REPLICAS,
            request_count_limit: None,
            timeout_ms: None,
            between_delay_ms: DEFAULT_BETWEEN_DELAY_MS,
            created_at_ms: None,
        }
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, SimError> {
        serde_json::from_slice(raw)
            .map_err(|err| SimError::ConfigDecode(format!("run spec decode failed: {err}")))
    }

    /// A zero replica count still sends one request per round.
    pub fn replicas(&self) -> u32 {
        self.replicas.max(1)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn between_delay(&self) -> Duration {
        Duration::from_millis(self.between_delay_ms)
    }

    pub fn created_at(&self) -> Option<Duration> {
        self.created_at_ms.map(Duration::from_millis)
    }
}

#[async_trait]
pub trait RunSource: Send + Sync {
    async fn load_run(&self, run_id: &RunId) -> Result<RunSpec, SimError>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryRunSource {
    inner: Arc<RwLock<BTreeMap<RunId, RunSpec>>>,
}

impl MemoryRunSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, spec: RunSpec) -> Result<(), SimError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| SimError::Runtime("run source lock poisoned".to_string()))?;
        guard.insert(spec.run_id.clone(), spec);
        Ok(())
    }

    pub fn remove(&self, run_id: &RunId) -> Result<Option<RunSpec>, SimError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| SimError::Runtime("run source lock poisoned".to_string()))?;
        Ok(guard.remove(run_id))
    }
}

#[async_trait]
impl RunSource for MemoryRunSource {
    async fn load_run(&self, run_id: &RunId) -> Result<RunSpec, SimError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| SimError::PrerequisiteLoad("run source lock poisoned".to_string()))?;
        guard
            .get(run_id)
            .cloned()
            .ok_or_else(|| SimError::PrerequisiteLoad(format!("run {run_id} is not defined")))
    }
}

/// A single JSON-encoded [`RunSpec`], re-read on every load.
#[derive(Clone, Debug)]
pub struct FileRunSource {
    path: PathBuf,
}

impl FileRunSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl RunSource for FileRunSource {
    async fn load_run(&self, run_id: &RunId) -> Result<RunSpec, SimError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|err| {
            SimError::PrerequisiteLoad(format!(
                "read run file '{}' failed: {err}",
                self.path.display()
            ))
        })?;
        let spec = RunSpec::from_json(&raw)
            .map_err(|err| SimError::PrerequisiteLoad(err.to_string()))?;
        if &spec.run_id != run_id {
            return Err(SimError::PrerequisiteLoad(format!(
                "run file '{}' describes {} instead of {run_id}",
                self.path.display(),
                spec.run_id
            )));
        }
        Ok(spec)
    }
}
