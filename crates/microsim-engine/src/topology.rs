use crate::SimError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Characters of the topology id appended to every lookup key.
pub const TOPOLOGY_ID_PREFIX_LEN: usize = 8;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

/// Services the orchestrator has materialized for one simulation, keyed by
/// [`lookup_key`]. Read-only from the engine's side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTopology {
    pub topology_id: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceEndpoint>,
}

impl ServiceTopology {
    pub fn new(topology_id: impl Into<String>) -> Self {
        Self {
            topology_id: topology_id.into(),
            services: BTreeMap::new(),
        }
    }

    /// Registers `name` under its lookup key.
    pub fn with_service(mut self, name: &str, endpoint: impl Into<String>) -> Self {
        self.services.insert(
            self.lookup_key(name),
            ServiceEndpoint {
                endpoint: endpoint.into(),
                ..ServiceEndpoint::default()
            },
        );
        self
    }

    pub fn lookup_key(&self, name: &str) -> String {
        lookup_key(name, &self.topology_id)
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.services
            .get(&self.lookup_key(name))
            .map(|service| service.endpoint.as_str())
    }
}

/// `service_a` in topology `3f9c1e22-...` becomes `service-a-3f9c1e22`.
pub fn lookup_key(name: &str, topology_id: &str) -> String {
    let suffix: String = topology_id.chars().take(TOPOLOGY_ID_PREFIX_LEN).collect();
    format!("{}-{}", name.replace('_', "-"), suffix)
}

#[async_trait]
pub trait TopologyProvider: Send + Sync {
    async fn load_topology(&self, topology_id: &str) -> Result<ServiceTopology, SimError>;
}

/// Topologies published in-process, e.g. by an embedding orchestrator or tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryTopologyProvider {
    inner: Arc<RwLock<BTreeMap<String, ServiceTopology>>>,
}

impl MemoryTopologyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, topology: ServiceTopology) -> Result<(), SimError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| SimError::Runtime("topology provider lock poisoned".to_string()))?;
        guard.insert(topology.topology_id.clone(), topology);
        Ok(())
    }
}

#[async_trait]
impl TopologyProvider for MemoryTopologyProvider {
    async fn load_topology(&self, topology_id: &str) -> Result<ServiceTopology, SimError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| SimError::PrerequisiteLoad("topology provider lock poisoned".to_string()))?;
        guard.get(topology_id).cloned().ok_or_else(|| {
            SimError::PrerequisiteLoad(format!("topology {topology_id} is not available"))
        })
    }
}

/// Reads a JSON-encoded [`ServiceTopology`] on every load, so edits to the
/// file are picked up by the next tick.
#[derive(Clone, Debug)]
pub struct FileTopologyProvider {
    path: PathBuf,
}

impl FileTopologyProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl TopologyProvider for FileTopologyProvider {
    async fn load_topology(&self, topology_id: &str) -> Result<ServiceTopology, SimError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|err| {
            SimError::PrerequisiteLoad(format!(
                "read topology file '{}' failed: {err}",
                self.path.display()
            ))
        })?;
        let topology: ServiceTopology = serde_json::from_slice(&raw).map_err(|err| {
            SimError::PrerequisiteLoad(format!(
                "decode topology file '{}' failed: {err}",
                self.path.display()
            ))
        })?;
        if topology.topology_id != topology_id {
            return Err(SimError::PrerequisiteLoad(format!(
                "topology file '{}' describes {} instead of {topology_id}",
                self.path.display(),
                topology.topology_id
            )));
        }
        Ok(topology)
    }
}
