use crate::SimError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_PROBABILITY: u8 = 100;

/// A scripted fault as it travels on the wire: `{"type": ..., "args": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaultSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Value,
}

impl FaultSpec {
    pub fn new(kind: impl Into<String>, args: Value) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }

    pub fn latency(delay_ms: u64) -> Self {
        Self::new("latency", serde_json::json!({ "delay": delay_ms }))
    }

    pub fn memory_pressure(size_mb: u64, duration_ms: u64) -> Self {
        Self::new(
            "memory-pressure",
            serde_json::json!({ "size": size_mb, "duration": duration_ms }),
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultPlan {
    #[serde(default, deserialize_with = "null_as_default")]
    pub before: Vec<FaultSpec>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub after: Vec<FaultSpec>,
}

/// One hop of a simulated call graph. Children are owned; a tree never
/// refers back to its ancestors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteNode {
    pub designation: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub faults: FaultPlan,
    /// Chance, per child and per round, that each child edge is kept.
    #[serde(default = "default_probability")]
    pub probability: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub routes: Vec<RouteNode>,
}

impl RouteNode {
    pub fn new(designation: impl Into<String>) -> Self {
        Self {
            designation: designation.into(),
            faults: FaultPlan::default(),
            probability: DEFAULT_PROBABILITY,
            routes: Vec::new(),
        }
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, SimError> {
        serde_json::from_slice(raw).map_err(|err| SimError::ConfigDecode(err.to_string()))
    }

    pub fn with_probability(mut self, probability: u8) -> Self {
        self.probability = probability;
        self
    }

    pub fn with_child(mut self, child: RouteNode) -> Self {
        self.routes.push(child);
        self
    }

    pub fn with_fault_before(mut self, fault: FaultSpec) -> Self {
        self.faults.before.push(fault);
        self
    }

    pub fn with_fault_after(mut self, fault: FaultSpec) -> Self {
        self.faults.after.push(fault);
        self
    }

    pub fn node_count(&self) -> usize {
        1 + self.routes.iter().map(RouteNode::node_count).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.routes.iter().map(RouteNode::depth).max().unwrap_or(0)
    }
}

/// What a simulated service answers; `response` mirrors the forwarded
/// children in order, with `None` where forwarding failed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseNode {
    pub service: String,
    pub address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub response: Vec<Option<ResponseNode>>,
}

impl ResponseNode {
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn depth(&self) -> usize {
        1 + self
            .response
            .iter()
            .flatten()
            .map(ResponseNode::depth)
            .max()
            .unwrap_or(0)
    }
}

fn default_probability() -> u8 {
    DEFAULT_PROBABILITY
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
