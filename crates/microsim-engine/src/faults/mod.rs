//! Fault engine: named, parameterized perturbations run around forwarding.
//!
//! Kinds are looked up by exact name in a [`FaultRegistry`]; each kind
//! decodes its own `args` into a runnable [`Fault`].

use crate::FaultError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub mod latency;
pub mod memory_pressure;
pub mod registry;

pub use memory_pressure::PressureGauge;
pub use registry::FaultRegistry;

#[async_trait]
pub trait Fault: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> &str;

    async fn run(&self) -> Result<(), FaultError>;
}

pub type SharedFault = Arc<dyn Fault>;

/// Decoder for one fault kind.
pub trait FaultKind: Send + Sync {
    fn decode(&self, args: &Value) -> Result<SharedFault, FaultError>;
}

pub type SharedFaultKind = Arc<dyn FaultKind>;

pub fn core_registry() -> FaultRegistry {
    core_registry_with_gauge(PressureGauge::default())
}

pub fn core_registry_with_gauge(gauge: PressureGauge) -> FaultRegistry {
    let mut registry = FaultRegistry::new();
    registry.register_kind("latency", Arc::new(latency::LatencyKind));
    let pressure: SharedFaultKind = Arc::new(memory_pressure::MemoryPressureKind::new(gauge));
    registry.register_kind("memory-pressure", pressure.clone());
    registry.register_kind("memory-leak", pressure);
    registry
}

/// Runs every fault in order. A failing fault is recorded and the rest still run.
pub async fn run_faults(faults: &[SharedFault]) -> Vec<String> {
    let mut errors = Vec::new();
    for fault in faults {
        if let Err(error) = fault.run().await {
            tracing::warn!(kind = fault.kind(), %error, "fault failed");
            errors.push(error.to_string());
        }
    }
    errors
}

pub(crate) fn decode_args<T: DeserializeOwned>(kind: &str, args: &Value) -> Result<T, FaultError> {
    serde_json::from_value(args.clone()).map_err(|err| FaultError::InvalidArgs {
        kind: kind.to_string(),
        message: err.to_string(),
    })
}
