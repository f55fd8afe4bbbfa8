use crate::FaultError;
use crate::faults::{Fault, FaultKind, SharedFault, decode_args};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const KIND: &str = "latency";

/// Suspends the calling task for `delay` milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Latency {
    #[serde(alias = "delayMillis")]
    pub delay: u64,
}

impl Latency {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.delay)
    }
}

#[async_trait]
impl Fault for Latency {
    fn kind(&self) -> &str {
        KIND
    }

    async fn run(&self) -> Result<(), FaultError> {
        tokio::time::sleep(self.duration()).await;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LatencyKind;

impl FaultKind for LatencyKind {
    fn decode(&self, args: &Value) -> Result<SharedFault, FaultError> {
        Ok(Arc::new(decode_args::<Latency>(KIND, args)?))
    }
}
