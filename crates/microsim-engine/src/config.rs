use crate::retry::RetryBackoffConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SERVICE_NAME: &str = "Undefined";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_TRANSPORT_TIMEOUT_MS: u64 = 30_000;
/// Overrides the configured service name when set and non-empty.
pub const SERVICE_NAME_ENV: &str = "SERVICE_NAME";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub bind_addr: String,
    pub transport_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            transport_timeout_ms: DEFAULT_TRANSPORT_TIMEOUT_MS,
        }
    }
}

impl ServiceConfig {
    pub fn with_service_name_override(mut self, value: Option<String>) -> Self {
        if let Some(name) = value.filter(|value| !value.trim().is_empty()) {
            self.service_name = name;
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_service_name_override(std::env::var(SERVICE_NAME_ENV).ok())
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub transport_timeout_ms: u64,
    pub backoff: RetryBackoffConfig,
    /// `None` retries prerequisite loads forever.
    pub max_prerequisite_retries: Option<u32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            transport_timeout_ms: DEFAULT_TRANSPORT_TIMEOUT_MS,
            backoff: RetryBackoffConfig::default(),
            max_prerequisite_retries: None,
        }
    }
}

impl GeneratorConfig {
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }
}
