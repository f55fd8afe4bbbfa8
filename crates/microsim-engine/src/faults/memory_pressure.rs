use crate::FaultError;
use crate::faults::{Fault, FaultKind, SharedFault, decode_args};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const KIND: &str = "memory-pressure";
const BYTES_PER_MEGABYTE: usize = 1024 * 1024;
const FILL_BYTE: u8 = b'a';
/// Pause after the buffer is dropped before the release is reported.
pub const SETTLE_INTERVAL: Duration = Duration::from_secs(1);

/// Process-wide view of the buffers memory-pressure faults currently hold.
#[derive(Clone, Debug, Default)]
pub struct PressureGauge {
    held_bytes: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl PressureGauge {
    pub fn held_bytes(&self) -> usize {
        self.held_bytes.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn acquire(&self, bytes: usize) {
        self.held_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, bytes: usize) {
        self.held_bytes.fetch_sub(bytes, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPressureArgs {
    /// Megabytes to allocate.
    #[serde(alias = "sizeMB")]
    pub size: usize,
    /// Milliseconds to hold the allocation.
    #[serde(alias = "durationMillis")]
    pub duration: u64,
}

/// Allocates and holds a buffer on a detached task. The request path never
/// waits for it and never sees it fail.
#[derive(Clone, Debug)]
pub struct MemoryPressure {
    args: MemoryPressureArgs,
    gauge: PressureGauge,
}

impl MemoryPressure {
    pub fn new(args: MemoryPressureArgs, gauge: PressureGauge) -> Self {
        Self { args, gauge }
    }
}

#[async_trait]
impl Fault for MemoryPressure {
    fn kind(&self) -> &str {
        KIND
    }

    async fn run(&self) -> Result<(), FaultError> {
        let args = self.args;
        let gauge = self.gauge.clone();
        tokio::spawn(async move {
            hold_buffer(args, gauge).await;
        });
        Ok(())
    }
}

async fn hold_buffer(args: MemoryPressureArgs, gauge: PressureGauge) {
    let size_bytes = args.size.saturating_mul(BYTES_PER_MEGABYTE);
    tracing::info!(
        size_mb = args.size,
        duration_ms = args.duration,
        "creating memory pressure"
    );

    let mut buffer: Vec<u8> = Vec::new();
    if let Err(error) = buffer.try_reserve_exact(size_bytes) {
        tracing::warn!(size_mb = args.size, %error, "memory pressure allocation refused");
        return;
    }
    // Every page is written so the allocation is resident.
    buffer.resize(size_bytes, FILL_BYTE);
    gauge.acquire(size_bytes);

    tokio::time::sleep(Duration::from_millis(args.duration)).await;

    std::hint::black_box(&buffer);
    drop(buffer);
    gauge.release(size_bytes);
    tokio::time::sleep(SETTLE_INTERVAL).await;
    tracing::info!(size_mb = args.size, "memory pressure released");
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPressureKind {
    gauge: PressureGauge,
}

impl MemoryPressureKind {
    pub fn new(gauge: PressureGauge) -> Self {
        Self { gauge }
    }
}

impl FaultKind for MemoryPressureKind {
    fn decode(&self, args: &Value) -> Result<SharedFault, FaultError> {
        let args = decode_args::<MemoryPressureArgs>(KIND, args)?;
        Ok(Arc::new(MemoryPressure::new(args, self.gauge.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    #[test]
    fn decode_original_and_alias_field_names_expected_same_args() {
        let short: MemoryPressureArgs =
            decode_args(KIND, &json!({"size": 2, "duration": 100})).expect("should decode");
        let long: MemoryPressureArgs =
            decode_args(KIND, &json!({"sizeMB": 2, "durationMillis": 100})).expect("should decode");
        assert_eq!(short, long);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_expected_returns_immediately_and_footprint_rises_then_falls() {
        let gauge = PressureGauge::default();
        let fault = MemoryPressureKind::new(gauge.clone())
            .decode(&json!({"size": 1, "duration": 150}))
            .expect("memory pressure should decode");

        let started = Instant::now();
        fault.run().await.expect("memory pressure never fails");
        assert!(started.elapsed() < Duration::from_millis(150));

        let deadline = Instant::now() + Duration::from_secs(2);
        while gauge.held_bytes() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(gauge.held_bytes(), BYTES_PER_MEGABYTE);
        assert_eq!(gauge.active(), 1);

        let deadline = Instant::now() + Duration::from_secs(2);
        while gauge.held_bytes() != 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(gauge.held_bytes(), 0);
        assert_eq!(gauge.active(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hold_buffer_expected_release_reported_after_settle_interval() {
        let gauge = PressureGauge::default();
        let args = MemoryPressureArgs {
            size: 1,
            duration: 20,
        };

        let started = Instant::now();
        hold_buffer(args, gauge.clone()).await;

        assert!(started.elapsed() >= Duration::from_millis(20) + SETTLE_INTERVAL);
        assert_eq!(gauge.held_bytes(), 0);
        assert_eq!(gauge.active(), 0);
    }
}
