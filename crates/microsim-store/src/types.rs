use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub type RunId = String;
pub type ResultHash = String;

/// One observed request/response pair, stored under its content hash.
///
/// Bodies are kept as text. Invalid UTF-8 is replaced with U+FFFD, so for
/// such bodies the stored text no longer reproduces the bytes the hash was
/// computed from; JSON exchanges are always valid UTF-8.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub request: String,
    pub response: String,
}

impl ResultEntry {
    pub fn from_bodies(request: &[u8], response: &[u8]) -> Self {
        Self {
            request: String::from_utf8_lossy(request).into_owned(),
            response: String::from_utf8_lossy(response).into_owned(),
        }
    }
}

/// Observable status of a simulation run. Every completed round is folded in
/// additively; nothing here is ever reset short of deleting the run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub done_request_count: u64,
    pub total_response_time_us: u64,
    pub replica_count: u32,
    pub results: BTreeMap<ResultHash, ResultEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_round_at_ms: Option<u64>,
}

impl RunStatus {
    pub fn total_response_time(&self) -> Duration {
        Duration::from_micros(self.total_response_time_us)
    }

    pub fn average_response_time(&self) -> Option<Duration> {
        if self.done_request_count == 0 {
            return None;
        }
        Some(Duration::from_micros(
            self.total_response_time_us / self.done_request_count,
        ))
    }

    /// Folds one finished round into this status. Existing result keys win.
    pub fn absorb(&mut self, delta: RoundDelta) {
        self.done_request_count += 1;
        self.total_response_time_us = self
            .total_response_time_us
            .saturating_add(delta.elapsed.as_micros().min(u64::MAX as u128) as u64);
        self.replica_count = delta.replica_count;
        for (hash, entry) in delta.entries {
            self.results.entry(hash).or_insert(entry);
        }
        if delta.finished_at_ms.is_some() {
            self.last_round_at_ms = delta.finished_at_ms;
        }
    }
}

/// Everything one round contributes to a `RunStatus`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundDelta {
    pub elapsed: Duration,
    pub replica_count: u32,
    pub entries: BTreeMap<ResultHash, ResultEntry>,
    pub finished_at_ms: Option<u64>,
}

/// BLAKE3 digest over `response ++ request`, hex encoded.
pub fn content_hash(response: &[u8], request: &[u8]) -> ResultHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(response);
    hasher.update(request);
    hasher.finalize().to_hex().to_string()
}
