use crate::SimError;
use crate::dispatch::RoundReport;
use microsim_store::{ResultEntry, ResultHash, RoundDelta, RunId, RunStatus, StatusStore, content_hash};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Collects one round's exchanges keyed by content hash, so identical
/// response/request pairs from different replicas count once.
#[derive(Clone, Debug, Default)]
pub struct ResultAggregator {
    entries: BTreeMap<ResultHash, ResultEntry>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the pair was not seen earlier in the round.
    pub fn stage(&mut self, request: &[u8], response: &[u8]) -> bool {
        let hash = content_hash(response, request);
        if self.entries.contains_key(&hash) {
            return false;
        }
        self.entries
            .insert(hash, ResultEntry::from_bodies(request, response));
        true
    }

    pub fn stage_report(&mut self, report: &RoundReport) -> usize {
        report
            .exchanges
            .iter()
            .filter(|replica| {
                self.stage(
                    &replica.exchange.request_body,
                    &replica.exchange.response_body,
                )
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_delta(self, elapsed: Duration, replicas: u32) -> RoundDelta {
        RoundDelta {
            elapsed,
            replica_count: replicas,
            entries: self.entries,
            finished_at_ms: Some(now_ms()),
        }
    }
}

/// Merges a finished round into the run's status. Store failures surface as
/// [`SimError::PersistenceConflict`]; the round is not retried.
pub async fn commit_round<S>(store: &S, run_id: &RunId, delta: RoundDelta) -> Result<RunStatus, SimError>
where
    S: StatusStore + ?Sized,
{
    let added = delta.entries.len();
    match store.apply_round(run_id, delta).await {
        Ok(status) => {
            tracing::info!(
                run_id = %run_id,
                added,
                results = status.results.len(),
                done_request_count = status.done_request_count,
                "round committed"
            );
            Ok(status)
        }
        Err(error) => {
            tracing::error!(run_id = %run_id, %error, "round status update lost");
            Err(SimError::PersistenceConflict(error))
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
