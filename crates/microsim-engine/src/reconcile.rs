//! Generator control loop. Each tick re-reads the run, its status and its
//! topology, decides whether the run is finished and otherwise launches one
//! detached round.

use crate::aggregate::{ResultAggregator, commit_round, now_ms};
use crate::client::HopClient;
use crate::config::GeneratorConfig;
use crate::dispatch::dispatch_round;
use crate::retry::RetryBackoffConfig;
use crate::route::RouteNode;
use crate::run::{RunSource, RunSpec};
use crate::topology::TopologyProvider;
use crate::traversal::{BranchSelector, RandomSelector, prepare_with};
use crate::SimError;
use futures::future::join_all;
use microsim_store::{RunId, RunStatus, StatusStore};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DoneReason {
    RequestCountMet,
    TimeoutReached,
}

impl std::fmt::Display for DoneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoneReason::RequestCountMet => f.write_str("request count met"),
            DoneReason::TimeoutReached => f.write_str("timeout reached"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Active,
    Done(DoneReason),
}

/// The count limit is checked before the timeout. A run without a creation
/// time has not started its timeout clock.
pub fn evaluate(spec: &RunSpec, status: Option<&RunStatus>, now_ms: u64) -> RunState {
    let done = status.map(|status| status.done_request_count).unwrap_or(0);
    if let Some(limit) = spec.request_count_limit {
        if done >= limit {
            return RunState::Done(DoneReason::RequestCountMet);
        }
    }
    if let (Some(timeout_ms), Some(created_at_ms)) = (spec.timeout_ms, spec.created_at_ms) {
        if now_ms.saturating_sub(created_at_ms) > timeout_ms {
            return RunState::Done(DoneReason::TimeoutReached);
        }
    }
    RunState::Active
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoundPlan {
    pub run_id: RunId,
    pub replicas: u32,
    pub prepared: RouteNode,
}

/// Dispatches, aggregates and commits one round. Returns the merged status,
/// or `None` when nothing was merged: every replica failed or the commit was
/// lost.
pub async fn run_round(
    client: HopClient,
    store: Arc<dyn StatusStore>,
    plan: RoundPlan,
) -> Option<RunStatus> {
    let report = dispatch_round(&client, &plan.prepared, plan.replicas).await;
    if report.exchanges.is_empty() {
        tracing::warn!(
            run_id = %plan.run_id,
            failures = report.failures.len(),
            "round produced no responses, status left untouched"
        );
        return None;
    }

    let mut aggregator = ResultAggregator::new();
    let unique = aggregator.stage_report(&report);
    tracing::debug!(
        run_id = %plan.run_id,
        exchanges = report.exchanges.len(),
        unique,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "round finished"
    );
    commit_round(
        store.as_ref(),
        &plan.run_id,
        aggregator.into_delta(report.elapsed, plan.replicas),
    )
    .await
    .ok()
}

#[derive(Debug)]
pub enum TickOutcome {
    Done(DoneReason),
    Dispatched {
        requeue_after: Duration,
        round: JoinHandle<Option<RunStatus>>,
    },
}

pub struct Reconciler {
    runs: Arc<dyn RunSource>,
    topologies: Arc<dyn TopologyProvider>,
    store: Arc<dyn StatusStore>,
    client: HopClient,
    backoff: RetryBackoffConfig,
    selector: Arc<dyn BranchSelector>,
    max_prerequisite_retries: Option<u32>,
    first_seen: Mutex<BTreeMap<RunId, u64>>,
}

impl Reconciler {
    pub fn new(
        runs: Arc<dyn RunSource>,
        topologies: Arc<dyn TopologyProvider>,
        store: Arc<dyn StatusStore>,
        config: &GeneratorConfig,
    ) -> Result<Self, SimError> {
        Ok(Self {
            runs,
            topologies,
            store,
            client: HopClient::new(config.transport_timeout())?,
            backoff: config.backoff.clone(),
            selector: Arc::new(RandomSelector),
            max_prerequisite_retries: config.max_prerequisite_retries,
            first_seen: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn with_selector(mut self, selector: Arc<dyn BranchSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// One reconciliation step. Prerequisite failures return before any
    /// round state is touched.
    pub async fn tick(&self, run_id: &RunId) -> Result<TickOutcome, SimError> {
        let mut spec = self.runs.load_run(run_id).await?;
        if spec.created_at_ms.is_none() {
            spec.created_at_ms = Some(self.first_seen(run_id)?);
        }
        let status = self.store.get_status(run_id).await.map_err(|err| {
            SimError::PrerequisiteLoad(format!("status for run {run_id} unavailable: {err}"))
        })?;

        if let RunState::Done(reason) = evaluate(&spec, status.as_ref(), now_ms()) {
            return Ok(TickOutcome::Done(reason));
        }

        let topology = self.topologies.load_topology(&spec.topology_id).await?;
        let plan = RoundPlan {
            run_id: run_id.clone(),
            replicas: spec.replicas(),
            prepared: prepare_with(&spec.route, &topology, self.selector.as_ref()),
        };
        tracing::info!(
            run_id = %run_id,
            replicas = plan.replicas,
            hops = plan.prepared.node_count(),
            "dispatching round"
        );
        let round = tokio::spawn(run_round(self.client.clone(), self.store.clone(), plan));

        Ok(TickOutcome::Dispatched {
            requeue_after: spec.between_delay(),
            round,
        })
    }

    fn first_seen(&self, run_id: &RunId) -> Result<u64, SimError> {
        let mut seen = self
            .first_seen
            .lock()
            .map_err(|_| SimError::Runtime("reconciler run clock poisoned".to_string()))?;
        Ok(*seen.entry(run_id.clone()).or_insert_with(now_ms))
    }

    /// Ticks until the run is done, then waits for rounds still in flight.
    pub async fn run(&self, run_id: &RunId) -> Result<DoneReason, SimError> {
        let mut in_flight: Vec<JoinHandle<Option<RunStatus>>> = Vec::new();
        let mut failed_attempts = 0u32;

        loop {
            match self.tick(run_id).await {
                Ok(TickOutcome::Done(reason)) => {
                    join_all(in_flight).await;
                    tracing::info!(run_id = %run_id, %reason, "run done");
                    return Ok(reason);
                }
                Ok(TickOutcome::Dispatched {
                    requeue_after,
                    round,
                }) => {
                    failed_attempts = 0;
                    in_flight.retain(|handle| !handle.is_finished());
                    in_flight.push(round);
                    tokio::time::sleep(requeue_after).await;
                }
                Err(SimError::PrerequisiteLoad(message)) => {
                    failed_attempts += 1;
                    if let Some(max) = self.max_prerequisite_retries {
                        if failed_attempts > max {
                            join_all(in_flight).await;
                            tracing::error!(
                                run_id = %run_id,
                                attempts = failed_attempts,
                                %message,
                                "giving up on run prerequisites"
                            );
                            return Err(SimError::PrerequisiteLoad(message));
                        }
                    }
                    let delay = self
                        .backoff
                        .delay_for_attempt(failed_attempts, rand::random::<u64>());
                    tracing::warn!(
                        run_id = %run_id,
                        attempt = failed_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %message,
                        "run prerequisites unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(other) => {
                    join_all(in_flight).await;
                    return Err(other);
                }
            }
        }
    }
}
