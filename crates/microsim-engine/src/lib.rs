//! Traffic-simulation engine for MicroSim.
//!
//! A generator walks a declared route tree, prunes branches, resolves service
//! names against the simulation topology and fans requests out through
//! simulated services, which apply faults around forwarding and answer with a
//! response tree that mirrors the request. Finished rounds are hashed and
//! merged into the run's persisted status.

pub mod aggregate;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod faults;
pub mod reconcile;
pub mod resolve;
pub mod retry;
pub mod route;
pub mod run;
pub mod service;
pub mod topology;
pub mod traversal;

pub use aggregate::{ResultAggregator, commit_round};
pub use client::{Exchange, HopClient, REQUEST_ID_HEADER};
pub use config::{GeneratorConfig, ServiceConfig};
pub use dispatch::{ForwardOutcome, ReplicaExchange, RoundReport, dispatch_round, forward_children};
pub use errors::{FaultError, SimError};
pub use faults::{
    Fault, FaultKind, FaultRegistry, PressureGauge, SharedFault, core_registry, run_faults,
};
pub use reconcile::{DoneReason, Reconciler, RoundPlan, RunState, TickOutcome, evaluate, run_round};
pub use resolve::{is_address, resolve, try_resolve};
pub use retry::{RetryBackoffConfig, delay_for_attempt_ms};
pub use route::{FaultPlan, FaultSpec, ResponseNode, RouteNode};
pub use run::{FileRunSource, MemoryRunSource, RunSource, RunSpec};
pub use service::{ServiceState, router, serve};
pub use topology::{
    FileTopologyProvider, MemoryTopologyProvider, ServiceEndpoint, ServiceTopology,
    TopologyProvider, lookup_key,
};
pub use traversal::{BranchSelector, RandomSelector, prepare, prepare_with, retains};
