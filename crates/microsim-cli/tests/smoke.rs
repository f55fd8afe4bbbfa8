use microsim_engine::{RouteNode, RunSpec, ServiceTopology};
use microsim_store::{FsStatusStore, ResultEntry, RoundDelta, StatusStore, content_hash};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

fn run_cli(args: &[&str], cwd: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_microsim"))
        .args(args)
        .current_dir(cwd)
        .env("RUST_LOG", "info")
        .output()
        .expect("cli process should start")
}

fn write_run_file(path: &Path, spec: &RunSpec) {
    std::fs::write(
        path,
        serde_json::to_vec_pretty(spec).expect("run spec should encode"),
    )
    .expect("run file write should succeed");
}

fn write_topology_file(path: &Path) {
    let topology = ServiceTopology::new("topo-0001").with_service("front", "http://127.0.0.1:9/");
    std::fs::write(
        path,
        serde_json::to_vec_pretty(&topology).expect("topology should encode"),
    )
    .expect("topology file write should succeed");
}

async fn seed_status(state_dir: &Path, run_id: &str) {
    let store = FsStatusStore::new(state_dir).expect("store should open");
    let entry = ResultEntry::from_bodies(b"{\"designation\":\"a\"}", b"{\"service\":\"a\"}");
    let delta = RoundDelta {
        elapsed: Duration::from_micros(1_500),
        replica_count: 2,
        entries: BTreeMap::from([(
            content_hash(entry.response.as_bytes(), entry.request.as_bytes()),
            entry,
        )]),
        finished_at_ms: Some(42),
    };
    store
        .apply_round(&run_id.to_string(), delta)
        .await
        .expect("round should apply");
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("path should be utf8")
}

#[test]
fn generate_zero_request_limit_expected_immediate_stop() {
    let temp = TempDir::new().expect("tempdir should create");
    let run_file = temp.path().join("run.json");
    let topology_file = temp.path().join("topology.json");
    let state_dir = temp.path().join("state");
    let mut spec = RunSpec::new("run-zero", "topo-0001", RouteNode::new("front"));
    spec.request_count_limit = Some(0);
    write_run_file(&run_file, &spec);
    write_topology_file(&topology_file);

    let output = run_cli(
        &[
            "generate",
            "--run-file",
            path_arg(&run_file),
            "--topology-file",
            path_arg(&topology_file),
            "--state-dir",
            path_arg(&state_dir),
        ],
        temp.path(),
    );

    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf8");
    assert!(stdout.contains("run_id: run-zero"));
    assert!(stdout.contains("stop_reason: request count met"));
    assert!(stdout.contains("done_request_count: 0"));
    let stderr = String::from_utf8(output.stderr).expect("stderr should be utf8");
    assert!(stderr.contains("generating traffic"));
    assert!(stderr.contains("generation stopped"));

    let stamped: RunSpec = serde_json::from_slice(
        &std::fs::read(&run_file).expect("run file should still exist"),
    )
    .expect("stamped run file should decode");
    assert!(stamped.created_at_ms.is_some_and(|at| at > 0));
}

#[tokio::test(flavor = "current_thread")]
async fn inspect_status_text_expected_summary_fields() {
    let temp = TempDir::new().expect("tempdir should create");
    seed_status(temp.path(), "run-seeded").await;

    let output = run_cli(
        &[
            "inspect-status",
            "--state-dir",
            path_arg(temp.path()),
            "--run-id",
            "run-seeded",
        ],
        temp.path(),
    );

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf8");
    assert!(stdout.contains("done_request_count: 1"));
    assert!(stdout.contains("total_response_time_us: 1500"));
    assert!(stdout.contains("average_response_time_us: 1500"));
    assert!(stdout.contains("replica_count: 2"));
    assert!(stdout.contains("results: 1"));
}

#[tokio::test(flavor = "current_thread")]
async fn inspect_status_json_expected_status_fields() {
    let temp = TempDir::new().expect("tempdir should create");
    seed_status(temp.path(), "run-json").await;

    let output = run_cli(
        &[
            "inspect-status",
            "--state-dir",
            path_arg(temp.path()),
            "--run-id",
            "run-json",
            "--json",
        ],
        temp.path(),
    );

    assert!(output.status.success());
    let payload: Value = serde_json::from_slice(&output.stdout).expect("stdout should be json");
    assert_eq!(payload["done_request_count"], Value::from(1));
    assert_eq!(payload["replica_count"], Value::from(2));
    assert_eq!(payload["last_round_at_ms"], Value::from(42));
    assert_eq!(
        payload["results"]
            .as_object()
            .expect("results should be an object")
            .len(),
        1
    );
}

#[test]
fn inspect_status_unknown_run_expected_failure_exit() {
    let temp = TempDir::new().expect("tempdir should create");

    let output = run_cli(
        &[
            "inspect-status",
            "--state-dir",
            path_arg(temp.path()),
            "--run-id",
            "missing",
        ],
        temp.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("stderr should be utf8");
    assert!(stderr.contains("error: run 'missing' has no recorded status"));
}
