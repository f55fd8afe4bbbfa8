use clap::{ArgAction, Parser, Subcommand};
use microsim_engine::config::{DEFAULT_BIND_ADDR, DEFAULT_TRANSPORT_TIMEOUT_MS};
use microsim_engine::{
    FileRunSource, FileTopologyProvider, GeneratorConfig, Reconciler, RunSource, RunSpec,
    ServiceConfig, ServiceState, serve,
};
use microsim_store::{FsStatusStore, RunStatus, StatusStore};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "microsim")]
#[command(about = "Simulated services and traffic generator for MicroSim")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Serve(ServeArgs),
    Generate(GenerateArgs),
    InspectStatus(InspectStatusArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Name reported in every response; `SERVICE_NAME` takes precedence.
    #[arg(long)]
    service_name: Option<String>,
    #[arg(long, default_value = DEFAULT_BIND_ADDR)]
    addr: String,
    #[arg(long, default_value_t = DEFAULT_TRANSPORT_TIMEOUT_MS)]
    transport_timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    #[arg(long)]
    run_file: PathBuf,
    #[arg(long)]
    topology_file: PathBuf,
    #[arg(long)]
    state_dir: PathBuf,
    #[arg(long, default_value_t = DEFAULT_TRANSPORT_TIMEOUT_MS)]
    transport_timeout_ms: u64,
    #[arg(long)]
    max_prerequisite_retries: Option<u32>,
}

#[derive(clap::Args, Debug)]
struct InspectStatusArgs {
    #[arg(long)]
    state_dir: PathBuf,
    #[arg(long)]
    run_id: String,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => serve_command(args).await,
        Commands::Generate(args) => generate_command(args).await,
        Commands::InspectStatus(args) => inspect_status_command(args).await,
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn serve_command(args: ServeArgs) -> Result<ExitCode, String> {
    let config = ServiceConfig {
        bind_addr: normalize_bind_addr(&args.addr),
        transport_timeout_ms: args.transport_timeout_ms,
        ..ServiceConfig::default()
    }
    .with_service_name_override(args.service_name)
    .with_env_overrides();

    tracing::info!(
        service = %config.service_name,
        addr = %config.bind_addr,
        transport_timeout_ms = config.transport_timeout_ms,
        "starting simulated service"
    );
    let state = ServiceState::from_config(&config).map_err(|error| error.to_string())?;
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| format!("failed binding '{}': {e}", config.bind_addr))?;
    serve(listener, state)
        .await
        .map_err(|error| error.to_string())?;
    Ok(ExitCode::SUCCESS)
}

async fn generate_command(args: GenerateArgs) -> Result<ExitCode, String> {
    let spec = stamp_run_file(&args.run_file)?;
    let store = Arc::new(FsStatusStore::new(&args.state_dir).map_err(|e| e.to_string())?);
    let config = GeneratorConfig {
        transport_timeout_ms: args.transport_timeout_ms,
        max_prerequisite_retries: args.max_prerequisite_retries,
        ..GeneratorConfig::default()
    };
    let runs: Arc<dyn RunSource> = Arc::new(FileRunSource::new(&args.run_file));
    let reconciler = Reconciler::new(
        runs,
        Arc::new(FileTopologyProvider::new(&args.topology_file)),
        store.clone(),
        &config,
    )
    .map_err(|error| error.to_string())?;

    tracing::info!(
        run_id = %spec.run_id,
        topology_id = %spec.topology_id,
        state_dir = %args.state_dir.display(),
        "generating traffic"
    );
    let reason = reconciler
        .run(&spec.run_id)
        .await
        .map_err(|error| error.to_string())?;
    tracing::info!(run_id = %spec.run_id, %reason, "generation stopped");

    let status = store
        .get_status(&spec.run_id)
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default();
    println!("run_id: {}", spec.run_id);
    println!("stop_reason: {reason}");
    println!("done_request_count: {}", status.done_request_count);
    println!("results: {}", status.results.len());
    Ok(ExitCode::SUCCESS)
}

async fn inspect_status_command(args: InspectStatusArgs) -> Result<ExitCode, String> {
    let store = FsStatusStore::new(&args.state_dir).map_err(|e| e.to_string())?;
    let status = store
        .get_status(&args.run_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("run '{}' has no recorded status", args.run_id))?;

    if args.json {
        let json = serde_json::to_string_pretty(&status).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        print_status(&args.run_id, &status);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_status(run_id: &str, status: &RunStatus) {
    println!("run_id: {run_id}");
    println!("done_request_count: {}", status.done_request_count);
    println!("total_response_time_us: {}", status.total_response_time_us);
    println!(
        "average_response_time_us: {}",
        status
            .average_response_time()
            .map(|average| average.as_micros().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("replica_count: {}", status.replica_count);
    println!("results: {}", status.results.len());
    if let Some(at) = status.last_round_at_ms {
        println!("last_round_at_ms: {at}");
    }
}

/// Gives a fresh run its creation time so timeouts are measured from first use.
fn stamp_run_file(path: &Path) -> Result<RunSpec, String> {
    let raw = std::fs::read(path)
        .map_err(|e| format!("failed reading run file '{}': {e}", path.display()))?;
    let mut spec = RunSpec::from_json(&raw).map_err(|error| error.to_string())?;
    if spec.created_at_ms.is_some() {
        return Ok(spec);
    }

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .map_err(|e| format!("system clock is before the epoch: {e}"))?;
    spec.created_at_ms = Some(now_ms);
    let encoded = serde_json::to_vec_pretty(&spec).map_err(|e| e.to_string())?;
    std::fs::write(path, encoded)
        .map_err(|e| format!("failed writing run file '{}': {e}", path.display()))?;
    Ok(spec)
}

/// Accepts the `:8080` shorthand for all interfaces.
fn normalize_bind_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
