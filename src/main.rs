use std::sync::Arc;

use gen_queue::admission::{
    HardwareStatus, HttpStatusSource, LiveAdmissionPolicy, StaticStatusSource, StatusSource,
    WorkflowMetadata, WorkflowRegistry,
};
use gen_queue::channels::CliChannel;
use gen_queue::config::{QueueConfig, ServiceConfig};
use gen_queue::executor::SimulatedExecutor;
use gen_queue::frontend::{Frontend, FrontendDeps, OperatorPolicy};
use gen_queue::queue::{AccessLevel, LaneScheduler, WorkExecutor};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let queue_config = QueueConfig::from_env()?;
    let service_config = ServiceConfig::from_env()?;

    eprintln!("🖼️  Gen Queue v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Lanes: high {} slots, low {} slots, timeout {}s",
        queue_config.high_capacity,
        queue_config.low_capacity,
        queue_config.job_timeout.as_secs()
    );

    // ── Workflows ───────────────────────────────────────────────────────
    let workflows = match &service_config.workflows_path {
        Some(path) => WorkflowRegistry::load(path).await?,
        None => default_workflows(),
    };
    eprintln!("   Workflows: {}", workflows.names().join(", "));
    let workflows = Arc::new(workflows);

    // ── Admission ───────────────────────────────────────────────────────
    let source: Arc<dyn StatusSource> = match (&service_config.high_url, &service_config.low_url) {
        (Some(high), Some(low)) => {
            eprintln!("   Probes: high {high}, low {low}");
            Arc::new(HttpStatusSource::new(
                high.clone(),
                low.clone(),
                service_config.foreground_url.clone(),
                queue_config.probe_request_timeout(),
            )?)
        }
        _ => {
            eprintln!("   Probes: none configured, assuming both workers are up");
            Arc::new(StaticStatusSource::new(HardwareStatus::available()))
        }
    };
    let policy = Arc::new(LiveAdmissionPolicy::from_config(source, &queue_config));

    // ── Scheduler ───────────────────────────────────────────────────────
    let scheduler = Arc::new(LaneScheduler::new(
        &queue_config,
        policy,
        workflows.clone(),
    ));
    let dispatchers = scheduler.process_queues(CancellationToken::new());

    let executor: Arc<dyn WorkExecutor> =
        Arc::new(SimulatedExecutor::new(service_config.simulated_job_time));

    eprintln!(
        "   Operator: {} access{}",
        service_config.cli_access,
        if service_config.cli_skip_queue {
            ", may skip the queue"
        } else {
            ""
        }
    );
    eprintln!("   Type /help for commands. /quit to exit.\n");

    let frontend = Frontend::new(
        FrontendDeps {
            scheduler,
            workflows,
            executor,
            operators: OperatorPolicy {
                access_level: service_config.cli_access,
                may_skip_queue: service_config.cli_skip_queue,
            },
        },
        Arc::new(CliChannel::new("local-user")),
    );

    let result = frontend.run().await;
    dispatchers.shutdown().await;
    result?;

    Ok(())
}

/// Catalogue used when no workflow file is configured.
fn default_workflows() -> WorkflowRegistry {
    WorkflowRegistry::new()
        .with(WorkflowMetadata::new("sdxl", AccessLevel::Guest))
        .with(WorkflowMetadata::new("flux", AccessLevel::Member))
        .with(WorkflowMetadata::new("tts", AccessLevel::Guest))
        .with(WorkflowMetadata::new("video", AccessLevel::Trusted).big())
}
