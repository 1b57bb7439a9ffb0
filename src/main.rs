use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use durafan::http::{HttpState, run_server};
use durafan::providers::Provider;
use durafan::providers::in_memory::InMemoryProvider;
use durafan::providers::sqlite::SqliteProvider;
use durafan::runtime::observability::{LogFormat, ObservabilityConfig, init_logging};
use durafan::runtime::{Runtime, RuntimeOptions};
use durafan::sample::{HELLO_ORCHESTRATOR, SampleOptions, sample_app};
use durafan::{Client, OrchestrationStatus};

#[derive(Debug, Parser)]
#[command(name = "durafan", about = "Durable orchestration engine running the hello-cities sample")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// SQLite database URL, e.g. `sqlite:durafan.db?mode=rwc`. In-memory storage when omitted.
    #[arg(long, env = "DURAFAN_DATABASE_URL", global = true)]
    database_url: Option<String>,
    #[arg(long, env = "DURAFAN_LOG_FORMAT", default_value = "compact", global = true)]
    log_format: LogFormat,
    #[arg(long, env = "DURAFAN_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,
    #[arg(long, default_value_t = 4, global = true)]
    worker_concurrency: usize,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "DURAFAN_LISTEN", default_value = "127.0.0.1:7071")]
        listen: SocketAddr,
    },
    /// Run the sample orchestration once and print its output
    Run {
        #[arg(long, default_value = HELLO_ORCHESTRATOR)]
        orchestration: String,
        #[arg(long, default_value = "")]
        input: String,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

async fn open_store(database_url: Option<&str>) -> anyhow::Result<Arc<dyn Provider>> {
    Ok(match database_url {
        Some(url) => Arc::new(
            SqliteProvider::new(url, None)
                .await
                .with_context(|| format!("open database {url}"))?,
        ),
        None => Arc::new(InMemoryProvider::new()),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&ObservabilityConfig {
        log_format: cli.common.log_format,
        log_level: cli.common.log_level.clone(),
    })
    .map_err(|e| anyhow!(e))?;

    let app = Arc::new(sample_app(SampleOptions::default()).map_err(|e| anyhow!(e))?);
    let store = open_store(cli.common.database_url.as_deref()).await?;
    let options = RuntimeOptions {
        worker_concurrency: cli.common.worker_concurrency,
        ..RuntimeOptions::default()
    };
    let runtime = Runtime::start_with_options(store.clone(), app.activities(), app.orchestrations(), options).await;
    let client = Client::new(store);

    let result = match cli.command {
        Command::Serve { listen } => run_server(HttpState { client, app }, listen).await,
        Command::Run {
            orchestration,
            input,
            timeout_secs,
        } => run_once(&client, &orchestration, input, Duration::from_secs(timeout_secs)).await,
    };

    runtime.shutdown(Some(Duration::from_secs(5))).await;
    result
}

async fn run_once(client: &Client, orchestration: &str, input: String, timeout: Duration) -> anyhow::Result<()> {
    let instance = uuid::Uuid::new_v4().simple().to_string();
    client.start_orchestration(&instance, orchestration, input).await?;
    match client.wait_for_orchestration(&instance, timeout).await? {
        OrchestrationStatus::Completed { output, custom_status } => {
            if let Some(status) = custom_status {
                eprintln!("custom status: {status}");
            }
            println!("{output}");
            Ok(())
        }
        OrchestrationStatus::Failed { details, .. } => Err(anyhow!("{instance} failed: {details}")),
        OrchestrationStatus::Terminated { reason, .. } => Err(anyhow!("{instance} terminated: {reason}")),
        other => Err(anyhow!("{instance} ended in unexpected state {}", other.label())),
    }
}
