use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use axon_providers::ProviderEntry;
use axon_runtime::{Runtime, RuntimePorts};
use axon_tools::ToolRegistry;
use axon_types::ExecutionContext;

mod packages;
mod provider;
mod sandbox;
mod storage;

use packages::load_workspace_packages;
use provider::{EchoProvider, OpenAiCompatibleProvider};
use sandbox::ProcessSandbox;
use storage::FileStorage;

/// Local-first agent execution kernel, run from the command line.
#[derive(Parser, Debug)]
#[command(name = "axon", about = "Run agents against the local execution kernel")]
struct Cli {
    /// Directory custom agents, graphs and package manifests are loaded from.
    #[arg(long, global = true, env = "AXON_WORKSPACE_ROOT", default_value = ".")]
    workspace_root: PathBuf,

    /// Directory storage, snapshots and other kernel state are written to.
    /// Defaults to `<workspace-root>/.axon/state`.
    #[arg(long, global = true, env = "AXON_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one agent to completion against a single input and print its result.
    Run {
        #[arg(long, default_value = "default.assistant")]
        agent: String,
        input: String,
    },
    /// Reload an execution's latest snapshot and resume it from where it left off.
    Resume { execution_id: String },
    /// Run the same agent repeatedly, one line of stdin per turn.
    Chat {
        #[arg(long, default_value = "default.assistant")]
        agent: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let state_dir = cli.state_dir.clone().unwrap_or_else(|| cli.workspace_root.join(".axon").join("state"));
    info!(workspace_root = %cli.workspace_root.display(), state_dir = %state_dir.display(), "starting");

    match cli.command {
        Command::Run { agent, input } => {
            let runtime = build_runtime(&cli.workspace_root, &state_dir).await?;
            let result = runtime.execute(&agent, serde_json::Value::String(input)).await?;
            print_result(&result);
            runtime.shutdown(Duration::from_secs(5)).await;
        }
        Command::Resume { execution_id } => {
            let runtime = build_runtime(&cli.workspace_root, &state_dir).await?;
            let result = runtime.resume(&execution_id).await?;
            print_result(&result);
            runtime.shutdown(Duration::from_secs(5)).await;
        }
        Command::Chat { agent } => {
            let runtime = build_runtime(&cli.workspace_root, &state_dir).await?;
            run_chat(&runtime, &agent).await?;
            runtime.shutdown(Duration::from_secs(5)).await;
        }
    }

    Ok(())
}

/// Each line is its own fresh execution: the kernel mints a new
/// `ExecutionContext` per `execute()` call, so this is stateless across
/// turns unless the agent's own graph reaches into session memory keyed
/// by something the caller supplies. Good enough for exercising an agent
/// interactively; a true multi-turn conversation needs a graph that
/// threads a session id through `variables` itself.
async fn run_chat(runtime: &Runtime, agent: &str) -> anyhow::Result<()> {
    println!("axon chat — each line runs `{agent}` as a fresh execution. Ctrl-D to exit.");
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match runtime.execute(agent, serde_json::Value::String(trimmed.to_string())).await {
            Ok(result) => print_result(&result),
            Err(err) => eprintln!("error: {err}"),
        }
    }
    Ok(())
}

fn print_result(context: &ExecutionContext) {
    let response = context.variables.get("response").cloned().unwrap_or(serde_json::Value::Null);
    let rendered = serde_json::json!({
        "executionId": context.execution_id,
        "state": context.lifecycle_state,
        "response": response,
    });
    println!("{}", serde_json::to_string_pretty(&rendered).unwrap_or_default());
}

/// Assembles every concrete port this binary supplies (`FileStorage`,
/// `ProcessSandbox`, an always-available `EchoProvider` plus an optional
/// real HTTP provider) into `RuntimePorts` and constructs a `Runtime`.
/// Grounded on the reference engine binary's `build_state`, generalized
/// from that binary's fixed concrete backends to this crate's own
/// from-scratch port adapters.
async fn build_runtime(workspace_root: &PathBuf, state_dir: &PathBuf) -> anyhow::Result<Runtime> {
    let storage = Arc::new(FileStorage::new(state_dir.join("storage")).await.context("opening storage")?);
    let sandbox = Arc::new(ProcessSandbox::new());

    let tools = ToolRegistry::new();
    for tool in load_workspace_packages(workspace_root).await.context("loading workspace packages")? {
        let name = tool.name.clone();
        tools.register(tool).await;
        info!(tool = %name, "registered tool from workspace package manifest");
    }

    let mut providers = vec![ProviderEntry {
        provider: Arc::new(EchoProvider),
        priority: 0,
        cost_per_1k_tokens: 0.0,
        avg_latency_ms: 1.0,
        supported_models: Vec::new(),
    }];
    if let Ok(api_key) = std::env::var("AXON_LLM_API_KEY") {
        let base_url = std::env::var("AXON_LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let provider_id = std::env::var("AXON_LLM_PROVIDER_ID").unwrap_or_else(|_| "primary".to_string());
        info!(provider_id = %provider_id, base_url = %base_url, "registering configured LLM provider");
        providers.push(ProviderEntry {
            provider: Arc::new(OpenAiCompatibleProvider::new(provider_id, base_url, Some(api_key))),
            priority: 10,
            cost_per_1k_tokens: 0.0,
            avg_latency_ms: 500.0,
            supported_models: Vec::new(),
        });
    }

    let snapshot_store = Arc::new(
        axon_snapshot::SnapshotStore::new(state_dir.join("snapshots")).await.context("opening snapshot store")?,
    );

    let ports = RuntimePorts {
        storage,
        sandbox,
        providers,
        tools,
        vector_store: None,
        embeddings: None,
        secret_vault: None,
        snapshot_store: Some(snapshot_store),
        workspace_root: workspace_root.clone(),
    };

    Runtime::new(ports).await.context("constructing runtime")
}
