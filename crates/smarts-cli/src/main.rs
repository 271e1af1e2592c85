//! `smarts` command-line host for the dispatch core.

mod config;

use clap::{Parser, Subcommand};
use config::SmartsConfig;
use smarts_agent::DryRunDriver;
use smarts_mcp::{BackendManager, Coordinator, GroupTask, HttpBackend, Transport};
use smarts_orchestrator::{
    AgentFactory, DynamicReconfigurator, EvolutionEngine, HotSwapManager, KeywordDecomposer,
    Orchestrator, TaskDecomposer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smarts", about = "SMARTS multi-agent task dispatch")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose and run a task on the agent pool
    Run {
        /// Task description
        description: String,
        /// Task id (generated when omitted)
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Run a task across a configured coordination group
    Group {
        /// Group id from the config file
        group_id: String,
        /// Task description
        description: String,
        #[arg(long)]
        task_id: Option<String>,
        /// JSON payload forwarded to every backend
        #[arg(long)]
        payload: Option<String>,
    },
    /// Show how a task would be classified and decomposed
    Analyze {
        description: String,
    },
    /// List the agent pool with metrics and scores
    Agents,
    /// List configured backends and groups, and probe backend health
    Backends,
}

/// The wired-up dispatch core.
struct Runtime {
    orchestrator: Orchestrator,
    manager: Arc<BackendManager>,
}

async fn build_runtime(config: SmartsConfig) -> anyhow::Result<Runtime> {
    let registry = Arc::new(config.registry.build());
    let factory = Arc::new(AgentFactory::new(registry.clone(), Arc::new(DryRunDriver)));
    let seeded = factory.register_defaults();
    info!(agents = seeded, "Agent pool ready");

    let manager = Arc::new(BackendManager::new());
    for backend in config.backends {
        match backend.transport {
            Transport::Http => {
                let client = HttpBackend::new(backend.endpoint.clone())?;
                manager.register_backend(backend, Arc::new(client)).await;
            }
            other => {
                warn!(
                    backend = %backend.id,
                    transport = %other,
                    "Transport not supported by this host, skipping"
                );
            }
        }
    }
    for group in &config.groups {
        manager.create_group(group.to_group()).await?;
    }

    let evolution = Arc::new(
        EvolutionEngine::new(registry.clone(), config.evolution).with_spawner(factory.clone()),
    );
    let reconfigurator = Arc::new(DynamicReconfigurator::new().with_scaler(factory));
    let coordinator = Coordinator::new(manager.clone()).with_config(config.coordinator);

    let orchestrator = Orchestrator::new(registry, config.orchestrator)
        .with_evolution(evolution)
        .with_reconfigurator(Some(reconfigurator))
        .with_hot_swap(Arc::new(HotSwapManager::default().with_config(config.hot_swap)))
        .with_coordinator(coordinator);

    Ok(Runtime {
        orchestrator,
        manager,
    })
}

fn task_id_or_new(task_id: Option<String>) -> String {
    task_id.unwrap_or_else(|| format!("task-{}", uuid::Uuid::new_v4()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = SmartsConfig::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run {
            description,
            task_id,
        } => {
            let runtime = build_runtime(config).await?;
            let task_id = task_id_or_new(task_id);
            let results = runtime
                .orchestrator
                .process_task(&description, &task_id)
                .await;
            let generations = runtime.orchestrator.shutdown().await;
            if !generations.is_empty() {
                info!(count = generations.len(), "Evolution generations ran");
            }
            print_json(&results)?;
        }
        Commands::Group {
            group_id,
            description,
            task_id,
            payload,
        } => {
            let mut task = GroupTask::new(description);
            if let Some(payload) = payload {
                let value = serde_json::from_str(&payload)
                    .map_err(|e| anyhow::anyhow!("Invalid --payload JSON: {e}"))?;
                task = task.with_payload(value);
            }
            let runtime = build_runtime(config).await?;
            let task_id = task_id_or_new(task_id);
            let result = runtime
                .orchestrator
                .process_group_task(&task, &task_id, &group_id)
                .await?;
            print_json(&result)?;
        }
        Commands::Analyze { description } => {
            let profile = DynamicReconfigurator::classify(&description);
            let subtasks = KeywordDecomposer::new().decompose(&description);
            print_json(&serde_json::json!({
                "profile": profile,
                "configuration": profile.configuration(),
                "subtasks": subtasks,
            }))?;
        }
        Commands::Agents => {
            let runtime = build_runtime(config).await?;
            let agents = runtime.orchestrator.registry().snapshot();
            if agents.is_empty() {
                println!("No agents registered.");
            } else {
                println!("Registered agents:");
                for agent in &agents {
                    println!(
                        "  {} [{}] v{}  score {:.3}  success {:.2}  avg {:.0}ms  runs {}",
                        agent.descriptor.id,
                        agent.descriptor.kind,
                        agent.descriptor.version,
                        agent.score,
                        agent.metrics.success_rate,
                        agent.metrics.avg_execution_time_ms,
                        agent.metrics.total_executions,
                    );
                }
                println!("\nTotal: {} agent(s)", agents.len());
            }
        }
        Commands::Backends => {
            let runtime = build_runtime(config).await?;
            let backends = runtime.manager.list_backends().await;
            if backends.is_empty() {
                println!("No backends configured.");
                println!("Configure backends in smarts.toml under [[backends]]");
            } else {
                let health = runtime.manager.health_check().await;
                println!("Backends:");
                for backend in &backends {
                    let status = health
                        .iter()
                        .find(|h| h.backend_id == backend.id)
                        .map(|h| match &h.details {
                            Some(details) => format!("{:?} ({details})", h.status),
                            None => format!("{:?}", h.status),
                        })
                        .unwrap_or_else(|| "unknown".to_string());
                    println!(
                        "  {} - {} [{}] {}",
                        backend.id, backend.name, backend.transport, status
                    );
                }
            }

            let groups = runtime.manager.list_groups().await;
            if !groups.is_empty() {
                println!("\nGroups:");
                for group in &groups {
                    println!(
                        "  {} ({}) members: {}",
                        group.id,
                        group.strategy,
                        group.member_ids.join(", ")
                    );
                }
            }
        }
    }

    Ok(())
}
