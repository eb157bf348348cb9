mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::ForgelineConfig;
use forgeline_agents::{ArchitectureAgent, BuildAgent, CodeAgent, QualityAgent, TestAgent};
use forgeline_core::{ModelProvider, RunOptions, RunStatus, Specification};
use forgeline_http::HttpServer;
use forgeline_mcp::CapabilityMatrix;
use forgeline_orchestrator::{AgentSet, Orchestrator, RealLmConfig};
use forgeline_prompt::PromptLoader;
use forgeline_retrieval::RetrievalEngine;
use forgeline_store::ArtifactStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forgeline", about = "Governed multi-agent firmware generation pipeline")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "forgeline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP control plane.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Submit one specification file and block until the run finishes.
    Generate {
        /// Path to a JSON specification file.
        spec_file: PathBuf,
        #[arg(long)]
        architecture_only: bool,
        #[arg(long)]
        no_tests: bool,
        #[arg(long)]
        no_quality_checks: bool,
    },
}

async fn build_orchestrator(config: &ForgelineConfig) -> Orchestrator {
    let mcp = Arc::new(CapabilityMatrix::canonical());
    let store = Arc::new(ArtifactStore::new(config.storage.output_dir.clone(), mcp.clone()));
    let retrieval = Arc::new(match RetrievalEngine::load(&config.retrieval.corpus_dir).await {
        Ok(engine) => engine,
        Err(err) => {
            tracing::warn!(error = %err, "retrieval corpus failed to load; continuing with an empty corpus");
            RetrievalEngine::empty()
        }
    });
    let prompts = Arc::new(PromptLoader::new(config.prompts.dir.clone()));
    let agents = AgentSet {
        architecture: Arc::new(ArchitectureAgent),
        code: Arc::new(CodeAgent),
        test: Arc::new(TestAgent),
        quality: Arc::new(QualityAgent),
        build: Arc::new(BuildAgent),
    };
    let real_lm = RealLmConfig {
        base_url: config.lm.base_url.clone(),
        default_model: config.lm.default_model.clone(),
    };

    Orchestrator::new(mcp, store, retrieval, prompts, agents, real_lm)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config = ForgelineConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let orchestrator = Arc::new(build_orchestrator(&config).await);

            let app = HttpServer::build(orchestrator);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(addr, "forgeline control plane listening");
            axum::serve(listener, app).await?;
            Ok(())
        }
        Commands::Generate { spec_file, architecture_only, no_tests, no_quality_checks } => {
            let orchestrator = build_orchestrator(&config).await;

            let raw = tokio::fs::read_to_string(&spec_file).await?;
            let specification: Specification = serde_json::from_str(&raw)?;

            let options = RunOptions {
                include_tests: !no_tests,
                run_quality_checks: !no_quality_checks,
                model_provider: if config.lm.use_real { ModelProvider::Real } else { ModelProvider::Mock },
                model_name: Some(config.lm.default_model.clone()),
                api_key: config.lm.api_key.clone(),
                architecture_only,
            };

            let run_id = match orchestrator.submit(specification, options).await {
                Ok(run_id) => run_id,
                Err(err) => {
                    eprintln!("invalid input: {err}");
                    std::process::exit(2);
                }
            };

            let final_state = loop {
                let state = orchestrator
                    .run_state(&run_id)
                    .expect("just-submitted run must be registered");
                if matches!(state.status, RunStatus::Completed | RunStatus::Failed) {
                    break state;
                }
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            };

            println!("{}", serde_json::to_string_pretty(&final_state)?);

            match final_state.status {
                RunStatus::Completed => Ok(()),
                RunStatus::Failed => {
                    let upstream_unavailable =
                        final_state.errors.iter().any(|e| e.starts_with("LM unavailable"));
                    std::process::exit(if upstream_unavailable { 4 } else { 3 });
                }
                _ => unreachable!("loop only breaks on a terminal status"),
            }
        }
    }
}

